pub mod aggregate;
pub mod geo;
pub mod ingest;
pub mod validate;
