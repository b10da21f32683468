pub mod fix;
pub mod stats;
