pub mod health;
pub mod read;
pub mod stats;
pub mod write;
