pub mod executor;
pub mod workers;
