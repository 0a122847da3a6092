pub mod cluster;
pub mod core;
pub mod execution;
pub mod records;
