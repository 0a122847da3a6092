pub mod decoder;
pub mod executor;
pub mod utils;
