pub mod encoding;
pub mod error;
pub mod settings;
pub mod sink;
