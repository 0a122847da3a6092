pub mod errors;
pub mod execution;
pub mod plan;
pub mod request;
pub mod status;
pub mod target;
pub mod view;
