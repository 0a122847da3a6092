pub mod error;
pub mod execution;
pub mod orchestrator;
pub mod validation;
