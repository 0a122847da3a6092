pub mod error;
pub mod ledger;
pub mod plan;
pub mod registry;
