pub mod identifiers;
pub mod native;
pub mod normalize;
pub mod value;
