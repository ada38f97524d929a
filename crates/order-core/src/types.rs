//! Conditional order domain types.

pub mod condition;
pub mod order;

pub use condition::*;
pub use order::*;
