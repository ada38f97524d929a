//! Order Core Library
//!
//! Conditional order types, EIP-712 hashing and signature verification shared
//! by the order engine and off-chain signers.

pub mod config;
pub mod error;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
