//! Conditional Orders
//!
//! Root crate tying the workspace together for integration tests, benchmarks
//! and the schema tool. For actual functionality, use the individual crates:
//!
//! - `order-core`: order types, EIP-712 hashing, signing and signer recovery
//! - `order-engine`: nonce registry, conditions and the authorization engine

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use order_core as core;
pub use order_engine as engine;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Safe to call more than once.
pub fn init_tracing(default_filter: &str) {
    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = installed {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
