//! Order Engine
//!
//! Authorizes signed conditional orders: signature and nonce checks, account
//! and executor gates, condition evaluation, and the hand-off to the perps
//! market.

pub mod collaborators;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod nonce_store;
pub mod nonce_store_pg;

pub use collaborators::{
    AccountRegistry, EngineAddresses, ExecutorFeeOracle, FlatExecutorFee, MarketCommitment,
    MarketError, PerpsMarket,
};
pub use conditions::{
    BuiltinConditions, Clock, ConditionContext, ConditionRegistry, ConditionTarget, ManualClock,
    MarketSnapshot, SystemClock,
};
pub use engine::{Engine, EngineBuilder, ExecutionReceipt};
pub use error::{ConditionFailure, EngineError, Rejection, RejectionCategory, Result};
pub use nonce_store::{MemoryNonceStore, NonceReservation, NonceStore};
pub use nonce_store_pg::PostgresNonceStore;
