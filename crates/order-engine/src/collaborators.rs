//! External collaborators the engine forwards to but does not own.
//!
//! The perps market moves positions, the account registry owns verification
//! and trading permissions, and the fee oracle prices the executor's fee. All
//! are async traits so they can be backed by RPC clients in production and by
//! mocks in tests.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use order_core::types::{ConditionalOrder, OrderDetails};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deployment addresses the engine is constructed with.
///
/// Opaque to authorization; kept so receipts and callers can see what the
/// engine is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAddresses {
    pub perps_market: Address,
    pub spot_market: Address,
    pub stable_token: Address,
    pub governance: Address,
    pub collateral_token: Address,
    /// Synth id of the collateral on the spot market.
    pub collateral_id: u128,
}

impl EngineAddresses {
    /// Every address set to `address`, collateral id zero. Handy on devnets.
    pub fn uniform(address: Address) -> Self {
        Self {
            perps_market: address,
            spot_market: address,
            stable_token: address,
            governance: address,
            collateral_token: address,
            collateral_id: 0,
        }
    }
}

/// What the market returns for an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCommitment {
    pub market_id: u128,
    pub account_id: u128,
    pub size_delta: i128,
    pub settlement_strategy_id: u128,
    /// Unix time the market recorded the commitment.
    pub commitment_time: u64,
    /// Settlement fees charged by the market.
    pub fees: U256,
}

impl MarketCommitment {
    /// Commitment echoing `details`, as a well-behaved market would.
    pub fn for_order(details: &OrderDetails, commitment_time: u64, fees: U256) -> Self {
        Self {
            market_id: details.market_id,
            account_id: details.account_id,
            size_delta: details.size_delta,
            settlement_strategy_id: details.settlement_strategy_id,
            commitment_time,
            fees,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("market {0} is not accepting orders")]
    MarketClosed(u128),

    #[error("insufficient margin on account {0}")]
    InsufficientMargin(u128),

    #[error("acceptable price exceeded on market {0}")]
    AcceptablePriceExceeded(u128),

    #[error("market call failed: {0}")]
    Call(String),
}

/// Perpetual futures market that takes authorized orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PerpsMarket: Send + Sync {
    /// Commit the trade intent. Called at most once per authorized order.
    async fn commit_order(&self, details: &OrderDetails) -> Result<MarketCommitment, MarketError>;
}

/// Owner of account verification and trading permissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Whether the account has passed verification.
    async fn is_verified(&self, account_id: u128) -> anyhow::Result<bool>;

    /// Whether `signer` may place orders for the account (owner or delegate).
    async fn is_permitted(&self, account_id: u128, signer: Address) -> anyhow::Result<bool>;
}

/// Prices the fee an executor charges for submitting an order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutorFeeOracle: Send + Sync {
    async fn executor_fee(
        &self,
        order: &ConditionalOrder,
        executor: Address,
    ) -> anyhow::Result<U256>;
}

/// Fee oracle charging the same amount for every order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatExecutorFee(pub U256);

#[async_trait]
impl ExecutorFeeOracle for FlatExecutorFee {
    async fn executor_fee(
        &self,
        _order: &ConditionalOrder,
        _executor: Address,
    ) -> anyhow::Result<U256> {
        Ok(self.0)
    }
}
