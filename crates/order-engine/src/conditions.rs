//! Condition targets and evaluation.
//!
//! Each condition entry names a target address and carries calldata for it.
//! Targets are registered in a [`ConditionRegistry`] and implement the single
//! read-only operation [`ConditionTarget::evaluate`]. They get `&self` and no
//! handle to the engine, so a predicate cannot touch nonce or authorization
//! state.
//!
//! The engine's own address hosts [`BuiltinConditions`], which dispatches on
//! the ABI selector of the calldata:
//!
//! | Function | Holds when |
//! |----------|------------|
//! | `isTimestampAfter(uint256)` | now > timestamp |
//! | `isTimestampBefore(uint256)` | now < timestamp |
//! | `isPriceAbove(uint128,uint256)` | index price > price |
//! | `isPriceBelow(uint128,uint256)` | index price < price |
//! | `isMarketOpen(uint128)` | market accepts orders |
//! | `isOrderFeeBelow(uint128,int128,uint256)` | quoted order fee < fee |

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolInterface};
use dashmap::DashMap;
use order_core::types::Condition;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConditionFailure, Rejection};

sol! {
    /// Predicates served by the engine address.
    interface IConditions {
        function isTimestampAfter(uint256 timestamp) external view returns (bool);
        function isTimestampBefore(uint256 timestamp) external view returns (bool);
        function isPriceAbove(uint128 marketId, uint256 price) external view returns (bool);
        function isPriceBelow(uint128 marketId, uint256 price) external view returns (bool);
        function isMarketOpen(uint128 marketId) external view returns (bool);
        function isOrderFeeBelow(uint128 marketId, int128 sizeDelta, uint256 fee) external view returns (bool);
    }
}

pub use IConditions::IConditionsCalls;

/// 1e18, the fixed-point unit of prices and fee rates.
const UNIT: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// A read-only predicate at a condition target address.
#[cfg_attr(test, mockall::automock)]
pub trait ConditionTarget: Send + Sync {
    /// Whether the predicate encoded in `payload` holds. Undecodable payloads
    /// evaluate false.
    fn evaluate(&self, payload: &[u8]) -> bool;
}

/// Source of the current unix time.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only market view consulted by the built-in predicates.
pub trait ConditionContext: Send + Sync {
    fn now(&self) -> u64;

    /// Index price of the market (18 decimals), if known.
    fn index_price(&self, market_id: u128) -> Option<U256>;

    fn is_market_open(&self, market_id: u128) -> bool;

    /// Fee the market would charge for an order of `size_delta`, if quotable.
    fn order_fee(&self, market_id: u128, size_delta: i128) -> Option<U256>;
}

/// Keeper-fed snapshot of market state.
///
/// Prices and fee rates are pushed in by whatever watches the market; unknown
/// markets are closed and have no price.
pub struct MarketSnapshot {
    clock: Arc<dyn Clock>,
    prices: DashMap<u128, U256>,
    open: DashMap<u128, bool>,
    fee_rates: DashMap<u128, U256>,
}

impl MarketSnapshot {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            prices: DashMap::new(),
            open: DashMap::new(),
            fee_rates: DashMap::new(),
        }
    }

    pub fn set_index_price(&self, market_id: u128, price: U256) {
        self.prices.insert(market_id, price);
    }

    pub fn set_market_open(&self, market_id: u128, open: bool) {
        self.open.insert(market_id, open);
    }

    /// Fee per unit of size (18 decimals).
    pub fn set_fee_rate(&self, market_id: u128, rate: U256) {
        self.fee_rates.insert(market_id, rate);
    }
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ConditionContext for MarketSnapshot {
    fn now(&self) -> u64 {
        self.clock.now()
    }

    fn index_price(&self, market_id: u128) -> Option<U256> {
        self.prices.get(&market_id).map(|p| *p.value())
    }

    fn is_market_open(&self, market_id: u128) -> bool {
        self.open.get(&market_id).map(|o| *o.value()).unwrap_or(false)
    }

    fn order_fee(&self, market_id: u128, size_delta: i128) -> Option<U256> {
        let rate = *self.fee_rates.get(&market_id)?.value();
        U256::from(size_delta.unsigned_abs())
            .checked_mul(rate)
            .map(|notional| notional / UNIT)
    }
}

/// The predicate set hosted at the engine address.
#[derive(Clone)]
pub struct BuiltinConditions {
    context: Arc<dyn ConditionContext>,
}

impl BuiltinConditions {
    pub fn new(context: Arc<dyn ConditionContext>) -> Self {
        Self { context }
    }

    fn holds(&self, call: IConditionsCalls) -> bool {
        let ctx = &self.context;
        match call {
            IConditionsCalls::isTimestampAfter(c) => U256::from(ctx.now()) > c.timestamp,
            IConditionsCalls::isTimestampBefore(c) => U256::from(ctx.now()) < c.timestamp,
            IConditionsCalls::isPriceAbove(c) => {
                matches!(ctx.index_price(c.marketId), Some(price) if price > c.price)
            }
            IConditionsCalls::isPriceBelow(c) => {
                matches!(ctx.index_price(c.marketId), Some(price) if price < c.price)
            }
            IConditionsCalls::isMarketOpen(c) => ctx.is_market_open(c.marketId),
            IConditionsCalls::isOrderFeeBelow(c) => {
                matches!(ctx.order_fee(c.marketId, c.sizeDelta), Some(fee) if fee < c.fee)
            }
        }
    }

    /// `isTimestampAfter(timestamp)` hosted at `engine`.
    pub fn timestamp_after(engine: Address, timestamp: u64) -> Condition {
        let call = IConditions::isTimestampAfterCall {
            timestamp: U256::from(timestamp),
        };
        Condition::new(engine, call.abi_encode())
    }

    /// `isTimestampBefore(timestamp)` hosted at `engine`.
    pub fn timestamp_before(engine: Address, timestamp: u64) -> Condition {
        let call = IConditions::isTimestampBeforeCall {
            timestamp: U256::from(timestamp),
        };
        Condition::new(engine, call.abi_encode())
    }

    pub fn price_above(engine: Address, market_id: u128, price: U256) -> Condition {
        let call = IConditions::isPriceAboveCall {
            marketId: market_id,
            price,
        };
        Condition::new(engine, call.abi_encode())
    }

    pub fn price_below(engine: Address, market_id: u128, price: U256) -> Condition {
        let call = IConditions::isPriceBelowCall {
            marketId: market_id,
            price,
        };
        Condition::new(engine, call.abi_encode())
    }

    pub fn market_open(engine: Address, market_id: u128) -> Condition {
        let call = IConditions::isMarketOpenCall {
            marketId: market_id,
        };
        Condition::new(engine, call.abi_encode())
    }

    pub fn order_fee_below(engine: Address, market_id: u128, size_delta: i128, fee: U256) -> Condition {
        let call = IConditions::isOrderFeeBelowCall {
            marketId: market_id,
            sizeDelta: size_delta,
            fee,
        };
        Condition::new(engine, call.abi_encode())
    }
}

impl ConditionTarget for BuiltinConditions {
    fn evaluate(&self, payload: &[u8]) -> bool {
        match IConditionsCalls::abi_decode(payload) {
            Ok(call) => self.holds(call),
            Err(e) => {
                debug!(error = %e, "Undecodable built-in condition payload");
                false
            }
        }
    }
}

/// Condition targets keyed by address.
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    targets: HashMap<Address, Arc<dyn ConditionTarget>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` at `address`, replacing any previous one.
    pub fn register(&mut self, address: Address, target: Arc<dyn ConditionTarget>) {
        self.targets.insert(address, target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Evaluate every entry in order, stopping at the first that fails.
    /// No entries is vacuously satisfied.
    pub fn evaluate(&self, conditions: &[Bytes]) -> Result<(), Rejection> {
        for (index, raw) in conditions.iter().enumerate() {
            let condition = Condition::decode(raw).map_err(|_| Rejection::ConditionFailed {
                index,
                reason: ConditionFailure::Malformed,
            })?;

            let target =
                self.targets
                    .get(&condition.target)
                    .ok_or(Rejection::ConditionFailed {
                        index,
                        reason: ConditionFailure::UnknownTarget(condition.target),
                    })?;

            let holds = target.evaluate(&condition.calldata);
            debug!(index, target = %condition.target, holds, "Evaluated condition");

            if !holds {
                return Err(Rejection::ConditionFailed {
                    index,
                    reason: ConditionFailure::NotSatisfied,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .finish()
    }
}
