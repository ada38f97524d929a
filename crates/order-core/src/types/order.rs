//! Conditional order types.
//!
//! A [`ConditionalOrder`] is built and signed off-chain, then submitted to the
//! engine together with its signature. Both structs are immutable once signed:
//! any field change produces a different struct hash.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Trade intent forwarded to the perps market once the order is authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    /// Perps market to trade on.
    pub market_id: u128,
    /// Account the trade is made for.
    pub account_id: u128,
    /// Signed position size change (18 decimals).
    pub size_delta: i128,
    /// Settlement strategy of the market.
    pub settlement_strategy_id: u128,
    /// Worst fill price the signer accepts.
    pub acceptable_price: U256,
    /// Order may only reduce an existing position.
    pub is_reduce_only: bool,
    /// Integrator tracking code.
    pub tracking_code: B256,
    /// Referrer credited with fees.
    pub referrer: Address,
}

/// Signed conditional order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalOrder {
    pub order_details: OrderDetails,
    /// Address that signed the order.
    pub signer: Address,
    /// Caller-chosen, single use per signer.
    pub nonce: U256,
    /// Only execute for verified accounts.
    pub require_verified: bool,
    /// Only executor allowed to submit; zero allows anyone.
    pub trusted_executor: Address,
    /// Upper bound on the fee the executor may charge.
    pub max_executor_fee: U256,
    /// `target ++ calldata` predicates, evaluated in order.
    pub conditions: Vec<Bytes>,
}

impl ConditionalOrder {
    /// Create a builder for a conditional order.
    pub fn builder() -> ConditionalOrderBuilder {
        ConditionalOrderBuilder::new()
    }

    /// Whether any executor may submit this order.
    pub fn is_executor_unrestricted(&self) -> bool {
        self.trusted_executor == Address::ZERO
    }
}

/// Builder for conditional orders with a fluent API.
#[derive(Debug, Clone)]
pub struct ConditionalOrderBuilder {
    market_id: Option<u128>,
    account_id: Option<u128>,
    size_delta: i128,
    settlement_strategy_id: u128,
    acceptable_price: U256,
    is_reduce_only: bool,
    tracking_code: B256,
    referrer: Address,
    signer: Option<Address>,
    nonce: U256,
    require_verified: bool,
    trusted_executor: Address,
    max_executor_fee: U256,
    conditions: Vec<Bytes>,
}

impl ConditionalOrderBuilder {
    /// Create a new builder.
    ///
    /// Acceptable price and executor fee default to unbounded, the executor to
    /// unrestricted.
    pub fn new() -> Self {
        Self {
            market_id: None,
            account_id: None,
            size_delta: 0,
            settlement_strategy_id: 0,
            acceptable_price: U256::MAX,
            is_reduce_only: false,
            tracking_code: B256::ZERO,
            referrer: Address::ZERO,
            signer: None,
            nonce: U256::ZERO,
            require_verified: false,
            trusted_executor: Address::ZERO,
            max_executor_fee: U256::MAX,
            conditions: Vec::new(),
        }
    }

    pub fn market_id(mut self, market_id: u128) -> Self {
        self.market_id = Some(market_id);
        self
    }

    pub fn account_id(mut self, account_id: u128) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn size_delta(mut self, size_delta: i128) -> Self {
        self.size_delta = size_delta;
        self
    }

    pub fn settlement_strategy_id(mut self, id: u128) -> Self {
        self.settlement_strategy_id = id;
        self
    }

    pub fn acceptable_price(mut self, price: U256) -> Self {
        self.acceptable_price = price;
        self
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.is_reduce_only = reduce_only;
        self
    }

    pub fn tracking_code(mut self, code: B256) -> Self {
        self.tracking_code = code;
        self
    }

    pub fn referrer(mut self, referrer: Address) -> Self {
        self.referrer = referrer;
        self
    }

    pub fn signer(mut self, signer: Address) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn require_verified(mut self, require: bool) -> Self {
        self.require_verified = require;
        self
    }

    pub fn trusted_executor(mut self, executor: Address) -> Self {
        self.trusted_executor = executor;
        self
    }

    pub fn max_executor_fee(mut self, fee: U256) -> Self {
        self.max_executor_fee = fee;
        self
    }

    /// Append an already encoded condition entry.
    pub fn raw_condition(mut self, condition: impl Into<Bytes>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Append a condition calling `target` with `calldata`.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition.encode());
        self
    }

    /// Build the order.
    ///
    /// Returns None if market, account or signer is missing.
    pub fn build(self) -> Option<ConditionalOrder> {
        Some(ConditionalOrder {
            order_details: OrderDetails {
                market_id: self.market_id?,
                account_id: self.account_id?,
                size_delta: self.size_delta,
                settlement_strategy_id: self.settlement_strategy_id,
                acceptable_price: self.acceptable_price,
                is_reduce_only: self.is_reduce_only,
                tracking_code: self.tracking_code,
                referrer: self.referrer,
            },
            signer: self.signer?,
            nonce: self.nonce,
            require_verified: self.require_verified,
            trusted_executor: self.trusted_executor,
            max_executor_fee: self.max_executor_fee,
            conditions: self.conditions,
        })
    }
}

impl Default for ConditionalOrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
