//! EIP-712 layout of conditional orders.
//!
//! Field order here is the wire contract with off-chain signers; changing it
//! invalidates every outstanding signature.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use super::domain::Domain;
use super::typed_data::{
    encode_address, encode_bool, encode_bytes32, encode_bytes_array, encode_int128, encode_u128,
    encode_uint, signing_digest, type_hash, FieldDescriptor, FieldType, TypeDescriptor,
    TypedStruct,
};
use crate::types::{ConditionalOrder, OrderDetails};
use crate::{Error, Result};

/// Layout of the nested `OrderDetails` struct.
pub static ORDER_DETAILS_TYPE: TypeDescriptor = TypeDescriptor {
    name: "OrderDetails",
    fields: &[
        FieldDescriptor::new("marketId", FieldType::Uint(128)),
        FieldDescriptor::new("accountId", FieldType::Uint(128)),
        FieldDescriptor::new("sizeDelta", FieldType::Int(128)),
        FieldDescriptor::new("settlementStrategyId", FieldType::Uint(128)),
        FieldDescriptor::new("acceptablePrice", FieldType::Uint(256)),
        FieldDescriptor::new("isReduceOnly", FieldType::Bool),
        FieldDescriptor::new("trackingCode", FieldType::FixedBytes(32)),
        FieldDescriptor::new("referrer", FieldType::Address),
    ],
};

/// Layout of the top-level `ConditionalOrder` struct.
pub static CONDITIONAL_ORDER_TYPE: TypeDescriptor = TypeDescriptor {
    name: "ConditionalOrder",
    fields: &[
        FieldDescriptor::new("orderDetails", FieldType::Struct(&ORDER_DETAILS_TYPE)),
        FieldDescriptor::new("signer", FieldType::Address),
        FieldDescriptor::new("nonce", FieldType::Uint(256)),
        FieldDescriptor::new("requireVerified", FieldType::Bool),
        FieldDescriptor::new("trustedExecutor", FieldType::Address),
        FieldDescriptor::new("maxExecutorFee", FieldType::Uint(256)),
        FieldDescriptor::new("conditions", FieldType::Array(&FieldType::Bytes)),
    ],
};

static ORDER_DETAILS_TYPE_HASH: LazyLock<B256> =
    LazyLock::new(|| type_hash(&ORDER_DETAILS_TYPE));

static CONDITIONAL_ORDER_TYPE_HASH: LazyLock<B256> =
    LazyLock::new(|| type_hash(&CONDITIONAL_ORDER_TYPE));

impl TypedStruct for OrderDetails {
    fn descriptor() -> &'static TypeDescriptor {
        &ORDER_DETAILS_TYPE
    }

    fn type_hash() -> B256 {
        *ORDER_DETAILS_TYPE_HASH
    }

    fn encode_data(&self) -> Vec<B256> {
        vec![
            encode_u128(self.market_id),
            encode_u128(self.account_id),
            encode_int128(self.size_delta),
            encode_u128(self.settlement_strategy_id),
            encode_uint(self.acceptable_price),
            encode_bool(self.is_reduce_only),
            encode_bytes32(self.tracking_code),
            encode_address(self.referrer),
        ]
    }
}

impl TypedStruct for ConditionalOrder {
    fn descriptor() -> &'static TypeDescriptor {
        &CONDITIONAL_ORDER_TYPE
    }

    fn type_hash() -> B256 {
        *CONDITIONAL_ORDER_TYPE_HASH
    }

    fn encode_data(&self) -> Vec<B256> {
        vec![
            self.order_details.struct_hash(),
            encode_address(self.signer),
            encode_uint(self.nonce),
            encode_bool(self.require_verified),
            encode_address(self.trusted_executor),
            encode_uint(self.max_executor_fee),
            encode_bytes_array(&self.conditions),
        ]
    }
}

impl ConditionalOrder {
    /// The digest a signer signs for this order under `domain`.
    pub fn signing_hash(&self, domain: &Domain) -> B256 {
        let struct_hash = self.struct_hash();
        let digest = signing_digest(domain.separator(), struct_hash);

        debug!(
            signer = %self.signer,
            nonce = %self.nonce,
            struct_hash = %struct_hash,
            digest = %digest,
            "Computed conditional order digest"
        );

        digest
    }
}

/// A signed order ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedConditionalOrder {
    pub order: ConditionalOrder,
    /// 65-byte `r ++ s ++ v` signature as 0x-prefixed hex.
    pub signature: String,
}

impl SignedConditionalOrder {
    pub fn new(order: ConditionalOrder, signature: &[u8]) -> Self {
        Self {
            order,
            signature: format!("0x{}", hex::encode(signature)),
        }
    }

    /// Decode the hex signature.
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(self.signature.trim_start_matches("0x")).map_err(|e| Error::Signing {
            message: format!("signature is not valid hex: {}", e),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
