//! Published typed-data schema.
//!
//! Off-chain signing tools (wallets calling `eth_signTypedData_v4`) need the
//! same field table the verifier hashes with. The documents here are generated
//! from the descriptors in [`super::order_types`], so they cannot drift.

use serde_json::{json, Map, Value};

use super::domain::Domain;
use super::order_types::{CONDITIONAL_ORDER_TYPE, ORDER_DETAILS_TYPE};
use super::typed_data::{FieldDescriptor, FieldType, TypeDescriptor};
use crate::types::ConditionalOrder;

/// Bumped whenever a field is added, removed, renamed or reordered.
pub const SCHEMA_VERSION: &str = "1";

/// Primary type signers sign.
pub const PRIMARY_TYPE: &str = "ConditionalOrder";

/// Layout of the domain struct.
pub static EIP712_DOMAIN_TYPE: TypeDescriptor = TypeDescriptor {
    name: "EIP712Domain",
    fields: &[
        FieldDescriptor::new("name", FieldType::String),
        FieldDescriptor::new("version", FieldType::String),
        FieldDescriptor::new("chainId", FieldType::Uint(256)),
        FieldDescriptor::new("verifyingContract", FieldType::Address),
    ],
};

fn fields_json(descriptor: &TypeDescriptor) -> Value {
    Value::Array(
        descriptor
            .fields
            .iter()
            .map(|field| json!({ "name": field.name, "type": field.kind.to_string() }))
            .collect(),
    )
}

/// The EIP-712 `types` table for conditional orders.
pub fn types_json() -> Value {
    let mut types = Map::new();
    for descriptor in [&EIP712_DOMAIN_TYPE, &CONDITIONAL_ORDER_TYPE, &ORDER_DETAILS_TYPE] {
        types.insert(descriptor.name.to_string(), fields_json(descriptor));
    }
    Value::Object(types)
}

/// Versioned schema document: `types`, `primaryType` and `version`.
pub fn typed_data_schema() -> Value {
    json!({
        "version": SCHEMA_VERSION,
        "primaryType": PRIMARY_TYPE,
        "types": types_json(),
    })
}

/// Full `eth_signTypedData_v4` payload for `order` under `domain`.
///
/// Integers are rendered as decimal strings so 128 and 256-bit values survive
/// JavaScript number parsing.
pub fn typed_data_request(domain: &Domain, order: &ConditionalOrder) -> Value {
    let details = &order.order_details;
    json!({
        "types": types_json(),
        "primaryType": PRIMARY_TYPE,
        "domain": {
            "name": domain.name(),
            "version": domain.version(),
            "chainId": domain.chain_id().to_string(),
            "verifyingContract": domain.verifying_contract().to_checksum(None),
        },
        "message": {
            "orderDetails": {
                "marketId": details.market_id.to_string(),
                "accountId": details.account_id.to_string(),
                "sizeDelta": details.size_delta.to_string(),
                "settlementStrategyId": details.settlement_strategy_id.to_string(),
                "acceptablePrice": details.acceptable_price.to_string(),
                "isReduceOnly": details.is_reduce_only,
                "trackingCode": details.tracking_code.to_string(),
                "referrer": details.referrer.to_checksum(None),
            },
            "signer": order.signer.to_checksum(None),
            "nonce": order.nonce.to_string(),
            "requireVerified": order.require_verified,
            "trustedExecutor": order.trusted_executor.to_checksum(None),
            "maxExecutorFee": order.max_executor_fee.to_string(),
            "conditions": order
                .conditions
                .iter()
                .map(|condition| condition.to_string())
                .collect::<Vec<_>>(),
        },
    })
}
