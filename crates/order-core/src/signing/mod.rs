//! EIP-712 hashing, signing and signer recovery for conditional orders.
//!
//! # Architecture
//!
//! ```text
//! OrderSigner ─── signs ──► SignedConditionalOrder
//!                                   │
//!                                   ▼
//!   Domain ──► signing_digest ◄── hashStruct(ConditionalOrder)
//!                   │
//!                   ▼
//!         SignatureAuthenticator ─── SignatureRecoverer ──► signer address
//! ```
//!
//! # Example
//!
//! ```ignore
//! use order_core::signing::{Domain, OrderSigner, SignatureAuthenticator};
//!
//! let domain = Domain::new("SMv3: OrderBook", "1", 31337, engine_address)?;
//! let signer = OrderSigner::from_private_key("0x...", domain.clone())?;
//!
//! let order = signer
//!     .order_builder()
//!     .market_id(200)
//!     .account_id(account_id)
//!     .size_delta(1_000_000_000_000_000_000)
//!     .build()
//!     .unwrap();
//!
//! let signed = signer.sign_order(&order).await?;
//! let auth = SignatureAuthenticator::new(domain);
//! assert!(auth.verify_signature(&signed.order, &signed.signature_bytes()?));
//! ```

pub mod authenticator;
pub mod domain;
pub mod order_types;
pub mod recovery;
pub mod schema;
pub mod signer;
pub mod typed_data;

pub use authenticator::{AuthenticationError, SignatureAuthenticator};
pub use domain::{Domain, DOMAIN_TYPE, LOCAL_CHAIN_ID, OPTIMISM_CHAIN_ID};
pub use order_types::{SignedConditionalOrder, CONDITIONAL_ORDER_TYPE, ORDER_DETAILS_TYPE};
pub use recovery::{EcdsaRecoverer, SignatureError, SignatureRecoverer, SIGNATURE_LENGTH};
pub use schema::{typed_data_request, typed_data_schema, SCHEMA_VERSION};
pub use signer::OrderSigner;
pub use typed_data::{signing_digest, TypedStruct};
