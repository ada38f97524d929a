//! Order signing for conditional orders.
//!
//! Signs the EIP-712 digest of a [`ConditionalOrder`] with a local key. Used by
//! clients preparing orders and by tests exercising the engine end to end.

use alloy_primitives::{Address, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;

use super::domain::Domain;
use super::order_types::SignedConditionalOrder;
use crate::types::{ConditionalOrder, ConditionalOrderBuilder};
use crate::{Error, Result};

/// Signs conditional orders for one domain.
#[derive(Clone)]
pub struct OrderSigner {
    signer: PrivateKeySigner,
    domain: Domain,
}

impl OrderSigner {
    pub fn new(signer: PrivateKeySigner, domain: Domain) -> Self {
        Self { signer, domain }
    }

    /// Create a signer from a hex private key, with or without `0x`.
    pub fn from_private_key(private_key: &str, domain: Domain) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim_start_matches("0x")).map_err(
            |e| Error::Signing {
                message: format!("invalid private key: {}", e),
            },
        )?;
        Ok(Self::new(signer, domain))
    }

    /// Get the signer's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Get an order builder pre-configured with this signer.
    pub fn order_builder(&self) -> ConditionalOrderBuilder {
        ConditionalOrder::builder().signer(self.address())
    }

    /// Sign an order and return it ready for submission.
    ///
    /// Fails if the order declares a different signer, since the engine would
    /// reject the signature anyway.
    pub async fn sign_order(&self, order: &ConditionalOrder) -> Result<SignedConditionalOrder> {
        if order.signer != self.address() {
            return Err(Error::Signing {
                message: format!(
                    "order declares signer {} but key belongs to {}",
                    order.signer,
                    self.address()
                ),
            });
        }

        let signature = self.sign_digest(order.signing_hash(&self.domain)).await?;
        Ok(SignedConditionalOrder::new(order.clone(), &signature))
    }

    /// Sign a raw digest, returning `r ++ s ++ v` with `v` in {27, 28}.
    pub async fn sign_digest(&self, digest: B256) -> Result<Vec<u8>> {
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| Error::Signing {
                message: format!("failed to sign order: {}", e),
            })?;

        Ok(signature.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSigner")
            .field("address", &format!("{:?}", self.address()))
            .field("domain", &self.domain.name())
            .finish()
    }
}
