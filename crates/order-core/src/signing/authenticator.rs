//! Signature authentication for conditional orders.

use alloy_primitives::{Address, B256};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::domain::Domain;
use super::recovery::{EcdsaRecoverer, SignatureError, SignatureRecoverer};
use crate::types::ConditionalOrder;

/// Why an order's signature did not authenticate its declared signer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("malformed signature: {0}")]
    Malformed(#[from] SignatureError),

    #[error("signature recovers to {recovered}, order declares {expected}")]
    SignerMismatch { expected: Address, recovered: Address },
}

/// Authenticates orders against one bound domain.
#[derive(Clone)]
pub struct SignatureAuthenticator {
    domain: Domain,
    recoverer: Arc<dyn SignatureRecoverer>,
}

impl SignatureAuthenticator {
    /// Authenticator using secp256k1 recovery.
    pub fn new(domain: Domain) -> Self {
        Self::with_recoverer(domain, Arc::new(EcdsaRecoverer))
    }

    /// Authenticator with an injected recoverer.
    pub fn with_recoverer(domain: Domain, recoverer: Arc<dyn SignatureRecoverer>) -> Self {
        Self { domain, recoverer }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Final EIP-712 digest of `order` under this domain.
    pub fn signing_digest(&self, order: &ConditionalOrder) -> B256 {
        order.signing_hash(&self.domain)
    }

    /// Recover the address that signed `order`.
    pub fn recover(
        &self,
        order: &ConditionalOrder,
        signature: &[u8],
    ) -> Result<Address, SignatureError> {
        self.recoverer.recover(self.signing_digest(order), signature)
    }

    /// Check that `signature` was produced by the order's declared signer.
    pub fn authenticate(
        &self,
        order: &ConditionalOrder,
        signature: &[u8],
    ) -> Result<(), AuthenticationError> {
        let recovered = self.recover(order, signature)?;
        if recovered != order.signer {
            debug!(
                expected = %order.signer,
                recovered = %recovered,
                "Signature recovered to a different signer"
            );
            return Err(AuthenticationError::SignerMismatch {
                expected: order.signer,
                recovered,
            });
        }
        Ok(())
    }

    /// Whether `signature` is valid for exactly this order under this domain.
    pub fn verify_signature(&self, order: &ConditionalOrder, signature: &[u8]) -> bool {
        self.authenticate(order, signature).is_ok()
    }

    /// Verify a signature over a precomputed digest.
    pub fn verify_hash(&self, digest: B256, signature: &[u8], expected: Address) -> bool {
        matches!(self.recoverer.recover(digest, signature), Ok(signer) if signer == expected)
    }
}

impl std::fmt::Debug for SignatureAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureAuthenticator")
            .field("domain", &self.domain.name())
            .field("verifying_contract", &self.domain.verifying_contract())
            .finish()
    }
}
