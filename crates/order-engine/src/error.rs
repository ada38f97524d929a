//! Rejection reasons and engine errors.
//!
//! A [`Rejection`] is a business outcome: the order was looked at and refused.
//! An [`EngineError`] wraps it together with infrastructure failures (store,
//! collaborators, market) so callers can tell "order is bad" from "engine is
//! unhealthy".

use alloy_primitives::{Address, U256};
use order_core::signing::{AuthenticationError, SignatureError};
use serde::Serialize;
use thiserror::Error;

use crate::collaborators::MarketError;

/// Why a condition entry did not pass.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "target")]
pub enum ConditionFailure {
    #[error("entry is shorter than a target address")]
    Malformed,

    #[error("no condition target registered at {0}")]
    UnknownTarget(Address),

    #[error("predicate evaluated false")]
    NotSatisfied,
}

/// Coarse classification of rejections, used by keepers to decide whether to
/// retry an order later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    /// Wrong length, bad recovery id, high `s`, zero-address recovery.
    MalformedSignature,
    /// Valid signature from someone other than the declared signer.
    SignerMismatch,
    /// Nonce already consumed.
    NonceReplay,
    /// Verified-account, permission, executor or fee gate.
    AuthorizationGate,
    /// A predicate did not hold yet.
    ConditionNotMet,
    /// The signed content can never pass (too many or undecodable conditions).
    InvalidOrder,
}

impl RejectionCategory {
    /// Whether the same signed order may pass later without being re-signed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RejectionCategory::AuthorizationGate | RejectionCategory::ConditionNotMet
        )
    }
}

/// A named reason an order was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("malformed signature: {0}")]
    MalformedSignature(SignatureError),

    #[error("signature recovers to {recovered}, order declares {expected}")]
    SignerMismatch { expected: Address, recovered: Address },

    #[error("nonce {nonce} already used by {signer}")]
    NonceReused { signer: Address, nonce: U256 },

    #[error("account {account_id} is not verified")]
    UnverifiedAccount { account_id: u128 },

    #[error("{signer} is not permitted to trade account {account_id}")]
    UnauthorizedSigner { signer: Address, account_id: u128 },

    #[error("executor {executor} is not the trusted executor {trusted}")]
    UnauthorizedExecutor { executor: Address, trusted: Address },

    #[error("executor fee {fee} exceeds cap {max}")]
    FeeCapExceeded { fee: U256, max: U256 },

    #[error("order carries {count} conditions, limit is {max}")]
    TooManyConditions { count: usize, max: usize },

    #[error("condition {index} failed: {reason}")]
    ConditionFailed {
        index: usize,
        reason: ConditionFailure,
    },
}

impl Rejection {
    pub fn category(&self) -> RejectionCategory {
        match self {
            Rejection::MalformedSignature(_) => RejectionCategory::MalformedSignature,
            Rejection::SignerMismatch { .. } => RejectionCategory::SignerMismatch,
            Rejection::NonceReused { .. } => RejectionCategory::NonceReplay,
            Rejection::UnverifiedAccount { .. }
            | Rejection::UnauthorizedSigner { .. }
            | Rejection::UnauthorizedExecutor { .. }
            | Rejection::FeeCapExceeded { .. } => RejectionCategory::AuthorizationGate,
            Rejection::TooManyConditions { .. } => RejectionCategory::InvalidOrder,
            Rejection::ConditionFailed { reason, .. } => match reason {
                ConditionFailure::Malformed => RejectionCategory::InvalidOrder,
                ConditionFailure::UnknownTarget(_) | ConditionFailure::NotSatisfied => {
                    RejectionCategory::ConditionNotMet
                }
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<AuthenticationError> for Rejection {
    fn from(err: AuthenticationError) -> Self {
        match err {
            AuthenticationError::Malformed(e) => Rejection::MalformedSignature(e),
            AuthenticationError::SignerMismatch {
                expected,
                recovered,
            } => Rejection::SignerMismatch {
                expected,
                recovered,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("order rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("market rejected commitment: {0}")]
    Market(#[from] MarketError),

    #[error("nonce store error: {0:#}")]
    Store(anyhow::Error),

    #[error("collaborator error: {0:#}")]
    Collaborator(anyhow::Error),

    #[error(transparent)]
    Core(#[from] order_core::Error),
}

impl EngineError {
    /// The business rejection, if this error is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
