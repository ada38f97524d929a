//! Condition wire format.
//!
//! Each entry of `ConditionalOrder::conditions` is the 20-byte address of the
//! predicate target followed by the calldata passed to it.

use alloy_primitives::{Address, Bytes};

use crate::{Error, Result};

/// Length of the target prefix.
pub const TARGET_LEN: usize = 20;

/// A decoded condition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub target: Address,
    pub calldata: Bytes,
}

impl Condition {
    pub fn new(target: Address, calldata: impl Into<Bytes>) -> Self {
        Self {
            target,
            calldata: calldata.into(),
        }
    }

    /// `target ++ calldata`.
    pub fn encode(&self) -> Bytes {
        let mut raw = Vec::with_capacity(TARGET_LEN + self.calldata.len());
        raw.extend_from_slice(self.target.as_slice());
        raw.extend_from_slice(&self.calldata);
        Bytes::from(raw)
    }

    /// Split a raw entry into target and calldata.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < TARGET_LEN {
            return Err(Error::Condition {
                message: format!(
                    "entry is {} bytes, shorter than the {}-byte target",
                    raw.len(),
                    TARGET_LEN
                ),
            });
        }

        let (target, calldata) = raw.split_at(TARGET_LEN);
        Ok(Self {
            target: Address::from_slice(target),
            calldata: Bytes::copy_from_slice(calldata),
        })
    }
}
