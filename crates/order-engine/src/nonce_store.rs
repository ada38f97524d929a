//! Nonce registry: which `(signer, nonce)` pairs have been consumed.

use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// An open claim on one `(signer, nonce)` pair.
///
/// While it is held, every other claim on the same pair waits. Committing
/// records the pair as consumed; dropping or rolling back leaves no record.
#[async_trait]
pub trait NonceReservation: Send {
    /// Record the pair as consumed.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Give the pair back unconsumed.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage backend for consumed nonces.
///
/// Entries are only ever added. Of any number of concurrent claims on the same
/// pair, at most one commits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Whether the pair has been consumed.
    async fn is_used(&self, signer: Address, nonce: U256) -> Result<bool>;

    /// Claim the pair, waiting out any open reservation on it.
    ///
    /// Returns `None` if the pair is already consumed.
    async fn reserve(
        &self,
        signer: Address,
        nonce: U256,
    ) -> Result<Option<Box<dyn NonceReservation>>>;

    /// Mark the pair consumed immediately. Returns `false` if it already was.
    async fn consume(&self, signer: Address, nonce: U256) -> Result<bool>;
}

type NonceKey = (Address, U256);

/// In-memory nonce store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    used: Arc<DashMap<NonceKey, DateTime<Utc>>>,
    claims: DashMap<NonceKey, Arc<Mutex<()>>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the pair was consumed, if it was.
    pub fn consumed_at(&self, signer: Address, nonce: U256) -> Option<DateTime<Utc>> {
        self.used.get(&(signer, nonce)).map(|entry| *entry.value())
    }

    /// Number of consumed pairs.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

struct MemoryReservation {
    key: NonceKey,
    used: Arc<DashMap<NonceKey, DateTime<Utc>>>,
    _claim: OwnedMutexGuard<()>,
}

#[async_trait]
impl NonceReservation for MemoryReservation {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.used.insert(self.key, Utc::now());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn is_used(&self, signer: Address, nonce: U256) -> Result<bool> {
        Ok(self.used.contains_key(&(signer, nonce)))
    }

    async fn reserve(
        &self,
        signer: Address,
        nonce: U256,
    ) -> Result<Option<Box<dyn NonceReservation>>> {
        let key = (signer, nonce);
        let claim = self.claims.entry(key).or_default().value().clone();
        let claim = claim.lock_owned().await;

        if self.used.contains_key(&key) {
            return Ok(None);
        }

        Ok(Some(Box::new(MemoryReservation {
            key,
            used: self.used.clone(),
            _claim: claim,
        })))
    }

    async fn consume(&self, signer: Address, nonce: U256) -> Result<bool> {
        match self.reserve(signer, nonce).await? {
            Some(reservation) => {
                reservation.commit().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
