//! PostgreSQL storage backend for the nonce registry.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::nonce_store::{NonceReservation, NonceStore};

const INSERT_NONCE: &str = r#"
    INSERT INTO conditional_order_nonces (signer, nonce, consumed_at)
    VALUES ($1, $2, $3)
    ON CONFLICT (signer, nonce) DO NOTHING
"#;

/// PostgreSQL-backed nonce store.
///
/// Rows live in `conditional_order_nonces`. A reservation is an open
/// transaction holding the uncommitted row, so a competing insert for the same
/// `(signer, nonce)` key in any engine process waits until it commits or rolls
/// back.
#[derive(Debug, Clone)]
pub struct PostgresNonceStore {
    pool: PgPool,
}

impl PostgresNonceStore {
    /// Create a new PostgreSQL nonce store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and apply the bundled migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to nonce database")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run nonce migrations")?;

        Ok(Self::new(pool))
    }

    /// When the pair was consumed, if it was.
    pub async fn consumed_at(&self, signer: Address, nonce: U256) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT consumed_at FROM conditional_order_nonces
            WHERE signer = $1 AND nonce = $2
            "#,
        )
        .bind(signer_key(signer))
        .bind(nonce_key(nonce))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read nonce")?;

        Ok(row.map(|(at,)| at))
    }
}

fn signer_key(signer: Address) -> Vec<u8> {
    signer.as_slice().to_vec()
}

fn nonce_key(nonce: U256) -> Vec<u8> {
    nonce.to_be_bytes::<32>().to_vec()
}

#[async_trait]
impl NonceStore for PostgresNonceStore {
    async fn is_used(&self, signer: Address, nonce: U256) -> Result<bool> {
        let (used,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conditional_order_nonces
                WHERE signer = $1 AND nonce = $2
            )
            "#,
        )
        .bind(signer_key(signer))
        .bind(nonce_key(nonce))
        .fetch_one(&self.pool)
        .await
        .context("Failed to check nonce")?;

        Ok(used)
    }

    async fn reserve(
        &self,
        signer: Address,
        nonce: U256,
    ) -> Result<Option<Box<dyn NonceReservation>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open nonce transaction")?;

        let result = sqlx::query(INSERT_NONCE)
            .bind(signer_key(signer))
            .bind(nonce_key(nonce))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to reserve nonce")?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("Failed to close nonce transaction")?;
            return Ok(None);
        }

        Ok(Some(Box::new(PgReservation { tx })))
    }

    async fn consume(&self, signer: Address, nonce: U256) -> Result<bool> {
        let result = sqlx::query(INSERT_NONCE)
            .bind(signer_key(signer))
            .bind(nonce_key(nonce))
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to consume nonce")?;

        Ok(result.rows_affected() == 1)
    }
}

struct PgReservation {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl NonceReservation for PgReservation {
    async fn commit(self: Box<Self>) -> Result<()> {
        let PgReservation { tx } = *self;
        tx.commit().await.context("Failed to commit nonce")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgReservation { tx } = *self;
        tx.rollback().await.context("Failed to roll back nonce")
    }
}
