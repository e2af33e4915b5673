use crate::settings::Database;
use crate::types::{NewAddress, ResolutionMethod, WatchedAddress};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, Pool, Postgres, Row};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "addr_monitor";

/// Persistence used by the refresh runner: which addresses to refresh next, and where
/// resolved balances go.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Up to `limit` addresses, never-resolved first, then least recently resolved.
    async fn list_pending(&self, limit: usize) -> Result<Vec<WatchedAddress>>;

    async fn get_address(&self, id: i64) -> Result<Option<WatchedAddress>>;

    async fn write_balance(
        &self,
        id: i64,
        balance: Decimal,
        at: DateTime<Utc>,
        method: ResolutionMethod,
    ) -> Result<()>;
}

/// Watch-list totals.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub count: i64,
    pub total_balance: Decimal,
}

pub async fn connect(config: &Database) -> Result<DbPool> {
    let database_url = config
        .url
        .clone()
        .context("database url missing: set DATABASE_URL or [database] url")?;
    let max_connections = config.max_connections.max(1);

    // 200ms, 400ms, 800ms, ... capped at ~12.8s
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(100)
        .max_delay(Duration::from_millis(12_800))
        .map(jitter)
        .take(config.connect_attempts.saturating_sub(1));

    let pool = Retry::spawn(strategy, || {
        let database_url = database_url.clone();
        async move {
            let attempt = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&database_url)
                .await;
            if let Err(e) = &attempt {
                log::warn!("DB connect attempt failed: {}", e);
            }
            attempt
        }
    })
    .await
    .context("could not connect to database")?;

    log::info!("✅ Successfully connected to database.");
    initialize_database(&pool).await?;
    Ok(pool)
}

pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x4144_444D_4F4E_4954; // "ADDMONIT"

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.addresses (
            id BIGSERIAL PRIMARY KEY,
            label TEXT NOT NULL,
            address TEXT NOT NULL UNIQUE,
            balance NUMERIC(24, 8) NOT NULL DEFAULT 0,
            method TEXT,
            last_updated TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_addresses_last_updated
         ON {}.addresses (last_updated ASC NULLS FIRST)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    tx.commit().await?;
    log::info!("Database initialization complete.");
    Ok(())
}

fn address_from_row(row: &PgRow) -> Result<WatchedAddress> {
    Ok(WatchedAddress {
        id: row.try_get("id")?,
        label: row.try_get("label")?,
        address: row.try_get("address")?,
        balance: row.try_get("balance")?,
        method: row.try_get("method")?,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}

const ADDRESS_COLUMNS: &str = "id, label, address, balance, method, last_updated, created_at";

/// Postgres-backed watch-list.
#[derive(Clone)]
pub struct PgBalanceStore {
    pool: DbPool,
}

impl PgBalanceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Database) -> Result<Self> {
        Ok(Self::new(connect(config).await?))
    }

    /// Inserts new entries, ignoring addresses already watched. Returns how many were added.
    pub async fn add_addresses(&self, entries: &[NewAddress]) -> Result<u64> {
        let mut added = 0;
        for entry in entries {
            let result = sqlx::query(&format!(
                "INSERT INTO {}.addresses (label, address) VALUES ($1, $2)
                 ON CONFLICT (address) DO NOTHING",
                SCHEMA
            ))
            .bind(&entry.label)
            .bind(&entry.address)
            .execute(&self.pool)
            .await?;
            added += result.rows_affected();
        }
        Ok(added)
    }

    /// Whole watch-list, newest first.
    pub async fn list_addresses(&self) -> Result<Vec<WatchedAddress>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {}.addresses ORDER BY created_at DESC, id DESC",
            ADDRESS_COLUMNS, SCHEMA
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(address_from_row).collect()
    }

    /// Returns whether a row was deleted.
    pub async fn delete_address(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {}.addresses WHERE id = $1", SCHEMA))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count, COALESCE(SUM(balance), 0) AS total FROM {}.addresses",
            SCHEMA
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            count: row.try_get("count")?,
            total_balance: row.try_get("total")?,
        })
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn list_pending(&self, limit: usize) -> Result<Vec<WatchedAddress>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {}.addresses
             ORDER BY last_updated ASC NULLS FIRST, id ASC
             LIMIT $1",
            ADDRESS_COLUMNS, SCHEMA
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(address_from_row).collect()
    }

    async fn get_address(&self, id: i64) -> Result<Option<WatchedAddress>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {}.addresses WHERE id = $1",
            ADDRESS_COLUMNS, SCHEMA
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(address_from_row).transpose()
    }

    async fn write_balance(
        &self,
        id: i64,
        balance: Decimal,
        at: DateTime<Utc>,
        method: ResolutionMethod,
    ) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {}.addresses SET balance = $1, method = $2, last_updated = $3 WHERE id = $4",
            SCHEMA
        ))
        .bind(balance)
        .bind(method.label())
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
