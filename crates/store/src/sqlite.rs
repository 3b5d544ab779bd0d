//! SQLite backend.
//!
//! Uses a single database file with three tables:
//! - `settings`: JSON values keyed by setting name
//! - `generation_logs`: append-only audit records (full entry stored as JSON)
//! - `quota_counters`: guarded counters
//!
//! The guarded increment is a single conditional `UPDATE`, so concurrent
//! writers are serialized by SQLite and can never push a counter past its
//! ceiling.

use async_trait::async_trait;
use chrono::Utc;
use prepwise_core::error::StoreError;
use prepwise_core::log::{GenerationLogEntry, LogSink};
use prepwise_core::store::{CounterStore, IncrementOutcome, SettingsStore};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

fn backend(context: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

/// SQLite-backed settings, generation log and counters.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Backend(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key         TEXT PRIMARY KEY NOT NULL,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("settings table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generation_logs (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                action      TEXT NOT NULL,
                model       TEXT NOT NULL,
                status      TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                entry       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("generation_logs table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_generation_logs_action ON generation_logs(action)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("action index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quota_counters (
                key         TEXT PRIMARY KEY NOT NULL,
                used        INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("quota_counters table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("settings get"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value").map_err(backend("settings value"))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend("settings set"))?;
        Ok(())
    }
}

#[async_trait]
impl LogSink for SqliteStore {
    async fn append(&self, entry: GenerationLogEntry) -> Result<(), StoreError> {
        let json = serde_json::to_string(&entry).map_err(|e| StoreError::Malformed {
            key: entry.id.clone(),
            reason: e.to_string(),
        })?;
        let status = match entry.status {
            prepwise_core::log::LogStatus::Success => "success",
            prepwise_core::log::LogStatus::Error => "error",
        };

        sqlx::query(
            r#"
            INSERT INTO generation_logs (id, action, model, status, created_at, entry)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.action)
        .bind(&entry.model)
        .bind(status)
        .bind(entry.created_at.to_rfc3339())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(backend("log append"))?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<GenerationLogEntry>, StoreError> {
        let rows = sqlx::query("SELECT id, entry FROM generation_logs ORDER BY iid DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(backend("log recent"))?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(backend("log id"))?;
                let raw: String = row.try_get("entry").map_err(backend("log entry"))?;
                serde_json::from_str(&raw).map_err(|e| StoreError::Malformed {
                    key: id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn read(&self, key: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT used FROM quota_counters WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("counter read"))?;

        match row {
            Some(row) => {
                let used: i64 = row.try_get("used").map_err(backend("counter used"))?;
                Ok(used.max(0) as u64)
            }
            None => Ok(0),
        }
    }

    async fn try_increment(
        &self,
        key: &str,
        units: u64,
        ceiling: u64,
    ) -> Result<IncrementOutcome, StoreError> {
        let now = Utc::now().to_rfc3339();
        let units = i64::try_from(units)
            .map_err(|_| StoreError::Backend(format!("increment of {units} is out of range")))?;
        let ceiling = i64::try_from(ceiling).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO quota_counters (key, used, updated_at) VALUES (?, 0, ?) ON CONFLICT(key) DO NOTHING",
        )
        .bind(key)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend("counter insert"))?;

        let applied = sqlx::query(
            r#"
            UPDATE quota_counters SET used = used + ?1, updated_at = ?2
            WHERE key = ?3 AND used + ?1 <= ?4
            RETURNING used
            "#,
        )
        .bind(units)
        .bind(&now)
        .bind(key)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend("counter increment"))?;

        match applied {
            Some(row) => {
                let used: i64 = row.try_get("used").map_err(backend("counter used"))?;
                Ok(IncrementOutcome::Applied {
                    used: used.max(0) as u64,
                })
            }
            None => Ok(IncrementOutcome::Rejected {
                used: self.read(key).await?,
            }),
        }
    }
}
