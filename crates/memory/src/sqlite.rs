//! SQLite profile store.
//!
//! One row per `(user_id, field)` in `profile_fields`, the value stored as
//! JSON text. Upserts keep `updated_at` current.

use async_trait::async_trait;
use chrono::Utc;
use maitre_core::error::ProfileError;
use maitre_core::profile::{ProfileField, ProfileStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    /// Open (or create) the database at `path`.
    ///
    /// `"sqlite::memory:"` gives an ephemeral database on a single connection.
    pub async fn new(path: &str) -> Result<Self, ProfileError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| ProfileError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ProfileError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite profile store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, ProfileError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), ProfileError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_fields (
                user_id     TEXT NOT NULL,
                field       TEXT NOT NULL,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, field)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ProfileError::MigrationFailed(format!("profile_fields table: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(
        &self,
        user_id: &str,
        field: ProfileField,
    ) -> Result<Option<serde_json::Value>, ProfileError> {
        let row = sqlx::query("SELECT value FROM profile_fields WHERE user_id = ? AND field = ?")
            .bind(user_id)
            .bind(field.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProfileError::QueryFailed(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("value")
            .map_err(|e| ProfileError::QueryFailed(e.to_string()))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ProfileError::InvalidValue {
                field: field.as_str().to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(
        &self,
        user_id: &str,
        field: ProfileField,
        value: serde_json::Value,
    ) -> Result<(), ProfileError> {
        sqlx::query(
            r#"
            INSERT INTO profile_fields (user_id, field, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, field) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(field.as_str())
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ProfileError::QueryFailed(e.to_string()))?;
        Ok(())
    }
}
