use chrono::{DateTime, Utc};
use serde_json::Value;
use slate_core::{SlateError, SlateResult};
use slate_domain::CanonicalState;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SCHEMA: &str = include_str!("../schema.sql");

const KEY_BOARD: &str = "state";
pub(crate) const META_LAST_SAVE: &str = "lastSave";
pub(crate) const META_LAST_SNAPSHOT: &str = "lastSnapshot";

/// The transactional persistence tier.
///
/// The connection pool is opened lazily on first use and then reused for
/// the life of the store instance; schema creation is idempotent.
pub struct SqliteBackend {
    path: PathBuf,
    pool: tokio::sync::OnceCell<Pool<Sqlite>>,
}

impl SqliteBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pool: tokio::sync::OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Probe the backend: opens the pool and applies the schema.
    pub async fn ensure_ready(&self) -> SlateResult<()> {
        self.get_pool().await.map(|_| ())
    }

    async fn get_pool(&self) -> SlateResult<&Pool<Sqlite>> {
        self.pool
            .get_or_try_init(|| async {
                if let Some(parent) = self.path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }

                let options = SqliteConnectOptions::from_str(&format!(
                    "sqlite://{}?mode=rwc",
                    self.path.display()
                ))
                .map_err(|e| SlateError::Storage(e.to_string()))?
                .create_if_missing(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await
                    .map_err(|e| SlateError::Storage(e.to_string()))?;

                sqlx::raw_sql(SCHEMA)
                    .execute(&pool)
                    .await
                    .map_err(|e| SlateError::Storage(e.to_string()))?;

                Ok(pool)
            })
            .await
    }

    /// Write the canonical blob and the last-save time as one
    /// transaction: a crash cannot record a save without its state or
    /// vice versa.
    pub async fn save_board(&self, canonical: &CanonicalState) -> SlateResult<()> {
        let pool = self.get_pool().await?;
        let json = serde_json::to_string(canonical)
            .map_err(|e| SlateError::Serialization(e.to_string()))?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO board (key, state) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET state = excluded.state",
        )
        .bind(KEY_BOARD)
        .bind(&json)
        .execute(&mut *tx)
        .await
        .map_err(|e| SlateError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(META_LAST_SAVE)
        .bind(canonical.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| SlateError::Storage(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;

        tracing::debug!("saved {} bytes to {}", json.len(), self.path.display());
        Ok(())
    }

    pub async fn load_board(&self) -> SlateResult<Option<Value>> {
        let pool = self.get_pool().await?;
        let row = sqlx::query("SELECT state FROM board WHERE key = ?1")
            .bind(KEY_BOARD)
            .fetch_optional(pool)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let json: String = row.get("state");
                let value = serde_json::from_str(&json)
                    .map_err(|e| SlateError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn get_meta(&self, key: &str) -> SlateResult<Option<String>> {
        let pool = self.get_pool().await?;
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> SlateResult<()> {
        let pool = self.get_pool().await?;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .map_err(|e| SlateError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_meta(&self, key: &str) -> SlateResult<()> {
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM meta WHERE key = ?1")
            .bind(key)
            .execute(pool)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Insert a snapshot row and stamp the last-snapshot time in one
    /// transaction.
    pub async fn insert_backup(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
        entry_json: &str,
    ) -> SlateResult<()> {
        let pool = self.get_pool().await?;
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        sqlx::query("INSERT INTO backups (id, timestamp, created_at, entry) VALUES (?1, ?2, ?3, ?4)")
            .bind(id)
            .bind(timestamp.to_rfc3339())
            .bind(created_at.to_rfc3339())
            .bind(entry_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(META_LAST_SNAPSHOT)
        .bind(timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| SlateError::Storage(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_backup(&self, id: &str) -> SlateResult<()> {
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM backups WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn backup_rows(&self) -> SlateResult<Vec<Value>> {
        let pool = self.get_pool().await?;
        let rows = sqlx::query("SELECT entry FROM backups")
            .fetch_all(pool)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("entry");
            let value = serde_json::from_str(&json)
                .map_err(|e| SlateError::Serialization(e.to_string()))?;
            entries.push(value);
        }
        Ok(entries)
    }

    pub async fn backup_row(&self, id: &str) -> SlateResult<Option<Value>> {
        let pool = self.get_pool().await?;
        let row = sqlx::query("SELECT entry FROM backups WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| SlateError::Storage(e.to_string()))?;
        match row {
            Some(row) => {
                let json: String = row.get("entry");
                let value = serde_json::from_str(&json)
                    .map_err(|e| SlateError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
