use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use slate_core::SlateResult;
use slate_domain::{from_canonical, to_canonical, BoardState, CanonicalState};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::archive::BackupEntry;
use crate::store::atomic_writer::AtomicWriter;
use crate::store::file_backend::{
    FileBackend, KEY_LAST_EXPORT, KEY_LAST_RESTORE, KEY_SNOOZE_UNTIL, KEY_WEEKLY_REMINDER,
};
use crate::store::sqlite_backend::{SqliteBackend, META_LAST_SAVE, META_LAST_SNAPSHOT};
use crate::traits::{BoardStore, SnapshotStore, StorageMode};

const META_LAST_EXPORT: &str = "lastExport";
const META_LAST_RESTORE: &str = "lastRestore";
const META_SNOOZE_UNTIL: &str = "snoozeUntil";
const META_WEEKLY_REMINDER: &str = "weeklyReminder";
const META_EXPORT_PATH: &str = "exportPath";

const DB_FILE: &str = "slate.db";
const FALLBACK_DIR: &str = "fallback";

/// Two-tier durable store for the live board and its metadata scalars.
///
/// Writes go to the transactional SQLite tier until the first failure,
/// after which the store is pinned to the flat-file fallback tier for
/// the rest of the session. Metadata that must survive a total loss of
/// the transactional tier (last export, last restore, snooze, reminder
/// flag) is mirrored to the fallback on every write.
///
/// One instance owns the backend connections; archive and coordinator
/// share it by reference rather than going through a process global.
pub struct DurableStore {
    sqlite: SqliteBackend,
    fallback: FileBackend,
    mode: Mutex<StorageMode>,
}

impl DurableStore {
    /// Store rooted at `data_dir`: the database and the fallback
    /// directory live side by side under it.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self::with_paths(data_dir.join(DB_FILE), data_dir.join(FALLBACK_DIR))
    }

    /// Explicit backend locations (useful for tests).
    pub fn with_paths(sqlite_path: impl AsRef<Path>, fallback_dir: impl AsRef<Path>) -> Self {
        Self {
            sqlite: SqliteBackend::new(sqlite_path),
            fallback: FileBackend::new(fallback_dir),
            mode: Mutex::new(StorageMode::Transactional),
        }
    }

    /// Probe the transactional tier. On failure the store downgrades
    /// immediately and stays downgraded.
    pub async fn init(&self) -> StorageMode {
        if self.mode() == StorageMode::Transactional {
            if let Err(e) = self.sqlite.ensure_ready().await {
                tracing::warn!(error = %e, "transactional backend unavailable, using fallback store");
                self.downgrade();
            }
        }
        self.mode()
    }

    fn downgrade(&self) {
        let mut mode = self.mode.lock().unwrap();
        if *mode != StorageMode::Fallback {
            *mode = StorageMode::Fallback;
        }
    }

    /// Transactional meta read; errors and fallback mode both yield
    /// `None` without downgrading (metadata staleness is tolerable).
    async fn transactional_meta(&self, key: &str) -> Option<String> {
        if self.mode() != StorageMode::Transactional {
            return None;
        }
        self.sqlite.get_meta(key).await.ok().flatten()
    }

    /// Best-effort write to the transactional meta partition plus the
    /// fallback mirror, so the value survives losing either tier.
    async fn set_mirrored_meta(&self, meta_key: &str, mirror_key: &str, value: &str) {
        if self.mode() == StorageMode::Transactional {
            if let Err(e) = self.sqlite.set_meta(meta_key, value).await {
                tracing::debug!(key = meta_key, error = %e, "meta write failed");
            }
        }
        self.fallback.write_key(mirror_key, value).await;
    }

    async fn mirrored_meta(&self, meta_key: &str, mirror_key: &str) -> Option<String> {
        match self.transactional_meta(meta_key).await {
            Some(value) => Some(value),
            None => self.fallback.read_key(mirror_key).await,
        }
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl BoardStore for DurableStore {
    async fn save_board(&self, state: &BoardState) -> bool {
        let canonical = to_canonical(state);

        if self.mode() == StorageMode::Transactional {
            match self.sqlite.save_board(&canonical).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(error = %e, "transactional save failed, switching to fallback store");
                    self.downgrade();
                }
            }
        }

        self.fallback.save_board(&canonical).await
    }

    async fn load_board(&self) -> Option<BoardState> {
        if self.mode() == StorageMode::Transactional {
            match self.sqlite.load_board().await {
                Ok(Some(value)) => return from_canonical(&value),
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "transactional load failed, switching to fallback store");
                    self.downgrade();
                }
            }
        }

        self.fallback.load_board().await
    }

    async fn last_save_time(&self) -> Option<DateTime<Utc>> {
        self.transactional_meta(META_LAST_SAVE)
            .await
            .as_deref()
            .and_then(parse_time)
    }

    async fn last_export_time(&self) -> Option<DateTime<Utc>> {
        self.mirrored_meta(META_LAST_EXPORT, KEY_LAST_EXPORT)
            .await
            .as_deref()
            .and_then(parse_time)
    }

    async fn set_last_export_time(&self, at: DateTime<Utc>) {
        self.set_mirrored_meta(META_LAST_EXPORT, KEY_LAST_EXPORT, &at.to_rfc3339())
            .await;
    }

    async fn last_restore_time(&self) -> Option<DateTime<Utc>> {
        self.mirrored_meta(META_LAST_RESTORE, KEY_LAST_RESTORE)
            .await
            .as_deref()
            .and_then(parse_time)
    }

    async fn set_last_restore_time(&self, at: DateTime<Utc>) {
        self.set_mirrored_meta(META_LAST_RESTORE, KEY_LAST_RESTORE, &at.to_rfc3339())
            .await;
    }

    async fn weekly_reminder_enabled(&self) -> bool {
        self.mirrored_meta(META_WEEKLY_REMINDER, KEY_WEEKLY_REMINDER)
            .await
            .as_deref()
            == Some("true")
    }

    async fn set_weekly_reminder_enabled(&self, enabled: bool) {
        self.set_mirrored_meta(
            META_WEEKLY_REMINDER,
            KEY_WEEKLY_REMINDER,
            if enabled { "true" } else { "false" },
        )
        .await;
    }

    async fn snooze_until(&self) -> Option<DateTime<Utc>> {
        self.mirrored_meta(META_SNOOZE_UNTIL, KEY_SNOOZE_UNTIL)
            .await
            .as_deref()
            .and_then(parse_time)
    }

    async fn set_snooze_until(&self, until: Option<DateTime<Utc>>) {
        match until {
            Some(until) => {
                self.set_mirrored_meta(META_SNOOZE_UNTIL, KEY_SNOOZE_UNTIL, &until.to_rfc3339())
                    .await;
            }
            None => {
                if self.mode() == StorageMode::Transactional {
                    if let Err(e) = self.sqlite.delete_meta(META_SNOOZE_UNTIL).await {
                        tracing::debug!(error = %e, "snooze clear failed");
                    }
                }
                self.fallback.remove_key(KEY_SNOOZE_UNTIL).await;
            }
        }
    }

    async fn export_path(&self) -> Option<PathBuf> {
        // Like the file-handle it stands in for, the export destination
        // only lives in the transactional tier.
        self.transactional_meta(META_EXPORT_PATH)
            .await
            .map(PathBuf::from)
    }

    async fn set_export_path(&self, path: Option<PathBuf>) {
        if self.mode() != StorageMode::Transactional {
            return;
        }
        let result = match path {
            Some(path) => {
                self.sqlite
                    .set_meta(META_EXPORT_PATH, &path.to_string_lossy())
                    .await
            }
            None => self.sqlite.delete_meta(META_EXPORT_PATH).await,
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "export path update failed");
        }
    }

    async fn try_write_backup_to_file(&self, state: &CanonicalState) -> bool {
        let Some(path) = self.export_path().await else {
            return false;
        };
        let json = match serde_json::to_vec_pretty(state) {
            Ok(json) => json,
            Err(_) => return false,
        };
        match AtomicWriter::write_atomic(&path, &json).await {
            Ok(()) => {
                self.set_last_export_time(Utc::now()).await;
                tracing::info!(path = %path.display(), "auto-exported board to file");
                true
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "auto-export failed");
                false
            }
        }
    }

    fn mode(&self) -> StorageMode {
        *self.mode.lock().unwrap()
    }
}

/// Snapshot rows live only in the transactional tier; there is no
/// fallback mirror for the archive. Operations here go straight at the
/// database regardless of the current mode and surface errors, so a
/// failed pre-destruction snapshot can be reported to the user.
#[async_trait]
impl SnapshotStore for DurableStore {
    async fn insert_backup(&self, entry: &BackupEntry) -> SlateResult<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| slate_core::SlateError::Serialization(e.to_string()))?;
        self.sqlite
            .insert_backup(&entry.id, entry.timestamp, entry.created_at, &json)
            .await
    }

    async fn delete_backup(&self, id: &str) -> SlateResult<()> {
        self.sqlite.delete_backup(id).await
    }

    async fn backup_rows(&self) -> SlateResult<Vec<Value>> {
        self.sqlite.backup_rows().await
    }

    async fn backup_row(&self, id: &str) -> SlateResult<Option<Value>> {
        self.sqlite.backup_row(id).await
    }

    async fn last_snapshot_time(&self) -> SlateResult<Option<DateTime<Utc>>> {
        Ok(self
            .sqlite
            .get_meta(META_LAST_SNAPSHOT)
            .await?
            .as_deref()
            .and_then(parse_time))
    }
}
