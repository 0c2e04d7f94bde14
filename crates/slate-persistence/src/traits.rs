use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use slate_core::SlateResult;
use slate_domain::{BoardState, CanonicalState};
use std::path::PathBuf;

use crate::archive::BackupEntry;

/// Which persistence tier is serving reads and writes.
///
/// The store starts transactional and is downgraded to the fallback tier
/// on the first operational failure. The transition is one-way for the
/// life of the process; capability is never re-probed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Transactional,
    Fallback,
}

/// Live-state and metadata persistence contract.
///
/// No method errors: failures degrade to `false`/`None` after logging,
/// so storage trouble can never take the caller down. The one signal a
/// caller must check is `save_board` returning `false`, which means both
/// tiers failed and the user should be warned.
#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn save_board(&self, state: &BoardState) -> bool;
    async fn load_board(&self) -> Option<BoardState>;

    async fn last_save_time(&self) -> Option<DateTime<Utc>>;
    async fn last_export_time(&self) -> Option<DateTime<Utc>>;
    async fn set_last_export_time(&self, at: DateTime<Utc>);
    async fn last_restore_time(&self) -> Option<DateTime<Utc>>;
    async fn set_last_restore_time(&self, at: DateTime<Utc>);
    async fn weekly_reminder_enabled(&self) -> bool;
    async fn set_weekly_reminder_enabled(&self, enabled: bool);
    async fn snooze_until(&self) -> Option<DateTime<Utc>>;
    async fn set_snooze_until(&self, until: Option<DateTime<Utc>>);

    /// Registered destination for silent auto-exports, if any.
    async fn export_path(&self) -> Option<PathBuf>;
    async fn set_export_path(&self, path: Option<PathBuf>);

    /// Write the canonical JSON to the registered export path and record
    /// the export time. Any failure (no path registered, path gone,
    /// filesystem error) returns `false` without raising.
    async fn try_write_backup_to_file(&self, state: &CanonicalState) -> bool;

    fn mode(&self) -> StorageMode;
}

/// Raw row access to the snapshot partition.
///
/// Unlike [`BoardStore`], these operations do surface errors: snapshot
/// creation ahead of a destructive action must be able to tell the user
/// it failed. Rows travel as JSON values so readers can reconstruct
/// entries written by older versions of the app.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert an entry and update the last-snapshot time as one atomic
    /// unit.
    async fn insert_backup(&self, entry: &BackupEntry) -> SlateResult<()>;
    async fn delete_backup(&self, id: &str) -> SlateResult<()>;
    async fn backup_rows(&self) -> SlateResult<Vec<Value>>;
    async fn backup_row(&self, id: &str) -> SlateResult<Option<Value>>;
    async fn last_snapshot_time(&self) -> SlateResult<Option<DateTime<Utc>>>;
}
