use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slate_core::SlateResult;
use slate_domain::{hash_state, to_canonical, BoardState, CanonicalState, ColumnId};
use uuid::Uuid;

use crate::traits::SnapshotStore;

/// Hard ceiling on retained snapshots; pruning keeps the archive at or
/// below this after every insert.
pub const MAX_TOTAL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Auto,
    Restore,
    Reset,
    Import,
    #[default]
    Manual,
}

/// An immutable point-in-time capture of canonical board state. Entries
/// are created by the archive and destroyed only by explicit deletion or
/// pruning, never by ordinary save traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub label: String,
    pub source: SnapshotSource,
    pub state_hash: String,
    pub state: CanonicalState,
    pub column_counts: BTreeMap<ColumnId, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub label: Option<String>,
    pub source: SnapshotSource,
}

impl SnapshotOptions {
    pub fn with_source(source: SnapshotSource) -> Self {
        Self {
            label: None,
            source,
        }
    }
}

/// Bounded, deduplicated history of board-state captures, independent of
/// the live store. Used for recovery ahead of destructive operations and
/// for user-browsable restore points.
pub struct SnapshotArchive<S: SnapshotStore> {
    store: Arc<S>,
}

impl<S: SnapshotStore> SnapshotArchive<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Capture `state` into a new entry. Pruning runs before this
    /// returns, so awaiting a snapshot also awaits quota enforcement.
    pub async fn create_snapshot(
        &self,
        state: &BoardState,
        options: SnapshotOptions,
    ) -> SlateResult<BackupEntry> {
        let canonical = to_canonical(state);
        let state_hash = hash_state(&canonical);
        let created_at = canonical.updated_at;

        let entry = BackupEntry {
            id: format!("snapshot-{}", Uuid::new_v4()),
            timestamp: created_at,
            created_at,
            label: options
                .label
                .unwrap_or_else(|| format_snapshot_label(created_at)),
            source: options.source,
            state_hash,
            column_counts: column_counts(&canonical),
            state: canonical,
        };

        self.store.insert_backup(&entry).await?;
        self.prune().await?;
        tracing::info!(id = %entry.id, source = ?entry.source, "created snapshot");
        Ok(entry)
    }

    /// Snapshot the current state ahead of a restore, unless it already
    /// matches the restore target: restoring over an identical board
    /// would only produce a duplicate entry.
    pub async fn create_snapshot_before_restore(
        &self,
        current: &BoardState,
        target_hash: &str,
    ) -> SlateResult<Option<BackupEntry>> {
        let current_hash = hash_state(&to_canonical(current));
        if current_hash == target_hash {
            return Ok(None);
        }
        self.create_snapshot(
            current,
            SnapshotOptions {
                label: Some(pre_restore_label(Utc::now())),
                source: SnapshotSource::Restore,
            },
        )
        .await
        .map(Some)
    }

    /// Delete an entry. The single most-recent entry is protected so a
    /// delete can never leave the user without their latest safety net;
    /// attempting it returns `false`, as does any storage failure.
    pub async fn delete_snapshot(&self, id: &str) -> bool {
        let entries = match self.load_entries().await {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        if entries.first().map(|e| e.id.as_str()) == Some(id) {
            return false;
        }
        self.store.delete_backup(id).await.is_ok()
    }

    /// All entries, newest first. Unreadable storage yields an empty
    /// list rather than an error; rows with missing fields are repaired
    /// on the way out.
    pub async fn all_backups(&self) -> Vec<BackupEntry> {
        self.load_entries().await.unwrap_or_default()
    }

    pub async fn backup_by_id(&self, id: &str) -> Option<BackupEntry> {
        let row = self.store.backup_row(id).await.ok()??;
        Some(ensure_entry(&row))
    }

    pub async fn last_snapshot_time(&self) -> Option<DateTime<Utc>> {
        self.store.last_snapshot_time().await.ok().flatten()
    }

    async fn load_entries(&self) -> SlateResult<Vec<BackupEntry>> {
        let rows = self.store.backup_rows().await?;
        let mut entries: Vec<BackupEntry> = rows.iter().map(ensure_entry).collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Retention policy, applied after every insert once the archive
    /// exceeds [`MAX_TOTAL`]:
    ///
    /// - the newest entry is never considered;
    /// - the rest are bucketed by UTC calendar day of `created_at`; the
    ///   first entry seen per day (in newest-first order) is that day's
    ///   representative;
    /// - same-day duplicates are deleted oldest-first, then, only if the
    ///   quota is still unmet, daily representatives oldest-first.
    ///
    /// The effect is dense history near now and sparse history further
    /// back, without unbounded growth.
    async fn prune(&self) -> SlateResult<()> {
        let entries = self.load_entries().await?;
        if entries.len() <= MAX_TOTAL {
            return Ok(());
        }
        let need_to_delete = entries.len() - MAX_TOTAL;
        let candidates = &entries[1..];

        let mut seen_days = HashSet::new();
        let mut daily = Vec::new();
        let mut non_daily = Vec::new();
        for entry in candidates {
            if seen_days.insert(entry.created_at.date_naive()) {
                daily.push(entry);
            } else {
                non_daily.push(entry);
            }
        }
        non_daily.sort_by_key(|e| e.created_at);
        daily.sort_by_key(|e| e.created_at);

        let mut deleted = 0;
        for entry in non_daily.into_iter().chain(daily) {
            if deleted >= need_to_delete {
                break;
            }
            self.store.delete_backup(&entry.id).await?;
            deleted += 1;
        }
        tracing::debug!(deleted, "pruned snapshot archive");
        Ok(())
    }
}

/// Rebuild an entry from a stored row, backfilling anything an older app
/// version did not write: the label from the timestamp, the hash from
/// the stored state, the per-column counts from its columns.
fn ensure_entry(row: &Value) -> BackupEntry {
    if let Ok(entry) = serde_json::from_value::<BackupEntry>(row.clone()) {
        return entry;
    }

    let timestamp = row
        .get("timestamp")
        .or_else(|| row.get("createdAt"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let created_at = row
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(timestamp);
    let state = row
        .get("state")
        .and_then(|v| serde_json::from_value::<CanonicalState>(v.clone()).ok())
        .unwrap_or_else(CanonicalState::empty);
    let state_hash = row
        .get("stateHash")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| hash_state(&state));
    let column_counts = row
        .get("columnCounts")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| column_counts(&state));

    BackupEntry {
        id: row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp,
        created_at,
        label: row
            .get("label")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format_snapshot_label(timestamp)),
        source: row
            .get("source")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        state_hash,
        state,
        column_counts,
    }
}

fn column_counts(state: &CanonicalState) -> BTreeMap<ColumnId, usize> {
    state
        .columns
        .iter()
        .map(|c| (c.id, c.card_ids.len()))
        .collect()
}

fn format_snapshot_label(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M").to_string()
}

fn pre_restore_label(at: DateTime<Utc>) -> String {
    format!("Auto backup (before restore) - {}", at.format("%Y-%m-%d %H:%M"))
}
