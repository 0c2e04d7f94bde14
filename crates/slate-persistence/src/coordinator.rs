use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use slate_core::AppConfig;
use slate_domain::{
    canonical_to_board, to_canonical, validate_import_file, BoardState, ImportError,
};
use tokio::task::JoinHandle;

use crate::archive::{BackupEntry, SnapshotArchive, SnapshotOptions, SnapshotSource};
use crate::traits::{BoardStore, SnapshotStore, StorageMode};

/// How often callers should re-run [`PersistenceCoordinator::check_backup_reminder`]
/// while the app stays in the foreground.
pub const REMINDER_CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Point-in-time view of persistence health, recomputed from store and
/// archive metadata on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceStatus {
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub last_export_at: Option<DateTime<Utc>>,
    pub last_restore_at: Option<DateTime<Utc>>,
    pub storage_mode: StorageMode,
    pub save_failed: bool,
}

/// Result of a snapshot-guarded destructive operation. The mutation is
/// never blocked by snapshot trouble; a failed snapshot is carried here
/// for the caller to surface.
#[derive(Debug)]
pub struct GuardedMutation {
    pub snapshot: Option<BackupEntry>,
    pub snapshot_error: Option<String>,
    pub state: BoardState,
    pub saved: bool,
}

/// Outcome of the periodic backup-reminder check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderCheck {
    /// The user snoozed reminders and the snooze has not lapsed.
    Snoozed,
    /// A recent enough export exists.
    UpToDate,
    /// The board was silently exported to the registered file.
    AutoExported,
    /// An export is overdue and needs the user's attention.
    ReminderDue,
    /// An export is overdue but reminders are switched off.
    Disabled,
}

/// Decides when the store and the archive get invoked, given a stream of
/// board changes, and folds their metadata into one status view.
///
/// Owns the single outstanding debounce timer: rescheduling cancels any
/// pending save before arming a new one, so saves never race each other
/// and the last state of an edit burst is what lands on disk.
pub struct PersistenceCoordinator<S>
where
    S: BoardStore + SnapshotStore + 'static,
{
    store: Arc<S>,
    archive: SnapshotArchive<S>,
    debounce: Duration,
    reminder_after: chrono::Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    save_failed: Arc<AtomicBool>,
}

impl<S> PersistenceCoordinator<S>
where
    S: BoardStore + SnapshotStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, &AppConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: &AppConfig) -> Self {
        Self {
            archive: SnapshotArchive::new(Arc::clone(&store)),
            store,
            debounce: Duration::from_millis(config.effective_debounce_ms()),
            reminder_after: chrono::Duration::days(config.effective_reminder_days() as i64),
            pending: Mutex::new(None),
            save_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn archive(&self) -> &SnapshotArchive<S> {
        &self.archive
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Schedule a trailing-edge debounced save of `state`, cancelling
    /// any save still pending from an earlier change.
    pub fn schedule_save(&self, state: BoardState) {
        let store = Arc::clone(&self.store);
        let save_failed = Arc::clone(&self.save_failed);
        let delay = self.debounce;

        let mut pending = self.pending.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let ok = store.save_board(&state).await;
            save_failed.store(!ok, Ordering::SeqCst);
            if !ok {
                tracing::error!("autosave failed on both storage tiers");
            }
        }));
    }

    /// Cancel any pending debounced save and persist `state` right now.
    /// Used when the UI loses visibility or tears down, so an edit made
    /// inside the debounce window is not lost.
    pub async fn flush(&self, state: &BoardState) -> bool {
        self.cancel_pending();
        let ok = self.store.save_board(state).await;
        self.save_failed.store(!ok, Ordering::SeqCst);
        if !ok {
            tracing::error!("flush failed on both storage tiers");
        }
        ok
    }

    /// Drop any pending debounced save without persisting.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn save_failed(&self) -> bool {
        self.save_failed.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> PersistenceStatus {
        PersistenceStatus {
            last_saved_at: self.store.last_save_time().await,
            last_snapshot_at: self.archive.last_snapshot_time().await,
            last_export_at: self.store.last_export_time().await,
            last_restore_at: self.store.last_restore_time().await,
            storage_mode: self.store.mode(),
            save_failed: self.save_failed(),
        }
    }

    /// Run a destructive operation with its safety snapshot: snapshot
    /// first, mutate second, persist the result. A snapshot failure is
    /// recorded in the outcome but never blocks the mutation.
    pub async fn guarded_mutation<F>(
        &self,
        current: &BoardState,
        source: SnapshotSource,
        mutate: F,
    ) -> GuardedMutation
    where
        F: FnOnce(&BoardState) -> BoardState,
    {
        let (snapshot, snapshot_error) = match self
            .archive
            .create_snapshot(current, SnapshotOptions::with_source(source))
            .await
        {
            Ok(entry) => (Some(entry), None),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot before destructive action failed");
                (None, Some(e.to_string()))
            }
        };

        let state = mutate(current);
        let saved = self.flush(&state).await;
        GuardedMutation {
            snapshot,
            snapshot_error,
            state,
            saved,
        }
    }

    /// Apply a backup entry over the live board. The current state is
    /// snapshotted first unless it already matches the restore target.
    pub async fn restore_from_backup(
        &self,
        current: &BoardState,
        entry: &BackupEntry,
    ) -> GuardedMutation {
        let (snapshot, snapshot_error) = match self
            .archive
            .create_snapshot_before_restore(current, &entry.state_hash)
            .await
        {
            Ok(snapshot) => (snapshot, None),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot before restore failed");
                (None, Some(e.to_string()))
            }
        };

        let state = canonical_to_board(entry.state.clone());
        self.store.set_last_restore_time(Utc::now()).await;
        let saved = self.flush(&state).await;
        GuardedMutation {
            snapshot,
            snapshot_error,
            state,
            saved,
        }
    }

    /// Empty every column, keeping the column layout and titles.
    pub async fn reset_board(&self, current: &BoardState) -> GuardedMutation {
        self.guarded_mutation(current, SnapshotSource::Reset, |state| {
            let mut columns = state.columns.clone();
            for column in &mut columns {
                column.card_ids.clear();
            }
            BoardState {
                cards: Default::default(),
                columns,
            }
        })
        .await
    }

    /// Clear the done column behind a safety snapshot.
    pub async fn clear_done_guarded(&self, current: &BoardState) -> GuardedMutation {
        self.guarded_mutation(current, SnapshotSource::Manual, |state| {
            let mut next = state.clone();
            next.clear_done();
            next
        })
        .await
    }

    /// Validate and apply an import payload. The pre-import snapshot and
    /// save follow the guarded-mutation path; a validation failure
    /// leaves the board untouched.
    pub async fn import_state(
        &self,
        current: &BoardState,
        payload: &Value,
    ) -> Result<GuardedMutation, ImportError> {
        let imported = validate_import_file(payload)?;
        let outcome = self
            .guarded_mutation(current, SnapshotSource::Import, move |_| imported)
            .await;
        self.store.set_last_export_time(Utc::now()).await;
        Ok(outcome)
    }

    /// Serialize the canonical state to `path` and record the export.
    pub async fn export_state(&self, state: &BoardState, path: &std::path::Path) -> bool {
        let canonical = to_canonical(state);
        let json = match serde_json::to_vec_pretty(&canonical) {
            Ok(json) => json,
            Err(_) => return false,
        };
        match crate::store::AtomicWriter::write_atomic(path, &json).await {
            Ok(()) => {
                self.store.set_last_export_time(Utc::now()).await;
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "export failed");
                false
            }
        }
    }

    /// Periodic backup-reminder check (coarse timer / visibility-regain).
    ///
    /// When an export is overdue, a registered export file is tried
    /// silently first; the reminder is only for users without one, and
    /// only when they have it switched on.
    pub async fn check_backup_reminder(
        &self,
        state: &BoardState,
        now: DateTime<Utc>,
    ) -> ReminderCheck {
        if let Some(until) = self.store.snooze_until().await {
            if until > now {
                return ReminderCheck::Snoozed;
            }
        }

        let export_due = match self.store.last_export_time().await {
            Some(last) => now - last > self.reminder_after,
            None => true,
        };
        if !export_due {
            return ReminderCheck::UpToDate;
        }

        if self.store.export_path().await.is_some()
            && self.store.try_write_backup_to_file(&to_canonical(state)).await
        {
            return ReminderCheck::AutoExported;
        }

        if self.store.weekly_reminder_enabled().await {
            ReminderCheck::ReminderDue
        } else {
            ReminderCheck::Disabled
        }
    }
}

impl<S> Drop for PersistenceCoordinator<S>
where
    S: BoardStore + SnapshotStore + 'static,
{
    fn drop(&mut self) {
        // Teardown cancels a not-yet-fired save; a fired one runs to
        // completion on the runtime regardless.
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
    }
}
