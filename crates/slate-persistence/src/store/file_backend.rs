use serde_json::Value;
use slate_domain::{from_canonical, BoardState, CanonicalState};
use std::path::{Path, PathBuf};

use crate::store::atomic_writer::AtomicWriter;

/// Current and legacy names for the full-state blob. The legacy name is
/// still accepted on read so boards written by old versions migrate on
/// their next save.
const KEY_BOARD: &str = "board-state-v2.json";
const KEY_BOARD_LEGACY: &str = "board-state.json";

pub(crate) const KEY_LAST_EXPORT: &str = "last-export";
pub(crate) const KEY_LAST_RESTORE: &str = "last-restore";
pub(crate) const KEY_SNOOZE_UNTIL: &str = "snooze-until";
pub(crate) const KEY_WEEKLY_REMINDER: &str = "weekly-reminder";

/// The degraded persistence tier: a flat key-per-file directory.
///
/// Holds the canonical JSON blob under one key and metadata scalars as
/// plain strings under the rest. No transactions; each key is written
/// atomically on its own.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub async fn read_key(&self, key: &str) -> Option<String> {
        let bytes = AtomicWriter::read_all(&self.key_path(key)).await.ok()?;
        String::from_utf8(bytes).ok()
    }

    pub async fn write_key(&self, key: &str, value: &str) -> bool {
        match AtomicWriter::write_atomic(&self.key_path(key), value.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "fallback store write failed");
                false
            }
        }
    }

    pub async fn remove_key(&self, key: &str) {
        if let Err(e) = tokio::fs::remove_file(self.key_path(key)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(key, error = %e, "fallback store remove failed");
            }
        }
    }

    pub async fn save_board(&self, canonical: &CanonicalState) -> bool {
        let json = match serde_json::to_string(canonical) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "canonical state failed to serialize");
                return false;
            }
        };
        self.write_key(KEY_BOARD, &json).await
    }

    /// Read the current blob, falling back to the legacy key name.
    pub async fn load_board(&self) -> Option<BoardState> {
        let stored = match self.read_key(KEY_BOARD).await {
            Some(stored) => stored,
            None => self.read_key(KEY_BOARD_LEGACY).await?,
        };
        let value: Value = serde_json::from_str(&stored).ok()?;
        from_canonical(&value)
    }
}
