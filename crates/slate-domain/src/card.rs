use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::column::ColumnId;
use crate::field_update::FieldUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A card on the board. `order` is its dense rank within the owning
/// column; `completed_at` is `Some` exactly while the card sits in the
/// done column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Serialized as `null` when unset; the wire format treats priority
    /// as a required nullable field.
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub column_id: ColumnId,
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Initial values for a new card. Anything unset falls back to a
/// defaulted title, no metadata, and a generated id.
#[derive(Debug, Clone, Default)]
pub struct CardDraft {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
}

/// Partial metadata update for an existing card. Placement fields
/// (`column_id`, `order`, `completed_at`) are deliberately absent: those
/// change only through move operations so the completion invariant
/// cannot be bypassed.
#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub title: Option<String>,
    pub description: FieldUpdate<String>,
    pub priority: FieldUpdate<Priority>,
    pub due_date: FieldUpdate<NaiveDate>,
}

impl Card {
    pub fn apply_patch(&mut self, patch: CardPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        patch.description.apply_to(&mut self.description);
        patch.priority.apply_to(&mut self.priority);
        patch.due_date.apply_to(&mut self.due_date);
    }
}
