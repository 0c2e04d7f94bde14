use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::board::BoardState;
use crate::card::{Card, Priority};
use crate::column::{default_columns, Column, ColumnId};

pub const SCHEMA_VERSION: u32 = 1;

/// The versioned projection of board state used for persistence,
/// hashing, export, and import. Field names follow the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalState {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub columns: Vec<Column>,
    pub tasks_by_id: BTreeMap<String, Card>,
    pub column_order: Vec<ColumnId>,
}

impl CanonicalState {
    /// An empty payload used when reconstructing damaged archive rows.
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            columns: Vec::new(),
            tasks_by_id: BTreeMap::new(),
            column_order: Vec::new(),
        }
    }
}

/// Project live board state into its canonical form, stamped with the
/// current time and schema version.
pub fn to_canonical(state: &BoardState) -> CanonicalState {
    CanonicalState {
        version: SCHEMA_VERSION,
        updated_at: Utc::now(),
        columns: state.columns.clone(),
        tasks_by_id: state
            .cards
            .iter()
            .map(|(id, card)| (id.clone(), card.clone()))
            .collect(),
        column_order: state.columns.iter().map(|c| c.id).collect(),
    }
}

/// Inverse of [`to_canonical`]: apply a canonical payload (e.g. a
/// restored snapshot) back into live board shape.
pub fn canonical_to_board(canonical: CanonicalState) -> BoardState {
    BoardState {
        cards: canonical.tasks_by_id.into_iter().collect(),
        columns: canonical.columns,
    }
}

/// Rebuild board state from an untrusted JSON payload.
///
/// Nothing in the input is trusted: every field is checked before use,
/// malformed columns and cards are dropped rather than failing the whole
/// load, and malformed optional card fields degrade to `None`. Returns
/// `None` only when the top-level shape is unrecognizable or the payload
/// claims a newer schema version.
pub fn from_canonical(data: &Value) -> Option<BoardState> {
    let obj = data.as_object()?;

    // Legacy un-versioned payloads are a bare { cards, columns } pair.
    if obj.get("cards").map_or(false, Value::is_object)
        && obj.get("columns").map_or(false, Value::is_array)
    {
        return Some(collect_board(obj.get("cards")?, obj.get("columns")?, false));
    }

    let version = obj.get("version").and_then(Value::as_f64)?;
    if version > SCHEMA_VERSION as f64 {
        return None;
    }

    let columns = obj.get("columns")?;
    if !columns.is_array() {
        return None;
    }
    let tasks = obj.get("tasksById")?;
    if !tasks.is_object() {
        return None;
    }

    Some(collect_board(tasks, columns, true))
}

fn collect_board(cards: &Value, columns: &Value, default_when_empty: bool) -> BoardState {
    let columns: Vec<Column> = columns
        .as_array()
        .map(|list| list.iter().filter_map(column_from_value).collect())
        .unwrap_or_default();
    let columns = if columns.is_empty() && default_when_empty {
        default_columns()
    } else {
        columns
    };

    let cards = cards
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(id, value)| card_from_value(value).map(|card| (id.clone(), card)))
                .collect()
        })
        .unwrap_or_default();

    BoardState { cards, columns }
}

fn column_from_value(value: &Value) -> Option<Column> {
    let obj = value.as_object()?;
    let id = ColumnId::parse(obj.get("id")?.as_str()?)?;
    let title = obj.get("title")?.as_str()?.to_string();
    let card_ids = obj
        .get("cardIds")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    Some(Column { id, title, card_ids })
}

/// Card validity requires string `id`/`title`/`columnId` and a numeric
/// `order`; everything else is optional and degrades quietly.
fn card_from_value(value: &Value) -> Option<Card> {
    let obj = value.as_object()?;
    let id = obj.get("id")?.as_str()?.to_string();
    let title = obj.get("title")?.as_str()?.to_string();
    let column_id = ColumnId::parse(obj.get("columnId")?.as_str()?)?;
    let order = obj.get("order").and_then(as_integer)?;

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);
    let priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|s| match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        });
    let due_date = obj
        .get("dueDate")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
    let completed_at = obj
        .get("completedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(Card {
        id,
        title,
        description,
        priority,
        due_date,
        column_id,
        order,
        completed_at,
    })
}

fn as_integer(value: &Value) -> Option<i32> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .map(|n| n as i32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("Invalid or corrupted file format")]
    InvalidFormat,
    #[error("File was created with a newer app version")]
    NewerVersion,
}

/// Validate an import payload, distinguishing corruption from
/// forward-incompatibility so callers can show the right message.
pub fn validate_import_file(data: &Value) -> Result<BoardState, ImportError> {
    if let Some(version) = data.get("version").and_then(Value::as_f64) {
        if version > SCHEMA_VERSION as f64 {
            return Err(ImportError::NewerVersion);
        }
    }
    from_canonical(data).ok_or(ImportError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardDraft;
    use serde_json::json;

    fn sample_board() -> BoardState {
        let mut board = BoardState::with_default_columns();
        board.add_card(
            ColumnId::Todo,
            CardDraft {
                title: Some("write tests".to_string()),
                priority: Some(Priority::High),
                ..Default::default()
            },
        ).unwrap();
        board.add_card(
            ColumnId::Done,
            CardDraft {
                title: Some("ship it".to_string()),
                ..Default::default()
            },
        ).unwrap();
        board
    }

    #[test]
    fn test_round_trip_preserves_cards_and_ordering() {
        let board = sample_board();
        let canonical = to_canonical(&board);
        let value = serde_json::to_value(&canonical).unwrap();
        let restored = from_canonical(&value).unwrap();

        assert_eq!(restored.cards, board.cards);
        assert_eq!(restored.columns, board.columns);
    }

    #[test]
    fn test_canonical_to_board_is_inverse() {
        let board = sample_board();
        let restored = canonical_to_board(to_canonical(&board));
        assert_eq!(restored, board);
    }

    #[test]
    fn test_canonical_stamps_version_and_column_order() {
        let canonical = to_canonical(&sample_board());
        assert_eq!(canonical.version, SCHEMA_VERSION);
        assert_eq!(canonical.column_order, ColumnId::ALL.to_vec());
    }

    #[test]
    fn test_legacy_bare_shape_accepted() {
        let board = sample_board();
        let legacy = json!({
            "cards": serde_json::to_value(&board.cards).unwrap(),
            "columns": serde_json::to_value(&board.columns).unwrap(),
        });
        let restored = from_canonical(&legacy).unwrap();
        assert_eq!(restored.cards, board.cards);
        assert_eq!(restored.columns, board.columns);

        // Same payload wrapped in the versioned envelope loads identically.
        let versioned = serde_json::to_value(to_canonical(&board)).unwrap();
        assert_eq!(restored, from_canonical(&versioned).unwrap());
    }

    #[test]
    fn test_newer_version_rejected() {
        let payload = json!({
            "version": SCHEMA_VERSION + 1,
            "updatedAt": "2026-01-01T00:00:00Z",
            "columns": [],
            "tasksById": {},
            "columnOrder": [],
        });
        assert!(from_canonical(&payload).is_none());
    }

    #[test]
    fn test_unrecognizable_shapes_rejected() {
        assert!(from_canonical(&json!(null)).is_none());
        assert!(from_canonical(&json!([1, 2, 3])).is_none());
        assert!(from_canonical(&json!({"version": "one"})).is_none());
        assert!(from_canonical(&json!({"version": 1, "columns": {}, "tasksById": {}})).is_none());
        assert!(from_canonical(&json!({"version": 1, "columns": []})).is_none());
    }

    #[test]
    fn test_malformed_entries_are_dropped_not_fatal() {
        let payload = json!({
            "version": 1,
            "columns": [
                {"id": "todo", "title": "To Do", "cardIds": ["good", 42]},
                {"id": "nope", "title": "Unknown column", "cardIds": []},
                "not a column",
            ],
            "tasksById": {
                "good": {"id": "good", "title": "ok", "columnId": "todo", "order": 0,
                         "priority": "urgent", "dueDate": "tomorrow"},
                "bad": {"id": "bad", "title": "missing order", "columnId": "todo"},
                "worse": 17,
            },
        });
        let board = from_canonical(&payload).unwrap();
        assert_eq!(board.columns.len(), 1);
        assert_eq!(board.columns[0].card_ids, vec!["good".to_string()]);
        assert_eq!(board.cards.len(), 1);
        let card = &board.cards["good"];
        // Malformed optional fields degrade instead of dropping the card.
        assert_eq!(card.priority, None);
        assert_eq!(card.due_date, None);
    }

    #[test]
    fn test_no_valid_columns_substitutes_defaults() {
        let payload = json!({
            "version": 1,
            "columns": ["junk"],
            "tasksById": {},
        });
        let board = from_canonical(&payload).unwrap();
        assert_eq!(board.columns, default_columns());
    }

    #[test]
    fn test_validate_import_distinguishes_errors() {
        let newer = json!({"version": SCHEMA_VERSION + 1, "columns": [], "tasksById": {}});
        assert_eq!(
            validate_import_file(&newer).unwrap_err(),
            ImportError::NewerVersion
        );
        assert_eq!(
            validate_import_file(&newer).unwrap_err().to_string(),
            "File was created with a newer app version"
        );

        let garbage = json!({"hello": "world"});
        assert_eq!(
            validate_import_file(&garbage).unwrap_err(),
            ImportError::InvalidFormat
        );
        assert_eq!(
            validate_import_file(&garbage).unwrap_err().to_string(),
            "Invalid or corrupted file format"
        );

        let empty = json!({"version": SCHEMA_VERSION, "columns": [], "tasksById": {}});
        let board = validate_import_file(&empty).unwrap();
        assert!(board.cards.is_empty());
        assert_eq!(board.columns, default_columns());
    }
}
