use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::card::{Card, CardDraft, CardPatch};
use crate::column::{default_columns, Column, ColumnId};

/// The live, mutable board aggregate.
///
/// Invariants maintained by every mutation:
/// - `cards` keys exactly equal the union of all `columns[*].card_ids`,
///   and each card id appears in exactly one column;
/// - each card's `order` equals its index in the owning column;
/// - `completed_at` is `Some` exactly while the card is in `done`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardState {
    pub cards: HashMap<String, Card>,
    pub columns: Vec<Column>,
}

impl BoardState {
    /// An empty board with the fixed five-column layout.
    pub fn with_default_columns() -> Self {
        Self {
            cards: HashMap::new(),
            columns: default_columns(),
        }
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    fn column_mut(&mut self, id: ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == id)
    }

    /// Append a new card to `column_id`. Returns the card id, or `None`
    /// when the column is absent from this board (possible after loading
    /// a partially-valid payload).
    pub fn add_card(&mut self, column_id: ColumnId, draft: CardDraft) -> Option<String> {
        let column = self.column_mut(column_id)?;
        let id = draft
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let order = column.card_ids.len() as i32;
        column.card_ids.push(id.clone());

        let card = Card {
            id: id.clone(),
            title: draft.title.unwrap_or_else(|| "New task".to_string()),
            description: draft.description,
            priority: draft.priority,
            due_date: draft.due_date,
            column_id,
            order,
            completed_at: (column_id == ColumnId::Done).then(Utc::now),
        };
        self.cards.insert(id.clone(), card);
        Some(id)
    }

    /// Patch card metadata. Placement is untouched; see [`CardPatch`].
    pub fn update_card(&mut self, id: &str, patch: CardPatch) -> bool {
        match self.cards.get_mut(id) {
            Some(card) => {
                card.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    pub fn delete_card(&mut self, id: &str) -> bool {
        let Some(card) = self.cards.remove(id) else {
            return false;
        };
        if let Some(column) = self.column_mut(card.column_id) {
            column.card_ids.retain(|cid| cid != id);
        }
        self.resequence();
        true
    }

    /// Move a card into another column at `target_index` (clamped to the
    /// column length). Entering `done` stamps `completed_at`; leaving
    /// `done` clears it. Same-column moves are a no-op; use
    /// [`BoardState::reorder_in_column`] for those.
    pub fn move_card(&mut self, id: &str, target: ColumnId, target_index: usize) -> bool {
        let Some(card) = self.cards.get(id) else {
            return false;
        };
        if card.column_id == target {
            return false;
        }
        let previous = card.column_id;
        if self.column(target).is_none() {
            return false;
        }

        for column in &mut self.columns {
            column.card_ids.retain(|cid| cid != id);
        }
        if let Some(column) = self.column_mut(target) {
            let index = target_index.min(column.card_ids.len());
            column.card_ids.insert(index, id.to_string());
        }

        if let Some(card) = self.cards.get_mut(id) {
            card.column_id = target;
            if target == ColumnId::Done {
                card.completed_at = Some(Utc::now());
            } else if previous == ColumnId::Done {
                card.completed_at = None;
            }
        }
        self.resequence();
        true
    }

    /// Reorder within one column by dragging `active_id` over `over_id`.
    pub fn reorder_in_column(&mut self, column_id: ColumnId, active_id: &str, over_id: &str) -> bool {
        let Some(column) = self.column_mut(column_id) else {
            return false;
        };
        let Some(old_index) = column.card_ids.iter().position(|id| id == active_id) else {
            return false;
        };
        let Some(new_index) = column.card_ids.iter().position(|id| id == over_id) else {
            return false;
        };
        if old_index == new_index {
            return false;
        }

        let id = column.card_ids.remove(old_index);
        // After removal the target index shifts left when moving down.
        let insert_index = if old_index < new_index {
            new_index - 1
        } else {
            new_index
        };
        column.card_ids.insert(insert_index, id);
        self.resequence();
        true
    }

    /// Remove every card in the done column. Returns how many were removed.
    pub fn clear_done(&mut self) -> usize {
        let Some(done) = self.column_mut(ColumnId::Done) else {
            return 0;
        };
        let removed = std::mem::take(&mut done.card_ids);
        for id in &removed {
            self.cards.remove(id);
        }
        removed.len()
    }

    pub fn wip_count(&self) -> usize {
        self.column(ColumnId::Wip).map_or(0, |c| c.card_ids.len())
    }

    /// Cards per column, in column order.
    pub fn column_counts(&self) -> Vec<(ColumnId, usize)> {
        self.columns
            .iter()
            .map(|c| (c.id, c.card_ids.len()))
            .collect()
    }

    /// Check the card/column referential invariant: `cards` keys equal
    /// the union of all `card_ids`, each card sits in the column it
    /// claims, and ranks are dense.
    pub fn is_consistent(&self) -> bool {
        let mut seen = 0usize;
        for column in &self.columns {
            for (index, id) in column.card_ids.iter().enumerate() {
                let Some(card) = self.cards.get(id) else {
                    return false;
                };
                if card.column_id != column.id || card.order != index as i32 {
                    return false;
                }
                seen += 1;
            }
        }
        seen == self.cards.len()
    }

    /// Realign every card's `order` with its index in the owning column.
    fn resequence(&mut self) {
        for column in &self.columns {
            for (index, id) in column.card_ids.iter().enumerate() {
                if let Some(card) = self.cards.get_mut(id) {
                    card.order = index as i32;
                }
            }
        }
    }
}
