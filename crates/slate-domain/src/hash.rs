use std::collections::BTreeMap;

use serde::Serialize;

use crate::canonical::CanonicalState;
use crate::card::Card;
use crate::column::{Column, ColumnId};

/// Content fingerprint of a canonical state.
///
/// Hashes `{columns, tasksById, columnOrder}` only, so two states with
/// the same content hash identically regardless of `updatedAt` or
/// `version`. Map keys are sorted and struct fields serialize in a fixed
/// order, making the digest a pure function of content. The digest is a
/// 32-bit rolling hash rendered base-36: deterministic and
/// content-sensitive, not collision-resistant, which is all snapshot
/// deduplication needs.
pub fn hash_state(state: &CanonicalState) -> String {
    #[derive(Serialize)]
    struct Payload<'a> {
        columns: &'a [Column],
        #[serde(rename = "tasksById")]
        tasks_by_id: &'a BTreeMap<String, Card>,
        #[serde(rename = "columnOrder")]
        column_order: &'a [ColumnId],
    }

    let json = serde_json::to_string(&Payload {
        columns: &state.columns,
        tasks_by_id: &state.tasks_by_id,
        column_order: &state.column_order,
    })
    .unwrap_or_default();

    let mut h: i32 = 0;
    for unit in json.encode_utf16() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32);
    }
    to_base36((h as i64).unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
