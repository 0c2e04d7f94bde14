pub mod board;
pub mod canonical;
pub mod card;
pub mod column;
pub mod field_update;
pub mod hash;

pub use board::BoardState;
pub use canonical::{
    canonical_to_board, from_canonical, to_canonical, validate_import_file, CanonicalState,
    ImportError, SCHEMA_VERSION,
};
pub use card::{Card, CardDraft, CardPatch, Priority};
pub use column::{default_columns, Column, ColumnId};
pub use field_update::FieldUpdate;
pub use hash::hash_state;
