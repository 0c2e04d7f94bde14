use serde::{Deserialize, Serialize};

/// The five workflow columns. The set is fixed; users never create or
/// remove columns, only retitle them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnId {
    Ideas,
    Backlog,
    Todo,
    Wip,
    Done,
}

impl ColumnId {
    pub const ALL: [ColumnId; 5] = [
        ColumnId::Ideas,
        ColumnId::Backlog,
        ColumnId::Todo,
        ColumnId::Wip,
        ColumnId::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnId::Ideas => "ideas",
            ColumnId::Backlog => "backlog",
            ColumnId::Todo => "todo",
            ColumnId::Wip => "wip",
            ColumnId::Done => "done",
        }
    }

    /// Default display title for the column.
    pub fn label(self) -> &'static str {
        match self {
            ColumnId::Ideas => "Ideas",
            ColumnId::Backlog => "Backlog",
            ColumnId::Todo => "To Do This Week",
            ColumnId::Wip => "Today",
            ColumnId::Done => "Done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ideas" => Some(ColumnId::Ideas),
            "backlog" => Some(ColumnId::Backlog),
            "todo" => Some(ColumnId::Todo),
            "wip" => Some(ColumnId::Wip),
            "done" => Some(ColumnId::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    pub card_ids: Vec<String>,
}

impl Column {
    pub fn empty(id: ColumnId) -> Self {
        Self {
            id,
            title: id.label().to_string(),
            card_ids: Vec::new(),
        }
    }
}

/// The fixed default column set, all empty.
pub fn default_columns() -> Vec<Column> {
    ColumnId::ALL.iter().map(|&id| Column::empty(id)).collect()
}
