/// Wire protocol shared by the WebSocket and HTTP endpoints.
///
/// A request names a procedure and its parameters:
///
/// ```json
/// {"request_id": 7, "call": {"method": "get_rows", "params": {"table_id": "...", "limit": 100}}}
/// ```
///
/// Replies echo the `request_id`. Subscribed connections additionally receive
/// `invalidated` notices whenever another client changes the table.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::changeset::TableChange;
use crate::column::{CellValue, Column, ColumnEdit, ColumnType};
use crate::editor::CommitStyle;
use crate::query::{RowPage, RowQuery};
use crate::table::{Base, CellRecord, GeneratedBatch, RowView};
use crate::view::{SavedView, ViewConfig};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub request_id: u64,
    pub call: Call,
}

/// Every remote procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    ListBases,
    CreateBase {
        name: String,
    },
    RenameBase {
        base_id: Uuid,
        name: String,
    },
    DeleteBase {
        base_id: Uuid,
    },

    ListTables {
        base_id: Uuid,
    },
    CreateTable {
        base_id: Uuid,
        name: String,
    },
    RenameTable {
        table_id: Uuid,
        name: String,
    },
    DeleteTable {
        table_id: Uuid,
    },

    ListColumns {
        table_id: Uuid,
    },
    CreateColumn {
        table_id: Uuid,
        name: String,
        column_type: ColumnType,
    },
    EditColumn {
        column_id: Uuid,
        edit: ColumnEdit,
    },
    DeleteColumn {
        column_id: Uuid,
    },

    GetRows(RowQuery),
    CountRows {
        table_id: Uuid,
    },
    CreateRow {
        table_id: Uuid,
    },
    GenerateRows {
        table_id: Uuid,
        count: usize,
    },
    DeleteRows {
        row_ids: Vec<Uuid>,
    },
    UpsertCell {
        row_id: Uuid,
        column_id: Uuid,
        value: CellValue,
        #[serde(default)]
        style: CommitStyle,
    },

    ListViews {
        table_id: Uuid,
    },
    CreateView {
        table_id: Uuid,
        name: String,
        #[serde(default)]
        config: ViewConfig,
    },
    UpdateView {
        view_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        config: Option<ViewConfig>,
    },
    DeleteView {
        view_id: Uuid,
    },

    /// Receive `invalidated` notices for a table (WebSocket only)
    Subscribe {
        table_id: Uuid,
    },
}

impl Call {
    /// Whether the call can change stored data
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::ListBases
                | Call::ListTables { .. }
                | Call::ListColumns { .. }
                | Call::GetRows(_)
                | Call::CountRows { .. }
                | Call::ListViews { .. }
                | Call::Subscribe { .. }
        )
    }
}

/// Table as listed under a base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub id: Uuid,
    pub base_id: Uuid,
    pub name: String,
}

/// Result payload of a successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Done,
    Bases(Vec<Base>),
    Base(Base),
    Tables(Vec<TableSummary>),
    Table(TableSummary),
    Columns(Vec<Column>),
    Column(Column),
    Rows(RowPage),
    Count(usize),
    Row(RowView),
    Generated(GeneratedBatch),
    Deleted(usize),
    Cell(CellRecord),
    Views(Vec<SavedView>),
    View(SavedView),
}

/// A table changed; subscribers should refetch what they show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invalidation {
    pub table_id: Uuid,
    pub revision: u64,
    pub changes: Vec<TableChange>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Reply {
        request_id: u64,
        reply: Reply,
    },

    Error {
        request_id: Option<u64>,
        message: String,
    },

    Invalidated(Invalidation),

    Subscribed {
        table_id: Uuid,
    },
}
