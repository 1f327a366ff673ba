//! Gridbase Row Store
//!
//! A `Store` owns bases, a base owns tables, and a table exclusively owns its
//! columns, rows, saved views and change log. Rows hold a sparse map of cell
//! records keyed by column id, so there is at most one cell per (row, column)
//! and every write is an upsert.
//!
//! Deleting a table, base or column cascades through everything it owns. The
//! store keeps id indexes for rows, columns and views so operations addressed
//! only by a child id (`delete_row`, `upsert_cell`, ...) find their table.
//!
//! # Examples
//!
//! ```
//! use gridbase::{CellValue, ColumnType, Store};
//!
//! let mut store = Store::new();
//! let base = store.create_base("Workspace").unwrap();
//! let table = store.create_table(base.id, "Contacts").unwrap();
//!
//! let amount = store.create_column(table, "Score", ColumnType::Number).unwrap();
//! let row = store.create_row(table).unwrap();
//! store.upsert_cell(row.id, amount.id, CellValue::Number(Some(7.0))).unwrap();
//!
//! assert_eq!(store.count_rows(table).unwrap(), 4); // 3 sample rows + 1
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::changeset::{Changeset, TableChange};
use crate::column::{display_order, validate_name, CellValue, Column, ColumnEdit, ColumnType};
use crate::error::{GridError, Result};
use crate::view::{SavedView, ViewConfig};

/// Largest batch `generate_rows` accepts in one call
pub const MAX_GENERATED_ROWS: usize = 100_000;

/// Top-level container of tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The stored value of one (row, column) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub value: CellValue,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Row {
    pub id: Uuid,
    pub table_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Set only on rows produced by `generate_rows`
    pub batch_id: Option<Uuid>,
    cells: HashMap<Uuid, CellRecord>,
}

impl Row {
    fn new(table_id: Uuid, batch_id: Option<Uuid>) -> Self {
        Row {
            id: Uuid::new_v4(),
            table_id,
            created_at: Utc::now(),
            batch_id,
            cells: HashMap::new(),
        }
    }

    pub fn cell(&self, column_id: Uuid) -> Option<&CellValue> {
        self.cells.get(&column_id).map(|c| &c.value)
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellRecord> {
        self.cells.values()
    }

    /// Write or overwrite the cell for a column, returning the previous value
    fn upsert(&mut self, column_id: Uuid, value: CellValue) -> (Option<CellValue>, CellRecord) {
        let now = Utc::now();
        match self.cells.get_mut(&column_id) {
            Some(record) => {
                let old = std::mem::replace(&mut record.value, value);
                record.updated_at = now;
                (Some(old), record.clone())
            }
            None => {
                let record = CellRecord {
                    id: Uuid::new_v4(),
                    row_id: self.id,
                    column_id,
                    value,
                    updated_at: now,
                };
                self.cells.insert(column_id, record.clone());
                (None, record)
            }
        }
    }

    pub fn to_view(&self) -> RowView {
        RowView {
            id: self.id,
            created_at: self.created_at,
            cells: self.cells.iter().map(|(k, v)| (*k, v.value.clone())).collect(),
        }
    }
}

/// Row as returned to clients: id plus the values of its written cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub cells: HashMap<Uuid, CellValue>,
}

impl RowView {
    pub fn cell(&self, column_id: Uuid) -> Option<&CellValue> {
        self.cells.get(&column_id)
    }
}

/// Result of a bulk row generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBatch {
    pub batch_id: Uuid,
    pub row_ids: Vec<Uuid>,
}

/// A table with its columns, rows in creation order, and saved views
#[derive(Debug)]
pub struct Table {
    pub id: Uuid,
    pub base_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    columns: Vec<Column>,
    rows: Vec<Row>,
    views: Vec<SavedView>,
    changeset: Changeset,
}

impl Table {
    fn new(base_id: Uuid, name: String) -> Self {
        Table {
            id: Uuid::new_v4(),
            base_id,
            name,
            created_at: Utc::now(),
            columns: Vec::new(),
            rows: Vec::new(),
            views: Vec::new(),
            changeset: Changeset::new(),
        }
    }

    /// Columns in creation order
    pub fn raw_columns(&self) -> &[Column] {
        &self.columns
    }

    /// Columns in display order (position, then creation order)
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = self.columns.clone();
        display_order(&mut columns);
        columns
    }

    pub fn column(&self, column_id: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    /// Rows in creation order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, row_id: Uuid) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    pub fn row_position(&self, row_id: Uuid) -> Option<usize> {
        self.rows.iter().position(|r| r.id == row_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).sum()
    }

    pub fn views(&self) -> &[SavedView] {
        &self.views
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    pub fn revision(&self) -> u64 {
        self.changeset.revision()
    }

    pub fn drain_changes(&mut self) -> Vec<TableChange> {
        self.changeset.drain()
    }

    fn validate_config(&self, config: &ViewConfig) -> Result<()> {
        let ids = config
            .filters
            .iter()
            .map(|f| f.column_id)
            .chain(config.sorts.iter().map(|s| s.column_id))
            .chain(config.hidden_columns.iter().copied());
        for id in ids {
            if self.column(id).is_none() {
                return Err(GridError::ColumnNotFound(id));
            }
        }
        Ok(())
    }

    fn next_position(&self) -> i32 {
        self.columns.iter().map(|c| c.position + 1).max().unwrap_or(0)
    }
}

/// The row store: every base, table, column, row, cell and view
#[derive(Debug, Default)]
pub struct Store {
    bases: Vec<Base>,
    tables: Vec<Table>,
    /// row id -> table id
    row_index: HashMap<Uuid, Uuid>,
    /// column id -> table id
    column_index: HashMap<Uuid, Uuid>,
    /// view id -> table id
    view_index: HashMap<Uuid, Uuid>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with one base and one seeded table, used by the demo server
    pub fn with_demo_data() -> Result<(Self, Uuid)> {
        let mut store = Store::new();
        let base = store.create_base("Demo workspace")?;
        let table = store.create_table(base.id, "Contacts")?;
        store.generate_rows(table, 500)?;
        Ok((store, table))
    }

    // ==================== Bases ====================

    pub fn create_base(&mut self, name: &str) -> Result<Base> {
        let base = Base {
            id: Uuid::new_v4(),
            name: validate_name("Base", name)?,
            created_at: Utc::now(),
        };
        log::info!("created base {} '{}'", base.id, base.name);
        self.bases.push(base.clone());
        Ok(base)
    }

    pub fn list_bases(&self) -> Vec<Base> {
        self.bases.clone()
    }

    pub fn rename_base(&mut self, base_id: Uuid, name: &str) -> Result<Base> {
        let name = validate_name("Base", name)?;
        let base = self
            .bases
            .iter_mut()
            .find(|b| b.id == base_id)
            .ok_or(GridError::BaseNotFound(base_id))?;
        base.name = name;
        Ok(base.clone())
    }

    /// Delete a base and every table in it
    pub fn delete_base(&mut self, base_id: Uuid) -> Result<()> {
        let pos = self
            .bases
            .iter()
            .position(|b| b.id == base_id)
            .ok_or(GridError::BaseNotFound(base_id))?;
        let table_ids: Vec<Uuid> = self
            .tables
            .iter()
            .filter(|t| t.base_id == base_id)
            .map(|t| t.id)
            .collect();
        for table_id in table_ids {
            self.delete_table(table_id)?;
        }
        self.bases.remove(pos);
        log::info!("deleted base {}", base_id);
        Ok(())
    }

    // ==================== Tables ====================

    /// Create a table seeded with the default columns and a few sample rows
    pub fn create_table(&mut self, base_id: Uuid, name: &str) -> Result<Uuid> {
        if !self.bases.iter().any(|b| b.id == base_id) {
            return Err(GridError::BaseNotFound(base_id));
        }
        let mut table = Table::new(base_id, validate_name("Table", name)?);
        let table_id = table.id;

        let defaults = [
            ("Name", ColumnType::Text),
            ("Notes", ColumnType::Text),
            ("Amount", ColumnType::Number),
        ];
        for (position, (col_name, col_type)) in defaults.iter().enumerate() {
            let column = Column::new(table_id, col_name, *col_type, position as i32)?;
            self.column_index.insert(column.id, table_id);
            table.columns.push(column);
        }

        let samples = [
            ("Ada Lovelace", "First published algorithm", 36.0),
            ("Alan Turing", "Codebreaker", 41.0),
            ("Grace Hopper", "Compiler pioneer", 85.0),
        ];
        let column_ids: Vec<Uuid> = table.columns.iter().map(|c| c.id).collect();
        for (name, notes, amount) in samples {
            let mut row = Row::new(table_id, None);
            row.upsert(column_ids[0], CellValue::Text(name.to_string()));
            row.upsert(column_ids[1], CellValue::Text(notes.to_string()));
            row.upsert(column_ids[2], CellValue::Number(Some(amount)));
            self.row_index.insert(row.id, table_id);
            table.rows.push(row);
        }

        log::info!("created table {} '{}' in base {}", table_id, table.name, base_id);
        self.tables.push(table);
        Ok(table_id)
    }

    pub fn list_tables(&self, base_id: Uuid) -> Vec<(Uuid, String)> {
        self.tables
            .iter()
            .filter(|t| t.base_id == base_id)
            .map(|t| (t.id, t.name.clone()))
            .collect()
    }

    pub fn table(&self, table_id: Uuid) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.id == table_id)
            .ok_or(GridError::TableNotFound(table_id))
    }

    pub fn table_mut(&mut self, table_id: Uuid) -> Result<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.id == table_id)
            .ok_or(GridError::TableNotFound(table_id))
    }

    pub fn rename_table(&mut self, table_id: Uuid, name: &str) -> Result<()> {
        let name = validate_name("Table", name)?;
        self.table_mut(table_id)?.name = name;
        Ok(())
    }

    /// Delete a table together with its columns, rows, cells and views
    pub fn delete_table(&mut self, table_id: Uuid) -> Result<()> {
        let pos = self
            .tables
            .iter()
            .position(|t| t.id == table_id)
            .ok_or(GridError::TableNotFound(table_id))?;
        let table = self.tables.remove(pos);
        self.row_index.retain(|_, t| *t != table_id);
        self.column_index.retain(|_, t| *t != table_id);
        self.view_index.retain(|_, t| *t != table_id);
        log::info!(
            "deleted table {} ({} rows, {} cells, {} columns, {} views)",
            table_id,
            table.rows.len(),
            table.cell_count(),
            table.columns.len(),
            table.views.len()
        );
        Ok(())
    }

    fn table_of_row(&self, row_id: Uuid) -> Result<Uuid> {
        self.row_index.get(&row_id).copied().ok_or(GridError::RowNotFound(row_id))
    }

    fn table_of_column(&self, column_id: Uuid) -> Result<Uuid> {
        self.column_index
            .get(&column_id)
            .copied()
            .ok_or(GridError::ColumnNotFound(column_id))
    }

    fn table_of_view(&self, view_id: Uuid) -> Result<Uuid> {
        self.view_index.get(&view_id).copied().ok_or(GridError::ViewNotFound(view_id))
    }

    // ==================== Rows ====================

    pub fn count_rows(&self, table_id: Uuid) -> Result<usize> {
        Ok(self.table(table_id)?.len())
    }

    /// Append an empty row
    pub fn create_row(&mut self, table_id: Uuid) -> Result<RowView> {
        let table = self.table_mut(table_id)?;
        let row = Row::new(table_id, None);
        let view = row.to_view();
        table.changeset.push(TableChange::RowInserted { row_id: row.id });
        table.rows.push(row);
        self.row_index.insert(view.id, table_id);
        log::debug!("created row {} in table {}", view.id, table_id);
        Ok(view)
    }

    /// Append `count` rows filled with synthetic values, stamped with one batch id
    pub fn generate_rows(&mut self, table_id: Uuid, count: usize) -> Result<GeneratedBatch> {
        if count == 0 || count > MAX_GENERATED_ROWS {
            return Err(GridError::InvalidRequest(format!(
                "row count {} out of range [1, {}]",
                count, MAX_GENERATED_ROWS
            )));
        }
        let batch_id = Uuid::new_v4();
        let table = self.table_mut(table_id)?;
        let start = table.rows.len();
        let columns = table.columns.clone();
        let mut row_ids = Vec::with_capacity(count);

        for n in 0..count {
            let mut row = Row::new(table_id, Some(batch_id));
            let seq = start + n + 1;
            for column in &columns {
                let value = match column.column_type {
                    ColumnType::Text => CellValue::Text(format!("{} {}", column.name, seq)),
                    ColumnType::Number => CellValue::Number(Some(((seq * 37) % 1000) as f64)),
                };
                row.upsert(column.id, value);
            }
            table.changeset.push(TableChange::RowInserted { row_id: row.id });
            row_ids.push(row.id);
            table.rows.push(row);
        }

        for id in &row_ids {
            self.row_index.insert(*id, table_id);
        }
        log::info!("generated {} rows in table {} (batch {})", count, table_id, batch_id);
        Ok(GeneratedBatch { batch_id, row_ids })
    }

    pub fn delete_row(&mut self, row_id: Uuid) -> Result<()> {
        self.delete_rows(&[row_id]).map(|_| ())
    }

    /// Delete several rows. Nothing is deleted if any id is unknown.
    pub fn delete_rows(&mut self, row_ids: &[Uuid]) -> Result<usize> {
        let mut by_table: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for row_id in row_ids {
            let table_id = self.table_of_row(*row_id)?;
            by_table.entry(table_id).or_default().insert(*row_id);
        }

        let mut deleted = 0;
        for (table_id, ids) in by_table {
            let table = self.table_mut(table_id)?;
            let before = table.rows.len();
            table.rows.retain(|r| !ids.contains(&r.id));
            deleted += before - table.rows.len();
            for id in &ids {
                table.changeset.push(TableChange::RowDeleted { row_id: *id });
            }
            self.row_index.retain(|row, _| !ids.contains(row));
        }
        log::debug!("deleted {} rows", deleted);
        Ok(deleted)
    }

    // ==================== Cells ====================

    /// Insert or overwrite the cell of (row, column)
    pub fn upsert_cell(&mut self, row_id: Uuid, column_id: Uuid, value: CellValue) -> Result<CellRecord> {
        let table_id = self.table_of_row(row_id)?;
        if self.table_of_column(column_id)? != table_id {
            return Err(GridError::InvalidRequest(format!(
                "column {} does not belong to the table of row {}",
                column_id, row_id
            )));
        }
        let table = self.table_mut(table_id)?;
        let column = table.column(column_id).ok_or(GridError::ColumnNotFound(column_id))?;
        column.validate_value(&value)?;

        let row = table
            .rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or(GridError::RowNotFound(row_id))?;
        let (old_value, record) = row.upsert(column_id, value.clone());
        table.changeset.push(TableChange::CellUpdated {
            row_id,
            column_id,
            old_value,
            new_value: value,
        });
        Ok(record)
    }

    // ==================== Columns ====================

    pub fn list_columns(&self, table_id: Uuid) -> Result<Vec<Column>> {
        Ok(self.table(table_id)?.columns())
    }

    /// Add a column after the current last position
    pub fn create_column(&mut self, table_id: Uuid, name: &str, column_type: ColumnType) -> Result<Column> {
        let table = self.table_mut(table_id)?;
        let column = Column::new(table_id, name, column_type, table.next_position())?;
        table.columns.push(column.clone());
        table.changeset.push(TableChange::ColumnsChanged);
        self.column_index.insert(column.id, table_id);
        log::info!("created column {} '{}' ({:?})", column.id, column.name, column.column_type);
        Ok(column)
    }

    /// Rename, retype or move a column. Retyping converts every existing cell.
    pub fn edit_column(&mut self, column_id: Uuid, edit: ColumnEdit) -> Result<Column> {
        let table_id = self.table_of_column(column_id)?;
        let name = edit.name.as_deref().map(|n| validate_name("Column", n)).transpose()?;
        let table = self.table_mut(table_id)?;
        let column = table
            .columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or(GridError::ColumnNotFound(column_id))?;

        if let Some(name) = name {
            column.name = name;
        }
        if let Some(position) = edit.position {
            column.position = position;
        }
        let retyped = match edit.column_type {
            Some(t) if t != column.column_type => {
                column.column_type = t;
                Some(t)
            }
            _ => None,
        };
        let updated = column.clone();

        if let Some(target) = retyped {
            for row in table.rows.iter_mut() {
                if let Some(record) = row.cells.get_mut(&column_id) {
                    record.value = record.value.convert_to(target);
                    record.updated_at = Utc::now();
                }
            }
        }
        table.changeset.push(TableChange::ColumnsChanged);
        Ok(updated)
    }

    /// Delete a column, its cells, and every view reference to it
    pub fn delete_column(&mut self, column_id: Uuid) -> Result<()> {
        let table_id = self.table_of_column(column_id)?;
        let table = self.table_mut(table_id)?;
        table.columns.retain(|c| c.id != column_id);
        for row in table.rows.iter_mut() {
            row.cells.remove(&column_id);
        }
        let mut views_touched = false;
        for view in table.views.iter_mut() {
            if view.config.forget_column(column_id) {
                view.updated_at = Utc::now();
                views_touched = true;
            }
        }
        table.changeset.push(TableChange::ColumnsChanged);
        if views_touched {
            table.changeset.push(TableChange::ViewsChanged);
        }
        self.column_index.remove(&column_id);
        log::info!("deleted column {} from table {}", column_id, table_id);
        Ok(())
    }

    // ==================== Views ====================

    pub fn list_views(&self, table_id: Uuid) -> Result<Vec<SavedView>> {
        Ok(self.table(table_id)?.views.clone())
    }

    pub fn create_view(&mut self, table_id: Uuid, name: &str, config: ViewConfig) -> Result<SavedView> {
        let table = self.table_mut(table_id)?;
        table.validate_config(&config)?;
        let view = SavedView::new(table_id, name, config)?;
        table.views.push(view.clone());
        table.changeset.push(TableChange::ViewsChanged);
        self.view_index.insert(view.id, table_id);
        Ok(view)
    }

    pub fn update_view(&mut self, view_id: Uuid, name: Option<&str>, config: Option<ViewConfig>) -> Result<SavedView> {
        let table_id = self.table_of_view(view_id)?;
        let name = name.map(|n| validate_name("View", n)).transpose()?;
        let table = self.table_mut(table_id)?;
        if let Some(ref config) = config {
            table.validate_config(config)?;
        }
        let view = table
            .views
            .iter_mut()
            .find(|v| v.id == view_id)
            .ok_or(GridError::ViewNotFound(view_id))?;
        if let Some(name) = name {
            view.name = name;
        }
        if let Some(config) = config {
            view.config = config;
        }
        view.updated_at = Utc::now();
        let updated = view.clone();
        table.changeset.push(TableChange::ViewsChanged);
        Ok(updated)
    }

    pub fn delete_view(&mut self, view_id: Uuid) -> Result<()> {
        let table_id = self.table_of_view(view_id)?;
        let table = self.table_mut(table_id)?;
        table.views.retain(|v| v.id != view_id);
        table.changeset.push(TableChange::ViewsChanged);
        self.view_index.remove(&view_id);
        Ok(())
    }

    /// Id of the table owning a row, column or view
    pub fn owning_table(&self, id: Uuid) -> Option<Uuid> {
        self.row_index
            .get(&id)
            .or_else(|| self.column_index.get(&id))
            .or_else(|| self.view_index.get(&id))
            .copied()
    }
}
