//! Headless grid controller.
//!
//! `TableView` ties together one table's descriptors (through a
//! `ViewSession`), the windowed row cache, the row virtualizer, the per-cell
//! editors and keyboard focus. It talks to the server through the
//! `RowSource` trait, implemented directly by `Store` for in-process use.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::cache::{ApplyOutcome, FetchTicket, RowCache};
use crate::column::{CellValue, Column, ColumnType};
use crate::config::GridConfig;
use crate::editor::{CellEditor, CommitStyle, CommitTrigger, EditOutcome, EditPhase, WriteRequest};
use crate::error::Result;
use crate::query::{self, RowPage, RowQuery};
use crate::table::{RowView, Store};
use crate::view::{ChangeOrigin, SaveDecision, SavedView, ViewConfig, ViewSession};
use crate::virtualizer::{FetchTrigger, RowVirtualizer, ScrollMetrics, VirtualItem};

/// The server operations the grid needs
pub trait RowSource {
    fn fetch_rows(&mut self, query: &RowQuery) -> Result<RowPage>;

    fn count_rows(&mut self, table_id: Uuid) -> Result<usize>;

    fn list_columns(&mut self, table_id: Uuid) -> Result<Vec<Column>>;

    /// Write one cell and return the value the server stored
    fn upsert_cell(&mut self, row_id: Uuid, column_id: Uuid, value: CellValue, style: CommitStyle)
        -> Result<CellValue>;

    fn create_row(&mut self, table_id: Uuid) -> Result<RowView>;

    fn delete_rows(&mut self, row_ids: &[Uuid]) -> Result<usize>;
}

/// An in-process store has no subscribers, so the changes a write records
/// are dropped as soon as it returns.
fn discard_changes(store: &mut Store, tables: impl IntoIterator<Item = Uuid>) {
    for table_id in tables {
        if let Ok(table) = store.table_mut(table_id) {
            table.drain_changes();
        }
    }
}

impl RowSource for Store {
    fn fetch_rows(&mut self, query: &RowQuery) -> Result<RowPage> {
        query::fetch_rows(self, query)
    }

    fn count_rows(&mut self, table_id: Uuid) -> Result<usize> {
        Store::count_rows(self, table_id)
    }

    fn list_columns(&mut self, table_id: Uuid) -> Result<Vec<Column>> {
        Store::list_columns(self, table_id)
    }

    fn upsert_cell(&mut self, row_id: Uuid, column_id: Uuid, value: CellValue, _style: CommitStyle) -> Result<CellValue> {
        let table_id = self.owning_table(row_id);
        let saved = Store::upsert_cell(self, row_id, column_id, value).map(|record| record.value);
        discard_changes(self, table_id);
        saved
    }

    fn create_row(&mut self, table_id: Uuid) -> Result<RowView> {
        let row = Store::create_row(self, table_id);
        discard_changes(self, Some(table_id));
        row
    }

    fn delete_rows(&mut self, row_ids: &[Uuid]) -> Result<usize> {
        let tables: BTreeSet<Uuid> = row_ids.iter().filter_map(|id| self.owning_table(*id)).collect();
        let deleted = Store::delete_rows(self, row_ids);
        discard_changes(self, tables);
        deleted
    }
}

/// Focused cell: a row index into the loaded rows and a column index into
/// the visible columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub row: usize,
    pub column: usize,
}

impl CellPosition {
    pub fn new(row: usize, column: usize) -> Self {
        CellPosition { row, column }
    }
}

/// A row to draw and where to draw it
#[derive(Debug, Clone, Copy)]
pub struct RenderedRow<'a> {
    pub item: VirtualItem,
    pub row: &'a RowView,
}

pub struct TableView<S: RowSource> {
    source: S,
    table_id: Uuid,
    config: GridConfig,
    columns: Vec<Column>,
    session: ViewSession,
    search: String,
    cache: RowCache,
    virtualizer: RowVirtualizer,
    trigger: FetchTrigger,
    editors: HashMap<(Uuid, Uuid), CellEditor>,
    focus: Option<CellPosition>,
}

impl<S: RowSource> TableView<S> {
    /// Open a table: load its columns, its row count and the first page
    pub fn open(mut source: S, table_id: Uuid, config: GridConfig) -> Result<Self> {
        let columns = source.list_columns(table_id)?;
        let mut view = TableView {
            virtualizer: RowVirtualizer::from_config(0, &config),
            trigger: FetchTrigger::new(config.fetch_threshold),
            source,
            table_id,
            config,
            columns,
            session: ViewSession::new(table_id),
            search: String::new(),
            cache: RowCache::new(),
            editors: HashMap::new(),
            focus: None,
        };
        view.refresh_total()?;
        view.load_next_page()?;
        Ok(view)
    }

    pub fn table_id(&self) -> Uuid {
        self.table_id
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn cache(&self) -> &RowCache {
        &self.cache
    }

    pub fn virtualizer(&self) -> &RowVirtualizer {
        &self.virtualizer
    }

    pub fn session(&self) -> &ViewSession {
        &self.session
    }

    pub fn view_config(&self) -> &ViewConfig {
        self.session.config()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// Visible read error, if the last fetch failed
    pub fn error(&self) -> Option<&str> {
        self.cache.error()
    }

    /// Every column in display order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Columns not hidden by the current view
    pub fn visible_columns(&self) -> Vec<&Column> {
        let config = self.session.config();
        self.columns.iter().filter(|c| !config.is_hidden(c.id)).collect()
    }

    pub fn cell_text(&self, row: usize, column_id: Uuid) -> Option<String> {
        self.cache.row(row)?.cell(column_id).map(CellValue::display_text)
    }

    pub fn editor(&self, row_id: Uuid, column_id: Uuid) -> Option<&CellEditor> {
        self.editors.get(&(row_id, column_id))
    }

    fn query(&self, cursor: Option<String>, limit: usize) -> RowQuery {
        let config = self.session.config();
        RowQuery::new(self.table_id, limit)
            .with_cursor(cursor)
            .with_filters(config.filters.clone())
            .with_sorts(config.sorts.clone())
            .with_search(self.search.clone())
    }

    // ==================== Loading ====================

    pub fn refresh_total(&mut self) -> Result<usize> {
        let total = self.source.count_rows(self.table_id)?;
        self.cache.set_total(total);
        Ok(total)
    }

    /// Authorise the next page without fetching it, for callers that run the
    /// request themselves. Hand the result to `complete_fetch`.
    pub fn request_next_page(&mut self) -> Option<(FetchTicket, RowQuery)> {
        let ticket = self.cache.begin_next_page(self.config.effective_page_size())?;
        let query = self.query(ticket.cursor.clone(), ticket.rows_wanted);
        Some((ticket, query))
    }

    pub fn complete_fetch(&mut self, ticket: &FetchTicket, result: Result<RowPage>) -> Result<ApplyOutcome> {
        match result {
            Ok(page) => {
                let outcome = self.cache.apply(ticket, page);
                if outcome != ApplyOutcome::Stale {
                    self.rows_changed();
                }
                Ok(outcome)
            }
            Err(err) => {
                self.cache.fail(ticket, &err);
                Err(err)
            }
        }
    }

    /// Fetch and append the next page. Returns false when nothing was fetched.
    pub fn load_next_page(&mut self) -> Result<bool> {
        let Some((ticket, query)) = self.request_next_page() else {
            return Ok(false);
        };
        let result = self.source.fetch_rows(&query);
        let outcome = self.complete_fetch(&ticket, result)?;
        Ok(matches!(outcome, ApplyOutcome::Applied { .. }))
    }

    /// Refetch every loaded row in one pass of consecutive pages
    pub fn reload(&mut self) -> Result<ApplyOutcome> {
        let page_size = self.config.effective_page_size();
        let ticket = self.cache.begin_reload(page_size);
        let result = self.fetch_window(ticket.rows_wanted, page_size);
        self.complete_fetch(&ticket, result)
    }

    fn fetch_window(&mut self, wanted: usize, page_size: usize) -> Result<RowPage> {
        let mut rows = Vec::with_capacity(wanted);
        let mut cursor = None;
        loop {
            let limit = page_size.min(wanted - rows.len());
            let query = self.query(cursor, limit);
            let page = self.source.fetch_rows(&query)?;
            rows.extend(page.rows);
            cursor = page.next_cursor;
            if cursor.is_none() || rows.len() >= wanted {
                break;
            }
        }
        Ok(RowPage {
            rows,
            next_cursor: cursor,
        })
    }

    /// Scroll handler: loads the next page when near the bottom
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> Result<bool> {
        if self
            .trigger
            .should_fetch(metrics, self.cache.is_fetching_next_page(), self.cache.has_more())
        {
            return self.load_next_page();
        }
        Ok(false)
    }

    /// Rows to mount for the given scroll position
    pub fn render(&self, scroll_top: f64, viewport_height: f64) -> Vec<RenderedRow<'_>> {
        self.virtualizer
            .virtual_items(scroll_top, viewport_height)
            .into_iter()
            .filter_map(|item| self.cache.row(item.index).map(|row| RenderedRow { item, row }))
            .collect()
    }

    pub fn measure_row(&mut self, index: usize, height: f64) -> bool {
        self.virtualizer.measure(index, height)
    }

    pub fn total_size(&self) -> f64 {
        self.virtualizer.total_size()
    }

    fn rows_changed(&mut self) {
        self.virtualizer.set_count(self.cache.len());

        let server_rows = self.cache.server_rows();
        for ((row_id, column_id), editor) in self.editors.iter_mut() {
            if let Some(row) = server_rows.iter().find(|r| r.id == *row_id) {
                editor.sync_server_value(row.cell(*column_id).cloned());
            }
        }
        self.editors
            .retain(|_, e| e.phase() != EditPhase::Viewing || e.has_pending_write());
        for editor in self.editors.values().filter(|e| e.is_optimistic()) {
            self.cache
                .set_cell(editor.row_id(), editor.column_id(), editor.display_value().clone());
        }

        if let Some(pos) = self.focus {
            if pos.row >= self.cache.len() {
                self.focus = None;
            }
        }
    }

    /// Invalidate, recount and reload after a reconciling change. Read
    /// failures stay visible on the cache.
    fn reconcile(&mut self) {
        self.cache.invalidate();
        if let Err(err) = self.refresh_total() {
            log::warn!("row count failed for table {}: {}", self.table_id, err);
        }
        if let Err(err) = self.reload() {
            log::debug!("reload after write failed: {}", err);
        }
    }

    // ==================== Descriptors ====================

    /// Drop the loaded window and start again from the first page
    fn restart(&mut self) {
        self.cache.reset();
        self.virtualizer.reset_measurements();
        self.virtualizer.set_count(0);
        self.editors.retain(|_, e| e.has_pending_write());
        self.focus = None;
        if let Err(err) = self.load_next_page() {
            log::debug!("first page after descriptor change failed: {}", err);
        }
    }

    /// Apply a saved view. The descriptor changes it makes are never saved back.
    pub fn apply_view(&mut self, view: &SavedView) {
        let token = self.session.apply(view);
        self.session.change(ChangeOrigin::Apply(token), view.config.clone());
        self.restart();
        self.session.finish_apply(token);
    }

    /// A user edit of filters, sorts or hidden columns
    pub fn set_view_config(&mut self, config: ViewConfig) -> SaveDecision {
        let refetch = {
            let current = self.session.config();
            current.filters != config.filters || current.sorts != config.sorts
        };
        let decision = self.session.change(ChangeOrigin::User, config);
        if refetch {
            self.restart();
        } else {
            self.clamp_focus();
        }
        decision
    }

    pub fn set_search(&mut self, search: &str) {
        if self.search == search {
            return;
        }
        self.search = search.to_string();
        self.restart();
    }

    /// Reload the column list, e.g. after a column was added, edited or deleted
    pub fn refresh_columns(&mut self) -> Result<()> {
        self.columns = self.source.list_columns(self.table_id)?;
        let columns = &self.columns;
        self.editors.retain(|(_, column_id), _| columns.iter().any(|c| c.id == *column_id));

        let config = self.session.config();
        let gone: BTreeSet<Uuid> = config
            .filters
            .iter()
            .map(|f| f.column_id)
            .chain(config.sorts.iter().map(|s| s.column_id))
            .chain(config.hidden_columns.iter().copied())
            .filter(|id| !self.columns.iter().any(|c| c.id == *id))
            .collect();
        let mut refetch = false;
        for column_id in gone {
            refetch |= self.session.forget_column(column_id);
        }

        if refetch {
            self.restart();
        } else {
            self.clamp_focus();
        }
        Ok(())
    }

    // ==================== Focus and editing ====================

    pub fn focus(&self) -> Option<CellPosition> {
        self.focus
    }

    pub fn set_focus(&mut self, position: CellPosition) -> bool {
        if position.row >= self.cache.len() || position.column >= self.visible_columns().len() {
            return false;
        }
        self.focus = Some(position);
        true
    }

    fn clamp_focus(&mut self) {
        let columns = self.visible_columns().len();
        if let Some(pos) = self.focus {
            if columns == 0 || pos.row >= self.cache.len() {
                self.focus = None;
            } else if pos.column >= columns {
                self.focus = Some(CellPosition::new(pos.row, columns - 1));
            }
        }
    }

    /// Next cell in Tab order: the next visible column, wrapping to the first
    /// column of the next row. The last cell stays put.
    pub fn next_position(&self, position: CellPosition) -> CellPosition {
        if position.column + 1 < self.visible_columns().len() {
            CellPosition::new(position.row, position.column + 1)
        } else if position.row + 1 < self.cache.len() {
            CellPosition::new(position.row + 1, 0)
        } else {
            position
        }
    }

    fn focused_cell(&self) -> Option<(Uuid, Uuid, ColumnType)> {
        let pos = self.focus?;
        let row = self.cache.row(pos.row)?;
        let column = self.visible_columns().get(pos.column).copied()?;
        Some((row.id, column.id, column.column_type))
    }

    /// Open the editor on the focused cell
    pub fn begin_edit(&mut self) -> bool {
        let Some((row_id, column_id, column_type)) = self.focused_cell() else {
            return false;
        };
        let server_value = self
            .cache
            .server_rows()
            .iter()
            .find(|r| r.id == row_id)
            .and_then(|r| r.cell(column_id).cloned());
        self.editors
            .entry((row_id, column_id))
            .or_insert_with(|| CellEditor::new(row_id, column_id, column_type, server_value))
            .begin_edit()
    }

    pub fn input(&mut self, text: &str) {
        if let Some((row_id, column_id, _)) = self.focused_cell() {
            if let Some(editor) = self.editors.get_mut(&(row_id, column_id)) {
                editor.input(text);
            }
        }
    }

    /// Close the focused editor and return the write to send, for callers
    /// that run the request themselves. Hand the result to `complete_write`.
    ///
    /// The new value is shown at once. Tab moves focus to the next cell
    /// without waiting for the server, whether or not anything was written.
    pub fn request_commit(&mut self, trigger: CommitTrigger) -> Option<WriteRequest> {
        let (row_id, column_id, _) = self.focused_cell()?;
        let request = self
            .editors
            .get_mut(&(row_id, column_id))
            .and_then(|editor| editor.commit(trigger));
        if let Some(request) = &request {
            self.cache.set_cell(row_id, column_id, request.value.clone());
        }
        if trigger == CommitTrigger::Tab {
            self.advance_focus();
        }
        request
    }

    /// Fold in the server's answer to a write.
    ///
    /// Silent writes patch the cache; reconciling writes invalidate and
    /// reload it. A rejected write reverts the displayed value and reopens
    /// the editor with the rejected input, taking focus back to that cell.
    /// Answers to superseded writes are ignored.
    pub fn complete_write(&mut self, request: &WriteRequest, result: Result<CellValue>) -> EditOutcome {
        let (row_id, column_id) = (request.row_id, request.column_id);
        let saved = result.as_ref().ok().cloned();
        let Some(editor) = self.editors.get_mut(&(row_id, column_id)) else {
            return EditOutcome::Stale;
        };
        let outcome = editor.resolve(request.token, result);

        match (&outcome, saved) {
            (EditOutcome::Reconciled, Some(saved)) => {
                self.cache.confirm_cell(row_id, column_id, saved);
                if request.style == CommitStyle::Reconciling {
                    self.reconcile();
                }
            }
            (EditOutcome::Reverted { .. }, _) => {
                let shown = editor.display_value().clone();
                self.cache.set_cell(row_id, column_id, shown);
                if let Some(position) = self.position_of(row_id, column_id) {
                    self.focus = Some(position);
                }
            }
            _ => {}
        }
        outcome
    }

    /// Commit the focused editor and send the write straight away.
    /// Returns `None` when nothing was written.
    pub fn commit(&mut self, trigger: CommitTrigger) -> Option<EditOutcome> {
        let request = self.request_commit(trigger)?;
        let result = self
            .source
            .upsert_cell(request.row_id, request.column_id, request.value.clone(), request.style);
        Some(self.complete_write(&request, result))
    }

    fn position_of(&self, row_id: Uuid, column_id: Uuid) -> Option<CellPosition> {
        let row = self.cache.position_of(row_id)?;
        let column = self.visible_columns().iter().position(|c| c.id == column_id)?;
        Some(CellPosition::new(row, column))
    }

    /// Escape on the focused cell
    pub fn cancel_edit(&mut self) -> bool {
        let Some((row_id, column_id, _)) = self.focused_cell() else {
            return false;
        };
        let Some(editor) = self.editors.get_mut(&(row_id, column_id)) else {
            return false;
        };
        if editor.cancel() {
            let shown = editor.display_value().clone();
            self.cache.set_cell(row_id, column_id, shown);
        }
        true
    }

    fn advance_focus(&mut self) {
        if let Some(pos) = self.focus {
            self.focus = Some(self.next_position(pos));
        }
    }

    // ==================== Rows ====================

    /// Append a row, shown immediately and removed again if the server refuses
    pub fn insert_row(&mut self) -> Result<RowView> {
        self.cache.insert_row(RowView {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            cells: HashMap::new(),
        });
        self.virtualizer.set_count(self.cache.len());

        match self.source.create_row(self.table_id) {
            Ok(row) => {
                self.reconcile();
                Ok(row)
            }
            Err(err) => {
                log::warn!("row insert into table {} failed: {}", self.table_id, err);
                self.cache.rollback();
                self.rows_changed();
                Err(err)
            }
        }
    }

    /// Delete rows, hidden immediately and restored if the server refuses
    pub fn delete_rows(&mut self, row_ids: &[Uuid]) -> Result<usize> {
        self.cache.remove_rows(row_ids);
        self.virtualizer.set_count(self.cache.len());

        match self.source.delete_rows(row_ids) {
            Ok(deleted) => {
                self.editors.retain(|(row_id, _), _| !row_ids.contains(row_id));
                self.reconcile();
                Ok(deleted)
            }
            Err(err) => {
                log::warn!("row delete in table {} failed: {}", self.table_id, err);
                self.cache.rollback();
                self.rows_changed();
                Err(err)
            }
        }
    }
}
