/// Windowed Row Cache
///
/// Accumulates fetched pages into one ordered, client-visible row sequence.
///
/// Two sequences are kept: the server-derived sequence, built only from page
/// responses, and the visible sequence, which also carries optimistic local
/// edits. Whenever the server-derived sequence changes the visible sequence is
/// replaced by it wholesale; unconfirmed local edits are dropped at that point,
/// while confirmed writes come back through the fetched rows.
///
/// Every fetch is issued a ticket with a sequence number. A response whose
/// ticket is older than the newest response already applied is discarded, so
/// a slow stale page cannot clobber fresher state.

use uuid::Uuid;

use crate::column::CellValue;
use crate::error::GridError;
use crate::query::RowPage;
use crate::table::RowView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Append the page after the last loaded row
    NextPage,
    /// Replace every loaded row
    Reload,
}

/// A fetch the cache has authorised; hand it back with the response
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub seq: u64,
    pub kind: FetchKind,
    pub cursor: Option<String>,
    /// Rows wanted: one page for `NextPage`, every loaded row for `Reload`
    pub rows_wanted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { rows: usize },
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct RowCache {
    server_rows: Vec<RowView>,
    rows: Vec<RowView>,
    next_cursor: Option<String>,
    loaded_once: bool,
    total: Option<usize>,
    page_in_flight: Option<u64>,
    next_seq: u64,
    newest_applied: u64,
    error: Option<String>,
    stale: bool,
    invalidations: u64,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The visible row sequence
    pub fn rows(&self) -> &[RowView] {
        &self.rows
    }

    /// The last server-derived row sequence
    pub fn server_rows(&self) -> &[RowView] {
        &self.server_rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&RowView> {
        self.rows.get(index)
    }

    pub fn position_of(&self, row_id: Uuid) -> Option<usize> {
        self.rows.iter().position(|r| r.id == row_id)
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn set_total(&mut self, total: usize) {
        self.total = Some(total);
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_fetching_next_page(&self) -> bool {
        self.page_in_flight.is_some()
    }

    /// True after a reconciling write until the next reload is applied
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// More rows exist on the server beyond what is loaded
    pub fn has_more(&self) -> bool {
        if !self.loaded_once {
            return true;
        }
        self.next_cursor.is_some() && self.total.map_or(true, |t| self.server_rows.len() < t)
    }

    fn issue(&mut self, kind: FetchKind, cursor: Option<String>, rows_wanted: usize) -> FetchTicket {
        self.next_seq += 1;
        FetchTicket {
            seq: self.next_seq,
            kind,
            cursor,
            rows_wanted,
        }
    }

    /// Authorise fetching the next page. Returns `None` while a page fetch is
    /// in flight or when nothing more remains.
    pub fn begin_next_page(&mut self, page_size: usize) -> Option<FetchTicket> {
        if self.page_in_flight.is_some() || !self.has_more() {
            return None;
        }
        let ticket = self.issue(FetchKind::NextPage, self.next_cursor.clone(), page_size);
        self.page_in_flight = Some(ticket.seq);
        Some(ticket)
    }

    /// Authorise reloading every loaded row (at least one page)
    pub fn begin_reload(&mut self, page_size: usize) -> FetchTicket {
        let wanted = self.server_rows.len().max(page_size);
        self.issue(FetchKind::Reload, None, wanted)
    }

    fn settle(&mut self, ticket: &FetchTicket) -> bool {
        if self.page_in_flight == Some(ticket.seq) {
            self.page_in_flight = None;
        }
        if ticket.seq < self.newest_applied {
            log::warn!(
                "discarding stale {:?} response (ticket {} < applied {})",
                ticket.kind,
                ticket.seq,
                self.newest_applied
            );
            return false;
        }
        true
    }

    /// Apply a fetched page for a `NextPage` ticket, or a concatenation of
    /// pages for a `Reload` ticket.
    pub fn apply(&mut self, ticket: &FetchTicket, page: RowPage) -> ApplyOutcome {
        if !self.settle(ticket) {
            return ApplyOutcome::Stale;
        }
        let count = page.rows.len();
        match ticket.kind {
            FetchKind::NextPage => self.server_rows.extend(page.rows),
            FetchKind::Reload => {
                self.server_rows = page.rows;
                self.stale = false;
            }
        }
        self.next_cursor = page.next_cursor;
        self.loaded_once = true;
        self.newest_applied = ticket.seq;
        self.error = None;
        self.rows = self.server_rows.clone();
        ApplyOutcome::Applied { rows: count }
    }

    /// Record a failed fetch; the error stays visible until a fetch succeeds
    pub fn fail(&mut self, ticket: &FetchTicket, error: &GridError) {
        if !self.settle(ticket) {
            return;
        }
        log::warn!("row fetch failed: {}", error);
        self.error = Some(error.to_string());
    }

    /// Mark the cache out of date after a reconciling write
    pub fn invalidate(&mut self) {
        self.stale = true;
        self.invalidations += 1;
    }

    fn update_rows<F>(&mut self, f: F)
    where
        F: FnOnce(&[RowView]) -> Vec<RowView>,
    {
        self.rows = f(&self.rows);
    }

    /// Optimistically change one cell. Returns false if the row is not loaded.
    pub fn set_cell(&mut self, row_id: Uuid, column_id: Uuid, value: CellValue) -> bool {
        if self.position_of(row_id).is_none() {
            return false;
        }
        self.update_rows(|rows| {
            rows.iter()
                .map(|r| {
                    let mut r = r.clone();
                    if r.id == row_id {
                        r.cells.insert(column_id, value.clone());
                    }
                    r
                })
                .collect()
        });
        true
    }

    /// Optimistically append a row
    pub fn insert_row(&mut self, row: RowView) {
        self.update_rows(|rows| rows.iter().cloned().chain(std::iter::once(row)).collect());
    }

    /// Optimistically remove rows
    pub fn remove_rows(&mut self, ids: &[Uuid]) {
        self.update_rows(|rows| rows.iter().filter(|r| !ids.contains(&r.id)).cloned().collect());
    }

    /// Record a write the server confirmed without a reload, so later pages
    /// appended to the server sequence do not bring the old value back.
    pub fn confirm_cell(&mut self, row_id: Uuid, column_id: Uuid, value: CellValue) {
        if let Some(row) = self.server_rows.iter_mut().find(|r| r.id == row_id) {
            row.cells.insert(column_id, value.clone());
        }
        self.set_cell(row_id, column_id, value);
    }

    /// Discard every local change and show the server-derived sequence again
    pub fn rollback(&mut self) {
        self.rows = self.server_rows.clone();
    }

    /// Drop the loaded window, e.g. when the filters or sorts change.
    /// Responses to tickets issued before the reset are treated as stale.
    pub fn reset(&mut self) {
        self.server_rows.clear();
        self.rows.clear();
        self.next_cursor = None;
        self.loaded_once = false;
        self.page_in_flight = None;
        self.error = None;
        self.stale = false;
        self.next_seq += 1;
        self.newest_applied = self.next_seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn row() -> RowView {
        RowView {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            cells: HashMap::new(),
        }
    }

    fn page(rows: Vec<RowView>, more: bool) -> RowPage {
        let next_cursor = if more { rows.last().map(|r| r.id.to_string()) } else { None };
        RowPage { rows, next_cursor }
    }

    #[test]
    fn test_pages_accumulate() {
        let mut cache = RowCache::new();
        cache.set_total(4);

        let t1 = cache.begin_next_page(2).unwrap();
        assert!(cache.begin_next_page(2).is_none(), "second fetch while one is in flight");
        assert_eq!(cache.apply(&t1, page(vec![row(), row()], true)), ApplyOutcome::Applied { rows: 2 });

        let t2 = cache.begin_next_page(2).unwrap();
        assert_eq!(t2.cursor, Some(cache.rows()[1].id.to_string()));
        cache.apply(&t2, page(vec![row(), row()], false));

        assert_eq!(cache.len(), 4);
        assert!(!cache.has_more());
        assert!(cache.begin_next_page(2).is_none());
    }

    #[test]
    fn test_total_caps_fetching() {
        let mut cache = RowCache::new();
        cache.set_total(2);
        let t = cache.begin_next_page(2).unwrap();
        // The server still reports a cursor but the count says everything is loaded
        cache.apply(&t, page(vec![row(), row()], true));
        assert!(!cache.has_more());
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let mut cache = RowCache::new();
        let slow = cache.begin_next_page(10).unwrap();
        let reload = cache.begin_reload(10);

        let fresh = vec![row(), row(), row()];
        cache.apply(&reload, page(fresh.clone(), false));
        assert_eq!(cache.apply(&slow, page(vec![row()], false)), ApplyOutcome::Stale);

        assert_eq!(cache.rows(), fresh.as_slice());
        assert!(!cache.is_fetching_next_page());
    }

    #[test]
    fn test_server_update_overwrites_local_edits() {
        let mut cache = RowCache::new();
        let first = row();
        let t = cache.begin_next_page(10).unwrap();
        cache.apply(&t, page(vec![first.clone()], false));

        let column = Uuid::new_v4();
        assert!(cache.set_cell(first.id, column, CellValue::Text("local".to_string())));
        assert_eq!(cache.rows()[0].cell(column), Some(&CellValue::Text("local".to_string())));
        assert_eq!(cache.server_rows()[0].cell(column), None);

        let reload = cache.begin_reload(10);
        cache.apply(&reload, page(vec![first], false));
        assert_eq!(cache.rows()[0].cell(column), None);
    }

    #[test]
    fn test_optimistic_insert_remove_and_rollback() {
        let mut cache = RowCache::new();
        let (a, b) = (row(), row());
        let t = cache.begin_next_page(10).unwrap();
        cache.apply(&t, page(vec![a.clone(), b.clone()], false));

        let c = row();
        cache.insert_row(c.clone());
        cache.remove_rows(&[a.id]);
        assert_eq!(cache.rows().iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id, c.id]);

        cache.rollback();
        assert_eq!(cache.rows().iter().map(|r| r.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(!cache.set_cell(c.id, Uuid::new_v4(), CellValue::Number(None)));
    }

    #[test]
    fn test_failed_fetch_sets_error_until_success() {
        let mut cache = RowCache::new();
        let t = cache.begin_next_page(10).unwrap();
        cache.fail(&t, &GridError::Transport("connection reset".to_string()));
        assert_eq!(cache.error(), Some("Transport error: connection reset"));
        assert!(!cache.is_fetching_next_page());

        let retry = cache.begin_next_page(10).unwrap();
        cache.apply(&retry, page(vec![row()], false));
        assert_eq!(cache.error(), None);
    }

    #[test]
    fn test_reset_outdates_earlier_tickets() {
        let mut cache = RowCache::new();
        let old = cache.begin_next_page(10).unwrap();
        cache.reset();
        let fresh = cache.begin_next_page(10).unwrap();
        assert_eq!(cache.apply(&old, page(vec![row()], true)), ApplyOutcome::Stale);
        assert_eq!(cache.apply(&fresh, page(vec![row(), row()], false)), ApplyOutcome::Applied { rows: 2 });
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_confirmed_cell_survives_next_page() {
        let mut cache = RowCache::new();
        let first = row();
        let t = cache.begin_next_page(1).unwrap();
        cache.apply(&t, page(vec![first.clone()], true));

        let column = Uuid::new_v4();
        cache.confirm_cell(first.id, column, CellValue::Number(Some(2.0)));
        let t = cache.begin_next_page(1).unwrap();
        cache.apply(&t, page(vec![row()], false));
        assert_eq!(cache.rows()[0].cell(column), Some(&CellValue::Number(Some(2.0))));
    }

    #[test]
    fn test_invalidate_until_reload() {
        let mut cache = RowCache::new();
        cache.invalidate();
        assert!(cache.is_stale());
        assert_eq!(cache.invalidations(), 1);
        let reload = cache.begin_reload(5);
        assert_eq!(reload.rows_wanted, 5);
        cache.apply(&reload, page(vec![], false));
        assert!(!cache.is_stale());
    }
}
