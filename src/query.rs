//! Row fetch procedure: one page of a table's rows, filtered, searched and
//! optionally sorted, with cursor pagination.
//!
//! Without sort criteria rows come back in creation order and the cursor is
//! located in the table's full row order. With sort criteria every qualifying
//! row is collected and sorted in memory before the page is sliced, which
//! costs O(matching rows) per request.
//!
//! Cursors are exclusive: a page starts with the first qualifying row after
//! the cursor row, and `next_cursor` is the id of the last row of the page.
//! Pagination is only stable while no rows are inserted or deleted ahead of
//! the cursor.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::error::{GridError, Result};
use crate::filter::{compare_by, CompiledFilter, FilterCondition, SortCriterion};
use crate::table::{Row, RowView, Store};

/// Largest page the procedure serves
pub const MAX_PAGE_SIZE: usize = 100;

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowQuery {
    pub table_id: Uuid,
    pub limit: usize,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub sorts: Vec<SortCriterion>,
    #[serde(default)]
    pub search: String,
}

impl RowQuery {
    pub fn new(table_id: Uuid, limit: usize) -> Self {
        RowQuery {
            table_id,
            limit,
            cursor: None,
            filters: Vec::new(),
            sorts: Vec::new(),
            search: String::new(),
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_filters(mut self, filters: Vec<FilterCondition>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sorts(mut self, sorts: Vec<SortCriterion>) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }
}

/// One page of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPage {
    pub rows: Vec<RowView>,
    pub next_cursor: Option<String>,
}

/// Total number of rows in a table, ignoring filters
pub fn count_rows(store: &Store, table_id: Uuid) -> Result<usize> {
    store.count_rows(table_id)
}

/// Fetch one page of rows
pub fn fetch_rows(store: &Store, query: &RowQuery) -> Result<RowPage> {
    if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
        return Err(GridError::InvalidLimit(query.limit));
    }
    let table = store.table(query.table_id)?;
    let filters = CompiledFilter::compile_all(&query.filters, table.raw_columns())?;
    for sort in &query.sorts {
        if table.column(sort.column_id).is_none() {
            return Err(GridError::ColumnNotFound(sort.column_id));
        }
    }
    let search = query.search.trim().to_lowercase();
    let qualifies = |row: &Row| row_matches(row, &filters) && matches_search(row, &search);

    let page: Vec<&Row> = if query.sorts.is_empty() {
        let start = match &query.cursor {
            Some(cursor) => {
                let id = parse_cursor(cursor)?;
                table
                    .row_position(id)
                    .ok_or_else(|| GridError::CursorNotFound(cursor.clone()))?
                    + 1
            }
            None => 0,
        };
        table.rows()[start..]
            .iter()
            .filter(|&r| qualifies(r))
            .take(query.limit + 1)
            .collect()
    } else {
        let mut matching: Vec<&Row> = table.rows().iter().filter(|&r| qualifies(r)).collect();
        // Stable, so ties keep creation order
        matching.sort_by(|a, b| compare_rows(&query.sorts, a, b));
        let start = match &query.cursor {
            Some(cursor) => {
                let id = parse_cursor(cursor)?;
                matching
                    .iter()
                    .position(|r| r.id == id)
                    .ok_or_else(|| GridError::CursorNotFound(cursor.clone()))?
                    + 1
            }
            None => 0,
        };
        matching.into_iter().skip(start).take(query.limit + 1).collect()
    };

    let has_more = page.len() > query.limit;
    let rows: Vec<RowView> = page.into_iter().take(query.limit).map(Row::to_view).collect();
    let next_cursor = if has_more {
        rows.last().map(|r| r.id.to_string())
    } else {
        None
    };

    log::debug!(
        "fetch_rows table={} limit={} cursor={:?} filters={} sorts={} -> {} rows, more={}",
        query.table_id,
        query.limit,
        query.cursor,
        query.filters.len(),
        query.sorts.len(),
        rows.len(),
        has_more
    );
    Ok(RowPage { rows, next_cursor })
}

fn parse_cursor(cursor: &str) -> Result<Uuid> {
    Uuid::parse_str(cursor).map_err(|_| GridError::CursorNotFound(cursor.to_string()))
}

fn row_matches(row: &Row, filters: &[CompiledFilter]) -> bool {
    filters.iter().all(|f| f.matches(row.cell(f.column_id())))
}

fn matches_search(row: &Row, needle: &str) -> bool {
    needle.is_empty()
        || row
            .cells()
            .any(|c| c.value.display_text().to_lowercase().contains(needle))
}

fn compare_rows(criteria: &[SortCriterion], a: &Row, b: &Row) -> Ordering {
    compare_by(criteria, |id| a.cell(id), |id| b.cell(id))
}
