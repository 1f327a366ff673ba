//! Gridbase - Collaborative Typed-Grid Tables
//!
//! A row store of bases, tables, typed columns and sparse cells, served one
//! cursor-paginated page at a time, plus the client side of the grid: a
//! windowed row cache, a row virtualizer, per-cell edit controllers with
//! optimistic writes, and saved views of filters, sorts and hidden columns.
//!
//! ```
//! use gridbase::{CellPosition, CommitTrigger, GridConfig, Store, TableView};
//!
//! let (store, table) = Store::with_demo_data().unwrap();
//! let mut grid = TableView::open(store, table, GridConfig::default()).unwrap();
//! assert_eq!(grid.cache().len(), 100);
//!
//! grid.set_focus(CellPosition::new(0, 0));
//! grid.begin_edit();
//! grid.input("Renamed");
//! grid.commit(CommitTrigger::Tab);
//! assert_eq!(grid.focus(), Some(CellPosition::new(0, 1)));
//! ```

pub mod error;
pub mod config;
pub mod column;
pub mod changeset;
pub mod filter;
pub mod view;
pub mod table;
pub mod query;
pub mod cache;
pub mod virtualizer;
pub mod editor;
pub mod grid;
pub mod messages;
pub mod rpc;

pub use error::{GridError, Result};
pub use config::{GridConfig, ServerConfig};
pub use column::{CellValue, Column, ColumnEdit, ColumnType};
pub use changeset::{Changeset, TableChange};
pub use filter::{FilterCondition, FilterOperator, SortCriterion, SortDirection};
pub use view::{AppliedViewStore, SaveDecision, SavedView, ViewConfig, ViewSession};
pub use table::{Base, CellRecord, GeneratedBatch, RowView, Store, Table};
pub use query::{count_rows, fetch_rows, RowPage, RowQuery, MAX_PAGE_SIZE};
pub use cache::{ApplyOutcome, FetchTicket, RowCache};
pub use virtualizer::{FetchTrigger, RowVirtualizer, ScrollMetrics, VirtualItem};
pub use editor::{CellEditor, CommitStyle, CommitTrigger, EditOutcome, EditPhase, WriteRequest, WriteToken};
pub use grid::{CellPosition, RowSource, TableView};
pub use messages::{Call, ClientMessage, Reply, ServerMessage};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_complete_workflow() {
        let mut store = Store::new();
        let base = store.create_base("Sales").unwrap();
        let table_id = store.create_table(base.id, "Deals").unwrap();
        store.generate_rows(table_id, 297).unwrap();

        let columns = store.list_columns(table_id).unwrap();
        let (name, notes, amount) = (columns[0].id, columns[1].id, columns[2].id);

        // Save a view over the RPC surface
        let dispatched = rpc::dispatch(
            &mut store,
            Call::CreateView {
                table_id,
                name: "Big deals".to_string(),
                config: ViewConfig {
                    filters: vec![FilterCondition::new(amount, FilterOperator::GreaterThan, "500")],
                    sorts: vec![SortCriterion::descending(amount)],
                    hidden_columns: vec![notes],
                },
            },
        )
        .unwrap();
        let saved = match dispatched.reply {
            Reply::View(view) => view,
            other => panic!("unexpected reply {:?}", other),
        };
        assert_eq!(dispatched.invalidations.len(), 1);

        // Open the grid and apply the view
        let mut grid = TableView::open(store, table_id, GridConfig::default()).unwrap();
        assert_eq!(grid.cache().len(), 100);
        grid.apply_view(&saved);
        assert_eq!(grid.visible_columns().len(), 2);

        // Scroll to the end, collecting every matching row exactly once
        while grid.cache().has_more() {
            assert!(grid.load_next_page().unwrap());
        }
        let ids: HashSet<_> = grid.cache().rows().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), grid.cache().len());
        let amounts: Vec<f64> = grid
            .cache()
            .rows()
            .iter()
            .filter_map(|r| r.cell(amount).and_then(CellValue::as_number))
            .collect();
        assert!(amounts.iter().all(|a| *a > 500.0));
        assert!(amounts.windows(2).all(|w| w[0] >= w[1]));

        // Rename the top deal with Tab, then fix the amount with Enter
        grid.set_focus(CellPosition::new(0, 0));
        grid.begin_edit();
        grid.input("Top deal");
        grid.commit(CommitTrigger::Tab);
        assert_eq!(grid.focus(), Some(CellPosition::new(0, 1)));
        assert_eq!(grid.cache().invalidations(), 0);

        grid.begin_edit();
        grid.input("1500");
        assert_eq!(grid.commit(CommitTrigger::Enter), Some(EditOutcome::Reconciled));
        assert_eq!(grid.cache().invalidations(), 1);
        assert_eq!(grid.cell_text(0, name).as_deref(), Some("Top deal"));
        assert_eq!(grid.cell_text(0, amount).as_deref(), Some("1500"));
    }

    #[test]
    fn test_pagination_matches_single_fetch() {
        let mut store = Store::new();
        let base = store.create_base("B").unwrap();
        let table_id = store.create_table(base.id, "T").unwrap();
        store.generate_rows(table_id, 250).unwrap();
        let amount = store.list_columns(table_id).unwrap()[2].id;

        let sorts = vec![SortCriterion::ascending(amount)];
        let mut paged = Vec::new();
        let mut cursor = None;
        loop {
            let query = RowQuery::new(table_id, 30).with_sorts(sorts.clone()).with_cursor(cursor);
            let page = fetch_rows(&store, &query).unwrap();
            paged.extend(page.rows.into_iter().map(|r| r.id));
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        let mut whole = Vec::new();
        let mut cursor = None;
        loop {
            let query = RowQuery::new(table_id, MAX_PAGE_SIZE).with_sorts(sorts.clone()).with_cursor(cursor);
            let page = fetch_rows(&store, &query).unwrap();
            whole.extend(page.rows.into_iter().map(|r| r.id));
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        assert_eq!(paged.len(), 253);
        assert_eq!(paged, whole);
    }
}
