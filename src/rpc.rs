/// Transport-independent procedure dispatch.
///
/// `dispatch` runs one `Call` against the store. After a mutation the
/// changes recorded on each touched table are drained into an
/// `Invalidation` for the transport to broadcast. Silent cell writes are
/// drained without one, so rapid Tab edits do not make every other client
/// refetch.
use std::collections::BTreeSet;

use uuid::Uuid;

use crate::editor::CommitStyle;
use crate::error::{GridError, Result};
use crate::messages::{Call, Invalidation, Reply, TableSummary};
use crate::query;
use crate::table::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub reply: Reply,
    pub invalidations: Vec<Invalidation>,
}

fn summary(store: &Store, table_id: Uuid) -> Result<TableSummary> {
    let table = store.table(table_id)?;
    Ok(TableSummary {
        id: table.id,
        base_id: table.base_id,
        name: table.name.clone(),
    })
}

/// Tables whose changesets a call may touch, looked up before the call runs
/// since deletions drop the id indexes.
fn touched_tables(store: &Store, call: &Call) -> BTreeSet<Uuid> {
    let ids: Vec<Uuid> = match call {
        Call::CreateColumn { table_id, .. }
        | Call::CreateRow { table_id }
        | Call::GenerateRows { table_id, .. }
        | Call::CreateView { table_id, .. }
        | Call::RenameTable { table_id, .. } => vec![*table_id],
        Call::EditColumn { column_id, .. } | Call::DeleteColumn { column_id } => {
            store.owning_table(*column_id).into_iter().collect()
        }
        Call::UpsertCell { row_id, .. } => store.owning_table(*row_id).into_iter().collect(),
        Call::DeleteRows { row_ids } => row_ids.iter().filter_map(|id| store.owning_table(*id)).collect(),
        Call::UpdateView { view_id, .. } | Call::DeleteView { view_id } => {
            store.owning_table(*view_id).into_iter().collect()
        }
        _ => Vec::new(),
    };
    ids.into_iter().collect()
}

/// Execute one call
pub fn dispatch(store: &mut Store, call: Call) -> Result<Dispatched> {
    if !call.is_mutation() {
        return Ok(Dispatched {
            reply: execute(store, call)?,
            invalidations: Vec::new(),
        });
    }

    let touched = touched_tables(store, &call);
    let silent = matches!(
        call,
        Call::UpsertCell {
            style: CommitStyle::Silent,
            ..
        }
    );

    let reply = execute(store, call)?;

    let mut invalidations = Vec::new();
    for table_id in touched {
        let Ok(table) = store.table_mut(table_id) else {
            continue;
        };
        let changes = table.drain_changes();
        if changes.is_empty() || silent {
            continue;
        }
        invalidations.push(Invalidation {
            table_id,
            revision: table.revision(),
            changes,
        });
    }
    Ok(Dispatched { reply, invalidations })
}

fn execute(store: &mut Store, call: Call) -> Result<Reply> {
    let reply = match call {
        Call::ListBases => Reply::Bases(store.list_bases()),
        Call::CreateBase { name } => Reply::Base(store.create_base(&name)?),
        Call::RenameBase { base_id, name } => Reply::Base(store.rename_base(base_id, &name)?),
        Call::DeleteBase { base_id } => {
            store.delete_base(base_id)?;
            Reply::Done
        }

        Call::ListTables { base_id } => {
            if !store.list_bases().iter().any(|b| b.id == base_id) {
                return Err(GridError::BaseNotFound(base_id));
            }
            let tables = store
                .list_tables(base_id)
                .into_iter()
                .map(|(id, name)| TableSummary { id, base_id, name })
                .collect();
            Reply::Tables(tables)
        }
        Call::CreateTable { base_id, name } => {
            let table_id = store.create_table(base_id, &name)?;
            Reply::Table(summary(store, table_id)?)
        }
        Call::RenameTable { table_id, name } => {
            store.rename_table(table_id, &name)?;
            Reply::Table(summary(store, table_id)?)
        }
        Call::DeleteTable { table_id } => {
            store.delete_table(table_id)?;
            Reply::Done
        }

        Call::ListColumns { table_id } => Reply::Columns(store.list_columns(table_id)?),
        Call::CreateColumn {
            table_id,
            name,
            column_type,
        } => Reply::Column(store.create_column(table_id, &name, column_type)?),
        Call::EditColumn { column_id, edit } => Reply::Column(store.edit_column(column_id, edit)?),
        Call::DeleteColumn { column_id } => {
            store.delete_column(column_id)?;
            Reply::Done
        }

        Call::GetRows(query) => Reply::Rows(query::fetch_rows(store, &query)?),
        Call::CountRows { table_id } => Reply::Count(query::count_rows(store, table_id)?),
        Call::CreateRow { table_id } => Reply::Row(store.create_row(table_id)?),
        Call::GenerateRows { table_id, count } => Reply::Generated(store.generate_rows(table_id, count)?),
        Call::DeleteRows { row_ids } => Reply::Deleted(store.delete_rows(&row_ids)?),
        Call::UpsertCell {
            row_id,
            column_id,
            value,
            ..
        } => Reply::Cell(store.upsert_cell(row_id, column_id, value)?),

        Call::ListViews { table_id } => Reply::Views(store.list_views(table_id)?),
        Call::CreateView { table_id, name, config } => Reply::View(store.create_view(table_id, &name, config)?),
        Call::UpdateView { view_id, name, config } => {
            Reply::View(store.update_view(view_id, name.as_deref(), config)?)
        }
        Call::DeleteView { view_id } => {
            store.delete_view(view_id)?;
            Reply::Done
        }

        Call::Subscribe { .. } => {
            return Err(GridError::InvalidRequest(
                "subscribe is only available on a WebSocket connection".to_string(),
            ))
        }
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::CellValue;
    use crate::query::RowQuery;

    fn setup() -> (Store, Uuid) {
        let mut store = Store::new();
        let base = store.create_base("Base").unwrap();
        let table_id = store.create_table(base.id, "Tasks").unwrap();
        (store, table_id)
    }

    fn first_row_and_column(store: &Store, table_id: Uuid) -> (Uuid, Uuid) {
        let table = store.table(table_id).unwrap();
        (table.rows()[0].id, table.columns()[0].id)
    }

    #[test]
    fn test_reads_do_not_invalidate() {
        let (mut store, table_id) = setup();
        let out = dispatch(&mut store, Call::GetRows(RowQuery::new(table_id, 10))).unwrap();
        match out.reply {
            Reply::Rows(page) => assert_eq!(page.rows.len(), 3),
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(out.invalidations.is_empty());
    }

    #[test]
    fn test_reads_leave_pending_changes_alone() {
        let (mut store, table_id) = setup();
        store.create_row(table_id).unwrap();

        let out = dispatch(&mut store, Call::CountRows { table_id }).unwrap();
        assert_eq!(out.reply, Reply::Count(4));
        assert_eq!(store.table(table_id).unwrap().changeset().len(), 1);

        let out = dispatch(&mut store, Call::CreateRow { table_id }).unwrap();
        assert_eq!(out.invalidations[0].changes.len(), 2);
        assert!(store.table(table_id).unwrap().changeset().is_empty());
    }

    #[test]
    fn test_reconciling_write_broadcasts() {
        let (mut store, table_id) = setup();
        let (row_id, column_id) = first_row_and_column(&store, table_id);
        let out = dispatch(
            &mut store,
            Call::UpsertCell {
                row_id,
                column_id,
                value: CellValue::Text("Edited".to_string()),
                style: CommitStyle::Reconciling,
            },
        )
        .unwrap();
        assert_eq!(out.invalidations.len(), 1);
        assert_eq!(out.invalidations[0].table_id, table_id);
        assert_eq!(out.invalidations[0].revision, 1);
        assert!(store.table(table_id).unwrap().changeset().is_empty());
    }

    #[test]
    fn test_silent_write_is_drained_without_broadcast() {
        let (mut store, table_id) = setup();
        let (row_id, column_id) = first_row_and_column(&store, table_id);
        let out = dispatch(
            &mut store,
            Call::UpsertCell {
                row_id,
                column_id,
                value: CellValue::Text("Quiet".to_string()),
                style: CommitStyle::Silent,
            },
        )
        .unwrap();
        assert!(out.invalidations.is_empty());
        assert!(store.table(table_id).unwrap().changeset().is_empty());
    }

    #[test]
    fn test_delete_rows_reports_owning_table() {
        let (mut store, table_id) = setup();
        let (row_id, _) = first_row_and_column(&store, table_id);
        let out = dispatch(&mut store, Call::DeleteRows { row_ids: vec![row_id] }).unwrap();
        assert_eq!(out.reply, Reply::Deleted(1));
        assert_eq!(out.invalidations[0].table_id, table_id);
    }

    #[test]
    fn test_errors_propagate() {
        let (mut store, _) = setup();
        let missing = Uuid::new_v4();
        let err = dispatch(&mut store, Call::ListColumns { table_id: missing }).unwrap_err();
        assert!(matches!(err, GridError::TableNotFound(id) if id == missing));
        assert!(dispatch(&mut store, Call::Subscribe { table_id: missing }).is_err());
    }

    #[test]
    fn test_list_tables() {
        let (mut store, table_id) = setup();
        let base_id = store.table(table_id).unwrap().base_id;
        let out = dispatch(&mut store, Call::ListTables { base_id }).unwrap();
        match out.reply {
            Reply::Tables(tables) => {
                assert_eq!(tables.len(), 1);
                assert_eq!(tables[0].name, "Tasks");
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
