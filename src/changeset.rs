/// Changeset - Change Tracking for Gridbase Tables
///
/// Every mutation of a table records a `TableChange`. The changeset keeps a
/// revision counter that only ever grows, so clients holding an older
/// revision know their copy of the rows is out of date.
///
/// # Usage Pattern
///
/// 1. Store operations push `TableChange` events
/// 2. The RPC layer, or the in-process grid source, drains the buffer after each write
/// 3. Subscribers are told the new revision and refetch

use serde::Serialize;
use uuid::Uuid;

use crate::column::CellValue;

/// Represents a single change to a table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum TableChange {
    RowInserted { row_id: Uuid },

    RowDeleted { row_id: Uuid },

    /// Contains: (row, column, previous value if the cell existed, new value)
    CellUpdated {
        row_id: Uuid,
        column_id: Uuid,
        old_value: Option<CellValue>,
        new_value: CellValue,
    },

    ColumnsChanged,

    ViewsChanged,
}

/// Pending changes of one table plus its revision counter
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    changes: Vec<TableChange>,
    revision: u64,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset {
            changes: Vec::new(),
            revision: 0,
        }
    }

    /// Add a change and bump the revision
    pub fn push(&mut self, change: TableChange) {
        self.changes.push(change);
        self.revision += 1;
    }

    pub fn changes(&self) -> &[TableChange] {
        &self.changes
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Drain changes, returning ownership and clearing the buffer.
    /// The revision is left untouched.
    pub fn drain(&mut self) -> Vec<TableChange> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_basic() {
        let mut cs = Changeset::new();
        assert!(cs.is_empty());
        assert_eq!(cs.revision(), 0);

        let row_id = Uuid::new_v4();
        cs.push(TableChange::RowInserted { row_id });
        cs.push(TableChange::ColumnsChanged);

        assert_eq!(cs.len(), 2);
        assert_eq!(cs.revision(), 2);
        assert_eq!(cs.changes()[0], TableChange::RowInserted { row_id });
    }

    #[test]
    fn test_drain_keeps_revision() {
        let mut cs = Changeset::new();
        cs.push(TableChange::ViewsChanged);
        let drained = cs.drain();
        assert_eq!(drained.len(), 1);
        assert!(cs.is_empty());
        assert_eq!(cs.revision(), 1);
    }
}
