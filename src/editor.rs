//! Cell Edit Controller
//!
//! One `CellEditor` per edited cell. The editor owns the edit buffer, the
//! optimistic value shown while a write is outstanding, and the token that
//! correlates the write with its eventual result.
//!
//! ```text
//! Viewing --begin_edit--> Editing --commit--> Saving --resolve(ok)--> Reconciled
//!                            ^                  |
//!                            +----resolve(err)--+   (display reverted, input kept)
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::column::{CellValue, ColumnType};
use crate::error::GridError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Viewing,
    Editing,
    Saving,
    Reconciled,
}

/// What ended the edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTrigger {
    Enter,
    Blur,
    Tab,
}

/// How a write is reconciled with the rest of the grid.
///
/// `Silent` writes only patch the local cache so focus and the loaded window
/// survive rapid Tab navigation. `Reconciling` writes invalidate the cache and
/// trigger a reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStyle {
    Silent,
    #[default]
    Reconciling,
}

impl CommitTrigger {
    pub fn style(self) -> CommitStyle {
        match self {
            CommitTrigger::Tab => CommitStyle::Silent,
            CommitTrigger::Enter | CommitTrigger::Blur => CommitStyle::Reconciling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteToken(u64);

/// A write the editor wants sent to the server
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub token: WriteToken,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub value: CellValue,
    pub style: CommitStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Reconciled,
    /// The write failed; the editor is open again holding the rejected input
    Reverted { retry_input: String },
    /// The token no longer matches the outstanding write
    Stale,
}

#[derive(Debug, Clone)]
struct PendingWrite {
    token: WriteToken,
    input: String,
}

#[derive(Debug, Clone)]
pub struct CellEditor {
    row_id: Uuid,
    column_id: Uuid,
    column_type: ColumnType,
    phase: EditPhase,
    server_value: CellValue,
    optimistic: Option<CellValue>,
    buffer: String,
    pending: Option<PendingWrite>,
    next_token: u64,
}

impl CellEditor {
    pub fn new(row_id: Uuid, column_id: Uuid, column_type: ColumnType, server_value: Option<CellValue>) -> Self {
        CellEditor {
            row_id,
            column_id,
            column_type,
            phase: EditPhase::Viewing,
            server_value: server_value.unwrap_or_else(|| column_type.empty_value()),
            optimistic: None,
            buffer: String::new(),
            pending: None,
            next_token: 0,
        }
    }

    pub fn row_id(&self) -> Uuid {
        self.row_id
    }

    pub fn column_id(&self) -> Uuid {
        self.column_id
    }

    pub fn phase(&self) -> EditPhase {
        self.phase
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// The optimistic value while a write is outstanding, else the server value
    pub fn display_value(&self) -> &CellValue {
        self.optimistic.as_ref().unwrap_or(&self.server_value)
    }

    pub fn is_optimistic(&self) -> bool {
        self.optimistic.is_some()
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending.is_some()
    }

    /// Open the editor on the currently displayed value.
    /// Returns false if it is already open.
    pub fn begin_edit(&mut self) -> bool {
        if self.phase == EditPhase::Editing {
            return false;
        }
        self.buffer = self.display_value().display_text();
        self.phase = EditPhase::Editing;
        true
    }

    pub fn input(&mut self, text: &str) {
        if self.phase == EditPhase::Editing {
            self.buffer = text.to_string();
        }
    }

    fn settled_phase(&self) -> EditPhase {
        if self.pending.is_some() {
            EditPhase::Saving
        } else {
            EditPhase::Viewing
        }
    }

    /// Close the editor. Returns the write to send, or `None` when the parsed
    /// input equals what is already displayed.
    pub fn commit(&mut self, trigger: CommitTrigger) -> Option<WriteRequest> {
        if self.phase != EditPhase::Editing {
            return None;
        }
        let value = self.column_type.parse_input(&self.buffer);
        if &value == self.display_value() {
            self.phase = self.settled_phase();
            return None;
        }

        self.next_token += 1;
        let token = WriteToken(self.next_token);
        self.pending = Some(PendingWrite {
            token,
            input: std::mem::take(&mut self.buffer),
        });
        self.optimistic = Some(value.clone());
        self.phase = EditPhase::Saving;

        Some(WriteRequest {
            token,
            row_id: self.row_id,
            column_id: self.column_id,
            value,
            style: trigger.style(),
        })
    }

    /// Fold in the result of the write identified by `token`
    pub fn resolve(&mut self, token: WriteToken, result: Result<CellValue, GridError>) -> EditOutcome {
        let pending = match self.pending.take() {
            Some(p) if p.token == token => p,
            other => {
                self.pending = other;
                return EditOutcome::Stale;
            }
        };
        self.optimistic = None;
        match result {
            Ok(saved) => {
                self.server_value = saved;
                if self.phase == EditPhase::Saving {
                    self.phase = EditPhase::Reconciled;
                }
                EditOutcome::Reconciled
            }
            Err(err) => {
                log::warn!("cell write {}/{} rejected: {}", self.row_id, self.column_id, err);
                self.buffer = pending.input.clone();
                self.phase = EditPhase::Editing;
                EditOutcome::Reverted {
                    retry_input: pending.input,
                }
            }
        }
    }

    /// Escape: drop the buffer and any optimistic value still awaiting the server.
    /// A result arriving later for the dropped write is treated as stale.
    pub fn cancel(&mut self) -> bool {
        let reverted = self.optimistic.take().is_some();
        self.pending = None;
        self.buffer.clear();
        self.phase = EditPhase::Viewing;
        reverted
    }

    /// Take the refetched server value; an outstanding optimistic value keeps
    /// being displayed until its write resolves.
    pub fn sync_server_value(&mut self, value: Option<CellValue>) {
        self.server_value = value.unwrap_or_else(|| self.column_type.empty_value());
        if self.phase == EditPhase::Reconciled {
            self.phase = EditPhase::Viewing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_editor(initial: &str) -> CellEditor {
        CellEditor::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ColumnType::Text,
            Some(CellValue::Text(initial.to_string())),
        )
    }

    #[test]
    fn test_unchanged_value_sends_nothing() {
        let mut editor = text_editor("Anna");
        assert!(editor.begin_edit());
        assert_eq!(editor.buffer(), "Anna");
        assert_eq!(editor.commit(CommitTrigger::Enter), None);
        assert_eq!(editor.phase(), EditPhase::Viewing);
    }

    #[test]
    fn test_commit_styles() {
        let mut editor = text_editor("a");
        editor.begin_edit();
        editor.input("b");
        let request = editor.commit(CommitTrigger::Tab).unwrap();
        assert_eq!(request.style, CommitStyle::Silent);
        assert_eq!(request.value, CellValue::Text("b".to_string()));
        assert_eq!(editor.phase(), EditPhase::Saving);
        assert!(editor.is_optimistic());

        editor.begin_edit();
        editor.input("c");
        assert_eq!(editor.commit(CommitTrigger::Blur).unwrap().style, CommitStyle::Reconciling);
    }

    #[test]
    fn test_success_reconciles() {
        let mut editor = text_editor("a");
        editor.begin_edit();
        editor.input("b");
        let request = editor.commit(CommitTrigger::Enter).unwrap();
        let outcome = editor.resolve(request.token, Ok(CellValue::Text("b".to_string())));
        assert_eq!(outcome, EditOutcome::Reconciled);
        assert_eq!(editor.phase(), EditPhase::Reconciled);
        assert!(!editor.is_optimistic());
        assert_eq!(editor.display_value(), &CellValue::Text("b".to_string()));
    }

    #[test]
    fn test_failure_reverts_and_reopens_with_input() {
        let mut editor = text_editor("before");
        editor.begin_edit();
        editor.input("after");
        let request = editor.commit(CommitTrigger::Enter).unwrap();
        assert_eq!(editor.display_value(), &CellValue::Text("after".to_string()));

        let outcome = editor.resolve(request.token, Err(GridError::WriteRejected("offline".to_string())));
        assert_eq!(
            outcome,
            EditOutcome::Reverted {
                retry_input: "after".to_string()
            }
        );
        assert_eq!(editor.display_value(), &CellValue::Text("before".to_string()));
        assert_eq!(editor.phase(), EditPhase::Editing);
        assert_eq!(editor.buffer(), "after");
    }

    #[test]
    fn test_superseded_token_is_stale() {
        let mut editor = text_editor("a");
        editor.begin_edit();
        editor.input("b");
        let first = editor.commit(CommitTrigger::Tab).unwrap();
        editor.begin_edit();
        editor.input("c");
        let second = editor.commit(CommitTrigger::Tab).unwrap();

        assert_eq!(editor.resolve(first.token, Ok(CellValue::Text("b".to_string()))), EditOutcome::Stale);
        assert_eq!(editor.display_value(), &CellValue::Text("c".to_string()));
        assert_eq!(editor.resolve(second.token, Ok(CellValue::Text("c".to_string()))), EditOutcome::Reconciled);
    }

    #[test]
    fn test_cancel_reverts_optimistic_value() {
        let mut editor = text_editor("a");
        editor.begin_edit();
        editor.input("b");
        let request = editor.commit(CommitTrigger::Tab).unwrap();
        assert!(editor.cancel());
        assert_eq!(editor.display_value(), &CellValue::Text("a".to_string()));
        assert_eq!(editor.resolve(request.token, Ok(CellValue::Text("b".to_string()))), EditOutcome::Stale);
    }

    #[test]
    fn test_number_input_parsing() {
        let mut editor = CellEditor::new(Uuid::new_v4(), Uuid::new_v4(), ColumnType::Number, Some(CellValue::Number(Some(5.0))));
        editor.begin_edit();
        assert_eq!(editor.buffer(), "5");
        editor.input(" 12.5 ");
        assert_eq!(editor.commit(CommitTrigger::Enter).unwrap().value, CellValue::Number(Some(12.5)));

        let mut blank = CellEditor::new(Uuid::new_v4(), Uuid::new_v4(), ColumnType::Number, None);
        blank.begin_edit();
        blank.input("abc");
        assert_eq!(blank.commit(CommitTrigger::Enter), None, "unparseable input equals the empty value");
    }

    #[test]
    fn test_sync_keeps_pending_optimistic_value() {
        let mut editor = text_editor("a");
        editor.begin_edit();
        editor.input("b");
        editor.commit(CommitTrigger::Tab).unwrap();
        editor.sync_server_value(Some(CellValue::Text("server".to_string())));
        assert_eq!(editor.display_value(), &CellValue::Text("b".to_string()));
        editor.cancel();
        assert_eq!(editor.display_value(), &CellValue::Text("server".to_string()));
    }
}
