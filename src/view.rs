/// Gridbase Views
///
/// A saved view is a named bundle of filters, sort criteria and hidden
/// columns, stored with its table and shared by every client. Which view a
/// client currently has applied is client-local state kept in an
/// `AppliedViewStore`.
///
/// `ViewSession` tracks applying a view as an explicit state. Descriptor
/// changes produced while applying a view carry the apply token and are never
/// written back, so applying a view cannot trigger a save of that same view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::column::validate_name;
use crate::error::Result;
use crate::filter::{FilterCondition, SortCriterion};

/// Filter, sort and visibility configuration of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub sorts: Vec<SortCriterion>,
    #[serde(default)]
    pub hidden_columns: Vec<Uuid>,
}

impl ViewConfig {
    /// Drop every reference to a column, used when the column is deleted.
    /// Returns true if anything was removed.
    pub fn forget_column(&mut self, column_id: Uuid) -> bool {
        let before = self.filters.len() + self.sorts.len() + self.hidden_columns.len();
        self.filters.retain(|f| f.column_id != column_id);
        self.sorts.retain(|s| s.column_id != column_id);
        self.hidden_columns.retain(|c| *c != column_id);
        before != self.filters.len() + self.sorts.len() + self.hidden_columns.len()
    }

    pub fn is_hidden(&self, column_id: Uuid) -> bool {
        self.hidden_columns.contains(&column_id)
    }
}

/// A named, persisted view of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedView {
    pub id: Uuid,
    pub table_id: Uuid,
    pub name: String,
    pub config: ViewConfig,
    pub updated_at: DateTime<Utc>,
}

impl SavedView {
    pub fn new(table_id: Uuid, name: &str, config: ViewConfig) -> Result<Self> {
        Ok(SavedView {
            id: Uuid::new_v4(),
            table_id,
            name: validate_name("View", name)?,
            config,
            updated_at: Utc::now(),
        })
    }
}

/// Correlates descriptor changes with the view application that caused them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplyToken(u64);

/// Where a descriptor change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    User,
    Apply(ApplyToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSessionState {
    Idle,
    Applying { token: ApplyToken, view_id: Uuid },
}

/// What to do after a descriptor change
#[derive(Debug, Clone, PartialEq)]
pub enum SaveDecision {
    Skip,
    Save { view_id: Uuid, config: ViewConfig },
}

/// Client-side view state of one table
#[derive(Debug, Clone)]
pub struct ViewSession {
    table_id: Uuid,
    state: ViewSessionState,
    active_view: Option<Uuid>,
    current: ViewConfig,
    last_saved: Option<ViewConfig>,
    next_token: u64,
}

impl ViewSession {
    pub fn new(table_id: Uuid) -> Self {
        ViewSession {
            table_id,
            state: ViewSessionState::Idle,
            active_view: None,
            current: ViewConfig::default(),
            last_saved: None,
            next_token: 1,
        }
    }

    pub fn table_id(&self) -> Uuid {
        self.table_id
    }

    pub fn state(&self) -> ViewSessionState {
        self.state
    }

    pub fn active_view(&self) -> Option<Uuid> {
        self.active_view
    }

    pub fn config(&self) -> &ViewConfig {
        &self.current
    }

    /// Start applying a saved view. The returned token must accompany the
    /// descriptor changes the application produces.
    pub fn apply(&mut self, view: &SavedView) -> ApplyToken {
        let token = ApplyToken(self.next_token);
        self.next_token += 1;
        self.state = ViewSessionState::Applying {
            token,
            view_id: view.id,
        };
        self.active_view = Some(view.id);
        self.current = view.config.clone();
        self.last_saved = Some(view.config.clone());
        log::debug!("applying view {} to table {}", view.id, self.table_id);
        token
    }

    /// Finish a view application. Returns false for a superseded token.
    pub fn finish_apply(&mut self, token: ApplyToken) -> bool {
        match self.state {
            ViewSessionState::Applying { token: current, .. } if current == token => {
                self.state = ViewSessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Stop tracking any saved view; later changes are local only.
    pub fn detach(&mut self) {
        self.state = ViewSessionState::Idle;
        self.active_view = None;
        self.last_saved = None;
    }

    /// A column was deleted. Drops it from the live descriptors and from the
    /// last saved copy, which the server strips as well. Returns true when
    /// the filters or sorts changed and the loaded rows no longer match.
    pub fn forget_column(&mut self, column_id: Uuid) -> bool {
        let before = (self.current.filters.len(), self.current.sorts.len());
        self.current.forget_column(column_id);
        if let Some(saved) = self.last_saved.as_mut() {
            saved.forget_column(column_id);
        }
        before != (self.current.filters.len(), self.current.sorts.len())
    }

    /// Record a descriptor change and decide whether the active view must be saved.
    pub fn change(&mut self, origin: ChangeOrigin, config: ViewConfig) -> SaveDecision {
        match origin {
            ChangeOrigin::Apply(token) => {
                if matches!(self.state, ViewSessionState::Applying { token: t, .. } if t == token) {
                    self.current = config;
                } else {
                    log::debug!("ignoring descriptor change from superseded view application");
                }
                SaveDecision::Skip
            }
            ChangeOrigin::User => {
                self.current = config;
                let Some(view_id) = self.active_view else {
                    return SaveDecision::Skip;
                };
                if self.last_saved.as_ref() == Some(&self.current) {
                    return SaveDecision::Skip;
                }
                self.last_saved = Some(self.current.clone());
                SaveDecision::Save {
                    view_id,
                    config: self.current.clone(),
                }
            }
        }
    }
}

/// Applied view id per table, persisted as a JSON file on the client
#[derive(Debug)]
pub struct AppliedViewStore {
    path: PathBuf,
    entries: HashMap<Uuid, Uuid>,
}

impl AppliedViewStore {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };
        Ok(AppliedViewStore { path, entries })
    }

    pub fn get(&self, table_id: Uuid) -> Option<Uuid> {
        self.entries.get(&table_id).copied()
    }

    pub fn set(&mut self, table_id: Uuid, view_id: Uuid) -> Result<()> {
        self.entries.insert(table_id, view_id);
        self.persist()
    }

    pub fn clear(&mut self, table_id: Uuid) -> Result<()> {
        if self.entries.remove(&table_id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}
