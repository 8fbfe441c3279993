use serde::Serialize;

use crate::models::{TodoItem, TodoRecord};

/// Read-only picture of the mediator, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    /// Scope owner, `None` until `initialize` succeeds in resolving one.
    pub user_id: Option<String>,
    /// Records of the last snapshot, already in display order.
    pub todos: Vec<TodoRecord>,
    /// True between `initialize` and the first snapshot (or failure).
    pub loading: bool,
    /// Banner text for the last unacknowledged failure.
    pub error: Option<String>,
    /// Number of snapshots applied since the last `initialize`.
    pub snapshots: u64,
}

impl SyncState {
    /// Renderable items, in display order.
    pub fn items(&self) -> Vec<TodoItem> {
        self.todos.iter().filter_map(TodoRecord::to_item).collect()
    }

    pub fn find(&self, id: &str) -> Option<&TodoRecord> {
        self.todos.iter().find(|r| r.id == id)
    }
}
