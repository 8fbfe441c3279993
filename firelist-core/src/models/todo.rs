use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A renderable todo: every field present and the id non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: i64, // unix millis
}

/// A todo document as it arrives from the remote store.
///
/// Only `id` is guaranteed; anything else may be missing on records written
/// by other clients. Use [`TodoRecord::to_item`] to get something renderable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl TodoRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            text: Some(text.into()),
            completed: Some(false),
            created_at: Some(created_at),
        }
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Ordering key; records without a timestamp sort first.
    pub fn sort_key(&self) -> i64 {
        self.created_at.unwrap_or(0)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.unwrap_or(false)
    }

    /// Returns `None` for records with an empty id or missing/empty text.
    pub fn to_item(&self) -> Option<TodoItem> {
        if self.id.is_empty() {
            return None;
        }
        let text = self.text.as_ref().filter(|t| !t.is_empty())?;
        Some(TodoItem {
            id: self.id.clone(),
            text: text.clone(),
            completed: self.is_completed(),
            created_at: self.sort_key(),
        })
    }
}

impl From<TodoItem> for TodoRecord {
    fn from(item: TodoItem) -> Self {
        Self {
            id: item.id,
            text: Some(item.text),
            completed: Some(item.completed),
            created_at: Some(item.created_at),
        }
    }
}

/// Fields sent with a create request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    pub text: String,
    pub completed: bool,
    pub created_at: i64,
}

impl NewTodo {
    /// Stamps the item with the current time. `text` is stored as given.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Partial update. Text edits are not supported, so only `completed` exists.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TodoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn completed(value: bool) -> Self {
        Self {
            completed: Some(value),
        }
    }

    /// Field paths touched by this patch, in wire naming.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.completed.is_some() {
            paths.push("completed");
        }
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_none()
    }
}

/// Every document of a scope at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub records: Vec<TodoRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<TodoRecord>) -> Self {
        Self { records }
    }

    /// Records in display order: ascending `createdAt`, missing treated as 0.
    ///
    /// The sort is stable, so equal timestamps keep their snapshot order.
    pub fn sorted(&self) -> Vec<TodoRecord> {
        let mut records = self.records.clone();
        records.sort_by_key(TodoRecord::sort_key);
        records
    }
}

impl fmt::Display for TodoItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.completed { "x" } else { " " };
        write!(f, "[{}] {}", mark, self.text)
    }
}
