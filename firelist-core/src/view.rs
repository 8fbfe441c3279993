//! Terminal rendering of the todo list.
//!
//! [`ListView`] is built from one [`SyncState`] and never changes after that.
//! Rows are numbered from 1 in display order; user input is parsed into a
//! [`ViewAction`] and resolved against those numbers by
//! [`ListView::dispatch`], which calls back into [`TodoActions`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::TodoItem;
use crate::sync::{SyncState, TodoError};

/// The three callbacks the view drives.
#[async_trait]
pub trait TodoActions: Send + Sync {
    async fn add(&self, text: &str) -> Result<String, TodoError>;
    async fn toggle(&self, id: &str, current_completed: bool) -> Result<(), TodoError>;
    async fn delete(&self, id: &str) -> Result<(), TodoError>;
}

pub const EMPTY_TITLE: &str = "All Clear!";
pub const EMPTY_MESSAGE: &str = "You have no tasks. Add one above to get started.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListView {
    pub user_id: Option<String>,
    pub items: Vec<TodoItem>,
    pub loading: bool,
    pub error: Option<String>,
    /// Records dropped because they had no id or no text.
    #[serde(skip)]
    pub skipped: usize,
}

impl ListView {
    pub fn render(state: &SyncState) -> Self {
        let items = state.items();
        let skipped = state.todos.len() - items.len();
        if skipped > 0 {
            tracing::debug!(skipped, "skipping malformed records");
        }
        Self {
            user_id: state.user_id.clone(),
            items,
            loading: state.loading,
            error: state.error.clone(),
            skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|i| i.completed).count()
    }

    /// `"N completed out of M tasks."`, or `None` for an empty list.
    pub fn summary(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(format!(
            "{} completed out of {} tasks.",
            self.completed_count(),
            self.items.len()
        ))
    }

    /// Item shown on row `number` (1-based).
    pub fn row(&self, number: usize) -> Option<&TodoItem> {
        number.checked_sub(1).and_then(|i| self.items.get(i))
    }

    fn resolve(&self, number: usize) -> Result<&TodoItem, TodoError> {
        self.row(number).ok_or_else(|| {
            TodoError::validation(format!(
                "No task #{} (the list has {})",
                number,
                self.items.len()
            ))
        })
    }

    /// Runs `action` against the rows of this view.
    ///
    /// `Quit` is the caller's business and does nothing here.
    pub async fn dispatch(
        &self,
        action: &ViewAction,
        actions: &dyn TodoActions,
    ) -> Result<Option<String>, TodoError> {
        match action {
            ViewAction::Add(text) => actions.add(text).await.map(Some),
            ViewAction::Toggle(number) => {
                let item = self.resolve(*number)?;
                actions.toggle(&item.id, item.completed).await?;
                Ok(None)
            }
            ViewAction::Delete(number) => {
                let item = self.resolve(*number)?;
                actions.delete(&item.id).await?;
                Ok(None)
            }
            ViewAction::Quit => Ok(None),
        }
    }
}

impl fmt::Display for ListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FireList")?;
        writeln!(f, "========")?;
        writeln!(
            f,
            "User ID: {}",
            self.user_id.as_deref().unwrap_or("Loading...")
        )?;
        writeln!(f)?;

        if let Some(error) = &self.error {
            writeln!(f, "Error: {}", error)?;
            writeln!(f)?;
        }

        if self.loading {
            return writeln!(f, "Loading tasks...");
        }

        if self.is_empty() {
            writeln!(f, "{}", EMPTY_TITLE)?;
            return writeln!(f, "{}", EMPTY_MESSAGE);
        }

        let width = self.items.len().to_string().len();
        for (i, item) in self.items.iter().enumerate() {
            writeln!(f, "{:>width$}. {}", i + 1, item, width = width)?;
        }

        if let Some(summary) = self.summary() {
            writeln!(f)?;
            writeln!(f, "{}", summary)?;
        }
        Ok(())
    }
}

/// A command typed into the interactive view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    Add(String),
    Toggle(usize),
    Delete(usize),
    Quit,
}

impl FromStr for ViewAction {
    type Err = TodoError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        let number = |rest: &str| {
            rest.parse::<usize>()
                .map_err(|_| TodoError::validation(format!("Expected a task number, got '{}'", rest)))
        };

        match command.to_lowercase().as_str() {
            "add" | "a" => Ok(ViewAction::Add(rest.to_string())),
            "toggle" | "t" | "x" => number(rest).map(ViewAction::Toggle),
            "delete" | "d" | "rm" => number(rest).map(ViewAction::Delete),
            "quit" | "q" | "exit" => Ok(ViewAction::Quit),
            "" => Err(TodoError::validation("Type a command (add, toggle, delete, quit)")),
            other => Err(TodoError::validation(format!("Unknown command '{}'", other))),
        }
    }
}
