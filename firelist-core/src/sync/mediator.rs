use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{SyncState, TodoError};
use crate::models::{is_document_id, NewTodo, Scope, TodoPatch};
use crate::store::{RemoteStore, SnapshotStream, StoreError};
use crate::view::TodoActions;

/// Handle to the task applying snapshots of one subscription.
struct Subscription {
    scope: Scope,
    task: JoinHandle<()>,
}

/// Owns the in-memory list for one user scope and mediates every mutation.
///
/// All methods take `&self`, so the mediator can sit behind an `Arc` and be
/// driven from several tasks. `initialize` and `shutdown` serialize on the
/// subscription slot.
pub struct TodoSync<S: RemoteStore> {
    store: S,
    app_id: String,
    scope: Mutex<Option<Scope>>,
    subscription: tokio::sync::Mutex<Option<Subscription>>,
    /// Bumped by `initialize` and `shutdown`; CRUD results that come back
    /// under a different generation are not recorded into state.
    generation: AtomicU64,
    state: Arc<watch::Sender<SyncState>>,
}

impl<S: RemoteStore> TodoSync<S> {
    pub fn new(store: S, app_id: impl Into<String>) -> Self {
        let (state, _rx) = watch::channel(SyncState::default());
        Self {
            store,
            app_id: app_id.into(),
            scope: Mutex::new(None),
            subscription: tokio::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
            state: Arc::new(state),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The scope mutations go to, if a user has been initialized.
    pub fn scope(&self) -> Option<Scope> {
        self.scope.lock().ok().and_then(|s| s.clone())
    }

    fn set_scope(&self, scope: Option<Scope>) {
        if let Ok(mut slot) = self.scope.lock() {
            *slot = scope;
        }
    }

    /// Current state, cloned.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Waits until the first snapshot has been applied or the subscription
    /// has failed, then returns the state at that point.
    pub async fn wait_loaded(&self) -> SyncState {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let state = match rx.wait_for(|s| !s.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Opens a live subscription to `user_id`'s scope.
    ///
    /// Any previous subscription is released first. `Err(SyncFailure)` means
    /// the new one could not be established; the scope is still set, so
    /// mutations keep working.
    pub async fn initialize(&self, user_id: &str) -> Result<(), TodoError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(TodoError::validation("No signed-in user"));
        }

        let mut slot = self.subscription.lock().await;
        release(&mut slot).await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        let scope = Scope::new(self.app_id.clone(), user_id);
        self.set_scope(Some(scope.clone()));
        self.state.send_replace(SyncState {
            user_id: Some(user_id.to_string()),
            loading: true,
            ..SyncState::default()
        });

        let stream = match self.store.subscribe(&scope).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%scope, "subscription failed to start: {}", e);
                let err = TodoError::SyncFailure(e.to_string());
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.to_string());
                });
                return Err(err);
            }
        };

        tracing::info!(%scope, "subscribed");
        let task = tokio::spawn(apply_snapshots(
            stream,
            Arc::clone(&self.state),
            scope.clone(),
        ));
        *slot = Some(Subscription { scope, task });
        Ok(())
    }

    /// Releases the subscription. Safe to call repeatedly or before
    /// `initialize`.
    pub async fn shutdown(&self) {
        let mut slot = self.subscription.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        release(&mut slot).await;
        self.set_scope(None);
        self.state.send_replace(SyncState::default());
    }

    /// Creates an item with the trimmed `text`.
    ///
    /// There is no optimistic insert: the item shows up with the next
    /// snapshot. On error the caller must not assume it was stored.
    pub async fn add_item(&self, text: &str) -> Result<String, TodoError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TodoError::validation("Task text cannot be empty"));
        }
        let scope = self.active_scope()?;
        let generation = self.generation.load(Ordering::SeqCst);

        self.store
            .create(&scope, NewTodo::new(text))
            .await
            .map_err(|e| self.write_failed(generation, "add", e))
    }

    /// Flips `completed` relative to what the caller last saw.
    pub async fn toggle_item(&self, id: &str, current_completed: bool) -> Result<(), TodoError> {
        let id = require_id(id)?;
        let scope = self.active_scope()?;
        let generation = self.generation.load(Ordering::SeqCst);

        self.store
            .update(&scope, id, TodoPatch::completed(!current_completed))
            .await
            .map_err(|e| self.write_failed(generation, "update", e))
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), TodoError> {
        let id = require_id(id)?;
        let scope = self.active_scope()?;
        let generation = self.generation.load(Ordering::SeqCst);

        self.store
            .delete(&scope, id)
            .await
            .map_err(|e| self.write_failed(generation, "delete", e))
    }

    fn active_scope(&self) -> Result<Scope, TodoError> {
        self.scope()
            .ok_or_else(|| TodoError::validation("No signed-in user"))
    }

    fn write_failed(&self, generation: u64, op: &'static str, e: StoreError) -> TodoError {
        let err = TodoError::RemoteWrite {
            op,
            message: e.to_string(),
        };
        // Checked under the state lock: `initialize` and `shutdown` bump the
        // generation before they replace the state.
        let recorded = self.state.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            s.error = Some(err.to_string());
            true
        });
        if recorded {
            tracing::warn!("{}", err);
        } else {
            tracing::debug!(op, "ignoring write result from a released session");
        }
        err
    }
}

impl<S: RemoteStore> Drop for TodoSync<S> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.task.abort();
        }
    }
}

#[async_trait]
impl<S: RemoteStore> TodoActions for TodoSync<S> {
    async fn add(&self, text: &str) -> Result<String, TodoError> {
        self.add_item(text).await
    }

    async fn toggle(&self, id: &str, current_completed: bool) -> Result<(), TodoError> {
        self.toggle_item(id, current_completed).await
    }

    async fn delete(&self, id: &str) -> Result<(), TodoError> {
        self.delete_item(id).await
    }
}

fn require_id(id: &str) -> Result<&str, TodoError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(TodoError::validation("Task id cannot be empty"));
    }
    if !is_document_id(id) {
        return Err(TodoError::validation(format!("Invalid task id '{}'", id)));
    }
    Ok(id)
}

/// Aborts the subscription task and waits until it (and its stream) is gone.
async fn release(slot: &mut Option<Subscription>) {
    if let Some(subscription) = slot.take() {
        subscription.task.abort();
        let _ = subscription.task.await;
        tracing::debug!(scope = %subscription.scope, "subscription released");
    }
}

/// Applies snapshots in arrival order until the stream fails or ends.
async fn apply_snapshots(
    mut stream: SnapshotStream,
    state: Arc<watch::Sender<SyncState>>,
    scope: Scope,
) {
    while let Some(delivery) = stream.next().await {
        match delivery {
            Ok(snapshot) => {
                let todos = snapshot.sorted();
                tracing::debug!(%scope, count = todos.len(), "snapshot applied");
                state.send_modify(|s| {
                    s.todos = todos;
                    s.loading = false;
                    s.error = None;
                    s.snapshots += 1;
                });
            }
            Err(e) => {
                tracing::warn!(%scope, "subscription interrupted: {}", e);
                fail(&state, e.to_string());
                return;
            }
        }
    }
    fail(&state, "subscription closed by the store".to_string());
}

fn fail(state: &watch::Sender<SyncState>, reason: String) {
    let err = TodoError::SyncFailure(reason);
    state.send_modify(|s| {
        s.loading = false;
        s.error = Some(err.to_string());
    });
}
