//! Remote document store seam.
//!
//! The mediator only talks to a [`RemoteStore`]. Two implementations ship:
//!
//! - [`FirestoreStore`]: Firestore REST v1. Subscriptions poll the scoped
//!   collection and emit a snapshot whenever the listing changes.
//! - [`MemoryStore`]: in-process, pushes a snapshot on every write. Used by
//!   tests and offline mode.

mod error;
pub mod firestore;
mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::{NewTodo, Scope, Snapshot, TodoPatch};

pub use error::StoreError;
pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;

/// Stream of full-collection snapshots. Dropping it ends the subscription.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, StoreError>>;

#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Creates a document and returns the id the store assigned.
    async fn create(&self, scope: &Scope, todo: NewTodo) -> Result<String, StoreError>;

    async fn update(&self, scope: &Scope, id: &str, patch: TodoPatch) -> Result<(), StoreError>;

    async fn delete(&self, scope: &Scope, id: &str) -> Result<(), StoreError>;

    /// Opens a live subscription.
    ///
    /// Errors returned here mean the subscription never started. Errors
    /// yielded by the stream mean it was interrupted; nothing more follows.
    async fn subscribe(&self, scope: &Scope) -> Result<SnapshotStream, StoreError>;
}

#[async_trait]
impl RemoteStore for Box<dyn RemoteStore> {
    async fn create(&self, scope: &Scope, todo: NewTodo) -> Result<String, StoreError> {
        (**self).create(scope, todo).await
    }

    async fn update(&self, scope: &Scope, id: &str, patch: TodoPatch) -> Result<(), StoreError> {
        (**self).update(scope, id, patch).await
    }

    async fn delete(&self, scope: &Scope, id: &str) -> Result<(), StoreError> {
        (**self).delete(scope, id).await
    }

    async fn subscribe(&self, scope: &Scope) -> Result<SnapshotStream, StoreError> {
        (**self).subscribe(scope).await
    }
}
