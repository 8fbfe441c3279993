//! FireList Core Library
//!
//! Todo models, the remote store and auth seams, the sync mediator and the
//! list view shared by FireList front ends.

pub mod auth;
pub mod models;
pub mod store;
pub mod sync;
pub mod view;

#[cfg(test)]
mod test_server;

pub use auth::{AuthError, AuthProvider, FirebaseAuth, FirebaseAuthConfig, Session, SessionStore, StaticAuth};
pub use models::{NewTodo, Scope, Snapshot, TodoItem, TodoPatch, TodoRecord};
pub use store::{FirestoreConfig, FirestoreStore, MemoryStore, RemoteStore, SnapshotStream, StoreError};
pub use sync::{SyncState, TodoError, TodoSync};
pub use view::{ListView, TodoActions, ViewAction};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
