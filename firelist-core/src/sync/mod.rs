//! Sync mediator between a scoped remote collection and a renderable list.
//!
//! ## Model
//!
//! The local list is a read-only projection of the last snapshot. Every
//! mutation is a request to the remote store; its effect only becomes
//! visible when the store delivers the next snapshot. Snapshots always
//! replace the list wholesale, so duplicates and reordering are harmless.
//!
//! ## Subscription ownership
//!
//! [`TodoSync`] owns at most one subscription. Re-initializing releases the
//! old one (and waits for its task to finish) before opening the next.

mod error;
mod mediator;
mod state;

pub use error::TodoError;
pub use mediator::TodoSync;
pub use state::SyncState;
