//! In-process remote store.
//!
//! Writes are applied as soon as they arrive (after an optional artificial
//! latency) and every subscriber of the scope receives a fresh snapshot.
//! The store also lets callers inject raw records, arbitrary snapshots,
//! failures and interruptions, which is what the mediator tests (and
//! offline mode) rely on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;

use super::{RemoteStore, SnapshotStream, StoreError};
use crate::models::{NewTodo, Scope, Snapshot, TodoPatch, TodoRecord};

#[derive(Debug, Clone)]
enum Delivery {
    Snapshot(Snapshot),
    Interrupted(String),
}

struct Collection {
    records: Vec<TodoRecord>,
    tx: watch::Sender<Delivery>,
}

impl Collection {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(Delivery::Snapshot(Snapshot::default()));
        Self {
            records: Vec::new(),
            tx,
        }
    }

    fn publish(&self) {
        self.tx
            .send_replace(Delivery::Snapshot(Snapshot::new(self.records.clone())));
    }
}

#[derive(Default)]
struct Inner {
    collections: Mutex<HashMap<String, Collection>>,
    fail_writes: AtomicBool,
    fail_subscribe: AtomicBool,
    latency_ms: AtomicU64,
    create_requests: AtomicUsize,
    delete_requests: AtomicUsize,
    updates: Mutex<Vec<(String, TodoPatch)>>,
}

/// Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, HashMap<String, Collection>> {
        // A poisoned lock only means a test panicked mid-write
        self.inner
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_collection<R>(&self, scope: &Scope, f: impl FnOnce(&mut Collection) -> R) -> R {
        let mut collections = self.collections();
        let collection = collections
            .entry(scope.collection_path())
            .or_insert_with(Collection::new);
        f(collection)
    }

    /// Makes every create/update/delete fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `subscribe` fail until reset.
    pub fn fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Delays every write by `latency` before it is applied.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of create requests received, failed ones included.
    pub fn create_requests(&self) -> usize {
        self.inner.create_requests.load(Ordering::SeqCst)
    }

    /// Number of delete requests received, failed ones included.
    pub fn delete_requests(&self) -> usize {
        self.inner.delete_requests.load(Ordering::SeqCst)
    }

    /// Every update received, in order, as `(id, patch)`.
    pub fn updates(&self) -> Vec<(String, TodoPatch)> {
        self.inner
            .updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// Number of open subscriptions on a scope.
    pub fn live_subscriptions(&self, scope: &Scope) -> usize {
        self.with_collection(scope, |c| c.tx.receiver_count())
    }

    pub fn records(&self, scope: &Scope) -> Vec<TodoRecord> {
        self.with_collection(scope, |c| c.records.clone())
    }

    /// Stores a record as-is, malformed or not, and notifies subscribers.
    pub fn insert_raw(&self, scope: &Scope, record: TodoRecord) {
        self.with_collection(scope, |c| {
            c.records.push(record);
            c.publish();
        });
    }

    /// Delivers `snapshot` to subscribers without touching stored records.
    pub fn push_snapshot(&self, scope: &Scope, snapshot: Snapshot) {
        self.with_collection(scope, |c| {
            c.tx.send_replace(Delivery::Snapshot(snapshot));
        });
    }

    /// Ends every subscription on the scope with an error.
    pub fn interrupt(&self, scope: &Scope, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_collection(scope, |c| {
            c.tx.send_replace(Delivery::Interrupted(reason));
        });
    }

    async fn check_writable(&self) -> Result<(), StoreError> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create(&self, scope: &Scope, todo: NewTodo) -> Result<String, StoreError> {
        self.inner.create_requests.fetch_add(1, Ordering::SeqCst);
        self.check_writable().await?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let record = TodoRecord {
            id: id.clone(),
            text: Some(todo.text),
            completed: Some(todo.completed),
            created_at: Some(todo.created_at),
        };
        self.with_collection(scope, |c| {
            c.records.push(record);
            c.publish();
        });
        Ok(id)
    }

    async fn update(&self, scope: &Scope, id: &str, patch: TodoPatch) -> Result<(), StoreError> {
        if let Ok(mut updates) = self.inner.updates.lock() {
            updates.push((id.to_string(), patch.clone()));
        }
        self.check_writable().await?;

        self.with_collection(scope, |c| {
            let record = c
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if let Some(completed) = patch.completed {
                record.completed = Some(completed);
            }
            c.publish();
            Ok(())
        })
    }

    async fn delete(&self, scope: &Scope, id: &str) -> Result<(), StoreError> {
        self.inner.delete_requests.fetch_add(1, Ordering::SeqCst);
        self.check_writable().await?;

        self.with_collection(scope, |c| {
            let before = c.records.len();
            c.records.retain(|r| r.id != id);
            if c.records.len() != before {
                c.publish();
            }
        });
        Ok(())
    }

    async fn subscribe(&self, scope: &Scope) -> Result<SnapshotStream, StoreError> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "subscriptions are disabled".to_string(),
            ));
        }

        let mut rx = self.with_collection(scope, |c| {
            c.publish();
            c.tx.subscribe()
        });
        rx.mark_changed();

        let stream = futures::stream::unfold(Some(rx), |state| async move {
            let mut rx = state?;
            rx.changed().await.ok()?;
            let delivery = rx.borrow_and_update().clone();
            match delivery {
                Delivery::Snapshot(snapshot) => Some((Ok(snapshot), Some(rx))),
                Delivery::Interrupted(reason) => Some((Err(StoreError::Unavailable(reason)), None)),
            }
        });
        Ok(stream.boxed())
    }
}
