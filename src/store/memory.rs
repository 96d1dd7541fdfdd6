//! In-process document collection with live snapshot delivery

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use super::{Document, OrderFilter, OrderStore, Snapshot, SnapshotSink, Watch, STATUS_FIELD};
use crate::types::{OrderStatus, Result, SalesboardError};

struct Watcher {
    id: u64,
    filter: OrderFilter,
    sink: SnapshotSink,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<String, Document>,
    watchers: Vec<Watcher>,
    next_watcher: u64,
}

impl Inner {
    fn snapshot(&self, filter: OrderFilter) -> Snapshot {
        filter.apply(self.documents.values().cloned())
    }

    /// Pair each watcher with its fresh snapshot; delivered after unlocking
    fn pending_deliveries(&self) -> Vec<(SnapshotSink, Snapshot)> {
        self.watchers
            .iter()
            .map(|w| (Arc::clone(&w.sink), self.snapshot(w.filter)))
            .collect()
    }
}

/// Shared in-memory order collection.
///
/// Clones share the same collection. Every mutation pushes a full snapshot
/// to each watcher, outside the internal lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store without notifying anyone
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for doc in documents {
                inner.documents.insert(doc.id.clone(), doc);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a document
    pub fn insert(&self, doc: Document) {
        let deliveries = {
            let mut inner = self.lock();
            inner.documents.insert(doc.id.clone(), doc);
            inner.pending_deliveries()
        };
        deliver(deliveries);
    }

    pub fn remove(&self, id: &str) -> Option<Document> {
        let (removed, deliveries) = {
            let mut inner = self.lock();
            let removed = inner.documents.remove(id);
            (removed, inner.pending_deliveries())
        };
        if removed.is_some() {
            deliver(deliveries);
        }
        removed
    }

    /// Push a transport failure to every active watcher
    pub fn fail_watchers(&self, message: &str) {
        let sinks: Vec<SnapshotSink> = self
            .lock()
            .watchers
            .iter()
            .map(|w| Arc::clone(&w.sink))
            .collect();
        for sink in sinks {
            sink(Err(SalesboardError::Transport(message.to_string())));
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn deliver(deliveries: Vec<(SnapshotSink, Snapshot)>) {
    for (sink, snapshot) in deliveries {
        sink(Ok(snapshot));
    }
}

impl OrderStore for MemoryStore {
    fn watch(&self, filter: OrderFilter, sink: SnapshotSink) -> Result<Watch> {
        let (id, initial) = {
            let mut inner = self.lock();
            let id = inner.next_watcher;
            inner.next_watcher += 1;
            inner.watchers.push(Watcher {
                id,
                filter,
                sink: Arc::clone(&sink),
            });
            (id, inner.snapshot(filter))
        };
        debug!(watcher = id, %filter, "memory watch registered");
        sink(Ok(initial));

        let inner = Arc::clone(&self.inner);
        Ok(Watch::new(move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.watchers.retain(|w| w.id != id);
            debug!(watcher = id, "memory watch released");
        }))
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.lock().documents.get(id).cloned())
    }

    fn query(&self, filter: OrderFilter) -> Result<Snapshot> {
        Ok(self.lock().snapshot(filter))
    }

    fn set_status(&self, id: &str, status: OrderStatus) -> Result<()> {
        let deliveries = {
            let mut inner = self.lock();
            let doc = inner
                .documents
                .get_mut(id)
                .ok_or_else(|| SalesboardError::NotFound(id.to_string()))?;
            doc.fields.insert(
                STATUS_FIELD.to_string(),
                Value::String(status.as_str().to_string()),
            );
            inner.pending_deliveries()
        };
        deliver(deliveries);
        Ok(())
    }
}
