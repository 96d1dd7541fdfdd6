//! Live order subscription with filter switching
//!
//! At most one store query is active per manager. Every subscription is
//! tagged with a generation number; switching filters bumps the generation
//! so snapshots still in flight for the old query are dropped instead of
//! reaching the new consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::auth::{require_principal, AuthProvider};
use crate::store::{OrderFilter, OrderStore, SnapshotSink, StoreEvent, Watch};
use crate::types::Result;

/// Delivery side of one subscription.
///
/// Yields full snapshots (or transport errors) in arrival order. Once the
/// owning manager moves to a newer generation, nothing more is yielded.
pub struct SnapshotStream {
    generation: u64,
    current: Arc<AtomicU64>,
    rx: Receiver<StoreEvent>,
}

impl SnapshotStream {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this stream still belongs to the active subscription
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Next pending delivery, without blocking
    pub fn try_next(&self) -> Option<StoreEvent> {
        if !self.is_current() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(event) if self.is_current() => Some(event),
            Ok(_) | Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain every pending delivery, oldest first
    pub fn pending(&self) -> Vec<StoreEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Drain pending deliveries and keep only the newest one
    pub fn latest(&self) -> Option<StoreEvent> {
        self.pending().pop()
    }

    /// Wait up to `timeout` for the next delivery
    pub fn next_timeout(&self, timeout: Duration) -> Option<StoreEvent> {
        if !self.is_current() {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(event) if self.is_current() => Some(event),
            Ok(_) | Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl std::fmt::Debug for SnapshotStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStream")
            .field("generation", &self.generation)
            .field("current", &self.is_current())
            .finish()
    }
}

struct ActiveSubscription {
    filter: OrderFilter,
    watch: Watch,
}

/// Owns the single live query against the order collection
pub struct SubscriptionManager<S, A> {
    store: S,
    auth: A,
    generation: Arc<AtomicU64>,
    active: Option<ActiveSubscription>,
}

impl<S: OrderStore, A: AuthProvider> SubscriptionManager<S, A> {
    pub fn new(store: S, auth: A) -> Self {
        Self {
            store,
            auth,
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    /// Generation of the most recent subscribe or cancel
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn active_filter(&self) -> Option<OrderFilter> {
        self.active.as_ref().map(|a| a.filter)
    }

    /// Replace the active subscription with one scoped by `filter`.
    ///
    /// The previous subscription is cancelled first, even when this call
    /// then fails. Fails with `Unauthenticated` when nobody is signed in;
    /// no snapshot is delivered in that case.
    pub fn subscribe(&mut self, filter: OrderFilter) -> Result<SnapshotStream> {
        self.cancel();
        let principal = require_principal(&self.auth)?;

        let generation = self.generation.load(Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        let current = Arc::clone(&self.generation);
        let sink: SnapshotSink = Arc::new(move |event| {
            if current.load(Ordering::SeqCst) == generation {
                let _ = tx.send(event);
            } else {
                debug!(generation, "dropping delivery for superseded subscription");
            }
        });

        let watch = self.store.watch(filter, sink)?;
        self.active = Some(ActiveSubscription { filter, watch });
        debug!(generation, %filter, operator = %principal.uid, "subscribed to orders");

        Ok(SnapshotStream {
            generation,
            current: Arc::clone(&self.generation),
            rx,
        })
    }

    /// Cancel the active subscription, if any; outstanding streams go stale
    pub fn cancel(&mut self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(active) = self.active.take() {
            active.watch.cancel();
            debug!(generation, filter = %active.filter, "order subscription cancelled");
        }
    }
}

impl<S, A> Drop for SubscriptionManager<S, A> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::{Principal, StaticAuth};
    use crate::store::{Document, MemoryStore, Snapshot};
    use crate::types::{OrderStatus, SalesboardError};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn order_doc(id: &str, status: &str) -> Document {
        match json!({"status": status, "totalAmount": 100, "createdAt": "2024-01-05T12:00:00Z"}) {
            Value::Object(map) => Document::new(id, map),
            _ => unreachable!(),
        }
    }

    fn signed_in() -> StaticAuth {
        StaticAuth::signed_in(Principal::new("operator"))
    }

    /// Store that keeps every sink it was handed, cancelled or not, so a
    /// test can play a late delivery from an old query.
    #[derive(Clone, Default)]
    struct ScriptedStore {
        sinks: Arc<Mutex<Vec<(OrderFilter, SnapshotSink)>>>,
        cancelled: Arc<Mutex<Vec<OrderFilter>>>,
    }

    impl ScriptedStore {
        fn deliver(&self, index: usize, event: StoreEvent) {
            let sink = Arc::clone(&self.sinks.lock().unwrap()[index].1);
            sink(event);
        }
    }

    impl OrderStore for ScriptedStore {
        fn watch(&self, filter: OrderFilter, sink: SnapshotSink) -> Result<Watch> {
            self.sinks.lock().unwrap().push((filter, sink));
            let cancelled = Arc::clone(&self.cancelled);
            Ok(Watch::new(move || cancelled.lock().unwrap().push(filter)))
        }

        fn get(&self, _id: &str) -> Result<Option<Document>> {
            Ok(None)
        }

        fn query(&self, _filter: OrderFilter) -> Result<Snapshot> {
            Ok(Snapshot::default())
        }

        fn set_status(&self, id: &str, _status: OrderStatus) -> Result<()> {
            Err(SalesboardError::NotFound(id.to_string()))
        }
    }

    // ========== subscribe() tests ==========

    #[test]
    fn test_subscribe_unauthenticated() {
        let store = MemoryStore::with_documents(vec![order_doc("a", "processing")]);
        let mut manager = SubscriptionManager::new(store.clone(), StaticAuth::signed_out());

        let err = manager.subscribe(OrderFilter::all()).unwrap_err();

        assert!(matches!(err, SalesboardError::Unauthenticated));
        assert_eq!(store.watcher_count(), 0, "no query is opened");
        assert!(manager.active_filter().is_none());
    }

    #[test]
    fn test_subscribe_delivers_filtered_snapshot() {
        let store = MemoryStore::with_documents(vec![
            order_doc("a", "processing"),
            order_doc("b", "completed"),
        ]);
        let mut manager = SubscriptionManager::new(store, signed_in());

        let stream = manager
            .subscribe(OrderFilter::status(OrderStatus::Processing))
            .unwrap();

        let snapshot = stream.try_next().unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.documents[0].id, "a");
        assert_eq!(
            manager.active_filter(),
            Some(OrderFilter::status(OrderStatus::Processing))
        );
    }

    #[test]
    fn test_latest_keeps_newest_snapshot() {
        let store = MemoryStore::new();
        let mut manager = SubscriptionManager::new(store.clone(), signed_in());
        let stream = manager.subscribe(OrderFilter::all()).unwrap();

        store.insert(order_doc("a", "completed"));
        store.insert(order_doc("b", "completed"));

        let snapshot = stream.latest().unwrap().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_pending_returns_deliveries_in_arrival_order() {
        let store = MemoryStore::new();
        let mut manager = SubscriptionManager::new(store.clone(), signed_in());
        let stream = manager.subscribe(OrderFilter::all()).unwrap();

        store.insert(order_doc("a", "completed"));
        store.fail_watchers("unavailable");

        let events = stream.pending();

        assert_eq!(events.len(), 3);
        assert!(events[0].as_ref().unwrap().is_empty());
        assert_eq!(events[1].as_ref().unwrap().len(), 1);
        assert!(events[2].as_ref().unwrap_err().is_transport());
        assert!(stream.pending().is_empty());
    }

    #[test]
    fn test_transport_error_is_delivered_and_subscription_survives() {
        let store = MemoryStore::new();
        let mut manager = SubscriptionManager::new(store.clone(), signed_in());
        let stream = manager.subscribe(OrderFilter::all()).unwrap();
        let _ = stream.try_next();

        store.fail_watchers("deadline exceeded");
        let err = stream.try_next().unwrap().unwrap_err();
        assert!(err.is_transport());

        store.insert(order_doc("a", "completed"));
        assert_eq!(stream.try_next().unwrap().unwrap().len(), 1);
    }

    // ========== filter switching tests ==========

    #[test]
    fn test_resubscribe_cancels_previous_query() {
        let store = MemoryStore::new();
        let mut manager = SubscriptionManager::new(store.clone(), signed_in());

        let _first = manager
            .subscribe(OrderFilter::status(OrderStatus::Processing))
            .unwrap();
        let _second = manager
            .subscribe(OrderFilter::status(OrderStatus::Completed))
            .unwrap();

        assert_eq!(store.watcher_count(), 1);
    }

    #[test]
    fn test_stale_snapshot_after_filter_change_is_dropped() {
        let store = ScriptedStore::default();
        let mut manager = SubscriptionManager::new(store.clone(), signed_in());

        let processing = manager
            .subscribe(OrderFilter::status(OrderStatus::Processing))
            .unwrap();
        let completed = manager
            .subscribe(OrderFilter::status(OrderStatus::Completed))
            .unwrap();
        assert_eq!(
            *store.cancelled.lock().unwrap(),
            vec![OrderFilter::status(OrderStatus::Processing)]
        );

        // Late delivery for the cancelled "processing" query
        store.deliver(
            0,
            Ok(Snapshot::new(vec![order_doc("p", "processing")])),
        );
        assert!(completed.try_next().is_none());
        assert!(processing.try_next().is_none());

        store.deliver(1, Ok(Snapshot::new(vec![order_doc("c", "completed")])));
        let snapshot = completed.try_next().unwrap().unwrap();
        assert_eq!(snapshot.documents[0].id, "c");
    }

    #[test]
    fn test_queued_snapshot_goes_stale_on_cancel() {
        let store = MemoryStore::with_documents(vec![order_doc("a", "processing")]);
        let mut manager = SubscriptionManager::new(store, signed_in());
        let stream = manager.subscribe(OrderFilter::all()).unwrap();
        assert!(stream.is_current());

        // Initial snapshot is queued but not consumed yet
        manager.cancel();

        assert!(!stream.is_current());
        assert!(stream.try_next().is_none());
        assert!(stream.latest().is_none());
        assert!(manager.active_filter().is_none());
    }

    #[test]
    fn test_failed_resubscribe_still_cancels_previous() {
        let store = MemoryStore::new();
        let mut manager = SubscriptionManager::new(store.clone(), signed_in());
        let stream = manager.subscribe(OrderFilter::all()).unwrap();

        manager.auth = StaticAuth::signed_out();
        assert!(manager
            .subscribe(OrderFilter::status(OrderStatus::Completed))
            .is_err());

        assert_eq!(store.watcher_count(), 0);
        assert!(!stream.is_current());
    }

    #[test]
    fn test_generations_increase() {
        let mut manager = SubscriptionManager::new(MemoryStore::new(), signed_in());
        let first = manager.subscribe(OrderFilter::all()).unwrap();
        let second = manager.subscribe(OrderFilter::all()).unwrap();
        assert!(second.generation() > first.generation());
        assert_eq!(manager.generation(), second.generation());
    }

    #[test]
    fn test_drop_manager_releases_query() {
        let store = MemoryStore::new();
        let stream = {
            let mut manager = SubscriptionManager::new(store.clone(), signed_in());
            manager.subscribe(OrderFilter::all()).unwrap()
        };
        assert_eq!(store.watcher_count(), 0);
        assert!(!stream.is_current());
    }

    #[test]
    fn test_next_timeout_on_empty_stream() {
        let store = ScriptedStore::default();
        let mut manager = SubscriptionManager::new(store, signed_in());
        let stream = manager.subscribe(OrderFilter::all()).unwrap();
        assert!(stream.next_timeout(Duration::from_millis(10)).is_none());
    }
}
