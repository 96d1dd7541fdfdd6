//! Document store interface consumed by the dashboard, plus store clients

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{Order, OrderStatus, Result};

/// Field holding the order lifecycle tag
pub const STATUS_FIELD: &str = "status";

/// One stored record: id plus its field map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Decode as an order; broken documents are logged and skipped
    pub fn to_order(&self) -> Option<Order> {
        match Order::from_fields(&self.id, &self.fields) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!(error = %e, "skipping undecodable document");
                None
            }
        }
    }
}

/// Full current result set of a live query (never a diff)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Decode every document into an order.
    ///
    /// Orders without a creation timestamp are kept here (order views list
    /// them) but logged, since sales aggregation leaves them out.
    pub fn orders(&self) -> Vec<Order> {
        let orders: Vec<Order> = self.documents.iter().filter_map(Document::to_order).collect();
        for order in orders.iter().filter(|o| o.created_at.is_none()) {
            warn!(order = %order.id, "order has no createdAt; excluded from sales");
        }
        orders
    }
}

/// Equality filter on the status field; `None` selects every order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self { status: None }
    }

    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self.status {
            None => true,
            Some(status) => doc.field_str(STATUS_FIELD) == Some(status.as_str()),
        }
    }

    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Snapshot {
        Snapshot::new(documents.into_iter().filter(|d| self.matches(d)).collect())
    }
}

impl std::fmt::Display for OrderFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "status == {}", status),
            None => f.write_str("all orders"),
        }
    }
}

/// A snapshot or a transport failure, delivered through the same channel
pub type StoreEvent = Result<Snapshot>;

/// Callback the store invokes on every change of a watched query
pub type SnapshotSink = Arc<dyn Fn(StoreEvent) + Send + Sync>;

/// Registration of a live query; cancelled explicitly or on drop
pub struct Watch {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Watch {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Release the registration; no further deliveries are made
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Remote order collection
pub trait OrderStore: Send + Sync {
    /// Open a live query. The current snapshot is delivered to `sink` once
    /// the query is established and again after every change.
    fn watch(&self, filter: OrderFilter, sink: SnapshotSink) -> Result<Watch>;

    /// Fetch one document by id
    fn get(&self, id: &str) -> Result<Option<Document>>;

    /// One-shot read of the documents matching `filter`
    fn query(&self, filter: OrderFilter) -> Result<Snapshot>;

    /// Overwrite the status field of one document
    fn set_status(&self, id: &str, status: OrderStatus) -> Result<()>;
}

impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    fn watch(&self, filter: OrderFilter, sink: SnapshotSink) -> Result<Watch> {
        (**self).watch(filter, sink)
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        (**self).get(id)
    }

    fn query(&self, filter: OrderFilter) -> Result<Snapshot> {
        (**self).query(filter)
    }

    fn set_status(&self, id: &str, status: OrderStatus) -> Result<()> {
        (**self).set_status(id, status)
    }
}
