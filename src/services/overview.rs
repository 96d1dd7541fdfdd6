//! Sales overview state driven by live order snapshots

use std::time::Duration;

use chrono::FixedOffset;
use serde::Serialize;
use tracing::{debug, error};

use super::aggregator::Aggregator;
use super::auth::AuthProvider;
use super::subscription::{SnapshotStream, SubscriptionManager};
use crate::store::{OrderFilter, OrderStore, StoreEvent};
use crate::types::{ChartData, Order, Result, SalesSeries, TimeFrame};

/// What the chart should currently show
#[derive(Debug, Clone, PartialEq)]
pub enum ChartState {
    /// Nothing delivered yet for the current filter
    Empty,
    /// Aggregated series for the latest snapshot
    Ready(SalesSeries),
    /// Subscription or transport failure
    Failed {
        message: String,
        /// Series from the last good snapshot, if any
        last_good: Option<SalesSeries>,
    },
}

impl ChartState {
    pub fn series(&self) -> Option<&SalesSeries> {
        match self {
            Self::Ready(series) => Some(series),
            Self::Empty | Self::Failed { .. } => None,
        }
    }

    /// Presentation payload carrying the state alongside the chart
    pub fn payload(&self) -> ChartPayload {
        match self {
            Self::Empty => ChartPayload::Empty,
            Self::Ready(series) => ChartPayload::Ready {
                chart: series.chart_data(),
            },
            Self::Failed { message, last_good } => ChartPayload::Failed {
                error: message.clone(),
                stale: last_good.as_ref().map(SalesSeries::chart_data),
            },
        }
    }
}

/// Serialized chart state, tagged by `status`.
///
/// A failed state never passes its last good chart off as live: it is
/// reported under `stale`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChartPayload {
    Empty,
    Ready {
        #[serde(flatten)]
        chart: ChartData,
    },
    Failed {
        error: String,
        stale: Option<ChartData>,
    },
}

/// Sales overview: one live subscription, the selected time frame and the
/// chart derived from the last snapshot.
///
/// Single-threaded; the caller pumps it from its event loop.
pub struct SalesOverview<S, A> {
    subscriptions: SubscriptionManager<S, A>,
    stream: Option<SnapshotStream>,
    filter: OrderFilter,
    timeframe: TimeFrame,
    orders: Option<Vec<Order>>,
    state: ChartState,
    /// Calendar zone for period keys; the operator's local zone when unset
    zone: Option<FixedOffset>,
}

impl<S: OrderStore, A: AuthProvider> SalesOverview<S, A> {
    pub fn new(store: S, auth: A, timeframe: TimeFrame) -> Self {
        Self {
            subscriptions: SubscriptionManager::new(store, auth),
            stream: None,
            filter: OrderFilter::all(),
            timeframe,
            orders: None,
            state: ChartState::Empty,
            zone: None,
        }
    }

    /// Bucket by `zone` instead of the local zone
    pub fn with_timezone(mut self, zone: FixedOffset) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn state(&self) -> &ChartState {
        &self.state
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn filter(&self) -> OrderFilter {
        self.filter
    }

    /// Orders from the last applied snapshot
    pub fn orders(&self) -> Option<&[Order]> {
        self.orders.as_deref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.stream.as_ref().is_some_and(SnapshotStream::is_current)
    }

    /// Subscribe with `filter`, replacing any earlier subscription.
    ///
    /// Data for the previous filter is cleared right away so it is never
    /// shown under the new one.
    pub fn set_filter(&mut self, filter: OrderFilter) -> Result<()> {
        if filter == self.filter && self.is_subscribed() {
            return Ok(());
        }

        self.filter = filter;
        self.orders = None;
        self.state = ChartState::Empty;
        self.stream = None;

        match self.subscriptions.subscribe(filter) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, %filter, "sales subscription failed");
                self.state = ChartState::Failed {
                    message: e.to_string(),
                    last_good: None,
                };
                Err(e)
            }
        }
    }

    /// Switch granularity; re-aggregates the last snapshot, same subscription
    pub fn set_timeframe(&mut self, timeframe: TimeFrame) {
        if timeframe == self.timeframe {
            return;
        }
        self.timeframe = timeframe;

        let Some(orders) = &self.orders else {
            return;
        };
        let series = self.aggregate(orders);
        self.state = match &self.state {
            ChartState::Failed { message, .. } => ChartState::Failed {
                message: message.clone(),
                last_good: Some(series),
            },
            ChartState::Empty | ChartState::Ready(_) => ChartState::Ready(series),
        };
    }

    /// Apply whatever has arrived: the newest snapshot, then any failure
    /// reported after it. Returns whether the chart state changed.
    pub fn pump(&mut self) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        let events = coalesce(stream.pending());
        self.apply_all(events)
    }

    /// Block up to `timeout` for a delivery, then apply like [`Self::pump`]
    pub fn wait_update(&mut self, timeout: Duration) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        let Some(first) = stream.next_timeout(timeout) else {
            return false;
        };
        let events = coalesce(std::iter::once(first).chain(stream.pending()));
        self.apply_all(events)
    }

    /// Drop the subscription; the chart keeps its last state
    pub fn stop(&mut self) {
        self.subscriptions.cancel();
        self.stream = None;
    }

    fn aggregate(&self, orders: &[Order]) -> SalesSeries {
        match &self.zone {
            Some(zone) => Aggregator::sales_in(orders, self.timeframe, zone),
            None => Aggregator::sales(orders, self.timeframe),
        }
    }

    fn apply_all(&mut self, events: Vec<StoreEvent>) -> bool {
        let changed = !events.is_empty();
        for event in events {
            self.apply(event);
        }
        changed
    }

    fn apply(&mut self, event: StoreEvent) {
        match event {
            Ok(snapshot) => {
                let orders = snapshot.orders();
                let series = self.aggregate(&orders);
                debug!(
                    orders = orders.len(),
                    buckets = series.buckets.len(),
                    timeframe = %self.timeframe,
                    "sales snapshot applied"
                );
                self.orders = Some(orders);
                self.state = ChartState::Ready(series);
            }
            Err(e) => {
                error!(error = %e, filter = %self.filter, "order subscription reported a failure");
                let last_good = match std::mem::replace(&mut self.state, ChartState::Empty) {
                    ChartState::Ready(series) => Some(series),
                    ChartState::Failed { last_good, .. } => last_good,
                    ChartState::Empty => None,
                };
                self.state = ChartState::Failed {
                    message: e.to_string(),
                    last_good,
                };
            }
        }
    }
}

/// Reduce a burst of deliveries to the newest snapshot followed by the
/// newest failure that arrived after it
fn coalesce(events: impl IntoIterator<Item = StoreEvent>) -> Vec<StoreEvent> {
    let mut snapshot = None;
    let mut failure = None;
    for event in events {
        match event {
            Ok(s) => {
                snapshot = Some(s);
                failure = None;
            }
            Err(e) => failure = Some(e),
        }
    }
    snapshot.map(Ok).into_iter().chain(failure.map(Err)).collect()
}
