//! Services for sales aggregation, live subscriptions and order actions

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod orders;
pub mod overview;
pub mod subscription;

pub use aggregator::{Aggregator, SalesTotals, StatusTotals};
pub use auth::{AuthProvider, Principal, SessionFileAuth, StaticAuth};
pub use config::DashboardConfig;
pub use orders::{complete_order, orders_for_tab, PriceBreakdown};
pub use overview::{ChartPayload, ChartState, SalesOverview};
pub use subscription::{SnapshotStream, SubscriptionManager};
