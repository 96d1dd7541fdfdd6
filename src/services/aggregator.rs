//! Aggregator service for computing sales time series

use std::collections::BTreeMap;

use chrono::{Local, TimeZone};

use crate::types::{Order, OrderStatus, PeriodBucket, PeriodKey, SalesSeries, TimeFrame};

/// Totals across a set of orders
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SalesTotals {
    pub order_count: u64,
    /// Orders that have a creation timestamp and so appear in the series
    pub dated_count: u64,
    pub total_amount: f64,
    /// Sum over dated orders only; equals the series total
    pub dated_amount: f64,
}

/// Per-status order count and amount
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusTotals {
    pub count: u64,
    pub amount: f64,
}

/// Aggregator for computing sales statistics
pub struct Aggregator;

impl Aggregator {
    /// Sales per period on the local calendar, in calendar order
    pub fn sales(orders: &[Order], timeframe: TimeFrame) -> SalesSeries {
        Self::sales_in(orders, timeframe, &Local)
    }

    /// Sales per period on the calendar of `tz`.
    ///
    /// Orders without a creation timestamp are left out. Orders that fall
    /// into the same period key add up; no empty periods are filled in.
    pub fn sales_in<Tz: TimeZone>(orders: &[Order], timeframe: TimeFrame, tz: &Tz) -> SalesSeries {
        if orders.is_empty() {
            return SalesSeries {
                timeframe,
                buckets: Vec::new(),
            };
        }

        // BTreeMap keeps keys in calendar order
        let mut by_period: BTreeMap<PeriodKey, f64> = BTreeMap::new();

        for order in orders {
            let Some(created_at) = order.created_at else {
                continue;
            };
            let date = created_at.with_timezone(tz).date_naive();
            *by_period
                .entry(PeriodKey::for_date(date, timeframe))
                .or_insert(0.0) += order.total_amount;
        }

        SalesSeries {
            timeframe,
            buckets: by_period
                .into_iter()
                .map(|(key, amount)| PeriodBucket {
                    label: key.label(),
                    amount,
                })
                .collect(),
        }
    }

    /// Aggregate orders by status (orders without a known status are skipped)
    pub fn by_status(orders: &[Order]) -> BTreeMap<OrderStatus, StatusTotals> {
        let mut status_map: BTreeMap<OrderStatus, StatusTotals> = BTreeMap::new();

        for order in orders {
            let Some(status) = order.status else {
                continue;
            };
            let totals = status_map.entry(status).or_default();
            totals.count = totals.count.saturating_add(1);
            totals.amount += order.total_amount;
        }

        status_map
    }

    /// Compute totals across all orders
    pub fn total(orders: &[Order]) -> SalesTotals {
        let mut totals = SalesTotals::default();

        for order in orders {
            totals.order_count = totals.order_count.saturating_add(1);
            totals.total_amount += order.total_amount;
            if order.created_at.is_some() {
                totals.dated_count = totals.dated_count.saturating_add(1);
                totals.dated_amount += order.total_amount;
            }
        }

        totals
    }
}
