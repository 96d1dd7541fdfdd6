//! Order list and detail views, and the "mark completed" action

use std::cmp::Reverse;

use serde::Serialize;
use tracing::info;

use super::auth::{require_principal, AuthProvider};
use crate::store::OrderStore;
use crate::types::{Order, OrderStatus, Result, SalesboardError};

/// Price breakdown shown on the order detail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub subtotal: f64,
    pub fold_fees: f64,
    pub ironing_fees: f64,
    pub transportation_fees: f64,
    pub total: f64,
}

impl PriceBreakdown {
    pub fn from_order(order: &Order) -> Self {
        Self {
            subtotal: order.subtotal(),
            fold_fees: order.fold_fees,
            ironing_fees: order.ironing_fees,
            transportation_fees: order.transportation_fees,
            total: order.total_amount,
        }
    }

    /// Difference between the stored total and subtotal + fees
    pub fn discrepancy(&self) -> f64 {
        self.total - (self.subtotal + self.fold_fees + self.ironing_fees + self.transportation_fees)
    }
}

/// Orders of one status tab, newest first; undated orders go last
pub fn orders_for_tab(orders: &[Order], status: Option<OrderStatus>) -> Vec<&Order> {
    let mut tab: Vec<&Order> = orders
        .iter()
        .filter(|o| status.is_none() || o.status == status)
        .collect();
    tab.sort_by_key(|o| (o.created_at.is_none(), Reverse(o.created_at)));
    tab
}

/// Mark a processing order completed, through the store.
///
/// Requires a signed-in operator. Only `processing` orders can move to
/// `completed`.
pub fn complete_order<S, A>(store: &S, auth: &A, id: &str) -> Result<Order>
where
    S: OrderStore + ?Sized,
    A: AuthProvider,
{
    let principal = require_principal(auth)?;
    let doc = store
        .get(id)?
        .ok_or_else(|| SalesboardError::NotFound(id.to_string()))?;
    let mut order = Order::from_fields(&doc.id, &doc.fields)?;

    if order.status != Some(OrderStatus::Processing) {
        return Err(SalesboardError::InvalidTransition {
            id: id.to_string(),
            from: order
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| doc.field_str("status").unwrap_or("unset").to_string()),
            to: OrderStatus::Completed,
        });
    }

    store.set_status(id, OrderStatus::Completed)?;
    info!(order = id, operator = %principal.uid, "order marked completed");
    order.status = Some(OrderStatus::Completed);
    Ok(order)
}
