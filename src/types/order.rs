//! Order records as stored in the `orders` collection

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{Result, SalesboardError};

/// Order lifecycle tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Status tabs in display order
    pub const ALL: [OrderStatus; 3] = [Self::Processing, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = SalesboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SalesboardError::Parse(format!(
                "unknown order status '{}'",
                other
            ))),
        }
    }
}

/// One laundry item line in an order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketItem {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub fold: bool,
    pub ironing: bool,
}

impl BasketItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address_string: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// An order as seen by the dashboard (read-only; the store owns it)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    /// Store document id
    pub id: String,
    /// Human-facing order number
    pub order_number: Option<String>,
    pub total_amount: f64,
    /// Unset while the server timestamp write is still propagating
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<OrderStatus>,
    pub baskets: Vec<BasketItem>,
    pub fold_fees: f64,
    pub ironing_fees: f64,
    pub transportation_fees: f64,
    pub pickup_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub shipping_address: Option<ShippingAddress>,
    pub user_email: Option<String>,
    pub user_id: Option<String>,
}

impl Order {
    /// Minimal order carrying only the fields sales aggregation reads
    pub fn new(
        id: impl Into<String>,
        total_amount: f64,
        created_at: Option<DateTime<Utc>>,
        status: Option<OrderStatus>,
    ) -> Self {
        Self {
            id: id.into(),
            order_number: None,
            total_amount,
            created_at,
            status,
            baskets: Vec::new(),
            fold_fees: 0.0,
            ironing_fees: 0.0,
            transportation_fees: 0.0,
            pickup_date: None,
            delivery_date: None,
            shipping_address: None,
            user_email: None,
            user_id: None,
        }
    }

    /// Sum of basket lines, before fees
    pub fn subtotal(&self) -> f64 {
        self.baskets.iter().map(BasketItem::line_total).sum()
    }

    /// Creation date on the operator's local calendar
    pub fn local_date(&self) -> Option<NaiveDate> {
        self.created_at
            .map(|ts| ts.with_timezone(&Local).date_naive())
    }

    /// Decode a store document's field map.
    ///
    /// Only a structurally broken document is an error. Missing or
    /// unreadable optional fields (including `createdAt`) decode as unset.
    pub fn from_fields(id: &str, fields: &Map<String, Value>) -> Result<Self> {
        let raw: OrderFields = serde_json::from_value(Value::Object(fields.clone())).map_err(
            |e| SalesboardError::MalformedRecord {
                id: id.to_string(),
                reason: e.to_string(),
            },
        )?;

        let total_amount = match raw.total_amount {
            None => 0.0,
            Some(amount) if amount.is_finite() && amount >= 0.0 => amount,
            Some(amount) => {
                warn!(order = id, amount, "invalid totalAmount, counting as 0");
                0.0
            }
        };

        let status = raw.status.as_deref().and_then(|s| match s.parse() {
            Ok(status) => Some(status),
            Err(_) => {
                debug!(order = id, status = s, "unrecognized order status");
                None
            }
        });

        Ok(Self {
            id: id.to_string(),
            order_number: raw.order_id,
            total_amount,
            created_at: decode_timestamp(id, "createdAt", raw.created_at),
            status,
            baskets: raw.baskets,
            fold_fees: raw.fold_fees,
            ironing_fees: raw.ironing_fees,
            transportation_fees: raw.transportation_fees,
            pickup_date: decode_timestamp(id, "pickupDate", raw.pickup_date),
            delivery_date: decode_timestamp(id, "deliveryDate", raw.delivery_date),
            shipping_address: raw.shipping_address,
            user_email: raw.user_email,
            user_id: raw.user_id,
        })
    }
}

/// Wire shape of an order document
#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct OrderFields {
    order_id: Option<String>,
    total_amount: Option<f64>,
    created_at: Option<StoreTimestamp>,
    status: Option<String>,
    baskets: Vec<BasketItem>,
    fold_fees: f64,
    ironing_fees: f64,
    transportation_fees: f64,
    pickup_date: Option<StoreTimestamp>,
    delivery_date: Option<StoreTimestamp>,
    shipping_address: Option<ShippingAddress>,
    user_email: Option<String>,
    user_id: Option<String>,
}

/// Timestamp encodings found in exported documents
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StoreTimestamp {
    /// `{ "seconds": .., "nanoseconds": .. }` (or `_seconds` / `_nanoseconds`)
    Parts {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(alias = "_nanoseconds", default)]
        nanoseconds: u32,
    },
    /// Epoch milliseconds
    Millis(i64),
    /// RFC 3339 text
    Text(String),
}

impl StoreTimestamp {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Parts {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            Self::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

fn decode_timestamp(
    id: &str,
    field: &str,
    raw: Option<StoreTimestamp>,
) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let decoded = raw.to_utc();
    if decoded.is_none() {
        warn!(order = id, field, value = ?raw, "unreadable timestamp, treating as unset");
    }
    decoded
}
