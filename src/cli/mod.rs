use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::services::auth::require_principal;
use crate::services::{
    complete_order, orders_for_tab, ChartState, DashboardConfig, PriceBreakdown, SalesOverview,
    SessionFileAuth,
};
use crate::store::{DirStore, OrderFilter, OrderStore};
use crate::types::{Order, OrderStatus, SalesSeries, SalesboardError, TimeFrame};

/// How long a one-shot overview waits for its first snapshot
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Width of the text bar chart
const BAR_WIDTH: usize = 40;

/// Live sales dashboard for laundry orders
#[derive(Parser)]
#[command(name = "salesboard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Order document directory (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Operator session file (overrides config)
    #[arg(long, global = true, value_name = "FILE")]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sales per period (default)
    Overview {
        /// daily, weekly, monthly or yearly
        #[arg(long, short)]
        timeframe: Option<TimeFrame>,

        /// Only count orders with this status
        #[arg(long, short)]
        status: Option<OrderStatus>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Keep running and print every update
        #[arg(long, short)]
        watch: bool,
    },

    /// List orders, newest first
    Orders {
        #[arg(long, short)]
        status: Option<OrderStatus>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one order with its price breakdown
    Show {
        #[arg(value_name = "ORDER_ID")]
        id: String,
    },

    /// Mark a processing order as completed
    Complete {
        #[arg(value_name = "ORDER_ID")]
        id: String,
    },
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let mut config = DashboardConfig::load().context("loading ~/.salesboard/config.json")?;
        if let Some(dir) = self.store {
            config.store_dir = dir;
        }
        if let Some(file) = self.session {
            config.session_file = file;
        }

        let store = DirStore::new(&config.store_dir, config.poll_interval());
        let auth = SessionFileAuth::new(&config.session_file);

        match self.command {
            None => run_overview(store, auth, config.default_timeframe, None, false, false),
            Some(Commands::Overview {
                timeframe,
                status,
                json,
                watch,
            }) => run_overview(
                store,
                auth,
                timeframe.unwrap_or(config.default_timeframe),
                status,
                json,
                watch,
            ),
            Some(Commands::Orders { status, json }) => run_orders(&store, &auth, status, json),
            Some(Commands::Show { id }) => run_show(&store, &auth, &id),
            Some(Commands::Complete { id }) => {
                let order = complete_order(&store, &auth, &id)?;
                println!("Order {} marked completed", display_number(&order));
                Ok(())
            }
        }
    }
}

fn run_overview(
    store: DirStore,
    auth: SessionFileAuth,
    timeframe: TimeFrame,
    status: Option<OrderStatus>,
    json: bool,
    watch: bool,
) -> anyhow::Result<()> {
    let filter = status.map_or_else(OrderFilter::all, OrderFilter::status);
    let mut overview = SalesOverview::new(store, auth, timeframe);
    overview.set_filter(filter)?;

    if watch {
        loop {
            if overview.wait_update(FIRST_SNAPSHOT_TIMEOUT) {
                print_state(overview.state(), json)?;
            }
        }
    }

    if !overview.wait_update(FIRST_SNAPSHOT_TIMEOUT) {
        anyhow::bail!(
            "no snapshot received within {}s",
            FIRST_SNAPSHOT_TIMEOUT.as_secs()
        );
    }
    overview.stop();
    print_state(overview.state(), json)?;

    if let ChartState::Failed { message, .. } = overview.state() {
        anyhow::bail!("{}", message);
    }
    Ok(())
}

fn print_state(state: &ChartState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&state.payload())?);
        return Ok(());
    }
    println!("{}", render_state(state));
    Ok(())
}

fn render_state(state: &ChartState) -> String {
    match state {
        ChartState::Empty => "Waiting for orders...".to_string(),
        ChartState::Ready(series) => render_series(series),
        ChartState::Failed { message, last_good } => {
            let mut out = format!("Live updates failed: {}", message);
            if let Some(series) = last_good {
                out.push_str("\nLast good data (not live):\n");
                out.push_str(&render_series(series));
            }
            out
        }
    }
}

/// Text chart: one row per period with a bar scaled to the peak
fn render_series(series: &SalesSeries) -> String {
    let mut out = format!("{}\n", series.timeframe.label());
    if series.is_empty() {
        out.push_str("No dated orders");
        return out;
    }

    let peak = series.peak().map_or(0.0, |b| b.amount);
    let label_width = series
        .buckets
        .iter()
        .map(|b| b.label.len())
        .max()
        .unwrap_or(0)
        .max(series.timeframe.period_column_label().len());

    out.push_str(&format!(
        "{:<width$}  {:>14}\n",
        series.timeframe.period_column_label(),
        "Amount",
        width = label_width
    ));
    for bucket in &series.buckets {
        let bar = if peak > 0.0 {
            ((bucket.amount / peak) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:<width$}  {:>14}  {}\n",
            bucket.label,
            format_amount(bucket.amount),
            "#".repeat(bar),
            width = label_width
        ));
    }
    out.push_str(&format!(
        "{:<width$}  {:>14}",
        "Total",
        format_amount(series.total()),
        width = label_width
    ));
    out
}

fn run_orders(
    store: &DirStore,
    auth: &SessionFileAuth,
    status: Option<OrderStatus>,
    json: bool,
) -> anyhow::Result<()> {
    require_principal(auth)?;
    let orders = store.query(OrderFilter::all())?.orders();
    let tab = orders_for_tab(&orders, status);

    if json {
        println!("{}", serde_json::to_string_pretty(&tab)?);
        return Ok(());
    }

    if tab.is_empty() {
        println!("No orders");
        return Ok(());
    }
    println!(
        "{:<22}  {:<16}  {:<10}  {:>14}",
        "Order", "Created", "Status", "Amount"
    );
    for order in tab {
        println!(
            "{:<22}  {:<16}  {:<10}  {:>14}",
            display_number(order),
            format_created(order),
            order.status.map_or("-", |s| s.as_str()),
            format_amount(order.total_amount)
        );
    }
    Ok(())
}

fn run_show(store: &DirStore, auth: &SessionFileAuth, id: &str) -> anyhow::Result<()> {
    require_principal(auth)?;
    let doc = store
        .get(id)?
        .ok_or_else(|| SalesboardError::NotFound(id.to_string()))?;
    let order = Order::from_fields(&doc.id, &doc.fields)?;
    println!("{}", render_order(&order));
    Ok(())
}

fn render_order(order: &Order) -> String {
    let mut out = format!("Order {}\n", display_number(order));
    out.push_str(&format!("  Created:   {}\n", format_created(order)));
    out.push_str(&format!(
        "  Status:    {}\n",
        order.status.map_or("-", |s| s.as_str())
    ));
    if let Some(email) = &order.user_email {
        out.push_str(&format!("  Customer:  {}\n", email));
    }
    if let Some(address) = &order.shipping_address {
        out.push_str(&format!("  Address:   {}\n", address.address_string));
    }
    if let Some(pickup) = order.pickup_date {
        out.push_str(&format!("  Pickup:    {}\n", pickup.format("%Y-%m-%d %H:%M")));
    }
    if let Some(delivery) = order.delivery_date {
        out.push_str(&format!(
            "  Delivery:  {}\n",
            delivery.format("%Y-%m-%d %H:%M")
        ));
    }

    if !order.baskets.is_empty() {
        out.push_str("\n  Items\n");
        for item in &order.baskets {
            let mut extras = Vec::new();
            if item.fold {
                extras.push("fold");
            }
            if item.ironing {
                extras.push("ironing");
            }
            let extras = if extras.is_empty() {
                String::new()
            } else {
                format!(" ({})", extras.join(", "))
            };
            out.push_str(&format!(
                "    {} x{}{}  {:>14}\n",
                item.name,
                item.quantity,
                extras,
                format_amount(item.line_total())
            ));
        }
    }

    let breakdown = PriceBreakdown::from_order(order);
    out.push_str("\n  Price\n");
    for (label, amount) in [
        ("Subtotal", breakdown.subtotal),
        ("Folding", breakdown.fold_fees),
        ("Ironing", breakdown.ironing_fees),
        ("Transport", breakdown.transportation_fees),
        ("Total", breakdown.total),
    ] {
        out.push_str(&format!("    {:<10} {:>14}\n", label, format_amount(amount)));
    }
    if breakdown.discrepancy().abs() >= 0.005 {
        out.push_str(&format!(
            "    (stored total differs from items + fees by {})\n",
            format_amount(breakdown.discrepancy())
        ));
    }
    out.trim_end().to_string()
}

fn display_number(order: &Order) -> &str {
    order.order_number.as_deref().unwrap_or(&order.id)
}

fn format_created(order: &Order) -> String {
    order
        .created_at
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "pending".to_string())
}

/// Thousands separators and two decimals: 1234.5 -> "1,234.50"
pub fn format_amount(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let len = whole.len();
    let mut out = String::with_capacity(len + len / 3 + 4);
    if amount < 0.0 && cents > 0 {
        out.push('-');
    }
    // Digits are ASCII, so byte indexing is safe
    for (i, ch) in whole.bytes().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch as char);
    }
    out.push_str(&format!(".{:02}", cents % 100));
    out
}
