//! Startup reconciliation - seeds the order book from the venue's order listing

use anyhow::Result;
use tracing::info;

use crate::exchange::{OrderDirectory, OrderStatus};

use super::order_book::OrderBook;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BootstrapReport {
    pub seeded: usize,
    pub skipped: usize,
}

/// List the market's orders and track every `open` one. Orders in any other
/// status are left out. A listing failure is returned unchanged.
pub async fn seed_open_orders(
    directory: &dyn OrderDirectory,
    market_id: &str,
    order_book: &OrderBook,
) -> Result<BootstrapReport> {
    let orders = directory.list_orders(market_id).await?;
    let total = orders.len();

    let seeded = order_book
        .upsert_many(
            orders
                .into_iter()
                .filter(|o| o.status == OrderStatus::Open)
                .map(|o| (o.id, OrderStatus::Open)),
        )
        .await;

    let report = BootstrapReport {
        seeded,
        skipped: total - seeded,
    };
    info!("[BOOTSTRAP] {}: {} open orders tracked, {} skipped", market_id, report.seeded, report.skipped);
    Ok(report)
}
