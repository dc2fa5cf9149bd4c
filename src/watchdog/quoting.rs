//! Quoting loop
//!
//! Every tick places one long limit order at a discount to the best bid.
//! The order is deliberately far from the touch; the cancellation loop is
//! expected to take it down again.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QuotingConfig;
use crate::exchange::{OrderCreateRequest, OrderDirectory, Side};

use super::market_state::MarketState;
use super::order_book::OrderBook;
use super::tick::round_to_tick;

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    /// No usable best bid yet
    Skipped,
    Placed(String),
    Failed,
}

pub struct Quoter {
    directory: Arc<dyn OrderDirectory>,
    market: Arc<MarketState>,
    order_book: Arc<OrderBook>,
    market_id: String,
    config: QuotingConfig,
}

impl Quoter {
    pub fn new(
        directory: Arc<dyn OrderDirectory>,
        market: Arc<MarketState>,
        order_book: Arc<OrderBook>,
        market_id: String,
        config: QuotingConfig,
    ) -> Self {
        Self {
            directory,
            market,
            order_book,
            market_id,
            config,
        }
    }

    /// best bid * discount, rounded to the price tick. `None` while there is
    /// no positive bid.
    pub async fn target_price(&self) -> Option<Decimal> {
        let bid = self.market.best_bid().await;
        let target = bid.checked_mul(self.config.discount)?;
        if target <= Decimal::ZERO {
            return None;
        }
        Some(round_to_tick(target, self.config.price_tick))
    }

    pub async fn quote_once(&self) -> QuoteOutcome {
        let Some(price) = self.target_price().await else {
            debug!("[QUOTE] No bid yet, skipping");
            return QuoteOutcome::Skipped;
        };
        let size = round_to_tick(self.config.order_size, self.config.size_tick);

        let req = OrderCreateRequest::limit(self.market_id.clone(), Side::Long, price, size)
            .with_client_order_id(Uuid::new_v4().to_string());

        match self.directory.create_order(&req).await {
            Ok(result) => {
                info!(order_id = %result.id, status = %result.status, "[QUOTE] BUY {} @ {}", size, price);
                self.order_book.upsert(&result.id, result.status).await;
                QuoteOutcome::Placed(result.id)
            }
            Err(e) => {
                warn!("[QUOTE] Create failed @ {}: {:#}", price, e);
                QuoteOutcome::Failed
            }
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval();
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[QUOTE] Started, every {:?}", period);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    self.quote_once().await;
                }
            }
        }
        info!("[QUOTE] Stopped");
    }
}
