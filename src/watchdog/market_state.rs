//! Best bid / best ask snapshot fed by the `market:<id>` channel

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::exchange::MarketData;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopOfBook {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

pub struct MarketState {
    top: RwLock<TopOfBook>,
}

impl MarketState {
    pub fn new() -> Self {
        Self {
            top: RwLock::new(TopOfBook::default()),
        }
    }

    /// Apply a market update. Only strictly positive values are taken; zero,
    /// negative or missing fields leave the current value alone.
    /// Returns true if anything changed.
    pub async fn apply(&self, update: &MarketData) -> bool {
        let bid = update.best_bid.filter(|v| *v > Decimal::ZERO);
        let ask = update.best_ask.filter(|v| *v > Decimal::ZERO);
        if bid.is_none() && ask.is_none() {
            return false;
        }

        let mut top = self.top.write().await;
        let before = *top;
        if let Some(ask) = ask {
            top.best_ask = ask;
        }
        if let Some(bid) = bid {
            top.best_bid = bid;
        }
        *top != before
    }

    pub async fn snapshot(&self) -> TopOfBook {
        *self.top.read().await
    }

    pub async fn best_bid(&self) -> Decimal {
        self.top.read().await.best_bid
    }
}

impl Default for MarketState {
    fn default() -> Self {
        Self::new()
    }
}
