//! Event Dispatcher
//!
//! Routes feed envelopes by channel prefix. Market updates go to the market
//! state, account updates are merged into the order book, order book and trade
//! publications are decoded and otherwise ignored.
//!
//! Nothing in here returns an error to the caller: every bad envelope is logged
//! and dropped so one broken payload never stalls the feed.

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::exchange::{EventEnvelope, MarketData, OrderbookData, ProfileData, TradeData};

use super::market_state::MarketState;
use super::order_book::OrderBook;

/// Payload type selected by the channel prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Market,
    Account,
    Orderbook,
    Trade,
    Unknown,
}

impl ChannelKind {
    /// Prefix before `@` if there is one, otherwise before `:`.
    /// `None` when the channel has neither separator.
    pub fn parse(channel: &str) -> Option<Self> {
        let prefix = match channel.split_once('@') {
            Some((prefix, _)) => prefix,
            None => channel.split_once(':')?.0,
        };
        Some(Self::from_prefix(prefix))
    }

    pub fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "market" => ChannelKind::Market,
            "account" => ChannelKind::Account,
            "orderbook" => ChannelKind::Orderbook,
            "trade" => ChannelKind::Trade,
            _ => ChannelKind::Unknown,
        }
    }
}

/// What happened to one envelope
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    MarketUpdated,
    MarketUnchanged,
    /// Account update merged; number of orders written
    OrdersMerged(usize),
    DecodedOnly,
    Malformed,
    UnknownChannel,
    DecodeFailed,
}

pub struct Dispatcher {
    order_book: Arc<OrderBook>,
    market: Arc<MarketState>,
    display: HashSet<ChannelKind>,
}

impl Dispatcher {
    pub fn new(order_book: Arc<OrderBook>, market: Arc<MarketState>) -> Self {
        Self {
            order_book,
            market,
            display: HashSet::new(),
        }
    }

    /// Log decoded payloads of these channel prefixes at info level
    pub fn with_display<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.display = prefixes
            .into_iter()
            .map(|p| ChannelKind::from_prefix(p.as_ref()))
            .filter(|kind| *kind != ChannelKind::Unknown)
            .collect();
        self
    }

    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchOutcome {
        let Some(kind) = ChannelKind::parse(&envelope.channel) else {
            warn!(channel = %envelope.channel, "[DISPATCH] Malformed channel, dropping");
            return DispatchOutcome::Malformed;
        };

        match kind {
            ChannelKind::Market => {
                let Some(update) = self.decode::<MarketData>(kind, envelope) else {
                    return DispatchOutcome::DecodeFailed;
                };
                if self.market.apply(&update).await {
                    DispatchOutcome::MarketUpdated
                } else {
                    DispatchOutcome::MarketUnchanged
                }
            }
            ChannelKind::Account => {
                let Some(profile) = self.decode::<ProfileData>(kind, envelope) else {
                    return DispatchOutcome::DecodeFailed;
                };
                let merged = self
                    .order_book
                    .upsert_many(profile.orders.into_iter().map(|o| (o.id, o.status)))
                    .await;
                if merged > 0 {
                    debug!(channel = %envelope.channel, merged, "[DISPATCH] Account orders merged");
                }
                DispatchOutcome::OrdersMerged(merged)
            }
            ChannelKind::Orderbook => match self.decode::<OrderbookData>(kind, envelope) {
                Some(_) => DispatchOutcome::DecodedOnly,
                None => DispatchOutcome::DecodeFailed,
            },
            ChannelKind::Trade => match self.decode::<TradeData>(kind, envelope) {
                Some(_) => DispatchOutcome::DecodedOnly,
                None => DispatchOutcome::DecodeFailed,
            },
            ChannelKind::Unknown => {
                error!(channel = %envelope.channel, "[DISPATCH] Unknown channel");
                DispatchOutcome::UnknownChannel
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, kind: ChannelKind, envelope: &EventEnvelope) -> Option<T> {
        match serde_json::from_slice::<T>(&envelope.payload) {
            Ok(value) => {
                if self.display.contains(&kind) {
                    info!(channel = %envelope.channel, "[DISPATCH] {}", String::from_utf8_lossy(&envelope.payload));
                }
                Some(value)
            }
            Err(e) => {
                warn!(channel = %envelope.channel, "[DISPATCH] Decode failed: {}", e);
                None
            }
        }
    }

    /// Drain the hand-off queue until shutdown or until every sender is gone
    pub async fn run(
        &self,
        rx: Arc<Mutex<mpsc::Receiver<EventEnvelope>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut rx = rx.lock().await;
        info!("[DISPATCH] Started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                envelope = rx.recv() => {
                    match envelope {
                        Some(envelope) => {
                            self.dispatch(&envelope).await;
                        }
                        None => {
                            warn!("[DISPATCH] Feed closed");
                            break;
                        }
                    }
                }
            }
        }
        info!("[DISPATCH] Stopped");
    }
}
