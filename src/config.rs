//! Configuration management
//!
//! Loads `watchdog.toml` at startup. Every value has a default, so a missing
//! file runs the reference behavior. Credentials never live in the file; they
//! are read from the environment.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::exchange::OrderStatus;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub quoting: QuotingConfig,
    #[serde(default)]
    pub cancellation: CancellationConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Venue endpoints and the one market the watchdog manages
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_market_id")]
    pub market_id: String,
}

/// Speculative order placement
#[derive(Debug, Clone, Deserialize)]
pub struct QuotingConfig {
    #[serde(default = "default_quote_interval")]
    pub interval_secs: u64,
    /// Target price = best bid * discount
    #[serde(default = "default_discount")]
    pub discount: Decimal,
    #[serde(default = "default_price_tick")]
    pub price_tick: Decimal,
    #[serde(default = "default_size_tick")]
    pub size_tick: Decimal,
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancellationConfig {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Pending cancel ids; a full queue drops new ids until the next scan
    #[serde(default = "default_cancel_queue")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Statuses removed by each sweep
    #[serde(default = "default_evict_statuses")]
    pub evict_statuses: Vec<OrderStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Envelopes buffered between the socket and the dispatcher
    #[serde(default = "default_event_queue")]
    pub queue_capacity: usize,
    /// Channel kinds whose decoded payloads are logged at info level
    #[serde(default = "default_display")]
    pub display: Vec<String>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
            market_id: default_market_id(),
        }
    }
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_quote_interval(),
            discount: default_discount(),
            price_tick: default_price_tick(),
            size_tick: default_size_tick(),
            order_size: default_order_size(),
        }
    }
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            queue_capacity: default_cancel_queue(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            evict_statuses: default_evict_statuses(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_event_queue(),
            display: default_display(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.prod.rabbitx.io".to_string()
}

fn default_ws_url() -> String {
    "wss://api.prod.rabbitx.io/ws".to_string()
}

fn default_market_id() -> String {
    "ETH-USD".to_string()
}

fn default_quote_interval() -> u64 {
    3
}

fn default_discount() -> Decimal {
    Decimal::new(94, 2)
}

fn default_price_tick() -> Decimal {
    Decimal::new(1, 1)
}

fn default_size_tick() -> Decimal {
    Decimal::new(1, 3)
}

fn default_order_size() -> Decimal {
    Decimal::new(1, 3)
}

fn default_scan_interval() -> u64 {
    5
}

fn default_cancel_queue() -> usize {
    10_000
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_evict_statuses() -> Vec<OrderStatus> {
    vec![OrderStatus::Canceled]
}

fn default_event_queue() -> usize {
    4_096
}

fn default_display() -> Vec<String> {
    vec!["account".to_string()]
}

impl QuotingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl CancellationConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`, or defaults if the file does not exist.
    /// `API_URL`, `WS_URL` and `MARKET_ID` in the environment override the file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            info!("[CONFIG] {} not found, using defaults", path.display());
            Self::default()
        };

        if let Ok(url) = std::env::var("API_URL") {
            config.venue.api_url = url;
        }
        if let Ok(url) = std::env::var("WS_URL") {
            config.venue.ws_url = url;
        }
        if let Ok(market) = std::env::var("MARKET_ID") {
            config.venue.market_id = market;
        }
        Ok(config)
    }
}

/// Ready-to-use credentials from the environment
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub jwt: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: std::env::var("API_KEY").context("API_KEY not set")?,
            api_secret: std::env::var("API_SECRET").context("API_SECRET not set")?,
            jwt: std::env::var("PRIVATE_JWT").context("PRIVATE_JWT not set")?,
        })
    }
}
