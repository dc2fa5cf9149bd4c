//! Order Watchdog: REST snapshot + push-stream reconciliation for one market
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod exchange;
mod watchdog;

use config::{Config, Credentials};
use exchange::{channels_for, CentrifugeFeed, Identity, VenueAuth, VenueRestClient};
use watchdog::{Watchdog, WatchdogError};

const DEFAULT_CONFIG: &str = "watchdog.toml";

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WATCHDOG_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
        .into()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
    info!("═══ Order Watchdog ═══");

    let config = Config::load(&config_path())?;
    let creds = Credentials::from_env()?;
    info!("[CONFIG] market={} api={} ws={}", config.venue.market_id, config.venue.api_url, config.venue.ws_url);

    let auth = VenueAuth::new(creds.api_key, creds.api_secret);
    let rest = Arc::new(VenueRestClient::new(&config.venue.api_url, auth)?);

    let profile_id = rest.profile_id().await.map_err(WatchdogError::Identity)?;
    info!("[STARTUP] Profile {}", profile_id);

    let (events_tx, events_rx) = mpsc::channel(config.feed.queue_capacity.max(1));
    let mut watchdog = Watchdog::new(&config, rest.clone(), events_rx);

    let feed = CentrifugeFeed::new(
        config.venue.ws_url.clone(),
        creds.jwt,
        channels_for(&config.venue.market_id, profile_id),
    );
    let feed_task = feed
        .start(events_tx, watchdog.shutdown_signal())
        .await
        .map_err(WatchdogError::FeedConnect)?;

    let report = watchdog.bootstrap().await?;
    info!("[STARTUP] Seeded {} open orders ({} skipped)", report.seeded, report.skipped);
    watchdog.start()?;

    tokio::signal::ctrl_c().await?;
    info!("[SHUTDOWN] Ctrl-C received");

    watchdog.shutdown().await?;
    let top = watchdog.market_state().snapshot().await;
    info!("[SHUTDOWN] Last top of book: bid={} ask={}", top.best_bid, top.best_ask);
    if let Err(e) = feed_task.await {
        error!("[SHUTDOWN] Feed task failed: {}", e);
    }
    let feed_state = *feed.state().read().await;
    info!("[SHUTDOWN] Done, feed {:?}, {} envelopes dropped", feed_state, feed.dropped());
    feed.reconnect_stats().read().await.log();
    Ok(())
}
