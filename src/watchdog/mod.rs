//! Order Watchdog
//!
//! Keeps a local view of one market's orders, places a speculative bid on a
//! timer and cancels whatever is left open. Five tasks share two locked
//! structures:
//! - dispatcher: feed envelopes -> market state / order book
//! - quoting loop: market state -> new orders
//! - cancellation scanner + worker: order book -> cancels
//! - cleanup loop: evicts finished orders
//!
//! Lifecycle: `Created -> Bootstrapped -> Running -> Stopped`.

pub mod bootstrap;
pub mod cancellation;
pub mod cleanup;
pub mod dispatcher;
pub mod market_state;
pub mod order_book;
pub mod quoting;
pub mod supervisor;
pub mod tick;

#[cfg(test)]
pub mod testing;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::exchange::{EventEnvelope, OrderDirectory};

use bootstrap::{seed_open_orders, BootstrapReport};
use cancellation::{cancel_queue, CancelReceiver, CancelScanner, CancelWorker};
use cleanup::Cleaner;
use dispatcher::Dispatcher;
use market_state::MarketState;
use order_book::OrderBook;
use quoting::Quoter;
use supervisor::supervise;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Bootstrapped,
    Running,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Created => "created",
            RunState::Bootstrapped => "bootstrapped",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("identity lookup failed: {0:#}")]
    Identity(anyhow::Error),
    #[error("feed connect failed: {0:#}")]
    FeedConnect(anyhow::Error),
    #[error("bootstrap listing failed: {0:#}")]
    Bootstrap(anyhow::Error),
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: RunState },
}

pub struct Watchdog {
    state: RunState,
    market_id: String,
    config: Config,
    directory: Arc<dyn OrderDirectory>,
    order_book: Arc<OrderBook>,
    market: Arc<MarketState>,
    events: Arc<Mutex<mpsc::Receiver<EventEnvelope>>>,
    cancel_tx: mpsc::Sender<String>,
    cancel_rx: CancelReceiver,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new(
        config: &Config,
        directory: Arc<dyn OrderDirectory>,
        events: mpsc::Receiver<EventEnvelope>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = cancel_queue(config.cancellation.queue_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: RunState::Created,
            market_id: config.venue.market_id.clone(),
            config: config.clone(),
            directory,
            order_book: Arc::new(OrderBook::new()),
            market: Arc::new(MarketState::new()),
            events: Arc::new(Mutex::new(events)),
            cancel_tx,
            cancel_rx,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn order_book(&self) -> Arc<OrderBook> {
        self.order_book.clone()
    }

    pub fn market_state(&self) -> Arc<MarketState> {
        self.market.clone()
    }

    /// Receiver that flips to true once shutdown begins. Also used for the feed.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    fn expect_state(&self, op: &'static str, expected: RunState) -> Result<(), WatchdogError> {
        if self.state != expected {
            return Err(WatchdogError::InvalidState { op, state: self.state });
        }
        Ok(())
    }

    /// Seed the order book with the market's open orders
    pub async fn bootstrap(&mut self) -> Result<BootstrapReport, WatchdogError> {
        self.expect_state("bootstrap", RunState::Created)?;
        let report = seed_open_orders(self.directory.as_ref(), &self.market_id, &self.order_book)
            .await
            .map_err(WatchdogError::Bootstrap)?;
        self.state = RunState::Bootstrapped;
        Ok(report)
    }

    /// Spawn the dispatcher, quoting, cancellation and cleanup tasks
    pub fn start(&mut self) -> Result<(), WatchdogError> {
        self.expect_state("start", RunState::Bootstrapped)?;

        let dispatcher = Arc::new(
            Dispatcher::new(self.order_book.clone(), self.market.clone())
                .with_display(&self.config.feed.display),
        );
        let quoter = Arc::new(Quoter::new(
            self.directory.clone(),
            self.market.clone(),
            self.order_book.clone(),
            self.market_id.clone(),
            self.config.quoting.clone(),
        ));
        let scanner = Arc::new(CancelScanner::new(
            self.order_book.clone(),
            self.cancel_tx.clone(),
            self.config.cancellation.scan_interval(),
        ));
        let worker = Arc::new(CancelWorker::new(
            self.directory.clone(),
            self.order_book.clone(),
            self.market_id.clone(),
        ));
        let cleaner = Arc::new(Cleaner::new(
            self.order_book.clone(),
            self.config.cleanup.evict_statuses.clone(),
            self.config.cleanup.interval(),
        ));

        let events = self.events.clone();
        self.spawn_supervised("dispatcher", move |shutdown| {
            let dispatcher = dispatcher.clone();
            let events = events.clone();
            async move { dispatcher.run(events, shutdown).await }
        });
        self.spawn_supervised("quoting", move |shutdown| {
            let quoter = quoter.clone();
            async move { quoter.run(shutdown).await }
        });
        self.spawn_supervised("cancel-scanner", move |shutdown| {
            let scanner = scanner.clone();
            async move { scanner.run(shutdown).await }
        });
        let cancel_rx = self.cancel_rx.clone();
        self.spawn_supervised("cancel-worker", move |shutdown| {
            let worker = worker.clone();
            let cancel_rx = cancel_rx.clone();
            async move { worker.run(cancel_rx, shutdown).await }
        });
        self.spawn_supervised("cleanup", move |shutdown| {
            let cleaner = cleaner.clone();
            async move { cleaner.run(shutdown).await }
        });

        self.state = RunState::Running;
        info!("[WATCHDOG] Running on {} ({} tasks)", self.market_id, self.tasks.len());
        Ok(())
    }

    fn spawn_supervised<F, Fut>(&mut self, name: &'static str, body: F)
    where
        F: Fn(watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let for_task = self.shutdown_tx.subscribe();
        let for_supervisor = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(supervise(name, for_supervisor, move || {
            body(for_task.clone())
        })));
    }

    /// Signal every task and wait for all of them to finish
    pub async fn shutdown(&mut self) -> Result<(), WatchdogError> {
        self.expect_state("shutdown", RunState::Running)?;
        info!("[WATCHDOG] Shutting down");
        self.shutdown_tx.send_replace(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("[WATCHDOG] Task ended abnormally: {}", e);
            }
        }
        self.order_book.stats().await.log();
        self.state = RunState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderStatus;
    use std::time::Duration;
    use super::testing::MockDirectory;

    /// Quoting and scanning pushed far out so only the dispatcher and cleanup act
    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.quoting.interval_secs = 3_600;
        config.cancellation.scan_interval_secs = 3_600;
        config
    }

    #[tokio::test]
    async fn test_wrong_state_is_rejected() {
        let (_tx, rx) = mpsc::channel(8);
        let mut wd = Watchdog::new(&quiet_config(), Arc::new(MockDirectory::default()), rx);

        assert!(matches!(
            wd.start(),
            Err(WatchdogError::InvalidState { op: "start", state: RunState::Created })
        ));
        assert!(wd.shutdown().await.is_err());

        wd.bootstrap().await.unwrap();
        assert!(matches!(wd.bootstrap().await, Err(WatchdogError::InvalidState { .. })));
        assert_eq!(wd.state(), RunState::Bootstrapped);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_fatal() {
        let mock = MockDirectory::default();
        mock.fail_list.store(true, std::sync::atomic::Ordering::SeqCst);
        let (_tx, rx) = mpsc::channel(8);
        let mut wd = Watchdog::new(&quiet_config(), Arc::new(mock), rx);

        assert!(matches!(wd.bootstrap().await, Err(WatchdogError::Bootstrap(_))));
        assert_eq!(wd.state(), RunState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_account_event_then_cleanup() {
        let mock = Arc::new(MockDirectory::with_listing(&[("1", OrderStatus::Open)]));
        let (tx, rx) = mpsc::channel(8);
        let mut wd = Watchdog::new(&quiet_config(), mock, rx);
        let book = wd.order_book();

        wd.bootstrap().await.unwrap();
        assert_eq!(book.status("1").await, Some(OrderStatus::Open));

        wd.start().unwrap();
        assert_eq!(wd.state(), RunState::Running);

        tx.send(EventEnvelope::new(
            "account@7",
            r#"{"id":7,"orders":[{"id":"1","status":"canceled"},{"id":"2","status":"open"}]}"#,
        ))
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = book.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("1"), Some(&OrderStatus::Canceled));
        assert_eq!(snapshot.get("2"), Some(&OrderStatus::Open));

        tokio::time::sleep(Duration::from_secs(300)).await;
        let snapshot = book.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("2"), Some(&OrderStatus::Open));

        wd.shutdown().await.unwrap();
        assert_eq!(wd.state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_loops_quote_and_cancel() {
        let mut config = Config::default();
        config.cleanup.interval_secs = 3_600;
        let mock = Arc::new(MockDirectory::default());
        let (tx, rx) = mpsc::channel(8);
        let mut wd = Watchdog::new(&config, mock.clone(), rx);
        let book = wd.order_book();

        wd.bootstrap().await.unwrap();
        wd.start().unwrap();

        tx.send(EventEnvelope::new("market:ETH-USD", r#"{"best_bid":"2000","best_ask":"2001"}"#))
            .await
            .unwrap();

        // quote at 3s, the account stream reports the new order open
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let created = mock.created();
        assert_eq!(created.len(), 1);
        let id = book.snapshot().await.into_keys().next().unwrap();
        tx.send(EventEnvelope::new(
            "account@7",
            format!(r#"{{"orders":[{{"id":"{}","status":"open"}}]}}"#, id),
        ))
        .await
        .unwrap();

        // scan at 5s picks it up, worker cancels it
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(mock.canceled_ids().contains(&id));
        assert_eq!(book.status(&id).await, Some(OrderStatus::Canceling));

        wd.shutdown().await.unwrap();
    }
}
