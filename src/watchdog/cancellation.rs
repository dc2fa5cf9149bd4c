//! Cancellation scanner and worker
//!
//! The scanner periodically copies the ids of every `open` or `canceling` order
//! out of the book and pushes them into a bounded queue. A single worker drains
//! the queue and issues one cancel per id.
//!
//! The scanner never waits on the queue. When it is full the id is dropped;
//! the order is still in the book, so the next scan offers it again.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::exchange::{OrderCancelRequest, OrderDirectory, OrderStatus};

use super::order_book::OrderBook;

pub type CancelSender = mpsc::Sender<String>;
pub type CancelReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Bounded id queue shared by the scanner and the worker
pub fn cancel_queue(capacity: usize) -> (CancelSender, CancelReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Arc::new(Mutex::new(rx)))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanReport {
    pub enqueued: usize,
    pub dropped: usize,
}

pub struct CancelScanner {
    order_book: Arc<OrderBook>,
    tx: CancelSender,
    period: std::time::Duration,
}

impl CancelScanner {
    pub fn new(order_book: Arc<OrderBook>, tx: CancelSender, period: std::time::Duration) -> Self {
        Self { order_book, tx, period }
    }

    pub async fn scan_once(&self) -> ScanReport {
        // Snapshot under the read lock; the lock is released before enqueueing
        let candidates = self.order_book.cancel_candidates().await;
        let mut report = ScanReport::default();

        for id in candidates {
            match self.tx.try_send(id) {
                Ok(()) => report.enqueued += 1,
                Err(mpsc::error::TrySendError::Full(id)) => {
                    report.dropped += 1;
                    debug!(order_id = %id, "[CANCEL] Queue full, deferring to next scan");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("[CANCEL] Worker queue closed");
                    break;
                }
            }
        }

        if report.dropped > 0 {
            warn!("[CANCEL] Queue full: {} queued, {} deferred", report.enqueued, report.dropped);
        } else if report.enqueued > 0 {
            debug!("[CANCEL] {} ids queued", report.enqueued);
        }
        report
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval_at(Instant::now() + self.period, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[CANCEL] Scanner started, every {:?}", self.period);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    self.scan_once().await;
                }
            }
        }
        info!("[CANCEL] Scanner stopped");
    }
}

pub struct CancelWorker {
    directory: Arc<dyn OrderDirectory>,
    order_book: Arc<OrderBook>,
    market_id: String,
}

impl CancelWorker {
    pub fn new(directory: Arc<dyn OrderDirectory>, order_book: Arc<OrderBook>, market_id: String) -> Self {
        Self {
            directory,
            order_book,
            market_id,
        }
    }

    /// Cancel one order and record the venue's answer. Failures are logged and
    /// not retried; the scanner will offer the id again if it is still live.
    pub async fn cancel_one(&self, order_id: String) -> Option<OrderStatus> {
        let req = OrderCancelRequest {
            order_id,
            market_id: self.market_id.clone(),
        };
        match self.directory.cancel_order(&req).await {
            Ok(result) => {
                info!(order_id = %result.id, status = %result.status, "[CANCEL] Cancel accepted");
                self.order_book.upsert(&result.id, result.status).await;
                Some(result.status)
            }
            Err(e) => {
                warn!(order_id = %req.order_id, "[CANCEL] Cancel failed: {:#}", e);
                None
            }
        }
    }

    pub async fn run(&self, rx: CancelReceiver, mut shutdown: watch::Receiver<bool>) {
        let mut rx = rx.lock().await;
        info!("[CANCEL] Worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                id = rx.recv() => {
                    match id {
                        Some(id) => {
                            self.cancel_one(id).await;
                        }
                        None => break,
                    }
                }
            }
        }
        info!("[CANCEL] Worker stopped");
    }
}
