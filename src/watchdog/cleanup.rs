//! Periodic eviction of finished orders from the book

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::exchange::OrderStatus;

use super::order_book::OrderBook;

pub struct Cleaner {
    order_book: Arc<OrderBook>,
    evict: Vec<OrderStatus>,
    period: Duration,
}

impl Cleaner {
    pub fn new(order_book: Arc<OrderBook>, evict: Vec<OrderStatus>, period: Duration) -> Self {
        Self {
            order_book,
            evict,
            period,
        }
    }

    /// Remove every entry in an evictable status. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let removed = self.order_book.evict(&self.evict).await;
        if removed > 0 {
            info!("[CLEANUP] Evicted {} orders", removed);
        }
        self.order_book.stats().await.log();
        removed
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval_at(Instant::now() + self.period, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[CLEANUP] Started, every {:?}, evicting {:?}", self.period, self.evict);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    self.sweep().await;
                }
            }
        }
        info!("[CLEANUP] Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn book() -> Arc<OrderBook> {
        let book = Arc::new(OrderBook::new());
        book.upsert_many(
            [
                ("a", OrderStatus::Canceled),
                ("b", OrderStatus::Open),
                ("c", OrderStatus::Closed),
                ("d", OrderStatus::Rejected),
                ("e", OrderStatus::Canceling),
            ]
            .into_iter()
            .map(|(id, s)| (id.to_string(), s)),
        )
        .await;
        book
    }

    #[tokio::test]
    async fn test_default_evicts_only_canceled() {
        let book = book().await;
        let cleaner = Cleaner::new(book.clone(), vec![OrderStatus::Canceled], Duration::from_secs(300));

        assert_eq!(cleaner.sweep().await, 1);
        assert_eq!(book.status("a").await, None);
        assert_eq!(book.len().await, 4);
        assert_eq!(cleaner.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_only_open_survives() {
        let book = Arc::new(OrderBook::new());
        book.upsert("a", OrderStatus::Canceled).await;
        book.upsert("b", OrderStatus::Open).await;
        book.upsert("c", OrderStatus::Canceled).await;
        let cleaner = Cleaner::new(book.clone(), vec![OrderStatus::Canceled], Duration::from_secs(300));

        assert_eq!(cleaner.sweep().await, 2);
        let snapshot = book.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("b"), Some(&OrderStatus::Open));
    }

    #[tokio::test]
    async fn test_configured_terminal_statuses() {
        let book = book().await;
        let cleaner = Cleaner::new(
            book.clone(),
            vec![OrderStatus::Canceled, OrderStatus::Closed, OrderStatus::Rejected],
            Duration::from_secs(300),
        );

        assert_eq!(cleaner.sweep().await, 3);
        let mut left: Vec<String> = book.snapshot().await.into_keys().collect();
        left.sort();
        assert_eq!(left, vec!["b", "e"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sweep_waits_one_period() {
        let book = book().await;
        let cleaner = Arc::new(Cleaner::new(book.clone(), vec![OrderStatus::Canceled], Duration::from_secs(300)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = {
            let cleaner = cleaner.clone();
            tokio::spawn(async move { cleaner.run(stop_rx).await })
        };

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(book.len().await, 5);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(book.len().await, 4);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
