//! Local Order Book
//!
//! Tracks the last known status of every order the watchdog cares about.
//! This is not a price-level book: it maps order id -> status.
//!
//! The map never leaves this type. Callers read snapshots or apply a single
//! mutation under the lock, so no caller can hold it across a venue call.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::exchange::OrderStatus;

pub struct OrderBook {
    orders: RwLock<HashMap<String, OrderStatus>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite one order's status
    pub async fn upsert(&self, order_id: &str, status: OrderStatus) {
        let previous = self.orders.write().await.insert(order_id.to_string(), status);
        debug!(order_id, ?previous, %status, "[ORDERS] upsert");
    }

    /// Upsert a batch under one write lock. Returns how many entries were written.
    pub async fn upsert_many<I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = (String, OrderStatus)>,
    {
        let mut orders = self.orders.write().await;
        let mut written = 0;
        for (order_id, status) in updates {
            orders.insert(order_id, status);
            written += 1;
        }
        written
    }

    pub async fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.read().await.get(order_id).copied()
    }

    /// Ids whose status is `open` or `canceling`, sorted
    pub async fn cancel_candidates(&self) -> Vec<String> {
        let orders = self.orders.read().await;
        let mut ids: Vec<String> = orders
            .iter()
            .filter(|(_, status)| status.is_cancelable())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Remove every entry whose status is in `statuses`. Returns the number removed.
    pub async fn evict(&self, statuses: &[OrderStatus]) -> usize {
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|_, status| !statuses.contains(status));
        before - orders.len()
    }

    /// Copy of the whole map
    pub async fn snapshot(&self) -> HashMap<String, OrderStatus> {
        self.orders.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn stats(&self) -> OrderStats {
        let orders = self.orders.read().await;
        let mut stats = OrderStats::default();
        for status in orders.values() {
            match status {
                OrderStatus::Open => stats.open += 1,
                OrderStatus::Canceling | OrderStatus::CancelingAll => stats.canceling += 1,
                OrderStatus::Canceled => stats.canceled += 1,
                OrderStatus::Closed => stats.closed += 1,
                OrderStatus::Rejected => stats.rejected += 1,
                _ => stats.pending += 1,
            }
        }
        stats.total = orders.len();
        stats
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OrderStats {
    pub total: usize,
    pub open: usize,
    pub canceling: usize,
    pub canceled: usize,
    pub closed: usize,
    pub rejected: usize,
    pub pending: usize,
}

impl OrderStats {
    pub fn log(&self) {
        info!("[ORDER STATS] total: {} | open: {} | canceling: {} | canceled: {} | closed: {} | rejected: {} | other: {}",
            self.total, self.open, self.canceling, self.canceled,
            self.closed, self.rejected, self.pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn book_with(entries: &[(&str, OrderStatus)]) -> OrderBook {
        let book = OrderBook::new();
        book.upsert_many(entries.iter().map(|(id, s)| (id.to_string(), *s))).await;
        book
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let book = OrderBook::new();
        book.upsert("a", OrderStatus::Open).await;
        book.upsert("a", OrderStatus::Canceling).await;
        assert_eq!(book.status("a").await, Some(OrderStatus::Canceling));
        assert_eq!(book.len().await, 1);
        assert_eq!(book.status("missing").await, None);
    }

    #[tokio::test]
    async fn test_cancel_candidates() {
        let book = book_with(&[
            ("a", OrderStatus::Open),
            ("b", OrderStatus::Canceling),
            ("c", OrderStatus::Closed),
            ("d", OrderStatus::Rejected),
        ])
        .await;

        let ids: HashSet<String> = book.cancel_candidates().await.into_iter().collect();
        let expected: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_evict_only_listed_statuses() {
        let book = book_with(&[
            ("a", OrderStatus::Canceled),
            ("b", OrderStatus::Open),
            ("c", OrderStatus::Canceled),
            ("d", OrderStatus::Closed),
        ])
        .await;

        assert_eq!(book.evict(&[OrderStatus::Canceled]).await, 2);
        let snapshot = book.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("b"), Some(&OrderStatus::Open));
        assert_eq!(snapshot.get("d"), Some(&OrderStatus::Closed));
    }

    #[tokio::test]
    async fn test_stats() {
        let book = book_with(&[
            ("a", OrderStatus::Open),
            ("b", OrderStatus::Open),
            ("c", OrderStatus::Canceled),
            ("d", OrderStatus::Processing),
        ])
        .await;

        let stats = book.stats().await;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.canceled, 1);
        assert_eq!(stats.pending, 1);
    }
}
