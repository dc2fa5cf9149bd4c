//! Collaborator interfaces consumed by the watchdog
//!
//! The watchdog only talks to the venue through these traits, so the loops can
//! run against the REST client in production and against mocks in tests.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{OrderCancelRequest, OrderCreateRequest, OrderData, OrderResult};

/// REST-like order directory for one venue
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    /// All orders the venue knows for a market
    async fn list_orders(&self, market_id: &str) -> Result<Vec<OrderData>>;

    /// Place an order
    async fn create_order(&self, req: &OrderCreateRequest) -> Result<OrderResult>;

    /// Cancel an order by ID
    async fn cancel_order(&self, req: &OrderCancelRequest) -> Result<OrderResult>;
}

/// Resolves the trading account behind the credentials
#[async_trait]
pub trait Identity: Send + Sync {
    /// Numeric profile id, needed for the `account@<id>` channel
    async fn profile_id(&self) -> Result<u64>;
}
