//! In-memory order directory for loop tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::exchange::{
    OrderCancelRequest, OrderCreateRequest, OrderData, OrderDirectory, OrderResult, OrderStatus,
};

#[derive(Default)]
pub struct MockDirectory {
    pub listing: Mutex<Vec<OrderData>>,
    pub created: Mutex<Vec<OrderCreateRequest>>,
    pub canceled: Mutex<Vec<OrderCancelRequest>>,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_cancel: AtomicBool,
    next_id: AtomicU64,
}

impl MockDirectory {
    pub fn with_listing(orders: &[(&str, OrderStatus)]) -> Self {
        let mock = Self::default();
        *mock.listing.lock().unwrap() = orders
            .iter()
            .map(|(id, status)| OrderData {
                id: id.to_string(),
                market_id: "ETH-USD".to_string(),
                status: *status,
                ..Default::default()
            })
            .collect();
        mock
    }

    pub fn created(&self) -> Vec<OrderCreateRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn canceled_ids(&self) -> Vec<String> {
        self.canceled.lock().unwrap().iter().map(|r| r.order_id.clone()).collect()
    }
}

#[async_trait]
impl OrderDirectory for MockDirectory {
    async fn list_orders(&self, _market_id: &str) -> Result<Vec<OrderData>> {
        if self.fail_list.load(Ordering::SeqCst) {
            bail!("listing unavailable");
        }
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn create_order(&self, req: &OrderCreateRequest) -> Result<OrderResult> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("insufficient margin");
        }
        self.created.lock().unwrap().push(req.clone());
        let id = 1000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(OrderResult {
            id: id.to_string(),
            market_id: req.market_id.clone(),
            status: OrderStatus::Processing,
        })
    }

    async fn cancel_order(&self, req: &OrderCancelRequest) -> Result<OrderResult> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            bail!("order not found");
        }
        self.canceled.lock().unwrap().push(req.clone());
        Ok(OrderResult {
            id: req.order_id.clone(),
            market_id: req.market_id.clone(),
            status: OrderStatus::Canceling,
        })
    }
}
