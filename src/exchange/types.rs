//! Venue wire types
//!
//! Orders, market snapshots, profile updates and the routed push envelope.
//! Only the fields the watchdog reads are modelled; everything else the venue
//! sends is ignored by serde.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ======================= LENIENT DECODING =======================

/// Decode a field the watchdog only logs. `null`, an empty string or any other
/// shape the target type rejects becomes the default instead of failing the
/// whole payload.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Order list where an undecodable entry is skipped rather than poisoning the rest
fn lenient_orders<'de, D>(deserializer: D) -> Result<Vec<OrderData>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| OrderData::deserialize(v).ok())
        .collect())
}

// ======================= ORDER STATUS =======================

/// Order status as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Placed,
    Open,
    Closed,
    Rejected,
    Canceled,
    Canceling,
    Amending,
    CancelingAll,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unknown => "unknown",
            OrderStatus::Processing => "processing",
            OrderStatus::Placed => "placed",
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Canceling => "canceling",
            OrderStatus::Amending => "amending",
            OrderStatus::CancelingAll => "cancelingall",
        }
    }

    /// Candidate for the cancellation scanner
    pub fn is_cancelable(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Canceling)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ======================= SIDE / TYPE =======================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

// ======================= ORDERS =======================

/// Order as returned by the order listing and carried in account updates.
/// Only `id` is required; every other field tolerates `null` and odd shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderData {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub market_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub status: OrderStatus,
    #[serde(default, deserialize_with = "lenient")]
    pub side: Option<Side>,
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient")]
    pub size: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient")]
    pub client_order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: i64,
}

/// Order to place
#[derive(Debug, Clone, Serialize)]
pub struct OrderCreateRequest {
    pub market_id: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub size: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl OrderCreateRequest {
    /// Create a new limit order
    pub fn limit(market_id: String, side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            market_id,
            order_type: OrderType::Limit,
            side,
            price: Some(price),
            size: Some(size),
            client_order_id: None,
        }
    }

    pub fn with_client_order_id(mut self, client_order_id: String) -> Self {
        self.client_order_id = Some(client_order_id);
        self
    }
}

/// Order to cancel
#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelRequest {
    pub order_id: String,
    pub market_id: String,
}

/// Result of a create or cancel call: the order id and the venue's status for it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderResult {
    pub id: String,
    #[serde(default)]
    pub market_id: String,
    #[serde(default)]
    pub status: OrderStatus,
}

// ======================= RESPONSE ENVELOPE =======================

/// REST response envelope: every endpoint answers with a result list
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default = "Vec::new")]
    pub result: Vec<T>,
}

// ======================= STREAM PAYLOADS =======================

/// `market:<id>` payload. Fields absent from an update are `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub market_price: Option<Decimal>,
    #[serde(default)]
    pub index_price: Option<Decimal>,
    #[serde(default)]
    pub last_trade_price: Option<Decimal>,
    #[serde(default)]
    pub fair_price: Option<Decimal>,
}

/// `account@<profile>` payload and `GET /account` result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileData {
    #[serde(default, deserialize_with = "lenient")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub balance: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_orders")]
    pub orders: Vec<OrderData>,
}

/// `orderbook:<id>` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderbookData {
    #[serde(default)]
    pub market_id: String,
    #[serde(default)]
    pub bids: Vec<Vec<Decimal>>,
    #[serde(default)]
    pub asks: Vec<Vec<Decimal>>,
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub timestamp: i64,
}

/// `trade:<id>` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub market_id: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub taker_side: Option<String>,
    #[serde(default)]
    pub liquidation: bool,
    #[serde(default)]
    pub timestamp: u64,
}

// ======================= ENVELOPE =======================

/// One inbound publication: the channel it arrived on and its raw JSON payload
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl EventEnvelope {
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_decoding() {
        let order: OrderData =
            serde_json::from_str(r#"{"id":"7","status":"cancelingall"}"#).unwrap();
        assert_eq!(order.status, OrderStatus::CancelingAll);

        let order: OrderData =
            serde_json::from_str(r#"{"id":"8","status":"liquidating"}"#).unwrap();
        assert_eq!(order.status, OrderStatus::Unknown);
    }

    #[test]
    fn test_market_data_accepts_strings_and_numbers() {
        let md: MarketData =
            serde_json::from_str(r#"{"id":"ETH-USD","best_bid":"1850.5","best_ask":1851}"#)
                .unwrap();
        assert_eq!(md.best_bid, Some(dec!(1850.5)));
        assert_eq!(md.best_ask, Some(dec!(1851)));

        let md: MarketData = serde_json::from_str(r#"{"id":"ETH-USD"}"#).unwrap();
        assert!(md.best_bid.is_none());
    }

    #[test]
    fn test_create_request_body() {
        let req = OrderCreateRequest::limit("ETH-USD".into(), Side::Long, dec!(1739.5), dec!(0.001));
        let v: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], "limit");
        assert_eq!(v["side"], "long");
        assert_eq!(v["price"].as_f64(), Some(1739.5));
        assert!(v.get("client_order_id").is_none());
    }

    #[test]
    fn test_cancelable_statuses() {
        assert!(OrderStatus::Open.is_cancelable());
        assert!(OrderStatus::Canceling.is_cancelable());
        assert!(!OrderStatus::Canceled.is_cancelable());
        assert!(!OrderStatus::Placed.is_cancelable());
    }

    #[test]
    fn test_order_tolerates_empty_and_null_fields() {
        let order: OrderData = serde_json::from_str(
            r#"{"id":"1","status":"canceled","side":"","market_id":null,"timestamp":null,"price":"","size":null,"extra":{"x":1}}"#,
        )
        .unwrap();
        assert_eq!(order.id, "1");
        assert_eq!(order.status, OrderStatus::Canceled);
        assert!(order.side.is_none());
        assert!(order.price.is_none());
        assert_eq!(order.timestamp, 0);
        assert_eq!(order.market_id, "");
    }

    #[test]
    fn test_profile_skips_orders_without_id() {
        let profile: ProfileData = serde_json::from_str(
            r#"{"id":7,"balance":null,"orders":[{"status":"open"},{"id":"2","status":"open"}]}"#,
        )
        .unwrap();
        assert_eq!(profile.orders.len(), 1);
        assert_eq!(profile.orders[0].id, "2");

        let profile: ProfileData = serde_json::from_str(r#"{"id":7,"orders":null}"#).unwrap();
        assert!(profile.orders.is_empty());
    }
}
