//! Venue REST API Client

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::debug;

use super::auth::{VenueAuth, API_KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use super::traits::{Identity, OrderDirectory};
use super::types::*;

pub const PATH_ORDERS: &str = "/orders";
pub const PATH_ACCOUNT: &str = "/account";

/// Venue-level failures on top of transport errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("empty result")]
    EmptyResult,
}

/// Decode the `{success, error, result}` envelope
pub fn parse_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Vec<T>> {
    if !status.is_success() {
        return Err(ApiError::Http {
            status,
            body: body.to_string(),
        }
        .into());
    }
    let parsed: ApiResponse<T> = serde_json::from_str(body)?;
    if !parsed.success {
        return Err(ApiError::Rejected(parsed.error).into());
    }
    Ok(parsed.result)
}

/// Like `parse_response` but for endpoints answering with exactly one item
pub fn parse_single<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    parse_response::<T>(status, body)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::EmptyResult.into())
}

// ==================== REST CLIENT ====================

pub struct VenueRestClient {
    client: Client,
    base_url: String,
    auth: VenueAuth,
}

impl VenueRestClient {
    pub fn new(base_url: &str, auth: VenueAuth) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn build_headers(&self, method: &Method, path: &str, body: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(self.auth.api_key())?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if *method != Method::GET {
            let (signature, timestamp) = self.auth.sign(method.as_str(), path, body)?;
            headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature)?);
            headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&timestamp)?);
        }
        Ok(headers)
    }

    /// Send a request and return (status, body text)
    async fn send(&self, method: Method, path: &str, query: &str, body: String) -> Result<(StatusCode, String)> {
        let start = Instant::now();
        let headers = self.build_headers(&method, path, &body)?;
        let url = format!("{}{}{}", self.base_url, path, query);

        debug!("[REST] {} {} | {}", method, url, body);

        let mut req = self.client.request(method.clone(), &url).headers(headers);
        if !body.is_empty() {
            req = req.body(body);
        }
        let resp = req.send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        debug!("[REST] {} {} -> {} in {:?} | {}", method, path, status, start.elapsed(), text);
        Ok((status, text))
    }

    /// Get the profile behind the API key
    pub async fn get_profile(&self) -> Result<ProfileData> {
        let (status, body) = self.send(Method::GET, PATH_ACCOUNT, "", String::new()).await?;
        parse_single(status, &body)
    }
}

#[async_trait]
impl OrderDirectory for VenueRestClient {
    async fn list_orders(&self, market_id: &str) -> Result<Vec<OrderData>> {
        let query = format!("?market_id={}", urlencoding::encode(market_id));
        let (status, body) = self.send(Method::GET, PATH_ORDERS, &query, String::new()).await?;
        parse_response(status, &body)
    }

    async fn create_order(&self, req: &OrderCreateRequest) -> Result<OrderResult> {
        let body = serde_json::to_string(req)?;
        let (status, body) = self.send(Method::POST, PATH_ORDERS, "", body).await?;
        parse_single(status, &body)
    }

    async fn cancel_order(&self, req: &OrderCancelRequest) -> Result<OrderResult> {
        let body = serde_json::to_string(req)?;
        let (status, body) = self.send(Method::DELETE, PATH_ORDERS, "", body).await?;
        parse_single(status, &body)
    }
}

#[async_trait]
impl Identity for VenueRestClient {
    async fn profile_id(&self) -> Result<u64> {
        Ok(self.get_profile().await?.id)
    }
}
