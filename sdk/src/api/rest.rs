//! HTTP client for a Satox node's REST API.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::auth::Auth;
use super::error::{ApiError, ApiResult};
use super::retry::RetryPolicy;
use crate::asset::Asset;
use crate::blockchain::{BlockInfo, TransactionInfo};
use crate::nft::Nft;
use crate::transaction::Transaction;
use crate::wallet::Wallet;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `page` / `per_page` query parameters for list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            query.push(("per_page", per_page.to_string()));
        }
        query
    }
}

#[derive(Clone, Debug)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
    retry: RetryPolicy,
}

impl RestClient {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: Auth::None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Generic verbs
    // -----------------------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send::<T, ()>(Method::GET, path, &[], None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send::<T, ()>(Method::DELETE, path, &[], None).await
    }

    async fn list<T: DeserializeOwned>(&self, path: &str, page: Pagination) -> ApiResult<Vec<T>> {
        self.send::<_, ()>(Method::GET, path, &page.query(), None).await
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    pub async fn list_assets(&self, page: Pagination) -> ApiResult<Vec<Asset>> {
        self.list("/assets", page).await
    }

    pub async fn get_asset(&self, id: &str) -> ApiResult<Asset> {
        self.get(&format!("/assets/{id}")).await
    }

    pub async fn list_nfts(&self, page: Pagination) -> ApiResult<Vec<Nft>> {
        self.list("/nfts", page).await
    }

    pub async fn get_nft(&self, id: &str) -> ApiResult<Nft> {
        self.get(&format!("/nfts/{id}")).await
    }

    pub async fn list_transactions(&self, page: Pagination) -> ApiResult<Vec<Transaction>> {
        self.list("/transactions", page).await
    }

    pub async fn get_transaction(&self, txid: &str) -> ApiResult<TransactionInfo> {
        self.get(&format!("/transactions/{txid}")).await
    }

    /// Returns the node's acknowledgement body.
    pub async fn submit_transaction(&self, transaction: &Transaction) -> ApiResult<Value> {
        self.post("/transactions", transaction).await
    }

    pub async fn list_blocks(&self, page: Pagination) -> ApiResult<Vec<BlockInfo>> {
        self.list("/blocks", page).await
    }

    /// `id` is a height or a block hash.
    pub async fn get_block(&self, id: &str) -> ApiResult<BlockInfo> {
        self.get(&format!("/blocks/{id}")).await
    }

    pub async fn list_wallets(&self, page: Pagination) -> ApiResult<Vec<Wallet>> {
        self.list("/wallets", page).await
    }

    pub async fn get_wallet(&self, id: &str) -> ApiResult<Wallet> {
        self.get(&format!("/wallets/{id}")).await
    }

    pub async fn network_status(&self) -> ApiResult<Value> {
        self.get("/network/status").await
    }

    pub async fn node_info(&self) -> ApiResult<Value> {
        self.get("/network/node").await
    }

    pub async fn peers(&self) -> ApiResult<Value> {
        self.get("/network/peers").await
    }

    pub async fn sync_status(&self) -> ApiResult<Value> {
        self.get("/network/sync").await
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn build<B: Serialize>(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> RequestBuilder {
        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        self.auth.apply(request)
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> ApiResult<T> {
        debug!(%method, path, "api request");
        self.retry
            .run(|| {
                let request = self.build(&method, path, query, body);
                async move { handle_response(request.send().await?).await }
            })
            .await
    }
}

/// Decode a success body, or turn the status and any `error` / `message`
/// field into [`ApiError::Status`]. Empty bodies decode as JSON `null`.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let message = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/v1/")
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn base_url_is_trimmed_and_pagination_sent() {
        let router = Router::new().route(
            "/api/v1/assets",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("page").map(String::as_str), Some("2"));
                assert_eq!(q.get("per_page").map(String::as_str), Some("10"));
                Json(json!([]))
            }),
        );
        let client = RestClient::new(&serve(router).await).unwrap();
        assert!(client.base_url().ends_with("/api/v1"));
        let assets = client.list_assets(Pagination::new(2, 10)).await.unwrap();
        assert!(assets.is_empty());
    }

    #[tokio::test]
    async fn auth_headers_reach_server() {
        let router = Router::new().route(
            "/api/v1/network/status",
            get(|headers: HeaderMap| async move {
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "key": key }))
            }),
        );
        let client = RestClient::new(&serve(router).await)
            .unwrap()
            .with_auth(Auth::ApiKey("abc".into()));
        let status = client.network_status().await.unwrap();
        assert_eq!(status["key"], "abc");
    }

    #[tokio::test]
    async fn not_found_maps_to_status_without_retry() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/v1/assets/:id",
            get(move |Path(id): Path<String>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({ "error": format!("asset {id} not found") })),
                    )
                }
            }),
        );
        let client = RestClient::new(&serve(router).await)
            .unwrap()
            .with_retry_policy(fast_retry());
        match client.get_asset("nope").await {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "asset nope not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/v1/network/sync",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
                    } else {
                        (StatusCode::OK, Json(json!({ "synced": true })))
                    }
                }
            }),
        );
        let client = RestClient::new(&serve(router).await)
            .unwrap()
            .with_retry_policy(fast_retry());
        let sync = client.sync_status().await.unwrap();
        assert_eq!(sync["synced"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
