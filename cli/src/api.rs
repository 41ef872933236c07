//! # Local HTTP + WebSocket API
//!
//! The axum router a `satox run` node serves on its RPC port. Handlers read
//! straight from the managers inside the shared [`SatoxSdk`].
//!
//! ## Endpoints
//!
//! | Method   | Path                       | Description                      |
//! |----------|----------------------------|----------------------------------|
//! | GET      | `/health`                  | Liveness probe                   |
//! | GET      | `/status`                  | Node status summary              |
//! | GET/POST | `/api/v1/assets`           | List (paginated) / create assets |
//! | GET      | `/api/v1/assets/:id`       | One asset                        |
//! | GET      | `/api/v1/nfts/:id`         | One NFT                          |
//! | GET      | `/api/v1/blocks/:id`       | Block by hash or height          |
//! | GET      | `/api/v1/network/status`   | Chain and peer-network summary   |
//! | GET      | `/api/v1/network/peers`    | Known peers                      |
//! | GET      | `/ws`                      | Topic-filtered event stream      |
//!
//! ## WebSocket protocol
//!
//! ```text
//! → {"type":"subscribe","topic":"blocks"}
//! → {"type":"unsubscribe","topic":"blocks"}
//! → {"type":"heartbeat"}
//! ← {"topic":"blocks","data":{"type":"BlockProduced",...}}
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use satox_sdk::api::VALID_TOPICS;
use satox_sdk::asset::{Asset, AssetError, CreateAssetRequest};
use satox_sdk::blockchain::BlockchainError;
use satox_sdk::network::NetworkError;
use satox_sdk::nft::NftError;
use satox_sdk::{SatoxSdk, SdkEvent};

use crate::metrics::SharedMetrics;

const DEFAULT_PER_PAGE: usize = 50;
const MAX_PER_PAGE: usize = 500;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub sdk: Arc<SatoxSdk>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/assets", get(list_assets_handler).post(create_asset_handler))
        .route("/assets/:id", get(asset_handler))
        .route("/nfts/:id", get(nft_handler))
        .route("/blocks/:id", get(block_handler))
        .route("/network/status", get(network_status_handler))
        .route("/network/peers", get(peers_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .nest("/api/v1", v1)
        .layer(middleware::from_fn_with_state(state.clone(), track_latency))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_latency(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state
        .metrics
        .api_request_duration_seconds
        .observe(started.elapsed().as_secs_f64());
    response
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub running: bool,
    pub block_height: u64,
    pub best_block_hash: String,
    pub peer_count: usize,
    /// At least one sync round has completed.
    pub synced: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageQuery {
    /// Apply 1-based `page` / `per_page` to an already ordered list.
    fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        items
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect()
    }
}

/// A manager error rendered as `{"error": ...}` with a fitting status.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<AssetError> for ApiFailure {
    fn from(e: AssetError) -> Self {
        let status = match &e {
            AssetError::NotFound(_) => StatusCode::NOT_FOUND,
            AssetError::AssetExists(_) | AssetError::SymbolTaken(_) => StatusCode::CONFLICT,
            AssetError::Lifecycle(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e)
    }
}

impl From<NftError> for ApiFailure {
    fn from(e: NftError) -> Self {
        let status = match &e {
            NftError::NotFound(_) | NftError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            NftError::Lifecycle(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e)
    }
}

impl From<BlockchainError> for ApiFailure {
    fn from(e: BlockchainError) -> Self {
        let status = match &e {
            BlockchainError::BlockNotFound(_) | BlockchainError::TransactionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            BlockchainError::Lifecycle(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e)
    }
}

impl From<NetworkError> for ApiFailure {
    fn from(e: NetworkError) -> Self {
        let status = match &e {
            NetworkError::Lifecycle(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e)
    }
}

type ApiResponse<T> = Result<Json<T>, ApiFailure>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Does not look at subsystems; that is `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> ApiResponse<StatusResponse> {
    let sdk = &state.sdk;
    let chain = sdk.blockchain_manager();
    let info = chain.get_network_info()?;
    let peer_count = sdk.network_manager().get_peers()?.len();

    Ok(Json(StatusResponse {
        version: SatoxSdk::version().to_string(),
        network: info.network.to_string(),
        running: sdk.is_running(),
        block_height: info.height,
        best_block_hash: info.best_block_hash,
        peer_count,
        synced: info.last_sync.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_assets_handler(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Vec<Asset>> {
    let mut assets = state.sdk.asset_manager().list_assets()?;
    assets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(Json(page.slice(assets)))
}

async fn create_asset_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<Asset>), ApiFailure> {
    let asset = state.sdk.asset_manager().create_asset(request)?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn asset_handler(Path(id): Path<String>, State(state): State<AppState>) -> ApiResponse<Asset> {
    Ok(Json(state.sdk.asset_manager().get_asset(&id)?))
}

async fn nft_handler(Path(id): Path<String>, State(state): State<AppState>) -> ApiResponse<Value> {
    let nft = state.sdk.nft_manager().get_nft(&id)?;
    Ok(Json(json!(nft)))
}

/// `id` is a block hash or a decimal height.
async fn block_handler(Path(id): Path<String>, State(state): State<AppState>) -> ApiResponse<Value> {
    let block = state.sdk.blockchain_manager().get_block_info_by_id(&id)?;
    Ok(Json(json!(block)))
}

async fn network_status_handler(State(state): State<AppState>) -> ApiResponse<Value> {
    let info = state.sdk.blockchain_manager().get_network_info()?;
    let network = state.sdk.network_manager();
    Ok(Json(json!({
        "chain": info,
        "p2p": {
            "listening": network.local_addr().map(|a| a.to_string()),
            "peers": network.get_peers()?.len(),
            "stats": network.get_stats(),
        },
    })))
}

async fn peers_handler(State(state): State<AppState>) -> ApiResponse<Value> {
    let peers = state.sdk.network_manager().get_peers()?;
    Ok(Json(json!(peers)))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// What a client frame asks for.
#[derive(Debug, PartialEq, Eq)]
enum ClientRequest {
    Subscribe(String),
    Unsubscribe(String),
    Heartbeat,
    Invalid(String),
}

fn parse_client_frame(text: &str) -> ClientRequest {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return ClientRequest::Invalid("frame is not JSON".into());
    };
    let topic = value.get("topic").and_then(Value::as_str).map(str::to_string);
    match (value.get("type").and_then(Value::as_str), topic) {
        (Some("heartbeat"), _) => ClientRequest::Heartbeat,
        (Some(kind @ ("subscribe" | "unsubscribe")), Some(topic)) => {
            if !VALID_TOPICS.contains(&topic.as_str()) {
                return ClientRequest::Invalid(format!("unknown topic {topic:?}"));
            }
            if kind == "subscribe" {
                ClientRequest::Subscribe(topic)
            } else {
                ClientRequest::Unsubscribe(topic)
            }
        }
        (Some(kind), _) => ClientRequest::Invalid(format!("unsupported request {kind:?}")),
        (None, _) => ClientRequest::Invalid("missing type".into()),
    }
}

fn event_frame(event: &SdkEvent) -> Option<String> {
    match serde_json::to_string(&json!({ "topic": event.topic(), "data": event })) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize ws event");
            None
        }
    }
}

/// Forward bus events on the client's subscribed topics until either side
/// goes away.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.sdk.subscribe();
    let mut topics: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if !topics.contains(event.topic()) {
                            continue;
                        }
                        let Some(frame) = event_frame(&event) else {
                            continue;
                        };
                        if socket.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let reply = match parse_client_frame(&text) {
                    ClientRequest::Subscribe(topic) => {
                        tracing::debug!(%topic, "ws subscribe");
                        topics.insert(topic);
                        None
                    }
                    ClientRequest::Unsubscribe(topic) => {
                        topics.remove(&topic);
                        None
                    }
                    ClientRequest::Heartbeat => Some(json!({ "type": "heartbeat" })),
                    ClientRequest::Invalid(error) => Some(json!({ "type": "error", "error": error })),
                };
                if let Some(reply) = reply {
                    if socket.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use satox_sdk::database::DatabaseConfig;
    use satox_sdk::SdkConfig;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = SdkConfig {
            enable_p2p: false,
            enable_sync: false,
            database: DatabaseConfig::in_memory(),
            ..SdkConfig::default()
        };
        let sdk = SatoxSdk::with_config(config).unwrap();
        sdk.initialize().unwrap();
        AppState {
            sdk: Arc::new(sdk),
            metrics: Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
        send(router, Request::builder().uri(path).body(Body::empty()).unwrap()).await
    }

    async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(router, req).await
    }

    #[tokio::test]
    async fn health_ok() {
        let router = create_router(test_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_genesis() {
        let state = test_state();
        let router = create_router(state.clone());
        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let status: StatusResponse = serde_json::from_value(body).unwrap();
        assert_eq!(status.version, "1.0.0");
        assert_eq!(status.network, "mainnet");
        assert_eq!(status.block_height, 0);
        assert!(!status.running);
        assert_eq!(
            status.best_block_hash,
            state.sdk.blockchain_manager().get_best_block_hash().unwrap()
        );
    }

    #[tokio::test]
    async fn create_list_and_fetch_assets() {
        let router = create_router(test_state());
        let (status, created) = post_json(
            &router,
            "/api/v1/assets",
            json!({"name": "Gold", "symbol": "GLD", "owner": "alice", "total_supply": 100}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, body) = post_json(
            &router,
            "/api/v1/assets",
            json!({"name": "Fool", "symbol": "GLD", "owner": "bob", "total_supply": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("GLD"));

        let (status, list) = get(&router, "/api/v1/assets?page=1&per_page=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        let (_, empty) = get(&router, "/api/v1/assets?page=2&per_page=10").await;
        assert!(empty.as_array().unwrap().is_empty());

        let (status, one) = get(&router, &format!("/api/v1/assets/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["symbol"], "GLD");
    }

    #[tokio::test]
    async fn missing_records_are_404() {
        let router = create_router(test_state());
        for path in ["/api/v1/assets/nope", "/api/v1/nfts/nope", "/api/v1/blocks/99"] {
            let (status, body) = get(&router, path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn blocks_by_height_and_hash() {
        let state = test_state();
        let router = create_router(state.clone());
        let produced = state.sdk.blockchain_manager().produce_block("miner").unwrap();

        let (status, by_height) = get(&router, "/api/v1/blocks/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_height["hash"], produced.hash.as_str());

        let (status, by_hash) = get(&router, &format!("/api/v1/blocks/{}", produced.hash)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_hash["height"], 1);
    }

    #[tokio::test]
    async fn network_endpoints() {
        let state = test_state();
        state.sdk.network_manager().add_peer("10.1.1.1", 60777).unwrap();
        let router = create_router(state);

        let (status, body) = get(&router, "/api/v1/network/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["p2p"]["peers"], 1);
        assert_eq!(body["chain"]["height"], 0);

        let (status, peers) = get(&router, "/api/v1/network/peers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(peers[0]["address"], "10.1.1.1");
    }

    #[tokio::test]
    async fn requests_are_timed() {
        let state = test_state();
        let router = create_router(state.clone());
        get(&router, "/health").await;
        get(&router, "/status").await;
        assert_eq!(state.metrics.api_request_duration_seconds.get_sample_count(), 2);
    }

    #[test]
    fn page_slicing() {
        let q = PageQuery {
            page: Some(2),
            per_page: Some(3),
        };
        assert_eq!(q.slice((1..=10).collect()), vec![4, 5, 6]);
        assert_eq!(PageQuery::default().slice(vec![1, 2]), vec![1, 2]);
        let zero = PageQuery {
            page: Some(0),
            per_page: Some(0),
        };
        assert_eq!(zero.slice(vec![7, 8]), vec![7]);
    }

    #[test]
    fn client_frames() {
        assert_eq!(
            parse_client_frame(r#"{"type":"subscribe","topic":"blocks"}"#),
            ClientRequest::Subscribe("blocks".into())
        );
        assert_eq!(
            parse_client_frame(r#"{"type":"unsubscribe","topic":"assets"}"#),
            ClientRequest::Unsubscribe("assets".into())
        );
        assert_eq!(parse_client_frame(r#"{"type":"heartbeat"}"#), ClientRequest::Heartbeat);
        assert!(matches!(
            parse_client_frame(r#"{"type":"subscribe","topic":"weather"}"#),
            ClientRequest::Invalid(_)
        ));
        assert!(matches!(parse_client_frame("nope"), ClientRequest::Invalid(_)));
    }

    #[test]
    fn event_frames_carry_topic() {
        let frame = event_frame(&SdkEvent::BlockProduced {
            height: 3,
            hash: "ab".into(),
            tx_count: 0,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["topic"], "blocks");
        assert_eq!(value["data"]["type"], "BlockProduced");
        assert_eq!(value["data"]["height"], 3);
    }
}
