//! GraphQL client sharing the REST client's auth and retry handling.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::auth::Auth;
use super::error::{ApiError, ApiResult};
use super::rest::{handle_response, DEFAULT_TIMEOUT};
use super::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetNode {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub owner: String,
    pub total_supply: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|edge| &edge.node)
    }
}

const ASSET_FIELDS: &str = "id name symbol owner totalSupply decimals";

#[derive(Clone, Debug)]
pub struct GraphQlClient {
    client: reqwest::Client,
    endpoint: String,
    auth: Auth,
    retry: RetryPolicy,
}

impl GraphQlClient {
    pub fn new(endpoint: &str) -> ApiResult<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
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

    /// POST the request and return `data`, or every error message.
    pub async fn execute<T: DeserializeOwned>(&self, request: &GraphQlRequest) -> ApiResult<T> {
        debug!(operation = ?request.operation_name, "graphql request");
        let response: GraphQlResponse<T> = self
            .retry
            .run(|| {
                let builder = self.auth.apply(self.client.post(&self.endpoint).json(request));
                async move { handle_response(builder.send().await?).await }
            })
            .await?;

        if !response.errors.is_empty() {
            return Err(ApiError::GraphQl(
                response.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        response.data.ok_or(ApiError::EmptyResponse)
    }

    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> ApiResult<T> {
        self.execute(&GraphQlRequest::new(query).variables(variables))
            .await
    }

    pub async fn asset(&self, id: &str) -> ApiResult<Option<AssetNode>> {
        #[derive(Deserialize)]
        struct Data {
            asset: Option<AssetNode>,
        }
        let request = GraphQlRequest::new(format!(
            "query Asset($id: ID!) {{ asset(id: $id) {{ {ASSET_FIELDS} }} }}"
        ))
        .variables(json!({ "id": id }))
        .operation_name("Asset");
        Ok(self.execute::<Data>(&request).await?.asset)
    }

    pub async fn assets(&self, first: u32, after: Option<&str>) -> ApiResult<Connection<AssetNode>> {
        #[derive(Deserialize)]
        struct Data {
            assets: Connection<AssetNode>,
        }
        let request = GraphQlRequest::new(format!(
            "query Assets($first: Int!, $after: String) {{ assets(first: $first, after: $after) \
             {{ edges {{ cursor node {{ {ASSET_FIELDS} }} }} pageInfo {{ hasNextPage endCursor }} }} }}"
        ))
        .variables(json!({ "first": first, "after": after }))
        .operation_name("Assets");
        Ok(self.execute::<Data>(&request).await?.assets)
    }
}
