//! # Node API Clients
//!
//! REST, WebSocket and GraphQL clients for talking to a running Satox
//! node. HTTP clients share [`Auth`] and [`RetryPolicy`].

pub mod auth;
pub mod error;
pub mod graphql;
pub mod rest;
pub mod retry;
pub mod websocket;

pub use auth::Auth;
pub use error::{ApiError, ApiResult};
pub use graphql::{Connection, Edge, GraphQlClient, GraphQlError, GraphQlRequest, PageInfo};
pub use rest::{Pagination, RestClient};
pub use retry::RetryPolicy;
pub use websocket::{WebSocketClient, WebSocketConfig, VALID_TOPICS};
