use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DEFAULT_P2P_PORT;
use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("peer already known: {0}")]
    PeerExists(String),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("connection limit of {max} peers reached")]
    TooManyPeers { max: usize },

    #[error("timed out connecting to {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen_address: String,
    /// `0` binds an ephemeral port; read it back with `local_addr`.
    pub port: u16,
    pub max_connections: usize,
    pub connection_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: DEFAULT_P2P_PORT,
            max_connections: 10,
            connection_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    /// Added but never dialed.
    Known,
    Connected,
    Disconnected,
    /// Last dial or send failed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: String,
    pub port: u16,
    pub state: PeerState,
    pub latency_ms: Option<u64>,
    pub added_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    pub messages_sent: u64,
}

impl PeerInfo {
    pub fn endpoint(&self) -> String {
        peer_key(&self.address, self.port)
    }
}

pub(crate) fn peer_key(address: &str, port: u16) -> String {
    format!("{address}:{port}")
}

/// One length-delimited JSON frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMessage {
    pub kind: String,
    pub payload: serde_json::Value,
    pub from: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    MessageReceived {
        remote: String,
        message: NetworkMessage,
    },
    PeerConnected {
        address: String,
    },
    PeerDisconnected {
        address: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub failed_connections: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uptime_secs: u64,
}
