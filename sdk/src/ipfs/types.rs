use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub enum IpfsError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file of {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("content already stored: {0}")]
    FileExists(String),

    #[error("content not found: {0}")]
    NotFound(String),

    /// Stored bytes no longer hash to their content id.
    #[error("content {0} failed its integrity check")]
    Corrupted(String),

    #[error("garbage collection is disabled")]
    GcDisabled,

    #[error("peer already known: {0}")]
    PeerExists(String),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    /// Prefix joined with a content id to build a public URL.
    pub gateway_url: String,
    pub max_file_size: u64,
    pub enable_gc: bool,
    /// Empty means "generate one at initialization".
    pub node_id: String,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            gateway_url: "https://ipfs.io/ipfs/".to_string(),
            max_file_size: 100 * 1024 * 1024,
            enable_gc: true,
            node_id: String::new(),
        }
    }
}

/// Metadata kept for each stored object. The bytes live alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsFile {
    pub hash: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInfo {
    pub hash: String,
    pub name: String,
    pub pinned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsPeer {
    pub peer_id: String,
    pub addresses: Vec<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsNodeInfo {
    pub id: String,
    pub version: String,
    pub gateway_url: String,
    pub peer_count: usize,
    pub file_count: usize,
    pub pinned_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_files: usize,
    pub pinned_files: usize,
    pub total_size: u64,
    pub pinned_size: u64,
    pub max_file_size: u64,
}
