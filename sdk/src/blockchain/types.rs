use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{Network, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT};
use crate::lifecycle::LifecycleError;
use crate::transaction::Transaction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("transaction already known: {0}")]
    DuplicateTransaction(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Full,
    Fast,
    Light,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Full => "full",
            SyncMode::Fast => "fast",
            SyncMode::Light => "light",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    pub network: Network,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub sync_mode: SyncMode,
    pub max_peers: usize,
    pub timeout_secs: u64,
    pub max_block_transactions: usize,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            rpc_port: DEFAULT_RPC_PORT,
            p2p_port: DEFAULT_P2P_PORT,
            sync_mode: SyncMode::Full,
            max_peers: 125,
            timeout_secs: 30,
            max_block_transactions: 1_000,
        }
    }
}

/// A transaction with its position in the chain, if it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub txid: String,
    pub block_hash: Option<String>,
    pub block_height: Option<u64>,
    /// Zero while the transaction sits in the pending pool.
    pub confirmations: u64,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub network: Network,
    pub height: u64,
    pub best_block_hash: String,
    pub pending_transactions: usize,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub sync_mode: SyncMode,
    pub max_peers: usize,
    pub last_sync: Option<DateTime<Utc>>,
}
