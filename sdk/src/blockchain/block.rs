//! # Block Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  BlockHeader                                │
//! │  ├── height: u64                            │
//! │  ├── hash: [u8; 32]       (BLAKE3 of header)│
//! │  ├── previous_hash: [u8; 32]                │
//! │  ├── timestamp: u64       (unix millis)     │
//! │  ├── producer: String                       │
//! │  └── merkle_root: [u8; 32] (over txids)     │
//! ├─────────────────────────────────────────────┤
//! │  transactions: Vec<Transaction>             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The hash covers `height || previous_hash || timestamp || producer ||
//! merkle_root`. Leaves of the Merkle tree are the 32-byte txids, so a
//! block commits to exactly the transactions whose ids it lists.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Network;
use crate::crypto::hash::{blake3_hash, merkle_root};
use crate::transaction::Transaction;

/// Genesis blocks are produced at the epoch by a fixed per-network producer.
pub const GENESIS_TIMESTAMP: u64 = 0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: [u8; 32],
    /// All zeros for genesis.
    pub previous_hash: [u8; 32],
    pub timestamp: u64,
    pub producer: String,
    pub merkle_root: [u8; 32],
}

impl BlockHeader {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn previous_hash_hex(&self) -> String {
        hex::encode(self.previous_hash)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The deterministic first block of `network`.
    pub fn genesis(network: Network) -> Self {
        let producer = format!("satox-{network}-genesis");
        let merkle = [0u8; 32];
        let hash = compute_header_hash(0, &[0u8; 32], GENESIS_TIMESTAMP, &producer, &merkle);
        Block {
            header: BlockHeader {
                height: 0,
                hash,
                previous_hash: [0u8; 32],
                timestamp: GENESIS_TIMESTAMP,
                producer,
                merkle_root: merkle,
            },
            transactions: Vec::new(),
        }
    }

    /// A new block on top of `parent`, stamped with the current time.
    pub fn new(parent: &Block, transactions: Vec<Transaction>, producer: String) -> Self {
        let timestamp = Utc::now().timestamp_millis().max(0) as u64;
        Self::with_timestamp(parent, transactions, producer, timestamp)
    }

    pub fn with_timestamp(
        parent: &Block,
        transactions: Vec<Transaction>,
        producer: String,
        timestamp: u64,
    ) -> Self {
        let height = parent.header.height + 1;
        let previous_hash = parent.header.hash;
        let merkle = compute_merkle_root(&transactions);
        let hash = compute_header_hash(height, &previous_hash, timestamp, &producer, &merkle);
        Block {
            header: BlockHeader {
                height,
                hash,
                previous_hash,
                timestamp,
                producer,
                merkle_root: merkle,
            },
            transactions,
        }
    }

    pub fn compute_hash(&self) -> [u8; 32] {
        compute_header_hash(
            self.header.height,
            &self.header.previous_hash,
            self.header.timestamp,
            &self.header.producer,
            &self.header.merkle_root,
        )
    }

    /// Self-consistency: stored hash, Merkle root and genesis shape.
    /// Parent linkage needs the chain and is checked there.
    pub fn verify(&self) -> Result<(), String> {
        let expected_hash = self.compute_hash();
        if self.header.hash != expected_hash {
            return Err(format!(
                "block {} hash mismatch: stored={}, computed={}",
                self.header.height,
                hex::encode(self.header.hash),
                hex::encode(expected_hash),
            ));
        }

        let expected_root = compute_merkle_root(&self.transactions);
        if self.header.merkle_root != expected_root {
            return Err(format!(
                "block {} merkle root mismatch: stored={}, computed={}",
                self.header.height,
                hex::encode(self.header.merkle_root),
                hex::encode(expected_root),
            ));
        }

        if self.header.height == 0 && self.header.previous_hash != [0u8; 32] {
            return Err("genesis block must have a zeroed previous hash".to_string());
        }
        Ok(())
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn hash_hex(&self) -> String {
        self.header.hash_hex()
    }

    pub fn txids(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.txid.clone()).collect()
    }

    /// JSON-encoded size in bytes.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.header.timestamp as i64)
            .single()
            .unwrap_or_default()
    }
}

/// JSON-friendly summary of a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    pub height: u64,
    pub previous_hash: String,
    pub merkle_root: String,
    pub timestamp: DateTime<Utc>,
    pub producer: String,
    pub transactions: Vec<String>,
    pub size: usize,
    /// `tip height - height + 1`; the tip itself has one confirmation.
    pub confirmations: u64,
}

impl BlockInfo {
    pub fn from_block(block: &Block, tip_height: u64) -> Self {
        BlockInfo {
            hash: block.hash_hex(),
            height: block.height(),
            previous_hash: block.header.previous_hash_hex(),
            merkle_root: hex::encode(block.header.merkle_root),
            timestamp: block.time(),
            producer: block.header.producer.clone(),
            transactions: block.txids(),
            size: block.size_bytes(),
            confirmations: tip_height.saturating_sub(block.height()) + 1,
        }
    }
}

fn compute_header_hash(
    height: u64,
    previous_hash: &[u8; 32],
    timestamp: u64,
    producer: &str,
    merkle: &[u8; 32],
) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(128);
    preimage.extend_from_slice(&height.to_le_bytes());
    preimage.extend_from_slice(previous_hash);
    preimage.extend_from_slice(&timestamp.to_le_bytes());
    preimage.extend_from_slice(producer.as_bytes());
    preimage.extend_from_slice(merkle);
    blake3_hash(&preimage)
}

/// Merkle root over txids. A txid that is not 32 bytes of hex is hashed
/// as text so malformed ids still commit.
pub fn compute_merkle_root(transactions: &[Transaction]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = transactions
        .iter()
        .map(|tx| {
            hex::decode(&tx.txid)
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
                .unwrap_or_else(|| blake3_hash(tx.txid.as_bytes()))
        })
        .collect();
    merkle_root(&leaves)
}
