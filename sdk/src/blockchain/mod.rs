//! # Blockchain
//!
//! A local chain of BLAKE3-linked blocks with a pending transaction pool.
//! Blocks are assembled by `produce_block` or imported from peers, and
//! every block is checked for hash, Merkle root and parent linkage before
//! it joins the chain.

pub mod block;
pub mod chain;
pub mod manager;
pub mod types;

pub use block::{Block, BlockHeader, BlockInfo};
pub use chain::{Chain, TxLocation};
pub use manager::BlockchainManager;
pub use types::{BlockchainConfig, BlockchainError, NetworkInfo, SyncMode, TransactionInfo};
