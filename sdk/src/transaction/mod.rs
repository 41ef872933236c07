//! # Transactions
//!
//! Input/output transactions in base units. The lifecycle is
//! `Pending → Signed → Broadcast → Confirmed`, with `Failed` reachable
//! from anywhere. Ids are SHA-256 over a canonical byte encoding that
//! excludes signatures, so signing never changes a txid.

pub mod manager;
pub mod types;
pub mod verification;

pub use manager::TransactionManager;
pub use types::{
    estimate_size, Transaction, TransactionConfig, TransactionError, TxInput, TxOutput,
    TxSignature, TxStatus,
};
