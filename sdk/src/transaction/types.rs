//! Core type definitions for Satox transactions.
//!
//! A transaction spends a list of inputs into a list of outputs; whatever
//! the outputs leave behind is the fee. Amounts are base units throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::hash::sha256_hex;
use crate::lifecycle::LifecycleError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid transaction: {0}")]
    InvalidInput(String),

    #[error("insufficient funds: inputs {available}, outputs plus fee {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("fee {fee} outside allowed range {min}..={max}")]
    FeeOutOfRange { fee: u64, min: u64, max: u64 },

    #[error("amount overflow")]
    Overflow,

    #[error("transaction size {size} exceeds {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("transaction {txid} is {actual}, expected {expected}")]
    InvalidStatus {
        txid: String,
        actual: TxStatus,
        expected: TxStatus,
    },

    #[error("transaction id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("transaction {0} is unsigned")]
    MissingSignature(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("input address {0} has no matching signature")]
    UnsignedInput(String),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub min_fee: u64,
    pub max_fee: u64,
    pub default_fee: u64,
    /// Upper bound on the estimated serialized size, in bytes.
    pub max_size: usize,
    pub required_confirmations: u32,
    pub fee_rate_per_byte: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            min_fee: 1_000,
            max_fee: 100_000_000,
            default_fee: 1_000,
            max_size: 1_000_000,
            required_confirmations: 6,
            fee_rate_per_byte: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Signed,
    Broadcast,
    Confirmed,
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Pending => "pending",
            TxStatus::Signed => "signed",
            TxStatus::Broadcast => "broadcast",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Inputs, outputs, signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The transaction whose output is being spent.
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub script_sig: String,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    pub amount: u64,
    #[serde(default)]
    pub address: String,
}

fn default_sequence() -> u32 {
    u32::MAX
}

impl TxInput {
    pub fn new(txid: impl Into<String>, vout: u32, amount: u64, address: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            vout,
            script_sig: String::new(),
            sequence: default_sequence(),
            amount,
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub n: u32,
    #[serde(default)]
    pub script_pub_key: String,
    pub address: String,
    #[serde(default = "default_output_kind")]
    pub kind: String,
}

fn default_output_kind() -> String {
    "pubkeyhash".to_string()
}

impl TxOutput {
    /// A pay-to-address output. `n` is assigned when the transaction is
    /// created.
    pub fn to_address(address: impl Into<String>, value: u64) -> Self {
        Self {
            value,
            n: 0,
            script_pub_key: String::new(),
            address: address.into(),
            kind: default_output_kind(),
        }
    }
}

/// One signer's contribution: hex public key and hex signature over the txid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub public_key: String,
    pub signature: String,
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A Satox transaction.
///
/// `txid` is `hex(sha256(signable_bytes))`, which excludes signatures and
/// every status field, so the id is fixed from creation onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    pub size: usize,
    pub status: TxStatus,
    pub confirmations: u32,
    pub block_hash: Option<String>,
    pub block_height: Option<u64>,
    pub signatures: Vec<TxSignature>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Canonical bytes for id computation and signing.
    ///
    /// Fixed-width little-endian integers and NUL-terminated strings, so the
    /// encoding does not depend on any serializer's field order.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + 96 * (self.inputs.len() + self.outputs.len()));

        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            push_str(&mut buf, &input.txid);
            buf.extend_from_slice(&input.vout.to_le_bytes());
            push_str(&mut buf, &input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
            buf.extend_from_slice(&input.amount.to_le_bytes());
            push_str(&mut buf, &input.address);
        }

        buf.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            buf.extend_from_slice(&output.n.to_le_bytes());
            push_str(&mut buf, &output.script_pub_key);
            push_str(&mut buf, &output.address);
            push_str(&mut buf, &output.kind);
        }

        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf.extend_from_slice(&self.created_at.timestamp_millis().to_le_bytes());
        buf
    }

    pub fn compute_txid(&self) -> String {
        sha256_hex(&self.signable_bytes())
    }

    pub fn total_input(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.amount))
    }

    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }

    /// True if `address` spends or receives in this transaction.
    pub fn involves(&self, address: &str) -> bool {
        self.inputs.iter().any(|i| i.address == address)
            || self.outputs.iter().any(|o| o.address == address)
    }
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0x00);
}

/// Size estimate in bytes: 148 per input, 34 per output, 10 overhead.
pub fn estimate_size(n_inputs: usize, n_outputs: usize) -> usize {
    148 * n_inputs + 34 * n_outputs + 10
}
