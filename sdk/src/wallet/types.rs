use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::seed::SealedSeed;
use crate::crypto::{EncryptionError, PasswordError};
use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid wallet input: {0}")]
    InvalidInput(String),

    #[error("wallet name already in use: {0}")]
    NameTaken(String),

    #[error("wallet not found: {0}")]
    NotFound(String),

    #[error("address {address} does not belong to wallet {wallet_id}")]
    UnknownAddress { wallet_id: String, address: String },

    #[error("invalid password")]
    InvalidPassword,

    #[error("wallet {0} is already encrypted")]
    AlreadyEncrypted(String),

    #[error("wallet {0} is not encrypted")]
    NotEncrypted(String),

    #[error("wallet {wallet_id} reached the limit of {max} addresses")]
    AddressLimit { wallet_id: String, max: usize },

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("backup I/O failed for {path}: {source}")]
    BackupIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup is corrupt: {0}")]
    CorruptBackup(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Fee suggested to callers building transactions, in base units.
    pub default_fee: u64,
    pub min_confirmations: u32,
    pub max_addresses: usize,
    pub backup_interval_hours: u32,
    /// When false, wallets are created without a password and seeds are
    /// kept unsealed.
    pub encrypt_wallets: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_fee: 1_000,
            min_confirmations: 6,
            max_addresses: 1_000,
            backup_interval_hours: 24,
            encrypt_wallets: true,
        }
    }
}

/// Public view of a wallet. Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub name: String,
    pub addresses: Vec<WalletAddress>,
    pub balance: u64,
    pub unconfirmed_balance: u64,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    pub address: String,
    /// Hex Ed25519 public key.
    pub public_key: String,
    pub label: String,
    pub is_change: bool,
    pub index: u32,
    pub balance: u64,
    pub unconfirmed: u64,
}

/// On-disk backup format. The seed stays sealed exactly as it was in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBackup {
    pub version: u32,
    pub wallet: Wallet,
    pub seed: SealedSeed,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const BACKUP_VERSION: u32 = 1;
