//! Asset records, requests, configuration and errors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ledger::LedgerError;
use crate::config::COIN_DECIMALS;
use crate::lifecycle::LifecycleError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid asset input: {0}")]
    InvalidInput(String),

    #[error("asset already exists: {0}")]
    AssetExists(String),

    #[error("asset symbol already in use: {0}")]
    SymbolTaken(String),

    #[error("asset not found: {0}")]
    NotFound(String),

    /// Reissue and burn are owner-only.
    #[error("{caller} is not the owner of asset {asset_id}")]
    NotOwner { asset_id: String, caller: String },

    #[error("asset {0} is not reissuable")]
    NotReissuable(String),

    #[error("asset {0} is not transferable")]
    NotTransferable(String),

    #[error("supply of asset {asset_id} would exceed {max}")]
    SupplyLimit { asset_id: String, max: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Validation limits and fees for asset operations. Fees are in base units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub max_name_length: usize,
    pub max_symbol_length: usize,
    pub max_description_length: usize,
    pub min_supply: u64,
    pub max_supply: u64,
    pub default_decimals: u8,
    pub max_decimals: u8,
    pub creation_fee: u64,
    pub transfer_fee: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            max_name_length: 32,
            max_symbol_length: 5,
            max_description_length: 1000,
            min_supply: 1,
            max_supply: 1_000_000_000,
            default_decimals: COIN_DECIMALS,
            max_decimals: 18,
            creation_fee: 0,
            transfer_fee: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A fungible token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub owner: String,
    pub total_supply: u64,
    pub decimals: u8,
    pub reissuable: bool,
    pub transferable: bool,
    pub divisible: bool,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supply used when a JSON request omits `total_supply`.
pub const DEFAULT_TOTAL_SUPPLY: u64 = 1_000_000;

fn default_total_supply() -> u64 {
    DEFAULT_TOTAL_SUPPLY
}

/// Parameters for [`AssetManager::create_asset`](super::AssetManager::create_asset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateAssetRequest {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub owner: String,
    #[serde(default = "default_total_supply")]
    pub total_supply: u64,
    /// Falls back to the configured default when absent.
    pub decimals: Option<u8>,
    pub reissuable: bool,
    pub metadata: HashMap<String, String>,
}

impl CreateAssetRequest {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        owner: impl Into<String>,
        total_supply: u64,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            owner: owner.into(),
            total_supply,
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn reissuable(mut self, reissuable: bool) -> Self {
        self.reissuable = reissuable;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One completed asset transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTransfer {
    pub id: String,
    pub asset_id: String,
    pub from: String,
    pub to: String,
    pub amount: u64,
    /// Network fee paid in the native coin, recorded for history.
    pub fee: u64,
    pub timestamp: DateTime<Utc>,
}
