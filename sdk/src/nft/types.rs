use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NftError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid NFT input: {0}")]
    InvalidInput(String),

    #[error("invalid NFT metadata: {0}")]
    InvalidMetadata(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection {collection_id} is full ({total_supply} minted)")]
    CollectionFull {
        collection_id: String,
        total_supply: u32,
    },

    #[error("NFT not found: {0}")]
    NotFound(String),

    #[error("{caller} does not own NFT {token_id}")]
    NotOwner { token_id: String, caller: String },

    #[error("NFT {0} is not transferable")]
    NotTransferable(String),
}

/// Limits applied to collections and tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NftConfig {
    pub max_name_length: usize,
    pub max_description_length: usize,
    pub max_attributes: usize,
    /// Royalty cap in basis points (5000 = 50 %).
    pub max_royalty_bps: u16,
    pub max_collection_size: u32,
}

impl Default for NftConfig {
    fn default() -> Self {
        Self {
            max_name_length: 64,
            max_description_length: 2000,
            max_attributes: 50,
            max_royalty_bps: 5000,
            max_collection_size: 10_000,
        }
    }
}

/// A trait/value pair in the OpenSea sense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

impl NftAttribute {
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
            rarity: None,
            percentage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftCollection {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator: String,
    /// Maximum number of tokens this collection may ever hold.
    pub total_supply: u32,
    pub minted: u32,
    pub royalty_bps: u16,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nft {
    pub token_id: String,
    pub collection_id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub creator: String,
    pub royalty_bps: u16,
    pub image_url: Option<String>,
    pub ipfs_hash: Option<String>,
    pub metadata: HashMap<String, String>,
    pub attributes: Vec<NftAttribute>,
    pub transferable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftTransfer {
    pub id: String,
    pub token_id: String,
    pub from: String,
    pub to: String,
    pub fee: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub description: String,
    pub creator: String,
    pub total_supply: u32,
    pub royalty_bps: u16,
    pub metadata: HashMap<String, String>,
}

impl CreateCollectionRequest {
    pub fn new(name: impl Into<String>, creator: impl Into<String>, total_supply: u32) -> Self {
        Self {
            name: name.into(),
            creator: creator.into(),
            total_supply,
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn royalty_bps(mut self, royalty_bps: u16) -> Self {
        self.royalty_bps = royalty_bps;
        self
    }
}

/// Parameters for minting one token into a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MintRequest {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub image_url: Option<String>,
    pub ipfs_hash: Option<String>,
    pub metadata: HashMap<String, String>,
    pub attributes: Vec<NftAttribute>,
    pub transferable: bool,
}

impl Default for MintRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            owner: String::new(),
            image_url: None,
            ipfs_hash: None,
            metadata: HashMap::new(),
            attributes: Vec::new(),
            transferable: true,
        }
    }
}

impl MintRequest {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, attribute: NftAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn soulbound(mut self) -> Self {
        self.transferable = false;
        self
    }
}
