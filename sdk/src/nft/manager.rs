//! The NFT manager: collections, tokens, ownership and transfer history.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use super::types::{
    CreateCollectionRequest, MintRequest, Nft, NftAttribute, NftCollection, NftConfig, NftError,
    NftTransfer,
};
use crate::crypto::hash::{long_id, short_id};
use crate::events::{EventBus, SdkEvent};
use crate::lifecycle::{Lifecycle, Manager};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default)]
struct NftState {
    collections: HashMap<String, NftCollection>,
    nfts: HashMap<String, Nft>,
    transfers: Vec<NftTransfer>,
    transfer_seq: u64,
}

#[derive(Debug)]
pub struct NftManager {
    lifecycle: Lifecycle,
    config: RwLock<NftConfig>,
    state: RwLock<NftState>,
    events: EventBus,
}

impl Default for NftManager {
    fn default() -> Self {
        Self::new(NftConfig::default())
    }
}

impl NftManager {
    pub fn new(config: NftConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("nft"),
            config: RwLock::new(config),
            state: RwLock::new(NftState::default()),
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> NftConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: NftConfig) -> Result<(), NftError> {
        self.lifecycle.ensure_ready()?;
        *self.config.write() = config;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    pub fn create_collection(
        &self,
        request: CreateCollectionRequest,
    ) -> Result<NftCollection, NftError> {
        self.lifecycle.ensure_ready()?;
        let config = self.config();

        check_text("collection name", &request.name, config.max_name_length, true)?;
        check_text(
            "collection description",
            &request.description,
            config.max_description_length,
            false,
        )?;
        if request.creator.trim().is_empty() {
            return Err(NftError::InvalidInput("collection creator is required".into()));
        }
        if request.total_supply == 0 || request.total_supply > config.max_collection_size {
            return Err(NftError::InvalidInput(format!(
                "collection supply must be between 1 and {}",
                config.max_collection_size
            )));
        }
        if request.royalty_bps > config.max_royalty_bps {
            return Err(NftError::InvalidInput(format!(
                "royalty exceeds {} basis points",
                config.max_royalty_bps
            )));
        }

        let collection = NftCollection {
            id: short_id(&[request.name.as_str(), request.creator.as_str()]),
            name: request.name,
            description: request.description,
            creator: request.creator,
            total_supply: request.total_supply,
            minted: 0,
            royalty_bps: request.royalty_bps,
            metadata: request.metadata,
            created_at: Utc::now(),
        };

        let mut state = self.state.write();
        if state.collections.contains_key(&collection.id) {
            return Err(NftError::CollectionExists(collection.id));
        }
        state
            .collections
            .insert(collection.id.clone(), collection.clone());
        drop(state);

        info!(collection_id = %collection.id, name = %collection.name, "collection created");
        Ok(collection)
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<NftCollection, NftError> {
        self.lifecycle.ensure_ready()?;
        self.state
            .read()
            .collections
            .get(collection_id)
            .cloned()
            .ok_or_else(|| NftError::CollectionNotFound(collection_id.to_string()))
    }

    pub fn list_collections(&self) -> Result<Vec<NftCollection>, NftError> {
        self.lifecycle.ensure_ready()?;
        let mut out: Vec<NftCollection> =
            self.state.read().collections.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn list_collections_by_creator(&self, creator: &str) -> Result<Vec<NftCollection>, NftError> {
        Ok(self
            .list_collections()?
            .into_iter()
            .filter(|c| c.creator == creator)
            .collect())
    }

    // -----------------------------------------------------------------------
    // Minting
    // -----------------------------------------------------------------------

    /// Mint the next token of a collection. Creator and royalty come from the
    /// collection.
    pub fn mint_nft(&self, collection_id: &str, request: MintRequest) -> Result<Nft, NftError> {
        self.lifecycle.ensure_ready()?;
        let config = self.config();
        validate_request(&config, &request)?;

        let mut state = self.state.write();
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| NftError::CollectionNotFound(collection_id.to_string()))?;
        if collection.minted >= collection.total_supply {
            return Err(NftError::CollectionFull {
                collection_id: collection_id.to_string(),
                total_supply: collection.total_supply,
            });
        }

        let index = collection.minted.to_string();
        let now = Utc::now();
        let nft = Nft {
            token_id: long_id(&[collection_id, index.as_str()]),
            collection_id: collection_id.to_string(),
            name: request.name,
            description: request.description,
            owner: request.owner,
            creator: collection.creator.clone(),
            royalty_bps: collection.royalty_bps,
            image_url: request.image_url,
            ipfs_hash: request.ipfs_hash,
            metadata: request.metadata,
            attributes: request.attributes,
            transferable: request.transferable,
            created_at: now,
            updated_at: now,
        };
        collection.minted += 1;
        state.nfts.insert(nft.token_id.clone(), nft.clone());
        drop(state);

        info!(token_id = %nft.token_id, collection_id, owner = %nft.owner, "NFT minted");
        self.events.publish(SdkEvent::NftMinted {
            token_id: nft.token_id.clone(),
            collection_id: nft.collection_id.clone(),
            owner: nft.owner.clone(),
        });
        Ok(nft)
    }

    /// Mint from a JSON metadata document into the asset's implicit
    /// collection, creating that collection the first time.
    ///
    /// Recognised keys are `name`, `description`, `image` (or `image_url`),
    /// `ipfs_hash`, `attributes` and `transferable`. Every other key is kept
    /// in `metadata` as a string.
    pub fn create_nft(&self, asset_id: &str, metadata_json: &str, owner: &str) -> Result<Nft, NftError> {
        self.lifecycle.ensure_ready()?;
        if asset_id.trim().is_empty() {
            return Err(NftError::InvalidInput("asset id is required".into()));
        }
        let mut request = parse_metadata_document(metadata_json)?;
        request.owner = owner.to_string();

        let collection_id = self.ensure_implicit_collection(asset_id, owner);
        if request.name.is_empty() {
            let minted = self
                .state
                .read()
                .collections
                .get(&collection_id)
                .map(|c| c.minted)
                .unwrap_or(0);
            request.name = format!("{asset_id} #{}", minted + 1);
        }
        self.mint_nft(&collection_id, request)
    }

    fn ensure_implicit_collection(&self, asset_id: &str, creator: &str) -> String {
        let max_size = self.config.read().max_collection_size;
        let id = implicit_collection_id(asset_id);
        let mut state = self.state.write();
        state
            .collections
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(asset_id, collection_id = %id, "creating implicit collection");
                NftCollection {
                    id: id.clone(),
                    name: asset_id.to_string(),
                    description: String::new(),
                    creator: creator.to_string(),
                    total_supply: max_size,
                    minted: 0,
                    royalty_bps: 0,
                    metadata: HashMap::new(),
                    created_at: Utc::now(),
                }
            })
            .id
            .clone()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn get_nft(&self, token_id: &str) -> Result<Nft, NftError> {
        self.lifecycle.ensure_ready()?;
        self.state
            .read()
            .nfts
            .get(token_id)
            .cloned()
            .ok_or_else(|| NftError::NotFound(token_id.to_string()))
    }

    pub fn list_nfts(&self) -> Result<Vec<Nft>, NftError> {
        self.lifecycle.ensure_ready()?;
        let mut out: Vec<Nft> = self.state.read().nfts.values().cloned().collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.token_id.cmp(&b.token_id))
        });
        Ok(out)
    }

    pub fn list_nfts_by_collection(&self, collection_id: &str) -> Result<Vec<Nft>, NftError> {
        Ok(self
            .list_nfts()?
            .into_iter()
            .filter(|n| n.collection_id == collection_id)
            .collect())
    }

    pub fn list_nfts_by_owner(&self, owner: &str) -> Result<Vec<Nft>, NftError> {
        Ok(self
            .list_nfts()?
            .into_iter()
            .filter(|n| n.owner == owner)
            .collect())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    pub fn transfer_nft(
        &self,
        token_id: &str,
        from: &str,
        to: &str,
        fee: u64,
    ) -> Result<NftTransfer, NftError> {
        self.lifecycle.ensure_ready()?;
        if to.trim().is_empty() {
            return Err(NftError::InvalidInput("recipient is required".into()));
        }
        if from == to {
            return Err(NftError::InvalidInput(
                "sender and recipient must differ".into(),
            ));
        }

        let mut state = self.state.write();
        let nft = state
            .nfts
            .get_mut(token_id)
            .ok_or_else(|| NftError::NotFound(token_id.to_string()))?;
        if nft.owner != from {
            return Err(NftError::NotOwner {
                token_id: token_id.to_string(),
                caller: from.to_string(),
            });
        }
        if !nft.transferable {
            return Err(NftError::NotTransferable(token_id.to_string()));
        }
        nft.owner = to.to_string();
        nft.updated_at = Utc::now();

        state.transfer_seq += 1;
        let seq = state.transfer_seq.to_string();
        let transfer = NftTransfer {
            id: long_id(&[token_id, from, to, seq.as_str()]),
            token_id: token_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            fee,
            timestamp: Utc::now(),
        };
        state.transfers.push(transfer.clone());
        drop(state);

        info!(token_id, from, to, "NFT transferred");
        self.events.publish(SdkEvent::NftTransferred {
            token_id: token_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(transfer)
    }

    /// Merge `metadata` into the token's map. Owner only.
    pub fn update_metadata(
        &self,
        token_id: &str,
        owner: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Nft, NftError> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        let nft = state
            .nfts
            .get_mut(token_id)
            .ok_or_else(|| NftError::NotFound(token_id.to_string()))?;
        if nft.owner != owner {
            return Err(NftError::NotOwner {
                token_id: token_id.to_string(),
                caller: owner.to_string(),
            });
        }
        nft.metadata.extend(metadata);
        nft.updated_at = Utc::now();
        Ok(nft.clone())
    }

    pub fn update_image(
        &self,
        token_id: &str,
        image_url: &str,
        ipfs_hash: Option<&str>,
    ) -> Result<Nft, NftError> {
        self.lifecycle.ensure_ready()?;
        if image_url.trim().is_empty() {
            return Err(NftError::InvalidInput("image url is required".into()));
        }
        let mut state = self.state.write();
        let nft = state
            .nfts
            .get_mut(token_id)
            .ok_or_else(|| NftError::NotFound(token_id.to_string()))?;
        nft.image_url = Some(image_url.to_string());
        if let Some(hash) = ipfs_hash {
            nft.ipfs_hash = Some(hash.to_string());
        }
        nft.updated_at = Utc::now();
        Ok(nft.clone())
    }

    /// Transfers of one token, newest first.
    pub fn get_transfers(
        &self,
        token_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<NftTransfer>, NftError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        if !state.nfts.contains_key(token_id) {
            return Err(NftError::NotFound(token_id.to_string()));
        }
        Ok(state
            .transfers
            .iter()
            .rev()
            .filter(|t| t.token_id == token_id)
            .take(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .cloned()
            .collect())
    }

    pub fn validate_nft(&self, nft: &Nft) -> Result<(), NftError> {
        let config = self.config.read();
        check_text("NFT name", &nft.name, config.max_name_length, true)?;
        check_text(
            "NFT description",
            &nft.description,
            config.max_description_length,
            false,
        )?;
        if nft.owner.trim().is_empty() {
            return Err(NftError::InvalidInput("NFT owner is required".into()));
        }
        if nft.attributes.len() > config.max_attributes {
            return Err(NftError::InvalidMetadata(format!(
                "more than {} attributes",
                config.max_attributes
            )));
        }
        if nft.royalty_bps > config.max_royalty_bps {
            return Err(NftError::InvalidInput("royalty too high".into()));
        }
        Ok(())
    }

    pub fn nft_count(&self) -> usize {
        self.state.read().nfts.len()
    }
}

fn check_text(
    what: &str,
    value: &str,
    max: usize,
    required: bool,
) -> Result<(), NftError> {
    if required && value.trim().is_empty() {
        return Err(NftError::InvalidInput(format!("{what} is required")));
    }
    if value.chars().count() > max {
        return Err(NftError::InvalidInput(format!(
            "{what} exceeds {max} characters"
        )));
    }
    Ok(())
}

fn validate_request(config: &NftConfig, request: &MintRequest) -> Result<(), NftError> {
    check_text("NFT name", &request.name, config.max_name_length, true)?;
    check_text(
        "NFT description",
        &request.description,
        config.max_description_length,
        false,
    )?;
    if request.owner.trim().is_empty() {
        return Err(NftError::InvalidInput("NFT owner is required".into()));
    }
    if request.attributes.len() > config.max_attributes {
        return Err(NftError::InvalidMetadata(format!(
            "more than {} attributes",
            config.max_attributes
        )));
    }
    if request
        .attributes
        .iter()
        .any(|a| a.trait_type.trim().is_empty())
    {
        return Err(NftError::InvalidMetadata(
            "attribute trait_type is required".into(),
        ));
    }
    Ok(())
}

fn parse_metadata_document(json: &str) -> Result<MintRequest, NftError> {
    let doc: Value = if json.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(json).map_err(|e| NftError::InvalidMetadata(e.to_string()))?
    };
    let Value::Object(map) = doc else {
        return Err(NftError::InvalidMetadata(
            "metadata must be a JSON object".into(),
        ));
    };

    let mut request = MintRequest::default();
    for (key, value) in map {
        match key.as_str() {
            "name" => request.name = as_text(&value),
            "description" => request.description = as_text(&value),
            "image" | "image_url" => request.image_url = Some(as_text(&value)),
            "ipfs_hash" => request.ipfs_hash = Some(as_text(&value)),
            "transferable" => request.transferable = value.as_bool().unwrap_or(true),
            "attributes" => {
                request.attributes = parse_attributes(value)?;
            }
            _ => {
                request.metadata.insert(key, as_text(&value));
            }
        }
    }
    Ok(request)
}

fn parse_attributes(value: Value) -> Result<Vec<NftAttribute>, NftError> {
    let Value::Array(items) = value else {
        return Err(NftError::InvalidMetadata(
            "attributes must be an array".into(),
        ));
    };
    items
        .into_iter()
        .map(|item| {
            let trait_type = item
                .get("trait_type")
                .map(as_text)
                .ok_or_else(|| NftError::InvalidMetadata("attribute missing trait_type".into()))?;
            let value = item.get("value").map(as_text).unwrap_or_default();
            Ok(NftAttribute {
                trait_type,
                value,
                rarity: item.get("rarity").map(as_text),
                percentage: item.get("percentage").and_then(Value::as_f64),
            })
        })
        .collect()
}

/// Id of the collection `create_nft` mints into for `asset_id`. Explicit
/// collection ids are bare hex, so the prefix keeps the two apart.
pub fn implicit_collection_id(asset_id: &str) -> String {
    format!("asset:{asset_id}")
}

/// Strings stay bare; anything else keeps its JSON text.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Manager for NftManager {
    type Error = NftError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), NftError> {
        self.lifecycle.initialize()?;
        debug!("nft manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), NftError> {
        *self.state.write() = NftState::default();
        self.lifecycle.reset();
        debug!("nft manager shut down");
        Ok(())
    }
}
