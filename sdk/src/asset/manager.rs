//! The asset manager: registry, balances and transfer history for fungible
//! tokens.
//!
//! All state sits behind one `RwLock` so a transfer's ledger update and its
//! history entry land atomically with respect to readers.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::ledger::Ledger;
use super::types::{Asset, AssetConfig, AssetError, AssetTransfer, CreateAssetRequest};
use crate::crypto::hash::{long_id, short_id};
use crate::events::{EventBus, SdkEvent};
use crate::lifecycle::{Lifecycle, Manager};

/// History queries return at most this many entries unless asked otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default)]
struct AssetState {
    assets: HashMap<String, Asset>,
    /// Upper-cased symbol → asset id.
    symbols: HashMap<String, String>,
    ledger: Ledger,
    transfers: Vec<AssetTransfer>,
    transfer_seq: u64,
}

/// Lock-guarded, map-backed registry of fungible assets.
#[derive(Debug)]
pub struct AssetManager {
    lifecycle: Lifecycle,
    config: RwLock<AssetConfig>,
    state: RwLock<AssetState>,
    events: EventBus,
}

impl Default for AssetManager {
    fn default() -> Self {
        Self::new(AssetConfig::default())
    }
}

impl AssetManager {
    pub fn new(config: AssetConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("asset"),
            config: RwLock::new(config),
            state: RwLock::new(AssetState::default()),
            events: EventBus::default(),
        }
    }

    /// Publish events on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> AssetConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: AssetConfig) -> Result<(), AssetError> {
        self.lifecycle.ensure_ready()?;
        *self.config.write() = config;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Creation and lookup
    // -----------------------------------------------------------------------

    /// Register a new asset and credit its full supply to the owner.
    pub fn create_asset(&self, request: CreateAssetRequest) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        let config = self.config();

        let decimals = request.decimals.unwrap_or(config.default_decimals);
        let now = Utc::now();
        let asset = Asset {
            id: short_id(&[
                request.name.as_str(),
                request.symbol.as_str(),
                request.owner.as_str(),
            ]),
            name: request.name,
            symbol: request.symbol,
            description: request.description,
            owner: request.owner,
            total_supply: request.total_supply,
            decimals,
            reissuable: request.reissuable,
            transferable: true,
            divisible: decimals > 0,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };
        validate_with(&config, &asset)?;

        let mut state = self.state.write();
        if state.assets.contains_key(&asset.id) {
            return Err(AssetError::AssetExists(asset.id));
        }
        let symbol_key = asset.symbol.to_uppercase();
        if state.symbols.contains_key(&symbol_key) {
            return Err(AssetError::SymbolTaken(asset.symbol));
        }

        state
            .ledger
            .credit(&asset.id, &asset.owner, asset.total_supply)?;
        state.symbols.insert(symbol_key, asset.id.clone());
        state.assets.insert(asset.id.clone(), asset.clone());
        drop(state);

        info!(
            asset_id = %asset.id,
            symbol = %asset.symbol,
            supply = asset.total_supply,
            "asset created"
        );
        self.events.publish(SdkEvent::AssetCreated {
            asset_id: asset.id.clone(),
            symbol: asset.symbol.clone(),
            owner: asset.owner.clone(),
        });
        Ok(asset)
    }

    pub fn get_asset(&self, asset_id: &str) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        self.state
            .read()
            .assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))
    }

    pub fn get_asset_by_name(&self, name: &str) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        self.state
            .read()
            .assets
            .values()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(name.to_string()))
    }

    /// Symbols are matched case-insensitively.
    pub fn get_asset_by_symbol(&self, symbol: &str) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        state
            .symbols
            .get(&symbol.to_uppercase())
            .and_then(|id| state.assets.get(id))
            .cloned()
            .ok_or_else(|| AssetError::NotFound(symbol.to_string()))
    }

    /// Every asset, oldest first.
    pub fn list_assets(&self) -> Result<Vec<Asset>, AssetError> {
        self.lifecycle.ensure_ready()?;
        let mut assets: Vec<Asset> = self.state.read().assets.values().cloned().collect();
        assets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assets)
    }

    pub fn list_assets_by_owner(&self, owner: &str) -> Result<Vec<Asset>, AssetError> {
        Ok(self
            .list_assets()?
            .into_iter()
            .filter(|a| a.owner == owner)
            .collect())
    }

    /// Replace the description and merge `metadata` into the existing map.
    pub fn update_asset(
        &self,
        asset_id: &str,
        description: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        let config = self.config();
        let mut state = self.state.write();
        let asset = state
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;

        let mut updated = asset.clone();
        if let Some(description) = description {
            updated.description = description;
        }
        updated.metadata.extend(metadata);
        updated.updated_at = Utc::now();
        validate_with(&config, &updated)?;

        *asset = updated.clone();
        debug!(asset_id, "asset updated");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Transfers and balances
    // -----------------------------------------------------------------------

    /// Move `amount` base units of an asset between two holders.
    pub fn transfer_asset(
        &self,
        asset_id: &str,
        from: &str,
        to: &str,
        amount: u64,
        fee: u64,
    ) -> Result<AssetTransfer, AssetError> {
        self.lifecycle.ensure_ready()?;
        if amount == 0 {
            return Err(AssetError::InvalidInput(
                "transfer amount must be greater than zero".into(),
            ));
        }
        if from.is_empty() || to.is_empty() {
            return Err(AssetError::InvalidInput(
                "sender and recipient are required".into(),
            ));
        }
        if from == to {
            return Err(AssetError::InvalidInput(
                "sender and recipient must differ".into(),
            ));
        }

        let mut state = self.state.write();
        let asset = state
            .assets
            .get(asset_id)
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        if !asset.transferable {
            return Err(AssetError::NotTransferable(asset_id.to_string()));
        }

        state.ledger.transfer(asset_id, from, to, amount)?;

        state.transfer_seq += 1;
        let seq = state.transfer_seq.to_string();
        let amount_str = amount.to_string();
        let transfer = AssetTransfer {
            id: long_id(&[asset_id, from, to, amount_str.as_str(), seq.as_str()]),
            asset_id: asset_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            fee,
            timestamp: Utc::now(),
        };
        state.transfers.push(transfer.clone());
        drop(state);

        info!(asset_id, from, to, amount, "asset transferred");
        self.events.publish(SdkEvent::AssetTransferred {
            transfer_id: transfer.id.clone(),
            asset_id: transfer.asset_id.clone(),
            from: transfer.from.clone(),
            to: transfer.to.clone(),
            amount,
        });
        Ok(transfer)
    }

    /// Transfers of one asset, newest first. `None` means
    /// [`DEFAULT_HISTORY_LIMIT`].
    pub fn get_transfers(
        &self,
        asset_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AssetTransfer>, AssetError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        if !state.assets.contains_key(asset_id) {
            return Err(AssetError::NotFound(asset_id.to_string()));
        }
        Ok(state
            .transfers
            .iter()
            .rev()
            .filter(|t| t.asset_id == asset_id)
            .take(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .cloned()
            .collect())
    }

    /// Balance of `address` in one asset; zero for addresses that never held it.
    pub fn get_balance(&self, address: &str, asset_id: &str) -> Result<u64, AssetError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        if !state.assets.contains_key(asset_id) {
            return Err(AssetError::NotFound(asset_id.to_string()));
        }
        Ok(state.ledger.balance(asset_id, address))
    }

    pub fn get_balances(&self, address: &str) -> Result<HashMap<String, u64>, AssetError> {
        self.lifecycle.ensure_ready()?;
        Ok(self.state.read().ledger.holdings(address))
    }

    /// Every holder of an asset, sorted by address.
    pub fn get_holders(&self, asset_id: &str) -> Result<Vec<(String, u64)>, AssetError> {
        self.lifecycle.ensure_ready()?;
        Ok(self.state.read().ledger.holders(asset_id))
    }

    // -----------------------------------------------------------------------
    // Supply changes
    // -----------------------------------------------------------------------

    /// Mint more units to the owner of a reissuable asset.
    pub fn reissue_asset(&self, asset_id: &str, owner: &str, amount: u64) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        if amount == 0 {
            return Err(AssetError::InvalidInput(
                "reissue amount must be greater than zero".into(),
            ));
        }
        let max_supply = self.config.read().max_supply;

        let mut state = self.state.write();
        let asset = state
            .assets
            .get(asset_id)
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        if asset.owner != owner {
            return Err(AssetError::NotOwner {
                asset_id: asset_id.to_string(),
                caller: owner.to_string(),
            });
        }
        if !asset.reissuable {
            return Err(AssetError::NotReissuable(asset_id.to_string()));
        }
        let new_supply = asset
            .total_supply
            .checked_add(amount)
            .filter(|s| *s <= max_supply)
            .ok_or_else(|| AssetError::SupplyLimit {
                asset_id: asset_id.to_string(),
                max: max_supply,
            })?;

        state.ledger.credit(asset_id, owner, amount)?;
        let asset = state
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        asset.total_supply = new_supply;
        asset.updated_at = Utc::now();
        let asset = asset.clone();
        drop(state);

        info!(asset_id, amount, supply = new_supply, "asset reissued");
        Ok(asset)
    }

    /// Destroy units held by the owner, shrinking the supply.
    pub fn burn_asset(&self, asset_id: &str, owner: &str, amount: u64) -> Result<Asset, AssetError> {
        self.lifecycle.ensure_ready()?;
        if amount == 0 {
            return Err(AssetError::InvalidInput(
                "burn amount must be greater than zero".into(),
            ));
        }

        let mut state = self.state.write();
        let asset = state
            .assets
            .get(asset_id)
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        if asset.owner != owner {
            return Err(AssetError::NotOwner {
                asset_id: asset_id.to_string(),
                caller: owner.to_string(),
            });
        }

        state.ledger.debit(asset_id, owner, amount)?;
        let asset = state
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        // The debit succeeded, so the owner held at least `amount` of the supply.
        asset.total_supply -= amount;
        asset.updated_at = Utc::now();
        let asset = asset.clone();
        drop(state);

        info!(asset_id, amount, supply = asset.total_supply, "asset burned");
        Ok(asset)
    }

    /// Check an asset record against the current limits.
    pub fn validate_asset(&self, asset: &Asset) -> Result<(), AssetError> {
        validate_with(&self.config.read(), asset)
    }

    pub fn asset_count(&self) -> usize {
        self.state.read().assets.len()
    }
}

fn validate_with(config: &AssetConfig, asset: &Asset) -> Result<(), AssetError> {
    let invalid = |msg: String| Err(AssetError::InvalidInput(msg));

    if asset.name.trim().is_empty() {
        return invalid("asset name is required".into());
    }
    if asset.name.chars().count() > config.max_name_length {
        return invalid(format!(
            "asset name exceeds {} characters",
            config.max_name_length
        ));
    }
    if asset.symbol.trim().is_empty() {
        return invalid("asset symbol is required".into());
    }
    if asset.symbol.chars().count() > config.max_symbol_length {
        return invalid(format!(
            "asset symbol exceeds {} characters",
            config.max_symbol_length
        ));
    }
    if !asset.symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return invalid("asset symbol must be alphanumeric".into());
    }
    if asset.owner.trim().is_empty() {
        return invalid("asset owner is required".into());
    }
    if asset.description.chars().count() > config.max_description_length {
        return invalid(format!(
            "asset description exceeds {} characters",
            config.max_description_length
        ));
    }
    if asset.total_supply < config.min_supply || asset.total_supply > config.max_supply {
        return invalid(format!(
            "total supply must be between {} and {}",
            config.min_supply, config.max_supply
        ));
    }
    if asset.decimals > config.max_decimals {
        return invalid(format!(
            "decimals must be at most {}",
            config.max_decimals
        ));
    }
    Ok(())
}

impl Manager for AssetManager {
    type Error = AssetError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), AssetError> {
        self.lifecycle.initialize()?;
        debug!("asset manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), AssetError> {
        let mut state = self.state.write();
        state.assets.clear();
        state.symbols.clear();
        state.ledger.clear();
        state.transfers.clear();
        state.transfer_seq = 0;
        drop(state);
        self.lifecycle.reset();
        debug!("asset manager shut down");
        Ok(())
    }
}
