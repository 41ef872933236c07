//! The blockchain manager: a local validated chain, a pending pool and
//! the queries the rest of the SDK asks about them.
//!
//! `produce_block` is local block assembly. It does not mine, vote or
//! evaluate scripts.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::block::{Block, BlockInfo};
use super::chain::Chain;
use super::types::{BlockchainConfig, BlockchainError, NetworkInfo, TransactionInfo};
use crate::events::{EventBus, SdkEvent};
use crate::lifecycle::{Lifecycle, LifecycleError, Manager};
use crate::transaction::Transaction;

#[derive(Debug, Default)]
struct ChainState {
    chain: Option<Chain>,
    pending: Vec<Transaction>,
    pending_ids: HashSet<String>,
    last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct BlockchainManager {
    lifecycle: Lifecycle,
    config: RwLock<BlockchainConfig>,
    state: RwLock<ChainState>,
    events: EventBus,
}

impl Default for BlockchainManager {
    fn default() -> Self {
        Self::new(BlockchainConfig::default())
    }
}

impl BlockchainManager {
    pub fn new(config: BlockchainConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("blockchain"),
            config: RwLock::new(config),
            state: RwLock::new(ChainState::default()),
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> BlockchainConfig {
        self.config.read().clone()
    }

    /// Replace the configuration. Switching networks rebuilds the chain
    /// from the new network's genesis.
    pub fn update_config(&self, config: BlockchainConfig) -> Result<(), BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let network_changed = self.config.read().network != config.network;
        if network_changed {
            let mut state = self.state.write();
            *state = ChainState {
                chain: Some(Chain::new(Block::genesis(config.network))),
                ..Default::default()
            };
            info!(network = %config.network, "network changed, chain reset to genesis");
        }
        *self.config.write() = config;
        Ok(())
    }

    /// Run `f` against the chain once the manager is ready.
    fn with_chain<T>(
        &self,
        f: impl FnOnce(&Chain) -> Result<T, BlockchainError>,
    ) -> Result<T, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        let chain = state
            .chain
            .as_ref()
            .ok_or(BlockchainError::Lifecycle(LifecycleError::NotInitialized("blockchain")))?;
        f(chain)
    }

    pub fn get_block_height(&self) -> Result<u64, BlockchainError> {
        self.with_chain(|chain| Ok(chain.height()))
    }

    pub fn get_best_block_hash(&self) -> Result<String, BlockchainError> {
        self.with_chain(|chain| Ok(chain.tip().hash_hex()))
    }

    pub fn get_block_hash(&self, height: u64) -> Result<String, BlockchainError> {
        self.with_chain(|chain| {
            chain
                .get(height)
                .map(Block::hash_hex)
                .ok_or_else(|| BlockchainError::BlockNotFound(format!("height {height}")))
        })
    }

    pub fn get_block(&self, hash: &str) -> Result<Block, BlockchainError> {
        self.with_chain(|chain| {
            chain
                .get_by_hash_hex(hash)
                .cloned()
                .ok_or_else(|| BlockchainError::BlockNotFound(hash.to_string()))
        })
    }

    pub fn get_block_info(&self, hash: &str) -> Result<BlockInfo, BlockchainError> {
        self.with_chain(|chain| {
            chain
                .get_by_hash_hex(hash)
                .map(|block| BlockInfo::from_block(block, chain.height()))
                .ok_or_else(|| BlockchainError::BlockNotFound(hash.to_string()))
        })
    }

    /// Accepts a hash or a decimal height.
    pub fn get_block_info_by_id(&self, id: &str) -> Result<BlockInfo, BlockchainError> {
        match id.parse::<u64>() {
            Ok(height) if id.len() < 64 => {
                let hash = self.get_block_hash(height)?;
                self.get_block_info(&hash)
            }
            _ => self.get_block_info(id),
        }
    }

    /// Looks in the chain first, then the pending pool.
    pub fn get_transaction_info(&self, txid: &str) -> Result<TransactionInfo, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        if let Some(chain) = state.chain.as_ref() {
            if let Some(loc) = chain.locate(txid) {
                if let Some(block) = chain.get(loc.height) {
                    if let Some(tx) = block.transactions.get(loc.index) {
                        return Ok(TransactionInfo {
                            txid: txid.to_string(),
                            block_hash: Some(block.hash_hex()),
                            block_height: Some(loc.height),
                            confirmations: chain.height() - loc.height + 1,
                            transaction: tx.clone(),
                        });
                    }
                }
            }
        }
        state
            .pending
            .iter()
            .find(|tx| tx.txid == txid)
            .map(|tx| TransactionInfo {
                txid: txid.to_string(),
                block_hash: None,
                block_height: None,
                confirmations: 0,
                transaction: tx.clone(),
            })
            .ok_or_else(|| BlockchainError::TransactionNotFound(txid.to_string()))
    }

    /// Add a JSON-encoded transaction to the pending pool.
    pub fn submit_transaction(&self, raw: &[u8]) -> Result<String, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let tx: Transaction =
            serde_json::from_slice(raw).map_err(|e| BlockchainError::Decode(e.to_string()))?;
        self.submit(tx)
    }

    /// Add an already-decoded transaction to the pending pool.
    pub fn submit(&self, tx: Transaction) -> Result<String, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let expected = tx.compute_txid();
        if expected != tx.txid {
            return Err(BlockchainError::InvalidTransaction(format!(
                "txid mismatch: expected {expected}, got {}",
                tx.txid
            )));
        }
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "transaction needs inputs and outputs".into(),
            ));
        }

        let mut state = self.state.write();
        let in_chain = state
            .chain
            .as_ref()
            .map(|c| c.contains_tx(&tx.txid))
            .unwrap_or(false);
        if in_chain || state.pending_ids.contains(&tx.txid) {
            return Err(BlockchainError::DuplicateTransaction(tx.txid));
        }
        let txid = tx.txid.clone();
        state.pending_ids.insert(txid.clone());
        state.pending.push(tx);
        drop(state);

        debug!(%txid, "transaction accepted into pending pool");
        Ok(txid)
    }

    pub fn pending_transactions(&self) -> Result<Vec<Transaction>, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        Ok(self.state.read().pending.clone())
    }

    /// Seal up to `max_block_transactions` pending transactions, oldest
    /// first, into a new tip block.
    pub fn produce_block(&self, producer: &str) -> Result<BlockInfo, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let limit = self.config.read().max_block_transactions;

        let mut state = self.state.write();
        let take = state.pending.len().min(limit);
        let batch: Vec<Transaction> = state.pending.drain(..take).collect();
        for tx in &batch {
            state.pending_ids.remove(&tx.txid);
        }

        let chain = state
            .chain
            .as_mut()
            .ok_or(BlockchainError::Lifecycle(LifecycleError::NotInitialized("blockchain")))?;
        let block = Block::new(chain.tip(), batch, producer.to_string());
        chain
            .append(block.clone())
            .map_err(BlockchainError::InvalidBlock)?;
        let info = BlockInfo::from_block(&block, chain.height());
        drop(state);

        info!(
            height = info.height,
            hash = %info.hash,
            txs = info.transactions.len(),
            "block produced"
        );
        self.events.publish(SdkEvent::BlockProduced {
            height: info.height,
            hash: info.hash.clone(),
            tx_count: info.transactions.len(),
        });
        Ok(info)
    }

    /// Decode a JSON block and check its hash, Merkle root and parent
    /// linkage against the local chain. Nothing is stored.
    pub fn validate_block(&self, raw: &[u8]) -> Result<Block, BlockchainError> {
        let block: Block =
            serde_json::from_slice(raw).map_err(|e| BlockchainError::Decode(e.to_string()))?;
        self.with_chain(|chain| {
            chain
                .check_known_parent(&block)
                .map_err(BlockchainError::InvalidBlock)
        })?;
        Ok(block)
    }

    /// Append a JSON block that extends the current tip. Its transactions
    /// leave the pending pool.
    pub fn import_block(&self, raw: &[u8]) -> Result<BlockInfo, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let block: Block =
            serde_json::from_slice(raw).map_err(|e| BlockchainError::Decode(e.to_string()))?;

        let mut state = self.state.write();
        let ChainState {
            chain,
            pending,
            pending_ids,
            ..
        } = &mut *state;
        let chain = chain.as_mut().ok_or(BlockchainError::Lifecycle(LifecycleError::NotInitialized("blockchain")))?;
        chain
            .append(block.clone())
            .map_err(BlockchainError::InvalidBlock)?;
        let included: HashSet<&str> = block.transactions.iter().map(|t| t.txid.as_str()).collect();
        pending.retain(|tx| !included.contains(tx.txid.as_str()));
        pending_ids.retain(|id| !included.contains(id.as_str()));
        let info = BlockInfo::from_block(&block, chain.height());
        drop(state);

        info!(height = info.height, hash = %info.hash, "block imported");
        Ok(info)
    }

    pub fn get_network_info(&self) -> Result<NetworkInfo, BlockchainError> {
        let config = self.config();
        let (height, best_block_hash) =
            self.with_chain(|chain| Ok((chain.height(), chain.tip().hash_hex())))?;
        let state = self.state.read();
        Ok(NetworkInfo {
            network: config.network,
            height,
            best_block_hash,
            pending_transactions: state.pending.len(),
            rpc_port: config.rpc_port,
            p2p_port: config.p2p_port,
            sync_mode: config.sync_mode,
            max_peers: config.max_peers,
            last_sync: state.last_sync,
        })
    }

    /// Record a sync round. Without a remote peer protocol this only
    /// stamps the time and reports the local height.
    pub fn sync_with_network(&self) -> Result<u64, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        let now = Utc::now();
        let height = {
            let mut state = self.state.write();
            state.last_sync = Some(now);
            state.chain.as_ref().map(Chain::height).unwrap_or(0)
        };
        debug!(height, "sync round completed");
        self.events
            .publish(SdkEvent::SyncCompleted { height, at: now });
        Ok(height)
    }

    pub fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>, BlockchainError> {
        self.lifecycle.ensure_ready()?;
        Ok(self.state.read().last_sync)
    }
}

impl Manager for BlockchainManager {
    type Error = BlockchainError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), BlockchainError> {
        self.lifecycle.initialize()?;
        let network = self.config.read().network;
        *self.state.write() = ChainState {
            chain: Some(Chain::new(Block::genesis(network))),
            ..Default::default()
        };
        info!(%network, "blockchain manager initialized at genesis");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), BlockchainError> {
        *self.state.write() = ChainState::default();
        self.lifecycle.reset();
        debug!("blockchain manager shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::transaction::{TxInput, TxOutput, TxStatus};

    fn manager() -> BlockchainManager {
        let m = BlockchainManager::default();
        m.initialize().unwrap();
        m
    }

    fn tx(seed: u8) -> Transaction {
        let mut tx = Transaction {
            txid: String::new(),
            inputs: vec![TxInput::new(hex::encode([seed; 32]), 0, 5_000, "")],
            outputs: vec![TxOutput::to_address("Sbob", 1_000)],
            fee: 1_000,
            size: 192,
            status: TxStatus::Broadcast,
            confirmations: 0,
            block_hash: None,
            block_height: None,
            signatures: Vec::new(),
            created_at: Utc::now(),
        };
        tx.txid = tx.compute_txid();
        tx
    }

    #[test]
    fn starts_at_genesis() {
        let m = manager();
        assert_eq!(m.get_block_height().unwrap(), 0);
        assert_eq!(
            m.get_best_block_hash().unwrap(),
            Block::genesis(Network::Mainnet).hash_hex()
        );
        assert_eq!(m.get_block_hash(0).unwrap(), m.get_best_block_hash().unwrap());
        assert!(matches!(
            m.get_block_hash(1),
            Err(BlockchainError::BlockNotFound(_))
        ));
    }

    #[test]
    fn uninitialized_queries_fail() {
        let m = BlockchainManager::default();
        assert!(matches!(
            m.get_block_height(),
            Err(BlockchainError::Lifecycle(_))
        ));
    }

    #[test]
    fn submit_then_produce() {
        let m = manager();
        let t = tx(1);
        let raw = serde_json::to_vec(&t).unwrap();
        assert_eq!(m.submit_transaction(&raw).unwrap(), t.txid);
        assert!(matches!(
            m.submit_transaction(&raw),
            Err(BlockchainError::DuplicateTransaction(_))
        ));
        assert_eq!(m.get_transaction_info(&t.txid).unwrap().confirmations, 0);

        let info = m.produce_block("node-1").unwrap();
        assert_eq!(info.height, 1);
        assert_eq!(info.transactions, vec![t.txid.clone()]);
        assert!(m.pending_transactions().unwrap().is_empty());

        m.produce_block("node-1").unwrap();
        let found = m.get_transaction_info(&t.txid).unwrap();
        assert_eq!(found.block_height, Some(1));
        assert_eq!(found.confirmations, 2);
        assert_eq!(found.block_hash.as_deref(), Some(info.hash.as_str()));

        // Already in the chain.
        assert!(matches!(
            m.submit_transaction(&raw),
            Err(BlockchainError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn block_size_limit_respected() {
        let m = BlockchainManager::new(BlockchainConfig {
            max_block_transactions: 2,
            ..Default::default()
        });
        m.initialize().unwrap();
        for seed in 1..=3 {
            m.submit(tx(seed)).unwrap();
        }
        assert_eq!(m.produce_block("p").unwrap().transactions.len(), 2);
        assert_eq!(m.pending_transactions().unwrap().len(), 1);
    }

    #[test]
    fn tampered_txid_rejected() {
        let m = manager();
        let mut t = tx(1);
        t.fee += 1;
        assert!(matches!(
            m.submit(t),
            Err(BlockchainError::InvalidTransaction(_))
        ));
        assert!(matches!(
            m.submit_transaction(b"not json"),
            Err(BlockchainError::Decode(_))
        ));
    }

    #[test]
    fn validate_and_import_blocks() {
        let producer = manager();
        let follower = manager();

        producer.submit(tx(9)).unwrap();
        let info = producer.produce_block("p").unwrap();
        let block = producer.get_block(&info.hash).unwrap();
        let raw = serde_json::to_vec(&block).unwrap();

        assert!(follower.validate_block(&raw).is_ok());
        let imported = follower.import_block(&raw).unwrap();
        assert_eq!(imported.hash, info.hash);
        assert_eq!(follower.get_block_height().unwrap(), 1);

        let mut forged = block.clone();
        forged.header.producer = "forger".into();
        let raw = serde_json::to_vec(&forged).unwrap();
        assert!(matches!(
            follower.validate_block(&raw),
            Err(BlockchainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn block_info_by_height_or_hash() {
        let m = manager();
        let b1 = m.produce_block("p").unwrap();
        assert_eq!(m.get_block_info_by_id("1").unwrap().hash, b1.hash);
        assert_eq!(m.get_block_info_by_id(&b1.hash).unwrap().height, 1);
    }

    #[test]
    fn sync_records_time() {
        let m = manager();
        assert!(m.get_last_sync_time().unwrap().is_none());
        assert_eq!(m.sync_with_network().unwrap(), 0);
        assert!(m.get_last_sync_time().unwrap().is_some());
        let info = m.get_network_info().unwrap();
        assert!(info.last_sync.is_some());
        assert_eq!(info.p2p_port, 60777);
    }

    #[test]
    fn switching_network_resets_chain() {
        let m = manager();
        m.produce_block("p").unwrap();
        m.update_config(BlockchainConfig {
            network: Network::Testnet,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(m.get_block_height().unwrap(), 0);
        assert_eq!(
            m.get_best_block_hash().unwrap(),
            Block::genesis(Network::Testnet).hash_hex()
        );
    }
}
