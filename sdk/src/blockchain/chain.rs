//! In-memory chain of validated blocks with hash and txid indexes.

use std::collections::HashMap;

use super::block::Block;

/// Where a confirmed transaction lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLocation {
    pub height: u64,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    by_hash: HashMap<[u8; 32], u64>,
    txs: HashMap<String, TxLocation>,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        let mut chain = Chain {
            blocks: Vec::new(),
            by_hash: HashMap::new(),
            txs: HashMap::new(),
        };
        chain.index(genesis);
        chain
    }

    /// Append a block after checking it is well-formed and extends the tip.
    pub fn append(&mut self, block: Block) -> Result<(), String> {
        self.check_extends_tip(&block)?;
        self.index(block);
        Ok(())
    }

    /// Integrity and linkage checks without appending.
    pub fn check_extends_tip(&self, block: &Block) -> Result<(), String> {
        block.verify()?;
        let tip = self.tip();
        if block.header.previous_hash != tip.header.hash {
            return Err(format!(
                "block {} does not extend tip {}",
                block.hash_hex(),
                tip.hash_hex()
            ));
        }
        if block.height() != tip.height() + 1 {
            return Err(format!(
                "block height {} does not follow tip height {}",
                block.height(),
                tip.height()
            ));
        }
        if let Some(dup) = block.transactions.iter().find(|tx| self.txs.contains_key(&tx.txid)) {
            return Err(format!("transaction {} is already in the chain", dup.txid));
        }
        Ok(())
    }

    /// Link check for a block that may sit anywhere in the chain, including
    /// blocks we already hold.
    pub fn check_known_parent(&self, block: &Block) -> Result<(), String> {
        block.verify()?;
        if block.height() == 0 {
            return if block.header.hash == self.blocks[0].header.hash {
                Ok(())
            } else {
                Err("genesis block does not match this network".to_string())
            };
        }
        let parent = self
            .by_hash
            .get(&block.header.previous_hash)
            .and_then(|h| self.get(*h))
            .ok_or_else(|| {
                format!(
                    "unknown parent {}",
                    block.header.previous_hash_hex()
                )
            })?;
        if block.height() != parent.height() + 1 {
            return Err(format!(
                "block height {} does not follow parent height {}",
                block.height(),
                parent.height()
            ));
        }
        Ok(())
    }

    fn index(&mut self, block: Block) {
        let height = block.height();
        self.by_hash.insert(block.header.hash, height);
        for (index, tx) in block.transactions.iter().enumerate() {
            self.txs.insert(tx.txid.clone(), TxLocation { height, index });
        }
        self.blocks.push(block);
    }

    pub fn tip(&self) -> &Block {
        // Never empty: constructed with a genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Height of the tip (genesis = 0).
    pub fn height(&self) -> u64 {
        self.tip().height()
    }

    pub fn get(&self, height: u64) -> Option<&Block> {
        usize::try_from(height).ok().and_then(|h| self.blocks.get(h))
    }

    pub fn get_by_hash(&self, hash: &[u8; 32]) -> Option<&Block> {
        self.by_hash.get(hash).and_then(|h| self.get(*h))
    }

    pub fn get_by_hash_hex(&self, hash: &str) -> Option<&Block> {
        let bytes = hex::decode(hash.trim()).ok()?;
        let hash: [u8; 32] = bytes.as_slice().try_into().ok()?;
        self.get_by_hash(&hash)
    }

    pub fn locate(&self, txid: &str) -> Option<TxLocation> {
        self.txs.get(txid).copied()
    }

    pub fn contains_tx(&self, txid: &str) -> bool {
        self.txs.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;

    #[test]
    fn starts_at_genesis() {
        let chain = Chain::new(Block::genesis(Network::Mainnet));
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.len(), 1);
        assert!(chain.get(0).is_some());
        assert!(chain.get(1).is_none());
    }

    #[test]
    fn append_requires_linkage() {
        let genesis = Block::genesis(Network::Mainnet);
        let mut chain = Chain::new(genesis.clone());
        let b1 = Block::new(&genesis, vec![], "p".into());
        chain.append(b1.clone()).unwrap();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.get_by_hash_hex(&b1.hash_hex()).unwrap(), &b1);

        // A sibling of b1 no longer extends the tip.
        let sibling = Block::with_timestamp(&genesis, vec![], "q".into(), 42);
        assert!(chain.append(sibling.clone()).is_err());
        assert!(chain.check_known_parent(&sibling).is_ok());
    }

    #[test]
    fn foreign_genesis_rejected() {
        let chain = Chain::new(Block::genesis(Network::Mainnet));
        assert!(chain
            .check_known_parent(&Block::genesis(Network::Testnet))
            .is_err());
    }
}
