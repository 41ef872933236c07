//! The transaction manager: builds, signs, validates and tracks
//! transactions until they are confirmed.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::types::{
    estimate_size, Transaction, TransactionConfig, TransactionError, TxInput, TxOutput,
    TxSignature, TxStatus,
};
use super::verification;
use crate::crypto::SatoxKeypair;
use crate::events::{EventBus, SdkEvent};
use crate::lifecycle::{Lifecycle, Manager};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug)]
pub struct TransactionManager {
    lifecycle: Lifecycle,
    config: RwLock<TransactionConfig>,
    transactions: RwLock<HashMap<String, Transaction>>,
    events: EventBus,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(TransactionConfig::default())
    }
}

impl TransactionManager {
    pub fn new(config: TransactionConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("transaction"),
            config: RwLock::new(config),
            transactions: RwLock::new(HashMap::new()),
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> TransactionConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: TransactionConfig) -> Result<(), TransactionError> {
        self.lifecycle.ensure_ready()?;
        *self.config.write() = config;
        Ok(())
    }

    /// Build and register an unsigned transaction. Output indices are
    /// renumbered `0..n` in the order given.
    pub fn create_transaction(
        &self,
        inputs: Vec<TxInput>,
        mut outputs: Vec<TxOutput>,
        fee: u64,
    ) -> Result<Transaction, TransactionError> {
        self.lifecycle.ensure_ready()?;
        for (n, output) in outputs.iter_mut().enumerate() {
            output.n = n as u32;
        }

        let mut tx = Transaction {
            txid: String::new(),
            size: estimate_size(inputs.len(), outputs.len()),
            inputs,
            outputs,
            fee,
            status: TxStatus::Pending,
            confirmations: 0,
            block_hash: None,
            block_height: None,
            signatures: Vec::new(),
            created_at: Utc::now(),
        };
        tx.txid = tx.compute_txid();
        verification::validate_transaction(&tx, &self.config.read())?;

        let mut transactions = self.transactions.write();
        if transactions.contains_key(&tx.txid) {
            return Err(TransactionError::InvalidInput(format!(
                "duplicate transaction {}",
                tx.txid
            )));
        }
        transactions.insert(tx.txid.clone(), tx.clone());
        drop(transactions);

        debug!(txid = %tx.txid, inputs = tx.inputs.len(), outputs = tx.outputs.len(), "transaction created");
        Ok(tx)
    }

    pub fn get_transaction(&self, txid: &str) -> Result<Transaction, TransactionError> {
        self.lifecycle.ensure_ready()?;
        self.transactions
            .read()
            .get(txid)
            .cloned()
            .ok_or_else(|| TransactionError::NotFound(txid.to_string()))
    }

    /// Sign the txid with `keypair` and append the signature.
    pub fn sign_transaction(
        &self,
        txid: &str,
        keypair: &SatoxKeypair,
    ) -> Result<Transaction, TransactionError> {
        self.lifecycle.ensure_ready()?;
        let mut transactions = self.transactions.write();
        let tx = transactions
            .get_mut(txid)
            .ok_or_else(|| TransactionError::NotFound(txid.to_string()))?;
        if !matches!(tx.status, TxStatus::Pending | TxStatus::Signed) {
            return Err(TransactionError::InvalidStatus {
                txid: txid.to_string(),
                actual: tx.status,
                expected: TxStatus::Pending,
            });
        }
        let message = hex::decode(&tx.txid)
            .map_err(|_| TransactionError::InvalidInput("txid is not hex".into()))?;

        let public_key = keypair.public_key().to_hex();
        let signature = keypair.sign(&message).to_hex();
        match tx.signatures.iter_mut().find(|s| s.public_key == public_key) {
            Some(existing) => existing.signature = signature,
            None => tx.signatures.push(TxSignature {
                public_key,
                signature,
            }),
        }
        tx.status = TxStatus::Signed;
        debug!(txid, signatures = tx.signatures.len(), "transaction signed");
        Ok(tx.clone())
    }

    /// `Ok(true)` when every signature verifies and every input is covered.
    pub fn verify_signatures(&self, txid: &str) -> Result<bool, TransactionError> {
        let tx = self.get_transaction(txid)?;
        Ok(verification::verify_signatures(&tx).is_ok())
    }

    /// Mark a signed transaction as broadcast and hand it back for relay.
    /// A copy of a signed transaction that is ready to leave the node. The
    /// stored status is left untouched.
    pub fn prepare_broadcast(&self, txid: &str) -> Result<Transaction, TransactionError> {
        self.lifecycle.ensure_ready()?;
        let transactions = self.transactions.read();
        let tx = transactions
            .get(txid)
            .ok_or_else(|| TransactionError::NotFound(txid.to_string()))?;
        ready_to_broadcast(tx)?;
        Ok(tx.clone())
    }

    pub fn broadcast_transaction(&self, txid: &str) -> Result<Transaction, TransactionError> {
        self.lifecycle.ensure_ready()?;
        let mut transactions = self.transactions.write();
        let tx = transactions
            .get_mut(txid)
            .ok_or_else(|| TransactionError::NotFound(txid.to_string()))?;
        ready_to_broadcast(tx)?;
        tx.status = TxStatus::Broadcast;
        let tx = tx.clone();
        drop(transactions);

        info!(txid, fee = tx.fee, "transaction broadcast");
        self.events.publish(SdkEvent::TransactionSubmitted {
            txid: tx.txid.clone(),
        });
        Ok(tx)
    }

    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), TransactionError> {
        verification::validate_transaction(tx, &self.config.read())
    }

    /// Transactions touching `address`, newest first.
    pub fn get_transaction_history(
        &self,
        address: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, TransactionError> {
        self.lifecycle.ensure_ready()?;
        let mut history: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|tx| tx.involves(address))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.txid.cmp(&b.txid)));
        history.truncate(limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
        Ok(history)
    }

    /// Unconfirmed, non-failed transactions, oldest first.
    pub fn get_pending_transactions(&self) -> Result<Vec<Transaction>, TransactionError> {
        self.lifecycle.ensure_ready()?;
        let mut pending: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|tx| tx.confirmations == 0 && tx.status != TxStatus::Failed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.txid.cmp(&b.txid)));
        Ok(pending)
    }

    /// Record block inclusion. The status flips to `Confirmed` once the
    /// configured confirmation depth is reached.
    pub fn update_transaction_status(
        &self,
        txid: &str,
        confirmations: u32,
        block_hash: Option<String>,
        block_height: Option<u64>,
    ) -> Result<Transaction, TransactionError> {
        self.lifecycle.ensure_ready()?;
        let required = self.config.read().required_confirmations;
        let mut transactions = self.transactions.write();
        let tx = transactions
            .get_mut(txid)
            .ok_or_else(|| TransactionError::NotFound(txid.to_string()))?;
        tx.confirmations = confirmations;
        if block_hash.is_some() {
            tx.block_hash = block_hash;
        }
        if block_height.is_some() {
            tx.block_height = block_height;
        }
        if confirmations >= required && tx.status != TxStatus::Failed {
            tx.status = TxStatus::Confirmed;
        }
        Ok(tx.clone())
    }

    pub fn mark_failed(&self, txid: &str) -> Result<(), TransactionError> {
        self.lifecycle.ensure_ready()?;
        let mut transactions = self.transactions.write();
        let tx = transactions
            .get_mut(txid)
            .ok_or_else(|| TransactionError::NotFound(txid.to_string()))?;
        tx.status = TxStatus::Failed;
        Ok(())
    }

    /// `(148·inputs + 34·outputs + 10) · fee_rate`, clamped to the fee
    /// bounds.
    pub fn estimate_fee(&self, n_inputs: usize, n_outputs: usize) -> u64 {
        let config = self.config.read();
        let size = estimate_size(n_inputs, n_outputs) as u64;
        size.saturating_mul(config.fee_rate_per_byte)
            .clamp(config.min_fee, config.max_fee.max(config.min_fee))
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.read().len()
    }
}

impl Manager for TransactionManager {
    type Error = TransactionError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), TransactionError> {
        self.lifecycle.initialize()?;
        debug!("transaction manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), TransactionError> {
        self.transactions.write().clear();
        self.lifecycle.reset();
        debug!("transaction manager shut down");
        Ok(())
    }
}

fn ready_to_broadcast(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.status != TxStatus::Signed {
        return Err(TransactionError::InvalidStatus {
            txid: tx.txid.clone(),
            actual: tx.status,
            expected: TxStatus::Signed,
        });
    }
    verification::verify_signatures(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SatoxKeypair;

    fn manager() -> TransactionManager {
        let m = TransactionManager::default();
        m.initialize().unwrap();
        m
    }

    fn funded(keypair: &SatoxKeypair, amount: u64) -> Vec<TxInput> {
        vec![TxInput::new("00".repeat(32), 0, amount, keypair.address())]
    }

    #[test]
    fn create_assigns_txid_and_size() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        let tx = m
            .create_transaction(
                funded(&alice, 10_000),
                vec![
                    TxOutput::to_address("Sbob", 5_000),
                    TxOutput::to_address(alice.address(), 3_000),
                ],
                2_000,
            )
            .unwrap();
        assert_eq!(tx.txid, tx.compute_txid());
        assert_eq!(tx.txid.len(), 64);
        assert_eq!(tx.size, 148 + 2 * 34 + 10);
        assert_eq!(tx.outputs[1].n, 1);
        assert_eq!(tx.status, TxStatus::Pending);
    }

    #[test]
    fn outputs_plus_fee_must_fit_inputs() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        let err = m
            .create_transaction(
                funded(&alice, 5_000),
                vec![TxOutput::to_address("Sbob", 4_500)],
                1_000,
            )
            .unwrap_err();
        assert_eq!(
            err,
            TransactionError::InsufficientFunds {
                available: 5_000,
                required: 5_500
            }
        );
    }

    #[test]
    fn structural_checks() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        assert!(matches!(
            m.create_transaction(vec![], vec![TxOutput::to_address("Sbob", 1)], 1_000),
            Err(TransactionError::InvalidInput(_))
        ));
        assert!(matches!(
            m.create_transaction(funded(&alice, 10_000), vec![], 1_000),
            Err(TransactionError::InvalidInput(_))
        ));
        assert!(matches!(
            m.create_transaction(
                funded(&alice, 10_000),
                vec![TxOutput::to_address("Sbob", 1)],
                10
            ),
            Err(TransactionError::FeeOutOfRange { .. })
        ));
        let overflowing = vec![
            TxInput::new("aa", 0, u64::MAX, ""),
            TxInput::new("bb", 0, 1, ""),
        ];
        assert_eq!(
            m.create_transaction(overflowing, vec![TxOutput::to_address("Sbob", 1)], 1_000),
            Err(TransactionError::Overflow)
        );
    }

    #[test]
    fn sign_verify_broadcast() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        let tx = m
            .create_transaction(
                funded(&alice, 10_000),
                vec![TxOutput::to_address("Sbob", 8_000)],
                1_000,
            )
            .unwrap();

        assert!(matches!(
            m.broadcast_transaction(&tx.txid),
            Err(TransactionError::InvalidStatus {
                expected: TxStatus::Signed,
                ..
            })
        ));
        assert!(!m.verify_signatures(&tx.txid).unwrap());

        let signed = m.sign_transaction(&tx.txid, &alice).unwrap();
        assert_eq!(signed.status, TxStatus::Signed);
        assert_eq!(signed.txid, tx.txid);
        assert!(m.verify_signatures(&tx.txid).unwrap());

        let ready = m.prepare_broadcast(&tx.txid).unwrap();
        assert_eq!(ready.status, TxStatus::Signed);
        assert_eq!(m.get_transaction(&tx.txid).unwrap().status, TxStatus::Signed);

        let sent = m.broadcast_transaction(&tx.txid).unwrap();
        assert_eq!(sent.status, TxStatus::Broadcast);
        assert!(matches!(
            m.prepare_broadcast(&tx.txid),
            Err(TransactionError::InvalidStatus { actual: TxStatus::Broadcast, .. })
        ));
    }

    #[test]
    fn wrong_signer_does_not_cover_input() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        let mallory = SatoxKeypair::generate();
        let tx = m
            .create_transaction(
                funded(&alice, 10_000),
                vec![TxOutput::to_address("Smallory", 8_000)],
                1_000,
            )
            .unwrap();
        m.sign_transaction(&tx.txid, &mallory).unwrap();
        assert!(!m.verify_signatures(&tx.txid).unwrap());
        assert!(matches!(
            m.broadcast_transaction(&tx.txid),
            Err(TransactionError::UnsignedInput(_))
        ));
    }

    #[test]
    fn confirmation_threshold() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        let tx = m
            .create_transaction(
                funded(&alice, 10_000),
                vec![TxOutput::to_address("Sbob", 8_000)],
                1_000,
            )
            .unwrap();
        assert_eq!(m.get_pending_transactions().unwrap().len(), 1);

        let t = m
            .update_transaction_status(&tx.txid, 1, Some("ab".into()), Some(4))
            .unwrap();
        assert_ne!(t.status, TxStatus::Confirmed);
        assert_eq!(t.block_height, Some(4));
        assert!(m.get_pending_transactions().unwrap().is_empty());

        let t = m.update_transaction_status(&tx.txid, 6, None, None).unwrap();
        assert_eq!(t.status, TxStatus::Confirmed);
        assert_eq!(t.block_hash.as_deref(), Some("ab"));
    }

    #[test]
    fn history_filters_by_address() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        for _ in 0..3 {
            m.create_transaction(
                funded(&alice, 10_000),
                vec![TxOutput::to_address("Sbob", 8_000)],
                1_000,
            )
            .unwrap();
            // Distinct created_at keeps the txids distinct.
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(m.get_transaction_history("Sbob", None).unwrap().len(), 3);
        assert_eq!(m.get_transaction_history("Sbob", Some(2)).unwrap().len(), 2);
        assert!(m.get_transaction_history("Scarol", None).unwrap().is_empty());
    }

    #[test]
    fn fee_estimate_is_clamped() {
        let m = manager();
        assert_eq!(m.estimate_fee(1, 1), (148 + 34 + 10) * 10);
        assert_eq!(m.estimate_fee(0, 0), 1_000);
        assert_eq!(m.estimate_fee(1_000_000, 1_000_000), 100_000_000);
    }

    #[test]
    fn tampered_txid_fails_validation() {
        let m = manager();
        let alice = SatoxKeypair::generate();
        let mut tx = m
            .create_transaction(
                funded(&alice, 10_000),
                vec![TxOutput::to_address("Sbob", 8_000)],
                1_000,
            )
            .unwrap();
        tx.outputs[0].value = 8_500;
        assert!(matches!(
            m.validate_transaction(&tx),
            Err(TransactionError::IdMismatch { .. })
        ));
    }
}
