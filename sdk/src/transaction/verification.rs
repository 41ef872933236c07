//! Transaction verification: structural checks and signature validation.
//!
//! Checks run cheapest first: counts and sums before hashing, hashing
//! before signature verification.

use super::types::{estimate_size, Transaction, TransactionConfig, TransactionError};
use crate::crypto::keys::{SatoxPublicKey, SatoxSignature};

/// Structural validation against the configured limits.
///
/// 1. at least one input and one output;
/// 2. no zero-value outputs and no empty output address;
/// 3. fee within `[min_fee, max_fee]`;
/// 4. `Σoutputs + fee ≤ Σinputs` without overflow;
/// 5. estimated size within `max_size`;
/// 6. `txid` matches the canonical bytes.
pub fn validate_transaction(
    tx: &Transaction,
    config: &TransactionConfig,
) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        return Err(TransactionError::InvalidInput(
            "at least one input is required".into(),
        ));
    }
    if tx.outputs.is_empty() {
        return Err(TransactionError::InvalidInput(
            "at least one output is required".into(),
        ));
    }
    if let Some(bad) = tx.outputs.iter().find(|o| o.value == 0) {
        return Err(TransactionError::InvalidInput(format!(
            "output {} has zero value",
            bad.n
        )));
    }
    if tx.outputs.iter().any(|o| o.address.trim().is_empty()) {
        return Err(TransactionError::InvalidInput(
            "every output needs an address".into(),
        ));
    }
    if tx.inputs.iter().any(|i| i.txid.trim().is_empty()) {
        return Err(TransactionError::InvalidInput(
            "every input needs a previous txid".into(),
        ));
    }

    if tx.fee < config.min_fee || tx.fee > config.max_fee {
        return Err(TransactionError::FeeOutOfRange {
            fee: tx.fee,
            min: config.min_fee,
            max: config.max_fee,
        });
    }

    let available = tx.total_input().ok_or(TransactionError::Overflow)?;
    let required = tx
        .total_output()
        .and_then(|out| out.checked_add(tx.fee))
        .ok_or(TransactionError::Overflow)?;
    if required > available {
        return Err(TransactionError::InsufficientFunds {
            available,
            required,
        });
    }

    let size = estimate_size(tx.inputs.len(), tx.outputs.len());
    if size > config.max_size {
        return Err(TransactionError::TooLarge {
            size,
            max: config.max_size,
        });
    }

    let expected = tx.compute_txid();
    if expected != tx.txid {
        return Err(TransactionError::IdMismatch {
            expected,
            actual: tx.txid.clone(),
        });
    }
    Ok(())
}

/// Every signature must verify over the txid bytes, and every input that
/// names an address must be covered by a signer whose key hashes to it.
pub fn verify_signatures(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.signatures.is_empty() {
        return Err(TransactionError::MissingSignature(tx.txid.clone()));
    }
    let message = hex::decode(&tx.txid)
        .map_err(|_| TransactionError::InvalidInput("txid is not hex".into()))?;

    let mut signer_addresses = Vec::with_capacity(tx.signatures.len());
    for entry in &tx.signatures {
        let public_key = SatoxPublicKey::from_hex(&entry.public_key)
            .map_err(|e| TransactionError::InvalidSignature(e.to_string()))?;
        let signature = SatoxSignature::from_hex(&entry.signature)
            .map_err(|e| TransactionError::InvalidSignature(e.to_string()))?;
        if !public_key.verify(&message, &signature) {
            return Err(TransactionError::InvalidSignature(format!(
                "signature by {} does not verify",
                public_key.address()
            )));
        }
        signer_addresses.push(public_key.address());
    }

    for input in tx.inputs.iter().filter(|i| !i.address.is_empty()) {
        if !signer_addresses.contains(&input.address) {
            return Err(TransactionError::UnsignedInput(input.address.clone()));
        }
    }
    Ok(())
}
