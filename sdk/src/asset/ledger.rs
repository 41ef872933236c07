//! # Asset Ledger
//!
//! Per-asset, per-holder balances in base units. The ledger is the only
//! place balances change, and every change is checked arithmetic:
//!
//! - a debit never takes a holder below zero;
//! - a credit never wraps past `u64::MAX`;
//! - a transfer either moves the full amount or changes nothing.
//!
//! Zero balances are pruned so `holders()` only reports real holders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(
        "insufficient balance for {holder} in asset {asset_id}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        asset_id: String,
        holder: String,
        available: u64,
        requested: u64,
    },

    #[error("balance overflow for {holder} in asset {asset_id}")]
    Overflow { asset_id: String, holder: String },
}

/// Balances indexed by asset id, then holder address.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    balances: HashMap<String, HashMap<String, u64>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `holder` in `asset_id`; zero for unknown holders.
    pub fn balance(&self, asset_id: &str, holder: &str) -> u64 {
        self.balances
            .get(asset_id)
            .and_then(|h| h.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Add `amount` to a holder, returning the new balance.
    pub fn credit(&mut self, asset_id: &str, holder: &str, amount: u64) -> Result<u64, LedgerError> {
        let current = self.balance(asset_id, holder);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                asset_id: asset_id.to_string(),
                holder: holder.to_string(),
            })?;
        self.set(asset_id, holder, updated);
        Ok(updated)
    }

    /// Remove `amount` from a holder, returning the new balance.
    pub fn debit(&mut self, asset_id: &str, holder: &str, amount: u64) -> Result<u64, LedgerError> {
        let current = self.balance(asset_id, holder);
        let updated = current
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                asset_id: asset_id.to_string(),
                holder: holder.to_string(),
                available: current,
                requested: amount,
            })?;
        self.set(asset_id, holder, updated);
        Ok(updated)
    }

    /// Move `amount` from `from` to `to`. Both sides are checked before
    /// either is touched.
    pub fn transfer(
        &mut self,
        asset_id: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let available = self.balance(asset_id, from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset_id: asset_id.to_string(),
                holder: from.to_string(),
                available,
                requested: amount,
            });
        }
        if self.balance(asset_id, to).checked_add(amount).is_none() {
            return Err(LedgerError::Overflow {
                asset_id: asset_id.to_string(),
                holder: to.to_string(),
            });
        }

        self.debit(asset_id, from, amount)?;
        self.credit(asset_id, to, amount)?;
        Ok(())
    }

    /// All non-zero holdings of one address, keyed by asset id.
    pub fn holdings(&self, holder: &str) -> HashMap<String, u64> {
        self.balances
            .iter()
            .filter_map(|(asset_id, holders)| {
                holders.get(holder).map(|amount| (asset_id.clone(), *amount))
            })
            .collect()
    }

    /// All holders of one asset with their balances, sorted by address.
    pub fn holders(&self, asset_id: &str) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = self
            .balances
            .get(asset_id)
            .map(|h| h.iter().map(|(a, v)| (a.clone(), *v)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Sum of all balances in an asset. `u128` so it can never overflow.
    pub fn circulating(&self, asset_id: &str) -> u128 {
        self.balances
            .get(asset_id)
            .map(|h| h.values().map(|v| *v as u128).sum())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.balances.clear();
    }

    fn set(&mut self, asset_id: &str, holder: &str, amount: u64) {
        if amount == 0 {
            if let Some(holders) = self.balances.get_mut(asset_id) {
                holders.remove(holder);
                if holders.is_empty() {
                    self.balances.remove(asset_id);
                }
            }
            return;
        }
        self.balances
            .entry(asset_id.to_string())
            .or_default()
            .insert(holder.to_string(), amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_holder_has_zero_balance() {
        let ledger = Ledger::new();
        assert_eq!(ledger.balance("a", "alice"), 0);
    }

    #[test]
    fn credit_then_debit() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.credit("a", "alice", 100).unwrap(), 100);
        assert_eq!(ledger.debit("a", "alice", 40).unwrap(), 60);
        assert_eq!(ledger.balance("a", "alice"), 60);
    }

    #[test]
    fn overdraft_rejected_and_balance_untouched() {
        let mut ledger = Ledger::new();
        ledger.credit("a", "alice", 10).unwrap();
        let err = ledger.debit("a", "alice", 11).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                available: 10,
                requested: 11,
                ..
            }
        ));
        assert_eq!(ledger.balance("a", "alice"), 10);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut ledger = Ledger::new();
        ledger.credit("a", "alice", u64::MAX).unwrap();
        assert!(matches!(
            ledger.credit("a", "alice", 1),
            Err(LedgerError::Overflow { .. })
        ));
    }

    #[test]
    fn transfer_conserves_total() {
        let mut ledger = Ledger::new();
        ledger.credit("a", "alice", 1_000).unwrap();
        ledger.transfer("a", "alice", "bob", 300).unwrap();
        ledger.transfer("a", "bob", "carol", 100).unwrap();
        assert_eq!(ledger.balance("a", "alice"), 700);
        assert_eq!(ledger.balance("a", "bob"), 200);
        assert_eq!(ledger.balance("a", "carol"), 100);
        assert_eq!(ledger.circulating("a"), 1_000);
    }

    #[test]
    fn failed_transfer_changes_nothing() {
        let mut ledger = Ledger::new();
        ledger.credit("a", "alice", 5).unwrap();
        ledger.credit("a", "bob", u64::MAX).unwrap();
        assert!(ledger.transfer("a", "alice", "bob", 5).is_err());
        assert_eq!(ledger.balance("a", "alice"), 5);
        assert!(ledger.transfer("a", "alice", "carol", 6).is_err());
        assert_eq!(ledger.balance("a", "carol"), 0);
    }

    #[test]
    fn zero_balances_are_pruned() {
        let mut ledger = Ledger::new();
        ledger.credit("a", "alice", 5).unwrap();
        ledger.debit("a", "alice", 5).unwrap();
        assert!(ledger.holders("a").is_empty());
        assert!(ledger.holdings("alice").is_empty());
    }

    #[test]
    fn holdings_span_assets() {
        let mut ledger = Ledger::new();
        ledger.credit("a", "alice", 1).unwrap();
        ledger.credit("b", "alice", 2).unwrap();
        ledger.credit("b", "bob", 3).unwrap();
        let h = ledger.holdings("alice");
        assert_eq!(h.len(), 2);
        assert_eq!(h["b"], 2);
        assert_eq!(
            ledger.holders("b"),
            vec![("alice".to_string(), 2), ("bob".to_string(), 3)]
        );
    }
}
