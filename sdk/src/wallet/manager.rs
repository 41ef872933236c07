//! The wallet manager: named wallets, derived addresses, sealed seeds,
//! message signing and file backups.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::seed::{derive_address_keypair, generate_seed, SealedSeed, Seed};
use super::types::{
    Wallet, WalletAddress, WalletBackup, WalletConfig, WalletError, BACKUP_VERSION,
};
use crate::crypto::{hash_password, verify_password, SatoxKeypair, SatoxPublicKey, SatoxSignature};
use crate::events::{EventBus, SdkEvent};
use crate::lifecycle::{Lifecycle, Manager};

#[derive(Debug, Clone)]
struct WalletEntry {
    wallet: Wallet,
    seed: SealedSeed,
    password_hash: Option<String>,
}

#[derive(Debug)]
pub struct WalletManager {
    lifecycle: Lifecycle,
    config: RwLock<WalletConfig>,
    wallets: RwLock<HashMap<String, WalletEntry>>,
    events: EventBus,
}

impl Default for WalletManager {
    fn default() -> Self {
        Self::new(WalletConfig::default())
    }
}

impl WalletManager {
    pub fn new(config: WalletConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("wallet"),
            config: RwLock::new(config),
            wallets: RwLock::new(HashMap::new()),
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> WalletConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: WalletConfig) -> Result<(), WalletError> {
        self.lifecycle.ensure_ready()?;
        *self.config.write() = config;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Create / lookup / delete
    // -----------------------------------------------------------------------

    /// Create a wallet with one receiving address. An empty password leaves
    /// the seed unsealed.
    pub fn create_wallet(&self, name: &str, password: &str) -> Result<Wallet, WalletError> {
        self.lifecycle.ensure_ready()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::InvalidInput("wallet name is required".into()));
        }
        if !password.is_empty() && !self.config.read().encrypt_wallets {
            return Err(WalletError::InvalidInput(
                "wallet encryption is disabled".into(),
            ));
        }
        if self.name_taken(name) {
            return Err(WalletError::NameTaken(name.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let seed = generate_seed();
        let (sealed, password_hash) = seal(&seed, password, &id)?;

        let now = Utc::now();
        let wallet = Wallet {
            id: id.clone(),
            name: name.to_string(),
            addresses: vec![new_address(&seed, 0, "default", false)],
            balance: 0,
            unconfirmed_balance: 0,
            encrypted: sealed.is_encrypted(),
            created_at: now,
            last_used: now,
        };

        let mut wallets = self.wallets.write();
        // Re-check under the write lock.
        if wallets.values().any(|e| e.wallet.name == name) {
            return Err(WalletError::NameTaken(name.to_string()));
        }
        wallets.insert(
            id.clone(),
            WalletEntry {
                wallet: wallet.clone(),
                seed: sealed,
                password_hash,
            },
        );
        drop(wallets);

        info!(wallet_id = %id, name, encrypted = wallet.encrypted, "wallet created");
        self.events.publish(SdkEvent::WalletCreated {
            wallet_id: id,
            name: name.to_string(),
        });
        Ok(wallet)
    }

    pub fn get_wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        self.lifecycle.ensure_ready()?;
        self.wallets
            .read()
            .get(wallet_id)
            .map(|e| e.wallet.clone())
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))
    }

    pub fn get_wallet_by_name(&self, name: &str) -> Result<Wallet, WalletError> {
        self.lifecycle.ensure_ready()?;
        self.wallets
            .read()
            .values()
            .find(|e| e.wallet.name == name)
            .map(|e| e.wallet.clone())
            .ok_or_else(|| WalletError::NotFound(name.to_string()))
    }

    pub fn list_wallets(&self) -> Result<Vec<Wallet>, WalletError> {
        self.lifecycle.ensure_ready()?;
        let mut out: Vec<Wallet> = self
            .wallets
            .read()
            .values()
            .map(|e| e.wallet.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    /// Remove a wallet. Encrypted wallets need their password.
    pub fn delete_wallet(&self, wallet_id: &str, password: &str) -> Result<(), WalletError> {
        self.lifecycle.ensure_ready()?;
        let mut wallets = self.wallets.write();
        let entry = wallets
            .get(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        check_password(entry, password)?;
        wallets.remove(wallet_id);
        info!(wallet_id, "wallet deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Addresses and balances
    // -----------------------------------------------------------------------

    /// Derive the next address. Needs the password to reach the seed.
    pub fn generate_address(
        &self,
        wallet_id: &str,
        label: &str,
        is_change: bool,
        password: &str,
    ) -> Result<WalletAddress, WalletError> {
        self.lifecycle.ensure_ready()?;
        let max = self.config.read().max_addresses;
        let mut wallets = self.wallets.write();
        let entry = wallets
            .get_mut(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        if entry.wallet.addresses.len() >= max {
            return Err(WalletError::AddressLimit {
                wallet_id: wallet_id.to_string(),
                max,
            });
        }
        let seed = open_seed(entry, password)?;
        let index = entry.wallet.addresses.len() as u32;
        let address = new_address(&seed, index, label, is_change);
        entry.wallet.addresses.push(address.clone());
        entry.wallet.last_used = Utc::now();
        debug!(wallet_id, index, "address generated");
        Ok(address)
    }

    pub fn get_addresses(&self, wallet_id: &str) -> Result<Vec<WalletAddress>, WalletError> {
        Ok(self.get_wallet(wallet_id)?.addresses)
    }

    /// `(confirmed, unconfirmed)` balance in base units.
    pub fn get_balance(&self, wallet_id: &str) -> Result<(u64, u64), WalletError> {
        let wallet = self.get_wallet(wallet_id)?;
        Ok((wallet.balance, wallet.unconfirmed_balance))
    }

    pub fn update_balance(
        &self,
        wallet_id: &str,
        confirmed: u64,
        unconfirmed: u64,
    ) -> Result<(), WalletError> {
        self.lifecycle.ensure_ready()?;
        let mut wallets = self.wallets.write();
        let entry = wallets
            .get_mut(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        entry.wallet.balance = confirmed;
        entry.wallet.unconfirmed_balance = unconfirmed;
        entry.wallet.last_used = Utc::now();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Signing
    // -----------------------------------------------------------------------

    /// The signing keypair behind one of the wallet's addresses.
    pub fn keypair_for(
        &self,
        wallet_id: &str,
        address: &str,
        password: &str,
    ) -> Result<SatoxKeypair, WalletError> {
        self.lifecycle.ensure_ready()?;
        let wallets = self.wallets.read();
        let entry = wallets
            .get(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        let index = entry
            .wallet
            .addresses
            .iter()
            .find(|a| a.address == address)
            .map(|a| a.index)
            .ok_or_else(|| WalletError::UnknownAddress {
                wallet_id: wallet_id.to_string(),
                address: address.to_string(),
            })?;
        let seed = open_seed(entry, password)?;
        Ok(derive_address_keypair(&seed, index))
    }

    /// Sign `message` with an address key. Returns the hex signature.
    pub fn sign_message(
        &self,
        wallet_id: &str,
        address: &str,
        message: &[u8],
        password: &str,
    ) -> Result<String, WalletError> {
        let keypair = self.keypair_for(wallet_id, address, password)?;
        if let Some(entry) = self.wallets.write().get_mut(wallet_id) {
            entry.wallet.last_used = Utc::now();
        }
        Ok(keypair.sign(message).to_hex())
    }

    /// Check a hex signature against one of the wallet's addresses.
    pub fn verify_message(
        &self,
        wallet_id: &str,
        address: &str,
        message: &[u8],
        signature_hex: &str,
    ) -> Result<bool, WalletError> {
        let wallet = self.get_wallet(wallet_id)?;
        let addr = wallet
            .addresses
            .iter()
            .find(|a| a.address == address)
            .ok_or_else(|| WalletError::UnknownAddress {
                wallet_id: wallet_id.to_string(),
                address: address.to_string(),
            })?;
        let public_key = SatoxPublicKey::from_hex(&addr.public_key)
            .map_err(|e| WalletError::InvalidInput(e.to_string()))?;
        let signature =
            SatoxSignature::from_hex(signature_hex).map_err(|_| WalletError::InvalidSignature)?;
        Ok(public_key.verify(message, &signature))
    }

    // -----------------------------------------------------------------------
    // Encryption
    // -----------------------------------------------------------------------

    /// Seal an unencrypted wallet's seed under `password`.
    pub fn encrypt_wallet(&self, wallet_id: &str, password: &str) -> Result<(), WalletError> {
        self.lifecycle.ensure_ready()?;
        if password.is_empty() {
            return Err(WalletError::InvalidInput("password is required".into()));
        }
        let mut wallets = self.wallets.write();
        let entry = wallets
            .get_mut(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        if entry.wallet.encrypted {
            return Err(WalletError::AlreadyEncrypted(wallet_id.to_string()));
        }
        let seed = open_seed(entry, "")?;
        let (sealed, hash) = seal(&seed, password, wallet_id)?;
        entry.seed = sealed;
        entry.password_hash = hash;
        entry.wallet.encrypted = true;
        info!(wallet_id, "wallet encrypted");
        Ok(())
    }

    /// Remove the password from an encrypted wallet.
    pub fn decrypt_wallet(&self, wallet_id: &str, password: &str) -> Result<(), WalletError> {
        self.lifecycle.ensure_ready()?;
        let mut wallets = self.wallets.write();
        let entry = wallets
            .get_mut(wallet_id)
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        if !entry.wallet.encrypted {
            return Err(WalletError::NotEncrypted(wallet_id.to_string()));
        }
        let seed = open_seed(entry, password)?;
        entry.seed = SealedSeed::plain(&seed);
        entry.password_hash = None;
        entry.wallet.encrypted = false;
        info!(wallet_id, "wallet decrypted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backup / restore
    // -----------------------------------------------------------------------

    /// Write a bincode backup. The seed stays sealed.
    pub fn backup_wallet(&self, wallet_id: &str, path: impl AsRef<Path>) -> Result<(), WalletError> {
        self.lifecycle.ensure_ready()?;
        let path = path.as_ref();
        let backup = {
            let wallets = self.wallets.read();
            let entry = wallets
                .get(wallet_id)
                .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
            WalletBackup {
                version: BACKUP_VERSION,
                wallet: entry.wallet.clone(),
                seed: entry.seed.clone(),
                password_hash: entry.password_hash.clone(),
                created_at: Utc::now(),
            }
        };
        let bytes =
            bincode::serialize(&backup).map_err(|e| WalletError::CorruptBackup(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| WalletError::BackupIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, bytes).map_err(|source| WalletError::BackupIo {
            path: path.to_path_buf(),
            source,
        })?;
        info!(wallet_id, path = %path.display(), "wallet backed up");
        Ok(())
    }

    /// Load a backup as a new wallet with a fresh id and the given name.
    /// Encrypted backups need their original password.
    pub fn restore_wallet(
        &self,
        path: impl AsRef<Path>,
        name: &str,
        password: &str,
    ) -> Result<Wallet, WalletError> {
        self.lifecycle.ensure_ready()?;
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| WalletError::BackupIo {
            path: path.to_path_buf(),
            source,
        })?;
        let backup: WalletBackup =
            bincode::deserialize(&bytes).map_err(|e| WalletError::CorruptBackup(e.to_string()))?;
        if backup.version != BACKUP_VERSION {
            return Err(WalletError::CorruptBackup(format!(
                "unsupported backup version {}",
                backup.version
            )));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::InvalidInput("wallet name is required".into()));
        }
        if self.name_taken(name) {
            return Err(WalletError::NameTaken(name.to_string()));
        }

        let old = WalletEntry {
            wallet: backup.wallet,
            seed: backup.seed,
            password_hash: backup.password_hash,
        };
        let seed = open_seed(&old, password)?;

        // The old id is bound into the sealed seed, so re-seal under the new one.
        let id = Uuid::new_v4().to_string();
        let (sealed, password_hash) = if old.wallet.encrypted {
            (
                SealedSeed::seal(&seed, password, &id)?,
                old.password_hash.clone(),
            )
        } else {
            (SealedSeed::plain(&seed), None)
        };

        let mut wallet = old.wallet;
        wallet.id = id.clone();
        wallet.name = name.to_string();
        wallet.last_used = Utc::now();

        let mut wallets = self.wallets.write();
        if wallets.values().any(|e| e.wallet.name == name) {
            return Err(WalletError::NameTaken(name.to_string()));
        }
        wallets.insert(
            id.clone(),
            WalletEntry {
                wallet: wallet.clone(),
                seed: sealed,
                password_hash,
            },
        );
        drop(wallets);
        info!(wallet_id = %id, name, "wallet restored");
        Ok(wallet)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.wallets.read().values().any(|e| e.wallet.name == name)
    }
}

fn new_address(seed: &Seed, index: u32, label: &str, is_change: bool) -> WalletAddress {
    let keypair = derive_address_keypair(seed, index);
    WalletAddress {
        address: keypair.address(),
        public_key: keypair.public_key().to_hex(),
        label: label.to_string(),
        is_change,
        index,
        balance: 0,
        unconfirmed: 0,
    }
}

fn seal(seed: &Seed, password: &str, wallet_id: &str) -> Result<(SealedSeed, Option<String>), WalletError> {
    if password.is_empty() {
        return Ok((SealedSeed::plain(seed), None));
    }
    let sealed = SealedSeed::seal(seed, password, wallet_id)?;
    Ok((sealed, Some(hash_password(password)?)))
}

fn check_password(entry: &WalletEntry, password: &str) -> Result<(), WalletError> {
    match &entry.password_hash {
        Some(hash) if !verify_password(password, hash)? => {
            warn!(wallet_id = %entry.wallet.id, "wrong wallet password");
            Err(WalletError::InvalidPassword)
        }
        _ => Ok(()),
    }
}

fn open_seed(entry: &WalletEntry, password: &str) -> Result<Seed, WalletError> {
    check_password(entry, password)?;
    entry
        .seed
        .open(password, &entry.wallet.id)
        .map_err(|_| WalletError::InvalidPassword)
}

impl Manager for WalletManager {
    type Error = WalletError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), WalletError> {
        self.lifecycle.initialize()?;
        debug!("wallet manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), WalletError> {
        self.wallets.write().clear();
        self.lifecycle.reset();
        debug!("wallet manager shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::is_valid_address;
    use crate::lifecycle::LifecycleError;

    fn manager() -> WalletManager {
        let m = WalletManager::default();
        m.initialize().unwrap();
        m
    }

    #[test]
    fn requires_initialize() {
        let m = WalletManager::default();
        assert!(matches!(
            m.create_wallet("main", ""),
            Err(WalletError::Lifecycle(LifecycleError::NotInitialized(
                "wallet"
            )))
        ));
    }

    #[test]
    fn create_generates_first_address() {
        let m = manager();
        let w = m.create_wallet("main", "").unwrap();
        assert!(!w.encrypted);
        assert_eq!(w.addresses.len(), 1);
        assert!(is_valid_address(&w.addresses[0].address));
        assert_eq!(m.get_wallet_by_name("main").unwrap().id, w.id);
        assert!(Uuid::parse_str(&w.id).is_ok());
    }

    #[test]
    fn names_are_unique() {
        let m = manager();
        m.create_wallet("main", "").unwrap();
        assert!(matches!(
            m.create_wallet("main", "pw"),
            Err(WalletError::NameTaken(_))
        ));
    }

    #[test]
    fn addresses_need_password_on_encrypted_wallet() {
        let m = manager();
        let w = m.create_wallet("vault", "s3cret").unwrap();
        assert!(w.encrypted);
        assert!(matches!(
            m.generate_address(&w.id, "rent", false, "nope"),
            Err(WalletError::InvalidPassword)
        ));
        let addr = m.generate_address(&w.id, "rent", true, "s3cret").unwrap();
        assert_eq!(addr.index, 1);
        assert!(addr.is_change);
        assert_eq!(m.get_addresses(&w.id).unwrap().len(), 2);
    }

    #[test]
    fn address_limit_enforced() {
        let m = WalletManager::new(WalletConfig {
            max_addresses: 2,
            ..Default::default()
        });
        m.initialize().unwrap();
        let w = m.create_wallet("small", "").unwrap();
        m.generate_address(&w.id, "", false, "").unwrap();
        assert!(matches!(
            m.generate_address(&w.id, "", false, ""),
            Err(WalletError::AddressLimit { max: 2, .. })
        ));
    }

    #[test]
    fn sign_and_verify_message() {
        let m = manager();
        let w = m.create_wallet("signer", "pw").unwrap();
        let address = w.addresses[0].address.clone();
        let sig = m.sign_message(&w.id, &address, b"hello", "pw").unwrap();
        assert!(m.verify_message(&w.id, &address, b"hello", &sig).unwrap());
        assert!(!m.verify_message(&w.id, &address, b"bye", &sig).unwrap());
        assert!(matches!(
            m.sign_message(&w.id, "Snotmine", b"hello", "pw"),
            Err(WalletError::UnknownAddress { .. })
        ));
    }

    #[test]
    fn delete_checks_password() {
        let m = manager();
        let w = m.create_wallet("vault", "pw").unwrap();
        assert!(matches!(
            m.delete_wallet(&w.id, "bad"),
            Err(WalletError::InvalidPassword)
        ));
        m.delete_wallet(&w.id, "pw").unwrap();
        assert!(matches!(m.get_wallet(&w.id), Err(WalletError::NotFound(_))));
    }

    #[test]
    fn encrypt_then_decrypt() {
        let m = manager();
        let w = m.create_wallet("plain", "").unwrap();
        let address = w.addresses[0].address.clone();

        m.encrypt_wallet(&w.id, "pw").unwrap();
        assert!(m.get_wallet(&w.id).unwrap().encrypted);
        assert!(matches!(
            m.encrypt_wallet(&w.id, "pw2"),
            Err(WalletError::AlreadyEncrypted(_))
        ));
        assert!(matches!(
            m.decrypt_wallet(&w.id, "wrong"),
            Err(WalletError::InvalidPassword)
        ));

        // Same seed, same address key.
        let before = m.keypair_for(&w.id, &address, "pw").unwrap();
        m.decrypt_wallet(&w.id, "pw").unwrap();
        let after = m.keypair_for(&w.id, &address, "").unwrap();
        assert_eq!(before.public_key(), after.public_key());
        assert!(matches!(
            m.decrypt_wallet(&w.id, "pw"),
            Err(WalletError::NotEncrypted(_))
        ));
    }

    #[test]
    fn balances_roundtrip() {
        let m = manager();
        let w = m.create_wallet("b", "").unwrap();
        m.update_balance(&w.id, 500, 20).unwrap();
        assert_eq!(m.get_balance(&w.id).unwrap(), (500, 20));
    }

    #[test]
    fn backup_and_restore_keep_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backups").join("w.bin");

        let m = manager();
        let w = m.create_wallet("original", "pw").unwrap();
        let address = w.addresses[0].address.clone();
        m.backup_wallet(&w.id, &path).unwrap();

        assert!(matches!(
            m.restore_wallet(&path, "copy", "bad"),
            Err(WalletError::InvalidPassword)
        ));
        let restored = m.restore_wallet(&path, "copy", "pw").unwrap();
        assert_ne!(restored.id, w.id);
        assert_eq!(restored.name, "copy");
        assert!(restored.encrypted);

        let original_key = m.keypair_for(&w.id, &address, "pw").unwrap();
        let restored_key = m.keypair_for(&restored.id, &address, "pw").unwrap();
        assert_eq!(original_key.public_key(), restored_key.public_key());
    }

    #[test]
    fn concurrent_restores_claim_a_name_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.bin");
        let m = std::sync::Arc::new(manager());
        let w = m.create_wallet("source", "").unwrap();
        m.backup_wallet(&w.id, &path).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                let path = path.clone();
                std::thread::spawn(move || m.restore_wallet(&path, "twin", ""))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, WalletError::NameTaken(_))));
        let twins = m
            .list_wallets()
            .unwrap()
            .into_iter()
            .filter(|w| w.name == "twin")
            .count();
        assert_eq!(twins, 1);
        assert!(matches!(
            m.restore_wallet(&path, "source", ""),
            Err(WalletError::NameTaken(_))
        ));
    }

    #[test]
    fn corrupt_backup_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"definitely not bincode").unwrap();
        let m = manager();
        assert!(matches!(
            m.restore_wallet(&path, "x", ""),
            Err(WalletError::CorruptBackup(_))
        ));
    }
}
