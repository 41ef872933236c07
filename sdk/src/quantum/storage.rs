//! Encrypted key store.
//!
//! Secrets are sealed with AES-256-GCM under a master key, with the key id
//! as associated data so a ciphertext cannot be moved to another id.
//! Rotation keeps every previous version.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::algorithms::Algorithm;
use super::types::{KeyMetadata, QuantumError};
use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::{decrypt_with_aad, encrypt_with_aad, generate_key};

#[derive(Debug, Clone)]
struct StoredKey {
    /// Oldest first; the last entry is current.
    versions: Vec<Vec<u8>>,
    metadata: KeyMetadata,
}

impl StoredKey {
    fn current(&self) -> &[u8] {
        self.versions.last().map(Vec::as_slice).unwrap_or_default()
    }
}

pub struct KeyStorage {
    master_key: [u8; AES_KEY_LENGTH],
    keys: RwLock<HashMap<String, StoredKey>>,
}

impl std::fmt::Debug for KeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStorage")
            .field("keys", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for KeyStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn check_id(id: &str) -> Result<(), QuantumError> {
    if id.trim().is_empty() {
        return Err(QuantumError::InvalidInput("key id must not be empty".into()));
    }
    Ok(())
}

fn check_key(key: &[u8]) -> Result<(), QuantumError> {
    if key.is_empty() {
        return Err(QuantumError::InvalidInput("key must not be empty".into()));
    }
    Ok(())
}

impl KeyStorage {
    /// A store under a fresh random master key.
    pub fn new() -> Self {
        Self::with_master_key(generate_key())
    }

    pub fn with_master_key(master_key: [u8; AES_KEY_LENGTH]) -> Self {
        Self {
            master_key,
            keys: RwLock::new(HashMap::new()),
        }
    }

    fn seal(&self, id: &str, key: &[u8]) -> Result<Vec<u8>, QuantumError> {
        Ok(encrypt_with_aad(&self.master_key, key, id.as_bytes())?)
    }

    fn unseal(&self, id: &str, sealed: &[u8]) -> Result<Vec<u8>, QuantumError> {
        Ok(decrypt_with_aad(&self.master_key, sealed, id.as_bytes())?)
    }

    pub fn store_key(&self, id: &str, key: &[u8], metadata: KeyMetadata) -> Result<(), QuantumError> {
        check_id(id)?;
        check_key(key)?;
        let sealed = self.seal(id, key)?;
        let mut keys = self.keys.write();
        if keys.contains_key(id) {
            return Err(QuantumError::KeyExists(id.to_string()));
        }
        keys.insert(
            id.to_string(),
            StoredKey {
                versions: vec![sealed],
                metadata,
            },
        );
        debug!(id, "key stored");
        Ok(())
    }

    pub fn retrieve_key(&self, id: &str) -> Result<Vec<u8>, QuantumError> {
        check_id(id)?;
        let keys = self.keys.read();
        let stored = keys
            .get(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        self.unseal(id, stored.current())
    }

    pub fn delete_key(&self, id: &str) -> Result<(), QuantumError> {
        check_id(id)?;
        self.keys
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))
    }

    /// Replace the current version in place.
    pub fn update_key(&self, id: &str, key: &[u8]) -> Result<(), QuantumError> {
        check_id(id)?;
        check_key(key)?;
        let sealed = self.seal(id, key)?;
        let mut keys = self.keys.write();
        let stored = keys
            .get_mut(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        if let Some(current) = stored.versions.last_mut() {
            *current = sealed;
        }
        Ok(())
    }

    pub fn get_key_metadata(&self, id: &str) -> Result<KeyMetadata, QuantumError> {
        check_id(id)?;
        self.keys
            .read()
            .get(id)
            .map(|stored| stored.metadata.clone())
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))
    }

    pub fn set_key_metadata(&self, id: &str, metadata: KeyMetadata) -> Result<(), QuantumError> {
        check_id(id)?;
        let mut keys = self.keys.write();
        let stored = keys
            .get_mut(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        stored.metadata = metadata;
        Ok(())
    }

    /// Generate a new keypair for the key's algorithm, store the secret as
    /// the current version, and return the new public key.
    pub fn rotate_key(&self, id: &str) -> Result<Vec<u8>, QuantumError> {
        check_id(id)?;
        let mut keys = self.keys.write();
        let stored = keys
            .get_mut(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        let algorithm = Algorithm::from_name(&stored.metadata.algorithm)?;
        let (public, secret) = algorithm.generate_keypair();
        stored.versions.push(self.seal(id, &secret)?);
        stored.metadata.created_at = Utc::now();
        debug!(id, versions = stored.versions.len(), "key rotated");
        Ok(public)
    }

    /// Number of versions held for `id`, current included.
    pub fn key_versions(&self, id: &str) -> Result<usize, QuantumError> {
        check_id(id)?;
        self.keys
            .read()
            .get(id)
            .map(|stored| stored.versions.len())
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))
    }

    /// Re-seal the current version under a fresh nonce.
    pub fn reencrypt_key(&self, id: &str) -> Result<(), QuantumError> {
        check_id(id)?;
        let mut keys = self.keys.write();
        let stored = keys
            .get_mut(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        let plain = self.unseal(id, stored.current())?;
        let sealed = self.seal(id, &plain)?;
        if let Some(current) = stored.versions.last_mut() {
            *current = sealed;
        }
        Ok(())
    }

    /// True when the current version decrypts and authenticates.
    pub fn validate_key(&self, id: &str) -> Result<bool, QuantumError> {
        check_id(id)?;
        let keys = self.keys.read();
        let stored = keys
            .get(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        Ok(self
            .unseal(id, stored.current())
            .map(|plain| !plain.is_empty())
            .unwrap_or(false))
    }

    pub fn is_key_expired(&self, id: &str) -> Result<bool, QuantumError> {
        let metadata = self.get_key_metadata(id)?;
        Ok(metadata.expires_at.is_some_and(|at| at <= Utc::now()))
    }

    pub fn add_access_level(&self, id: &str, level: &str) -> Result<(), QuantumError> {
        check_id(id)?;
        if level.trim().is_empty() {
            return Err(QuantumError::InvalidInput("access level must not be empty".into()));
        }
        let mut keys = self.keys.write();
        let stored = keys
            .get_mut(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        stored.metadata.access_levels.insert(level.to_string());
        Ok(())
    }

    /// Returns whether the level was present.
    pub fn remove_access_level(&self, id: &str, level: &str) -> Result<bool, QuantumError> {
        check_id(id)?;
        let mut keys = self.keys.write();
        let stored = keys
            .get_mut(id)
            .ok_or_else(|| QuantumError::KeyNotFound(id.to_string()))?;
        Ok(stored.metadata.access_levels.remove(level))
    }

    pub fn has_access_level(&self, id: &str, level: &str) -> Result<bool, QuantumError> {
        Ok(self.get_key_metadata(id)?.access_levels.contains(level))
    }

    pub fn count_keys(&self) -> usize {
        self.keys.read().len()
    }

    /// Sorted.
    pub fn list_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.keys.write().clear();
    }
}
