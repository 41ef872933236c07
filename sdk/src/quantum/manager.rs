use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::algorithms::Algorithm;
use super::storage::KeyStorage;
use super::types::{AlgorithmInfo, QuantumConfig, QuantumError};
use crate::crypto::exchange::{self, parse_x25519_key};
use crate::crypto::hash::blake3_hash;
use crate::lifecycle::{Lifecycle, Manager};

const HYBRID_CONTEXT: &str = "satox-sdk 2025-01 quantum hybrid encrypt";

#[derive(Debug, Default)]
struct QuantumState {
    /// BLAKE3 fingerprints of one-time secrets that have already signed.
    used_keys: HashSet<[u8; 32]>,
}

/// Post-quantum signatures, hybrid encryption and the encrypted key store.
///
/// Unlike the other managers, `initialize` and `shutdown` are idempotent.
#[derive(Debug)]
pub struct QuantumManager {
    lifecycle: Lifecycle,
    config: RwLock<QuantumConfig>,
    state: RwLock<QuantumState>,
    storage: KeyStorage,
}

impl Default for QuantumManager {
    fn default() -> Self {
        Self::new(QuantumConfig::default())
    }
}

impl QuantumManager {
    pub fn new(config: QuantumConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("quantum"),
            config: RwLock::new(config),
            state: RwLock::new(QuantumState::default()),
            storage: KeyStorage::new(),
        }
    }

    pub fn config(&self) -> QuantumConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: QuantumConfig) -> Result<(), QuantumError> {
        self.lifecycle.ensure_ready()?;
        Algorithm::from_name(&config.default_algorithm)?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn key_storage(&self) -> &KeyStorage {
        &self.storage
    }

    fn resolve(&self, name: &str) -> Result<Algorithm, QuantumError> {
        self.lifecycle.ensure_ready()?;
        Algorithm::from_name(name)
    }

    /// `(public, secret)`.
    pub fn generate_keypair(&self, algorithm: &str) -> Result<(Vec<u8>, Vec<u8>), QuantumError> {
        let algorithm = self.resolve(algorithm)?;
        let keypair = algorithm.generate_keypair();
        debug!(%algorithm, public_len = keypair.0.len(), "keypair generated");
        Ok(keypair)
    }

    pub fn sign(&self, algorithm: &str, secret: &[u8], data: &[u8]) -> Result<Vec<u8>, QuantumError> {
        let algorithm = self.resolve(algorithm)?;
        let signature = algorithm.sign(secret, data)?;

        if self.config.read().enforce_one_time_keys {
            let fingerprint = blake3_hash(secret);
            if !self.state.write().used_keys.insert(fingerprint) {
                warn!(%algorithm, "refusing to reuse one-time signing key");
                return Err(QuantumError::KeyReused);
            }
        }
        Ok(signature)
    }

    pub fn verify(
        &self,
        algorithm: &str,
        public: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, QuantumError> {
        self.resolve(algorithm)?.verify(public, data, signature)
    }

    /// Seal `data` to an X25519 public key.
    pub fn encrypt(&self, public: &[u8], data: &[u8]) -> Result<Vec<u8>, QuantumError> {
        self.lifecycle.ensure_ready()?;
        let recipient = parse_x25519_key(public)?;
        Ok(exchange::seal(HYBRID_CONTEXT, &recipient, data)?)
    }

    pub fn decrypt(&self, secret: &[u8], data: &[u8]) -> Result<Vec<u8>, QuantumError> {
        self.lifecycle.ensure_ready()?;
        let secret = parse_x25519_key(secret)?;
        Ok(exchange::open(HYBRID_CONTEXT, &secret, data)?)
    }

    pub fn get_algorithm_info(&self, algorithm: &str) -> Result<AlgorithmInfo, QuantumError> {
        Ok(self.resolve(algorithm)?.info())
    }

    pub fn available_algorithms(&self) -> Vec<String> {
        Algorithm::ALL.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn recommended_algorithms(&self) -> Vec<String> {
        Algorithm::ALL
            .iter()
            .filter(|a| a.info().is_recommended)
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn is_algorithm_available(&self, algorithm: &str) -> bool {
        Algorithm::from_name(algorithm).is_ok()
    }

    pub fn is_algorithm_recommended(&self, algorithm: &str) -> bool {
        Algorithm::from_name(algorithm)
            .map(|a| a.info().is_recommended)
            .unwrap_or(false)
    }

    pub fn security_level(&self, algorithm: &str) -> Result<u8, QuantumError> {
        Ok(self.get_algorithm_info(algorithm)?.security_level)
    }

    pub fn key_size(&self, algorithm: &str) -> Result<usize, QuantumError> {
        Ok(self.get_algorithm_info(algorithm)?.key_size)
    }

    pub fn signature_size(&self, algorithm: &str) -> Result<usize, QuantumError> {
        Ok(self.get_algorithm_info(algorithm)?.signature_size)
    }

    pub fn default_algorithm(&self) -> String {
        self.config.read().default_algorithm.clone()
    }

    pub fn set_default_algorithm(&self, algorithm: &str) -> Result<(), QuantumError> {
        let algorithm = self.resolve(algorithm)?;
        if !algorithm.can_sign() {
            return Err(QuantumError::Unsupported {
                algorithm: algorithm.name().to_string(),
                operation: "use as the default signature algorithm",
            });
        }
        self.config.write().default_algorithm = algorithm.name().to_string();
        info!(%algorithm, "default quantum algorithm changed");
        Ok(())
    }
}

impl Manager for QuantumManager {
    type Error = QuantumError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), QuantumError> {
        if self.lifecycle.is_initialized() {
            return Ok(());
        }
        Algorithm::from_name(&self.config.read().default_algorithm)?;
        self.lifecycle.initialize()?;
        debug!("quantum manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), QuantumError> {
        *self.state.write() = QuantumState::default();
        self.storage.clear();
        self.lifecycle.reset();
        debug!("quantum manager shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleError;
    use crate::quantum::algorithms::{HYBRID_X25519_AES256GCM, LAMPORT_SHA256, WOTS_SHA256_W16};
    use crate::quantum::types::KeyMetadata;

    fn manager() -> QuantumManager {
        let m = QuantumManager::default();
        m.initialize().unwrap();
        m
    }

    #[test]
    fn initialize_is_idempotent() {
        let m = QuantumManager::default();
        assert_eq!(
            m.generate_keypair(WOTS_SHA256_W16).unwrap_err(),
            QuantumError::Lifecycle(LifecycleError::NotInitialized("quantum"))
        );
        m.initialize().unwrap();
        m.initialize().unwrap();
        m.shutdown().unwrap();
        m.shutdown().unwrap();
        assert!(!m.is_initialized());
    }

    #[test]
    fn sign_and_verify_each_signature_algorithm() {
        let m = manager();
        for alg in [LAMPORT_SHA256, WOTS_SHA256_W16] {
            let (public, secret) = m.generate_keypair(alg).unwrap();
            assert_eq!(public.len(), m.key_size(alg).unwrap());
            let sig = m.sign(alg, &secret, b"transfer 10 SATOX").unwrap();
            assert_eq!(sig.len(), m.signature_size(alg).unwrap());
            assert!(m.verify(alg, &public, b"transfer 10 SATOX", &sig).unwrap());
            assert!(!m.verify(alg, &public, b"transfer 99 SATOX", &sig).unwrap());
        }
    }

    #[test]
    fn one_time_keys_sign_once() {
        let m = manager();
        let (_, secret) = m.generate_keypair(WOTS_SHA256_W16).unwrap();
        m.sign(WOTS_SHA256_W16, &secret, b"first").unwrap();
        assert_eq!(
            m.sign(WOTS_SHA256_W16, &secret, b"second"),
            Err(QuantumError::KeyReused)
        );

        let relaxed = QuantumManager::new(QuantumConfig {
            enforce_one_time_keys: false,
            ..QuantumConfig::default()
        });
        relaxed.initialize().unwrap();
        relaxed.sign(WOTS_SHA256_W16, &secret, b"first").unwrap();
        relaxed.sign(WOTS_SHA256_W16, &secret, b"second").unwrap();
    }

    #[test]
    fn hybrid_encryption() {
        let m = manager();
        let (public, secret) = m.generate_keypair(HYBRID_X25519_AES256GCM).unwrap();
        let sealed = m.encrypt(&public, b"wallet backup").unwrap();
        assert_eq!(m.decrypt(&secret, &sealed).unwrap(), b"wallet backup");

        let (_, other) = m.generate_keypair(HYBRID_X25519_AES256GCM).unwrap();
        assert!(m.decrypt(&other, &sealed).is_err());
        assert!(matches!(
            m.encrypt(&public[..31], b"x"),
            Err(QuantumError::Exchange(_))
        ));
    }

    #[test]
    fn algorithm_queries() {
        let m = manager();
        assert_eq!(m.available_algorithms().len(), 3);
        assert!(m.is_algorithm_available("lamport-sha256"));
        assert!(!m.is_algorithm_available("falcon-512"));
        assert!(!m.is_algorithm_recommended(LAMPORT_SHA256));
        assert!(m.recommended_algorithms().contains(&WOTS_SHA256_W16.to_string()));
        assert_eq!(m.security_level(LAMPORT_SHA256).unwrap(), 1);
        assert_eq!(m.get_algorithm_info(LAMPORT_SHA256).unwrap().signature_size, 8192);
        assert!(m.get_algorithm_info("rsa").is_err());
    }

    #[test]
    fn default_algorithm() {
        let m = manager();
        assert_eq!(m.default_algorithm(), WOTS_SHA256_W16);
        m.set_default_algorithm(LAMPORT_SHA256).unwrap();
        assert_eq!(m.default_algorithm(), LAMPORT_SHA256);
        assert!(m.set_default_algorithm(HYBRID_X25519_AES256GCM).is_err());
        assert!(m.set_default_algorithm("unknown").is_err());
    }

    #[test]
    fn shutdown_clears_key_storage() {
        let m = manager();
        m.key_storage()
            .store_key("k", b"v", KeyMetadata::new(WOTS_SHA256_W16))
            .unwrap();
        m.shutdown().unwrap();
        assert_eq!(m.key_storage().count_keys(), 0);
    }
}
