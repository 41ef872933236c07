use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{EncryptionError, ExchangeError};
use crate::lifecycle::LifecycleError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantumError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("{algorithm} does not support {operation}")]
    Unsupported {
        algorithm: String,
        operation: &'static str,
    },

    #[error("invalid {what}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// One-time keys sign exactly once.
    #[error("one-time signing key has already been used")]
    KeyReused,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key already stored: {0}")]
    KeyExists(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantumConfig {
    pub default_algorithm: String,
    /// Refuse a second signature from the same one-time secret key.
    pub enforce_one_time_keys: bool,
}

impl Default for QuantumConfig {
    fn default() -> Self {
        Self {
            default_algorithm: super::algorithms::WOTS_SHA256_W16.to_string(),
            enforce_one_time_keys: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    pub name: String,
    pub security_level: u8,
    /// Public key size in bytes.
    pub key_size: usize,
    /// Zero for algorithms that do not sign.
    pub signature_size: usize,
    pub is_recommended: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_levels: BTreeSet<String>,
    pub tags: Vec<String>,
}

impl KeyMetadata {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            created_at: Utc::now(),
            expires_at: None,
            access_levels: BTreeSet::new(),
            tags: Vec::new(),
        }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn access_level(mut self, level: impl Into<String>) -> Self {
        self.access_levels.insert(level.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}
