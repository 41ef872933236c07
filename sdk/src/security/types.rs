use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{EncryptionError, ExchangeError, KeyError, PasswordError};
use crate::lifecycle::LifecycleError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("policy already exists: {0}")]
    PolicyExists(String),

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_audit_entries: usize,
    pub audit_enabled: bool,
    pub token_ttl_secs: i64,
    /// HMAC key for tokens. A random one is drawn at initialization when
    /// unset, which invalidates tokens across restarts.
    pub token_secret: Option<String>,
    /// Upper bound for `generate_random_bytes`.
    pub max_random_bytes: usize,
}

/// Ten years. Longer lifetimes are almost certainly a unit mistake.
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), SecurityError> {
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.token_ttl_secs) {
            return Err(SecurityError::InvalidInput(format!(
                "token_ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}"
            )));
        }
        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_audit_entries: 10_000,
            audit_enabled: true,
            token_ttl_secs: 3_600,
            token_secret: None,
            max_random_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rules: HashMap<String, String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a policy. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyUpdate {
    pub description: Option<String>,
    pub rules: Option<HashMap<String, String>>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub kind: String,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    pub jti: String,
}
