//! The security manager: policy registry, bounded audit trail, and the
//! signing, sealing, hashing and token primitives the C ABI exposes.

use std::collections::{HashMap, VecDeque};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use tracing::{debug, info, warn};

use super::token;
use super::types::{
    AuditEntry, PolicyUpdate, SecurityConfig, SecurityError, SecurityPolicy, TokenClaims,
};
use crate::crypto::exchange::{self, generate_x25519_keypair, parse_x25519_key};
use crate::crypto::hash::{sha256_hex, short_id};
use crate::crypto::{password, SatoxKeypair, SatoxPublicKey, SatoxSignature};
use crate::lifecycle::{Lifecycle, Manager};

const SEAL_CONTEXT: &str = "satox-sdk 2025-01 security encrypt_data";

#[derive(Debug, Default)]
struct SecurityState {
    policies: HashMap<String, SecurityPolicy>,
    audit: VecDeque<AuditEntry>,
    audit_seq: u64,
    token_secret: Vec<u8>,
}

#[derive(Debug)]
pub struct SecurityManager {
    lifecycle: Lifecycle,
    config: RwLock<SecurityConfig>,
    state: RwLock<SecurityState>,
}

impl Default for SecurityManager {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>, SecurityError> {
    hex::decode(value.trim()).map_err(|_| SecurityError::Decode(format!("{what} is not valid hex")))
}

impl SecurityManager {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("security"),
            config: RwLock::new(config),
            state: RwLock::new(SecurityState::default()),
        }
    }

    pub fn config(&self) -> SecurityConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: SecurityConfig) -> Result<(), SecurityError> {
        self.lifecycle.ensure_ready()?;
        config.validate()?;
        let mut state = self.state.write();
        if let Some(secret) = &config.token_secret {
            state.token_secret = secret.as_bytes().to_vec();
        }
        while state.audit.len() > config.max_audit_entries {
            state.audit.pop_front();
        }
        *self.config.write() = config;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Append to the audit trail, evicting the oldest entry at capacity.
    pub fn record_event(&self, kind: &str, message: &str, data: serde_json::Value) {
        let (enabled, cap) = {
            let config = self.config.read();
            (config.audit_enabled, config.max_audit_entries)
        };
        if !enabled || cap == 0 {
            return;
        }
        let mut state = self.state.write();
        state.audit_seq += 1;
        let entry = AuditEntry {
            id: state.audit_seq,
            kind: kind.to_string(),
            message: message.to_string(),
            data,
            timestamp: Utc::now(),
        };
        if state.audit.len() >= cap {
            state.audit.pop_front();
        }
        state.audit.push_back(entry);
    }

    /// The most recent `limit` entries (all when `None`), oldest first.
    pub fn get_audit_log(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        let skip = limit.map_or(0, |n| state.audit.len().saturating_sub(n));
        Ok(state.audit.iter().skip(skip).cloned().collect())
    }

    pub fn clear_audit_log(&self) -> Result<(), SecurityError> {
        self.lifecycle.ensure_ready()?;
        self.state.write().audit.clear();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    pub fn create_policy(
        &self,
        name: &str,
        description: &str,
        rules: HashMap<String, String>,
    ) -> Result<SecurityPolicy, SecurityError> {
        self.lifecycle.ensure_ready()?;
        if name.trim().is_empty() {
            return Err(SecurityError::InvalidInput("policy name is required".into()));
        }
        let now = Utc::now();
        let policy = SecurityPolicy {
            id: short_id(&["policy", name]),
            name: name.to_string(),
            description: description.to_string(),
            rules,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        {
            let mut state = self.state.write();
            if state.policies.values().any(|p| p.name == policy.name) {
                return Err(SecurityError::PolicyExists(policy.name));
            }
            state.policies.insert(policy.id.clone(), policy.clone());
        }
        self.record_event(
            "policy_created",
            &format!("policy {} created", policy.name),
            serde_json::json!({ "policy_id": policy.id }),
        );
        info!(policy_id = %policy.id, name, "security policy created");
        Ok(policy)
    }

    pub fn get_policy(&self, id: &str) -> Result<SecurityPolicy, SecurityError> {
        self.lifecycle.ensure_ready()?;
        self.state
            .read()
            .policies
            .get(id)
            .cloned()
            .ok_or_else(|| SecurityError::PolicyNotFound(id.to_string()))
    }

    pub fn list_policies(&self) -> Result<Vec<SecurityPolicy>, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let mut policies: Vec<_> = self.state.read().policies.values().cloned().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(policies)
    }

    pub fn update_policy(
        &self,
        id: &str,
        update: PolicyUpdate,
    ) -> Result<SecurityPolicy, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let policy = {
            let mut state = self.state.write();
            let policy = state
                .policies
                .get_mut(id)
                .ok_or_else(|| SecurityError::PolicyNotFound(id.to_string()))?;
            if let Some(description) = update.description {
                policy.description = description;
            }
            if let Some(rules) = update.rules {
                policy.rules = rules;
            }
            if let Some(enabled) = update.enabled {
                policy.enabled = enabled;
            }
            policy.updated_at = Utc::now();
            policy.clone()
        };
        self.record_event(
            "policy_updated",
            &format!("policy {} updated", policy.name),
            serde_json::json!({ "policy_id": id, "enabled": policy.enabled }),
        );
        Ok(policy)
    }

    pub fn delete_policy(&self, id: &str) -> Result<(), SecurityError> {
        self.lifecycle.ensure_ready()?;
        let removed = self
            .state
            .write()
            .policies
            .remove(id)
            .ok_or_else(|| SecurityError::PolicyNotFound(id.to_string()))?;
        self.record_event(
            "policy_deleted",
            &format!("policy {} deleted", removed.name),
            serde_json::json!({ "policy_id": id }),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Encoding and hashing
    // -----------------------------------------------------------------------

    pub fn generate_random_bytes(&self, len: usize) -> Result<Vec<u8>, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let max = self.config.read().max_random_bytes;
        if len == 0 || len > max {
            return Err(SecurityError::InvalidInput(format!(
                "random length must be between 1 and {max}"
            )));
        }
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Ok(bytes)
    }

    pub fn base64_encode(&self, data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn base64_decode(&self, data: &str) -> Result<Vec<u8>, SecurityError> {
        STANDARD
            .decode(data.trim())
            .map_err(|e| SecurityError::Decode(e.to_string()))
    }

    pub fn sha256(&self, data: &[u8]) -> String {
        sha256_hex(data)
    }

    // -----------------------------------------------------------------------
    // Signatures
    // -----------------------------------------------------------------------

    /// Fresh Ed25519 keypair as `(public_hex, secret_hex)`.
    pub fn generate_keypair(&self) -> Result<(String, String), SecurityError> {
        self.lifecycle.ensure_ready()?;
        let keypair = SatoxKeypair::generate();
        self.record_event(
            "keypair_generated",
            "ed25519 keypair generated",
            serde_json::json!({ "public_key": keypair.public_key().to_hex() }),
        );
        Ok((keypair.public_key().to_hex(), keypair.secret_key_hex()))
    }

    pub fn sign_data(&self, data: &[u8], secret_hex: &str) -> Result<String, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let keypair = SatoxKeypair::from_hex(secret_hex)?;
        let signature = keypair.sign(data).to_hex();
        self.record_event(
            "data_signed",
            "data signed",
            serde_json::json!({ "public_key": keypair.public_key().to_hex(), "bytes": data.len() }),
        );
        Ok(signature)
    }

    /// `Ok(false)` for a well-formed signature that does not verify;
    /// `Err` when the key or signature cannot be parsed.
    pub fn verify_signature(
        &self,
        data: &[u8],
        signature_hex: &str,
        public_hex: &str,
    ) -> Result<bool, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let public = SatoxPublicKey::from_hex(public_hex)?;
        let signature = SatoxSignature::from_hex(signature_hex)?;
        let valid = public.verify(data, &signature);
        if !valid {
            self.record_event(
                "signature_rejected",
                "signature verification failed",
                serde_json::json!({ "public_key": public.to_hex() }),
            );
        }
        Ok(valid)
    }

    // -----------------------------------------------------------------------
    // Encryption
    // -----------------------------------------------------------------------

    /// X25519 keypair for `encrypt_data` as `(public_hex, secret_hex)`.
    pub fn generate_encryption_keypair(&self) -> Result<(String, String), SecurityError> {
        self.lifecycle.ensure_ready()?;
        let (secret, public) = generate_x25519_keypair();
        Ok((hex::encode(public), hex::encode(secret)))
    }

    /// Seal for `recipient_public_hex`. Output is base64 of
    /// `ephemeral_public || nonce || ciphertext`.
    pub fn encrypt_data(
        &self,
        data: &[u8],
        recipient_public_hex: &str,
    ) -> Result<String, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let recipient = parse_x25519_key(&decode_hex("public key", recipient_public_hex)?)?;
        let sealed = exchange::seal(SEAL_CONTEXT, &recipient, data)?;
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt_data(&self, encoded: &str, secret_hex: &str) -> Result<Vec<u8>, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let secret = parse_x25519_key(&decode_hex("secret key", secret_hex)?)?;
        let sealed = self.base64_decode(encoded)?;
        match exchange::open(SEAL_CONTEXT, &secret, &sealed) {
            Ok(plaintext) => {
                self.record_event(
                    "data_decrypted",
                    "sealed data opened",
                    serde_json::json!({ "bytes": plaintext.len() }),
                );
                Ok(plaintext)
            }
            Err(e) => {
                warn!(error = %e, "failed to open sealed data");
                self.record_event("decrypt_failed", "sealed data rejected", serde_json::Value::Null);
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Passwords and tokens
    // -----------------------------------------------------------------------

    pub fn hash_password(&self, password: &str) -> Result<String, SecurityError> {
        self.lifecycle.ensure_ready()?;
        if password.is_empty() {
            return Err(SecurityError::InvalidInput("password is empty".into()));
        }
        Ok(password::hash_password(password)?)
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let ok = password::verify_password(password, hash)?;
        if !ok {
            self.record_event("password_rejected", "password verification failed", serde_json::Value::Null);
        }
        Ok(ok)
    }

    /// Issue a token for `subject`, valid for `ttl` or the configured
    /// default.
    pub fn generate_token(
        &self,
        subject: &str,
        ttl: Option<Duration>,
    ) -> Result<String, SecurityError> {
        self.lifecycle.ensure_ready()?;
        if subject.trim().is_empty() {
            return Err(SecurityError::InvalidInput("token subject is required".into()));
        }
        let ttl = match ttl {
            Some(ttl) => ttl,
            None => {
                let secs = self.config.read().token_ttl_secs;
                Duration::try_seconds(secs).ok_or_else(|| {
                    SecurityError::InvalidInput(format!("token lifetime of {secs}s is out of range"))
                })?
            }
        };
        let now = Utc::now();
        let expires = now.checked_add_signed(ttl).ok_or_else(|| {
            SecurityError::InvalidInput("token lifetime is out of range".into())
        })?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let signed = {
            let state = self.state.read();
            token::sign(&state.token_secret, &claims)?
        };
        self.record_event(
            "token_issued",
            &format!("token issued to {subject}"),
            serde_json::json!({ "jti": claims.jti, "exp": claims.exp }),
        );
        Ok(signed)
    }

    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, SecurityError> {
        self.lifecycle.ensure_ready()?;
        let result = {
            let state = self.state.read();
            token::verify(&state.token_secret, token, Utc::now().timestamp())
        };
        if let Err(e) = &result {
            self.record_event("token_rejected", &e.to_string(), serde_json::Value::Null);
        }
        result
    }
}

impl Manager for SecurityManager {
    type Error = SecurityError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), SecurityError> {
        self.config.read().validate()?;
        self.lifecycle.initialize()?;
        let secret = match self.config.read().token_secret.clone() {
            Some(secret) => secret.into_bytes(),
            None => {
                let mut bytes = vec![0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                bytes
            }
        };
        self.state.write().token_secret = secret;
        debug!("security manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), SecurityError> {
        *self.state.write() = SecurityState::default();
        self.lifecycle.reset();
        debug!("security manager shut down");
        Ok(())
    }
}
