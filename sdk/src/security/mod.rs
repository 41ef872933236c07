//! # Security
//!
//! Policies, an append-only audit trail with a hard cap, and the
//! primitives applications reach for most: Ed25519 signatures, sealed
//! boxes for a recipient's X25519 key, Argon2id password verifiers and
//! HMAC-signed bearer tokens.

pub mod manager;
pub mod token;
pub mod types;

pub use manager::SecurityManager;
pub use types::{
    AuditEntry, PolicyUpdate, SecurityConfig, SecurityError, SecurityPolicy, TokenClaims,
};
