//! # Cryptographic Primitives
//!
//! Shared building blocks for every manager that touches keys or digests.
//! Nothing here is invented: Ed25519 (ed25519-dalek) signs, AES-256-GCM
//! (aes-gcm) seals, X25519 (x25519-dalek) agrees on keys, Argon2id
//! (argon2) stretches passwords, SHA-256 and BLAKE3 hash. The modules are thin, typed wrappers so the rest of the SDK
//! never handles raw cipher APIs.

pub mod encryption;
pub mod exchange;
pub mod hash;
pub mod keys;
pub mod password;

pub use encryption::{decrypt, derive_key, encrypt, EncryptionError};
pub use exchange::{generate_x25519_keypair, ExchangeError};
pub use hash::{
    blake3_hash, double_sha256, long_id, merkle_root, sha256, sha256_array, sha256_hex, short_id,
};
pub use keys::{
    address_from_public_key, is_valid_address, validate_address, KeyError, SatoxKeypair,
    SatoxPublicKey, SatoxSignature,
};
pub use password::{hash_password, verify_password, PasswordError};
