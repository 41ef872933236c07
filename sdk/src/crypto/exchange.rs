//! # Sealed Boxes over X25519
//!
//! Anonymous public-key encryption: the sender makes a one-shot ephemeral
//! X25519 key, runs Diffie-Hellman against the recipient's static key,
//! and seals with AES-256-GCM under a BLAKE3-derived key.
//!
//! ```text
//! ephemeral_public (32) || nonce (12) || ciphertext+tag
//! ```
//!
//! The raw DH output is not uniform, so it always goes through BLAKE3's
//! `derive_key` mode with a caller-chosen context. The ephemeral public
//! key is authenticated as associated data, so swapping it out breaks the
//! tag even if the DH output happened to collide.

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use super::encryption::{decrypt_with_aad, encrypt_with_aad, EncryptionError};
use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

pub const X25519_KEY_LENGTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("invalid X25519 key: expected {X25519_KEY_LENGTH} bytes")]
    InvalidKey,

    #[error("sealed box too short")]
    TooShort,

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

/// A static X25519 keypair as raw bytes: `(secret, public)`.
pub fn generate_x25519_keypair() -> ([u8; X25519_KEY_LENGTH], [u8; X25519_KEY_LENGTH]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (secret.to_bytes(), public.to_bytes())
}

/// The public half of a static secret.
pub fn x25519_public_key(secret: &[u8; X25519_KEY_LENGTH]) -> [u8; X25519_KEY_LENGTH] {
    PublicKey::from(&StaticSecret::from(*secret)).to_bytes()
}

pub fn parse_x25519_key(bytes: &[u8]) -> Result<[u8; X25519_KEY_LENGTH], ExchangeError> {
    bytes.try_into().map_err(|_| ExchangeError::InvalidKey)
}

fn session_key(context: &str, shared: &[u8; 32]) -> [u8; AES_KEY_LENGTH] {
    blake3::derive_key(context, shared)
}

/// Seal `plaintext` so only the holder of `recipient`'s secret can open it.
pub fn seal(
    context: &str,
    recipient: &[u8; X25519_KEY_LENGTH],
    plaintext: &[u8],
) -> Result<Vec<u8>, ExchangeError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
    let key = session_key(context, shared.as_bytes());

    let sealed = encrypt_with_aad(&key, plaintext, &ephemeral_public)?;
    let mut out = Vec::with_capacity(X25519_KEY_LENGTH + sealed.len());
    out.extend_from_slice(&ephemeral_public);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a box produced by [`seal`] with the same `context`.
pub fn open(
    context: &str,
    secret: &[u8; X25519_KEY_LENGTH],
    data: &[u8],
) -> Result<Vec<u8>, ExchangeError> {
    if data.len() < X25519_KEY_LENGTH + AES_NONCE_LENGTH + AES_TAG_LENGTH {
        return Err(ExchangeError::TooShort);
    }
    let (ephemeral_public, sealed) = data.split_at(X25519_KEY_LENGTH);
    let ephemeral_public = parse_x25519_key(ephemeral_public)?;
    let shared = StaticSecret::from(*secret).diffie_hellman(&PublicKey::from(ephemeral_public));
    let key = session_key(context, shared.as_bytes());
    Ok(decrypt_with_aad(&key, sealed, &ephemeral_public)?)
}
