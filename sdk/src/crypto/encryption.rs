//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for wallet seeds, backups and the quantum key
//! store.
//!
//! ## Wire format
//!
//! `encrypt()` returns `nonce || ciphertext` where the nonce is 12 random
//! bytes and the ciphertext carries GCM's 16-byte tag at the end. Random
//! 96-bit nonces are safe for ~2^32 messages per key, far more than any
//! wallet will ever seal.
//!
//! ## Password-derived keys
//!
//! [`derive_key`] stretches a password with Argon2id into an AES key. The
//! salt travels next to the ciphertext; it is not secret.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, KDF_SALT_LENGTH};

/// Encryption failures. "Wrong key" and "tampered data" are intentionally
/// the same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed: wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Seal `plaintext` under `key` with a fresh random nonce.
///
/// ```
/// use satox_sdk::crypto::encryption::{decrypt, encrypt};
///
/// let key = [9u8; 32];
/// let sealed = encrypt(&key, b"seed bytes").unwrap();
/// assert_eq!(decrypt(&key, &sealed).unwrap(), b"seed bytes");
/// ```
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Open data produced by [`encrypt`].
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    decrypt_with_aad(key, data, &[])
}

/// Like [`encrypt`], additionally authenticating (not encrypting) `aad`.
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open data produced by [`encrypt_with_aad`]. The same `aad` is required.
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }
    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// [`encrypt`] with a runtime-checked key slice.
pub fn encrypt_checked(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let key: &[u8; AES_KEY_LENGTH] = key
        .try_into()
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    encrypt(key, plaintext)
}

/// [`decrypt`] with a runtime-checked key slice.
pub fn decrypt_checked(key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let key: &[u8; AES_KEY_LENGTH] = key
        .try_into()
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    decrypt(key, data)
}

/// Random salt for [`derive_key`].
pub fn generate_salt() -> [u8; KDF_SALT_LENGTH] {
    let mut salt = [0u8; KDF_SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Random AES-256 key.
pub fn generate_key() -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Argon2id password stretching into a 32-byte AES key.
pub fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; AES_KEY_LENGTH], EncryptionError> {
    let mut key = [0u8; AES_KEY_LENGTH];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| EncryptionError::KeyDerivation(e.to_string()))?;
    Ok(key)
}
