//! # Keys & Addresses
//!
//! Ed25519 keypairs for signing, plus the address encoding that turns a
//! public key into something a human can paste into a form.
//!
//! ## Address format
//!
//! ```text
//! payload  = sha256(public_key)[..20]
//! checksum = sha256(sha256(payload))[..4]
//! address  = "S" + base58(payload || checksum)
//! ```
//!
//! The checksum catches typos; the `S` prefix makes it obvious which chain
//! an address belongs to. Secret key bytes never appear in `Debug` output
//! and are never logged.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::hash::{double_sha256, sha256_array};
use crate::config::{
    ADDRESS_CHECKSUM_LENGTH, ADDRESS_PAYLOAD_LENGTH, ADDRESS_PREFIX, SIGNATURE_LENGTH,
    SIGNING_KEY_LENGTH, VERIFYING_KEY_LENGTH,
};

/// Key and address failures. Deliberately vague about the secret side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

// ---------------------------------------------------------------------------
// SatoxKeypair
// ---------------------------------------------------------------------------

/// An Ed25519 signing keypair.
///
/// Not `Serialize` on purpose: exporting a secret should be a visible
/// `secret_key_bytes()` call, not a side effect of JSON-encoding a struct.
pub struct SatoxKeypair {
    signing_key: SigningKey,
}

impl SatoxKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SIGNING_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded 32-byte secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SIGNING_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> SatoxPublicKey {
        SatoxPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The address derived from this keypair's public key.
    pub fn address(&self) -> String {
        self.public_key().address()
    }

    pub fn sign(&self, message: &[u8]) -> SatoxSignature {
        SatoxSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &SatoxSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret key bytes. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SIGNING_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key_bytes())
    }
}

impl Clone for SatoxKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for SatoxKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SatoxKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// SatoxPublicKey
// ---------------------------------------------------------------------------

/// The shareable half of a keypair.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SatoxPublicKey {
    bytes: [u8; VERIFYING_KEY_LENGTH],
}

impl SatoxPublicKey {
    /// Build from a slice, rejecting bytes that are not a curve point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; VERIFYING_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_LENGTH] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn address(&self) -> String {
        address_from_public_key(&self.bytes)
    }

    /// `false` on any failure: bad point, wrong signature length, mismatch.
    pub fn verify(&self, message: &[u8], signature: &SatoxSignature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(sig) = signature.to_dalek() else {
            return false;
        };
        key.verify(message, &sig).is_ok()
    }
}

impl fmt::Display for SatoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SatoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SatoxPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// SatoxSignature
// ---------------------------------------------------------------------------

/// A 64-byte Ed25519 signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatoxSignature {
    bytes: Vec<u8>,
}

impl SatoxSignature {
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidSignature)?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    fn to_dalek(&self) -> Option<DalekSignature> {
        let arr: [u8; SIGNATURE_LENGTH] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }
}

impl fmt::Display for SatoxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SatoxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "SatoxSignature({}..)", &hex_str[..hex_str.len().min(8)])
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Encode a public key as a Satox address.
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let digest = sha256_array(public_key);
    let payload = &digest[..ADDRESS_PAYLOAD_LENGTH];
    let checksum = double_sha256(payload);

    let mut raw = Vec::with_capacity(ADDRESS_PAYLOAD_LENGTH + ADDRESS_CHECKSUM_LENGTH);
    raw.extend_from_slice(payload);
    raw.extend_from_slice(&checksum[..ADDRESS_CHECKSUM_LENGTH]);

    format!("{ADDRESS_PREFIX}{}", bs58::encode(raw).into_string())
}

/// Check prefix, base58 alphabet, payload length and checksum.
pub fn validate_address(address: &str) -> Result<(), KeyError> {
    let invalid = || KeyError::InvalidAddress(address.to_string());

    let body = address.strip_prefix(ADDRESS_PREFIX).ok_or_else(invalid)?;
    let raw = bs58::decode(body).into_vec().map_err(|_| invalid())?;
    if raw.len() != ADDRESS_PAYLOAD_LENGTH + ADDRESS_CHECKSUM_LENGTH {
        return Err(invalid());
    }

    let (payload, checksum) = raw.split_at(ADDRESS_PAYLOAD_LENGTH);
    if double_sha256(payload)[..ADDRESS_CHECKSUM_LENGTH] != *checksum {
        return Err(invalid());
    }
    Ok(())
}

pub fn is_valid_address(address: &str) -> bool {
    validate_address(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = SatoxKeypair::generate();
        let sig = kp.sign(b"transfer 10 SATOX");
        assert!(kp.verify(b"transfer 10 SATOX", &sig));
        assert!(!kp.verify(b"transfer 11 SATOX", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let a = SatoxKeypair::generate();
        let b = SatoxKeypair::generate();
        let sig = a.sign(b"msg");
        assert!(!b.verify(b"msg", &sig));
    }

    #[test]
    fn from_seed_is_deterministic() {
        let seed = [7u8; 32];
        assert_eq!(
            SatoxKeypair::from_seed(&seed).public_key(),
            SatoxKeypair::from_seed(&seed).public_key()
        );
    }

    #[test]
    fn hex_roundtrip() {
        let kp = SatoxKeypair::generate();
        let restored = SatoxKeypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
        assert!(SatoxKeypair::from_hex("deadbeef").is_err());
        assert!(SatoxKeypair::from_hex("zz").is_err());
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert_eq!(
            SatoxPublicKey::try_from_slice(&[0u8; 16]),
            Err(KeyError::InvalidPublicKey)
        );
    }

    #[test]
    fn signature_hex_roundtrip() {
        let kp = SatoxKeypair::generate();
        let sig = kp.sign(b"x");
        assert_eq!(SatoxSignature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert!(SatoxSignature::from_hex("abcd").is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let kp = SatoxKeypair::generate();
        let dbg = format!("{kp:?}");
        assert!(dbg.starts_with("SatoxKeypair(pub="));
        assert!(!dbg.contains(&kp.secret_key_hex()));
    }

    #[test]
    fn derived_address_validates() {
        let kp = SatoxKeypair::generate();
        let addr = kp.address();
        assert!(addr.starts_with('S'));
        assert!(is_valid_address(&addr));
    }

    #[test]
    fn corrupted_address_fails_checksum() {
        let addr = SatoxKeypair::from_seed(&[1u8; 32]).address();
        let mut chars: Vec<char> = addr.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '1' { '2' } else { '1' };
        let corrupted: String = chars.into_iter().collect();
        assert!(!is_valid_address(&corrupted));
    }

    #[test]
    fn address_without_prefix_rejected() {
        assert!(matches!(
            validate_address("Xabc"),
            Err(KeyError::InvalidAddress(_))
        ));
        assert!(!is_valid_address(""));
    }
}
