//! The algorithm registry. Names are the stable identifiers used across
//! the SDK, the C ABI and the key store.

use super::types::{AlgorithmInfo, QuantumError};
use super::{lamport, wots};
use crate::crypto::exchange::{self, X25519_KEY_LENGTH};

pub const LAMPORT_SHA256: &str = "lamport-sha256";
pub const WOTS_SHA256_W16: &str = "wots-sha256-w16";
pub const HYBRID_X25519_AES256GCM: &str = "hybrid-x25519-aes256gcm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    LamportSha256,
    WotsSha256W16,
    HybridX25519Aes256Gcm,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::LamportSha256,
        Algorithm::WotsSha256W16,
        Algorithm::HybridX25519Aes256Gcm,
    ];

    pub fn from_name(name: &str) -> Result<Self, QuantumError> {
        match name.trim().to_ascii_lowercase().as_str() {
            LAMPORT_SHA256 => Ok(Algorithm::LamportSha256),
            WOTS_SHA256_W16 => Ok(Algorithm::WotsSha256W16),
            HYBRID_X25519_AES256GCM => Ok(Algorithm::HybridX25519Aes256Gcm),
            _ => Err(QuantumError::UnknownAlgorithm(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::LamportSha256 => LAMPORT_SHA256,
            Algorithm::WotsSha256W16 => WOTS_SHA256_W16,
            Algorithm::HybridX25519Aes256Gcm => HYBRID_X25519_AES256GCM,
        }
    }

    pub fn can_sign(self) -> bool {
        !matches!(self, Algorithm::HybridX25519Aes256Gcm)
    }

    pub fn can_encrypt(self) -> bool {
        matches!(self, Algorithm::HybridX25519Aes256Gcm)
    }

    pub fn info(self) -> AlgorithmInfo {
        let (security_level, key_size, signature_size, is_recommended, description) = match self {
            Algorithm::LamportSha256 => (
                1,
                lamport::PUBLIC_KEY_SIZE,
                lamport::SIGNATURE_SIZE,
                false,
                "Lamport one-time signature over SHA-256",
            ),
            Algorithm::WotsSha256W16 => (
                1,
                wots::KEY_SIZE,
                wots::SIGNATURE_SIZE,
                true,
                "Winternitz one-time signature over SHA-256, w=16",
            ),
            Algorithm::HybridX25519Aes256Gcm => (
                1,
                X25519_KEY_LENGTH,
                0,
                true,
                "X25519 key agreement with AES-256-GCM sealing",
            ),
        };
        AlgorithmInfo {
            name: self.name().to_string(),
            security_level,
            key_size,
            signature_size,
            is_recommended,
            description: description.to_string(),
        }
    }

    /// `(public, secret)`.
    pub fn generate_keypair(self) -> (Vec<u8>, Vec<u8>) {
        match self {
            Algorithm::LamportSha256 => lamport::generate_keypair(),
            Algorithm::WotsSha256W16 => wots::generate_keypair(),
            Algorithm::HybridX25519Aes256Gcm => {
                let (secret, public) = exchange::generate_x25519_keypair();
                (public.to_vec(), secret.to_vec())
            }
        }
    }

    pub fn sign(self, secret: &[u8], data: &[u8]) -> Result<Vec<u8>, QuantumError> {
        match self {
            Algorithm::LamportSha256 => lamport::sign(secret, data),
            Algorithm::WotsSha256W16 => wots::sign(secret, data),
            Algorithm::HybridX25519Aes256Gcm => Err(self.unsupported("signing")),
        }
    }

    pub fn verify(self, public: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, QuantumError> {
        match self {
            Algorithm::LamportSha256 => lamport::verify(public, data, signature),
            Algorithm::WotsSha256W16 => wots::verify(public, data, signature),
            Algorithm::HybridX25519Aes256Gcm => Err(self.unsupported("verification")),
        }
    }

    fn unsupported(self, operation: &'static str) -> QuantumError {
        QuantumError::Unsupported {
            algorithm: self.name().to_string(),
            operation,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for alg in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(alg.name()).unwrap(), alg);
        }
        assert_eq!(
            Algorithm::from_name(" WOTS-SHA256-W16 ").unwrap(),
            Algorithm::WotsSha256W16
        );
        assert!(matches!(
            Algorithm::from_name("dilithium"),
            Err(QuantumError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn hybrid_cannot_sign() {
        let alg = Algorithm::HybridX25519Aes256Gcm;
        let (_, secret) = alg.generate_keypair();
        assert!(matches!(
            alg.sign(&secret, b"x"),
            Err(QuantumError::Unsupported { .. })
        ));
        assert_eq!(alg.info().signature_size, 0);
    }
}
