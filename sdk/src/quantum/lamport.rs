//! Lamport one-time signatures over SHA-256.
//!
//! The secret key is 256 pairs of 32-byte preimages; the public key is
//! their hashes. Signing reveals one preimage per bit of `sha256(msg)`.
//!
//! | Item       | Size    |
//! |------------|---------|
//! | secret key | 16 KiB  |
//! | public key | 16 KiB  |
//! | signature  | 8 KiB   |

use rand::RngCore;

use super::types::QuantumError;
use crate::crypto::hash::sha256_array;

const N: usize = 32;
const BITS: usize = 256;

pub const SECRET_KEY_SIZE: usize = BITS * 2 * N;
pub const PUBLIC_KEY_SIZE: usize = BITS * 2 * N;
pub const SIGNATURE_SIZE: usize = BITS * N;

fn bit(digest: &[u8; 32], i: usize) -> usize {
    usize::from((digest[i / 8] >> (7 - (i % 8))) & 1)
}

/// `(public, secret)`.
pub fn generate_keypair() -> (Vec<u8>, Vec<u8>) {
    let mut secret = vec![0u8; SECRET_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    let public = public_from_secret(&secret);
    (public, secret)
}

fn public_from_secret(secret: &[u8]) -> Vec<u8> {
    secret.chunks_exact(N).flat_map(sha256_array).collect()
}

fn check_len(what: &'static str, bytes: &[u8], expected: usize) -> Result<(), QuantumError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(QuantumError::InvalidLength {
            what,
            expected,
            actual: bytes.len(),
        })
    }
}

pub fn sign(secret: &[u8], message: &[u8]) -> Result<Vec<u8>, QuantumError> {
    check_len("Lamport secret key", secret, SECRET_KEY_SIZE)?;
    let digest = sha256_array(message);
    let mut signature = Vec::with_capacity(SIGNATURE_SIZE);
    for i in 0..BITS {
        let offset = (2 * i + bit(&digest, i)) * N;
        signature.extend_from_slice(&secret[offset..offset + N]);
    }
    Ok(signature)
}

pub fn verify(public: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, QuantumError> {
    check_len("Lamport public key", public, PUBLIC_KEY_SIZE)?;
    check_len("Lamport signature", signature, SIGNATURE_SIZE)?;
    let digest = sha256_array(message);
    for (i, revealed) in signature.chunks_exact(N).enumerate() {
        let offset = (2 * i + bit(&digest, i)) * N;
        if sha256_array(revealed)[..] != public[offset..offset + N] {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        let (public, secret) = generate_keypair();
        assert_eq!(public.len(), 16 * 1024);
        assert_eq!(secret.len(), 16 * 1024);
        assert_eq!(sign(&secret, b"m").unwrap().len(), 8 * 1024);
    }

    #[test]
    fn sign_verify() {
        let (public, secret) = generate_keypair();
        let sig = sign(&secret, b"quantum-safe").unwrap();
        assert!(verify(&public, b"quantum-safe", &sig).unwrap());
        assert!(!verify(&public, b"quantum-unsafe", &sig).unwrap());

        let (other, _) = generate_keypair();
        assert!(!verify(&other, b"quantum-safe", &sig).unwrap());
        assert!(verify(&public, b"quantum-safe", &sig[1..]).is_err());
    }
}
