//! Winternitz one-time signatures, w = 16, over SHA-256.
//!
//! A 256-bit digest is 64 base-16 digits; a 3-digit checksum of
//! `Σ (15 - d)` stops an attacker from advancing any chain. That gives 67
//! hash chains of 32 bytes each, so keys and signatures are both 2144
//! bytes. Each chain step hashes `chain index || step || value` so steps
//! in different chains never collide.

use rand::RngCore;

use super::types::QuantumError;
use crate::crypto::hash::sha256_array;

const N: usize = 32;
const W: u8 = 16;
const LEN1: usize = 64;
const LEN2: usize = 3;
pub const CHAINS: usize = LEN1 + LEN2;

pub const KEY_SIZE: usize = CHAINS * N;
pub const SIGNATURE_SIZE: usize = CHAINS * N;

fn step(chain: usize, position: u8, value: &[u8; N]) -> [u8; N] {
    let mut input = [0u8; N + 2];
    input[0] = chain as u8;
    input[1] = position;
    input[2..].copy_from_slice(value);
    sha256_array(&input)
}

/// Advance `value` from position `start` by `steps`.
fn chain(index: usize, value: &[u8], start: u8, steps: u8) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(value);
    for position in start..start + steps {
        out = step(index, position, &out);
    }
    out
}

/// Base-16 digits of the digest followed by the checksum digits.
fn digits(message: &[u8]) -> [u8; CHAINS] {
    let digest = sha256_array(message);
    let mut out = [0u8; CHAINS];
    for (i, byte) in digest.iter().enumerate() {
        out[2 * i] = byte >> 4;
        out[2 * i + 1] = byte & 0x0f;
    }
    let checksum: u16 = out[..LEN1].iter().map(|d| u16::from(W - 1 - d)).sum();
    out[LEN1] = ((checksum >> 8) & 0x0f) as u8;
    out[LEN1 + 1] = ((checksum >> 4) & 0x0f) as u8;
    out[LEN1 + 2] = (checksum & 0x0f) as u8;
    out
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

/// `(public, secret)`.
pub fn generate_keypair() -> (Vec<u8>, Vec<u8>) {
    let mut secret = vec![0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    let public = secret
        .chunks_exact(N)
        .enumerate()
        .flat_map(|(i, sk)| chain(i, sk, 0, W - 1))
        .collect();
    (public, secret)
}

pub fn sign(secret: &[u8], message: &[u8]) -> Result<Vec<u8>, QuantumError> {
    check_len("WOTS secret key", secret, KEY_SIZE)?;
    let digits = digits(message);
    Ok(secret
        .chunks_exact(N)
        .enumerate()
        .flat_map(|(i, sk)| chain(i, sk, 0, digits[i]))
        .collect())
}

pub fn verify(public: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, QuantumError> {
    check_len("WOTS public key", public, KEY_SIZE)?;
    check_len("WOTS signature", signature, SIGNATURE_SIZE)?;
    let digits = digits(message);
    let ok = signature
        .chunks_exact(N)
        .zip(public.chunks_exact(N))
        .enumerate()
        .all(|(i, (sig, pk))| chain(i, sig, digits[i], W - 1 - digits[i])[..] == *pk);
    Ok(ok)
}
