//! Wallet seeds and per-address key derivation.
//!
//! A wallet has one random 32-byte seed. Address `i` gets the Ed25519 key
//! `blake3::derive_key("satox wallet address", seed || i_le)`, so the same
//! seed always regenerates the same addresses.
//!
//! With a password the seed is sealed under an Argon2id-derived AES-GCM
//! key, the wallet id bound in as associated data so a sealed seed cannot
//! be swapped between wallets.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::encryption::{decrypt_with_aad, derive_key, encrypt_with_aad, generate_salt};
use crate::crypto::{EncryptionError, SatoxKeypair};

const ADDRESS_KEY_CONTEXT: &str = "satox wallet address";

pub type Seed = [u8; 32];

pub fn generate_seed() -> Seed {
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}

pub fn derive_address_keypair(seed: &Seed, index: u32) -> SatoxKeypair {
    let mut material = Vec::with_capacity(36);
    material.extend_from_slice(seed);
    material.extend_from_slice(&index.to_le_bytes());
    SatoxKeypair::from_seed(&blake3::derive_key(ADDRESS_KEY_CONTEXT, &material))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SealedSeed {
    Plain(Vec<u8>),
    Encrypted { salt: Vec<u8>, ciphertext: Vec<u8> },
}

impl SealedSeed {
    pub fn seal(seed: &Seed, password: &str, wallet_id: &str) -> Result<Self, EncryptionError> {
        let salt = generate_salt();
        let key = derive_key(password, &salt)?;
        let ciphertext = encrypt_with_aad(&key, seed, wallet_id.as_bytes())?;
        Ok(SealedSeed::Encrypted {
            salt: salt.to_vec(),
            ciphertext,
        })
    }

    pub fn plain(seed: &Seed) -> Self {
        SealedSeed::Plain(seed.to_vec())
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, SealedSeed::Encrypted { .. })
    }

    /// Recover the seed. The password is ignored for plain seeds.
    pub fn open(&self, password: &str, wallet_id: &str) -> Result<Seed, EncryptionError> {
        let bytes = match self {
            SealedSeed::Plain(bytes) => bytes.clone(),
            SealedSeed::Encrypted { salt, ciphertext } => {
                let key = derive_key(password, salt)?;
                decrypt_with_aad(&key, ciphertext, wallet_id.as_bytes())?
            }
        };
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| EncryptionError::DecryptFailed)
    }
}
