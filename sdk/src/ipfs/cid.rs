//! CIDv0-style content ids: base58 of a SHA-256 multihash.

use crate::crypto::hash::sha256_array;

/// Multihash code for SHA-256.
const SHA2_256: u8 = 0x12;
const DIGEST_LEN: u8 = 0x20;

/// `base58(0x12 0x20 ‖ sha256(data))`. Always 46 characters, starting "Qm".
pub fn compute_cid(data: &[u8]) -> String {
    let mut multihash = Vec::with_capacity(34);
    multihash.push(SHA2_256);
    multihash.push(DIGEST_LEN);
    multihash.extend_from_slice(&sha256_array(data));
    bs58::encode(multihash).into_string()
}

/// Shape check only; says nothing about whether the content exists.
pub fn is_valid_cid(cid: &str) -> bool {
    match bs58::decode(cid).into_vec() {
        Ok(bytes) => bytes.len() == 34 && bytes[0] == SHA2_256 && bytes[1] == DIGEST_LEN,
        Err(_) => false,
    }
}
