//! # Hashing Utilities
//!
//! Two hash functions, picked for two different jobs:
//!
//! - **SHA-256** names things the outside world sees: asset ids, transfer
//!   ids, transaction ids, IPFS content ids. Every wallet, explorer and
//!   gateway already speaks it.
//! - **BLAKE3** covers SDK-internal structures (block headers, Merkle
//!   trees, key derivation) where nobody else needs to reproduce the bytes
//!   and speed is free.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as a heap-allocated digest.
///
/// ```
/// use satox_sdk::crypto::sha256;
///
/// assert_eq!(sha256(b"satox").len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    sha256_array(data).to_vec()
}

/// SHA-256 of `data` as a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_array(data))
}

/// `SHA-256(SHA-256(data))`, used for address checksums.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256_array(&sha256_array(data))
}

/// BLAKE3 of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 over several slices fed in order, without concatenating them.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// BLAKE3 in `derive_key` mode. Different contexts never collide, even for
/// identical `data`.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Deterministic 16-byte identifier: `hex(sha256(parts.join("_"))[..16])`.
///
/// Asset ids hash `name_symbol_owner`, collection ids hash `name_creator`.
/// Same inputs, same id, which is exactly what duplicate detection wants.
pub fn short_id(parts: &[&str]) -> String {
    let digest = sha256_array(parts.join("_").as_bytes());
    hex::encode(&digest[..16])
}

/// Full-length hex SHA-256 over `parts.join("_")`.
pub fn long_id(parts: &[&str]) -> String {
    sha256_hex(parts.join("_").as_bytes())
}

/// Binary BLAKE3 Merkle root over 32-byte leaves.
///
/// Odd levels duplicate their last node. A single leaf is paired with
/// itself so the root is always a hash output. An empty set yields zeros.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    if level.len() == 1 {
        return blake3_hash_multi(&[&level[0], &level[0]]);
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                blake3_hash_multi(&[&pair[0], right])
            })
            .collect();
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_vec_matches_array() {
        assert_eq!(sha256(b"x").as_slice(), sha256_array(b"x").as_slice());
    }

    #[test]
    fn double_sha256_is_nested() {
        assert_eq!(double_sha256(b"satox"), sha256_array(&sha256_array(b"satox")));
    }

    #[test]
    fn short_id_is_32_hex_chars_and_stable() {
        let a = short_id(&["Gold", "GLD", "Salice"]);
        let b = short_id(&["Gold", "GLD", "Salice"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, short_id(&["Gold", "GLD", "Sbob"]));
    }

    #[test]
    fn short_id_is_prefix_of_long_id() {
        let s = short_id(&["a", "b"]);
        let l = long_id(&["a", "b"]);
        assert!(l.starts_with(&s));
        assert_eq!(l.len(), 64);
    }

    #[test]
    fn domain_separation_changes_output() {
        assert_ne!(
            domain_separated_hash("ctx-a", b"data"),
            domain_separated_hash("ctx-b", b"data")
        );
        assert_ne!(domain_separated_hash("ctx-a", b"data"), blake3_hash(b"data"));
    }

    #[test]
    fn multi_equals_concatenation() {
        assert_eq!(
            blake3_hash_multi(&[b"hello", b" world"]),
            blake3_hash(b"hello world")
        );
    }

    #[test]
    fn merkle_root_edge_cases() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);

        let leaf = blake3_hash(b"only");
        assert_eq!(merkle_root(&[leaf]), blake3_hash_multi(&[&leaf, &leaf]));

        let l = blake3_hash(b"l");
        let r = blake3_hash(b"r");
        assert_eq!(merkle_root(&[l, r]), blake3_hash_multi(&[&l, &r]));
        assert_ne!(merkle_root(&[l, r]), merkle_root(&[r, l]));
    }

    #[test]
    fn merkle_root_odd_count_duplicates_last() {
        let a = blake3_hash(b"a");
        let b = blake3_hash(b"b");
        let c = blake3_hash(b"c");
        let ab = blake3_hash_multi(&[&a, &b]);
        let cc = blake3_hash_multi(&[&c, &c]);
        assert_eq!(merkle_root(&[a, b, c]), blake3_hash_multi(&[&ab, &cc]));
    }
}
