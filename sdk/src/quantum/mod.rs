//! # Post-Quantum Cryptography
//!
//! Hash-based one-time signatures whose security rests only on SHA-256:
//!
//! - `lamport-sha256`: the classic 256-pair scheme, large but simple.
//! - `wots-sha256-w16`: Winternitz chains, roughly a quarter of the size.
//!
//! Both are one-time: a secret key must never sign two messages, and the
//! manager refuses to by default. `hybrid-x25519-aes256gcm` covers
//! encryption. [`KeyStorage`] keeps secrets sealed at rest.

pub mod algorithms;
pub mod lamport;
pub mod manager;
pub mod storage;
pub mod types;
pub mod wots;

pub use algorithms::{Algorithm, HYBRID_X25519_AES256GCM, LAMPORT_SHA256, WOTS_SHA256_W16};
pub use manager::QuantumManager;
pub use storage::KeyStorage;
pub use types::{AlgorithmInfo, KeyMetadata, QuantumConfig, QuantumError};
