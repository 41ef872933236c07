//! # Wallets
//!
//! A wallet is a name, a random seed and a growing list of addresses
//! derived from that seed. Password-protected wallets keep the seed sealed
//! with AES-256-GCM under an Argon2id key and store a PHC verifier next to
//! it, so a wrong password is rejected before any decryption is attempted.
//!
//! Backups are bincode files carrying the sealed seed unchanged; restoring
//! one requires the same password it was sealed with.

pub mod manager;
pub mod seed;
pub mod types;

pub use manager::WalletManager;
pub use types::{Wallet, WalletAddress, WalletBackup, WalletConfig, WalletError};
