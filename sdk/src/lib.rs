// Copyright (c) 2026 Satox SDK Contributors. MIT License.
// See LICENSE for details.

//! # Satox SDK
//!
//! A toolkit for applications on the Satox network: fungible assets, NFTs,
//! seeded wallets, transactions, a local chain view, content-addressed storage,
//! peer messaging and key-value databases, all behind one facade.
//!
//! ## Architecture
//!
//! Every capability lives in a manager that walks the same lifecycle
//! (see [`lifecycle`]). [`SatoxSdk`] owns one of each, initializes them in
//! dependency order and tears them down in reverse.
//!
//! - **asset**: Fungible tokens and their balance ledger.
//! - **nft**: Collections, minting and ownership of unique tokens.
//! - **wallet**: Seeded wallets with deterministic address derivation.
//! - **transaction**: Building, signing and verifying transactions.
//! - **blockchain**: The local block chain and pending pool.
//! - **ipfs**: Content-addressed file storage and pinning.
//! - **network**: Framed TCP peer messaging.
//! - **database**: Named sled databases with a small command language.
//! - **security**: Policies, audit log, signatures, encryption and session tokens.
//! - **quantum**: Hash-based one-time signatures and hybrid encryption.
//! - **api**: REST, WebSocket and GraphQL clients for a running node.
//! - **ffi**: The C ABI over all of the above.
//!
//! ## Quick start
//!
//! ```no_run
//! use satox_sdk::{SatoxSdk, SdkConfig};
//!
//! # async fn demo() -> Result<(), satox_sdk::SdkError> {
//! let sdk = SatoxSdk::with_config(SdkConfig::default())?;
//! sdk.initialize()?;
//! sdk.start().await?;
//! // ...
//! sdk.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod asset;
pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod database;
pub mod events;
pub mod ffi;
pub mod ipfs;
pub mod lifecycle;
pub mod network;
pub mod nft;
pub mod quantum;
pub mod sdk;
pub mod security;
pub mod transaction;
pub mod wallet;

pub use config::{Network, SdkConfig, SDK_VERSION};
pub use events::{EventBus, SdkEvent};
pub use lifecycle::{Lifecycle, LifecycleError, Manager, ManagerState};
pub use sdk::{SatoxSdk, SdkError};
