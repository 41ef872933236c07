//! # IPFS
//!
//! A local content-addressed store. Objects are keyed by a CIDv0-style
//! multihash of their bytes, so the same content always lands under the
//! same id and a download can be checked against the id it was asked for.
//! Pinned objects survive garbage collection; everything else is fair game.

pub mod cid;
pub mod manager;
pub mod types;

pub use cid::{compute_cid, is_valid_cid};
pub use manager::IpfsManager;
pub use types::{IpfsConfig, IpfsError, IpfsFile, IpfsNodeInfo, IpfsPeer, PinInfo, StorageStats};
