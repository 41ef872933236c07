//! # Non-Fungible Tokens
//!
//! Collections cap how many tokens can exist; each token has exactly one
//! owner and a transfer history. Token ids are derived from the collection
//! id and the mint index, so the n-th token of a collection always gets the
//! same id.

pub mod manager;
pub mod types;

pub use manager::{implicit_collection_id, NftManager};
pub use types::{
    CreateCollectionRequest, MintRequest, Nft, NftAttribute, NftCollection, NftConfig, NftError,
    NftTransfer,
};
