//! # Assets
//!
//! Fungible tokens: creation, transfers, reissuance and burns, with every
//! balance held in a checked [`Ledger`]. Amounts are integer base units;
//! `decimals` only tells a UI where to draw the point.
//!
//! The one rule that matters: for every asset, the balances of all holders
//! add up to `total_supply`. Creation credits the supply to the owner,
//! reissue and burn move supply and the owner's balance together, and
//! transfers are all-or-nothing.

pub mod ledger;
pub mod manager;
pub mod types;

pub use ledger::{Ledger, LedgerError};
pub use manager::{AssetManager, DEFAULT_HISTORY_LIMIT};
pub use types::{
    Asset, AssetConfig, AssetError, AssetTransfer, CreateAssetRequest, DEFAULT_TOTAL_SUPPLY,
};
