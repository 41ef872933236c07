//! # Peer Networking
//!
//! Plain TCP with a 4-byte length prefix per frame and a JSON
//! [`NetworkMessage`] inside. The manager keeps a peer table, counts
//! traffic, and fans received frames out on a broadcast channel.

pub mod manager;
pub mod types;

pub use manager::NetworkManager;
pub use types::{
    NetworkConfig, NetworkError, NetworkEvent, NetworkMessage, NetworkStats, PeerInfo, PeerState,
};
