//! # SDK Event Bus
//!
//! A `tokio::sync::broadcast` channel that managers publish to and that the
//! CLI's `/ws` endpoint (or any embedding application) subscribes to.
//!
//! Events carry a `topic` matching the WebSocket topic names understood by
//! [`crate::api::websocket`], so a server can forward them without any
//! translation table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel. Slow subscribers that fall further
/// behind than this see `RecvError::Lagged` and skip ahead.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything interesting that happens inside the SDK.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SdkEvent {
    Initialized,
    Started,
    Stopped,
    Shutdown,
    AssetCreated {
        asset_id: String,
        symbol: String,
        owner: String,
    },
    AssetTransferred {
        transfer_id: String,
        asset_id: String,
        from: String,
        to: String,
        amount: u64,
    },
    NftMinted {
        token_id: String,
        collection_id: String,
        owner: String,
    },
    NftTransferred {
        token_id: String,
        from: String,
        to: String,
    },
    WalletCreated {
        wallet_id: String,
        name: String,
    },
    TransactionSubmitted {
        txid: String,
    },
    BlockProduced {
        height: u64,
        hash: String,
        tx_count: usize,
    },
    PeerConnected {
        address: String,
    },
    PeerDisconnected {
        address: String,
    },
    SyncCompleted {
        height: u64,
        at: DateTime<Utc>,
    },
}

impl SdkEvent {
    /// The subscription topic this event is delivered under.
    pub fn topic(&self) -> &'static str {
        match self {
            SdkEvent::Initialized | SdkEvent::Started | SdkEvent::Stopped | SdkEvent::Shutdown => {
                "node"
            }
            SdkEvent::AssetCreated { .. } | SdkEvent::AssetTransferred { .. } => "assets",
            SdkEvent::NftMinted { .. } | SdkEvent::NftTransferred { .. } => "nfts",
            SdkEvent::WalletCreated { .. } => "wallets",
            SdkEvent::TransactionSubmitted { .. } => "transactions",
            SdkEvent::BlockProduced { .. } => "blocks",
            SdkEvent::PeerConnected { .. } | SdkEvent::PeerDisconnected { .. } => "peers",
            SdkEvent::SyncCompleted { .. } => "sync",
        }
    }
}

/// Cloneable publishing handle shared by all managers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SdkEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SdkEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(SdkEvent::Started);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(SdkEvent::TransactionSubmitted { txid: "ab".into() });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.topic(), "transactions");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = SdkEvent::BlockProduced {
            height: 3,
            hash: "ff".into(),
            tx_count: 1,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "BlockProduced");
        assert_eq!(json["height"], 3);
    }
}
