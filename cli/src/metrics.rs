//! # Prometheus Metrics
//!
//! Operational metrics for a running SDK node, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`Registry`] with the
//! `satox` prefix.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use satox_sdk::{SatoxSdk, SdkEvent};
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// 1 while the SDK is started.
    pub sdk_running: IntGauge,
    pub block_height: IntGauge,
    pub transactions_submitted_total: IntCounter,
    pub connected_peers: IntGauge,
    pub assets_created_total: IntCounter,
    /// Bytes held by the IPFS manager.
    pub ipfs_stored_bytes: IntGauge,
    pub api_request_duration_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("satox".into()), None)?;

        let sdk_running = IntGauge::new("sdk_running", "Whether the SDK is started (1) or not (0)")?;
        registry.register(Box::new(sdk_running.clone()))?;

        let block_height = IntGauge::new("block_height", "Height of the local chain tip")?;
        registry.register(Box::new(block_height.clone()))?;

        let transactions_submitted_total = IntCounter::new(
            "transactions_submitted_total",
            "Transactions accepted into the pending pool",
        )?;
        registry.register(Box::new(transactions_submitted_total.clone()))?;

        let connected_peers = IntGauge::new("connected_peers", "Peers in the network manager's table")?;
        registry.register(Box::new(connected_peers.clone()))?;

        let assets_created_total = IntCounter::new("assets_created_total", "Assets created")?;
        registry.register(Box::new(assets_created_total.clone()))?;

        let ipfs_stored_bytes = IntGauge::new("ipfs_stored_bytes", "Bytes of content stored locally")?;
        registry.register(Box::new(ipfs_stored_bytes.clone()))?;

        let api_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "api_request_duration_seconds",
                "Latency of local API requests in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(api_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            sdk_running,
            block_height,
            transactions_submitted_total,
            connected_peers,
            assets_created_total,
            ipfs_stored_bytes,
            api_request_duration_seconds,
        })
    }

    /// Count an event from the SDK bus.
    pub fn record_event(&self, event: &SdkEvent) {
        match event {
            SdkEvent::TransactionSubmitted { .. } => self.transactions_submitted_total.inc(),
            SdkEvent::AssetCreated { .. } => self.assets_created_total.inc(),
            SdkEvent::BlockProduced { height, .. } | SdkEvent::SyncCompleted { height, .. } => {
                self.block_height.set(to_gauge(*height))
            }
            _ => {}
        }
    }

    /// Re-read the gauges from the managers. Failures leave the previous
    /// value in place.
    pub fn refresh(&self, sdk: &SatoxSdk) {
        self.sdk_running.set(i64::from(sdk.is_running()));
        if let Ok(height) = sdk.blockchain_manager().get_block_height() {
            self.block_height.set(to_gauge(height));
        }
        if let Ok(peers) = sdk.network_manager().get_peers() {
            self.connected_peers.set(to_gauge(peers.len() as u64));
        }
        if let Ok(stats) = sdk.ipfs_manager().get_storage_stats() {
            self.ipfs_stored_bytes.set(to_gauge(stats.total_size));
        }
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn to_gauge(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_with_prefix() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.block_height.set(12);
        metrics.assets_created_total.inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("satox_block_height 12"));
        assert!(text.contains("satox_assets_created_total 1"));
        assert!(text.contains("satox_api_request_duration_seconds_bucket"));
    }

    #[test]
    fn events_move_counters() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_event(&SdkEvent::TransactionSubmitted { txid: "aa".into() });
        metrics.record_event(&SdkEvent::BlockProduced {
            height: 5,
            hash: "bb".into(),
            tx_count: 1,
        });
        metrics.record_event(&SdkEvent::PeerConnected {
            address: "10.0.0.1:60777".into(),
        });
        assert_eq!(metrics.transactions_submitted_total.get(), 1);
        assert_eq!(metrics.block_height.get(), 5);
        assert_eq!(metrics.assets_created_total.get(), 0);
    }

    #[test]
    fn refresh_reads_an_uninitialized_sdk() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.block_height.set(9);
        let sdk = SatoxSdk::new(satox_sdk::SdkConfig::default());
        metrics.refresh(&sdk);
        assert_eq!(metrics.sdk_running.get(), 0);
        assert_eq!(metrics.block_height.get(), 9);
    }
}
