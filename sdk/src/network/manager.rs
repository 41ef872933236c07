//! The network manager: a tokio TCP listener plus a dialer, speaking
//! length-delimited JSON frames.
//!
//! Every inbound connection gets its own task. All of them hang off one
//! `CancellationToken`, so `stop` tears the whole tree down at once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{
    peer_key, NetworkConfig, NetworkError, NetworkEvent, NetworkMessage, NetworkStats, PeerInfo,
    PeerState,
};
use crate::events::{EventBus, SdkEvent};
use crate::lifecycle::{Lifecycle, Manager};

const NETWORK_EVENT_CAPACITY: usize = 256;

/// Frames above this size are a protocol error.
const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

#[derive(Debug, Default)]
struct Counters {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    failed_connections: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    fn reset(&self) {
        for counter in [
            &self.total_connections,
            &self.active_connections,
            &self.failed_connections,
            &self.messages_sent,
            &self.messages_received,
            &self.bytes_sent,
            &self.bytes_received,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
struct Listener {
    token: CancellationToken,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
    started_at: Instant,
}

#[derive(Debug)]
pub struct NetworkManager {
    lifecycle: Lifecycle,
    config: RwLock<NetworkConfig>,
    peers: DashMap<String, PeerInfo>,
    /// Serializes the size check and insert in `add_peer`.
    admission: Mutex<()>,
    counters: Arc<Counters>,
    listener: Mutex<Option<Listener>>,
    network_events: broadcast::Sender<NetworkEvent>,
    events: EventBus,
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl NetworkManager {
    pub fn new(config: NetworkConfig) -> Self {
        let (network_events, _) = broadcast::channel(NETWORK_EVENT_CAPACITY);
        Self {
            lifecycle: Lifecycle::new("network"),
            config: RwLock::new(config),
            peers: DashMap::new(),
            admission: Mutex::new(()),
            counters: Arc::new(Counters::default()),
            listener: Mutex::new(None),
            network_events,
            events: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> NetworkConfig {
        self.config.read().clone()
    }

    /// Listener settings take effect on the next `start`.
    pub fn update_config(&self, config: NetworkConfig) -> Result<(), NetworkError> {
        self.lifecycle.ensure_ready()?;
        *self.config.write() = config;
        Ok(())
    }

    /// Bound address while the listener runs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|l| l.local_addr)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.network_events.subscribe()
    }

    /// How this node names itself in outgoing frames.
    fn node_address(&self) -> String {
        match self.local_addr() {
            Some(addr) => addr.to_string(),
            None => {
                let config = self.config.read();
                peer_key(&config.listen_address, config.port)
            }
        }
    }

    fn announce(&self, event: NetworkEvent) {
        match &event {
            NetworkEvent::PeerConnected { address } => self.events.publish(SdkEvent::PeerConnected {
                address: address.clone(),
            }),
            NetworkEvent::PeerDisconnected { address } => {
                self.events.publish(SdkEvent::PeerDisconnected {
                    address: address.clone(),
                })
            }
            NetworkEvent::MessageReceived { .. } => {}
        }
        let _ = self.network_events.send(event);
    }

    // -----------------------------------------------------------------------
    // Peer table
    // -----------------------------------------------------------------------

    pub fn add_peer(&self, address: &str, port: u16) -> Result<PeerInfo, NetworkError> {
        self.lifecycle.ensure_ready()?;
        if address.trim().is_empty() {
            return Err(NetworkError::InvalidInput("peer address is required".into()));
        }
        if port == 0 {
            return Err(NetworkError::InvalidInput("peer port must be non-zero".into()));
        }
        let max = self.config.read().max_connections;
        let key = peer_key(address, port);

        let _admission = self.admission.lock();
        if self.peers.contains_key(&key) {
            return Err(NetworkError::PeerExists(key));
        }
        if self.peers.len() >= max {
            return Err(NetworkError::TooManyPeers { max });
        }
        match self.peers.entry(key.clone()) {
            Entry::Occupied(_) => Err(NetworkError::PeerExists(key)),
            Entry::Vacant(slot) => {
                let peer = PeerInfo {
                    address: address.to_string(),
                    port,
                    state: PeerState::Known,
                    latency_ms: None,
                    added_at: Utc::now(),
                    last_seen: None,
                    messages_sent: 0,
                };
                slot.insert(peer.clone());
                debug!(peer = %key, "peer added");
                Ok(peer)
            }
        }
    }

    pub fn remove_peer(&self, address: &str, port: u16) -> Result<PeerInfo, NetworkError> {
        self.lifecycle.ensure_ready()?;
        let key = peer_key(address, port);
        self.peers
            .remove(&key)
            .map(|(_, peer)| peer)
            .ok_or(NetworkError::PeerNotFound(key))
    }

    pub fn get_peers(&self) -> Result<Vec<PeerInfo>, NetworkError> {
        self.lifecycle.ensure_ready()?;
        let mut peers: Vec<PeerInfo> = self.peers.iter().map(|p| p.value().clone()).collect();
        peers.sort_by_key(PeerInfo::endpoint);
        Ok(peers)
    }

    pub fn is_peer_known(&self, address: &str, port: u16) -> bool {
        self.peers.contains_key(&peer_key(address, port))
    }

    fn set_peer_state(&self, key: &str, state: PeerState) {
        if let Some(mut peer) = self.peers.get_mut(key) {
            peer.state = state;
        }
    }

    // -----------------------------------------------------------------------
    // Dialing
    // -----------------------------------------------------------------------

    async fn dial(&self, endpoint: &str) -> Result<TcpStream, NetworkError> {
        let timeout = Duration::from_millis(self.config.read().connection_timeout_ms);
        match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(NetworkError::Timeout(endpoint.to_string())),
        }
    }

    /// Dial a peer to check reachability. Unknown peers are added first.
    pub async fn connect(&self, address: &str, port: u16) -> Result<PeerInfo, NetworkError> {
        self.lifecycle.ensure_ready()?;
        let key = peer_key(address, port);
        if !self.peers.contains_key(&key) {
            self.add_peer(address, port)?;
        }

        let started = Instant::now();
        let dialed = self.dial(&key).await;
        Counters::bump(&self.counters.total_connections, 1);
        match dialed {
            Ok(stream) => {
                drop(stream);
                let latency = started.elapsed().as_millis() as u64;
                let peer = {
                    let mut entry = self
                        .peers
                        .get_mut(&key)
                        .ok_or_else(|| NetworkError::PeerNotFound(key.clone()))?;
                    entry.state = PeerState::Connected;
                    entry.latency_ms = Some(latency);
                    entry.last_seen = Some(Utc::now());
                    entry.clone()
                };
                info!(peer = %key, latency_ms = latency, "peer connected");
                self.announce(NetworkEvent::PeerConnected { address: key });
                Ok(peer)
            }
            Err(e) => {
                Counters::bump(&self.counters.failed_connections, 1);
                self.set_peer_state(&key, PeerState::Failed);
                warn!(peer = %key, error = %e, "failed to connect to peer");
                Err(e)
            }
        }
    }

    pub fn disconnect(&self, address: &str, port: u16) -> Result<(), NetworkError> {
        self.lifecycle.ensure_ready()?;
        let key = peer_key(address, port);
        let was_connected = {
            let mut peer = self
                .peers
                .get_mut(&key)
                .ok_or_else(|| NetworkError::PeerNotFound(key.clone()))?;
            let was = peer.state == PeerState::Connected;
            peer.state = PeerState::Disconnected;
            was
        };
        if was_connected {
            info!(peer = %key, "peer disconnected");
            self.announce(NetworkEvent::PeerDisconnected { address: key });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Open a connection to `address:port` and write a single frame.
    pub async fn send_message(
        &self,
        address: &str,
        port: u16,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<(), NetworkError> {
        self.lifecycle.ensure_ready()?;
        if kind.trim().is_empty() {
            return Err(NetworkError::InvalidInput("message kind is required".into()));
        }
        let message = NetworkMessage {
            kind: kind.to_string(),
            payload,
            from: self.node_address(),
            timestamp: Utc::now(),
        };
        let frame = Bytes::from(serde_json::to_vec(&message)?);
        let key = peer_key(address, port);

        match self.deliver(&key, frame.clone()).await {
            Ok(()) => {
                Counters::bump(&self.counters.messages_sent, 1);
                Counters::bump(&self.counters.bytes_sent, frame.len() as u64);
                if let Some(mut peer) = self.peers.get_mut(&key) {
                    peer.messages_sent += 1;
                    peer.last_seen = Some(Utc::now());
                }
                debug!(peer = %key, kind, bytes = frame.len(), "message sent");
                Ok(())
            }
            Err(e) => {
                Counters::bump(&self.counters.failed_connections, 1);
                self.set_peer_state(&key, PeerState::Failed);
                Err(e)
            }
        }
    }

    async fn deliver(&self, endpoint: &str, frame: Bytes) -> Result<(), NetworkError> {
        let stream = self.dial(endpoint).await?;
        let mut frames = Framed::new(stream, codec());
        frames.send(frame).await?;
        SinkExt::<Bytes>::close(&mut frames).await?;
        Ok(())
    }

    /// Send to every known peer. Returns how many deliveries succeeded.
    pub async fn broadcast_message(
        &self,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<usize, NetworkError> {
        self.lifecycle.ensure_ready()?;
        let targets: Vec<(String, u16)> = self
            .peers
            .iter()
            .map(|p| (p.address.clone(), p.port))
            .collect();

        let mut delivered = 0;
        for (address, port) in targets {
            match self.send_message(&address, port, kind, payload.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer = %peer_key(&address, port), error = %e, "broadcast delivery failed"),
            }
        }
        Ok(delivered)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn get_stats(&self) -> NetworkStats {
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        NetworkStats {
            total_connections: load(&c.total_connections),
            active_connections: load(&c.active_connections),
            failed_connections: load(&c.failed_connections),
            messages_sent: load(&c.messages_sent),
            messages_received: load(&c.messages_received),
            bytes_sent: load(&c.bytes_sent),
            bytes_received: load(&c.bytes_received),
            uptime_secs: self
                .listener
                .lock()
                .as_ref()
                .map(|l| l.started_at.elapsed().as_secs())
                .unwrap_or(0),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }
}

async fn accept_loop(
    listener: TcpListener,
    token: CancellationToken,
    counters: Arc<Counters>,
    events: broadcast::Sender<NetworkEvent>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("accept loop stopping");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    Counters::bump(&counters.total_connections, 1);
                    Counters::bump(&counters.active_connections, 1);
                    tokio::spawn(handle_connection(
                        stream,
                        remote,
                        token.child_token(),
                        Arc::clone(&counters),
                        events.clone(),
                    ));
                }
                Err(e) => {
                    Counters::bump(&counters.failed_connections, 1);
                    warn!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    token: CancellationToken,
    counters: Arc<Counters>,
    events: broadcast::Sender<NetworkEvent>,
) {
    let mut frames = Framed::new(stream, codec());
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(bytes)) => {
                Counters::bump(&counters.bytes_received, bytes.len() as u64);
                match serde_json::from_slice::<NetworkMessage>(&bytes) {
                    Ok(message) => {
                        Counters::bump(&counters.messages_received, 1);
                        debug!(%remote, kind = %message.kind, "message received");
                        let _ = events.send(NetworkEvent::MessageReceived {
                            remote: remote.to_string(),
                            message,
                        });
                    }
                    Err(e) => warn!(%remote, error = %e, "dropping undecodable frame"),
                }
            }
            Some(Err(e)) => {
                warn!(%remote, error = %e, "connection error");
                break;
            }
            None => break,
        }
    }
    counters.connection_closed();
}

#[async_trait]
impl Manager for NetworkManager {
    type Error = NetworkError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), NetworkError> {
        self.lifecycle.initialize()?;
        debug!("network manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), NetworkError> {
        if let Some(listener) = self.listener.lock().take() {
            listener.token.cancel();
            listener.accept_task.abort();
        }
        self.peers.clear();
        self.counters.reset();
        self.lifecycle.reset();
        debug!("network manager shut down");
        Ok(())
    }

    /// Bind the listener and spawn the accept loop. Starting twice is a
    /// no-op.
    async fn start(&self) -> Result<(), NetworkError> {
        self.lifecycle.ensure_ready()?;
        let already_listening = self.listener.lock().is_some();
        if already_listening {
            return Ok(());
        }

        let config = self.config();
        let listener = TcpListener::bind((config.listen_address.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            token.clone(),
            Arc::clone(&self.counters),
            self.network_events.clone(),
        ));

        *self.listener.lock() = Some(Listener {
            token,
            accept_task,
            local_addr,
            started_at: Instant::now(),
        });
        self.lifecycle.start()?;
        info!(%local_addr, "network listener started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), NetworkError> {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.token.cancel();
            if let Err(e) = listener.accept_task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "accept loop ended abnormally");
                }
            }
            info!(local_addr = %listener.local_addr, "network listener stopped");
        }
        self.lifecycle.stop();
        Ok(())
    }
}
