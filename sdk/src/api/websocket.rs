//! Streaming client for a node's `/ws` endpoint.
//!
//! ```text
//! → {"type":"subscribe","topic":"blocks"}
//! ← {"topic":"blocks","data":{...}}
//! → {"type":"heartbeat"}                  every heartbeat_interval
//! ```
//!
//! One background task owns the socket. If the connection drops it
//! reconnects and replays every active subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{ApiError, ApiResult};

pub const VALID_TOPICS: &[&str] = &[
    "blocks",
    "transactions",
    "assets",
    "nfts",
    "wallets",
    "network",
    "node",
    "peers",
    "sync",
];

pub type TopicCallback = Arc<dyn Fn(&Value) + Send + Sync>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Subscriptions = Arc<RwLock<HashMap<String, Vec<TopicCallback>>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

struct Session {
    outgoing: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct WebSocketClient {
    url: String,
    config: WebSocketConfig,
    subscriptions: Subscriptions,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("topics", &self.topics())
            .finish()
    }
}

fn validate_topic(topic: &str) -> ApiResult<()> {
    if VALID_TOPICS.contains(&topic) {
        Ok(())
    } else {
        Err(ApiError::InvalidTopic(topic.to_string()))
    }
}

fn control(kind: &str, topic: &str) -> Message {
    Message::Text(json!({ "type": kind, "topic": topic }).to_string())
}

fn heartbeat() -> Message {
    Message::Text(json!({ "type": "heartbeat" }).to_string())
}

fn dispatch(subscriptions: &Subscriptions, text: &str) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        debug!("ignoring non-JSON websocket frame");
        return;
    };
    let Some(topic) = value.get("topic").and_then(Value::as_str) else {
        return;
    };
    let callbacks = subscriptions.read().get(topic).cloned().unwrap_or_default();
    for callback in callbacks {
        callback(&value);
    }
}

impl WebSocketClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, WebSocketConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: WebSocketConfig) -> Self {
        Self {
            url: url.into(),
            config,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Topics with at least one callback, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Open the socket and replay any subscriptions registered beforehand.
    pub async fn connect(&self) -> ApiResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let (socket, _) = connect_async(self.url.as_str()).await?;
        let (outgoing, rx) = mpsc::unbounded_channel();
        for topic in self.topics() {
            let _ = outgoing.send(control("subscribe", &topic));
        }

        let cancel = CancellationToken::new();
        self.connected.store(true, Ordering::SeqCst);
        let task = tokio::spawn(drive(
            self.url.clone(),
            self.config.clone(),
            socket,
            rx,
            self.subscriptions.clone(),
            self.connected.clone(),
            cancel.clone(),
        ));

        if let Some(old) = self.session.lock().replace(Session {
            outgoing,
            cancel,
            task,
        }) {
            old.cancel.cancel();
        }
        info!(url = %self.url, "websocket connected");
        Ok(())
    }

    pub fn subscribe<F>(&self, topic: &str, callback: F) -> ApiResult<()>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        validate_topic(topic)?;
        let first = {
            let mut subscriptions = self.subscriptions.write();
            let callbacks = subscriptions.entry(topic.to_string()).or_default();
            callbacks.push(Arc::new(callback));
            callbacks.len() == 1
        };
        if first {
            self.queue(control("subscribe", topic));
        }
        Ok(())
    }

    /// Drop every callback for `topic`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, topic: &str) -> ApiResult<bool> {
        validate_topic(topic)?;
        let removed = self.subscriptions.write().remove(topic).is_some();
        if removed {
            self.queue(control("unsubscribe", topic));
        }
        Ok(removed)
    }

    pub fn send(&self, message: &Value) -> ApiResult<()> {
        let session = self.session.lock();
        let session = session.as_ref().ok_or(ApiError::NotConnected)?;
        if !self.is_connected() {
            return Err(ApiError::NotConnected);
        }
        session
            .outgoing
            .send(Message::Text(message.to_string()))
            .map_err(|_| ApiError::NotConnected)
    }

    /// Send now if connected; otherwise the next `connect` replays it.
    fn queue(&self, message: Message) {
        if let Some(session) = self.session.lock().as_ref() {
            let _ = session.outgoing.send(message);
        }
    }

    pub async fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            let _ = session.task.await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

async fn reconnect(
    url: &str,
    config: &WebSocketConfig,
    subscriptions: &Subscriptions,
    cancel: &CancellationToken,
) -> Option<Socket> {
    for attempt in 1..=config.max_reconnect_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
        match connect_async(url).await {
            Ok((mut socket, _)) => {
                let topics: Vec<String> = subscriptions.read().keys().cloned().collect();
                for topic in &topics {
                    if socket.send(control("subscribe", topic)).await.is_err() {
                        break;
                    }
                }
                info!(attempt, topics = topics.len(), "websocket reconnected");
                return Some(socket);
            }
            Err(e) => warn!(attempt, error = %e, "websocket reconnect failed"),
        }
    }
    None
}

async fn drive(
    url: String,
    config: WebSocketConfig,
    mut socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    subscriptions: Subscriptions,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.heartbeat_interval);
    ticker.tick().await;

    loop {
        let dropped = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = socket.close(None).await;
                break;
            }
            _ = ticker.tick() => socket.send(heartbeat()).await.is_err(),
            Some(message) = outgoing.recv() => socket.send(message).await.is_err(),
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&subscriptions, &text);
                    false
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => true,
                Some(Ok(_)) => false,
            },
        };

        if dropped {
            warn!(%url, "websocket connection lost");
            connected.store(false, Ordering::SeqCst);
            match reconnect(&url, &config, &subscriptions, &cancel).await {
                Some(fresh) => {
                    socket = fresh;
                    connected.store(true, Ordering::SeqCst);
                }
                None => break,
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!(%url, "websocket task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;

    /// Echo server: answers each subscribe with one event on that topic and
    /// reports heartbeats on `network`.
    async fn handle(mut socket: WebSocket) {
        while let Some(Ok(AxumMessage::Text(text))) = socket.recv().await {
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let reply = match value["type"].as_str() {
                Some("subscribe") => json!({ "topic": value["topic"], "data": { "height": 1 } }),
                Some("heartbeat") => json!({ "topic": "network", "heartbeat": true }),
                _ => json!({ "topic": "node", "echo": value }),
            };
            if socket.send(AxumMessage::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    }

    async fn serve() -> String {
        async fn upgrade(ws: WebSocketUpgrade) -> impl IntoResponse {
            ws.on_upgrade(handle)
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/ws", get(upgrade)))
                .await
                .unwrap();
        });
        format!("ws://{addr}/ws")
    }

    fn channel_callback() -> (impl Fn(&Value) + Send + Sync + 'static, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |v: &Value| drop(tx.send(v.clone())), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn rejects_unknown_topics() {
        let client = WebSocketClient::new("ws://127.0.0.1:1/ws");
        assert!(matches!(
            client.subscribe("weather", |_| {}),
            Err(ApiError::InvalidTopic(_))
        ));
        assert!(matches!(
            client.unsubscribe("weather"),
            Err(ApiError::InvalidTopic(_))
        ));
        assert!(matches!(
            client.send(&json!({})),
            Err(ApiError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn subscriptions_dispatch_by_topic() {
        let client = WebSocketClient::new(serve().await);
        let (early, mut early_rx) = channel_callback();
        client.subscribe("blocks", early).unwrap();
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(next(&mut early_rx).await["data"]["height"], 1);

        let (late, mut late_rx) = channel_callback();
        client.subscribe("assets", late).unwrap();
        assert_eq!(next(&mut late_rx).await["topic"], "assets");

        let (node, mut node_rx) = channel_callback();
        client.subscribe("node", node).unwrap();
        next(&mut node_rx).await;
        client.send(&json!({ "type": "ping" })).unwrap();
        assert_eq!(next(&mut node_rx).await["echo"]["type"], "ping");

        assert!(client.unsubscribe("assets").unwrap());
        assert!(!client.unsubscribe("assets").unwrap());
        assert_eq!(client.topics(), vec!["blocks", "node"]);

        client.close().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn heartbeats_are_sent() {
        let client = WebSocketClient::with_config(
            serve().await,
            WebSocketConfig {
                heartbeat_interval: Duration::from_millis(50),
                ..WebSocketConfig::default()
            },
        );
        let (network, mut rx) = channel_callback();
        client.subscribe("network", network).unwrap();
        client.connect().await.unwrap();

        // First the subscribe acknowledgement, then a heartbeat report.
        next(&mut rx).await;
        assert_eq!(next(&mut rx).await["heartbeat"], true);
        client.close().await;
    }
}
