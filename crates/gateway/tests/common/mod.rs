//! Shared harness for the gateway integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use bg_domain::config::Config;
use bg_gateway::adapter::Adapter;
use bg_gateway::{AppState, Driver};
use bg_protocol::{Payload, PermissionDenied, SelfId, Transport, TransportKind};
use bg_sessions::BotSession;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// One payload as seen by a bot's message handler.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub self_id: SelfId,
    pub kind: TransportKind,
    pub payload: Payload,
}

// ── Test adapter ─────────────────────────────────────────────────────

/// Admits any request carrying `x-self-id`, or refuses everything with a
/// fixed denial.
///
/// Its bots report each payload on `deliveries`. Payloads with a `"slow"`
/// key park on `gate` first; payloads with an `"echo"` key are sent back
/// over the bound transport.
pub struct RecordingAdapter {
    name: String,
    deny: Option<PermissionDenied>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    gate: Arc<Notify>,
}

impl RecordingAdapter {
    pub fn new(name: &str) -> (Self, mpsc::UnboundedReceiver<Delivery>, Arc<Notify>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let adapter = Self {
            name: name.to_owned(),
            deny: None,
            deliveries: tx,
            gate: gate.clone(),
        };
        (adapter, rx, gate)
    }

    pub fn denying(name: &str, status: u16, reason: &str) -> Self {
        let (mut adapter, _rx, _gate) = Self::new(name);
        adapter.deny = Some(PermissionDenied::new(status, reason));
        adapter
    }
}

#[async_trait]
impl Adapter for RecordingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_permission(
        &self,
        _kind: TransportKind,
        headers: &HeaderMap,
        _body: Option<&[u8]>,
    ) -> Result<SelfId, PermissionDenied> {
        if let Some(denied) = &self.deny {
            return Err(denied.clone());
        }
        headers
            .get("x-self-id")
            .and_then(|v| v.to_str().ok())
            .map(SelfId::new)
            .ok_or_else(|| PermissionDenied::new(400, "missing X-Self-ID header"))
    }

    fn create_session(
        &self,
        kind: TransportKind,
        self_id: SelfId,
        transport: Option<Arc<dyn Transport>>,
    ) -> Arc<dyn BotSession> {
        Arc::new(RecordingBot {
            adapter: self.name.clone(),
            self_id,
            kind,
            transport,
            deliveries: self.deliveries.clone(),
            gate: self.gate.clone(),
        })
    }
}

pub struct RecordingBot {
    adapter: String,
    self_id: SelfId,
    kind: TransportKind,
    transport: Option<Arc<dyn Transport>>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    gate: Arc<Notify>,
}

#[async_trait]
impl BotSession for RecordingBot {
    fn adapter(&self) -> &str {
        &self.adapter
    }

    fn self_id(&self) -> &SelfId {
        &self.self_id
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn handle_message(&self, payload: Payload) {
        if payload.contains_key("slow") {
            self.gate.notified().await;
        }
        if payload.contains_key("echo") {
            if let Some(transport) = &self.transport {
                let _ = transport.send(&payload).await;
            }
        }
        let _ = self.deliveries.send(Delivery {
            self_id: self.self_id.clone(),
            kind: self.kind,
            payload,
        });
    }
}

// ── Server ───────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    /// Bind an ephemeral port and serve `driver` on it.
    pub async fn start(driver: Driver) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = driver.state().clone();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(driver.serve(listener, async {
            let _ = rx.await;
        }));
        Self {
            addr,
            state,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    /// Trigger graceful shutdown and wait for `serve` to return.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(TIMEOUT, &mut self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// A driver with default config and one recording adapter named `onebot`.
pub fn driver_with_recorder() -> (Driver, mpsc::UnboundedReceiver<Delivery>, Arc<Notify>) {
    let driver = Driver::new(Config::default());
    let (adapter, rx, gate) = RecordingAdapter::new("onebot");
    driver.register_adapter(adapter);
    (driver, rx, gate)
}

// ── WebSocket client helpers ─────────────────────────────────────────

pub async fn connect(url: &str, self_id: Option<&str>) -> WsStream {
    let mut request = url.into_client_request().unwrap();
    if let Some(id) = self_id {
        request
            .headers_mut()
            .insert("x-self-id", id.parse().unwrap());
    }
    let (ws, _) = timeout(TIMEOUT, tokio_tungstenite::connect_async(request))
        .await
        .expect("timeout connecting")
        .expect("websocket handshake failed");
    ws
}

/// Read until the server's close frame; returns its code and reason.
pub async fn expect_close(ws: &mut WsStream) -> (u16, String) {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for close frame")
            .expect("stream ended without a close frame")
            .expect("ws error");
        match msg {
            Message::Close(Some(frame)) => return (u16::from(frame.code), frame.reason.to_string()),
            Message::Close(None) => panic!("close frame without a code"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

/// Read the next text frame as JSON.
pub async fn read_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timeout waiting for dispatch")
        .expect("delivery channel closed")
}

/// Assert nothing else is delivered within a short window.
pub async fn assert_no_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) {
    if let Ok(Some(extra)) = timeout(Duration::from_millis(200), rx.recv()).await {
        panic!("unexpected extra delivery: {extra:?}");
    }
}

/// Poll `cond` until it holds or the timeout expires.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn object(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}
