//! [`Transport`] over an axum WebSocket.
//!
//! The socket is split: the read half is only ever polled by the
//! connection's read loop, the write half is shared by whoever sends
//! (the bot session, the management API). Each half sits behind its own
//! async mutex so a pending read never blocks a write.

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;

use bg_protocol::{parse_payload, Payload, Transport, TransportError, TransportKind, TransportState};

type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;
type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

pub struct WsTransport {
    sink: Mutex<FrameSink>,
    stream: Mutex<FrameStream>,
    state: AtomicU8,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self::from_parts(sink, stream)
    }

    /// Build from any frame sink/stream pair.
    pub fn from_parts<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Message, Error = axum::Error> + Send + 'static,
        St: Stream<Item = Result<Message, axum::Error>> + Send + 'static,
    {
        Self {
            sink: Mutex::new(Box::pin(sink)),
            stream: Mutex::new(Box::pin(stream)),
            state: AtomicU8::new(CONNECTING),
        }
    }

    fn mark_closed(&self) {
        self.state.store(CLOSED, Ordering::SeqCst);
    }

    fn decode(&self, bytes: &[u8]) -> Option<Payload> {
        match parse_payload(bytes) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(error = %e, "received an invalid websocket message");
                None
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn state(&self) -> TransportState {
        match self.state.load(Ordering::SeqCst) {
            CONNECTING => TransportState::Connecting,
            OPEN => TransportState::Open,
            _ => TransportState::Closed,
        }
    }

    async fn accept(&self) -> Result<(), TransportError> {
        // The HTTP upgrade already happened; accepting only opens the
        // transport for frames.
        match self
            .state
            .compare_exchange(CONNECTING, OPEN, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) | Err(OPEN) => Ok(()),
            Err(_) => Err(TransportError::Handshake(
                "connection closed before it was accepted".into(),
            )),
        }
    }

    async fn receive(&self) -> Option<Payload> {
        if self.is_closed() {
            return None;
        }

        let frame = self.stream.lock().await.next().await;
        match frame {
            Some(Ok(Message::Text(text))) => self.decode(text.as_bytes()),
            Some(Ok(Message::Binary(bytes))) => self.decode(&bytes),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => None,
            Some(Ok(Message::Close(frame))) => {
                self.mark_closed();
                tracing::info!(
                    code = frame.as_ref().map(|f| f.code),
                    "websocket closed by peer"
                );
                None
            }
            Some(Err(e)) => {
                self.mark_closed();
                tracing::warn!(error = %e, "websocket receive failed");
                None
            }
            None => {
                self.mark_closed();
                tracing::warn!("websocket disconnected by peer");
                None
            }
        }
    }

    async fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        match self.state() {
            TransportState::Open => {}
            TransportState::Closed => {
                tracing::error!("send called on a closed websocket transport");
                return Err(TransportError::Closed);
            }
            TransportState::Connecting => {
                tracing::error!("send called before the websocket transport was accepted");
                return Err(TransportError::Handshake("transport not accepted".into()));
            }
        }

        let text = serde_json::to_string(payload)?;
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(text)).await {
            self.mark_closed();
            return Err(TransportError::Io(e.to_string()));
        }
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) {
        if self.state.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            return;
        }

        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_owned()),
        };
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, code, "close frame not delivered");
        }
    }
}
