//! Concrete transports. The contract itself lives in
//! [`bg_protocol::Transport`].

pub mod ws;

pub use ws::WsTransport;
