//! botgate: HTTP and WebSocket ingress for chat-platform bot adapters.
//!
//! Inbound connections are authenticated by their named [`adapter`], bound to
//! a bot session, tracked in the session registry and have every received
//! event handed to the session's message handler through the fire-and-forget
//! [`dispatch`] core.

pub mod adapter;
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod hooks;
pub mod state;
pub mod transport;

pub use driver::Driver;
pub use state::AppState;
