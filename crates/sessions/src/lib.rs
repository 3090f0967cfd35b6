//! Bot sessions and the process-wide session registry.
//!
//! A session is one authenticated bot connection. WebSocket sessions are
//! registered under their [`SelfId`](bg_protocol::SelfId) for as long as the
//! connection lives; at most one live session exists per identity.

pub mod registry;
pub mod session;

pub use registry::{RegisterResult, RegistrationGuard, SessionRegistry};
pub use session::{BotSession, Session, SessionInfo};
