//! Shared domain types for botgate: configuration, errors and structured
//! trace events used by every crate in the workspace.

pub mod config;
pub mod error;
pub mod trace;

pub use error::{Error, Result};
