//! WebSocket Module
//!
//! Relay wire protocol, per-connection handler and message dispatch.

mod dispatch;
mod handler;
mod protocol;

pub use handler::handle_relay_ws;
pub use protocol::{ClientMessage, ServerMessage, TabIds};
