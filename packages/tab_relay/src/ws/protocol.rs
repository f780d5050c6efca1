//! WebSocket Protocol Types
//!
//! Message types for client-server communication over the relay WebSocket.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// One tab id or a batch of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TabIds {
    One(String),
    Many(Vec<String>),
}

impl TabIds {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TabIds::One(id) => vec![id],
            TabIds::Many(ids) => ids,
        }
    }
}

/// Messages sent FROM the client TO the server
///
/// Every variant except `Data` is a call carrying a client-chosen `id` that
/// is echoed back in the matching `Result` or `Error` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Bind this connection as an input (browser tab) side of `account`.
    RegisterInput { id: u64, account: String },
    /// Heartbeat one or more tabs of the bound account.
    RegisterInputTab { id: u64, tab_id: TabIds },
    /// Drop one or more tabs of the bound account.
    UnregisterInputTab { id: u64, tab_id: TabIds },
    /// Bind this connection as the controller of `account` and subscribe to
    /// the account's delivery group.
    RegisterOutput { id: u64, account: String },
    /// List live tabs of the bound account (controller only).
    GetTabs { id: u64 },
    /// Push a command to one tab, or to a random live tab when `tab_id` is
    /// omitted (controller only).
    InjectData {
        id: u64,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<String>,
    },
    /// Tab data to relay to the account's controller. Never answered.
    Data { tab_id: String, data: String },
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// First frame on every connection. `signature` is the server identity's
    /// ed25519 signature over `connection_id`.
    Welcome {
        connection_id: String,
        server_key: String,
        fingerprint: String,
        signature: String,
    },
    /// Successful call result
    Result { id: u64, value: serde_json::Value },
    /// Failed call, or an unparseable frame (`id` absent)
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        code: String,
        message: String,
    },
    /// Data produced by a tab
    Received { tab_id: String, data: String },
    /// Command routed to a tab
    Inject { data: String, tab_id: String },
    /// Tab expired and was pruned from the registry
    TabRemoved { tab_id: String },
}

impl ServerMessage {
    pub fn call_error(id: u64, err: &RelayError) -> Self {
        ServerMessage::Error {
            id: Some(id),
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}
