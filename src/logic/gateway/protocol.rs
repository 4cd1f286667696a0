//! Gateway Wire Protocol
//!
//! Newline-delimited JSON frames over a persistent bidirectional channel.
//! Three frame shapes: request, response (correlated by id), and
//! unsolicited event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RPC methods spoken to the agent host.
pub mod methods {
    pub const CONNECT: &str = "connect";
    pub const SESSIONS_STOP: &str = "sessions.stop";
    pub const AGENT_STOP: &str = "agent.stop";
}

/// Unsolicited event sent by the peer once the handshake is accepted.
pub const EVENT_HELLO_OK: &str = "hello-ok";

// ============================================================================
// FRAMES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Frames the client can receive. Events carry a `type` tag; anything
/// else with `id` and `ok` is a correlated response.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncomingFrame {
    Event(EventFrame),
    Response(ResponseFrame),
}

// ============================================================================
// TESTS
// ============================================================================
