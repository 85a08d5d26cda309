//! Session error types.

use gateway_rest::RestError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Session error.
///
/// Only [`SessionError::Discovery`] escapes [`crate::SessionClient::connect`];
/// the rest are logged and folded into a reconnect outcome.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Gateway discovery failed: {0}")]
    Discovery(#[source] RestError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),
    #[error("Connection already closed")]
    Closed,
}
