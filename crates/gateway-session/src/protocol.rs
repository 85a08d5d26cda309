//! Gateway wire protocol: envelopes, opcodes, handshake payloads.

use gateway_core::Interaction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SessionError;

/// API version negotiated in the gateway URL.
pub const GATEWAY_VERSION: u8 = 10;

/// Close codes after which the session can never be resumed.
///
/// 1000 is a normal closure, which invalidates the session server side.
/// The 40xx codes are authentication, sharding and intent failures.
pub const UNRECOVERABLE_CLOSE_CODES: [u16; 7] = [1000, 4004, 4010, 4011, 4012, 4013, 4014];

/// Close code the client uses when it wants the session kept alive.
pub const RESUMABLE_CLIENT_CLOSE: u16 = 4000;

/// Whether a close code rules out a resume.
#[must_use]
pub fn is_unrecoverable(code: u16) -> bool {
    UNRECOVERABLE_CLOSE_CODES.contains(&code)
}

/// Gateway operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Dispatch,
    Heartbeat,
    Identify,
    Resume,
    Reconnect,
    InvalidSession,
    Hello,
    HeartbeatAck,
}

impl OpCode {
    /// Decode a wire opcode. Unknown codes yield `None`.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            6 => Self::Resume,
            7 => Self::Reconnect,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            _ => return None,
        })
    }

    /// Wire value.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
        }
    }
}

/// An inbound frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl Envelope {
    /// Parse a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolDesync` if the frame is not a valid envelope.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::ProtocolDesync(e.to_string()))
    }

    /// Decoded opcode, if known.
    #[must_use]
    pub const fn opcode(&self) -> Option<OpCode> {
        OpCode::from_code(self.op)
    }
}

/// An outbound frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame<T> {
    op: u8,
    d: T,
}

impl<T: Serialize> Frame<T> {
    /// Wrap a payload.
    pub const fn new(op: OpCode, d: T) -> Self {
        Self { op: op.code(), d }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn to_text(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Heartbeat carrying the last seen sequence number.
#[must_use]
pub const fn heartbeat(sequence: u64) -> Frame<u64> {
    Frame::new(OpCode::Heartbeat, sequence)
}

/// Client description sent with Identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Initial presence sent with Identify.
#[derive(Debug, Clone, Serialize)]
pub struct Presence {
    pub status: &'static str,
    pub afk: bool,
}

impl Default for Presence {
    fn default() -> Self {
        Self {
            status: "online",
            afk: false,
        }
    }
}

/// Shard this session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardInfo {
    pub id: u32,
    pub total: u32,
}

impl Serialize for ShardInfo {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.id, self.total].serialize(serializer)
    }
}

/// Payload of an Identify frame.
#[derive(Serialize)]
pub struct IdentifyPayload<'a> {
    pub token: &'a str,
    pub properties: &'a ConnectionProperties,
    pub presence: Presence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardInfo>,
    pub intents: u64,
}

/// Payload of a Resume frame.
#[derive(Serialize)]
pub struct ResumePayload<'a> {
    pub token: &'a str,
    pub session_id: &'a str,
    pub seq: u64,
}

/// Payload of a Hello frame.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HelloPayload {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

/// Payload of the ready event.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

/// A dispatch event this client acts on.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready(ReadyPayload),
    Resumed,
    InteractionCreate(Box<Interaction>),
    Other(String),
}

impl GatewayEvent {
    /// Decode a dispatch by event name.
    ///
    /// # Errors
    /// Returns `ProtocolDesync` if a known event has a malformed payload.
    pub fn parse(name: &str, d: Value) -> Result<Self, SessionError> {
        let desync = |e: serde_json::Error| SessionError::ProtocolDesync(format!("{name}: {e}"));
        Ok(match name {
            "READY" => Self::Ready(ReadyPayload::deserialize(&d).map_err(desync)?),
            "RESUMED" => Self::Resumed,
            "INTERACTION_CREATE" => {
                Self::InteractionCreate(Box::new(Interaction::from_payload(d).map_err(desync)?))
            }
            other => Self::Other(other.to_string()),
        })
    }
}

/// Append the version and encoding query to a gateway base URL.
#[must_use]
pub fn versioned_url(base: &str) -> String {
    format!(
        "{}/?v={GATEWAY_VERSION}&encoding=json",
        base.trim_end_matches('/')
    )
}
