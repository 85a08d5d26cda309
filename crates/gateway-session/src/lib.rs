//! Resumable gateway session.
//!
//! This crate provides:
//! - `SessionClient` - Identify/resume handshake, frame routing, close classification
//! - `HeartbeatDriver` - Cancellable liveness loop with dead-peer detection
//! - `CommandRegistry` - Handlers keyed by command or component identifier
//! - `run_session` - Reconnect loop with backoff

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod writer;

pub use client::{ConnectOutcome, SessionClient};
pub use config::SessionConfig;
pub use driver::run_session;
pub use error::SessionError;
pub use heartbeat::{
    ConnectionSignal, HeartbeatDriver, HeartbeatExit, HeartbeatState, HeartbeatTiming,
};
pub use protocol::{ConnectionProperties, OpCode, ShardInfo};
pub use registry::CommandRegistry;
pub use writer::{FrameWriter, GatewayWriter};
