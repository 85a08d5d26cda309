//! Session configuration.

use std::time::Duration;

use secrecy::SecretString;

use crate::protocol::{ConnectionProperties, ShardInfo};

const DEFAULT_HEARTBEAT_POLL: Duration = Duration::from_millis(500);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bot credential, sent in Identify and Resume.
    pub token: SecretString,
    /// Gateway intents bitmask.
    pub intents: u64,
    /// Shard served by this session, if sharded.
    pub shard: Option<ShardInfo>,
    /// Fixed gateway URL. Skips discovery when set.
    pub gateway_url: Option<String>,
    /// Client description sent in Identify.
    pub properties: ConnectionProperties,
    /// How often the heartbeat driver checks whether a beat is due.
    pub heartbeat_poll: Duration,
    /// Upper bound on opening the socket and completing the upgrade.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Create a config with no intents, no sharding and discovery enabled.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            intents: 0,
            shard: None,
            gateway_url: None,
            properties: ConnectionProperties::default(),
            heartbeat_poll: DEFAULT_HEARTBEAT_POLL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub const fn with_shard(mut self, id: u32, total: u32) -> Self {
        self.shard = Some(ShardInfo { id, total });
        self
    }

    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_heartbeat_poll(mut self, poll: Duration) -> Self {
        self.heartbeat_poll = poll.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
