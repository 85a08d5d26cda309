//! Request and response bodies for the REST endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message flag: only the invoking user can see the reply.
pub const EPHEMERAL: u64 = 1 << 6;

/// Command type for chat-input (slash) commands.
pub const CHAT_INPUT: u8 = 1;

/// Response returned by gateway discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    /// WebSocket URL to connect to.
    pub url: String,
    /// Recommended shard count.
    #[serde(default)]
    pub shards: Option<u32>,
}

/// Declaration of a command or component identifier.
///
/// Only declarations with a `kind` are published; component identifiers
/// exist purely for local dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDeclaration {
    /// Identifier the registry dispatches on.
    pub name: String,
    /// Command type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Option schema, passed through as-is.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

impl CommandDeclaration {
    /// A chat-input command.
    #[must_use]
    pub fn slash(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(CHAT_INPUT),
            description: Some(description.into()),
            options: Vec::new(),
        }
    }

    /// A component identifier, used for local dispatch only.
    #[must_use]
    pub fn component(custom_id: impl Into<String>) -> Self {
        Self {
            name: custom_id.into(),
            kind: None,
            description: None,
            options: Vec::new(),
        }
    }

    /// Add an option schema.
    #[must_use]
    pub fn with_option(mut self, option: Value) -> Self {
        self.options.push(option);
        self
    }
}

/// How an interaction is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Post a new message.
    Message,
    /// Acknowledge now, edit later.
    Deferred,
    /// Replace the message the component was attached to.
    UpdateMessage,
}

impl ReplyKind {
    /// Wire value of the callback type.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Message => 4,
            Self::Deferred => 6,
            Self::UpdateMessage => 7,
        }
    }
}

/// Body of a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplyData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Value>,
    pub flags: u64,
}

/// Interaction callback payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionReply {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<ReplyData>,
}

impl InteractionReply {
    /// Reply with a new message.
    #[must_use]
    pub fn message(content: impl Into<String>) -> Self {
        Self::with_content(ReplyKind::Message, content)
    }

    /// Replace the originating message.
    #[must_use]
    pub fn update(content: impl Into<String>) -> Self {
        Self::with_content(ReplyKind::UpdateMessage, content)
    }

    /// Acknowledge without content.
    #[must_use]
    pub const fn deferred() -> Self {
        Self {
            kind: ReplyKind::Deferred.code(),
            data: None,
        }
    }

    fn with_content(kind: ReplyKind, content: impl Into<String>) -> Self {
        Self {
            kind: kind.code(),
            data: Some(ReplyData {
                content: Some(content.into()),
                ..ReplyData::default()
            }),
        }
    }

    /// Attach components (action rows).
    #[must_use]
    pub fn with_components(mut self, components: Value) -> Self {
        self.data.get_or_insert_with(ReplyData::default).components = Some(components);
        self
    }

    /// Make the reply visible only to the invoking user.
    #[must_use]
    pub fn ephemeral(mut self) -> Self {
        self.data.get_or_insert_with(ReplyData::default).flags |= EPHEMERAL;
        self
    }

    /// Callback type code.
    #[must_use]
    pub const fn kind(&self) -> u8 {
        self.kind
    }

    /// Reply body, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&ReplyData> {
        self.data.as_ref()
    }
}

/// Body of a message edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Value>,
}

impl MessageEdit {
    /// Replace the message content.
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            components: None,
        }
    }
}

/// A fetched message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub components: Vec<Value>,
}
