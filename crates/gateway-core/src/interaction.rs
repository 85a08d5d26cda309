//! Inbound interaction events delivered to command handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Interaction type as sent by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum InteractionKind {
    /// Endpoint health check.
    Ping,
    /// A declared command was invoked.
    ApplicationCommand,
    /// A component (button, select menu) on a message was used.
    MessageComponent,
    /// Autocomplete request for a command option.
    Autocomplete,
    /// A modal form was submitted.
    ModalSubmit,
    /// Any type this client does not know about.
    #[default]
    Unknown,
}

impl From<u8> for InteractionKind {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Ping,
            2 => Self::ApplicationCommand,
            3 => Self::MessageComponent,
            4 => Self::Autocomplete,
            5 => Self::ModalSubmit,
            _ => Self::Unknown,
        }
    }
}

impl From<InteractionKind> for u8 {
    fn from(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Ping => 1,
            InteractionKind::ApplicationCommand => 2,
            InteractionKind::MessageComponent => 3,
            InteractionKind::Autocomplete => 4,
            InteractionKind::ModalSubmit => 5,
            InteractionKind::Unknown => 0,
        }
    }
}

/// The `data` object of an interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionData {
    /// Command name, set for command invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Component identifier, set for component interactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    /// Command options as sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
    /// Selected values of a select menu.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Identifier used to look up a handler.
///
/// Resolution order is fixed: a command name wins over a component id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKey<'a> {
    /// Resolved from `data.name`.
    Command(&'a str),
    /// Resolved from `data.custom_id`.
    Component(&'a str),
}

impl<'a> CommandKey<'a> {
    /// The registry identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'a str {
        match self {
            Self::Command(s) | Self::Component(s) => s,
        }
    }
}

/// An interaction-create event.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    /// Interaction id, needed to reply.
    pub id: String,
    /// Continuation token, needed to reply.
    pub token: String,
    /// Interaction type.
    #[serde(rename = "type", default)]
    pub kind: InteractionKind,
    /// Command or component data.
    #[serde(default)]
    pub data: InteractionData,
    /// Channel the interaction happened in.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Guild the interaction happened in, absent in direct messages.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Message a component was attached to.
    #[serde(default)]
    pub message: Option<Value>,
    /// The full event payload as received.
    #[serde(skip)]
    pub payload: Value,
}

impl Interaction {
    /// Parse an interaction from a dispatch payload, keeping the raw payload.
    ///
    /// # Errors
    /// Returns error if required fields are missing or mistyped.
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        let mut interaction = Self::deserialize(&payload)?;
        interaction.payload = payload;
        Ok(interaction)
    }

    /// Resolve the handler identifier for this interaction.
    #[must_use]
    pub fn command_key(&self) -> Option<CommandKey<'_>> {
        if let Some(name) = self.data.name.as_deref() {
            return Some(CommandKey::Command(name));
        }
        self.data.custom_id.as_deref().map(CommandKey::Component)
    }

    /// Content of the message a component was attached to.
    #[must_use]
    pub fn message_content(&self) -> Option<&str> {
        self.message.as_ref()?.get("content")?.as_str()
    }

    /// Id of the message a component was attached to.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref()?.get("id")?.as_str()
    }
}
