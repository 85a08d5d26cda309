//! REST side of the gateway: discovery, command declaration, replies.

mod client;
mod pool;
mod responder;
mod template;
mod types;

pub use client::{DEFAULT_API_BASE, RestClient, RestConfig, RestError};
pub use pool::{DEFAULT_POOL_WIDTH, RequestPool};
pub use responder::Responder;
pub use template::{MessageTemplate, TemplateEdit, TemplateError};
pub use types::{
    CHAT_INPUT, CommandDeclaration, EPHEMERAL, GatewayInfo, InteractionReply, Message,
    MessageEdit, ReplyData, ReplyKind,
};
