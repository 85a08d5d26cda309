//! REST client for the gateway's request/response API.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{CommandDeclaration, GatewayInfo, InteractionReply, Message, MessageEdit};

/// Default versioned API root.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Interactive replies must land quickly; a slow reply is as good as none.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

const ERROR_BODY_SNIPPET_LEN: usize = 220;

/// REST error.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: StatusCode, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Versioned API root, without trailing slash.
    pub api_base: String,
    /// Application the commands are declared for.
    pub application_id: String,
    /// Bot credential.
    pub token: SecretString,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl RestConfig {
    /// Create a config with default API base and timeout.
    #[must_use]
    pub fn new(application_id: impl Into<String>, token: SecretString) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            application_id: application_id.into(),
            token,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the API root.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Bearer-authenticated REST client.
///
/// Every call is a single attempt; callers decide whether to retry.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    api_base: String,
    application_id: String,
    authorization: SecretString,
    request_timeout: Duration,
}

impl RestClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, RestError> {
        let http = Client::builder()
            .user_agent(concat!("gateway-kit (", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;
        let authorization = SecretString::from(format!("Bot {}", config.token.expose_secret()));

        Ok(Self {
            http,
            api_base: config.api_base,
            application_id: config.application_id,
            authorization,
            request_timeout: config.request_timeout,
        })
    }

    /// Look up the WebSocket endpoint.
    ///
    /// # Errors
    /// Returns error on transport failure, non-success status, or bad body.
    pub async fn discover_gateway(&self) -> Result<GatewayInfo, RestError> {
        let body = self.send(self.request(Method::GET, "/gateway/bot")).await?;
        parse(&body)
    }

    /// Declare a command with the remote service.
    ///
    /// Declaring an existing command again overwrites it.
    ///
    /// # Errors
    /// Returns error on transport failure or non-success status.
    pub async fn declare_command(&self, command: &CommandDeclaration) -> Result<(), RestError> {
        let path = format!("/applications/{}/commands", self.application_id);
        self.send(self.request(Method::POST, &path).json(command))
            .await
            .map(drop)
    }

    /// Answer an interaction.
    ///
    /// # Errors
    /// Returns error on transport failure or non-success status.
    pub async fn reply_to_interaction(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        reply: &InteractionReply,
    ) -> Result<(), RestError> {
        let path = format!("/interactions/{interaction_id}/{interaction_token}/callback");
        self.send(self.request(Method::POST, &path).json(reply))
            .await
            .map(drop)
    }

    /// Edit a previously sent message.
    ///
    /// # Errors
    /// Returns error on transport failure or non-success status.
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &MessageEdit,
    ) -> Result<(), RestError> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        self.send(self.request(Method::PATCH, &path).json(edit))
            .await
            .map(drop)
    }

    /// Fetch a message.
    ///
    /// # Errors
    /// Returns error on transport failure, non-success status, or bad body.
    pub async fn get_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, RestError> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        let body = self.send(self.request(Method::GET, &path)).await?;
        parse(&body)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .header(reqwest::header::AUTHORIZATION, self.authorization.expose_secret())
            .timeout(self.request_timeout)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String, RestError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RestError::RequestFailed {
                status,
                body: summarize_error_body(&body),
            });
        }
        Ok(body)
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, RestError> {
    Ok(serde_json::from_str(body)?)
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_SNIPPET_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
