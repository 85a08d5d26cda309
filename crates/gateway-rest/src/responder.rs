//! Consumer-side helpers combining the REST client with the request pool.

use gateway_core::{Interaction, ObjectKey, SharedCache};
use tokio::task::JoinHandle;

use crate::{InteractionReply, Message, MessageEdit, RequestPool, RestClient, RestError};

/// Handle given to command handlers for talking back to the service.
///
/// Replies and edits are queued on the pool and return immediately;
/// fetches are awaited by the caller.
#[derive(Clone)]
pub struct Responder {
    client: RestClient,
    pool: RequestPool,
}

impl Responder {
    /// Create a responder.
    #[must_use]
    pub const fn new(client: RestClient, pool: RequestPool) -> Self {
        Self { client, pool }
    }

    /// Underlying REST client.
    #[must_use]
    pub const fn client(&self) -> &RestClient {
        &self.client
    }

    /// Queue a reply to `interaction`.
    pub fn reply(&self, interaction: &Interaction, reply: InteractionReply) -> JoinHandle<()> {
        self.reply_to(interaction.id.clone(), interaction.token.clone(), reply)
    }

    /// Queue a reply to an interaction by id and token.
    pub fn reply_to(
        &self,
        interaction_id: String,
        interaction_token: String,
        reply: InteractionReply,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        self.pool.spawn("reply_to_interaction", async move {
            client
                .reply_to_interaction(&interaction_id, &interaction_token, &reply)
                .await
        })
    }

    /// Queue an edit of a previously sent message.
    pub fn edit_message(
        &self,
        channel_id: String,
        message_id: String,
        edit: MessageEdit,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        self.pool.spawn("edit_message", async move {
            client.edit_message(&channel_id, &message_id, &edit).await
        })
    }

    /// Fetch a message.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, RestError> {
        self.client.get_message(channel_id, message_id).await
    }

    /// Message content, served from `cache` when present.
    ///
    /// A miss fetches the message and stores its content.
    ///
    /// # Errors
    /// Returns error if the cache misses and the fetch fails.
    pub async fn fetch_message_content(
        &self,
        cache: &SharedCache<ObjectKey, String>,
        channel_id: &str,
        message_id: &str,
    ) -> Result<String, RestError> {
        let key = ObjectKey::new(channel_id, message_id);
        if let Some(content) = cache.get(&key) {
            tracing::debug!(key = %key, "Message cache hit");
            return Ok(content);
        }

        let message = self.get_message(channel_id, message_id).await?;
        cache.put(key, message.content.clone());
        Ok(message.content)
    }
}
