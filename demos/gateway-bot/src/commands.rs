//! Demo command handlers.

use async_trait::async_trait;
use gateway_core::{CommandHandler, Interaction, ObjectKey, SharedCache};
use gateway_rest::{InteractionReply, MessageTemplate, Responder, TemplateEdit};
use serde_json::json;

pub const SHIFT_ID: &str = "shift";

const HELP_TEXT: &str = "`/banner <text>` posts a banner. Press the arrow to rotate it.";

pub struct Help {
    pub responder: Responder,
}

#[async_trait]
impl CommandHandler for Help {
    async fn handle(&self, interaction: Interaction) {
        self.responder
            .reply(&interaction, InteractionReply::message(HELP_TEXT).ephemeral());
    }
}

/// Posts a banner with a rotate button built from a shared template.
pub struct Banner {
    pub responder: Responder,
    pub template: MessageTemplate,
}

impl Banner {
    pub fn template() -> MessageTemplate {
        MessageTemplate::new(json!({
            "content": "",
            "components": [{
                "type": 1,
                "components": [{ "type": 2, "style": 1, "label": "", "custom_id": SHIFT_ID }]
            }]
        }))
    }
}

#[async_trait]
impl CommandHandler for Banner {
    async fn handle(&self, interaction: Interaction) {
        let text = interaction
            .data
            .options
            .iter()
            .find(|option| option["name"] == "text")
            .and_then(|option| option["value"].as_str())
            .unwrap_or("hello")
            .to_string();

        let rendered = match self.template.render(&[
            TemplateEdit::new("/content", text.clone()),
            TemplateEdit::new("/components/0/components/0/label", "\u{27f3}"),
        ]) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!("Failed to render banner: {e}");
                return;
            }
        };

        let reply = InteractionReply::message(text).with_components(rendered["components"].clone());
        self.responder.reply(&interaction, reply);
    }
}

/// Rotates the banner text by one character.
pub struct Shift {
    pub responder: Responder,
    pub cache: SharedCache<ObjectKey, String>,
}

#[async_trait]
impl CommandHandler for Shift {
    async fn handle(&self, interaction: Interaction) {
        let (Some(channel_id), Some(message_id)) = (
            interaction.channel_id.clone(),
            interaction.message_id().map(str::to_string),
        ) else {
            tracing::debug!(id = %interaction.id, "Shift without a message");
            return;
        };

        let responder = self.responder.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let content = match responder
                .fetch_message_content(&cache, &channel_id, &message_id)
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(%channel_id, %message_id, "Failed to fetch banner: {e}");
                    return;
                }
            };

            let rotated = rotate(&content);
            cache.put(ObjectKey::new(&channel_id, &message_id), rotated.clone());
            responder.reply(&interaction, InteractionReply::update(rotated));
        });
    }
}

fn rotate(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        let mut rotated: String = chars.collect();
        rotated.push(first);
        rotated
    })
}
