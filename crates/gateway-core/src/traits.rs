//! Consumer-facing traits.

use std::future::Future;

use async_trait::async_trait;

use crate::Interaction;

/// Callback invoked for a registered command or component identifier.
///
/// Handlers run on the session's frame reader, so they should hand slow
/// work (REST replies, edits) to a request pool rather than await it.
/// Anything a handler wants to report goes through its own reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one interaction.
    async fn handle(&self, interaction: Interaction);
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(Interaction) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, interaction: Interaction) {
        (self)(interaction).await;
    }
}
