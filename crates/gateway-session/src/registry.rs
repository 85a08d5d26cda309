//! Command registry: identifier to handler.

use std::{collections::HashMap, sync::Arc};

use gateway_core::CommandHandler;

/// Handlers keyed by command name or component identifier.
///
/// Filled before the session connects and only read afterwards.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `identifier`.
    pub fn insert(&mut self, identifier: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let identifier = identifier.into();
        if self.handlers.insert(identifier.clone(), handler).is_some() {
            tracing::warn!(command = %identifier, "Replaced existing command handler");
        }
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(identifier).cloned()
    }

    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.handlers.contains_key(identifier)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
