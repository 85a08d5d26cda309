//! Reusable message bodies with per-use substitutions.

use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;

/// Template error.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid edit: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("Failed to apply edit: {0}")]
    Patch(#[from] json_patch::PatchError),
}

/// A single substitution: replace the value at a JSON pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEdit {
    pub pointer: String,
    pub value: Value,
}

impl TemplateEdit {
    #[must_use]
    pub fn new(pointer: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            pointer: pointer.into(),
            value: value.into(),
        }
    }
}

/// Immutable message body shared between renders.
///
/// Each render works on its own copy, so concurrent handlers never observe
/// each other's substitutions.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    base: Arc<Value>,
}

impl MessageTemplate {
    #[must_use]
    pub fn new(base: Value) -> Self {
        Self {
            base: Arc::new(base),
        }
    }

    /// The unmodified body.
    #[must_use]
    pub fn base(&self) -> &Value {
        &self.base
    }

    /// A fresh copy of the body with `edits` applied in order.
    ///
    /// # Errors
    /// Returns error if a pointer is malformed or does not exist in the body.
    pub fn render(&self, edits: &[TemplateEdit]) -> Result<Value, TemplateError> {
        let ops: Vec<Value> = edits
            .iter()
            .map(|edit| json!({ "op": "replace", "path": edit.pointer, "value": edit.value }))
            .collect();
        let patch: json_patch::Patch = serde_json::from_value(Value::Array(ops))?;

        let mut rendered = Value::clone(&self.base);
        json_patch::patch(&mut rendered, &patch.0)?;
        Ok(rendered)
    }
}
