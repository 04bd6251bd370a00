//! Tool trait and capability registry.
//!
//! Tools are the unit the orchestrator can invoke on the model's
//! behalf. `invoke` never returns `Err`: schema failures, provider
//! outages, and empty result sets are all folded into a structured
//! `{success: false, message}` payload so the model can decide how to
//! proceed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::types::ToolSchema;

/// A named, schema-validated capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Execute with raw model-supplied arguments. Must not panic or
    /// error; failures become error payloads.
    async fn invoke(&self, arguments: serde_json::Value) -> serde_json::Value;
}

/// Structured failure payload fed back to the model as a tool result.
pub fn error_payload(message: impl Into<String>) -> serde_json::Value {
    json!({"success": false, "message": message.into()})
}

/// Mapping from tool name to handler.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.schema().name, tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for every registered tool, sorted by name for a stable
    /// surface across turns.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch a tool call by name. Unknown names yield an error
    /// payload, never an Err across the loop boundary.
    pub async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(arguments).await,
            None => {
                warn!("Model requested unknown tool: {}", name);
                error_payload(format!("unknown tool: {}", name))
            }
        }
    }
}
