//! Conversation, tool, and stream event types.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// Chat message in conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Tool invocations requested by an assistant turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on role="tool" messages carrying a tool result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn that requested one or more tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Tool result fed back to the model.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A structured request, emitted by the model, to execute a named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Token usage accumulated across model turns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(rename = "promptTokens")]
    pub prompt_tokens: usize,
    #[serde(rename = "completionTokens")]
    pub completion_tokens: usize,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Declared input schema for one tool, handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the tool's arguments.
    pub parameters: serde_json::Value,
}

/// One event within a single model turn.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolCall),
    Done {
        finish_reason: String,
        usage: TokenUsage,
    },
    /// Transport or protocol failure; aborts the whole request.
    Error(String),
}

/// Boxed stream of events from one model turn.
pub type ModelStream = Pin<Box<dyn Stream<Item = ModelEvent> + Send>>;

/// Everything the model sees for one Generate step.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
}

/// Opaque streaming turn-taking protocol over a generative model.
pub trait GenerativeModel: Send + Sync {
    fn converse(&self, turn: ModelTurn) -> ModelStream;
}

/// Record of one tool invocation, surfaced for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLogEntry {
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
}

/// Events streamed to the orchestration caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "token")]
    TextDelta { content: String },
    #[serde(rename = "toolCall")]
    ToolCallRequested {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    #[serde(rename = "toolResult")]
    ToolResultReady {
        id: String,
        name: String,
        result: serde_json::Value,
    },
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "finishReason")]
        finish_reason: String,
        usage: TokenUsage,
        #[serde(rename = "toolLog")]
        tool_log: Vec<ToolLogEntry>,
    },
    #[serde(rename = "error")]
    Error { error: String },
}

/// Boxed stream of events delivered to the caller.
pub type AgentStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;
