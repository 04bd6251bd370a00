//! OpenAI-compatible streaming chat provider with tool-call support.
//!
//! Tokens arrive as SSE `data:` lines. Tool calls arrive as fragmented
//! deltas keyed by index; the id, name, and argument string accumulate
//! across chunks and are parsed once the turn ends.

use futures::Stream;
use hearth_core::Error;
use reqwest::Client;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::config::LlmConfig;
use crate::types::{
    ChatMessage, GenerativeModel, ModelEvent, ModelStream, ModelTurn, TokenUsage, ToolCall,
    ToolSchema,
};

/// Remote model speaking the OpenAI `/v1/chat/completions` protocol.
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: usize,
}

impl OpenAiChatModel {
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

impl GenerativeModel for OpenAiChatModel {
    fn converse(&self, turn: ModelTurn) -> ModelStream {
        Box::pin(stream_chat(
            self.client.clone(),
            format!("{}/chat/completions", self.base_url),
            self.api_key.clone(),
            self.model.clone(),
            self.temperature,
            self.max_tokens,
            turn,
        ))
    }
}

/// Serialize a history message into the wire shape.
fn message_to_wire(msg: &ChatMessage) -> serde_json::Value {
    match (&msg.tool_calls, &msg.tool_call_id) {
        (Some(calls), _) => {
            let wire_calls: Vec<serde_json::Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({"role": msg.role, "content": msg.content, "tool_calls": wire_calls})
        }
        (None, Some(call_id)) => {
            json!({"role": "tool", "tool_call_id": call_id, "content": msg.content})
        }
        (None, None) => json!({"role": msg.role, "content": msg.content}),
    }
}

fn tool_to_wire(schema: &ToolSchema) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.parameters,
        }
    })
}

/// In-flight tool call accumulated from streamed fragments.
#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn finish(self, fallback_index: usize) -> ToolCall {
        let arguments = serde_json::from_str(&self.arguments)
            .unwrap_or(serde_json::Value::String(self.arguments));
        let id = if self.id.is_empty() {
            format!("call_{}", fallback_index)
        } else {
            self.id
        };
        ToolCall {
            id,
            name: self.name,
            arguments,
        }
    }
}

fn stream_chat(
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: usize,
    turn: ModelTurn,
) -> impl Stream<Item = ModelEvent> + Send + 'static {
    async_stream::stream! {
        let mut msgs = vec![json!({"role": "system", "content": turn.system})];
        msgs.extend(turn.messages.iter().map(message_to_wire));

        let mut body = json!({
            "model": model,
            "messages": msgs,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if !turn.tools.is_empty() {
            body["tools"] = json!(turn.tools.iter().map(tool_to_wire).collect::<Vec<_>>());
        }

        debug!("Streaming from {} with model {}", url, model);

        let response = match client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                yield ModelEvent::Error(Error::Generation(format!("Request failed: {}", e)).to_string());
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield ModelEvent::Error(Error::Generation(format!("API error {}: {}", status, body)).to_string());
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut pending: Vec<PendingToolCall> = Vec::new();
        let mut finish_reason = String::from("stop");
        let mut usage = TokenUsage::default();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield ModelEvent::Error(Error::Generation(format!("Stream read error: {}", e)).to_string());
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Process complete SSE lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() || line.starts_with(':') {
                    continue;
                }

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                if data.trim() == "[DONE]" {
                    for (i, call) in pending.drain(..).enumerate() {
                        yield ModelEvent::ToolCall(call.finish(i));
                    }
                    yield ModelEvent::Done { finish_reason, usage };
                    return;
                }

                let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) else {
                    continue;
                };

                if let Some(u) = parsed.get("usage").filter(|u| !u.is_null()) {
                    usage.prompt_tokens =
                        u["prompt_tokens"].as_u64().unwrap_or(0) as usize;
                    usage.completion_tokens =
                        u["completion_tokens"].as_u64().unwrap_or(0) as usize;
                }

                if let Some(reason) = parsed["choices"][0]["finish_reason"].as_str() {
                    finish_reason = reason.to_string();
                }

                let delta = &parsed["choices"][0]["delta"];

                if let Some(content) = delta["content"].as_str() {
                    if !content.is_empty() {
                        yield ModelEvent::TextDelta(content.to_string());
                    }
                }

                if let Some(fragments) = delta["tool_calls"].as_array() {
                    for fragment in fragments {
                        let index = fragment["index"].as_u64().unwrap_or(0) as usize;
                        while pending.len() <= index {
                            pending.push(PendingToolCall::default());
                        }
                        let slot = &mut pending[index];
                        if let Some(id) = fragment["id"].as_str() {
                            slot.id.push_str(id);
                        }
                        if let Some(name) = fragment["function"]["name"].as_str() {
                            slot.name.push_str(name);
                        }
                        if let Some(args) = fragment["function"]["arguments"].as_str() {
                            slot.arguments.push_str(args);
                        }
                    }
                }
            }
        }

        // Stream ended without [DONE]; flush what we have
        for (i, call) in pending.drain(..).enumerate() {
            yield ModelEvent::ToolCall(call.finish(i));
        }
        yield ModelEvent::Done { finish_reason, usage };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_to_wire_plain() {
        let wire = message_to_wire(&ChatMessage::user("hi"));
        assert_eq!(wire["role"], "user");
        assert_eq!(wire["content"], "hi");
        assert!(wire.get("tool_calls").is_none());
    }

    #[test]
    fn test_message_to_wire_tool_call() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "recipe".into(),
            arguments: json!({"query": "bread"}),
        };
        let wire = message_to_wire(&ChatMessage::assistant_tool_calls("", vec![call]));
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "recipe");
        // Arguments cross the wire as a JSON string
        assert_eq!(
            wire["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"bread\"}"
        );
    }

    #[test]
    fn test_message_to_wire_tool_result() {
        let wire = message_to_wire(&ChatMessage::tool_result("call_1", "{\"success\":true}"));
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn test_transport_failure_yields_generation_error() {
        // Nothing listens on the discard port; the request fails at
        // connect time.
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        let model = OpenAiChatModel::from_config(&config).unwrap();

        let mut stream = model.converse(ModelTurn {
            system: "sys".into(),
            messages: vec![ChatMessage::user("hi")],
            tools: Vec::new(),
        });

        match stream.next().await.unwrap() {
            ModelEvent::Error(message) => {
                assert!(message.contains("Generation error"));
                assert!(message.contains("Request failed"));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_tool_call_finish_parses_arguments() {
        let pending = PendingToolCall {
            id: "call_9".into(),
            name: "recipe".into(),
            arguments: "{\"query\": \"soup\"}".into(),
        };
        let call = pending.finish(0);
        assert_eq!(call.arguments["query"], "soup");
    }

    #[test]
    fn test_pending_tool_call_finish_malformed_arguments() {
        let pending = PendingToolCall {
            id: String::new(),
            name: "recipe".into(),
            arguments: "{not json".into(),
        };
        let call = pending.finish(2);
        assert_eq!(call.id, "call_2");
        // Malformed arguments survive as a raw string for the tool's
        // own validation to reject
        assert!(call.arguments.is_string());
    }
}
