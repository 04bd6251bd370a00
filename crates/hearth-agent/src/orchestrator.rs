//! Bounded Generate ↔ ToolInvoke loop with incremental streaming.

use std::sync::Arc;

use hearth_core::HearthConfig;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use crate::tool::ToolRegistry;
use crate::types::{
    AgentEvent, AgentStream, ChatMessage, GenerativeModel, ModelEvent, ModelTurn, TokenUsage,
    ToolCall, ToolLogEntry,
};

/// Hard cap on model turns per request.
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Drives a bounded conversation loop between the caller, a generative
/// model, and the registered tools, streaming output incrementally.
pub struct AgentOrchestrator {
    model: Arc<dyn GenerativeModel>,
    tools: Arc<ToolRegistry>,
    max_steps: usize,
}

impl AgentOrchestrator {
    pub fn new(model: Arc<dyn GenerativeModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Build an orchestrator with the step cap taken from the top-level
    /// configuration.
    pub fn from_config(
        model: Arc<dyn GenerativeModel>,
        tools: Arc<ToolRegistry>,
        config: &HearthConfig,
    ) -> Self {
        Self::new(model, tools).with_max_steps(config.max_steps)
    }

    /// Run one request: ordered conversation history plus a fixed
    /// system instruction, returning a live stream of events.
    ///
    /// The Generate↔ToolInvoke cycle executes at most `max_steps`
    /// model turns; hitting the cap terminates with whatever text has
    /// been produced, even if the model asked for another tool call.
    /// A model transport failure yields `AgentEvent::Error` and stops
    /// the stream with no partial success claimed.
    pub fn run(&self, history: Vec<ChatMessage>, system: impl Into<String>) -> AgentStream {
        let model = self.model.clone();
        let tools = self.tools.clone();
        let max_steps = self.max_steps;
        let system = system.into();

        Box::pin(async_stream::stream! {
            let mut messages = history;
            let mut usage_total = TokenUsage::default();
            let mut tool_log: Vec<ToolLogEntry> = Vec::new();
            let schemas = tools.schemas();
            let mut step = 0usize;

            loop {
                step += 1;
                debug!("Model turn {}/{}", step, max_steps);

                let mut turn_stream = model.converse(ModelTurn {
                    system: system.clone(),
                    messages: messages.clone(),
                    tools: schemas.clone(),
                });

                let mut turn_text = String::new();
                let mut turn_calls: Vec<ToolCall> = Vec::new();
                let mut finish_reason = String::from("stop");

                while let Some(event) = turn_stream.next().await {
                    match event {
                        ModelEvent::TextDelta(delta) => {
                            turn_text.push_str(&delta);
                            // Tool turns are internal steps; once a call
                            // is seen, the turn's remaining text stays
                            // out of the caller stream.
                            if turn_calls.is_empty() {
                                yield AgentEvent::TextDelta { content: delta };
                            }
                        }
                        ModelEvent::ToolCall(call) => {
                            yield AgentEvent::ToolCallRequested {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            };
                            turn_calls.push(call);
                        }
                        ModelEvent::Done { finish_reason: reason, usage } => {
                            usage_total.add(&usage);
                            finish_reason = reason;
                        }
                        ModelEvent::Error(message) => {
                            error!("Model turn failed: {}", message);
                            yield AgentEvent::Error { error: message };
                            return;
                        }
                    }
                }

                if turn_calls.is_empty() {
                    yield AgentEvent::Done {
                        finish_reason,
                        usage: usage_total,
                        tool_log,
                    };
                    return;
                }

                messages.push(ChatMessage::assistant_tool_calls(
                    turn_text,
                    turn_calls.clone(),
                ));

                if step >= max_steps {
                    info!("Step bound reached after {} turns", step);
                    yield AgentEvent::Done {
                        finish_reason: "max-steps".into(),
                        usage: usage_total,
                        tool_log,
                    };
                    return;
                }

                // Tool calls from one turn run concurrently; the next
                // Generate step waits for every result so the model
                // sees them together.
                let invocations = turn_calls.into_iter().map(|call| {
                    let tools = tools.clone();
                    async move {
                        let result = tools.dispatch(&call.name, call.arguments.clone()).await;
                        (call, result)
                    }
                });
                let results = futures::future::join_all(invocations).await;

                for (call, result) in results {
                    yield AgentEvent::ToolResultReady {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        result: result.clone(),
                    };
                    tool_log.push(ToolLogEntry {
                        name: call.name,
                        arguments: call.arguments,
                        result: result.clone(),
                    });
                    messages.push(ChatMessage::tool_result(call.id, result.to_string()));
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::tool::{error_payload, Tool};
    use crate::types::ToolSchema;

    /// Model that replays a fixed script of turns.
    struct ScriptedModel {
        turns: Mutex<Vec<Vec<ModelEvent>>>,
        turns_taken: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Vec<ModelEvent>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns),
                turns_taken: AtomicUsize::new(0),
            })
        }
    }

    impl GenerativeModel for ScriptedModel {
        fn converse(&self, _turn: ModelTurn) -> crate::types::ModelStream {
            self.turns_taken.fetch_add(1, Ordering::SeqCst);
            let mut turns = self.turns.lock();
            let events = if turns.is_empty() {
                vec![done("stop")]
            } else {
                turns.remove(0)
            };
            Box::pin(futures::stream::iter(events))
        }
    }

    /// Model that requests a tool call on every single turn.
    struct AlwaysToolModel {
        turns_taken: AtomicUsize,
    }

    impl GenerativeModel for AlwaysToolModel {
        fn converse(&self, _turn: ModelTurn) -> crate::types::ModelStream {
            self.turns_taken.fetch_add(1, Ordering::SeqCst);
            Box::pin(futures::stream::iter(vec![
                ModelEvent::ToolCall(ToolCall {
                    id: "call_loop".into(),
                    name: "echo".into(),
                    arguments: json!({"query": "again"}),
                }),
                done("tool_calls"),
            ]))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo arguments back".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, arguments: serde_json::Value) -> serde_json::Value {
            json!({"success": true, "echo": arguments})
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "broken".into(),
                description: "Always fails".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, _arguments: serde_json::Value) -> serde_json::Value {
            error_payload("backend unreachable")
        }
    }

    fn done(reason: &str) -> ModelEvent {
        ModelEvent::Done {
            finish_reason: reason.into(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        }
    }

    fn registry_with(tool: Arc<dyn Tool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        Arc::new(registry)
    }

    async fn collect(stream: AgentStream) -> Vec<AgentEvent> {
        stream.collect().await
    }

    fn deltas(events: &[AgentEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::TextDelta { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_plain_text_turn() {
        let model = ScriptedModel::new(vec![vec![
            ModelEvent::TextDelta("Hello ".into()),
            ModelEvent::TextDelta("world".into()),
            done("stop"),
        ]]);
        let orch = AgentOrchestrator::new(model.clone(), registry_with(Arc::new(EchoTool)));

        let events = collect(orch.run(vec![ChatMessage::user("hi")], "be brief")).await;
        assert_eq!(deltas(&events), "Hello world");
        match events.last().unwrap() {
            AgentEvent::Done { finish_reason, usage, tool_log } => {
                assert_eq!(finish_reason, "stop");
                assert_eq!(usage.prompt_tokens, 10);
                assert!(tool_log.is_empty());
            }
            other => panic!("expected Done, got {:?}", other),
        }
        assert_eq!(model.turns_taken.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tool_roundtrip() {
        let model = ScriptedModel::new(vec![
            vec![
                ModelEvent::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "echo".into(),
                    arguments: json!({"query": "bread"}),
                }),
                done("tool_calls"),
            ],
            vec![ModelEvent::TextDelta("Here is bread.".into()), done("stop")],
        ]);
        let orch = AgentOrchestrator::new(model.clone(), registry_with(Arc::new(EchoTool)));

        let events = collect(orch.run(vec![ChatMessage::user("bread?")], "sys")).await;

        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolCallRequested { name, .. } if name == "echo"
        )));
        let result = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolResultReady { result, .. } => Some(result),
                _ => None,
            })
            .unwrap();
        assert_eq!(result["echo"]["query"], "bread");

        assert_eq!(deltas(&events), "Here is bread.");
        match events.last().unwrap() {
            AgentEvent::Done { finish_reason, usage, tool_log } => {
                assert_eq!(finish_reason, "stop");
                // Usage accumulates across both turns
                assert_eq!(usage.completion_tokens, 10);
                assert_eq!(tool_log.len(), 1);
                assert_eq!(tool_log[0].name, "echo");
            }
            other => panic!("expected Done, got {:?}", other),
        }
        assert_eq!(model.turns_taken.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_step_bound_terminates() {
        let model = Arc::new(AlwaysToolModel {
            turns_taken: AtomicUsize::new(0),
        });
        let orch = AgentOrchestrator::new(model.clone(), registry_with(Arc::new(EchoTool)))
            .with_max_steps(3);

        let events = collect(orch.run(vec![ChatMessage::user("loop")], "sys")).await;

        assert_eq!(model.turns_taken.load(Ordering::SeqCst), 3);
        match events.last().unwrap() {
            AgentEvent::Done { finish_reason, .. } => assert_eq!(finish_reason, "max-steps"),
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_step_cap_follows_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = HearthConfig::from_env(dir.path()).unwrap();
        config.max_steps = 2;

        let model = Arc::new(AlwaysToolModel {
            turns_taken: AtomicUsize::new(0),
        });
        let orch = AgentOrchestrator::from_config(
            model.clone(),
            registry_with(Arc::new(EchoTool)),
            &config,
        );

        let events = collect(orch.run(vec![ChatMessage::user("loop")], "sys")).await;
        assert_eq!(model.turns_taken.load(Ordering::SeqCst), 2);
        match events.last().unwrap() {
            AgentEvent::Done { finish_reason, .. } => assert_eq!(finish_reason, "max-steps"),
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_error_aborts() {
        let model = ScriptedModel::new(vec![vec![
            ModelEvent::TextDelta("partial".into()),
            ModelEvent::Error("connection reset".into()),
        ]]);
        let orch = AgentOrchestrator::new(model, registry_with(Arc::new(EchoTool)));

        let events = collect(orch.run(vec![ChatMessage::user("hi")], "sys")).await;
        match events.last().unwrap() {
            AgentEvent::Error { error } => assert!(error.contains("connection reset")),
            other => panic!("expected Error, got {:?}", other),
        }
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort() {
        let model = ScriptedModel::new(vec![
            vec![
                ModelEvent::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "broken".into(),
                    arguments: json!({}),
                }),
                done("tool_calls"),
            ],
            vec![
                ModelEvent::TextDelta("Sorry, no data.".into()),
                done("stop"),
            ],
        ]);
        let orch = AgentOrchestrator::new(model, registry_with(Arc::new(BrokenTool)));

        let events = collect(orch.run(vec![ChatMessage::user("hi")], "sys")).await;
        let result = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolResultReady { result, .. } => Some(result),
                _ => None,
            })
            .unwrap();
        assert_eq!(result["success"], false);
        assert!(matches!(events.last().unwrap(), AgentEvent::Done { .. }));
    }

    #[tokio::test]
    async fn test_text_after_tool_call_not_forwarded() {
        let model = ScriptedModel::new(vec![
            vec![
                ModelEvent::TextDelta("visible".into()),
                ModelEvent::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "echo".into(),
                    arguments: json!({"query": "x"}),
                }),
                ModelEvent::TextDelta("hidden".into()),
                done("tool_calls"),
            ],
            vec![ModelEvent::TextDelta(" final".into()), done("stop")],
        ]);
        let orch = AgentOrchestrator::new(model, registry_with(Arc::new(EchoTool)));

        let events = collect(orch.run(vec![ChatMessage::user("hi")], "sys")).await;
        let text = deltas(&events);
        assert!(text.contains("visible"));
        assert!(!text.contains("hidden"));
        assert!(text.contains("final"));
    }

    #[tokio::test]
    async fn test_concurrent_tool_calls_in_one_turn() {
        let model = ScriptedModel::new(vec![
            vec![
                ModelEvent::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "echo".into(),
                    arguments: json!({"query": "first"}),
                }),
                ModelEvent::ToolCall(ToolCall {
                    id: "call_2".into(),
                    name: "echo".into(),
                    arguments: json!({"query": "second"}),
                }),
                done("tool_calls"),
            ],
            vec![ModelEvent::TextDelta("ok".into()), done("stop")],
        ]);
        let orch = AgentOrchestrator::new(model, registry_with(Arc::new(EchoTool)));

        let events = collect(orch.run(vec![ChatMessage::user("hi")], "sys")).await;
        let results: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolResultReady { .. }))
            .collect();
        assert_eq!(results.len(), 2);
        match events.last().unwrap() {
            AgentEvent::Done { tool_log, .. } => assert_eq!(tool_log.len(), 2),
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_error_payload() {
        let model = ScriptedModel::new(vec![
            vec![
                ModelEvent::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "missing".into(),
                    arguments: json!({}),
                }),
                done("tool_calls"),
            ],
            vec![ModelEvent::TextDelta("done".into()), done("stop")],
        ]);
        let orch = AgentOrchestrator::new(model, registry_with(Arc::new(EchoTool)));

        let events = collect(orch.run(vec![ChatMessage::user("hi")], "sys")).await;
        let result = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolResultReady { result, .. } => Some(result),
                _ => None,
            })
            .unwrap();
        assert_eq!(result["success"], false);
    }
}
