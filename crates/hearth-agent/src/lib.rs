//! Agent orchestration for Hearth.
//!
//! Drives a bounded Generate ↔ ToolInvoke loop against a generative
//! model, streaming text to the caller and invoking the retrieval tool
//! on demand. The model and embedding provider are external; only
//! their narrow streaming contracts are consumed here.

pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod tool;
pub mod types;

pub use config::LlmConfig;
pub use orchestrator::{AgentOrchestrator, DEFAULT_MAX_STEPS};
pub use providers::OpenAiChatModel;
pub use retrieval::{RetrievalPolicy, RetrievalTool};
pub use tool::{Tool, ToolRegistry};
pub use types::*;
