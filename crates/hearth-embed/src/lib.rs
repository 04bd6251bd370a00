//! Text embedding for Hearth.
//!
//! The `EmbeddingProvider` trait abstracts over embedding generation;
//! the core consumes it, it does not implement a model. The shipped
//! implementation calls an OpenAI-compatible `/v1/embeddings` endpoint.

pub mod prepare;
pub mod provider;

pub use prepare::prepare_for_embedding;
pub use provider::{EmbeddingProvider, OpenAiEmbedder};
