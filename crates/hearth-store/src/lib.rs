//! Chunk storage and similarity retrieval for Hearth.

pub mod embedding;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::ChunkStore;
pub use types::*;
