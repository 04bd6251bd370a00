//! Data types for chunks and search results.

use serde::{Deserialize, Serialize};

/// Input to `ChunkStore::upsert`.
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Globally unique, stable identifier (natural key).
    pub chunk_id: String,
    /// Non-empty UTF-8 text.
    pub content: String,
    /// Embedding vector; length must equal the store's dimension.
    pub embedding: Vec<f32>,
    pub metadata: Option<serde_json::Value>,
}

/// A chunk row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Unix millis, refreshed on re-insert of the same chunk_id.
    pub created_at: i64,
}

impl ChunkRecord {
    /// Parent document id from metadata, if the chunk belongs to a group.
    pub fn group_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("group_id")?.as_str()
    }

    /// Position of this chunk within its group.
    pub fn chunk_index(&self) -> Option<i64> {
        self.metadata.as_ref()?.get("chunk_index")?.as_i64()
    }

    /// Human-readable origin, defaulting to "Unknown".
    pub fn source(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("source"))
            .and_then(|s| s.as_str())
            .unwrap_or("Unknown")
            .to_string()
    }
}

/// A chunk matched by similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Exact cosine similarity against the query, in [-1, 1].
    pub similarity: f64,
    pub created_at: i64,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: i64,
    pub embedding_dimension: usize,
    pub db_path: String,
    pub db_size_mb: f64,
    pub matrix_rows: usize,
}
