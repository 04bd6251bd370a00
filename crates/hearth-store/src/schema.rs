//! Database schema SQL.

/// Chunks table: one row per indexed text fragment.
///
/// `chunk_id` is the natural key; re-inserting the same id replaces the
/// row (see `ChunkStore::upsert`). `metadata_json` carries the reserved
/// `group_id` / `chunk_index` / `source` keys used for reconstruction.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_id TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata_json TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_created ON chunks(created_at);
CREATE INDEX IF NOT EXISTS idx_chunks_group
    ON chunks(json_extract(metadata_json, '$.group_id'));
"#;
