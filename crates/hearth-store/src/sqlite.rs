//! SQLite-backed chunk store with exact cosine similarity search.
//!
//! One WAL-mode connection guarded by a mutex, shared process-wide via
//! `Arc<ChunkStore>`. Embeddings are mirrored into an in-memory
//! normalized matrix so a search is a single matrix-vector product.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::embedding::{decode_embedding, encode_embedding};
use crate::schema::SCHEMA_SQL;
use crate::types::*;
use hearth_core::{Error, Result};

/// Durable storage and similarity retrieval over chunks.
pub struct ChunkStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    embedding_dim: usize,
    /// Pre-loaded normalized embedding matrix for search: (N, dim) float32.
    matrix: Mutex<EmbeddingMatrix>,
}

struct EmbeddingMatrix {
    /// Normalized embeddings, shape (N, dim).
    matrix: Array2<f32>,
    /// Chunk IDs corresponding to each row.
    chunk_ids: Vec<String>,
    /// Whether the matrix needs reloading.
    dirty: bool,
}

impl ChunkStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/vectordb/`). The file will
    /// be `db_dir/hearth.db`. All embeddings in the store must have
    /// dimension `embedding_dim`.
    pub fn open(db_dir: impl AsRef<Path>, embedding_dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("hearth.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            embedding_dim,
            matrix: Mutex::new(EmbeddingMatrix {
                matrix: Array2::zeros((0, embedding_dim)),
                chunk_ids: Vec::new(),
                dirty: true,
            }),
        };

        store.load_matrix()?;

        let chunk_count = store.count()?;
        info!(
            "ChunkStore initialized: {} chunks, dim={}, path={}",
            chunk_count,
            embedding_dim,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    /// The fixed embedding dimension `D` of this store.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    // ---------------------------------------------------------------
    // Chunk CRUD
    // ---------------------------------------------------------------

    /// Insert a chunk, or fully replace the row keyed by its `chunk_id`.
    ///
    /// A single atomic insert-or-replace statement; re-inserting the
    /// same id never creates a second row and refreshes `created_at`.
    pub fn upsert(&self, chunk: NewChunk) -> Result<ChunkRecord> {
        if chunk.chunk_id.trim().is_empty() {
            return Err(Error::Validation("chunk_id is required".into()));
        }
        if chunk.content.is_empty() {
            return Err(Error::Validation("content is required".into()));
        }
        if chunk.embedding.len() != self.embedding_dim {
            return Err(Error::Validation(format!(
                "embedding dimension {} does not match store dimension {}",
                chunk.embedding.len(),
                self.embedding_dim
            )));
        }

        let now = Self::now_millis();
        let blob = encode_embedding(&chunk.embedding);
        let meta_json = match &chunk.metadata {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO chunks (chunk_id, content, embedding, metadata_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(chunk_id) DO UPDATE SET \
                 content = excluded.content, \
                 embedding = excluded.embedding, \
                 metadata_json = excluded.metadata_json, \
                 created_at = excluded.created_at",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![chunk.chunk_id, chunk.content, blob, meta_json, now])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);

        self.matrix.lock().dirty = true;
        debug!("Upserted chunk {}", chunk.chunk_id);

        self.get(&chunk.chunk_id)?
            .ok_or_else(|| Error::Database(format!("chunk {} missing after upsert", chunk.chunk_id)))
    }

    /// Get a chunk by its id. Pure lookup.
    pub fn get(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM chunks WHERE chunk_id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![chunk_id], |row| Ok(Self::row_to_record(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// Delete a chunk. Returns true if a row was removed.
    pub fn remove(&self, chunk_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM chunks WHERE chunk_id = ?1", params![chunk_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        if count > 0 {
            self.matrix.lock().dirty = true;
        }
        Ok(count > 0)
    }

    /// Count total chunks.
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// List chunks by `created_at` descending (administrative read path).
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM chunks ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(Self::row_to_record(row))
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ---------------------------------------------------------------
    // Group reconstruction
    // ---------------------------------------------------------------

    /// Get all chunks sharing a `group_id`, ascending `chunk_index`.
    ///
    /// Indices need not be contiguous; only their order matters. Empty
    /// Vec if no chunk carries that group.
    pub fn get_group(&self, group_id: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM chunks \
                 WHERE json_extract(metadata_json, '$.group_id') = ?1 \
                 ORDER BY CAST(json_extract(metadata_json, '$.chunk_index') AS INTEGER) ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![group_id], |row| Ok(Self::row_to_record(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Reconstruct the original document for a group by joining its
    /// chunk contents in index order with a paragraph separator.
    pub fn reconstruct_document(&self, group_id: &str) -> Result<Option<String>> {
        let chunks = self.get_group(group_id)?;
        if chunks.is_empty() {
            return Ok(None);
        }
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        Ok(Some(contents.join("\n\n")))
    }

    // ---------------------------------------------------------------
    // Similarity search
    // ---------------------------------------------------------------

    /// Load and normalize all embeddings into a matrix for fast search.
    fn load_matrix(&self) -> Result<()> {
        let mut chunk_ids = Vec::new();
        let mut embeddings: Vec<Vec<f32>> = Vec::new();

        {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare("SELECT chunk_id, embedding FROM chunks ORDER BY id")
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    let cid: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((cid, blob))
                })
                .map_err(|e| Error::Database(e.to_string()))?;

            for row in rows {
                let (cid, blob) = row.map_err(|e| Error::Database(e.to_string()))?;
                chunk_ids.push(cid);
                embeddings.push(decode_embedding(&blob));
            }
        } // conn and stmt dropped here

        let mut mat = self.matrix.lock();
        if embeddings.is_empty() {
            mat.matrix = Array2::zeros((0, self.embedding_dim));
            mat.chunk_ids = Vec::new();
            mat.dirty = false;
            return Ok(());
        }

        let n = embeddings.len();
        let mut matrix = Array2::zeros((n, self.embedding_dim));
        for (i, emb) in embeddings.iter().enumerate() {
            matrix.row_mut(i).assign(&Array1::from_vec(emb.clone()));
        }

        // Normalize rows so cosine similarity is a dot product
        for mut row in matrix.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-9 {
                row /= norm;
            }
        }

        mat.matrix = matrix;
        mat.chunk_ids = chunk_ids;
        mat.dirty = false;
        debug!("Loaded {} embeddings into matrix", n);
        Ok(())
    }

    fn ensure_matrix_loaded(&self) -> Result<()> {
        if self.matrix.lock().dirty {
            self.load_matrix()?;
        }
        Ok(())
    }

    /// Cosine similarity search.
    ///
    /// Keeps only hits with `similarity > threshold`, ordered by
    /// similarity descending (ties broken by chunk_id ascending), at
    /// most `limit` results. Empty store or nothing above threshold
    /// yields an empty Vec, not an error.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SearchHit>> {
        if query_embedding.len() != self.embedding_dim {
            return Err(Error::Validation(format!(
                "query embedding dimension {} does not match store dimension {}",
                query_embedding.len(),
                self.embedding_dim
            )));
        }

        self.ensure_matrix_loaded()?;

        let mat = self.matrix.lock();
        if mat.matrix.nrows() == 0 {
            return Ok(Vec::new());
        }

        let q = Array1::from_vec(query_embedding.to_vec());
        let q_norm = q.dot(&q).sqrt();
        if q_norm < 1e-9 {
            return Ok(Vec::new());
        }
        let q = q / q_norm;

        // (N, dim) @ (dim,) → (N,)
        let similarities = mat.matrix.dot(&q);

        let mut above: Vec<(&String, f64)> = similarities
            .iter()
            .enumerate()
            .map(|(i, &s)| (&mat.chunk_ids[i], s as f64))
            .filter(|&(_, s)| s > threshold)
            .collect();
        above.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        above.truncate(limit);

        let top: Vec<(String, f64)> = above
            .into_iter()
            .map(|(cid, s)| (cid.clone(), s))
            .collect();
        drop(mat);

        let mut hits = Vec::with_capacity(top.len());
        for (cid, similarity) in top {
            if let Some(chunk) = self.get(&cid)? {
                hits.push(SearchHit {
                    chunk_id: chunk.chunk_id,
                    content: chunk.content,
                    metadata: chunk.metadata,
                    similarity,
                    created_at: chunk.created_at,
                });
            }
        }
        Ok(hits)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    /// Get store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let total_chunks = self.count()?;
        let db_size = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);
        let matrix_rows = self.matrix.lock().matrix.nrows();

        Ok(StoreStats {
            total_chunks,
            embedding_dimension: self.embedding_dim,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
            matrix_rows,
        })
    }

    // ---------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------

    fn row_to_record(row: &rusqlite::Row<'_>) -> ChunkRecord {
        ChunkRecord {
            chunk_id: row.get("chunk_id").unwrap_or_default(),
            content: row.get("content").unwrap_or_default(),
            embedding: row
                .get::<_, Vec<u8>>("embedding")
                .map(|b| decode_embedding(&b))
                .unwrap_or_default(),
            metadata: row
                .get::<_, Option<String>>("metadata_json")
                .ok()
                .flatten()
                .and_then(|s| serde_json::from_str(&s).ok()),
            created_at: row.get("created_at").unwrap_or(0),
        }
    }
}
