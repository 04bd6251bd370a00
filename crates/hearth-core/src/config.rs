//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to Hearth data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Vector database directory (`data/vectordb/`).
    pub vectordb: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            llm_config_file: root.join("llm-config.json"),
            root,
        };
        std::fs::create_dir_all(&paths.vectordb)?;
        Ok(paths)
    }
}

/// Top-level Hearth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearthConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Embedding dimension (1536 for text-embedding-3-small).
    pub embedding_dim: usize,
    /// Default number of search hits handed to the model.
    pub search_limit: usize,
    /// Minimum cosine similarity for a hit to count as relevant.
    pub similarity_threshold: f64,
    /// Hard cap on model turns per request.
    pub max_steps: usize,
}

impl HearthConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let embedding_dim = std::env::var("HEARTH_EMBEDDING_DIM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1536);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            data_paths,
            embedding_dim,
            search_limit: 5,
            similarity_threshold: 0.7,
            max_steps: 5,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_paths_created() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().join("data")).unwrap();
        assert!(paths.vectordb.is_dir());
        assert_eq!(paths.vectordb, paths.root.join("vectordb"));
        assert_eq!(
            paths.llm_config_file.file_name().unwrap(),
            "llm-config.json"
        );
    }

    #[test]
    fn test_from_env_defaults_and_override() {
        let dir = TempDir::new().unwrap();

        std::env::remove_var("HEARTH_EMBEDDING_DIM");
        let config = HearthConfig::from_env(dir.path()).unwrap();
        assert_eq!(config.embedding_dim, 1536);
        assert_eq!(config.search_limit, 5);
        assert!((config.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.max_steps, 5);
        assert!(config.data_paths.vectordb.is_dir());

        std::env::set_var("HEARTH_EMBEDDING_DIM", "768");
        let config = HearthConfig::from_env(dir.path()).unwrap();
        assert_eq!(config.embedding_dim, 768);
        std::env::remove_var("HEARTH_EMBEDDING_DIM");
    }
}
