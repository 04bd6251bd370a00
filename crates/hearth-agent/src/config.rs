//! LLM configuration persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Stored LLM configuration (persisted to llm-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Path to config file for saving.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_model() -> String {
    DEFAULT_CHAT_MODEL.into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> usize {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            config_path: PathBuf::new(),
        }
    }
}

impl LlmConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config: LlmConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.config_path = config_path.to_path_buf();

        if config.api_key.is_none() {
            config.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        config
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved LLM config to {}", self.config_path.display());
        Ok(())
    }

    /// Whether a model can be constructed from this config.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("llm-config.json");

        let mut config = LlmConfig::default();
        config.config_path = path.clone();
        config.model = "gpt-4o".into();
        config.api_key = Some("sk-test".into());
        config.save().unwrap();

        let loaded = LlmConfig::load(&path);
        assert_eq!(loaded.model, "gpt-4o");
        assert!(loaded.is_configured());
        assert_eq!(loaded.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_from_data_paths() {
        let dir = TempDir::new().unwrap();
        let paths = hearth_core::DataPaths::new(dir.path()).unwrap();

        let mut config = LlmConfig::default();
        config.config_path = paths.llm_config_file.clone();
        config.api_key = Some("sk-test".into());
        config.save().unwrap();

        let loaded = LlmConfig::load(&paths.llm_config_file);
        assert!(loaded.is_configured());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = LlmConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.max_tokens, 2048);
    }
}
