//! Recipe retrieval tool: free-text query → embedding → similarity
//! search → best-effort full-document reconstruction.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use hearth_core::{Error, HearthConfig};
use hearth_embed::{prepare_for_embedding, EmbeddingProvider};
use hearth_store::ChunkStore;

use crate::tool::Tool;
use crate::types::ToolSchema;

/// Search policy. Defaults are tuned against the default embedding
/// model and need re-tuning for other embedding spaces.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalPolicy {
    /// Maximum hits handed to the model.
    pub limit: usize,
    /// Minimum cosine similarity for a hit to count.
    pub threshold: f64,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            threshold: 0.7,
        }
    }
}

impl RetrievalPolicy {
    /// Take limit and threshold from the top-level configuration.
    pub fn from_config(config: &HearthConfig) -> Self {
        Self {
            limit: config.search_limit,
            threshold: config.similarity_threshold,
        }
    }
}

/// The retrieval capability exposed to the model.
pub struct RetrievalTool {
    store: Arc<ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: RetrievalPolicy,
}

/// Tool result payload. `success: false` carries an explanatory
/// message; the tool never propagates an error to its caller.
#[derive(Debug, Serialize)]
pub struct RetrievalOutput {
    pub success: bool,
    pub message: String,
    pub recipes: Vec<RetrievedRecipe>,
    pub query: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RetrievedRecipe {
    pub content: String,
    pub metadata: serde_json::Value,
    pub similarity: f64,
    pub source: String,
    /// Full source document reconstructed from the hit's group.
    /// Absence means reconstruction failed or the hit has no group;
    /// that is not an error state of the overall call.
    #[serde(skip_serializing_if = "Option::is_none", rename = "fullRecipe")]
    pub full_recipe: Option<String>,
}

impl RetrievalTool {
    pub fn new(store: Arc<ChunkStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_policy(store, embedder, RetrievalPolicy::default())
    }

    pub fn with_policy(
        store: Arc<ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        policy: RetrievalPolicy,
    ) -> Self {
        Self {
            store,
            embedder,
            policy,
        }
    }

    fn failure(message: impl Into<String>, query: &str, category: Option<String>) -> RetrievalOutput {
        RetrievalOutput {
            success: false,
            message: message.into(),
            recipes: Vec::new(),
            query: query.to_string(),
            category,
        }
    }

    async fn run(&self, query: &str, category: Option<String>) -> RetrievalOutput {
        let prepared = prepare_for_embedding(query);
        if prepared.is_empty() {
            return Self::failure(
                "Your query was empty after cleaning. Please provide recipe details.",
                query,
                category,
            );
        }

        debug!(
            "Searching for: \"{}\", category: {}",
            prepared,
            category.as_deref().unwrap_or("any")
        );

        let embedding = match self.embedder.embed(&prepared).await {
            Ok(e) => e,
            Err(e) => {
                warn!("Embedding failed: {}", e);
                return Self::failure(
                    format!("Error searching recipes: {}", e),
                    &prepared,
                    category,
                );
            }
        };

        let hits = match self
            .store
            .search(&embedding, self.policy.limit, self.policy.threshold)
        {
            Ok(h) => h,
            Err(e) => {
                warn!("Search failed: {}", e);
                return Self::failure(
                    format!("Error searching recipes: {}", e),
                    &prepared,
                    category,
                );
            }
        };

        if hits.is_empty() {
            return Self::failure(
                "No recipes found matching your query. Please try different keywords.",
                &prepared,
                category,
            );
        }

        let mut recipes = Vec::with_capacity(hits.len());
        for hit in hits {
            let group_id = hit
                .metadata
                .as_ref()
                .and_then(|m| m.get("group_id"))
                .and_then(|g| g.as_str())
                .map(str::to_string);

            // Best effort: a failed reconstruction only loses this
            // hit's full document, never the whole call.
            let full_recipe = match &group_id {
                Some(gid) => match self.store.reconstruct_document(gid) {
                    Ok(doc) => doc,
                    Err(e) => {
                        warn!("Failed to reconstruct group {}: {}", gid, e);
                        None
                    }
                },
                None => None,
            };

            let source = hit
                .metadata
                .as_ref()
                .and_then(|m| m.get("source"))
                .and_then(|s| s.as_str())
                .unwrap_or("Unknown")
                .to_string();

            recipes.push(RetrievedRecipe {
                content: hit.content,
                metadata: hit.metadata.unwrap_or_else(|| json!({})),
                similarity: hit.similarity,
                source,
                full_recipe,
            });
        }

        RetrievalOutput {
            success: true,
            message: format!("Found {} relevant recipe(s)", recipes.len()),
            recipes,
            query: prepared,
            category,
        }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "recipe".into(),
            description: "Search the recipe knowledge base for relevant recipe content. \
                          Use this when the user asks about recipes, ingredients, cooking \
                          instructions, substitutions, or food-related questions."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user query about a recipe, ingredient, technique, or dish."
                    },
                    "category": {
                        "type": "string",
                        "description": "Optional category filter (e.g., main dish, dessert, appetizer)."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, arguments: serde_json::Value) -> serde_json::Value {
        let category = arguments
            .get("category")
            .and_then(|c| c.as_str())
            .map(str::to_string);

        // Argument validation against the declared schema; a miss is an
        // error payload for the model, not an exception.
        let query = match arguments.get("query").and_then(|q| q.as_str()) {
            Some(q) => q,
            None => {
                let err = Error::Schema("'query' must be a string".into());
                return serde_json::to_value(Self::failure(err.to_string(), "", category))
                    .unwrap_or_else(|_| json!({"success": false}));
            }
        };

        let output = self.run(query, category).await;
        serde_json::to_value(output).unwrap_or_else(|_| json!({"success": false}))
    }
}
