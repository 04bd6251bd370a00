//! Query/text preparation before embedding.

/// Approximate token budget accepted by the embedding endpoint.
const MAX_TOKENS: usize = 8000;

/// Rough approximation: 1 token ≈ 4 characters.
const CHARS_PER_TOKEN: usize = 4;

/// Clean text for embedding: collapse consecutive whitespace to single
/// spaces, trim, and truncate to the token budget.
///
/// Returns an empty string when the input is all whitespace; callers
/// must treat that as "nothing to embed" and skip the provider call.
pub fn prepare_for_embedding(text: &str) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_to_budget(&cleaned, MAX_TOKENS)
}

/// Truncate on a char boundary to roughly `max_tokens` tokens, marking
/// the cut with an ellipsis.
fn truncate_to_budget(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
