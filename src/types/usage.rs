//! Token usage reported by the model on stream completion.

use serde::{Deserialize, Serialize};

/// Token usage for one model turn.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
    #[serde(default)]
    pub cached_content_token_count: u32,
}

impl UsageMetadata {
    /// Accumulate another turn's usage into this one.
    pub fn merge(&mut self, other: &UsageMetadata) {
        self.prompt_token_count += other.prompt_token_count;
        self.candidates_token_count += other.candidates_token_count;
        self.total_token_count += other.total_token_count;
        self.cached_content_token_count += other.cached_content_token_count;
    }
}
