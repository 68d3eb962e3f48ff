use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Token counts reported by the model for one generation attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Embedding task types the capability must distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// Tuned for clustering similarity.
    Clustering,
    /// Tuned for retrieval / question answering.
    Retrieval,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// When set, the model is asked for JSON conforming to this schema and
    /// the parsed value is returned in `GenerationOutput::structured`.
    pub output_schema: Option<serde_json::Value>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            output_schema: None,
        }
    }

    pub fn structured(prompt: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            prompt: prompt.into(),
            output_schema: Some(schema),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub text: Option<String>,
    pub structured: Option<serde_json::Value>,
    pub usage: TokenUsage,
}

/// Text-generation and embedding capability. Implementations talk to an
/// actual model; the pipeline only depends on this seam.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput>;

    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>>;
}
