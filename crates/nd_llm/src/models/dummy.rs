use async_trait::async_trait;
use serde_json::json;

use nd_core::{
    EmbeddingTask, GenerationClient, GenerationOutput, GenerationRequest, Result, TokenUsage,
};

type Handler = dyn Fn(&GenerationRequest) -> Result<GenerationOutput> + Send + Sync;

/// Offline generation client. The default behavior answers every structured
/// request with a single echo summary; tests install their own handler to
/// script responses or inject failures per prompt.
pub struct DummyClient {
    handler: Box<Handler>,
    embedding_dim: usize,
}

impl DummyClient {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<GenerationOutput> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            embedding_dim: 16,
        }
    }

    pub fn echo() -> Self {
        Self::new(|request| {
            let usage = TokenUsage {
                input_tokens: request.prompt.len() as i64 / 4,
                output_tokens: 32,
            };
            if request.output_schema.is_some() {
                Ok(GenerationOutput {
                    text: None,
                    structured: Some(json!({
                        "summaries": [{
                            "title": "Digest",
                            "content": "Echoed digest of the provided entries.",
                            "reference_urls": [],
                            "importance": 50,
                            "should_expand": false,
                        }]
                    })),
                    usage,
                })
            } else {
                Ok(GenerationOutput {
                    text: Some("Echoed summary.".to_string()),
                    structured: None,
                    usage,
                })
            }
        })
    }
}

impl Default for DummyClient {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl GenerationClient for DummyClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        (self.handler)(&request)
    }

    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        // Deterministic pseudo-embedding from character frequencies, offset
        // by task so the two vector spaces differ.
        let offset = match task {
            EmbeddingTask::Clustering => 0.0f32,
            EmbeddingTask::Retrieval => 0.5,
        };
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![offset; self.embedding_dim];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % self.embedding_dim] += byte as f32 / 255.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in vector.iter_mut() {
                        *v /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}
