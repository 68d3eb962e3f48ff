use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;

use nd_core::{
    EmbeddingTask, Error, GenerationClient, GenerationOutput, GenerationRequest, Result, TokenUsage,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Gemini REST client. Structured output is requested through the JSON
/// response mime type plus a response schema; token counts come from the
/// response's usage metadata.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    generation_model: String,
    embedding_model: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"<redacted>")
            .field("generation_model", &self.generation_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Generation("Gemini API key is required".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_models(mut self, generation: &str, embedding: &str) -> Self {
        self.generation_model = generation.to_string();
        self.embedding_model = embedding.to_string();
        self
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
}

#[derive(Debug, Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i64,
    #[serde(default)]
    candidates_token_count: i64,
}

#[derive(Debug, Deserialize, Default)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize, Default)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
        });
        if let Some(schema) = &request.output_schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            });
        }
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.generation_model, self.api_key
        );
        let response: GenerateResponse = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let usage = TokenUsage {
            input_tokens: response.usage_metadata.prompt_token_count,
            output_tokens: response.usage_metadata.candidates_token_count,
        };
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text);

        let structured = match (&request.output_schema, &text) {
            (Some(_), Some(raw)) => serde_json::from_str(raw).ok(),
            _ => None,
        };

        Ok(GenerationOutput {
            text,
            structured,
            usage,
        })
    }

    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let task_type = match task {
            EmbeddingTask::Clustering => "CLUSTERING",
            EmbeddingTask::Retrieval => "RETRIEVAL_DOCUMENT",
        };
        let model = format!("models/{}", self.embedding_model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task_type,
                })
            })
            .collect();
        let url = format!(
            "{API_BASE}/{}:batchEmbedContents?key={}",
            self.embedding_model, self.api_key
        );
        let response: BatchEmbedResponse = self
            .http
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::Generation(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}
