use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::retry::send_with_retry;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &'static str;

    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(ProviderError::BackendResponse {
                provider: self.name(),
                details: format!("expected 1 embedding, got {}", vectors.len()),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Hashed character-trigram embedder that runs without any network access.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &'static str {
        "local-ngram"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai-embeddings"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.config.endpoint("embeddings");
        let body = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let raw = send_with_retry(self.name(), &self.config.retry, || {
            self.client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
        })
        .await?;
        let mut parsed: EmbeddingResponse = serde_json::from_str(&raw)?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::BackendResponse {
                provider: self.name(),
                details: format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        parsed.data.sort_by_key(|item| item.index);
        // indices must be exactly 0..n once sorted
        if let Some((position, item)) = parsed
            .data
            .iter()
            .enumerate()
            .find(|(position, item)| item.index != *position)
        {
            return Err(ProviderError::BackendResponse {
                provider: self.name(),
                details: format!("embedding index {} found at position {position}", item.index),
            });
        }
        debug!(
            model = %self.config.embedding_model,
            inputs = texts.len(),
            "embedding batch complete"
        );

        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1", server.uri()),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::no_retry(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Chat with the uploaded PDF");
        let second = embedder.embed_text("Chat with the uploaded PDF");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn local_embedder_embeds_single_text() {
        let embedder = CharacterNgramEmbedder { dimensions: 16 };
        let vector = embedder.embed("hello there").await.unwrap();
        assert_eq!(vector, embedder.embed_text("hello there"));
    }

    #[tokio::test]
    async fn openai_vectors_follow_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "text-embedding-ada-002" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] }
                ]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(config_for(&server)).unwrap();
        let vectors = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn openai_short_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "index": 0, "embedding": [1.0] }]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(config_for(&server)).unwrap();
        let result = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;

        assert!(matches!(result, Err(ProviderError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn openai_duplicate_indices_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 0, "embedding": [1.0, 0.0] },
                    { "index": 0, "embedding": [0.0, 1.0] }
                ]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(config_for(&server)).unwrap();
        let result = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;

        assert!(matches!(result, Err(ProviderError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn openai_out_of_range_index_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 0, "embedding": [1.0, 0.0] },
                    { "index": 5, "embedding": [0.0, 1.0] }
                ]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(config_for(&server)).unwrap();
        let result = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;

        assert!(matches!(result, Err(ProviderError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn openai_bad_key_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" }
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(config_for(&server)).unwrap();
        let result = embedder.embed("question").await;
        assert!(matches!(result, Err(ProviderError::Auth { .. })));
    }
}
