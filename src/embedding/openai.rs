//! OpenAI-compatible `/embeddings` client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::EmbeddingEndpoint;
use crate::embedding::EmbeddingProvider;
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: EmbeddingEndpoint,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(endpoint: EmbeddingEndpoint, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            dimension,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Every non-2xx answer from the embedding service is an upstream failure.
fn error_for_status(status: StatusCode, body: String) -> AgentError {
    AgentError::UpstreamUnavailable(format!("embedding service returned {}: {}", status, body))
}

/// Restore input order and check every vector's length.
fn collect_vectors(
    mut data: Vec<EmbeddingData>,
    expected_count: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected_count {
        return Err(AgentError::UpstreamUnavailable(format!(
            "embedding service returned {} vectors for {} inputs",
            data.len(),
            expected_count
        )));
    }

    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimension {
                Ok(d.embedding)
            } else {
                Err(AgentError::EmbeddingDimensionMismatch {
                    expected: dimension,
                    actual: d.embedding.len(),
                })
            }
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            AgentError::UpstreamUnavailable("embedding service returned no vectors".to_string())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.endpoint.base_url);
        let request = EmbeddingRequest {
            model: &self.endpoint.model_name,
            input: texts,
        };

        debug!(count = texts.len(), model = %self.endpoint.model_name, "Requesting embeddings");

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            error!("Embedding request failed: {}", e);
            AgentError::UpstreamUnavailable(format!("embedding service: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Embedding service error response: {}", body);
            return Err(error_for_status(status, body));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AgentError::UpstreamUnavailable(format!("embedding response parse error: {}", e))
        })?;

        collect_vectors(parsed.data, texts.len(), self.dimension)
    }
}
