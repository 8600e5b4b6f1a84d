use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Embedding provider backed by an OpenAI-compatible `POST /v1/embeddings`
/// endpoint.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
/// - Backoff: 1s, 2s, 4s, ... (capped at 2^5)
///
/// After retries are exhausted the last failure is returned as
/// [`EmbedError::ProviderUnavailable`] (transport) or
/// [`EmbedError::ProviderError`] (status).
pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, body: &serde_json::Value) -> Attempt {
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(EmbedError::ProviderUnavailable(e.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(text) => Attempt::Done(parse_embedding_response(&text, self.dims)),
                Err(e) => Attempt::Done(Err(EmbedError::MalformedResponse(e.to_string()))),
            };
        }

        let body_text = response.text().await.unwrap_or_default();
        let err = EmbedError::ProviderError {
            status: status.as_u16(),
            body: body_text,
        };

        if status.as_u16() == 429 || status.is_server_error() {
            Attempt::Retry(err)
        } else {
            Attempt::Done(Err(err))
        }
    }
}

enum Attempt {
    Done(Result<Vec<f32>, EmbedError>),
    Retry(EmbedError),
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn is_semantic(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.request_once(&body).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(err) => {
                    tracing::debug!(attempt, error = %err, "embedding request failed, retrying");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EmbedError::ProviderUnavailable("embedding failed after retries".to_string())
        }))
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// Parse an embeddings response body and return the first vector.
///
/// Fails with [`EmbedError::MalformedResponse`] when the body is not the
/// expected JSON shape, carries no vectors, or the vector length differs
/// from `dims`.
pub(crate) fn parse_embedding_response(body: &str, dims: usize) -> Result<Vec<f32>, EmbedError> {
    let parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;

    let vector = parsed
        .data
        .into_iter()
        .next()
        .map(|item| item.embedding)
        .ok_or_else(|| EmbedError::MalformedResponse("empty data array".to_string()))?;

    if vector.is_empty() {
        return Err(EmbedError::MalformedResponse("empty embedding".to_string()));
    }
    if vector.len() != dims {
        return Err(EmbedError::MalformedResponse(format!(
            "expected {} dimensions, got {}",
            dims,
            vector.len()
        )));
    }

    Ok(vector)
}
