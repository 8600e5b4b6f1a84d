//! Embedding provider abstraction.
//!
//! Defines the [`Embedder`] trait and its two implementations:
//! - **[`RemoteEmbedder`]**: calls an OpenAI-compatible embeddings endpoint
//!   with a bounded timeout and retry/backoff.
//! - **[`FallbackEmbedder`]**: derives a fixed 384-dimension vector from
//!   character codes. Non-semantic; keeps the pipeline running without a
//!   provider.
//!
//! Also provides vector utilities for SQLite storage and ranking:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].
//!
//! # Provider Selection
//!
//! | `embedding.provider` | API key set | Result |
//! |----------------------|-------------|--------|
//! | `"auto"` | yes | [`RemoteEmbedder`] |
//! | `"auto"` | no | [`FallbackEmbedder`] |
//! | `"remote"` | yes | [`RemoteEmbedder`] |
//! | `"remote"` | no | error |
//! | `"fallback"` | any | [`FallbackEmbedder`] |

mod fallback;
mod remote;

pub use fallback::{FallbackEmbedder, FALLBACK_DIMS};
pub use remote::RemoteEmbedder;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Converts text into a fixed-length vector.
///
/// Every vector returned by one embedder has exactly [`dims`](Embedder::dims)
/// elements.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Whether vectors carry distributional meaning. Cosine ranking over
    /// non-semantic vectors is noise.
    fn is_semantic(&self) -> bool;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Create the [`Embedder`] selected by configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names, or for `"remote"` when the
/// API key environment variable is unset.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "auto" => match config.api_key() {
            Some(key) => Arc::new(RemoteEmbedder::new(config, key)?),
            None => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "no embedding API key, using non-semantic fallback embeddings"
                );
                Arc::new(FallbackEmbedder::new())
            }
        },
        "remote" => {
            let key = config.api_key().ok_or_else(|| {
                anyhow::anyhow!("{} environment variable not set", config.api_key_env)
            })?;
            Arc::new(RemoteEmbedder::new(config, key)?)
        }
        "fallback" => Arc::new(FallbackEmbedder::new()),
        other => bail!("Unknown embedding provider: {}", other),
    };

    tracing::info!(
        model = embedder.model_name(),
        dims = embedder.dims(),
        semantic = embedder.is_semantic(),
        "embedder ready"
    );
    Ok(embedder)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use legally::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_fallback_selected_without_key() {
        let config = EmbeddingConfig {
            api_key_env: "LEGALLY_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dims(), FALLBACK_DIMS);
        assert!(!embedder.is_semantic());
        assert_eq!(embedder.model_name(), "fallback-charcode-384");
    }

    #[test]
    fn test_remote_reports_configured_model() {
        let config = EmbeddingConfig {
            model: "legal-embed-small".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = RemoteEmbedder::new(&config, "sk-test".to_string()).unwrap();
        assert_eq!(embedder.model_name(), "legal-embed-small");
        assert!(embedder.is_semantic());
    }

    #[test]
    fn test_remote_requires_key() {
        let config = EmbeddingConfig {
            provider: "remote".to_string(),
            api_key_env: "LEGALLY_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
