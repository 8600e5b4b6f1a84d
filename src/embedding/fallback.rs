use async_trait::async_trait;

use super::Embedder;
use crate::error::EmbedError;

pub const FALLBACK_DIMS: usize = 384;

/// Deterministic, non-semantic embedder.
///
/// Element `i` is the code point of the `i`-th character divided by 255 and
/// saturated at `1.0`, so every character above U+00FF maps to `1.0`.
/// Texts shorter than 384 characters are zero-padded; longer texts are
/// truncated. The vectors have no distributional meaning. They exist so extraction, chunking and
/// status transitions keep working when no provider is configured.
#[derive(Debug, Default, Clone)]
pub struct FallbackEmbedder;

impl FallbackEmbedder {
    pub fn new() -> Self {
        Self
    }

    pub fn embed_sync(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; FALLBACK_DIMS];
        for (slot, ch) in vector.iter_mut().zip(text.chars()) {
            *slot = (ch as u32).min(255) as f32 / 255.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    fn model_name(&self) -> &str {
        "fallback-charcode-384"
    }

    fn dims(&self) -> usize {
        FALLBACK_DIMS
    }

    fn is_semantic(&self) -> bool {
        false
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(Self::embed_sync(text))
    }
}
