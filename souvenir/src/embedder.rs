//! `Embedder` trait (§1 "embedding provider, abstracted as `embed(text) ->
//! vector`").

use async_trait::async_trait;

use crate::error::SouvenirError;

/// Produces fixed-size float vectors from text. Implementations must be
/// `Send + Sync` for use from async store/recall methods.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds each text into a vector of dimension [`Embedder::dimension`].
    /// Returns one vector per input text, in the same order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SouvenirError>;

    /// Vector dimension returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;
}

/// Deterministic test double: hashes each text into a fixed-dimension vector
/// so semantically similar inputs (here, sharing tokens) land closer together
/// under cosine distance without pulling in a real embedding model.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hash: u64 = 1469598103934665603;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let slot = (hash as usize) % self.dimension;
            vector[slot] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SouvenirError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
