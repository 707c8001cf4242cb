use super::{Embedder, normalize};
use crate::{
    config::HASHING_MODEL,
    error::{Error, Result},
};

pub const DEFAULT_DIMENSION: usize = 1024;

/// Embeds text by hashing lowercased words and character bigrams into a
/// fixed number of buckets.
///
/// Texts that share vocabulary end up close in cosine space. The bigram
/// features make this work for scripts without spaces. Vectors are
/// L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "hashing embedder dimension must be greater than zero"
                    .to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Bucket from the first eight bytes (little-endian) of the BLAKE3
    /// digest, so saved indexes stay valid across builds and platforms.
    fn bucket(&self, feature: &str) -> usize {
        let digest = blake3::hash(feature.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            vector[self.bucket(&word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                vector[self.bucket(&bigram)] += 1.0;
            }
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        HASHING_MODEL
    }

    fn dimension(&self) -> Result<usize> {
        Ok(self.dimension)
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }
}
