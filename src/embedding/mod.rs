//! Text embedding backends.
//!
//! Every backend implements [`Embedder`]. The backend is chosen once, when
//! the embedder is created from an [`EmbeddingConfig`], and shared behind an
//! `Arc` between a [`VectorDb`](crate::VectorDb) and its retrievers.

pub mod hashing;
pub mod local;
pub mod remote;

use std::sync::Arc;

pub use hashing::HashingEmbedder;
pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;

use crate::{config::EmbeddingConfig, error::Result};

/// Where embeddings are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum EmbeddingBackend {
    /// A sentence-transformers BERT model run on this machine.
    Local,
    /// The Google Generative Language embedding API.
    Remote,
    /// Deterministic feature hashing; needs no model or network.
    Hashing,
}

/// Turns text into fixed-length vectors.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder produces.
    ///
    /// Backends that load a model lazily may need to load it to answer.
    fn dimension(&self) -> Result<usize>;

    /// Embed texts that will be stored in an index.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedder described by `config`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Local => Arc::new(
            LocalEmbedder::new(&config.model_id)
                .with_batch_size(config.batch_size),
        ),
        EmbeddingBackend::Remote => {
            let mut embedder = RemoteEmbedder::from_env(&config.model_id)?;
            if let Some(dimension) = config.dimension {
                embedder = embedder.with_dimension(dimension);
            }
            Arc::new(embedder)
        }
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(
            config.dimension.unwrap_or(hashing::DEFAULT_DIMENSION),
        )?),
    };
    tracing::debug!(
        backend = ?config.backend,
        model = embedder.model_id(),
        "created embedder"
    );
    Ok(embedder)
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two vectors of equal length.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
