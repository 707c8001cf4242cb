//! Embedding configuration resolved from explicit settings and the
//! environment.

use crate::embedding::EmbeddingBackend;

/// Default model for the local (on-device) backend.
pub const DEFAULT_LOCAL_MODEL: &str =
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

/// Default model for the remote backend.
pub const DEFAULT_REMOTE_MODEL: &str = "models/text-embedding-004";

/// Model identifier reported by the hashing backend.
pub const HASHING_MODEL: &str = "hashing";

/// Overrides the embedding model when none is given explicitly.
pub const MODEL_ENV_VAR: &str = "VECDB_EMBEDDING_MODEL";

/// Overrides the log filter of the command line tool.
pub const LOG_ENV_VAR: &str = "VECDB_LOG";

/// API key for the remote embedding backend.
pub const API_KEY_ENV_VAR: &str = "GOOGLE_API_KEY";

/// Number of texts sent to an embedder in one call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Everything needed to construct an embedder.
///
/// # Examples
///
/// ```
/// use vecdb::config::{EmbeddingConfig, DEFAULT_LOCAL_MODEL};
/// use vecdb::embedding::EmbeddingBackend;
///
/// let config = EmbeddingConfig::from_model(DEFAULT_LOCAL_MODEL, true);
/// assert_eq!(config.backend, EmbeddingBackend::Local);
///
/// let config = EmbeddingConfig::from_model("models/text-embedding-004", false);
/// assert_eq!(config.backend, EmbeddingBackend::Remote);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model_id: String,
    /// Output dimension, when the backend cannot discover it by itself.
    pub dimension: Option<usize>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_model(DEFAULT_LOCAL_MODEL, true)
    }
}

impl EmbeddingConfig {
    /// Configuration for a model served either locally or remotely.
    pub fn from_model(model_id: &str, use_local_embeddings: bool) -> Self {
        let backend = if use_local_embeddings {
            EmbeddingBackend::Local
        } else {
            EmbeddingBackend::Remote
        };
        Self {
            backend,
            model_id: model_id.to_string(),
            dimension: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Offline configuration that needs neither network nor model files.
    pub fn hashing(dimension: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model_id: HASHING_MODEL.to_string(),
            dimension: Some(dimension),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Resolve the model and backend from optional explicit values.
    ///
    /// The model comes from:
    /// 1. `model`, if given
    /// 2. The `VECDB_EMBEDDING_MODEL` environment variable, if set
    /// 3. The default model of the backend (remote when no backend is given)
    ///
    /// Without an explicit backend, models named `models/...` use the
    /// remote backend and everything else runs locally.
    pub fn resolve(
        model: Option<&str>,
        backend: Option<EmbeddingBackend>,
    ) -> Self {
        let model = model
            .map(str::to_string)
            .or_else(|| std::env::var(MODEL_ENV_VAR).ok())
            .filter(|m| !m.trim().is_empty());

        let backend = backend.unwrap_or_else(|| match &model {
            Some(m) => infer_backend(m),
            None => EmbeddingBackend::Remote,
        });

        match backend {
            EmbeddingBackend::Hashing => {
                Self::hashing(crate::embedding::hashing::DEFAULT_DIMENSION)
            }
            EmbeddingBackend::Local => Self::from_model(
                model.as_deref().unwrap_or(DEFAULT_LOCAL_MODEL),
                true,
            ),
            EmbeddingBackend::Remote => Self::from_model(
                model.as_deref().unwrap_or(DEFAULT_REMOTE_MODEL),
                false,
            ),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

fn infer_backend(model_id: &str) -> EmbeddingBackend {
    if model_id == HASHING_MODEL {
        EmbeddingBackend::Hashing
    } else if model_id.starts_with("models/") {
        EmbeddingBackend::Remote
    } else {
        EmbeddingBackend::Local
    }
}
