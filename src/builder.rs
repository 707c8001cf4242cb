use std::{path::Path, sync::Arc};

use crate::{
    chunking::{Chunker, ChunkerConfig},
    config::{DEFAULT_LOCAL_MODEL, EmbeddingConfig},
    document::Document,
    embedding::{self, Embedder, EmbeddingBackend},
    error::Result,
    vector_db::VectorDb,
};

/// Creates [`VectorDb`]s from configuration.
///
/// Every call to [`build`](Self::build) or [`load`](Self::load) creates a
/// fresh embedder and database; the builder keeps no state between calls.
///
/// # Examples
///
/// ```
/// use vecdb::{Document, VectorDbBuilder, chunking::ChunkerConfig};
/// use vecdb::embedding::EmbeddingBackend;
///
/// let builder = VectorDbBuilder::new()
///     .with_backend(EmbeddingBackend::Hashing)
///     .with_chunker(ChunkerConfig::new(200, 20).unwrap());
/// let db = builder.build(&[Document::new("hello world")]).unwrap();
/// assert_eq!(db.len(), 1);
/// ```
#[derive(Clone)]
pub struct VectorDbBuilder {
    embedding: EmbeddingConfig,
    chunker_config: Option<ChunkerConfig>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Default for VectorDbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorDbBuilder {
    /// Local multilingual model, no chunking.
    pub fn new() -> Self {
        Self {
            embedding: EmbeddingConfig::from_model(DEFAULT_LOCAL_MODEL, true),
            chunker_config: None,
            embedder: None,
        }
    }

    /// Embed with `embedding_model`, on this machine or through the remote
    /// API.
    pub fn with_model(
        mut self,
        embedding_model: &str,
        use_local_embeddings: bool,
    ) -> Self {
        self.embedding =
            EmbeddingConfig::from_model(embedding_model, use_local_embeddings);
        self
    }

    pub fn with_embedding_config(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    pub fn with_backend(mut self, backend: EmbeddingBackend) -> Self {
        self.embedding = match backend {
            EmbeddingBackend::Hashing => EmbeddingConfig::hashing(
                self.embedding
                    .dimension
                    .unwrap_or(embedding::hashing::DEFAULT_DIMENSION),
            ),
            other => EmbeddingConfig {
                backend: other,
                ..self.embedding
            },
        };
        self
    }

    /// Split documents before embedding.
    pub fn with_chunker(mut self, config: ChunkerConfig) -> Self {
        self.chunker_config = Some(config);
        self
    }

    /// Use an existing embedder instead of creating one from configuration.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn embedding_config(&self) -> &EmbeddingConfig {
        &self.embedding
    }

    fn new_db(&self) -> Result<VectorDb> {
        let embedder = match &self.embedder {
            Some(embedder) => Arc::clone(embedder),
            None => embedding::create_embedder(&self.embedding)?,
        };
        let chunker = self.chunker_config.map(Chunker::new).transpose()?;
        Ok(VectorDb::new(embedder, chunker))
    }

    /// A new database built from `documents`.
    pub fn build(&self, documents: &[Document]) -> Result<VectorDb> {
        let mut db = self.new_db()?;
        db.build_from_documents(documents)?;
        Ok(db)
    }

    /// A new database loaded from the index saved at `path`.
    pub fn load(&self, path: &Path) -> Result<VectorDb> {
        let mut db = self.new_db()?;
        db.load(path)?;
        Ok(db)
    }
}

impl std::fmt::Debug for VectorDbBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDbBuilder")
            .field("embedding", &self.embedding)
            .field("chunker_config", &self.chunker_config)
            .field("custom_embedder", &self.embedder.is_some())
            .finish()
    }
}
