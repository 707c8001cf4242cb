use std::{path::Path, sync::Arc};

use tracing::debug;

use super::Retriever;
use crate::{
    document::RetrievedDocument,
    embedding::Embedder,
    error::Result,
    vector_store::VectorStore,
};

/// Ranks stored chunks by cosine similarity to the embedded query.
pub struct VectorRetriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
}

impl VectorRetriever {
    pub fn new(store: VectorStore, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Load a saved index from `path`.
    ///
    /// Fails with [`Error::Load`](crate::Error::Load) when the index is
    /// missing, unreadable, or was built with vectors of another dimension.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = VectorStore::load(path)?;
        store.check_compatible(embedder.as_ref())?;
        Ok(Self::new(store, embedder))
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }
}

impl std::fmt::Debug for VectorRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorRetriever")
            .field("entries", &self.store.len())
            .field("model", &self.embedder.model_id())
            .finish()
    }
}

impl Retriever for VectorRetriever {
    fn name(&self) -> &str {
        "vector"
    }

    fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        if top_k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_query(query)?;
        let hits = self.store.search(&query_embedding, top_k)?;
        debug!(query, top_k, hits = hits.len(), "vector retrieval");

        Ok(hits
            .into_iter()
            .map(|(entry, score)| {
                RetrievedDocument::from_document(&entry.document, score)
            })
            .collect())
    }
}
