//! The vector database facade: chunk, embed, store, persist and query.

use std::{path::Path, sync::Arc};

use tracing::info;

use crate::{
    chunking::Chunker,
    document::{Document, Metadata, RetrievedDocument},
    embedding::Embedder,
    error::{Error, Result},
    retrieval::VectorRetriever,
    vector_store::VectorStore,
};

/// A vector index over chunked documents.
///
/// Starts uninitialized; [`build_from_documents`](Self::build_from_documents),
/// [`add_documents`](Self::add_documents) or [`load`](Self::load) make it
/// built, and it stays built from then on. Querying or saving before that
/// fails with [`Error::State`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use vecdb::{Document, VectorDb, embedding::HashingEmbedder};
///
/// let mut db = VectorDb::new(Arc::new(HashingEmbedder::default()), None);
/// assert!(db.query("anything", 1).is_err());
///
/// db.build_from_documents(&[
///     Document::new("rust ownership and borrowing"),
///     Document::new("baking sourdough bread"),
/// ])
/// .unwrap();
/// let results = db.query("borrowing rules in rust", 1).unwrap();
/// assert_eq!(results[0].0, "rust ownership and borrowing");
/// ```
pub struct VectorDb {
    embedder: Arc<dyn Embedder>,
    chunker: Option<Chunker>,
    store: Option<VectorStore>,
}

impl VectorDb {
    /// Documents are split with `chunker` before embedding when one is given.
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Option<Chunker>) -> Self {
        Self {
            embedder,
            chunker,
            store: None,
        }
    }

    pub fn is_built(&self) -> bool {
        self.store.is_some()
    }

    /// Number of stored chunks; zero when not built.
    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, VectorStore::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn chunker(&self) -> Option<&Chunker> {
        self.chunker.as_ref()
    }

    fn built(&self, operation: &'static str) -> Result<&VectorStore> {
        self.store.as_ref().ok_or(Error::State(operation))
    }

    /// Stored chunks in insertion order.
    pub fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.built("list documents")?.documents().cloned().collect())
    }

    /// Chunk `documents` and embed the chunks.
    fn embed(
        &self,
        documents: &[Document],
    ) -> Result<(Vec<Document>, Vec<Vec<f32>>)> {
        let chunks = match &self.chunker {
            Some(chunker) => chunker.split_documents(documents),
            None => documents.to_vec(),
        };
        let texts: Vec<String> =
            chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_documents(&texts)?
        };
        Ok((chunks, embeddings))
    }

    /// Replace any existing index with one built from `documents`.
    ///
    /// An empty slice produces an empty, built index.
    pub fn build_from_documents(
        &mut self,
        documents: &[Document],
    ) -> Result<()> {
        let (chunks, embeddings) = self.embed(documents)?;
        let mut store =
            VectorStore::new().with_model_id(self.embedder.model_id());
        store.add(chunks, embeddings)?;
        info!(
            documents = documents.len(),
            chunks = store.len(),
            "built vector index"
        );
        self.store = Some(store);
        Ok(())
    }

    /// Append `documents` to the index, building it first if needed.
    pub fn add_documents(&mut self, documents: &[Document]) -> Result<()> {
        if self.store.is_none() {
            return self.build_from_documents(documents);
        }
        let (chunks, embeddings) = self.embed(documents)?;
        let added = chunks.len();
        if let Some(store) = self.store.as_mut() {
            store.add(chunks, embeddings)?;
            info!(
                added,
                total = store.len(),
                "added documents to vector index"
            );
        }
        Ok(())
    }

    /// Persist the index to the directory `path`, creating it if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.built("save")?.save(path)
    }

    /// Replace the current state with the index saved at `path`.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let store = VectorStore::load(path)?;
        store.check_compatible(self.embedder.as_ref())?;
        self.store = Some(store);
        Ok(())
    }

    /// The `top_k` most similar chunks as `(content, metadata)` pairs.
    pub fn query(
        &self,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<(String, Metadata)>> {
        Ok(self
            .query_with_scores(text, top_k)?
            .into_iter()
            .map(RetrievedDocument::into_pair)
            .collect())
    }

    /// Like [`query`](Self::query), keeping the cosine similarity scores.
    pub fn query_with_scores(
        &self,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let store = self.built("query")?;
        if top_k == 0 || store.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed_query(text)?;
        Ok(store
            .search(&query, top_k)?
            .into_iter()
            .map(|(entry, score)| {
                RetrievedDocument::from_document(&entry.document, score)
            })
            .collect())
    }

    /// Turn the built index into a retriever sharing the same embedder.
    pub fn into_retriever(self) -> Result<VectorRetriever> {
        let store = self.store.ok_or(Error::State("create a retriever"))?;
        Ok(VectorRetriever::new(store, self.embedder))
    }
}

impl std::fmt::Debug for VectorDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDb")
            .field("model", &self.embedder.model_id())
            .field("chunker", &self.chunker)
            .field("entries", &self.store.as_ref().map(VectorStore::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunking::{CHUNK_INDEX_KEY, ChunkerConfig},
        document::MetadataValue,
        embedding::HashingEmbedder,
    };

    fn db(chunker: Option<Chunker>) -> VectorDb {
        VectorDb::new(Arc::new(HashingEmbedder::new(512).unwrap()), chunker)
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("the borrow checker enforces ownership")
                .with_metadata("source", "rust.txt"),
            Document::new("sourdough needs a starter and patience")
                .with_metadata("source", "bread.txt"),
            Document::new("tantivy computes bm25 scores")
                .with_metadata("source", "search.txt"),
        ]
    }

    #[test]
    fn query_before_build_is_state_error() {
        let db = db(None);
        assert!(matches!(db.query("x", 1), Err(Error::State(_))));
        assert!(matches!(db.documents(), Err(Error::State(_))));
    }

    #[test]
    fn save_before_build_is_state_error() {
        let tmp = tempfile::tempdir().unwrap();
        let db = db(None);
        assert!(matches!(db.save(tmp.path()), Err(Error::State(_))));
        assert!(!tmp.path().join(crate::vector_store::INDEX_FILE).exists());
    }

    #[test]
    fn empty_build_returns_empty_results() {
        let mut db = db(None);
        db.build_from_documents(&[]).unwrap();
        assert!(db.is_built());
        assert!(db.query("anything", 3).unwrap().is_empty());
    }

    #[test]
    fn build_and_query() {
        let mut db = db(None);
        db.build_from_documents(&corpus()).unwrap();
        assert_eq!(db.len(), 3);

        let results = db.query("who enforces ownership", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1["source"], MetadataValue::from("rust.txt"));
    }

    #[test]
    fn chunker_splits_before_embedding() {
        let chunker = Chunker::new(ChunkerConfig::new(20, 5).unwrap()).unwrap();
        let mut db = db(Some(chunker));
        db.build_from_documents(&corpus()).unwrap();
        assert!(db.len() > 3);
        assert!(
            db.documents()
                .unwrap()
                .iter()
                .all(|d| d.metadata.contains_key(CHUNK_INDEX_KEY))
        );
    }

    #[test]
    fn add_documents_builds_then_appends() {
        let docs = corpus();
        let mut db = db(None);
        db.add_documents(&docs[..1]).unwrap();
        assert!(db.is_built());
        db.add_documents(&docs[1..]).unwrap();
        assert_eq!(db.len(), 3);

        let results = db.query("bm25 scores", 1).unwrap();
        assert_eq!(results[0].0, docs[2].content);
    }

    #[test]
    fn build_replaces_previous_index() {
        let docs = corpus();
        let mut db = db(None);
        db.build_from_documents(&docs).unwrap();
        db.build_from_documents(&docs[..1]).unwrap();
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = db(None);
        db.build_from_documents(&corpus()).unwrap();
        db.save(tmp.path()).unwrap();

        let mut loaded = self::db(None);
        loaded.load(tmp.path()).unwrap();
        assert_eq!(
            loaded.query("sourdough starter", 3).unwrap(),
            db.query("sourdough starter", 3).unwrap()
        );
    }

    #[test]
    fn load_with_other_dimension_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = db(None);
        db.build_from_documents(&corpus()).unwrap();
        db.save(tmp.path()).unwrap();

        let mut other =
            VectorDb::new(Arc::new(HashingEmbedder::new(16).unwrap()), None);
        assert!(matches!(other.load(tmp.path()), Err(Error::Load(_))));
        assert!(!other.is_built());
    }

    #[test]
    fn into_retriever_requires_build() {
        assert!(matches!(db(None).into_retriever(), Err(Error::State(_))));
    }
}
