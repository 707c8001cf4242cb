//! Retrievers: a uniform query interface over vector, lexical and hybrid
//! search.

pub mod hybrid;
pub mod lexical;
pub mod vector;

pub use hybrid::{HybridRetriever, RRF_K};
pub use lexical::LexicalRetriever;
pub use vector::VectorRetriever;

use crate::{
    document::{Metadata, RetrievedDocument},
    error::Result,
};

/// Something that can rank documents for a text query.
pub trait Retriever: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// At most `top_k` documents, most relevant first.
    ///
    /// `top_k == 0` yields an empty list.
    fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>>;

    /// Like [`Retriever::retrieve`], returning `(content, metadata)` pairs.
    fn get_relevant_documents(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(String, Metadata)>> {
        Ok(self
            .retrieve(query, top_k)?
            .into_iter()
            .map(RetrievedDocument::into_pair)
            .collect())
    }
}

impl<R: Retriever + ?Sized> Retriever for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        (**self).retrieve(query, top_k)
    }
}
