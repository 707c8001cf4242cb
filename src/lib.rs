//! vecdb - build, persist and query vector indexes for retrieval-augmented
//! generation.
//!
//! Documents from text files, CSV tables or video transcripts are chunked,
//! embedded and stored in a flat cosine index persisted with
//! [redb](https://github.com/cberner/redb). Queries can go through the
//! vector index, a BM25 index built with
//! [Tantivy](https://github.com/quickwit-oss/tantivy), or both fused with
//! weighted reciprocal rank fusion.
//!
//! # Quick start
//!
//! ```
//! use vecdb::{Document, Retriever, VectorDbBuilder};
//! use vecdb::embedding::EmbeddingBackend;
//! use vecdb::lexical_index::Preprocessor;
//! use vecdb::retrieval::{HybridRetriever, LexicalRetriever};
//!
//! let docs = vec![
//!     Document::new("the borrow checker enforces ownership"),
//!     Document::new("sourdough needs a starter"),
//! ];
//! let db = VectorDbBuilder::new()
//!     .with_backend(EmbeddingBackend::Hashing)
//!     .build(&docs)
//!     .unwrap();
//!
//! let lexical = LexicalRetriever::new(docs, Preprocessor::lowercase()).unwrap();
//! let hybrid =
//!     HybridRetriever::new(db.into_retriever().unwrap(), lexical, None).unwrap();
//!
//! let results = hybrid.retrieve("ownership", 1).unwrap();
//! assert_eq!(results[0].content, "the borrow checker enforces ownership");
//! ```

pub mod adapters;
pub mod builder;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod lexical_index;
pub mod retrieval;
pub mod text_util;
pub mod vector_db;
pub mod vector_store;

pub use adapters::DocumentSource;
pub use builder::VectorDbBuilder;
pub use chunking::{Chunker, ChunkerConfig};
pub use document::{Document, Metadata, MetadataValue, RetrievedDocument};
pub use error::{Error, Result};
pub use retrieval::{
    HybridRetriever, LexicalRetriever, Retriever, VectorRetriever,
};
pub use vector_db::VectorDb;
