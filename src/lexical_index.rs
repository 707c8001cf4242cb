//! In-memory BM25 index over pre-tokenized chunks.
//!
//! Tokenization is done by a [`Preprocessor`] outside of Tantivy, and the
//! resulting terms are fed to Tantivy as pre-tokenized text. The same
//! preprocessor turns queries into terms, so index and query always agree.

use std::{cmp::Ordering, sync::Arc};

use tantivy::{
    Index,
    IndexReader,
    TantivyDocument,
    Term,
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::*,
    tokenizer::{PreTokenizedString, Token},
};
use tracing::debug;

use crate::{document::Document, error::Result, text_util};

/// Field names used in the schema.
pub mod fields {
    pub const TERMS: &str = "terms";
    pub const ORDINAL: &str = "ordinal";
}

/// Writer memory budget; the minimum Tantivy accepts for one thread.
const WRITER_MEMORY_BUDGET: usize = 15_000_000;

type TokenizeFn = dyn Fn(&str) -> Vec<String> + Send + Sync;

/// Turns text into the terms the lexical index matches on.
///
/// The default splits on whitespace and nothing else: no lowercasing,
/// stemming or stop-word removal.
///
/// # Examples
///
/// ```
/// use vecdb::lexical_index::Preprocessor;
///
/// let upper = Preprocessor::new(|text| {
///     text.split_whitespace().map(|w| w.to_uppercase()).collect()
/// });
/// assert_eq!(upper.apply("a b"), vec!["A", "B"]);
/// assert_eq!(Preprocessor::default().apply("The cat"), vec!["The", "cat"]);
/// ```
#[derive(Clone)]
pub struct Preprocessor {
    name: &'static str,
    func: Arc<TokenizeFn>,
}

impl Preprocessor {
    pub fn new(
        func: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: "custom",
            func: Arc::new(func),
        }
    }

    pub fn whitespace() -> Self {
        Self {
            name: "whitespace",
            func: Arc::new(text_util::whitespace_tokens),
        }
    }

    pub fn lowercase() -> Self {
        Self {
            name: "lowercase",
            func: Arc::new(text_util::lowercase_tokens),
        }
    }

    /// Character n-grams, for text without word separators.
    pub fn char_ngrams(n: usize) -> Self {
        Self {
            name: "char_ngrams",
            func: Arc::new(move |text| text_util::char_ngrams(text, n)),
        }
    }

    /// Terms of `text`, with empty terms removed.
    pub fn apply(&self, text: &str) -> Vec<String> {
        let mut terms = (self.func)(text);
        terms.retain(|t| !t.is_empty());
        terms
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::whitespace()
    }
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Preprocessor").field(&self.name).finish()
    }
}

fn build_schema() -> (Schema, Field, Field) {
    let mut builder = Schema::builder();

    let terms_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_index_option(IndexRecordOption::WithFreqs),
    );
    let terms = builder.add_text_field(fields::TERMS, terms_opts);
    let ordinal = builder.add_u64_field(fields::ORDINAL, STORED | FAST);

    (builder.build(), terms, ordinal)
}

fn pre_tokenize(text: &str, terms: Vec<String>) -> PreTokenizedString {
    let tokens = terms
        .into_iter()
        .enumerate()
        .map(|(position, text)| Token {
            position,
            text,
            position_length: 1,
            ..Token::default()
        })
        .collect();
    PreTokenizedString {
        text: text.to_string(),
        tokens,
    }
}

/// A BM25 index over a fixed set of documents, held entirely in memory.
pub struct LexicalIndex {
    reader: IndexReader,
    terms: Field,
    ordinal: Field,
    documents: Vec<Document>,
    preprocessor: Preprocessor,
}

impl LexicalIndex {
    /// Index `documents`, tokenizing each with `preprocessor`.
    pub fn build(
        documents: Vec<Document>,
        preprocessor: Preprocessor,
    ) -> Result<Self> {
        let (schema, terms, ordinal) = build_schema();
        let index = Index::create_in_ram(schema);

        let mut writer: tantivy::IndexWriter =
            index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET)?;
        for (i, doc) in documents.iter().enumerate() {
            let tokens = preprocessor.apply(&doc.content);
            let mut tantivy_doc = TantivyDocument::default();
            tantivy_doc
                .add_pre_tokenized_text(terms, pre_tokenize(&doc.content, tokens));
            tantivy_doc.add_u64(ordinal, i as u64);
            writer.add_document(tantivy_doc)?;
        }
        writer.commit()?;

        let reader = index.reader()?;
        reader.reload()?;
        debug!(
            documents = documents.len(),
            preprocessor = ?preprocessor,
            "built lexical index"
        );

        Ok(Self {
            reader,
            terms,
            ordinal,
            documents,
            preprocessor,
        })
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Score documents against `query` with BM25 and return the best `limit`
    /// as `(position in documents, score)`.
    ///
    /// Only documents sharing at least one term with the query are returned.
    /// Equal scores are ordered by document position.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(usize, f32)>> {
        let query_terms = self.preprocessor.apply(query);
        if limit == 0 || query_terms.is_empty() || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = query_terms
            .iter()
            .map(|t| {
                let term = Term::from_field_text(self.terms, t);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        // Collect every match so that ties are broken deterministically.
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(self.documents.len()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let position = extract_u64(&doc, self.ordinal) as usize;
            if score > 0.0 && position < self.documents.len() {
                hits.push((position, score));
            }
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("documents", &self.documents.len())
            .field("preprocessor", &self.preprocessor)
            .finish_non_exhaustive()
    }
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(u64::MAX)
}
