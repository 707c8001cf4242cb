use std::path::Path;

use tracing::{debug, info};

use super::Retriever;
use crate::{
    chunking::Chunker,
    document::{Document, RetrievedDocument},
    error::{Error, Result},
    lexical_index::{LexicalIndex, Preprocessor},
};

/// Ranks an in-memory set of chunks with BM25.
#[derive(Debug)]
pub struct LexicalRetriever {
    index: LexicalIndex,
}

impl LexicalRetriever {
    /// Index `documents` with `preprocessor`, applied to both documents and
    /// queries.
    pub fn new(
        documents: Vec<Document>,
        preprocessor: Preprocessor,
    ) -> Result<Self> {
        Ok(Self {
            index: LexicalIndex::build(documents, preprocessor)?,
        })
    }

    /// Build a retriever from one column of a CSV file.
    ///
    /// Each row with non-empty content becomes a document whose metadata holds
    /// the zero-based `row` plus the listed `metadata_columns`. Rows are split
    /// with `chunker` when one is given. Missing columns are a configuration
    /// error.
    pub fn from_csv(
        csv_path: &Path,
        content_column: &str,
        metadata_columns: &[String],
        chunker: Option<&Chunker>,
        preprocessor: Preprocessor,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(csv_path)?;
        let headers = reader.headers()?.clone();

        let column = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                Error::Config(format!(
                    "column '{name}' not found in {}",
                    csv_path.display()
                ))
            })
        };
        let content_idx = column(content_column)?;
        let metadata_idx = metadata_columns
            .iter()
            .map(|name| column(name).map(|idx| (name.as_str(), idx)))
            .collect::<Result<Vec<_>>>()?;

        let mut documents = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let content = record.get(content_idx).unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let mut doc = Document::new(content).with_metadata("row", row);
            for (name, idx) in &metadata_idx {
                doc = doc.with_metadata(*name, record.get(*idx).unwrap_or(""));
            }
            documents.push(doc);
        }

        let documents = match chunker {
            Some(chunker) => chunker.split_documents(&documents),
            None => documents,
        };
        info!(
            path = %csv_path.display(),
            documents = documents.len(),
            "built lexical retriever from CSV"
        );
        Self::new(documents, preprocessor)
    }

    pub fn documents(&self) -> &[Document] {
        self.index.documents()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        self.index.preprocessor()
    }
}

impl Retriever for LexicalRetriever {
    fn name(&self) -> &str {
        "lexical"
    }

    fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let hits = self.index.search(query, top_k)?;
        debug!(query, top_k, hits = hits.len(), "lexical retrieval");

        let documents = self.index.documents();
        Ok(hits
            .into_iter()
            .map(|(position, score)| {
                RetrievedDocument::from_document(&documents[position], score)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunking::ChunkerConfig, document::MetadataValue};

    #[test]
    fn cat_query_prefers_cat_chunk() {
        let retriever = LexicalRetriever::new(
            vec![Document::new("cat sat mat"), Document::new("dog ran far")],
            Preprocessor::default(),
        )
        .unwrap();

        let results = retriever.retrieve("cat", 2).unwrap();
        assert_eq!(results[0].content, "cat sat mat");
        assert!(results.iter().all(|r| r.content != "dog ran far"));
    }

    #[test]
    fn from_csv_reads_content_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("faq.csv");
        std::fs::write(
            &path,
            "text,category\nrust ownership rules,lang\n,empty\nvector search basics,db\n",
        )
        .unwrap();

        let retriever = LexicalRetriever::from_csv(
            &path,
            "text",
            &["category".to_string()],
            None,
            Preprocessor::default(),
        )
        .unwrap();

        assert_eq!(retriever.documents().len(), 2);
        let results = retriever.retrieve("vector", 1).unwrap();
        assert_eq!(results[0].content, "vector search basics");
        assert_eq!(results[0].metadata["row"], MetadataValue::Int(2));
        assert_eq!(results[0].metadata["category"], MetadataValue::from("db"));
    }

    #[test]
    fn from_csv_chunks_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("long.csv");
        std::fs::write(&path, "text\n\"alpha beta gamma delta epsilon\"\n")
            .unwrap();

        let chunker = Chunker::new(ChunkerConfig::new(12, 0).unwrap()).unwrap();
        let retriever = LexicalRetriever::from_csv(
            &path,
            "text",
            &[],
            Some(&chunker),
            Preprocessor::default(),
        )
        .unwrap();
        assert!(retriever.documents().len() > 1);
    }

    #[test]
    fn from_csv_missing_column_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("faq.csv");
        std::fs::write(&path, "text\nhello\n").unwrap();

        let err = LexicalRetriever::from_csv(
            &path,
            "body",
            &[],
            None,
            Preprocessor::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
