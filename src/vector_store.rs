//! Flat (exact) cosine-similarity index with on-disk persistence.

use std::{cmp::Ordering, path::Path};

use rayon::prelude::*;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

use crate::{
    document::Document,
    embedding::{Embedder, cosine_similarity},
    error::{Error, Result},
};

/// File holding the index inside an index directory.
pub const INDEX_FILE: &str = "index.redb";

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const DOCUMENTS: TableDefinition<u64, &str> = TableDefinition::new("documents");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const SETTING_FORMAT: &str = "format_version";
const SETTING_DIMENSION: &str = "dimension";
const SETTING_MODEL: &str = "model";

const FORMAT_VERSION: &str = "1";

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// One embedded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// Position of the entry in insertion order, stable across save and load.
    pub id: u64,
    pub embedding: Vec<f32>,
    pub document: Document,
}

/// Stores embedded chunks in memory and searches them exhaustively.
///
/// On disk an index is a directory containing a single redb database with
/// three tables:
/// - `vectors`: entry id -> 4-byte dimension (u32 LE) followed by f32 values
/// - `documents`: entry id -> JSON-encoded [`Document`]
/// - `settings`: format version, dimension and embedding model
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    entries: Vec<VectorEntry>,
    dimension: Option<usize>,
    model_id: Option<String>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.model_id = Some(model_id.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, known once the first entry is added.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// The embedding model the vectors were produced with, if recorded.
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn entries(&self) -> &[VectorEntry] {
        &self.entries
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|e| &e.document)
    }

    /// Append documents with their embeddings.
    ///
    /// Every embedding must have the store's dimension; the first batch added
    /// to an empty store fixes it.
    pub fn add(
        &mut self,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        if documents.len() != embeddings.len() {
            return Err(Error::Embedding {
                provider: "index",
                message: format!(
                    "{} documents but {} embeddings",
                    documents.len(),
                    embeddings.len()
                ),
            });
        }

        let expected = self
            .dimension
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if expected == 0 {
                return Err(Error::Embedding {
                    provider: "index",
                    message: "embedder returned empty vectors".to_string(),
                });
            }
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected)
            {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
            self.dimension = Some(expected);
        }

        let start = self.entries.len() as u64;
        let added = documents.into_iter().zip(embeddings).zip(start..).map(
            |((document, embedding), id)| VectorEntry {
                id,
                embedding,
                document,
            },
        );
        self.entries.extend(added);
        Ok(())
    }

    /// The `top_k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(&VectorEntry, f32)>> {
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension
            && query.len() != expected
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(&VectorEntry, f32)> = self
            .entries
            .par_iter()
            .map(|entry| (entry, cosine_similarity(query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Fail with a load error when `embedder` produces vectors of a different
    /// dimension than the stored ones.
    pub fn check_compatible(&self, embedder: &dyn Embedder) -> Result<()> {
        let Some(stored) = self.dimension else {
            return Ok(());
        };
        let actual = embedder.dimension()?;
        if stored != actual {
            return Err(Error::Load(format!(
                "index stores {stored}-dimensional vectors but embedder {} \
                 produces {actual}",
                embedder.model_id()
            )));
        }
        if let Some(model) = &self.model_id
            && model != embedder.model_id()
        {
            warn!(
                stored = %model,
                current = embedder.model_id(),
                "index was built with a different embedding model"
            );
        }
        Ok(())
    }

    /// Write the index to `dir`, replacing any index already there.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let db = Database::create(&path)?;
        let txn = db.begin_write()?;
        {
            let mut settings = txn.open_table(SETTINGS)?;
            settings.insert(SETTING_FORMAT, FORMAT_VERSION)?;
            if let Some(dimension) = self.dimension {
                settings
                    .insert(SETTING_DIMENSION, dimension.to_string().as_str())?;
            }
            if let Some(model) = &self.model_id {
                settings.insert(SETTING_MODEL, model.as_str())?;
            }

            let mut vectors = txn.open_table(VECTORS)?;
            let mut documents = txn.open_table(DOCUMENTS)?;
            for entry in &self.entries {
                let byte_len =
                    HEADER_SIZE + std::mem::size_of_val(entry.embedding.as_slice());
                let mut guard = vectors.insert_reserve(entry.id, byte_len)?;
                let dest = guard.as_mut();
                dest[0..HEADER_SIZE].copy_from_slice(
                    &(entry.embedding.len() as u32).to_le_bytes(),
                );
                dest[HEADER_SIZE..]
                    .copy_from_slice(bytemuck::cast_slice(&entry.embedding));
                drop(guard);

                let json = serde_json::to_string(&entry.document)?;
                documents.insert(entry.id, json.as_str())?;
            }
        }
        txn.commit()?;

        info!(
            path = %dir.display(),
            entries = self.entries.len(),
            "saved vector index"
        );
        Ok(())
    }

    /// Read an index previously written by [`VectorStore::save`].
    ///
    /// Any problem (missing directory or file, unreadable or inconsistent
    /// contents) is reported as [`Error::Load`].
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Load(format!(
                "index directory does not exist: {}",
                dir.display()
            )));
        }
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Err(Error::Load(format!(
                "no index found in {}",
                dir.display()
            )));
        }

        let store = read_index(&path).map_err(|e| match e {
            Error::Load(_) => e,
            other => Error::Load(format!("{}: {other}", path.display())),
        })?;
        info!(
            path = %dir.display(),
            entries = store.len(),
            "loaded vector index"
        );
        Ok(store)
    }
}

fn read_index(path: &Path) -> Result<VectorStore> {
    let db = Database::open(path)?;
    let txn = db.begin_read()?;

    let settings = txn.open_table(SETTINGS)?;
    let format = settings.get(SETTING_FORMAT)?.map(|v| v.value().to_string());
    if format.as_deref() != Some(FORMAT_VERSION) {
        return Err(Error::Load(format!(
            "unsupported index format {format:?}"
        )));
    }
    let dimension = match settings.get(SETTING_DIMENSION)? {
        Some(v) => Some(v.value().parse::<usize>().map_err(|e| {
            Error::Load(format!("invalid stored dimension: {e}"))
        })?),
        None => None,
    };
    let model_id = settings.get(SETTING_MODEL)?.map(|v| v.value().to_string());

    let vectors = txn.open_table(VECTORS)?;
    let documents = txn.open_table(DOCUMENTS)?;

    let mut entries = Vec::new();
    for item in vectors.iter()? {
        let (key, value) = item?;
        let id = key.value();
        let embedding = decode_vector(value.value(), dimension).ok_or_else(
            || Error::Load(format!("corrupt vector for entry {id}")),
        )?;

        let json = documents
            .get(id)?
            .ok_or_else(|| Error::Load(format!("missing document {id}")))?;
        let document: Document = serde_json::from_str(json.value())?;

        entries.push(VectorEntry {
            id,
            embedding,
            document,
        });
    }

    if documents.iter()?.count() != entries.len() {
        return Err(Error::Load(
            "vector and document tables disagree".to_string(),
        ));
    }
    debug!(entries = entries.len(), ?dimension, "read vector index");

    Ok(VectorStore {
        entries,
        dimension,
        model_id,
    })
}

fn decode_vector(bytes: &[u8], dimension: Option<usize>) -> Option<Vec<f32>> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let header: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().ok()?;
    let len = u32::from_le_bytes(header) as usize;
    if dimension != Some(len) {
        return None;
    }

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != len * 4 {
        return None;
    }
    let values = match bytemuck::try_cast_slice::<u8, f32>(payload) {
        Ok(values) => values.to_vec(),
        Err(_) => payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::MetadataValue, embedding::HashingEmbedder};

    fn doc(text: &str) -> Document {
        Document::new(text).with_metadata("source", "test")
    }

    fn sample_store() -> VectorStore {
        let mut store = VectorStore::new().with_model_id("hashing");
        store
            .add(
                vec![doc("north"), doc("east"), doc("north-east")],
                vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
            )
            .unwrap();
        store
    }

    #[test]
    fn search_orders_by_cosine() {
        let store = sample_store();
        let hits = store.search(&[0.1, 1.0], 3).unwrap();
        let names: Vec<_> =
            hits.iter().map(|(e, _)| e.document.content.as_str()).collect();
        assert_eq!(names, vec!["north", "north-east", "east"]);
        assert!(hits[0].1 >= hits[1].1 && hits[1].1 >= hits[2].1);
    }

    #[test]
    fn search_truncates_and_handles_zero_k() {
        let store = sample_store();
        assert_eq!(store.search(&[1.0, 0.0], 1).unwrap().len(), 1);
        assert!(store.search(&[1.0, 0.0], 0).unwrap().is_empty());
        assert_eq!(store.search(&[1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut store = VectorStore::new();
        store
            .add(
                vec![doc("a"), doc("b"), doc("c")],
                vec![vec![1.0, 0.0]; 3],
            )
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<u64> = hits.iter().map(|(e, _)| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn add_rejects_inconsistent_dimensions() {
        let mut store = sample_store();
        let err = store.add(vec![doc("x")], vec![vec![1.0; 3]]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn query_dimension_is_checked() {
        let store = sample_store();
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn save_and_load_preserves_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("index");
        let store = sample_store();
        store.save(&dir).unwrap();

        let loaded = VectorStore::load(&dir).unwrap();
        assert_eq!(loaded.entries(), store.entries());
        assert_eq!(loaded.dimension(), Some(2));
        assert_eq!(loaded.model_id(), Some("hashing"));
    }

    #[test]
    fn float_metadata_survives_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let price = 1.9387323504459148e-7_f64;
        let mut store = VectorStore::new();
        store
            .add(
                vec![Document::new("price list").with_metadata("price", price)],
                vec![vec![1.0, 0.0]],
            )
            .unwrap();
        store.save(tmp.path()).unwrap();

        let loaded = VectorStore::load(tmp.path()).unwrap();
        assert_eq!(loaded.entries(), store.entries());
        assert_eq!(
            loaded.entries()[0].document.metadata["price"],
            MetadataValue::Float(price)
        );
    }

    #[test]
    fn save_overwrites_previous_index() {
        let tmp = tempfile::tempdir().unwrap();
        sample_store().save(tmp.path()).unwrap();

        let mut small = VectorStore::new();
        small.add(vec![doc("only")], vec![vec![1.0]]).unwrap();
        small.save(tmp.path()).unwrap();

        let loaded = VectorStore::load(tmp.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.dimension(), Some(1));
    }

    #[test]
    fn empty_store_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        VectorStore::new().save(tmp.path()).unwrap();
        let loaded = VectorStore::load(tmp.path()).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), None);
    }

    #[test]
    fn load_missing_directory_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = VectorStore::load(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::Load(_)));

        let err = VectorStore::load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn load_garbage_file_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(INDEX_FILE), b"not a database").unwrap();
        let err = VectorStore::load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Load(_)), "{err}");
    }

    #[test]
    fn incompatible_embedder_is_load_error() {
        let store = sample_store();
        let embedder = HashingEmbedder::new(8).unwrap();
        assert!(matches!(
            store.check_compatible(&embedder),
            Err(Error::Load(_))
        ));

        let embedder = HashingEmbedder::new(2).unwrap();
        store.check_compatible(&embedder).unwrap();
    }
}
