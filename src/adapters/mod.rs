//! Adapters turn external sources into [`Document`]s.
//!
//! Adapters are forgiving: a source that is missing yields no documents and
//! a record that cannot be read is logged and skipped, so one bad file never
//! aborts a whole ingestion run.

pub mod csv_file;
pub mod text_file;
pub mod walker;
pub mod youtube;

pub use csv_file::{CsvDirectoryAdapter, CsvFileAdapter, load_qa_dataset_from_csv};
pub use text_file::{MetadataExtractor, TextDirectoryAdapter, TextFileAdapter};
pub use youtube::{
    HttpTranscriptSource, TranscriptSource, VideoInfo, YouTubeAdapter,
    YouTubeCsvAdapter, YouTubePlaylistAdapter,
};

use crate::document::Document;

/// A source of documents.
pub trait DocumentSource {
    fn get_documents(&self) -> Vec<Document>;
}
