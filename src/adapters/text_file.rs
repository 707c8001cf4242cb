use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{DocumentSource, walker};
use crate::{
    document::{Document, Metadata, SOURCE_KEY},
    error::{Error, Result},
};

/// Metadata key holding the file name without its directory.
pub const FILENAME_KEY: &str = "filename";

/// Derives extra metadata from a file's content and path.
pub type MetadataExtractor =
    Arc<dyn Fn(&str, &Path) -> Result<Metadata> + Send + Sync>;

/// One document per text file in a directory.
///
/// Files must be UTF-8. Files in any other encoding are logged and skipped,
/// so convert legacy encodings such as Shift_JIS before ingesting.
#[derive(Clone)]
pub struct TextFileAdapter {
    directory: PathBuf,
    extension: String,
    recursive: bool,
    metadata_extractor: Option<MetadataExtractor>,
}

impl TextFileAdapter {
    /// Reads `*.txt` files directly inside `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: "txt".to_string(),
            recursive: false,
            metadata_extractor: None,
        }
    }

    /// Match files by `extension`, with or without the leading dot.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = walker::normalize_extension(extension);
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_metadata_extractor(
        mut self,
        extractor: MetadataExtractor,
    ) -> Self {
        self.metadata_extractor = Some(extractor);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn read_file(&self, path: &Path) -> Result<Document> {
        let source_read = |message: String| Error::SourceRead {
            source_id: path.display().to_string(),
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| source_read(e.to_string()))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| source_read("file is not valid UTF-8".to_string()))?;

        let metadata = self.metadata_for(&content, path);
        Ok(Document {
            content,
            metadata,
        })
    }

    fn metadata_for(&self, content: &str, path: &Path) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), path.display().to_string().into());
        if let Some(name) = path.file_name() {
            metadata.insert(
                FILENAME_KEY.to_string(),
                name.to_string_lossy().into_owned().into(),
            );
        }

        if let Some(extractor) = &self.metadata_extractor {
            match extractor(content, path) {
                Ok(extra) => metadata.extend(extra),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "metadata extraction failed"
                ),
            }
        }
        metadata
    }
}

impl DocumentSource for TextFileAdapter {
    /// Matching files in path order. A missing directory yields nothing;
    /// unreadable or non-UTF-8 files are skipped.
    fn get_documents(&self) -> Vec<Document> {
        if !self.directory.is_dir() {
            warn!(directory = %self.directory.display(), "directory does not exist");
            return Vec::new();
        }

        let files = match walker::discover_files(
            &self.directory,
            &self.extension,
            self.recursive,
        ) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    directory = %self.directory.display(),
                    error = %e,
                    "failed to list directory"
                );
                return Vec::new();
            }
        };

        let documents: Vec<Document> = files
            .par_iter()
            .filter_map(|path| match self.read_file(path) {
                Ok(doc) => {
                    debug!(path = %path.display(), "read text file");
                    Some(doc)
                }
                Err(e) => {
                    warn!(error = %e, "skipping file");
                    None
                }
            })
            .collect();

        info!(
            directory = %self.directory.display(),
            documents = documents.len(),
            "loaded text files"
        );
        documents
    }
}

impl std::fmt::Debug for TextFileAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextFileAdapter")
            .field("directory", &self.directory)
            .field("extension", &self.extension)
            .field("recursive", &self.recursive)
            .finish_non_exhaustive()
    }
}

/// Text files from several directories, in the order given.
#[derive(Debug, Clone)]
pub struct TextDirectoryAdapter {
    adapters: Vec<TextFileAdapter>,
}

impl TextDirectoryAdapter {
    /// Every directory shares the options of `template`.
    pub fn new<P: Into<PathBuf>>(
        directories: impl IntoIterator<Item = P>,
        template: &TextFileAdapter,
    ) -> Self {
        let adapters = directories
            .into_iter()
            .map(|dir| TextFileAdapter {
                directory: dir.into(),
                ..template.clone()
            })
            .collect();
        Self { adapters }
    }
}

impl DocumentSource for TextDirectoryAdapter {
    fn get_documents(&self) -> Vec<Document> {
        let documents: Vec<Document> = self
            .adapters
            .iter()
            .flat_map(TextFileAdapter::get_documents)
            .collect();
        info!(
            directories = self.adapters.len(),
            documents = documents.len(),
            "loaded text directories"
        );
        documents
    }
}
