//! Chunking utilities for splitting long documents into overlapping segments.
//!
//! Documents longer than the configured chunk size are split into windows
//! that overlap by a configurable number of characters, so that every chunk
//! can be embedded and retrieved on its own.

use tracing::debug;

use crate::{
    document::{Document, MetadataValue},
    error::{Error, Result},
};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Metadata key holding a chunk's zero-based position within its parent.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Metadata key holding the byte offset of a chunk within its parent.
pub const START_INDEX_KEY: &str = "start_index";

/// How far back (in characters) to look for whitespace when ending a chunk.
const BOUNDARY_LOOKBACK: usize = 100;

/// Chunk size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap > self.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must not exceed chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A chunk of text from a larger document.
///
/// Produced by [`chunk_text`]. Each chunk represents a window of the
/// original text, with an index and byte offset for mapping back.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Zero-based chunk index within the document.
    pub index: usize,
    /// Byte offset where this chunk starts in the original document.
    pub start_offset: usize,
}

/// Split text into overlapping chunks of at most `chunk_size` characters.
///
/// Chunks prefer to end right after whitespace. Consecutive chunks share up
/// to `overlap` characters, and together they cover every non-whitespace
/// character of the input. Windows containing only whitespace are dropped.
///
/// # Examples
///
/// ```
/// use vecdb::chunking::chunk_text;
///
/// // Short text returns a single chunk
/// let chunks = chunk_text("Hello, world!", 1000, 0);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "Hello, world!");
///
/// // Long text gets split
/// let text = "word ".repeat(500);
/// let chunks = chunk_text(&text, 1000, 200);
/// assert!(chunks.len() >= 2);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let char_count = text.chars().count();

    if char_count <= chunk_size {
        if text.trim().is_empty() {
            return Vec::new();
        }
        return vec![Chunk {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
        }];
    }

    // char index -> byte index, with a trailing entry for the end of text
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start_char = 0;

    loop {
        let window_end = (start_char + chunk_size).min(char_count);
        let end_char = if window_end < char_count {
            find_word_boundary_char(text, &char_to_byte, start_char, window_end)
        } else {
            window_end
        };

        let start_byte = char_to_byte[start_char];
        let end_byte = char_to_byte[end_char];
        let piece = &text[start_byte..end_byte];
        if !piece.trim().is_empty() {
            chunks.push(Chunk {
                text: piece.to_string(),
                index: chunks.len(),
                start_offset: start_byte,
            });
        }

        if end_char >= char_count {
            break;
        }

        // The next window starts inside this one, but always moves forward.
        start_char = end_char.saturating_sub(overlap).max(start_char + 1);
    }

    chunks
}

/// Find a break point in `(start_char, pos_char]`, preferring the position
/// just after the last whitespace character.
fn find_word_boundary_char(
    text: &str,
    char_to_byte: &[usize],
    start_char: usize,
    pos_char: usize,
) -> usize {
    let search_start_char =
        pos_char.saturating_sub(BOUNDARY_LOOKBACK).max(start_char + 1);
    if search_start_char >= pos_char {
        return pos_char;
    }

    let start_byte = char_to_byte[search_start_char];
    let end_byte = char_to_byte[pos_char];
    let search_region = &text[start_byte..end_byte];

    if let Some((ws_offset, ws)) = search_region
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
    {
        let after_ws = start_byte + ws_offset + ws.len_utf8();
        if let Ok(idx) = char_to_byte.binary_search(&after_ws) {
            return idx;
        }
    }

    pos_char
}

/// Splits documents into chunk documents.
///
/// Each chunk inherits its parent's metadata and gains `chunk_index` and
/// `start_index`.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    pub fn split_document(&self, document: &Document) -> Vec<Document> {
        chunk_text(
            &document.content,
            self.config.chunk_size,
            self.config.overlap,
        )
        .into_iter()
        .map(|chunk| {
            let mut metadata = document.metadata.clone();
            metadata
                .insert(CHUNK_INDEX_KEY.to_string(), chunk.index.into());
            metadata.insert(
                START_INDEX_KEY.to_string(),
                MetadataValue::from(chunk.start_offset),
            );
            Document {
                content: chunk.text,
                metadata,
            }
        })
        .collect()
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let chunks: Vec<Document> = documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect();
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            overlap = self.config.overlap,
            "split documents into chunks"
        );
        chunks
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn covered_bytes(text: &str, chunks: &[Chunk]) -> Vec<bool> {
        let mut covered = vec![false; text.len()];
        for chunk in chunks {
            let end = chunk.start_offset + chunk.text.len();
            assert_eq!(&text[chunk.start_offset..end], chunk.text);
            for flag in &mut covered[chunk.start_offset..end] {
                *flag = true;
            }
        }
        covered
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text(
            "Hello, world!",
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("", 10, 2).is_empty());
        assert!(chunk_text("   \n ", 10, 2).is_empty());
    }

    #[test]
    fn long_text_multiple_chunks() {
        let text = "word ".repeat(500); // 2500 chars
        let chunks = chunk_text(&text, 1000, 200);

        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);

        let first_end = chunks[0].start_offset + chunks[0].text.len();
        let second_start = chunks[1].start_offset;
        assert!(second_start < first_end, "chunks should overlap");
    }

    #[test]
    fn chunks_break_after_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = chunk_text(text, 12, 0);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with(' '), "{:?}", chunk.text);
        }
    }

    #[test]
    fn chunks_cover_full_text() {
        let text = "a".repeat(3000);
        let chunks = chunk_text(&text, 1000, 200);

        assert_eq!(chunks[0].start_offset, 0);
        assert!(covered_bytes(&text, &chunks).into_iter().all(|c| c));
    }

    #[test]
    fn handles_mixed_length_unicode() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(50);
        let chunks = chunk_text(&text, 100, 20);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
        }
    }

    #[test]
    fn config_rejects_overlap_larger_than_size() {
        assert!(matches!(ChunkerConfig::new(10, 11), Err(Error::Config(_))));
        assert!(matches!(ChunkerConfig::new(0, 0), Err(Error::Config(_))));
        assert!(ChunkerConfig::new(10, 10).is_ok());
    }

    #[test]
    fn split_documents_adds_chunk_metadata() {
        let chunker = Chunker::new(ChunkerConfig::new(10, 0).unwrap()).unwrap();
        let doc = Document::new("one two three four five")
            .with_metadata("source", "numbers.txt");

        let chunks = chunker.split_documents(&[doc]);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source(), Some("numbers.txt"));
            assert_eq!(
                chunk.metadata[CHUNK_INDEX_KEY],
                MetadataValue::Int(i as i64)
            );
        }
        assert_eq!(chunks[0].metadata[START_INDEX_KEY], MetadataValue::Int(0));
    }

    proptest! {
        #[test]
        fn chunks_cover_every_non_whitespace_byte(
            words in proptest::collection::vec("[a-z日本]{1,12}", 0..60),
            chunk_size in 1usize..80,
            overlap_frac in 0.0f64..=1.0,
        ) {
            let text = words.join(" ");
            let overlap = (chunk_size as f64 * overlap_frac) as usize;
            let chunks = chunk_text(&text, chunk_size, overlap);

            let covered = covered_bytes(&text, &chunks);
            for (offset, ch) in text.char_indices() {
                if !ch.is_whitespace() {
                    prop_assert!(covered[offset], "byte {} uncovered", offset);
                }
            }
            for chunk in &chunks {
                prop_assert!(chunk.text.chars().count() <= chunk_size);
            }
            for pair in chunks.windows(2) {
                prop_assert!(pair[0].start_offset < pair[1].start_offset);
            }
        }
    }
}
