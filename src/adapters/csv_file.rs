use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{DocumentSource, walker};
use crate::{
    document::{Document, Metadata, SOURCE_KEY},
    error::{Error, Result},
};

/// Metadata key holding the zero-based data row a document came from.
pub const ROW_KEY: &str = "row";

/// A CSV file opened with its header row resolved.
struct CsvTable {
    reader: csv::Reader<std::fs::File>,
    headers: Vec<String>,
}

impl CsvTable {
    fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)?;
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        Ok(Self { reader, headers })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// `(name, index)` for each of `names` present in the header.
    fn columns<'a>(&self, names: &'a [String]) -> Vec<(&'a str, usize)> {
        names
            .iter()
            .filter_map(|name| Some((name.as_str(), self.column(name)?)))
            .collect()
    }
}

fn cell(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn base_metadata(path: &Path, row: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), path.display().to_string().into());
    metadata.insert(ROW_KEY.to_string(), row.into());
    metadata
}

/// One document per row of a CSV file.
///
/// Content is built from `content_columns` as `"{column}: {value}"` lines;
/// `metadata_columns` are copied into the document metadata alongside
/// `source` and `row`. The file must be UTF-8; rows that are not are logged
/// and skipped.
#[derive(Debug, Clone)]
pub struct CsvFileAdapter {
    path: PathBuf,
    content_columns: Vec<String>,
    metadata_columns: Vec<String>,
    delimiter: u8,
}

impl CsvFileAdapter {
    /// Fails with [`Error::Config`] when `content_columns` is empty.
    pub fn new(
        path: impl Into<PathBuf>,
        content_columns: Vec<String>,
        metadata_columns: Vec<String>,
    ) -> Result<Self> {
        if content_columns.is_empty() {
            return Err(Error::Config(
                "at least one content column is required".to_string(),
            ));
        }
        Ok(Self {
            path: path.into(),
            content_columns,
            metadata_columns,
            delimiter: b',',
        })
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Document>> {
        let mut table = CsvTable::open(&self.path, self.delimiter)?;
        let content_idx = table.columns(&self.content_columns);
        if content_idx.is_empty() {
            return Err(Error::Config(format!(
                "none of the content columns {:?} exist",
                self.content_columns
            )));
        }
        let metadata_idx = table.columns(&self.metadata_columns);

        let mut documents = Vec::new();
        for (row, record) in table.reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        row,
                        error = %e,
                        "skipping malformed CSV row"
                    );
                    continue;
                }
            };

            let content = content_idx
                .iter()
                .filter_map(|(name, idx)| {
                    let value = cell(&record, *idx);
                    (!value.is_empty()).then(|| format!("{name}: {value}"))
                })
                .collect::<Vec<_>>()
                .join("\n");
            if content.is_empty() {
                continue;
            }

            let mut metadata = base_metadata(&self.path, row);
            for (name, idx) in &metadata_idx {
                metadata.insert(name.to_string(), cell(&record, *idx).into());
            }
            documents.push(Document { content, metadata });
        }
        Ok(documents)
    }
}

impl DocumentSource for CsvFileAdapter {
    /// A missing or unreadable file yields nothing; malformed rows are
    /// skipped.
    fn get_documents(&self) -> Vec<Document> {
        if !self.path.is_file() {
            warn!(path = %self.path.display(), "CSV file does not exist");
            return Vec::new();
        }
        match self.read() {
            Ok(documents) => {
                info!(
                    path = %self.path.display(),
                    documents = documents.len(),
                    "loaded CSV file"
                );
                documents
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read CSV file"
                );
                Vec::new()
            }
        }
    }
}

/// Every `*.csv` file directly inside a directory, in path order.
#[derive(Debug, Clone)]
pub struct CsvDirectoryAdapter {
    directory: PathBuf,
    extension: String,
    template: CsvFileAdapter,
}

impl CsvDirectoryAdapter {
    pub fn new(
        directory: impl Into<PathBuf>,
        content_columns: Vec<String>,
        metadata_columns: Vec<String>,
    ) -> Result<Self> {
        let directory = directory.into();
        let template =
            CsvFileAdapter::new(&directory, content_columns, metadata_columns)?;
        Ok(Self {
            directory,
            extension: "csv".to_string(),
            template,
        })
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.template.delimiter = delimiter;
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = walker::normalize_extension(extension);
        self
    }
}

impl DocumentSource for CsvDirectoryAdapter {
    fn get_documents(&self) -> Vec<Document> {
        if !self.directory.is_dir() {
            warn!(directory = %self.directory.display(), "directory does not exist");
            return Vec::new();
        }
        let files =
            match walker::discover_files(&self.directory, &self.extension, false)
            {
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
            .into_iter()
            .flat_map(|path| {
                CsvFileAdapter {
                    path,
                    ..self.template.clone()
                }
                .get_documents()
            })
            .collect();
        info!(
            directory = %self.directory.display(),
            documents = documents.len(),
            "loaded CSV directory"
        );
        documents
    }
}

/// Load a question/answer dataset, one document per row.
///
/// Content is `"question: {q}\nanswer: {a}"`, or the bare question when
/// `embed_answer` is false. Both values are also kept in the metadata. Rows
/// with an empty question or answer are skipped; a missing file or column
/// yields nothing.
pub fn load_qa_dataset_from_csv(
    path: &Path,
    question_column: &str,
    answer_column: &str,
    metadata_columns: &[String],
    embed_answer: bool,
) -> Vec<Document> {
    if !path.is_file() {
        warn!(path = %path.display(), "CSV file does not exist");
        return Vec::new();
    }

    let read = || -> Result<Vec<Document>> {
        let mut table = CsvTable::open(path, b',')?;
        let (Some(q_idx), Some(a_idx)) =
            (table.column(question_column), table.column(answer_column))
        else {
            return Err(Error::Config(format!(
                "columns '{question_column}' and '{answer_column}' are required"
            )));
        };
        let metadata_idx = table.columns(metadata_columns);

        let mut documents = Vec::new();
        for (row, record) in table.reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(row, error = %e, "skipping malformed CSV row");
                    continue;
                }
            };
            let question = cell(&record, q_idx);
            let answer = cell(&record, a_idx);
            if question.is_empty() || answer.is_empty() {
                continue;
            }

            let content = if embed_answer {
                format!("question: {question}\nanswer: {answer}")
            } else {
                question.to_string()
            };
            let mut metadata = base_metadata(path, row);
            metadata.insert("question".to_string(), question.into());
            metadata.insert("answer".to_string(), answer.into());
            for (name, idx) in &metadata_idx {
                metadata.insert(name.to_string(), cell(&record, *idx).into());
            }
            documents.push(Document { content, metadata });
        }
        Ok(documents)
    };

    match read() {
        Ok(documents) => {
            info!(
                path = %path.display(),
                documents = documents.len(),
                "loaded Q&A dataset"
            );
            documents
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read Q&A dataset");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataValue;

    const FAQ: &str = "\
質問,回答,カテゴリ
ベクトルデータベースとは？,埋め込みを保存して検索するデータベースです。,データベース
,回答だけの行,その他
LangChainとは？,LLMアプリ開発のためのライブラリです。,ライブラリ
";

    fn faq_file(dir: &Path) -> PathBuf {
        let path = dir.join("faq.csv");
        std::fs::write(&path, FAQ).unwrap();
        path
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rows_become_labelled_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = faq_file(tmp.path());
        let adapter = CsvFileAdapter::new(
            &path,
            strings(&["質問", "回答"]),
            strings(&["カテゴリ"]),
        )
        .unwrap();

        let docs = adapter.get_documents();
        assert_eq!(docs.len(), 3);
        assert_eq!(
            docs[0].content,
            "質問: ベクトルデータベースとは？\n回答: 埋め込みを保存して検索するデータベースです。"
        );
        assert_eq!(docs[0].metadata[ROW_KEY], MetadataValue::Int(0));
        assert_eq!(
            docs[0].metadata["カテゴリ"],
            MetadataValue::from("データベース")
        );
        assert_eq!(docs[1].content, "回答: 回答だけの行");
        assert_eq!(docs[2].metadata[ROW_KEY], MetadataValue::Int(2));
        assert_eq!(docs[2].source(), Some(path.display().to_string().as_str()));
    }

    #[test]
    fn non_utf8_rows_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mixed.csv");
        let mut bytes = b"q,a\n".to_vec();
        // "テスト" in Shift_JIS.
        bytes.extend_from_slice(&[0x83, 0x65, 0x83, 0x58, 0x83, 0x67]);
        bytes.extend_from_slice(b",x\nok,fine\n");
        std::fs::write(&path, bytes).unwrap();

        let docs = CsvFileAdapter::new(&path, strings(&["q", "a"]), vec![])
            .unwrap()
            .get_documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "q: ok\na: fine");
        assert_eq!(docs[0].metadata[ROW_KEY], MetadataValue::Int(1));
    }

    #[test]
    fn empty_content_columns_is_config_error() {
        let err = CsvFileAdapter::new("x.csv", Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_or_columns_yield_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let missing =
            CsvFileAdapter::new(tmp.path().join("nope.csv"), strings(&["a"]), vec![])
                .unwrap();
        assert!(missing.get_documents().is_empty());

        let path = faq_file(tmp.path());
        let wrong_column =
            CsvFileAdapter::new(&path, strings(&["body"]), vec![]).unwrap();
        assert!(wrong_column.get_documents().is_empty());
    }

    #[test]
    fn custom_delimiter() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.tsv");
        std::fs::write(&path, "text\ttag\nhello world\tgreeting\n").unwrap();

        let docs = CsvFileAdapter::new(&path, strings(&["text"]), strings(&["tag"]))
            .unwrap()
            .with_delimiter(b'\t')
            .get_documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "text: hello world");
        assert_eq!(docs[0].metadata["tag"], MetadataValue::from("greeting"));
    }

    #[test]
    fn directory_adapter_reads_every_csv() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.csv"), "text\nalpha\n").unwrap();
        std::fs::write(tmp.path().join("b.csv"), "text\nbeta\ngamma\n").unwrap();
        std::fs::write(tmp.path().join("c.txt"), "text\nignored\n").unwrap();

        let docs = CsvDirectoryAdapter::new(tmp.path(), strings(&["text"]), vec![])
            .unwrap()
            .get_documents();
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["text: alpha", "text: beta", "text: gamma"]);
    }

    #[test]
    fn qa_dataset_embeds_question_and_answer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = faq_file(tmp.path());

        let docs = load_qa_dataset_from_csv(
            &path,
            "質問",
            "回答",
            &strings(&["カテゴリ"]),
            true,
        );
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[1].content,
            "question: LangChainとは？\nanswer: LLMアプリ開発のためのライブラリです。"
        );
        assert_eq!(docs[1].metadata["question"], MetadataValue::from("LangChainとは？"));
        assert_eq!(docs[1].metadata[ROW_KEY], MetadataValue::Int(2));
        assert_eq!(docs[1].metadata["カテゴリ"], MetadataValue::from("ライブラリ"));
    }

    #[test]
    fn qa_dataset_question_only() {
        let tmp = tempfile::tempdir().unwrap();
        let path = faq_file(tmp.path());
        let docs = load_qa_dataset_from_csv(&path, "質問", "回答", &[], false);
        assert_eq!(docs[0].content, "ベクトルデータベースとは？");
        assert!(docs[0].metadata.contains_key("answer"));
    }

    #[test]
    fn qa_dataset_missing_column_yields_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = faq_file(tmp.path());
        assert!(load_qa_dataset_from_csv(&path, "q", "a", &[], true).is_empty());
    }
}
