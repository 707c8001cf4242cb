use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use vecdb::{
    chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    embedding::EmbeddingBackend,
    lexical_index::Preprocessor,
};

#[derive(Debug, Parser)]
#[command(
    name = "vecdb",
    version,
    about = "Build and query vector databases for retrieval-augmented generation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a vector database from a directory of text files
    FromText(FromTextArgs),
    /// Build a vector database from a CSV file
    FromCsv(FromCsvArgs),
    /// Query a saved vector database
    Query(QueryArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct FromTextArgs {
    /// Directory containing the text files
    #[arg(short, long)]
    pub input_dir: PathBuf,

    /// Directory to save the vector database to
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Extension of the files to read
    #[arg(short = 'e', long, default_value = ".txt")]
    pub file_extension: String,

    /// Also read files in subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Maximum chunk length in characters
    #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(short = 'v', long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Embedding model name or local model path [default:
    /// $VECDB_EMBEDDING_MODEL, else models/text-embedding-004]
    #[arg(short = 'm', long)]
    pub embedding_model: Option<String>,

    /// Embedding backend (inferred from the model name when omitted)
    #[arg(long, value_enum)]
    pub backend: Option<EmbeddingBackend>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Debug, Parser)]
pub struct FromCsvArgs {
    /// CSV file to read
    #[arg(short, long = "input-csv")]
    pub input_csv: PathBuf,

    /// Directory to save the vector database to
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Column(s) whose values form the document content
    #[arg(short = 'c', long = "content-column", required = true)]
    pub content_columns: Vec<String>,

    /// Column(s) copied into the document metadata
    #[arg(short = 'm', long = "metadata-columns")]
    pub metadata_columns: Vec<String>,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Embedding model name or local model path [default:
    /// $VECDB_EMBEDDING_MODEL, else models/text-embedding-004]
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Embedding backend (inferred from the model name when omitted)
    #[arg(long, value_enum)]
    pub backend: Option<EmbeddingBackend>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// How `query` ranks documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchMode {
    Vector,
    Lexical,
    Hybrid,
}

/// Tokenization used by the lexical index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Tokenizer {
    /// Split on whitespace
    Whitespace,
    /// Split on whitespace and lowercase
    Lowercase,
    /// Character bigrams, for text without word separators
    Bigram,
}

impl Tokenizer {
    pub fn preprocessor(self) -> Preprocessor {
        match self {
            Self::Whitespace => Preprocessor::whitespace(),
            Self::Lowercase => Preprocessor::lowercase(),
            Self::Bigram => Preprocessor::char_ngrams(2),
        }
    }
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Query text
    pub query: String,

    /// Directory of a saved vector database
    #[arg(short = 'x', long)]
    pub index: PathBuf,

    /// Number of results
    #[arg(short = 'n', long, default_value_t = 5)]
    pub count: usize,

    /// Ranking mode
    #[arg(long, value_enum, default_value_t = SearchMode::Vector)]
    pub mode: SearchMode,

    /// Hybrid weights as `vector,lexical`
    #[arg(long, value_parser = parse_weights)]
    pub weights: Option<[f32; 2]>,

    /// Lexical tokenization
    #[arg(long, value_enum, default_value_t = Tokenizer::Bigram)]
    pub tokenizer: Tokenizer,

    /// Embedding model (defaults to the one the index was built with)
    #[arg(short = 'm', long)]
    pub embedding_model: Option<String>,

    /// Embedding backend (inferred from the model name when omitted)
    #[arg(long, value_enum)]
    pub backend: Option<EmbeddingBackend>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

fn parse_weights(s: &str) -> Result<[f32; 2], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [vector, lexical] = parts.as_slice() else {
        return Err(format!("expected two comma-separated weights, got '{s}'"));
    };
    let parse = |w: &str| {
        w.parse::<f32>()
            .map_err(|e| format!("invalid weight '{w}': {e}"))
    };
    Ok([parse(vector)?, parse(lexical)?])
}

impl Command {
    pub fn debug(&self) -> bool {
        match self {
            Self::FromText(args) => args.debug,
            Self::FromCsv(args) => args.debug,
            Self::Query(args) => args.debug,
            Self::Completions(_) => false,
        }
    }
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "vecdb",
            &mut std::io::stdout(),
        );
    }
}
