use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vecdb::{
    Chunker, ChunkerConfig, Document, DocumentSource, Retriever, VectorDb,
    adapters::{CsvFileAdapter, TextFileAdapter},
    config::{EmbeddingConfig, LOG_ENV_VAR},
    embedding,
    error::{Error, Result},
    retrieval::{HybridRetriever, LexicalRetriever, VectorRetriever},
    text_util::{DEFAULT_PREVIEW_CHARS, preview},
    vector_store::VectorStore,
};

mod cli;

use cli::{Cli, Command, FromCsvArgs, FromTextArgs, QueryArgs, SearchMode};

/// Query run against a freshly built database to show that it works.
const SMOKE_QUERY: &str = "テスト";

fn init_tracing(debug: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
        EnvFilter::new(env)
    } else if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.debug());

    match cli.command {
        Command::FromText(args) => cmd_from_text(&args)?,
        Command::FromCsv(args) => cmd_from_csv(&args)?,
        Command::Query(args) => cmd_query(&args)?,
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn cmd_from_text(args: &FromTextArgs) -> Result<()> {
    if !args.input_dir.is_dir() {
        return Err(Error::Config(format!(
            "input directory does not exist: {}",
            args.input_dir.display()
        )));
    }

    let documents = TextFileAdapter::new(&args.input_dir)
        .with_extension(&args.file_extension)
        .with_recursive(args.recursive)
        .get_documents();
    info!(documents = documents.len(), "loaded documents");

    let config =
        EmbeddingConfig::resolve(args.embedding_model.as_deref(), args.backend);
    build_and_save(
        &documents,
        &config,
        ChunkerConfig::new(args.chunk_size, args.chunk_overlap)?,
        &args.output_dir,
    )
}

fn cmd_from_csv(args: &FromCsvArgs) -> Result<()> {
    if !args.input_csv.is_file() {
        return Err(Error::Config(format!(
            "input CSV file does not exist: {}",
            args.input_csv.display()
        )));
    }
    let delimiter = u8::try_from(args.delimiter).map_err(|_| {
        Error::Config(format!(
            "delimiter must be a single-byte character, got '{}'",
            args.delimiter
        ))
    })?;

    let documents = CsvFileAdapter::new(
        &args.input_csv,
        args.content_columns.clone(),
        args.metadata_columns.clone(),
    )?
    .with_delimiter(delimiter)
    .get_documents();
    info!(documents = documents.len(), "loaded documents");

    let config =
        EmbeddingConfig::resolve(args.embedding_model.as_deref(), args.backend);
    build_and_save(
        &documents,
        &config,
        ChunkerConfig::new(args.chunk_size, args.chunk_overlap)?,
        &args.output_dir,
    )
}

/// Chunk, embed and save `documents`, then print the best match for a
/// smoke-test query.
fn build_and_save(
    documents: &[Document],
    config: &EmbeddingConfig,
    chunker: ChunkerConfig,
    output_dir: &Path,
) -> Result<()> {
    let embedder = embedding::create_embedder(config)?;
    let mut db = VectorDb::new(embedder, Some(Chunker::new(chunker)?));
    db.build_from_documents(documents)?;

    std::fs::create_dir_all(output_dir)?;
    db.save(output_dir)?;
    info!(path = %output_dir.display(), "saved vector database");

    let results = db.query(SMOKE_QUERY, 1)?;
    if let Some((content, metadata)) = results.first() {
        println!("Test query: {SMOKE_QUERY}");
        println!(
            "Top document: {}",
            preview(content, DEFAULT_PREVIEW_CHARS)
        );
        println!("Metadata: {}", serde_json::to_string(metadata)?);
    }
    Ok(())
}

fn cmd_query(args: &QueryArgs) -> Result<()> {
    let store = VectorStore::load(&args.index)?;
    let model = args.embedding_model.as_deref().or(store.model_id());
    let config = EmbeddingConfig::resolve(model, args.backend);
    let embedder = embedding::create_embedder(&config)?;
    store.check_compatible(embedder.as_ref())?;

    let weights = match (args.mode, args.weights) {
        (SearchMode::Hybrid, weights) => weights,
        (_, Some(_)) => {
            return Err(Error::Config(
                "--weights only applies to hybrid mode".to_string(),
            ));
        }
        (_, None) => None,
    };

    let documents: Vec<Document> = store.documents().cloned().collect();
    let vector = VectorRetriever::new(store, embedder);
    let retriever: Box<dyn Retriever> = match args.mode {
        SearchMode::Vector => Box::new(vector),
        SearchMode::Lexical => Box::new(LexicalRetriever::new(
            documents,
            args.tokenizer.preprocessor(),
        )?),
        SearchMode::Hybrid => Box::new(HybridRetriever::new(
            vector,
            LexicalRetriever::new(documents, args.tokenizer.preprocessor())?,
            weights,
        )?),
    };

    let results = retriever.retrieve(&args.query, args.count)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. [{:.4}] {}",
            rank + 1,
            result.score,
            preview(&result.content, DEFAULT_PREVIEW_CHARS)
        );
        if !result.metadata.is_empty() {
            println!("    {}", serde_json::to_string(&result.metadata)?);
        }
    }
    Ok(())
}
