use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    AnswerLanguage, ChunkStrategy, ContentCache, DocumentPipeline, HttpEmbedder,
    OpenAiCompatClient, PipelineOptions, QdrantStore, QuestionRequest, RagOrchestrator,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, default_value = "pdf_rag_chunks")]
    qdrant_collection: String,

    /// Base URL of an OpenAI-compatible embeddings endpoint
    #[arg(long, default_value = "http://localhost:11434")]
    embeddings_url: String,

    /// Embedding model id
    #[arg(long, default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Embedding vector dimension
    #[arg(long, default_value = "768")]
    embedding_dim: usize,

    #[arg(long, env = "EMBEDDINGS_API_KEY")]
    embeddings_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat endpoint
    #[arg(long, default_value = "http://localhost:11434")]
    llm_url: String,

    /// Chat model id
    #[arg(long, default_value = "qwen2.5:7b")]
    llm_model: String,

    #[arg(long, env = "LLM_API_KEY")]
    llm_api_key: Option<String>,

    /// Directory for the content-addressed parse/chunk cache
    #[arg(long, default_value = ".pdf-rag-cache")]
    cache_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, chunk, embed, and index a PDF file or a folder of PDFs.
    Ingest {
        /// PDF file or folder to ingest recursively.
        #[arg(long)]
        path: PathBuf,
        /// Chunking strategy: fixed, paragraph, sentence, page_merge, chapter, hybrid.
        #[arg(long, default_value = "chapter")]
        strategy: String,
        /// Chunk without generating embeddings or touching the index.
        #[arg(long, default_value_t = false)]
        skip_embeddings: bool,
    },
    /// Ask a question against one ingested document.
    Ask {
        /// The question to answer.
        #[arg(long)]
        question: String,
        /// Document id (the content hash printed at ingest time).
        #[arg(long)]
        document: String,
        /// Number of chunks to retrieve.
        #[arg(long, default_value = "4")]
        top_k: usize,
        /// Answer language: en or zh.
        #[arg(long, default_value = "en")]
        language: String,
        #[arg(long, default_value = "0.2")]
        temperature: f32,
    },
    /// Show cache entry counts and size.
    CacheStats,
    /// Drop cache entries for one document, or everything.
    CacheClear {
        /// Document id to clear; clears the whole cache when omitted.
        #[arg(long)]
        document: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let cache = ContentCache::new(&cli.cache_dir);
    let mut embedder = HttpEmbedder::new(
        &cli.embeddings_url,
        &cli.embedding_model,
        cli.embedding_dim,
    );
    if let Some(api_key) = &cli.embeddings_api_key {
        embedder = embedder.with_api_key(api_key.as_str());
    }
    let index = QdrantStore::new(&cli.qdrant_url, &cli.qdrant_collection, cli.embedding_dim);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ingest {
            path,
            strategy,
            skip_embeddings,
        } => {
            let strategy: ChunkStrategy = strategy.parse().map_err(anyhow::Error::msg)?;
            if !skip_embeddings {
                index
                    .ensure_collection()
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            }

            let pipeline = DocumentPipeline::new(cache, index, embedder)
                .with_options(PipelineOptions::default());

            if path.is_file() {
                let processed = pipeline
                    .process_document(&path, strategy, !skip_embeddings)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                print_processed(&processed);
            } else {
                let report = pipeline
                    .ingest_folder(&path, strategy, !skip_embeddings)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                for processed in &report.documents {
                    print_processed(processed);
                }
                println!(
                    "{} document(s) ingested, {} skipped",
                    report.documents.len(),
                    report.skipped_files.len()
                );
            }
        }
        Command::Ask {
            question,
            document,
            top_k,
            language,
            temperature,
        } => {
            let language: AnswerLanguage = language.parse().map_err(anyhow::Error::msg)?;
            let mut llm = OpenAiCompatClient::new(&cli.llm_url, &cli.llm_model);
            if let Some(api_key) = &cli.llm_api_key {
                llm = llm.with_api_key(api_key.as_str());
            }

            let orchestrator = RagOrchestrator::new(index, embedder, llm);
            let answer = orchestrator
                .answer_question(QuestionRequest {
                    question,
                    document_id: document,
                    top_k: Some(top_k),
                    language,
                    temperature,
                })
                .await;

            println!("{}", answer.answer_text);
            println!();
            for (rank, source) in answer.sources.iter().enumerate() {
                let page = source
                    .page
                    .map(|page| page.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let similarity = source
                    .similarity
                    .map(|score| format!("{score:.3}"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "[{}] page={} similarity={} chunk={}",
                    rank + 1,
                    page,
                    similarity,
                    source.chunk_id
                );
                println!("  {}", source.content_snippet.replace('\n', " "));
            }
            println!(
                "answered in {} ms",
                answer.processing_time.as_millis()
            );
        }
        Command::CacheStats => {
            let stats = cache.stats();
            println!("cache dir: {}", cli.cache_dir.display());
            println!("structured text entries: {}", stats.structured_text_entries);
            println!("chunk set entries: {}", stats.chunk_set_entries);
            println!("metadata entries: {}", stats.metadata_entries);
            println!("total size: {} bytes", stats.total_bytes);
        }
        Command::CacheClear { document } => {
            cache.clear(document.as_deref());
            match document {
                Some(document) => println!("cleared cache entries for {document}"),
                None => println!("cleared the whole cache"),
            }
        }
    }

    Ok(())
}

fn print_processed(processed: &pdf_rag_core::ProcessedDocument) {
    println!(
        "{}: {} chunk(s), {} embedded, cache_hit={} ({})",
        processed.fingerprint.document_id,
        processed.chunks.len(),
        processed.embedded_count,
        processed.cache_hit,
        Path::new(&processed.fingerprint.source_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
    );
}
