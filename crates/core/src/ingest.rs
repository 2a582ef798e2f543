use crate::cache::{ArtifactKind, ContentCache};
use crate::chunking;
use crate::embeddings::Embedder;
use crate::error::ProcessingError;
use crate::extractor;
use crate::models::{
    Chunk, ChunkStrategy, ChunkingOptions, DocumentFingerprint, DocumentMetadata, EmbeddedChunk,
    ProcessedDocument,
};
use crate::parser::{DocumentParser, ExtractionEngine, RemoteOcrConfig, DEFAULT_PAGE_LIMIT};
use crate::traits::VectorIndex;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunking: ChunkingOptions,
    pub engine: ExtractionEngine,
    /// Alternate engine for pages the primary extracted nothing from.
    pub fallback_engine: Option<ExtractionEngine>,
    pub remote_ocr: Option<RemoteOcrConfig>,
    pub page_limit: usize,
    pub parse_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            engine: ExtractionEngine::Lopdf,
            fallback_engine: None,
            remote_ocr: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            parse_timeout: None,
        }
    }
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<ProcessedDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Parse -> structure -> chunk -> embed -> index, with the content cache
/// consulted at each derived-artifact stage. Indexing is atomic per
/// document: a failed upsert rolls back that document's points.
pub struct DocumentPipeline<V, E>
where
    V: VectorIndex,
    E: Embedder,
{
    cache: ContentCache,
    index: V,
    embedder: E,
    options: PipelineOptions,
}

impl<V, E> DocumentPipeline<V, E>
where
    V: VectorIndex + Send + Sync,
    E: Embedder,
{
    pub fn new(cache: ContentCache, index: V, embedder: E) -> Self {
        Self {
            cache,
            index,
            embedder,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub async fn process_document(
        &self,
        path: &Path,
        strategy: ChunkStrategy,
        generate_embeddings: bool,
    ) -> Result<ProcessedDocument, ProcessingError> {
        let hash = ContentCache::compute_file_hash(path)?;

        let structured = extractor::structured_document(
            &self.cache,
            path,
            &hash,
            self.options.engine,
            self.options.fallback_engine,
            self.options.remote_ocr.clone(),
            self.options.page_limit,
            self.options.parse_timeout,
        )
        .await?;

        let (chunks, cache_hit) = match self.cache.get::<Vec<Chunk>>(
            &hash,
            ArtifactKind::ChunkSet,
            Some(strategy.name()),
        ) {
            Some(chunks) => (chunks, true),
            None => {
                let chunks = chunking::chunk_pages(
                    &hash,
                    &structured.pages,
                    strategy,
                    &self.options.chunking,
                )?;
                self.cache
                    .put(&hash, ArtifactKind::ChunkSet, Some(strategy.name()), &chunks);
                (chunks, false)
            }
        };

        let mut embedded_count = 0usize;
        if generate_embeddings && !chunks.is_empty() {
            embedded_count = self.index_chunks(&hash, &chunks).await?;
        }

        let fingerprint = DocumentFingerprint {
            document_id: hash.clone(),
            document_title: document_title(path)?,
            source_path: path.to_string_lossy().to_string(),
            content_hash: hash,
            page_count: structured.stats.page_count,
            ingested_at: Utc::now(),
        };

        info!(
            document_id = %fingerprint.document_id,
            chunks = chunks.len(),
            cache_hit,
            embedded = embedded_count,
            "document processed"
        );

        Ok(ProcessedDocument {
            fingerprint,
            chunks,
            cache_hit,
            embedded_count,
        })
    }

    /// Cached PDF metadata (title, author, page count) for a file.
    pub async fn document_metadata(&self, path: &Path) -> Result<DocumentMetadata, ProcessingError> {
        let hash = ContentCache::compute_file_hash(path)?;
        if let Some(cached) = self
            .cache
            .get::<DocumentMetadata>(&hash, ArtifactKind::Metadata, None)
        {
            return Ok(cached);
        }

        let path_owned = path.to_path_buf();
        let page_limit = self.options.page_limit;
        let remote_ocr = self.options.remote_ocr.clone();
        let metadata = tokio::task::spawn_blocking(move || {
            DocumentParser::open_with_limit(&path_owned, page_limit, remote_ocr)
                .map(|parser| parser.metadata())
        })
        .await
        .map_err(|error| ProcessingError::Io(std::io::Error::other(error)))??;

        self.cache.put(&hash, ArtifactKind::Metadata, None, &metadata);
        Ok(metadata)
    }

    async fn index_chunks(
        &self,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<usize, ProcessingError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let embedded: Vec<EmbeddedChunk> = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                chunk,
                vector,
                embedding_model_id: self.embedder.model_id().to_string(),
            })
            .collect();

        if let Err(error) = self.index.upsert_chunks(document_id, &embedded).await {
            warn!(document_id, %error, "index upsert failed, rolling back document");
            if let Err(cleanup) = self.index.delete_document(document_id).await {
                warn!(document_id, %cleanup, "rollback delete failed");
            }
            return Err(error.into());
        }

        Ok(embedded.len())
    }

    /// Best-effort batch ingestion: unreadable files are reported, not fatal.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        strategy: ChunkStrategy,
        generate_embeddings: bool,
    ) -> Result<IngestionReport, ProcessingError> {
        let files = discover_pdf_files(folder);
        if files.is_empty() {
            return Err(ProcessingError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut documents = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            match self
                .process_document(&path, strategy, generate_embeddings)
                .await
            {
                Ok(processed) => documents.push(processed),
                Err(error) => skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                }),
            }
        }

        Ok(IngestionReport {
            documents,
            skipped_files,
        })
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn document_title(path: &Path) -> Result<String, ProcessingError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ProcessingError::InvalidArgument(format!("path missing filename: {}", path.display()))
        })
}
