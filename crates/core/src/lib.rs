pub mod cache;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod stores;
pub mod traits;

pub use cache::{ArtifactKind, CacheStats, ContentCache};
pub use chunking::chunk_pages;
pub use embeddings::{
    cosine_similarity, similarity_scores, Embedder, HttpEmbedder, DEFAULT_BATCH_SIZE,
};
pub use error::{AIServiceError, ChunkingError, ProcessingError, VectorSearchError};
pub use extractor::{normalize_page_text, structured_document, StructuredDocument};
pub use ingest::{
    discover_pdf_files, DocumentPipeline, IngestionReport, PipelineOptions, SkippedPdf,
};
pub use llm::OpenAiCompatClient;
pub use models::{
    AnswerLanguage, AnswerSource, BoundingBox, Chunk, ChunkKind, ChunkStrategy, ChunkingOptions,
    DocumentFingerprint, DocumentMetadata, DocumentStats, EmbeddedChunk, Page, ProcessedDocument,
    RagAnswer, RetrievalResult,
};
pub use orchestrator::{QueryState, QuestionRequest, RagOptions, RagOrchestrator};
pub use parser::{
    DocumentParser, ExtractionEngine, ImageRef, PageDimensions, RemoteOcrConfig, TableRegion,
    DEFAULT_PAGE_LIMIT,
};
pub use stores::QdrantStore;
pub use traits::{LanguageModel, VectorIndex};
