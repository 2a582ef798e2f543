use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted pdf: {0}")]
    Corrupted(String),

    #[error("pdf is password protected: {0}")]
    PasswordProtected(String),

    #[error("page limit exceeded: document has {pages} pages, limit is {limit}")]
    PageLimitExceeded { pages: usize, limit: usize },

    #[error("page {page_index} failed: {details}")]
    Page { page_index: usize, details: String },

    #[error("remote extraction failed: {0}")]
    RemoteExtraction(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Ai(#[from] AIServiceError),

    #[error(transparent)]
    Vector(#[from] VectorSearchError),
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("strategy {strategy} produced no chunks for non-empty input")]
    EmptyOutput { strategy: String },

    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("llm request failed: {0}")]
    Llm(String),

    #[error("embedding dimension {got} does not match expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    InvalidResponse { backend: String, details: String },

    #[error("ai call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum VectorSearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector search request failed: {0}")]
    Request(String),

    #[error("vector store not available yet: {0}")]
    NotReady(String),
}

pub type Result<T, E = ProcessingError> = std::result::Result<T, E>;
