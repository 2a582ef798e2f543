use crate::error::{AIServiceError, VectorSearchError};
use crate::models::{EmbeddedChunk, RetrievalResult};
use async_trait::async_trait;

/// Boundary to the external vector store. Implementations must surface
/// backend unavailability as a `VectorSearchError`; callers degrade instead
/// of crashing the query flow.
#[async_trait]
pub trait VectorIndex {
    async fn upsert_chunks(
        &self,
        document_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), VectorSearchError>;

    /// Nearest neighbors ordered by descending similarity, optionally scoped
    /// to one document.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievalResult>, VectorSearchError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorSearchError>;

    async fn count(&self) -> Result<u64, VectorSearchError>;
}

/// Boundary to the external LLM service. One stateless call per prompt.
#[async_trait]
pub trait LanguageModel {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AIServiceError>;
}
