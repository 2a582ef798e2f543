use crate::error::AIServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Allowed drift from unit length before similarity falls back to a full
/// cosine computation instead of a plain dot product.
const NORM_TOLERANCE: f32 = 1e-3;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AIServiceError>;

    /// Embeds texts in order: output index `i` always corresponds to input
    /// index `i`, regardless of internal batching.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AIServiceError>;
}

/// Embedding client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            dimensions,
            batch_size: DEFAULT_BATCH_SIZE,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request_batch(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>, AIServiceError> {
        let expected = inputs.len();
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let mut request = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AIServiceError::Embedding(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        vectors_from_rows(parsed.data, expected, self.dimensions)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AIServiceError> {
        let batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| AIServiceError::Embedding("empty embedding batch".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AIServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let mut embedded = self.request_batch(placeholder_inputs(batch)).await?;
            for (offset, text) in batch.iter().enumerate() {
                if text.trim().is_empty() {
                    embedded[offset] = vec![0.0; self.dimensions];
                } else {
                    l2_normalize(&mut embedded[offset]);
                }
            }
            vectors.extend(embedded);
        }

        debug!(count = vectors.len(), model = %self.model, "embedded batch");
        Ok(vectors)
    }
}

/// The model call must not see empty input; blanks get a single-space
/// placeholder and their vectors are zeroed after the call, since a
/// placeholder's embedding would be arbitrary and misleading.
fn placeholder_inputs(batch: &[String]) -> Vec<&str> {
    batch
        .iter()
        .map(|text| if text.trim().is_empty() { " " } else { text.as_str() })
        .collect()
}

/// Normalizes server rows into plain vectors: explicit ordering by the
/// server-reported index, one vector per input, fixed dimension.
fn vectors_from_rows(
    mut rows: Vec<EmbeddingRow>,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, AIServiceError> {
    rows.sort_by_key(|row| row.index);
    if rows.len() != expected {
        return Err(AIServiceError::InvalidResponse {
            backend: "embeddings".to_string(),
            details: format!("expected {} vectors, got {}", expected, rows.len()),
        });
    }
    for row in &rows {
        if row.embedding.len() != dimensions {
            return Err(AIServiceError::DimensionMismatch {
                expected: dimensions,
                got: row.embedding.len(),
            });
        }
    }
    Ok(rows.into_iter().map(|row| row.embedding).collect())
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Cosine similarity. Stored vectors are expected to be pre-normalized; the
/// norm is still checked so a swapped embedding model cannot silently skew
/// scores.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    if (norm_a - 1.0).abs() > NORM_TOLERANCE || (norm_b - 1.0).abs() > NORM_TOLERANCE {
        return dot / (norm_a * norm_b);
    }
    dot
}

pub fn similarity_scores(query: &[f32], documents: &[Vec<f32>]) -> Vec<f32> {
    documents
        .iter()
        .map(|document| cosine_similarity(query, document))
        .collect()
}

fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_produces_unit_vectors() {
        let mut vector = vec![3.0, 4.0];
        l2_normalize(&mut vector);
        assert!((magnitude(&vector) - 1.0).abs() < 1e-6);
        assert!((vector[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut vector = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut vector);
        assert_eq!(vector, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let mut a = vec![1.0, 2.0, 2.0];
        l2_normalize(&mut a);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unnormalized_vectors_are_renormalized_at_query_time() {
        let a = vec![3.0, 0.0];
        let b = vec![0.0, 5.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);

        let c = vec![10.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_or_mismatched_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn rows_are_reordered_by_server_index() {
        let rows = vec![
            EmbeddingRow {
                index: 1,
                embedding: vec![0.0, 1.0],
            },
            EmbeddingRow {
                index: 0,
                embedding: vec![1.0, 0.0],
            },
        ];
        let vectors = vectors_from_rows(rows, 2, 2).expect("rows are valid");
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn missing_rows_are_an_invalid_response() {
        let rows = vec![EmbeddingRow {
            index: 0,
            embedding: vec![1.0, 0.0],
        }];
        let result = vectors_from_rows(rows, 2, 2);
        assert!(matches!(result, Err(AIServiceError::InvalidResponse { .. })));
    }

    #[test]
    fn wrong_dimension_is_fatal() {
        let rows = vec![EmbeddingRow {
            index: 0,
            embedding: vec![1.0, 0.0, 0.0],
        }];
        let result = vectors_from_rows(rows, 1, 2);
        assert!(matches!(
            result,
            Err(AIServiceError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn blank_inputs_are_replaced_by_a_placeholder() {
        let texts = vec![
            "real content".to_string(),
            "   ".to_string(),
            "\n\t".to_string(),
        ];
        assert_eq!(placeholder_inputs(&texts), vec!["real content", " ", " "]);
    }

    #[test]
    fn similarity_scores_follow_document_order() {
        let query = vec![1.0, 0.0];
        let documents = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let scores = similarity_scores(&query, &documents);
        assert!(scores[0] > scores[1]);
    }
}
