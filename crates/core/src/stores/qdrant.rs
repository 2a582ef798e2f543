use crate::error::VectorSearchError;
use crate::models::{EmbeddedChunk, RetrievalResult};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Vector index backed by Qdrant's HTTP API. One collection per store, with
/// cosine distance so scores come back as similarities.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Creates the collection when missing; a dimension mismatch against an
    /// existing collection is a hard error.
    pub async fn ensure_collection(&self) -> Result<(), VectorSearchError> {
        url::Url::parse(&self.endpoint)?;

        let response = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, self.collection))
            .send()
            .await?;

        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            let existing = parsed
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64);
            if let Some(size) = existing {
                if size as usize != self.vector_size {
                    return Err(VectorSearchError::Request(format!(
                        "collection {} has vector size {}, expected {}",
                        self.collection, size, self.vector_size
                    )));
                }
            }
            return Ok(());
        }

        if response.status().as_u16() != 404 {
            return Err(VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert_chunks(
        &self,
        document_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), VectorSearchError> {
        let mut points = Vec::with_capacity(chunks.len());
        for embedded in chunks {
            if embedded.vector.len() != self.vector_size {
                return Err(VectorSearchError::Request(format!(
                    "embedding dimension {} != {}",
                    embedded.vector.len(),
                    self.vector_size
                )));
            }
            points.push(json!({
                "id": point_id(&embedded.chunk.chunk_id),
                "vector": embedded.vector,
                "payload": chunk_payload(document_id, embedded),
            }));
        }

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievalResult>, VectorSearchError> {
        if vector.len() != self.vector_size {
            return Err(VectorSearchError::Request(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }

        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(document_id) = document_id {
            body["filter"] = document_filter(document_id);
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits.iter().map(parse_hit).collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorSearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "filter": document_filter(document_id) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorSearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/count",
                self.endpoint, self.collection
            ))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| VectorSearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count missing from response".to_string(),
            })
    }
}

/// Deterministic UUID-shaped point id so re-ingesting the same content
/// overwrites instead of duplicating.
fn point_id(chunk_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!(
        "{}-{}-{}-{}-{}",
        &digest[0..8],
        &digest[8..12],
        &digest[12..16],
        &digest[16..20],
        &digest[20..32]
    )
}

fn document_filter(document_id: &str) -> Value {
    json!({
        "must": [
            { "key": "document_id", "match": { "value": document_id } }
        ]
    })
}

fn chunk_payload(document_id: &str, embedded: &EmbeddedChunk) -> Value {
    let chunk = &embedded.chunk;
    let page_numbers = chunk
        .page_numbers
        .iter()
        .map(|number| number.to_string())
        .collect::<Vec<_>>()
        .join(",");
    json!({
        "document_id": document_id,
        "chunk_id": chunk.chunk_id,
        "chunk_index": chunk.chunk_index,
        "text": chunk.text,
        "start_page": chunk.start_page,
        "end_page": chunk.end_page,
        "page_numbers": page_numbers,
        "kind": format!("{:?}", chunk.kind),
        "heading_number": chunk.heading_number,
        "heading_title": chunk.heading_title,
        "has_code": chunk.has_code,
        "code_block_count": chunk.code_block_count,
        "embedding_model_id": embedded.embedding_model_id,
    })
}

fn parse_hit(hit: &Value) -> RetrievalResult {
    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
    let text = hit
        .pointer("/payload/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let chunk_id = hit
        .pointer("/payload/chunk_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            hit.pointer("/id").map(|id| match id {
                Value::String(id) => id.clone(),
                other => other.to_string(),
            })
        })
        .unwrap_or_default();

    let mut metadata = BTreeMap::new();
    if let Some(payload) = hit.pointer("/payload").and_then(Value::as_object) {
        for (key, value) in payload {
            if key == "text" {
                continue;
            }
            let rendered = match value {
                Value::String(value) => value.clone(),
                Value::Number(value) => value.to_string(),
                Value::Bool(value) => value.to_string(),
                Value::Null => continue,
                other => other.to_string(),
            };
            metadata.insert(key.clone(), rendered);
        }
    }

    RetrievalResult {
        chunk_id,
        text,
        metadata,
        score,
    }
}
