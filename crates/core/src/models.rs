use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_title: String,
    pub source_path: String,
    pub content_hash: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// 1-based page number as printed in readers.
    pub page_number: u32,
    /// 0-based position in the parse order.
    pub page_index: usize,
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkKind {
    Text,
    Chapter,
    Section,
    Code,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub page_number: u32,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub start_page: u32,
    pub end_page: u32,
    pub page_numbers: BTreeSet<u32>,
    pub kind: ChunkKind,
    pub heading_number: Option<String>,
    pub heading_title: Option<String>,
    pub code_block_count: usize,
    pub has_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub embedding_model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSource {
    pub chunk_id: String,
    pub content_snippet: String,
    pub page: Option<u32>,
    pub similarity: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer_text: String,
    pub sources: Vec<AnswerSource>,
    pub question: String,
    pub processing_time: std::time::Duration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnswerLanguage {
    English,
    Chinese,
}

impl FromStr for AnswerLanguage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "zh" | "zh-cn" | "chinese" => Ok(Self::Chinese),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChunkStrategy {
    Fixed,
    Paragraph,
    Sentence,
    PageMerge,
    Chapter,
    Hybrid,
}

impl ChunkStrategy {
    /// Stable name used in cache keys; renaming invalidates cached chunk sets.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
            Self::PageMerge => "page_merge",
            Self::Chapter => "chapter",
            Self::Hybrid => "hybrid",
        }
    }
}

impl FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "paragraph" => Ok(Self::Paragraph),
            "sentence" => Ok(Self::Sentence),
            "page_merge" | "page-merge" => Ok(Self::PageMerge),
            "chapter" | "heading" => Ok(Self::Chapter),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown chunking strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub sentences_per_chunk: usize,
    pub min_page_chars: usize,
    /// When true, paragraph tails below `min_chunk_size` are folded into the
    /// previous chunk instead of being dropped.
    pub keep_short_tail: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            min_chunk_size: 100,
            sentences_per_chunk: 5,
            min_page_chars: 200,
            keep_short_tail: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentStats {
    pub page_count: usize,
    pub skipped_pages: usize,
    pub total_chars: usize,
    pub total_words: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<Chunk>,
    pub cache_hit: bool,
    pub embedded_count: usize,
}
