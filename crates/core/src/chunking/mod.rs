pub mod fixed;
pub mod heading;
pub mod page_merge;
pub mod paragraph;
pub mod sentence;

use crate::error::ChunkingError;
use crate::models::{Chunk, ChunkKind, ChunkStrategy, ChunkingOptions, Page};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::debug;

/// Concatenated page text plus the byte ranges each page occupies, so chunk
/// spans can be mapped back to source page numbers.
pub(crate) struct DocumentText {
    pub text: String,
    pub ranges: Vec<PageRange>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PageRange {
    pub start: usize,
    pub end: usize,
    pub number: u32,
}

impl DocumentText {
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut text = String::new();
        let mut ranges = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                text.push_str("\n\n");
            }
            let start = text.len();
            text.push_str(&page.text);
            ranges.push(PageRange {
                start,
                end: text.len(),
                number: page.page_number,
            });
        }
        Self { text, ranges }
    }

    /// Pages whose text overlaps the byte span. A span that falls entirely
    /// inside a page separator is attributed to the nearest earlier page.
    pub fn pages_for(&self, start: usize, end: usize) -> (u32, u32, BTreeSet<u32>) {
        let mut numbers = BTreeSet::new();
        for range in &self.ranges {
            if range.start < end && start < range.end {
                numbers.insert(range.number);
            }
        }
        if numbers.is_empty() {
            let fallback = self
                .ranges
                .iter()
                .rev()
                .find(|range| range.start <= start)
                .or(self.ranges.first())
                .map(|range| range.number)
                .unwrap_or(1);
            numbers.insert(fallback);
        }
        let first = numbers.iter().next().copied().unwrap_or(1);
        let last = numbers.iter().next_back().copied().unwrap_or(first);
        (first, last, numbers)
    }
}

/// A chunk before materialization: a byte span over the concatenated text
/// plus whatever the strategy learned about it.
#[derive(Debug, Clone)]
pub(crate) struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub kind: ChunkKind,
    pub heading_number: Option<String>,
    pub heading_title: Option<String>,
    pub code_block_count: usize,
    pub has_code: bool,
}

impl ChunkSpan {
    pub fn text_span(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            kind: ChunkKind::Text,
            heading_number: None,
            heading_title: None,
            code_block_count: 0,
            has_code: false,
        }
    }
}

pub(crate) fn is_sentence_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '。' | '！' | '？' | '．')
}

fn validate(options: &ChunkingOptions) -> Result<(), ChunkingError> {
    if options.chunk_size == 0 {
        return Err(ChunkingError::InvalidConfig(
            "chunk_size must be positive".to_string(),
        ));
    }
    if options.chunk_overlap >= options.chunk_size {
        return Err(ChunkingError::InvalidConfig(format!(
            "chunk_overlap {} must be smaller than chunk_size {}",
            options.chunk_overlap, options.chunk_size
        )));
    }
    if options.sentences_per_chunk == 0 {
        return Err(ChunkingError::InvalidConfig(
            "sentences_per_chunk must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Chunks structured pages with the selected strategy. Re-running the same
/// strategy over the same pages yields a byte-identical sequence, which the
/// content cache relies on.
pub fn chunk_pages(
    document_id: &str,
    pages: &[Page],
    strategy: ChunkStrategy,
    options: &ChunkingOptions,
) -> Result<Vec<Chunk>, ChunkingError> {
    validate(options)?;

    let doc = DocumentText::from_pages(pages);
    if doc.text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let spans: Vec<ChunkSpan> = match strategy {
        ChunkStrategy::Fixed => plain(fixed::chunk_fixed(&doc.text, options)),
        ChunkStrategy::Paragraph => plain(paragraph::chunk_paragraphs(&doc.text, options)),
        ChunkStrategy::Sentence => plain(sentence::chunk_sentences(
            &doc.text,
            options.sentences_per_chunk,
        )),
        ChunkStrategy::PageMerge => plain(page_merge::chunk_page_merge(&doc, options.min_page_chars)),
        ChunkStrategy::Chapter => {
            let spans = heading::chunk_chapters(&doc.text, options)?;
            if spans.is_empty() {
                // heading-based chunking must never return zero chunks for a
                // non-empty document
                debug!(document_id, "no usable headings, falling back to fixed-size");
                plain(fixed::chunk_fixed(&doc.text, options))
            } else {
                spans
            }
        }
        ChunkStrategy::Hybrid => plain(hybrid_spans(&doc.text, options)),
    };

    let chunks = materialize(document_id, strategy, &doc, spans);
    if chunks.is_empty() {
        return Err(ChunkingError::EmptyOutput {
            strategy: strategy.name().to_string(),
        });
    }
    Ok(chunks)
}

fn plain(spans: Vec<(usize, usize)>) -> Vec<ChunkSpan> {
    spans
        .into_iter()
        .map(|(start, end)| ChunkSpan::text_span(start, end))
        .collect()
}

/// Paragraph pass, then any chunk over 1.5x the target size is re-split with
/// the fixed-size window. Indexes are renumbered by materialization.
fn hybrid_spans(text: &str, options: &ChunkingOptions) -> Vec<(usize, usize)> {
    let limit = options.chunk_size + options.chunk_size / 2;
    let mut out = Vec::new();
    for (start, end) in paragraph::chunk_paragraphs(text, options) {
        let segment = &text[start..end];
        if segment.chars().count() > limit {
            for (sub_start, sub_end) in fixed::chunk_fixed(segment, options) {
                out.push((start + sub_start, start + sub_end));
            }
        } else {
            out.push((start, end));
        }
    }
    out
}

fn materialize(
    document_id: &str,
    strategy: ChunkStrategy,
    doc: &DocumentText,
    spans: Vec<ChunkSpan>,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for span in spans {
        let raw = &doc.text[span.start..span.end];
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }
        let chunk_index = chunks.len();
        let (start_page, end_page, page_numbers) = doc.pages_for(span.start, span.end);
        chunks.push(Chunk {
            chunk_id: make_chunk_id(document_id, strategy.name(), chunk_index, text),
            chunk_index,
            text: text.to_string(),
            char_count: text.chars().count(),
            word_count: text.split_whitespace().count(),
            start_page,
            end_page,
            page_numbers,
            kind: span.kind,
            heading_number: span.heading_number,
            heading_title: span.heading_title,
            code_block_count: span.code_block_count,
            has_code: span.has_code,
            bounding_boxes: None,
            metadata: Default::default(),
        });
    }
    chunks
}

pub(crate) fn make_chunk_id(
    document_id: &str,
    strategy: &str,
    index: usize,
    text: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(strategy.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
pub(crate) fn page(number: u32, text: &str) -> Page {
    Page {
        page_number: number,
        page_index: number as usize - 1,
        text: text.to_string(),
        char_count: text.chars().count(),
        word_count: text.split_whitespace().count(),
        width: 612.0,
        height: 792.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_is_contiguous_from_zero() {
        let pages = vec![
            page(1, "First page with a reasonable amount of text in it."),
            page(2, "Second page, also with text.\n\nAnd a second paragraph here."),
        ];
        let options = ChunkingOptions {
            chunk_size: 40,
            chunk_overlap: 8,
            min_chunk_size: 5,
            ..Default::default()
        };

        let chunks =
            chunk_pages("doc", &pages, ChunkStrategy::Fixed, &options).expect("chunking works");
        assert!(!chunks.is_empty());
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, expected);
        }
    }

    #[test]
    fn same_input_same_strategy_is_idempotent() {
        let pages = vec![page(1, "Alpha beta gamma.\n\nDelta epsilon zeta eta theta.")];
        let options = ChunkingOptions {
            chunk_size: 30,
            chunk_overlap: 5,
            min_chunk_size: 5,
            ..Default::default()
        };

        let first =
            chunk_pages("doc", &pages, ChunkStrategy::Paragraph, &options).expect("chunking works");
        let second =
            chunk_pages("doc", &pages, ChunkStrategy::Paragraph, &options).expect("chunking works");
        assert_eq!(first, second);
    }

    #[test]
    fn empty_pages_produce_no_chunks() {
        let chunks = chunk_pages("doc", &[], ChunkStrategy::Fixed, &ChunkingOptions::default())
            .expect("empty input is fine");
        assert!(chunks.is_empty());
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let options = ChunkingOptions {
            chunk_size: 10,
            chunk_overlap: 10,
            ..Default::default()
        };
        let result = chunk_pages("doc", &[page(1, "text")], ChunkStrategy::Fixed, &options);
        assert!(matches!(result, Err(ChunkingError::InvalidConfig(_))));
    }

    #[test]
    fn spans_map_back_to_their_pages() {
        let pages = vec![page(1, "page one text"), page(2, "page two text")];
        let doc = DocumentText::from_pages(&pages);

        let (start, end, numbers) = doc.pages_for(0, 5);
        assert_eq!((start, end), (1, 1));
        assert_eq!(numbers.len(), 1);

        let whole = doc.text.len();
        let (start, end, numbers) = doc.pages_for(0, whole);
        assert_eq!((start, end), (1, 2));
        assert_eq!(numbers.len(), 2);
    }

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let a = make_chunk_id("doc", "fixed", 0, "same text");
        let b = make_chunk_id("doc", "fixed", 0, "same text");
        let c = make_chunk_id("doc", "fixed", 1, "same text");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn chapter_strategy_splits_on_detected_headings() {
        let text = "Chapter 1 Intro\n\nHello world.\n\nChapter 2 Details\n\nMore text.";
        let chunks = chunk_pages(
            "doc",
            &[page(1, text)],
            ChunkStrategy::Chapter,
            &ChunkingOptions::default(),
        )
        .expect("chunking works");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading_title.as_deref(), Some("Intro"));
        assert_eq!(chunks[1].heading_title.as_deref(), Some("Details"));
        assert!(chunks[0].text.starts_with("Chapter 1 Intro"));
        assert!(chunks[1].text.starts_with("Chapter 2 Details"));
        assert_eq!(chunks[0].kind, ChunkKind::Chapter);
    }

    #[test]
    fn chapter_strategy_falls_back_to_fixed_for_headless_documents() {
        let text = "plain prose with no heading markers whatsoever, but still plenty of text to chunk";
        let chunks = chunk_pages(
            "doc",
            &[page(1, text)],
            ChunkStrategy::Chapter,
            &ChunkingOptions::default(),
        )
        .expect("chunking works");

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|chunk| chunk.kind == ChunkKind::Text));
    }

    #[test]
    fn hybrid_resplits_oversize_paragraph_chunks() {
        let long = "x".repeat(400);
        let text = format!("Short lead paragraph.\n\n{long}");
        let options = ChunkingOptions {
            chunk_size: 100,
            chunk_overlap: 10,
            min_chunk_size: 5,
            ..Default::default()
        };

        let pages = vec![page(1, &text)];
        let chunks =
            chunk_pages("doc", &pages, ChunkStrategy::Hybrid, &options).expect("chunking works");
        assert!(chunks.len() > 2);
        let limit = options.chunk_size + options.chunk_size / 2;
        for chunk in &chunks {
            assert!(chunk.char_count <= limit);
        }
    }
}
