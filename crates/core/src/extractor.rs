use crate::cache::{ArtifactKind, ContentCache};
use crate::error::ProcessingError;
use crate::models::{DocumentStats, Page};
use crate::parser::{DocumentParser, ExtractionEngine, PageDimensions, RemoteOcrConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub pages: Vec<Page>,
    pub stats: DocumentStats,
}

/// Cleans one page of raw extractor output: unified line endings, no control
/// characters, no trailing whitespace, at most two consecutive blank lines.
pub fn normalize_page_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned: String = unified
        .chars()
        .filter(|ch| !ch.is_control() || *ch == '\n' || *ch == '\t')
        .collect();
    let trimmed = cleaned
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    collapse_blank_lines(&trimmed)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 3 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

/// Builds the cleaned per-page representation. Pages that are whitespace-only
/// after cleaning are excluded from the sequence but still counted in the
/// document-level stats.
pub fn structure_pages(
    raw: &BTreeMap<usize, String>,
    dimensions: &[PageDimensions],
) -> StructuredDocument {
    let mut pages = Vec::new();
    let mut stats = DocumentStats {
        page_count: raw.len(),
        ..Default::default()
    };

    for (&page_index, text) in raw {
        let cleaned = normalize_page_text(text);
        let char_count = cleaned.chars().count();
        let word_count = cleaned.split_whitespace().count();
        stats.total_chars += char_count;
        stats.total_words += word_count;

        if cleaned.trim().is_empty() {
            stats.skipped_pages += 1;
            continue;
        }

        let (width, height) = dimensions
            .get(page_index)
            .map(|dim| (dim.width, dim.height))
            .unwrap_or((0.0, 0.0));

        pages.push(Page {
            page_number: page_index as u32 + 1,
            page_index,
            text: cleaned,
            char_count,
            word_count,
            width,
            height,
        });
    }

    StructuredDocument { pages, stats }
}

/// Cache-backed structured extraction. Parsing runs on the blocking pool and
/// is bounded by `timeout` when given; a timed-out parse writes nothing to
/// the cache.
#[allow(clippy::too_many_arguments)]
pub async fn structured_document(
    cache: &ContentCache,
    path: &Path,
    hash: &str,
    engine: ExtractionEngine,
    fallback: Option<ExtractionEngine>,
    remote_ocr: Option<RemoteOcrConfig>,
    page_limit: usize,
    timeout: Option<Duration>,
) -> Result<StructuredDocument, ProcessingError> {
    if let Some(cached) =
        cache.get::<StructuredDocument>(hash, ArtifactKind::StructuredText, None)
    {
        debug!(hash, "structured text served from cache");
        return Ok(cached);
    }

    let path_owned = path.to_path_buf();
    let task = tokio::task::spawn_blocking(move || {
        let parser = DocumentParser::open_with_limit(&path_owned, page_limit, remote_ocr)?;
        let texts = match fallback {
            Some(alternate) if alternate != engine => {
                parser.text_with_fallback(engine, alternate)?
            }
            _ => parser.text(engine, None)?,
        };
        Ok::<_, ProcessingError>((texts, parser.page_dimensions()))
    });

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| ProcessingError::Timeout(limit))?,
        None => task.await,
    };
    let (texts, dimensions) =
        joined.map_err(|error| ProcessingError::Io(std::io::Error::other(error)))??;

    let structured = structure_pages(&texts, &dimensions);
    cache.put(hash, ArtifactKind::StructuredText, None, &structured);
    Ok(structured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_unifies_endings_and_strips_noise() {
        let input = "line one  \r\nline\u{0007} two\t\r\rthree   ";
        let normalized = normalize_page_text(input);
        assert_eq!(normalized, "line one\nline two\n\nthree");
    }

    #[test]
    fn three_or_more_blank_lines_collapse_to_two() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(normalize_page_text(input), "a\n\n\nb");

        // two blank lines are left alone
        let input = "a\n\n\nb";
        assert_eq!(normalize_page_text(input), "a\n\n\nb");
    }

    #[test]
    fn whitespace_only_page_is_excluded_but_counted() {
        let mut raw = BTreeMap::new();
        raw.insert(0usize, "Real content here".to_string());
        raw.insert(1usize, "   \n\t  \n".to_string());
        raw.insert(2usize, "More content".to_string());

        let structured = structure_pages(&raw, &[]);

        assert_eq!(structured.pages.len(), 2);
        assert_eq!(structured.stats.page_count, 3);
        assert_eq!(structured.stats.skipped_pages, 1);
        // the blank page still contributes its post-cleaning characters
        assert!(structured.stats.total_chars > "Real content hereMore content".len());
        assert_eq!(structured.pages[0].page_number, 1);
        assert_eq!(structured.pages[1].page_number, 3);
    }

    #[test]
    fn pages_are_ordered_by_index() {
        let mut raw = BTreeMap::new();
        raw.insert(2usize, "third".to_string());
        raw.insert(0usize, "first".to_string());
        raw.insert(1usize, "second".to_string());

        let structured = structure_pages(&raw, &[]);
        let indexes: Vec<usize> = structured.pages.iter().map(|page| page.page_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn word_and_char_counts_reflect_cleaned_text() {
        let mut raw = BTreeMap::new();
        raw.insert(0usize, "alpha beta   \r\ngamma".to_string());

        let structured = structure_pages(&raw, &[]);
        let page = &structured.pages[0];
        assert_eq!(page.word_count, 3);
        assert_eq!(page.char_count, page.text.chars().count());
    }
}
