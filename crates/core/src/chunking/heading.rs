use super::ChunkSpan;
use crate::error::ChunkingError;
use crate::models::{ChunkKind, ChunkingOptions};
use regex::Regex;

/// Headings closer than this to an already-accepted heading from a different
/// pattern family are treated as the same line matching twice.
const DEDUP_WINDOW_CHARS: usize = 50;

/// Chunks shorter than this are assumed to be false-positive heading hits.
const MIN_HEADING_CHUNK_CHARS: usize = 20;

#[derive(Debug, Clone)]
pub(crate) struct HeadingMatch {
    pub kind: ChunkKind,
    pub level: u8,
    pub number: String,
    pub title: String,
    pub byte_offset: usize,
    pub char_offset: usize,
    family: usize,
}

struct HeadingFamily {
    pattern: Regex,
    kind: ChunkKind,
    /// Fixed level, or derived from the enumeration depth when `None`.
    level: Option<u8>,
}

fn heading_families() -> Result<Vec<HeadingFamily>, ChunkingError> {
    Ok(vec![
        HeadingFamily {
            pattern: Regex::new(
                r"(?m)^[ \t]*(?:Chapter|CHAPTER)\s+(\d+|[IVXLCM]+)\s*[:.\-]?\s*(\S.*)?$",
            )?,
            kind: ChunkKind::Chapter,
            level: Some(1),
        },
        HeadingFamily {
            pattern: Regex::new(
                r"(?m)^[ \t]*第\s*([0-9零一二三四五六七八九十百千两]+)\s*章\s*[:：.\-]?\s*(\S.*)?$",
            )?,
            kind: ChunkKind::Chapter,
            level: Some(1),
        },
        // "3. Title Case" style numeral chapters; the leading-capital guard
        // keeps most numbered list items out
        HeadingFamily {
            pattern: Regex::new(r"(?m)^[ \t]*(\d{1,2})[.、][ \t]+([A-Z一-鿿][^\n]{0,80})$")?,
            kind: ChunkKind::Chapter,
            level: Some(1),
        },
        HeadingFamily {
            pattern: Regex::new(r"(?m)^[ \t]*(\d+(?:\.\d+){1,2})\.?[ \t]+(\S.*)$")?,
            kind: ChunkKind::Section,
            level: None,
        },
        HeadingFamily {
            pattern: Regex::new(
                r"(?m)^[ \t]*第\s*([0-9零一二三四五六七八九十百千两]+)\s*节\s*[:：]?\s*(\S.*)?$",
            )?,
            kind: ChunkKind::Section,
            level: Some(2),
        },
        HeadingFamily {
            pattern: Regex::new(r"(?m)^[ \t]*\(([a-zA-Z])\)[ \t]+(\S.*)$")?,
            kind: ChunkKind::Section,
            level: Some(3),
        },
    ])
}

/// Best-effort heading detection: an ordered list of pattern families with a
/// post-hoc merge pass. Numbered lists that look like section headers will
/// sometimes slip through; the minimum-length discard catches most of them.
pub(crate) fn detect_headings(text: &str) -> Result<Vec<HeadingMatch>, ChunkingError> {
    let families = heading_families()?;
    let mut candidates = Vec::new();

    for (family_index, family) in families.iter().enumerate() {
        for captures in family.pattern.captures_iter(text) {
            let whole = match captures.get(0) {
                Some(whole) => whole,
                None => continue,
            };
            let number = captures
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            let title = captures
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            let level = family
                .level
                .unwrap_or_else(|| enumeration_level(&number));

            candidates.push(HeadingMatch {
                kind: family.kind,
                level,
                number,
                title,
                byte_offset: whole.start(),
                char_offset: 0,
                family: family_index,
            });
        }
    }

    assign_char_offsets(text, &mut candidates);

    // a line can match more than one family; the earlier family wins
    let mut accepted: Vec<HeadingMatch> = Vec::new();
    for candidate in candidates {
        let duplicate = accepted.iter().any(|existing| {
            existing.family != candidate.family
                && existing.char_offset.abs_diff(candidate.char_offset) < DEDUP_WINDOW_CHARS
        });
        if !duplicate {
            accepted.push(candidate);
        }
    }

    accepted.sort_by_key(|heading| heading.byte_offset);
    Ok(accepted)
}

fn enumeration_level(number: &str) -> u8 {
    match number.matches('.').count() {
        0 => 1,
        1 => 2,
        _ => 3,
    }
}

fn assign_char_offsets(text: &str, matches: &mut [HeadingMatch]) {
    let mut order: Vec<usize> = (0..matches.len()).collect();
    order.sort_by_key(|&index| matches[index].byte_offset);

    let mut chars = text.char_indices().enumerate();
    let mut current = chars.next();
    let mut total = 0usize;

    for &index in &order {
        let target = matches[index].byte_offset;
        loop {
            match current {
                Some((char_index, (byte_index, _))) => {
                    total = char_index + 1;
                    if byte_index >= target {
                        matches[index].char_offset = char_index;
                        break;
                    }
                    current = chars.next();
                }
                None => {
                    matches[index].char_offset = total;
                    break;
                }
            }
        }
    }
}

pub(crate) struct CodeScan {
    pub blocks: usize,
    pub has_code: bool,
}

pub(crate) struct CodePatterns {
    keyword_brace: Regex,
    shell_prompt: Regex,
}

impl CodePatterns {
    pub fn new() -> Result<Self, ChunkingError> {
        Ok(Self {
            keyword_brace: Regex::new(
                r"(?m)\b(?:fn|def|function|class|impl|struct|enum|interface|void|#include)\b[^\n]*[{(]",
            )?,
            shell_prompt: Regex::new(
                r"(?m)^[ \t]*(?:\$|>>>|#)[ \t]+(?:cd|ls|git|cargo|npm|pip|pip3|python|python3|make|curl|wget|docker|sudo|apt|brew)\b",
            )?,
        })
    }

    pub fn scan(&self, text: &str) -> CodeScan {
        let fenced = text.matches("```").count() / 2;
        let keyword = self.keyword_brace.find_iter(text).count();
        let shell = self.shell_prompt.find_iter(text).count();
        let indented = indented_runs(text);
        let blocks = fenced + keyword + shell + indented;
        CodeScan {
            blocks,
            has_code: blocks > 0,
        }
    }
}

/// Runs of three or more consecutive lines indented by four spaces or a tab.
fn indented_runs(text: &str) -> usize {
    let mut runs = 0usize;
    let mut current = 0usize;
    for line in text.lines() {
        let indented =
            (line.starts_with("    ") || line.starts_with('\t')) && !line.trim().is_empty();
        if indented {
            current += 1;
            if current == 3 {
                runs += 1;
            }
        } else {
            current = 0;
        }
    }
    runs
}

/// Heading-aware chunking. Each heading owns the text up to the next heading
/// of the same or higher level; spans below the minimum length are treated
/// as false positives and dropped. Returns an empty vector when no headings
/// are detected so the caller can fall back to fixed-size chunking.
pub(crate) fn chunk_chapters(
    text: &str,
    _options: &ChunkingOptions,
) -> Result<Vec<ChunkSpan>, ChunkingError> {
    let headings = detect_headings(text)?;
    if headings.is_empty() {
        return Ok(Vec::new());
    }

    let code = CodePatterns::new()?;
    let mut spans = Vec::new();

    for (index, heading) in headings.iter().enumerate() {
        let end = headings[index + 1..]
            .iter()
            .find(|next| next.level <= heading.level)
            .map(|next| next.byte_offset)
            .unwrap_or(text.len());
        let slice = &text[heading.byte_offset..end];
        if slice.chars().count() < MIN_HEADING_CHUNK_CHARS {
            continue;
        }

        let scan = code.scan(slice);
        spans.push(ChunkSpan {
            start: heading.byte_offset,
            end,
            kind: if scan.has_code {
                ChunkKind::Code
            } else {
                heading.kind
            },
            heading_number: Some(heading.number.clone()),
            heading_title: if heading.title.is_empty() {
                None
            } else {
                Some(heading.title.clone())
            },
            code_block_count: scan.blocks,
            has_code: scan.has_code,
        });
    }

    Ok(spans)
}
