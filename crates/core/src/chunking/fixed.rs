use super::is_sentence_terminator;
use crate::models::ChunkingOptions;

/// How far back from the raw boundary to look for a natural break.
const BREAK_LOOKBACK: usize = 100;

/// Sliding window of `chunk_size` characters with `chunk_overlap` characters
/// repeated between consecutive chunks. Returns byte spans into `text`.
pub(crate) fn chunk_fixed(text: &str, options: &ChunkingOptions) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    split_fixed(&chars, options.chunk_size, options.chunk_overlap)
        .into_iter()
        .map(|(start, end)| (byte_at(&chars, start, text.len()), byte_at(&chars, end, text.len())))
        .collect()
}

fn byte_at(chars: &[(usize, char)], index: usize, text_len: usize) -> usize {
    chars.get(index).map(|(byte, _)| *byte).unwrap_or(text_len)
}

/// Window splitting over char indexes. The final chunk may be shorter than
/// `chunk_size`; every span satisfies `end <= chars.len()`.
pub(crate) fn split_fixed(
    chars: &[(usize, char)],
    chunk_size: usize,
    overlap: usize,
) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let raw_end = (start + chunk_size).min(chars.len());
        let end = if raw_end < chars.len() {
            adjust_break(chars, start, raw_end)
        } else {
            raw_end
        };

        spans.push((start, end));
        if end >= chars.len() {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    spans
}

/// Searches backward up to `BREAK_LOOKBACK` characters from the raw boundary
/// for the best separator, in preference order: paragraph break, line break,
/// sentence terminator, space. Falls back to the raw boundary.
fn adjust_break(chars: &[(usize, char)], start: usize, raw_end: usize) -> usize {
    let floor = raw_end.saturating_sub(BREAK_LOOKBACK).max(start + 1);

    for index in (floor..raw_end).rev() {
        if chars[index].1 == '\n' && index > 0 && chars[index - 1].1 == '\n' {
            return index + 1;
        }
    }
    for index in (floor..raw_end).rev() {
        if chars[index].1 == '\n' {
            return index + 1;
        }
    }
    for index in (floor..raw_end).rev() {
        if is_sentence_terminator(chars[index].1) {
            return index + 1;
        }
    }
    for index in (floor..raw_end).rev() {
        if chars[index].1 == ' ' {
            return index + 1;
        }
    }

    raw_end
}
