use crate::models::ChunkingOptions;
use tracing::debug;

/// Byte spans of blank-line-delimited paragraphs, skipping whitespace-only
/// segments.
pub(crate) fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;

    for (index, _) in text.match_indices("\n\n") {
        let segment = &text[start..index];
        if !segment.trim().is_empty() {
            spans.push((start, index));
        }
        start = index + 2;
    }
    if start <= text.len() {
        let segment = &text[start..];
        if !segment.trim().is_empty() {
            spans.push((start, text.len()));
        }
    }

    spans
}

/// Greedily packs paragraphs into chunks of at most `chunk_size` characters.
/// Chunks below `min_chunk_size` are dropped, or folded into the previous
/// chunk when `keep_short_tail` is set.
pub(crate) fn chunk_paragraphs(text: &str, options: &ChunkingOptions) -> Vec<(usize, usize)> {
    let paragraphs = paragraph_spans(text);

    let mut packed: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize, usize)> = None; // (start, end, char_len)

    for (para_start, para_end) in paragraphs {
        match current {
            None => {
                let len = text[para_start..para_end].chars().count();
                current = Some((para_start, para_end, len));
            }
            Some((start, end, len)) => {
                let grown = len + text[end..para_end].chars().count();
                if grown <= options.chunk_size {
                    current = Some((start, para_end, grown));
                } else {
                    packed.push((start, end));
                    let len = text[para_start..para_end].chars().count();
                    current = Some((para_start, para_end, len));
                }
            }
        }
    }
    if let Some((start, end, _)) = current {
        packed.push((start, end));
    }

    let mut kept: Vec<(usize, usize)> = Vec::new();
    for (start, end) in packed {
        let len = text[start..end].chars().count();
        if len >= options.min_chunk_size {
            kept.push((start, end));
        } else if options.keep_short_tail {
            match kept.last_mut() {
                Some(previous) => previous.1 = end,
                None => kept.push((start, end)),
            }
        } else {
            debug!(chars = len, "dropping paragraph fragment below minimum size");
        }
    }

    // non-empty input must still yield a chunk even if every pack fell below
    // the minimum
    if kept.is_empty() && !text.trim().is_empty() {
        kept.push((0, text.len()));
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(chunk_size: usize, min: usize) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size,
            chunk_overlap: 0,
            min_chunk_size: min,
            ..Default::default()
        }
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "first para\n\nsecond para\n\n\nthird";
        let spans = paragraph_spans(text);
        let texts: Vec<&str> = spans
            .iter()
            .map(|(start, end)| text[*start..*end].trim())
            .collect();
        assert_eq!(texts, vec!["first para", "second para", "third"]);
    }

    #[test]
    fn small_paragraphs_pack_into_one_chunk() {
        let text = "aaa\n\nbbb\n\nccc";
        let spans = chunk_paragraphs(text, &options(100, 1));
        assert_eq!(spans, vec![(0, text.len())]);
    }

    #[test]
    fn packing_respects_chunk_size() {
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let spans = chunk_paragraphs(text, &options(25, 1));
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].0..spans[0].1], "aaaaaaaaaa\n\nbbbbbbbbbb");
        assert_eq!(&text[spans[1].0..spans[1].1], "cccccccccc");
    }

    #[test]
    fn short_tail_is_dropped_by_default() {
        let text = "a paragraph that is long enough to keep around\n\ntiny";
        let spans = chunk_paragraphs(text, &options(46, 10));
        assert_eq!(spans.len(), 1);
        assert!(!text[spans[0].0..spans[0].1].contains("tiny"));
    }

    #[test]
    fn short_tail_can_be_folded_into_previous_chunk() {
        let text = "a paragraph that is long enough to keep around\n\ntiny";
        let mut opts = options(46, 10);
        opts.keep_short_tail = true;

        let spans = chunk_paragraphs(text, &opts);
        assert_eq!(spans.len(), 1);
        assert!(text[spans[0].0..spans[0].1].contains("tiny"));
    }

    #[test]
    fn all_below_minimum_still_yields_one_chunk() {
        let text = "tiny";
        let spans = chunk_paragraphs(text, &options(100, 50));
        assert_eq!(spans, vec![(0, 4)]);
    }

    #[test]
    fn chunk_concatenation_covers_the_whole_text() {
        let text = "one paragraph here\n\nanother paragraph there\n\na third one follows\n\nand a fourth to finish";
        let spans = chunk_paragraphs(text, &options(40, 1));

        let rebuilt: String = spans
            .iter()
            .map(|(start, end)| text[*start..*end].trim())
            .collect::<Vec<_>>()
            .join(" ");
        let original: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(rebuilt, original);
    }
}
