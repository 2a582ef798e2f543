use super::is_sentence_terminator;

/// Byte spans of sentences, split after CJK/Latin terminators. This is a
/// heuristic: abbreviations and decimals mis-split and that is accepted.
pub(crate) fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;

    for (index, ch) in text.char_indices() {
        if is_sentence_terminator(ch) {
            let end = index + ch.len_utf8();
            if !text[start..end].trim().is_empty() {
                spans.push((start, end));
            }
            start = end;
        }
    }
    if start < text.len() && !text[start..].trim().is_empty() {
        spans.push((start, text.len()));
    }

    spans
}

/// Groups a fixed number of consecutive sentences per chunk.
pub(crate) fn chunk_sentences(text: &str, sentences_per_chunk: usize) -> Vec<(usize, usize)> {
    let sentences = sentence_spans(text);
    let per_chunk = sentences_per_chunk.max(1);

    sentences
        .chunks(per_chunk)
        .map(|group| (group[0].0, group[group.len() - 1].1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_latin_terminators() {
        let text = "First one. Second one! Third one? Trailing fragment";
        let spans = sentence_spans(text);
        let texts: Vec<&str> = spans
            .iter()
            .map(|(start, end)| text[*start..*end].trim())
            .collect();
        assert_eq!(
            texts,
            vec!["First one.", "Second one!", "Third one?", "Trailing fragment"]
        );
    }

    #[test]
    fn sentences_split_on_cjk_terminators() {
        let text = "第一句话。第二句话！第三句话？";
        let spans = sentence_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].0..spans[0].1], "第一句话。");
    }

    #[test]
    fn grouping_packs_n_sentences_per_chunk() {
        let text = "a. b. c. d. e.";
        let spans = chunk_sentences(text, 2);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].0..spans[0].1], "a. b.");
        assert_eq!(&text[spans[2].0..spans[2].1], " e.");
    }

    #[test]
    fn whitespace_only_input_has_no_sentences() {
        assert!(sentence_spans("   \n  ").is_empty());
        assert!(chunk_sentences("   ", 3).is_empty());
    }
}
