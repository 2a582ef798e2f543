use super::DocumentText;

/// One candidate chunk per page; pages below `min_page_chars` are merged
/// forward with subsequent pages until the accumulated text meets the
/// minimum. The trailing accumulation is emitted even when short.
pub(crate) fn chunk_page_merge(doc: &DocumentText, min_page_chars: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;

    for range in &doc.ranges {
        let start = open.unwrap_or(range.start);
        let accumulated = doc.text[start..range.end].chars().count();
        if accumulated >= min_page_chars {
            spans.push((start, range.end));
            open = None;
        } else {
            open = Some(start);
        }
    }

    if let Some(start) = open {
        if let Some(last) = doc.ranges.last() {
            spans.push((start, last.end));
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::super::page;
    use super::*;

    #[test]
    fn long_pages_stand_alone() {
        let pages = vec![
            page(1, &"a".repeat(50)),
            page(2, &"b".repeat(50)),
        ];
        let doc = DocumentText::from_pages(&pages);
        let spans = chunk_page_merge(&doc, 30);
        assert_eq!(spans.len(), 2);

        let (_, _, numbers) = doc.pages_for(spans[0].0, spans[0].1);
        assert_eq!(numbers.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn short_pages_merge_forward_and_record_all_pages() {
        let pages = vec![
            page(1, "tiny"),
            page(2, "also tiny"),
            page(3, &"c".repeat(60)),
        ];
        let doc = DocumentText::from_pages(&pages);
        let spans = chunk_page_merge(&doc, 40);
        assert_eq!(spans.len(), 1);

        let (start_page, end_page, numbers) = doc.pages_for(spans[0].0, spans[0].1);
        assert_eq!(start_page, 1);
        assert_eq!(end_page, 3);
        assert_eq!(numbers.len(), 3);
    }

    #[test]
    fn trailing_short_accumulation_is_still_emitted() {
        let pages = vec![page(1, &"a".repeat(50)), page(2, "leftover")];
        let doc = DocumentText::from_pages(&pages);
        let spans = chunk_page_merge(&doc, 30);
        assert_eq!(spans.len(), 2);
        assert!(doc.text[spans[1].0..spans[1].1].contains("leftover"));
    }
}
