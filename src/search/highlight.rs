use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// A highlight range representing a match in the text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HighlightRange {
    /// Byte offset of the match start.
    pub start: usize,
    /// Byte offset of the match end (exclusive).
    pub end: usize,
}

/// Split a search query into the words to highlight. A leading `#` stays
/// attached so hashtags match as typed.
pub fn query_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .flat_map(|chunk| {
            if chunk.starts_with('#') && chunk.len() > 1 {
                vec![chunk.to_string()]
            } else {
                chunk.unicode_words().map(str::to_string).collect()
            }
        })
        .collect()
}

/// Find all case-insensitive occurrences of `words` in `text`.
/// Returns non-overlapping ranges into the original text, sorted by start.
pub fn find_highlights(text: &str, words: &[String]) -> Vec<HighlightRange> {
    // Lowercasing can change byte lengths, so remember where each lowered
    // byte came from in the original text.
    let mut lowered = String::with_capacity(text.len());
    let mut origin: Vec<(usize, usize)> = Vec::with_capacity(text.len());
    for (start, ch) in text.char_indices() {
        let end = start + ch.len_utf8();
        for lower in ch.to_lowercase() {
            for _ in 0..lower.len_utf8() {
                origin.push((start, end));
            }
            lowered.push(lower);
        }
    }

    let mut ranges: Vec<HighlightRange> = Vec::new();
    for word in words {
        let needle = word.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let mut search_from = 0;
        while let Some(pos) = lowered[search_from..].find(&needle) {
            let from = search_from + pos;
            let to = from + needle.len();
            ranges.push(HighlightRange {
                start: origin[from].0,
                end: origin[to - 1].1,
            });
            search_from = to;
        }
    }

    ranges.sort_by_key(|r| r.start);
    merge_overlapping(ranges)
}

fn merge_overlapping(ranges: Vec<HighlightRange>) -> Vec<HighlightRange> {
    let mut merged: Vec<HighlightRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Wrap every range of `text` in `open`/`close` markers.
pub fn mark(text: &str, ranges: &[HighlightRange], open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len() + ranges.len() * (open.len() + close.len()));
    let mut cursor = 0;
    for range in ranges {
        out.push_str(&text[cursor..range.start]);
        out.push_str(open);
        out.push_str(&text[range.start..range.end]);
        out.push_str(close);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}
