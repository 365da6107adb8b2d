//! Splits chapter text into provider-sized chunks.
//!
//! Chunks are contiguous slices of the input: breaking happens first on
//! sentence boundaries, then on word boundaries when a single sentence
//! exceeds the provider limit, and only inside a word when one "word" is
//! itself longer than the limit (URLs, ASCII art). Concatenating the
//! chunks reproduces the input text exactly.

use std::ops::Range;

/// Character limit used when a provider does not report one.
pub const DEFAULT_MAX_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct TextChunker {
    max_chars: usize,
}

impl TextChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into chunks of at most `max_chars` characters each.
    ///
    /// Returns an empty vector for blank input. Chunk order follows text
    /// order and is never altered downstream.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if text.chars().count() <= self.max_chars {
            return vec![text.to_string()];
        }

        let sentences = sentence_ranges(text);
        let ranges = pack(text, sentences, self.max_chars, true);
        tracing::debug!(chunks = ranges.len(), "chunked text for synthesis");
        ranges.into_iter().map(|r| text[r].to_string()).collect()
    }
}

/// Contiguous sentence ranges covering the whole input. A sentence ends
/// at `.`, `!` or `?` (plus any closing quotes) followed by whitespace;
/// the trailing whitespace run belongs to the sentence so that ranges
/// tile the input without gaps.
fn sentence_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let mut end = i + ch.len_utf8();
        while let Some(&(j, c)) = chars.peek() {
            if matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}') {
                end = j + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        // Not a boundary mid-token ("3.5", "e.g.x").
        if matches!(chars.peek(), Some(&(_, c)) if !c.is_whitespace()) {
            continue;
        }
        while let Some(&(j, c)) = chars.peek() {
            if c.is_whitespace() {
                end = j + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        ranges.push(start..end);
        start = end;
    }

    if start < text.len() {
        ranges.push(start..text.len());
    }
    ranges
}

/// Word ranges within `range`: each unit is a word plus its trailing
/// whitespace, offsets relative to the full text.
fn word_ranges(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let base = range.start;
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut prev_ws = false;

    for (i, ch) in slice.char_indices() {
        if prev_ws && !ch.is_whitespace() && i > start {
            ranges.push(base + start..base + i);
            start = i;
        }
        prev_ws = ch.is_whitespace();
    }
    if start < slice.len() {
        ranges.push(base + start..range.end);
    }
    ranges
}

/// Hard split at character boundaries, for a single unit longer than the
/// limit with no whitespace to break on.
fn hard_split(text: &str, range: Range<usize>, max_chars: usize) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (i, _ch) in slice.char_indices() {
        if count == max_chars {
            out.push(range.start + start..range.start + i);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < slice.len() {
        out.push(range.start + start..range.end);
    }
    out
}

/// Greedily pack units into ranges of at most `max_chars` characters.
/// Oversized units fall back to word packing, then to hard splitting.
fn pack(
    text: &str,
    units: Vec<Range<usize>>,
    max_chars: usize,
    word_fallback: bool,
) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut cur_start: Option<usize> = None;
    let mut cur_end = 0;
    let mut cur_chars = 0;

    for unit in units {
        let unit_chars = text[unit.clone()].chars().count();

        if unit_chars > max_chars {
            if let Some(s) = cur_start.take() {
                out.push(s..cur_end);
                cur_chars = 0;
            }
            if word_fallback {
                let words = word_ranges(text, unit);
                out.extend(pack(text, words, max_chars, false));
            } else {
                out.extend(hard_split(text, unit, max_chars));
            }
            continue;
        }

        match cur_start {
            None => {
                cur_start = Some(unit.start);
                cur_end = unit.end;
                cur_chars = unit_chars;
            }
            Some(_) if cur_chars + unit_chars <= max_chars => {
                cur_end = unit.end;
                cur_chars += unit_chars;
            }
            Some(s) => {
                out.push(s..cur_end);
                cur_start = Some(unit.start);
                cur_end = unit.end;
                cur_chars = unit_chars;
            }
        }
    }

    if let Some(s) = cur_start {
        out.push(s..cur_end);
    }
    out
}
