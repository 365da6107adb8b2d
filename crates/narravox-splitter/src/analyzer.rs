//! Chapter boundary detection heuristics.

use crate::boundary::BoundaryAnalyzer;
use regex::Regex;
use std::ops::Range;
use std::time::Duration;

/// Ceiling on the optional boundary-analysis call; past it the
/// heuristics stand alone.
const ANALYZER_TIMEOUT: Duration = Duration::from_secs(30);

/// One detected chapter: a contiguous slice of the book text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterText {
    /// Sequential ordinal starting at 1, in text order.
    pub number: u32,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Minimum words for a chapter found via explicit headings; shorter
    /// detections merge into the previous chapter.
    pub min_chapter_words: usize,
    /// Minimum words per chapter for the content heuristic. Much higher
    /// than the marker minimum, to reject quoted dialogue headers and
    /// letter salutations.
    pub heuristic_min_words: usize,
    /// Maximum length of a candidate title line, in characters.
    pub max_title_chars: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            min_chapter_words: 5,
            heuristic_min_words: 100,
            max_title_chars: 60,
        }
    }
}

#[derive(Debug, Clone)]
struct Boundary {
    offset: usize,
    title: String,
}

/// Detects chapter structure in raw book text.
pub struct BookAnalyzer {
    numbered: Vec<Regex>,
    roman: Vec<Regex>,
    special: Regex,
    options: SplitOptions,
}

impl Default for BookAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BookAnalyzer {
    pub fn new() -> Self {
        Self::with_options(SplitOptions::default())
    }

    pub fn with_options(options: SplitOptions) -> Self {
        let compile = |p: &str| Regex::new(p).expect("chapter pattern is valid");
        Self {
            numbered: vec![
                compile(r"(?m)^[ \t]*(?:CHAPTER|Chapter|Ch\.)[ \t]+\d{1,4}\b[^\n]*$"),
                compile(r"(?m)^[ \t]*\d{1,4}\.[ \t]*$"),
            ],
            roman: vec![
                compile(r"(?m)^[ \t]*(?:CHAPTER|Chapter)[ \t]+[IVXLCDM]+\b[^\n]*$"),
                compile(r"(?m)^[ \t]*[IVXLCDM]{1,10}\.?[ \t]*$"),
            ],
            special: compile(
                r"(?m)^[ \t]*(?:Prologue|PROLOGUE|Epilogue|EPILOGUE|Introduction|INTRODUCTION|Preface|PREFACE|Appendix|APPENDIX)[ \t]*$",
            ),
            options,
        }
    }

    /// Split using heuristics only.
    pub fn split(&self, text: &str) -> Vec<ChapterText> {
        self.split_refined(text, None)
    }

    /// Split, refining the content heuristic with an external boundary
    /// analyzer when one is available. Analyzer failures and timeouts are
    /// logged and ignored; the heuristics are always sufficient on their
    /// own.
    pub async fn split_with_analyzer(
        &self,
        text: &str,
        analyzer: Option<&dyn BoundaryAnalyzer>,
    ) -> Vec<ChapterText> {
        let suggestions = match analyzer {
            Some(a) => {
                match tokio::time::timeout(ANALYZER_TIMEOUT, a.analyze(text)).await {
                    Ok(Ok(offsets)) => Some(offsets),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "boundary analyzer failed, using heuristics alone");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(timeout = ?ANALYZER_TIMEOUT, "boundary analyzer timed out");
                        None
                    }
                }
            }
            None => None,
        };
        self.split_refined(text, suggestions.as_deref())
    }

    fn split_refined(&self, text: &str, suggestions: Option<&[usize]>) -> Vec<ChapterText> {
        if text.trim().is_empty() {
            return vec![single_chapter(text)];
        }

        for (strategy, patterns) in [("numbered", &self.numbered), ("roman", &self.roman)] {
            let bounds = self.marker_boundaries(text, patterns);
            if bounds.len() >= 2 {
                let chapters =
                    build_chapters(text, bounds, self.options.min_chapter_words);
                if chapters.len() >= 2 {
                    tracing::info!(strategy, chapters = chapters.len(), "chapter markers found");
                    return chapters;
                }
            }
        }

        let mut candidates = self.content_candidates(text);
        if let Some(suggested) = suggestions {
            if !suggested.is_empty() {
                let before = candidates.len();
                candidates.retain(|b| suggested.iter().any(|&s| b.offset.abs_diff(s) <= 80));
                tracing::debug!(before, after = candidates.len(), "refined candidates");
            }
        }
        if !candidates.is_empty() {
            let chapters = build_chapters(text, candidates, self.options.heuristic_min_words);
            if chapters.len() >= 2 {
                tracing::info!(chapters = chapters.len(), "content heuristic split");
                return chapters;
            }
        }

        tracing::info!("no chapter structure detected, returning single chapter");
        vec![single_chapter(text)]
    }

    fn marker_boundaries(&self, text: &str, patterns: &[Regex]) -> Vec<Boundary> {
        let mut bounds: Vec<Boundary> = Vec::new();
        for pattern in patterns.iter().chain(std::iter::once(&self.special)) {
            for m in pattern.find_iter(text) {
                if bounds.iter().any(|b| b.offset == m.start()) {
                    continue;
                }
                bounds.push(Boundary {
                    offset: m.start(),
                    title: m.as_str().trim().to_string(),
                });
            }
        }
        bounds.sort_by_key(|b| b.offset);
        bounds
    }

    /// Content heuristic: a short title-cased line surrounded by blank
    /// lines marks a chapter start.
    fn content_candidates(&self, text: &str) -> Vec<Boundary> {
        let lines = line_spans(text);
        let mut out = Vec::new();

        for i in 0..lines.len() {
            let (offset, line) = lines[i];
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let prev_blank = i == 0 || lines[i - 1].1.trim().is_empty();
            let next_blank = i + 1 >= lines.len() || lines[i + 1].1.trim().is_empty();
            if !prev_blank || !next_blank {
                continue;
            }
            if trimmed.chars().count() > self.options.max_title_chars {
                continue;
            }
            if trimmed.ends_with(['.', '!', '?', ',', ';', ':']) {
                continue;
            }
            let words: Vec<&str> = trimmed.split_whitespace().collect();
            if words.len() > 8 || !is_title_cased(&words) {
                continue;
            }
            out.push(Boundary {
                offset,
                title: trimmed.to_string(),
            });
        }
        out
    }
}

fn single_chapter(text: &str) -> ChapterText {
    ChapterText {
        number: 1,
        title: "Chapter 1".to_string(),
        text: text.to_string(),
    }
}

const SMALL_WORDS: &[&str] = &["a", "an", "and", "at", "in", "of", "on", "or", "the", "to"];

fn is_title_cased(words: &[&str]) -> bool {
    let leads_upper = |w: &str| {
        w.chars()
            .find(|c| c.is_alphabetic())
            .is_some_and(|c| c.is_uppercase())
    };
    match words.first() {
        Some(first) if leads_upper(first) => {}
        _ => return false,
    }
    words.iter().skip(1).all(|w| {
        leads_upper(w)
            || SMALL_WORDS.contains(&w.to_lowercase().as_str())
            || w.chars().all(|c| !c.is_alphabetic())
    })
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Byte offset of each line start, with the line content (no newline).
fn line_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            spans.push((start, &text[start..i]));
            start = i + 1;
        }
    }
    spans.push((start, &text[start..]));
    spans
}

/// Slice the text into chapters at the given boundaries. Chapters tile
/// the input, so concatenating them reproduces it exactly: leading text
/// before the first boundary becomes front matter (or joins the first
/// chapter when trivial), and too-short detections merge into their
/// neighbor instead of being dropped.
fn build_chapters(text: &str, mut bounds: Vec<Boundary>, min_words: usize) -> Vec<ChapterText> {
    debug_assert!(!bounds.is_empty());
    bounds.sort_by_key(|b| b.offset);
    bounds.dedup_by_key(|b| b.offset);

    if bounds[0].offset > 0 {
        let preamble = &text[..bounds[0].offset];
        if word_count(preamble) >= min_words {
            bounds.insert(
                0,
                Boundary {
                    offset: 0,
                    title: "Front Matter".to_string(),
                },
            );
        } else {
            bounds[0].offset = 0;
        }
    }

    let mut sliced: Vec<(String, Range<usize>)> = Vec::with_capacity(bounds.len());
    for (i, b) in bounds.iter().enumerate() {
        let end = bounds.get(i + 1).map_or(text.len(), |n| n.offset);
        sliced.push((b.title.clone(), b.offset..end));
    }

    // Merge short chapters into the previous one.
    let mut merged: Vec<(String, Range<usize>)> = Vec::with_capacity(sliced.len());
    for (title, range) in sliced {
        let words = word_count(&text[range.clone()]);
        match merged.last_mut() {
            Some((_, prev)) if words < min_words => prev.end = range.end,
            _ => merged.push((title, range)),
        }
    }
    // A short opening chapter merges forward instead.
    if merged.len() >= 2 && word_count(&text[merged[0].1.clone()]) < min_words {
        let (_, first_range) = merged.remove(0);
        merged[0].1.start = first_range.start;
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(i, (title, range))| ChapterText {
            number: i as u32 + 1,
            title,
            text: text[range].to_string(),
        })
        .collect()
}
