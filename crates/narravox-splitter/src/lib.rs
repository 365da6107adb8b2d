//! Book text analysis: finds chapter boundaries so a book job can fan
//! out one child job per chapter.
//!
//! Strategies run in priority order and the first one producing at least
//! two acceptable chapters wins; otherwise the whole text is one
//! chapter. Chapters are contiguous slices of the input, so
//! concatenating them reproduces the book exactly.

pub mod analyzer;
pub mod boundary;

pub use analyzer::{BookAnalyzer, ChapterText, SplitOptions};
pub use boundary::{BoundaryAnalyzer, BoundaryError};
