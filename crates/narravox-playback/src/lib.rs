//! Per-user playback position tracking, so a listener resumes exactly
//! where they left off across sessions.

pub mod store;
pub mod tracker;

pub use store::{MemoryProgressStore, ProgressStore};
pub use tracker::{PlaybackProgress, PlaybackTracker, ResumeInfo, COMPLETION_THRESHOLD};
