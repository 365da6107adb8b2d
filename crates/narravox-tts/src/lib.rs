//! Text-to-speech pipeline building blocks.
//!
//! The flow is chunk → synthesize → concatenate: [`TextChunker`] splits
//! chapter text under the provider limit, [`fanout::synthesize_chunks`]
//! runs bounded-concurrency synthesis with per-chunk retry, and
//! [`concat::concatenate`] reassembles the clips in original order.

pub mod chunker;
pub mod concat;
pub mod fanout;
pub mod retry;
pub mod stub;
pub mod synth;
pub mod types;

pub use chunker::TextChunker;
pub use concat::concatenate;
pub use fanout::{synthesize_chunks, ChunkProgress, FanoutOptions};
pub use retry::{synthesize_with_retry, RetryPolicy};
pub use stub::StubSynthesizer;
pub use synth::Synthesizer;
pub use types::{AudioClip, VoiceSettings};
