//! Synthesis provider abstraction.

use crate::types::{AudioClip, VoiceSettings};
use async_trait::async_trait;
use narravox_foundation::error::ProviderError;

/// External text-to-speech provider contract.
///
/// One call per chunk; the chunk text is guaranteed to be at most
/// [`max_chars`](Synthesizer::max_chars) characters. Implementations
/// report failures through [`ProviderError`] so callers can branch on
/// the transient/permanent split.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short provider identifier, e.g. "openai".
    fn name(&self) -> &str;

    /// Documented per-call character limit of the provider.
    fn max_chars(&self) -> usize;

    /// Synthesize one chunk of text into audio.
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
    ) -> Result<AudioClip, ProviderError>;
}
