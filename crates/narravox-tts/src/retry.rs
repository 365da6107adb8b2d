//! Retry with exponential backoff for provider calls.

use crate::synth::Synthesizer;
use crate::types::{AudioClip, VoiceSettings};
use narravox_foundation::error::{EngineError, ProviderError};
use rand::Rng;
use std::time::Duration;

/// Backoff schedule for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Timeout applied to every individual provider call.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failure number `attempt` (1-based),
    /// doubling each time up to `max_delay`, with up to 25% jitter so
    /// parallel chunks hitting the same rate limit do not retry in step.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter_ms = if backoff.as_millis() >= 4 {
            rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4)
        } else {
            0
        };
        (backoff + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Call the provider for one chunk, retrying transient failures.
///
/// A call that outlives `call_timeout` counts as a transient timeout,
/// never a silent hang. Permanent provider errors fail immediately.
pub async fn synthesize_with_retry(
    synth: &dyn Synthesizer,
    text: &str,
    voice: &VoiceSettings,
    policy: &RetryPolicy,
) -> Result<AudioClip, EngineError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = tokio::time::timeout(policy.call_timeout, synth.synthesize(text, voice)).await;
        let err = match outcome {
            Ok(Ok(clip)) => return Ok(clip),
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Timeout(policy.call_timeout),
        };

        if !err.is_transient() {
            tracing::error!(provider = synth.name(), error = %err, "permanent provider error");
            return Err(err.into());
        }
        if attempt >= policy.max_attempts {
            tracing::error!(
                provider = synth.name(),
                attempts = attempt,
                error = %err,
                "retries exhausted"
            );
            return Err(err.into());
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            provider = synth.name(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient provider error, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        // Jitter only ever adds, and the cap is absolute.
        assert!(p.delay_for(1) >= Duration::from_millis(100));
        assert!(p.delay_for(2) >= Duration::from_millis(200));
        assert!(p.delay_for(3) >= Duration::from_millis(400));
        for attempt in 1..12 {
            assert!(p.delay_for(attempt) <= Duration::from_millis(500));
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let p = policy();
        assert!(p.delay_for(u32::MAX) <= Duration::from_millis(500));
    }
}
