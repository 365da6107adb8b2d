//! NarraVox orchestration engine.
//!
//! Wires the foundation/splitter/tts/jobs/playback crates into a running
//! engine: a worker pool consuming the task queue, the per-job pipeline,
//! the book fan-out coordinator, and the caller-facing [`Engine`] facade.

use config::{Config, Environment, File};
use narravox_tts::{FanoutOptions, RetryPolicy};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub mod audio;
pub mod coordinator;
pub mod engine;
pub mod pipeline;
pub mod storage;
pub mod worker;

pub use engine::{start, BookChapters, Engine, EngineOptions, JobView, StreamingInfo};
pub use pipeline::TextToAudioPipeline;
pub use storage::{MemoryObjectStore, ObjectStore, PresignedUrl};

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            call_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Queue consumers in this process.
    pub workers: usize,
    /// Default per-book chapter fan-out bound; a job config may lower or
    /// raise its own.
    pub book_max_concurrency: usize,
    /// Concurrent provider calls per job.
    pub chunk_max_in_flight: usize,
    /// Playback fraction at which a title counts as finished.
    pub completion_threshold: f64,
    pub presign_ttl_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            book_max_concurrency: 4,
            chunk_max_in_flight: 4,
            completion_threshold: narravox_playback::COMPLETION_THRESHOLD,
            presign_ttl_secs: 3600,
            retry: RetrySettings::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings from `config/narravox.toml` (when present) with
    /// `NARRAVOX_`-prefixed environment overrides.
    pub fn new() -> Result<Self, String> {
        let config_path = Path::new("config/narravox.toml");
        let mut builder = Self::builder_with_defaults();
        if config_path.exists() {
            tracing::info!("loading configuration from {}", config_path.display());
            builder = builder.add_source(File::from(config_path).required(true));
        }
        Self::finish(builder)
    }

    /// Load settings from a specific config file path (for tests).
    pub fn from_path(config_path: impl AsRef<Path>) -> Result<Self, String> {
        let builder =
            Self::builder_with_defaults().add_source(File::from(config_path.as_ref()).required(true));
        Self::finish(builder)
    }

    fn builder_with_defaults() -> config::ConfigBuilder<config::builder::DefaultState> {
        let defaults = Self::default();
        Config::builder()
            .set_default("workers", defaults.workers as u64)
            .expect("default is valid")
            .set_default("book_max_concurrency", defaults.book_max_concurrency as u64)
            .expect("default is valid")
            .set_default("chunk_max_in_flight", defaults.chunk_max_in_flight as u64)
            .expect("default is valid")
            .set_default("completion_threshold", defaults.completion_threshold)
            .expect("default is valid")
            .set_default("presign_ttl_secs", defaults.presign_ttl_secs)
            .expect("default is valid")
            .set_default("retry.max_attempts", defaults.retry.max_attempts as u64)
            .expect("default is valid")
            .set_default("retry.base_delay_ms", defaults.retry.base_delay_ms)
            .expect("default is valid")
            .set_default("retry.max_delay_ms", defaults.retry.max_delay_ms)
            .expect("default is valid")
            .set_default("retry.call_timeout_ms", defaults.retry.call_timeout_ms)
            .expect("default is valid")
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, String> {
        let config = builder
            .add_source(Environment::with_prefix("NARRAVOX").separator("__"))
            .build()
            .map_err(|e| format!("failed to build config: {e}"))?;
        let mut settings: EngineSettings = config
            .try_deserialize()
            .map_err(|e| format!("failed to deserialize settings: {e}"))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&mut self) -> Result<(), String> {
        if self.workers == 0 {
            tracing::warn!("workers must be at least 1, clamping");
            self.workers = 1;
        }
        if self.book_max_concurrency == 0 {
            tracing::warn!("book_max_concurrency must be at least 1, clamping");
            self.book_max_concurrency = 1;
        }
        if self.chunk_max_in_flight == 0 {
            tracing::warn!("chunk_max_in_flight must be at least 1, clamping");
            self.chunk_max_in_flight = 1;
        }
        if !(0.0..=1.0).contains(&self.completion_threshold) {
            return Err(format!(
                "completion_threshold must be within [0, 1], got {}",
                self.completion_threshold
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            call_timeout: Duration::from_millis(self.retry.call_timeout_ms),
        }
    }

    pub fn fanout(&self) -> FanoutOptions {
        FanoutOptions {
            max_in_flight: self.chunk_max_in_flight,
        }
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}
