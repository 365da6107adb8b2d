use anyhow::anyhow;
use narravox_app::{start, EngineOptions, EngineSettings};
use narravox_foundation::UserId;
use narravox_jobs::{ContentSource, JobConfig};
use narravox_tts::{StubSynthesizer, VoiceSettings};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_level).init();
}

const SAMPLE_BOOK: &str = "\
Chapter 1

It was a dark and stormy night. The rain fell in torrents except at
occasional intervals, when it was checked by a violent gust of wind.
The lamps struggled against the darkness and lost.

Chapter 2

Morning came late and grey. The streets were washed clean, and the city
went about its business as if nothing at all had happened in the night.
Nobody spoke of the storm.
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("starting narravox demo");

    let settings = EngineSettings::new().map_err(|e| anyhow!(e))?;
    let engine = start(EngineOptions::new(
        settings,
        Arc::new(StubSynthesizer::default()),
    ))
    .await;

    let user = UserId::from("demo");
    let job = engine
        .create_job(
            user.clone(),
            "Demo audiobook",
            JobConfig::BookProcessing {
                source: ContentSource::Inline {
                    text: SAMPLE_BOOK.to_string(),
                },
                voice: VoiceSettings::default(),
                max_concurrency: Some(2),
            },
        )
        .await?;
    tracing::info!(job_id = %job.id, "book job submitted");

    let done = engine
        .wait_for_terminal(&job.id, Duration::from_secs(60))
        .await?;
    tracing::info!(
        status = %done.status,
        progress = done.progress,
        chapters = done.result_data.chapters.len(),
        duration = done.result_data.duration_seconds,
        "book job finished"
    );

    if let Some(first) = done.result_data.chapters.first() {
        engine
            .update_progress(&user, &job.id, 1.0, Some(first.job_id.clone()))
            .await?;
        let info = engine.streaming_url(&user, &done.result_data.chapters[0].job_id).await;
        match info {
            Ok(info) => tracing::info!(url = %info.url.url, "first chapter stream ready"),
            Err(e) => tracing::warn!(error = %e, "no streaming url"),
        }
    }

    engine.shutdown().await;
    Ok(())
}
