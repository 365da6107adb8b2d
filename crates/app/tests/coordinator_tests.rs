//! Book fan-out/fan-in tests: chapter child jobs, parent progress,
//! partial failure, cancellation, and ordering under parallelism.

mod common;

use common::{test_engine, FakeSynthesizer};
use narravox_foundation::error::ProviderError;
use narravox_foundation::UserId;
use narravox_jobs::{ContentSource, JobConfig, JobEvent, JobStatus};
use narravox_tts::VoiceSettings;
use std::sync::Arc;
use std::time::Duration;

fn book_job(text: &str, max_concurrency: Option<usize>) -> JobConfig {
    JobConfig::BookProcessing {
        source: ContentSource::Inline {
            text: text.to_string(),
        },
        voice: VoiceSettings::default(),
        max_concurrency,
    }
}

fn two_chapter_book() -> String {
    format!(
        "Chapter 1\n\n{}\n\nChapter 2\n\n{}\n",
        "the night was long and the fire burned low in the hearth while they waited for news",
        "dawn broke over the valley and the riders finally appeared on the eastern road"
    )
}

#[tokio::test]
async fn book_splits_into_children_and_reports_fifty_then_hundred() {
    let synth = Arc::new(FakeSynthesizer::new(4096));
    let engine = test_engine(synth).await;
    let events = engine.subscribe();

    let job = engine
        .create_job(
            UserId::from("reader"),
            "two chapter book",
            book_job(&two_chapter_book(), Some(1)),
        )
        .await
        .expect("job created");

    let done = engine
        .wait_for_terminal(&job.id, Duration::from_secs(10))
        .await
        .expect("book finishes");

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100.0);

    let view = engine.get_job(&job.id).await.expect("job exists");
    assert_eq!(view.children.len(), 2);
    assert!(view
        .children
        .iter()
        .all(|c| c.status == JobStatus::Completed));
    assert_eq!(
        view.children
            .iter()
            .filter_map(|c| c.chapter_number)
            .collect::<Vec<_>>(),
        vec![1, 2]
    );

    let chapters = &done.result_data.chapters;
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].chapter_number, 1);
    assert_eq!(chapters[1].chapter_number, 2);
    assert!(chapters.iter().all(|c| c.is_completed()));
    assert_eq!(done.result_data.playlist.len(), 2);
    assert!(done.result_data.duration_seconds.unwrap_or(0.0) > 0.0);

    // Parent progress moved 0 -> 50 -> 100 as children completed.
    let parent_progress: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            JobEvent::Progress { job_id, progress } if job_id == job.id => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(parent_progress, vec![50.0, 100.0]);

    let summary = engine.book_chapters(&job.id).await.expect("summary");
    assert_eq!(summary.total_chapters, 2);
    assert_eq!(summary.completed_chapters, 2);
    assert_eq!(summary.failed_chapters, 0);
    assert!(summary.total_duration_seconds > 0.0);

    engine.shutdown().await;
}

#[tokio::test]
async fn failed_chapter_preserves_completed_siblings() {
    let synth = Arc::new(FakeSynthesizer::new(4096));
    synth.fail_matching(
        "dawn",
        vec![ProviderError::ContentRejected("no dawns allowed".into())],
    );
    let engine = test_engine(synth).await;

    let job = engine
        .create_job(
            UserId::from("reader"),
            "half doomed book",
            book_job(&two_chapter_book(), Some(1)),
        )
        .await
        .expect("job created");

    let done = engine
        .wait_for_terminal(&job.id, Duration::from_secs(10))
        .await
        .expect("book finishes");

    assert_eq!(done.status, JobStatus::Failed);
    let message = done.error_message.expect("failure carries a message");
    assert!(message.contains("1 of 2 chapters failed"), "got: {message}");
    assert!(message.contains("chapter 2"), "got: {message}");

    // The completed first chapter stays playable.
    let chapters = &done.result_data.chapters;
    assert_eq!(chapters.len(), 2);
    assert!(chapters[0].is_completed());
    assert!(chapters[0].audio_key.is_some());
    assert!(chapters[1].error.is_some());
    assert!(chapters[1].audio_key.is_none());
    assert_eq!(done.result_data.playlist.len(), 1);

    let view = engine.get_job(&job.id).await.expect("job exists");
    let statuses: Vec<JobStatus> = view.children.iter().map(|c| c.status).collect();
    assert_eq!(statuses, vec![JobStatus::Completed, JobStatus::Failed]);

    let summary = engine.book_chapters(&job.id).await.expect("summary");
    assert_eq!(summary.completed_chapters, 1);
    assert_eq!(summary.failed_chapters, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn cancelling_a_processing_book_stops_everything_cooperatively() {
    let synth = Arc::new(FakeSynthesizer::new(4096));
    // Every provider call stalls long enough for the cancel to land.
    synth.delay_matching("", Duration::from_millis(200));
    let engine = test_engine(Arc::clone(&synth)).await;

    let text = format!(
        "Chapter 1\n\n{}\n\nChapter 2\n\n{}\n\nChapter 3\n\n{}\n",
        "first chapter body with enough words to count as a chapter here",
        "second chapter body with enough words to count as a chapter here",
        "third chapter body with enough words to count as a chapter here"
    );
    let job = engine
        .create_job(
            UserId::from("reader"),
            "cancelled book",
            book_job(&text, Some(1)),
        )
        .await
        .expect("job created");

    // Wait until the first child is actually processing.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let view = engine.get_job(&job.id).await.expect("job exists");
        if view
            .children
            .iter()
            .any(|c| c.status == JobStatus::Processing)
        {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no child ever started processing"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    engine.cancel_job(&job.id).await.expect("cancel accepted");

    let done = engine
        .wait_for_terminal(&job.id, Duration::from_secs(10))
        .await
        .expect("book reaches a terminal state");
    assert_eq!(done.status, JobStatus::Cancelled);

    let view = engine.get_job(&job.id).await.expect("job exists");
    assert_eq!(view.children.len(), 3);
    assert!(view
        .children
        .iter()
        .all(|c| c.status == JobStatus::Cancelled));

    // At most the in-flight chapter ever reached the provider; the
    // other two were cancelled while still pending.
    assert!(synth.call_count() <= 1, "got {}", synth.call_count());

    engine.shutdown().await;
}

#[tokio::test]
async fn completion_order_never_reorders_chapters() {
    let synth = Arc::new(FakeSynthesizer::new(4096));
    // Chapter 1 is slow, so chapter 2 finishes first.
    synth.delay_matching("glacier", Duration::from_millis(120));
    let engine = test_engine(synth).await;

    let text = format!(
        "Chapter 1\n\n{}\n\nChapter 2\n\n{}\n",
        "the glacier moved slowly down the mountain over ten thousand quiet years",
        "meanwhile the river raced to the sea in a single loud afternoon"
    );
    let job = engine
        .create_job(
            UserId::from("reader"),
            "out of order book",
            book_job(&text, Some(2)),
        )
        .await
        .expect("job created");

    let done = engine
        .wait_for_terminal(&job.id, Duration::from_secs(10))
        .await
        .expect("book finishes");

    assert_eq!(done.status, JobStatus::Completed);
    let chapters = &done.result_data.chapters;
    assert_eq!(chapters[0].chapter_number, 1);
    assert_eq!(chapters[1].chapter_number, 2);
    assert!(chapters[0].title.contains("Chapter 1"));
    assert!(chapters[1].title.contains("Chapter 2"));

    // Playlist follows chapter order, not completion order.
    let expected: Vec<String> = chapters
        .iter()
        .filter_map(|c| c.audio_key.clone())
        .collect();
    assert_eq!(done.result_data.playlist, expected);

    engine.shutdown().await;
}

#[tokio::test]
async fn chapterless_text_still_produces_one_child() {
    let synth = Arc::new(FakeSynthesizer::new(4096));
    let engine = test_engine(synth).await;

    let job = engine
        .create_job(
            UserId::from("reader"),
            "plain text book",
            book_job(
                "just a plain block of prose with no chapter structure at all.",
                None,
            ),
        )
        .await
        .expect("job created");

    let done = engine
        .wait_for_terminal(&job.id, Duration::from_secs(10))
        .await
        .expect("job finishes");

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result_data.chapters.len(), 1);
    assert_eq!(done.result_data.chapters[0].chapter_number, 1);
    assert_eq!(done.result_data.playlist.len(), 1);

    engine.shutdown().await;
}
