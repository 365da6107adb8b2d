//! Foundation crate tests
//!
//! Tests cover:
//! - Error taxonomy (transient/permanent classification, retryability)
//! - Cooperative cancellation tokens
//! - Identifier generation

use narravox_foundation::error::{EngineError, ProviderError, StoreError};
use narravox_foundation::{CancelToken, JobId, UserId};
use std::time::Duration;

// ─── Error Classification ───────────────────────────────────────────

#[test]
fn timeouts_and_rate_limits_are_transient() {
    assert!(ProviderError::Timeout(Duration::from_secs(30)).is_transient());
    assert!(ProviderError::RateLimited("429".into()).is_transient());
    assert!(ProviderError::Unavailable("connection reset".into()).is_transient());
}

#[test]
fn content_rejection_is_permanent() {
    assert!(!ProviderError::ContentRejected("policy".into()).is_transient());
    assert!(!ProviderError::InvalidRequest("bad voice id".into()).is_transient());
}

#[test]
fn retryability_follows_the_taxonomy() {
    let transient = EngineError::Provider(ProviderError::RateLimited("slow down".into()));
    assert!(transient.is_retryable());

    let conflict = EngineError::Store(StoreError::VersionConflict {
        entity: "job".into(),
        expected: 3,
        found: 4,
    });
    assert!(conflict.is_retryable());

    assert!(!EngineError::Validation("no content".into()).is_retryable());
    assert!(!EngineError::Cancelled.is_retryable());
    assert!(!EngineError::Concatenation {
        chunk_index: 2,
        reason: "empty".into()
    }
    .is_retryable());
}

#[test]
fn error_messages_carry_diagnostics() {
    let err = EngineError::Concatenation {
        chunk_index: 3,
        reason: "sample rate mismatch".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("chunk 3"));
    assert!(msg.contains("sample rate mismatch"));
}

// ─── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn cancel_is_idempotent() {
    let token = CancelToken::new();
    token.request();
    token.request();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn late_subscriber_still_observes_cancellation() {
    let token = CancelToken::new();
    token.request();
    let clone = token.clone();
    tokio::time::timeout(Duration::from_secs(1), clone.cancelled())
        .await
        .expect("waiter should resolve immediately");
}

// ─── Identifiers ────────────────────────────────────────────────────

#[test]
fn ids_round_trip_through_strings() {
    let id = JobId::from("abc123");
    assert_eq!(id.as_str(), "abc123");
    assert_eq!(id.to_string(), "abc123");

    let user = UserId::generate();
    assert_eq!(UserId::from(user.as_str()), user);
}
