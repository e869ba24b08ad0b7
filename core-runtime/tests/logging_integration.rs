//! Integration tests for logging and the progress hub

use bridge_traits::time::LogLevel;
use core_runtime::events::{ArchiveEvent, ProgressHub, SyncPhase, SyncProgress};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    // Only one global subscriber per process: the second call must fail cleanly.
    let first = init_logging(config.clone());
    let second = init_logging(config);
    assert!(first.is_ok());
    assert!(second.is_err());

    tracing::info!(job_id = "job-1", "logging initialized");
}

#[test]
fn test_api_key_redaction() {
    assert_eq!(redact_if_sensitive("api_key", "AIzaSyExample"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("title", "Episode 12"), "Episode 12");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[tokio::test]
async fn test_hub_shared_across_tasks() {
    let hub = ProgressHub::new(8);
    let mut subscription = hub.subscribe();

    let publisher = hub.clone();
    tokio::spawn(async move {
        for processed in 1..=3 {
            publisher.publish(ArchiveEvent::SyncProgress(SyncProgress {
                job_id: "job-1".to_string(),
                phase: SyncPhase::Items,
                total: 3,
                processed,
                failed: 0,
                current_item: None,
                percent_complete: SyncProgress::percent(processed, 3),
            }));
        }
    })
    .await
    .unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        if let Some(ArchiveEvent::SyncProgress(p)) = subscription.recv().await {
            seen.push(p.processed);
        }
    }
    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(hub.snapshot().processed_items, 3);
    assert_eq!(hub.snapshot().percent_complete, 100.0);
}
