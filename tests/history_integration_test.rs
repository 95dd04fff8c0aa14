//! Integration tests for the file-backed usage history store.
//!
//! Covers:
//! - Database creation and persistence across reopens
//! - Timeline ordering and time-window queries
//! - Automatic and explicit pruning
//! - Samples captured from real summaries

mod common;

use std::time::Duration;

use chrono::{DateTime, Utc};

use cctally::core::models::{ContextWindowState, Provenance, TokenUsage};
use cctally::storage::history::{HistoryStore, UsageSample};
use cctally::storage::paths::AppPaths;
use cctally::test_utils::{TestDir, make_test_summary};

use common::logger::TestLogger;

fn sample_at(at: DateTime<Utc>, cost: f64) -> UsageSample {
    UsageSample {
        recorded_at: at,
        session_id: Some("sess-1".to_string()),
        context_tokens: 42_000,
        context_window: 200_000,
        today: TokenUsage::new(1_000, 200, 50, 5_000),
        today_cost_usd: cost,
        pricing_provenance: Provenance::Cached,
    }
}

fn open_store(dir: &TestDir) -> HistoryStore {
    HistoryStore::open(&AppPaths::rooted_at(dir.path()).history_db_file()).expect("open history db")
}

#[test]
fn database_created_under_data_dir() {
    let log = TestLogger::new("database_created_under_data_dir");
    let dir = TestDir::new();
    let path = AppPaths::rooted_at(dir.path()).history_db_file();
    assert!(!path.exists());

    let store = open_store(&dir);

    assert!(path.exists());
    assert_eq!(store.sample_count().unwrap(), 0);
    log.finish_ok();
}

#[test]
fn samples_persist_across_reopens() {
    let log = TestLogger::new("samples_persist_across_reopens");
    let dir = TestDir::new();
    let now = Utc::now();

    {
        let store = open_store(&dir);
        store.record_sample(&sample_at(now, 1.25)).unwrap();
    }

    let reopened = open_store(&dir);
    assert_eq!(reopened.sample_count().unwrap(), 1);
    let latest = reopened.latest().unwrap().expect("sample");
    assert_eq!(latest.today_cost_usd, 1.25);
    assert_eq!(latest.pricing_provenance, Provenance::Cached);
    assert_eq!(latest.recorded_at.timestamp_micros(), now.timestamp_micros());
    log.finish_ok();
}

#[test]
fn timeline_is_oldest_first_and_windowed() {
    let log = TestLogger::new("timeline_is_oldest_first_and_windowed");
    let dir = TestDir::new();
    let store = open_store(&dir);
    let now = Utc::now();

    // Inserted out of order on purpose.
    for (hours_ago, cost) in [(1, 3.0), (30, 1.0), (5, 2.0), (0, 4.0)] {
        store
            .record_sample(&sample_at(now - chrono::Duration::hours(hours_ago), cost))
            .unwrap();
    }

    let day = store.samples_since(now - chrono::Duration::hours(24)).unwrap();
    let costs: Vec<f64> = day.iter().map(|s| s.today_cost_usd).collect();
    assert_eq!(costs, vec![2.0, 3.0, 4.0]);

    let all = store.samples_since(now - chrono::Duration::days(7)).unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
    assert_eq!(store.latest().unwrap().unwrap().today_cost_usd, 4.0);
    log.finish_ok();
}

#[test]
fn explicit_prune_removes_samples_past_retention() {
    let log = TestLogger::new("explicit_prune_removes_samples_past_retention");
    let dir = TestDir::new();
    let store = open_store(&dir).with_retention(Duration::from_secs(86_400));
    let now = Utc::now();

    // The first insert runs the automatic prune; the next one is not due for an hour.
    store.record_sample(&sample_at(now, 1.0)).unwrap();
    store
        .record_sample(&sample_at(now - chrono::Duration::days(3), 0.5))
        .unwrap();
    assert_eq!(store.sample_count().unwrap(), 2);

    let result = store.prune(store.retention()).unwrap();

    assert_eq!(result.samples_deleted, 1);
    assert_eq!(store.sample_count().unwrap(), 1);
    assert!(store.maybe_prune().unwrap().is_none());
    log.finish_ok();
}

#[test]
fn zero_retention_is_rejected() {
    let dir = TestDir::new();
    let store = open_store(&dir);
    assert!(store.prune(Duration::ZERO).is_err());
}

#[test]
fn captured_sample_round_trips() {
    let log = TestLogger::new("captured_sample_round_trips");
    let dir = TestDir::new();
    let store = open_store(&dir);

    let summary = make_test_summary();
    let context = ContextWindowState {
        path: dir.file_path("logs/p/sess.jsonl"),
        session_id: "sess".to_string(),
        current_tokens: 150_000,
        model: None,
        max_tokens: 200_000,
        near_auto_compact: false,
        last_entry_at: None,
        modified_at: None,
    };
    let sample = UsageSample::capture(&summary, Some(&context), Provenance::Live);
    store.record_sample(&sample).unwrap();

    let stored = store.latest().unwrap().expect("sample");
    assert_eq!(stored.session_id.as_deref(), Some("sess"));
    assert_eq!(stored.context_tokens, 150_000);
    assert_eq!(stored.context_window, 200_000);
    assert_eq!(stored.today, summary.stats.tokens);
    assert!((stored.today_cost_usd - summary.stats.cost_usd).abs() < 1e-12);

    let without_context = UsageSample::capture(&summary, None, Provenance::Bundled);
    assert_eq!(without_context.session_id, None);
    assert_eq!(without_context.context_window, 0);
    log.finish_ok();
}
