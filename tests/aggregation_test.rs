//! Integration tests for log aggregation over a realistic log root.
//!
//! Covers:
//! - Session totals with duplicates, synthetic turns, precomputed costs and junk lines
//! - Family and default fallbacks marking a summary as estimated
//! - Sub-agent inclusion and cross-file deduplication
//! - Tiered pricing across the threshold
//! - Time-bounded periods, context windows, and active-session detection

mod common;

use std::time::Duration;

use chrono::Utc;

use cctally::core::engine::{Period, UsageEngine};
use cctally::core::model_id::DEFAULT_PRICING_KEY;
use cctally::core::models::TokenUsage;
use cctally::core::session_logs::SessionLogFinder;
use cctally::error::TallyError;
use cctally::storage::pricing_cache::PricingCache;
use cctally::test_utils::{LogTree, TestDir, assistant_line, set_mtime_ago, timestamped_line};

use common::fixtures::{BASIC_SESSION_COST, BASIC_SESSION_ID, install_session_fixture, offline_settings};
use common::logger::TestLogger;

fn engine(dir: &TestDir) -> UsageEngine {
    UsageEngine::from_parts(
        SessionLogFinder::with_root(dir.path().join("logs")),
        PricingCache::new(dir.path().join("cache").join("prices.json")),
        offline_settings(),
    )
}

#[test]
fn basic_session_fixture_totals() {
    let log = TestLogger::new("basic_session_fixture_totals");
    log.phase("setup");
    let dir = TestDir::new();
    let session = install_session_fixture(&dir.path().join("logs"), "-home-dev-webapp", "session_basic");

    log.phase("execute");
    let summary = engine(&dir)
        .summarize_by_model(&Period::Session(Some(session)))
        .expect("summary");

    log.phase("verify");
    assert_eq!(summary.session_id.as_deref(), Some(BASIC_SESSION_ID));
    assert_eq!(summary.stats.entry_count, 2);
    assert_eq!(summary.stats.tokens, TokenUsage::new(3000, 300, 500, 10_000));
    assert!((summary.stats.cost_usd - BASIC_SESSION_COST).abs() < 1e-9);

    let raw_ids: Vec<&str> = summary.models.iter().map(|m| m.raw_id.as_str()).collect();
    assert_eq!(raw_ids, vec!["claude-opus-4-1-20250805", "claude-sonnet-4-5"]);
    assert!(!summary.has_estimates());
    assert_eq!(summary.by_model.len(), 2);
    log.finish_ok();
}

#[test]
fn unknown_models_are_estimated() {
    let log = TestLogger::new("unknown_models_are_estimated");
    let dir = TestDir::new();
    let session = install_session_fixture(&dir.path().join("logs"), "-home-dev-api", "session_fallback");

    let summary = engine(&dir)
        .summarize_by_model(&Period::Session(Some(session)))
        .expect("summary");

    assert_eq!(summary.stats.entry_count, 2);
    assert!(summary.has_estimates());
    assert!(summary.models.iter().all(|m| m.is_fallback));

    let mystery = summary
        .models
        .iter()
        .find(|m| m.raw_id == "mystery-model")
        .expect("mystery model listed");
    assert_eq!(mystery.pricing_key, DEFAULT_PRICING_KEY);

    let future_opus = summary
        .models
        .iter()
        .find(|m| m.raw_id == "claude-opus-5-20260101")
        .expect("opus listed");
    assert!(future_opus.pricing_key.contains("opus"));
    log.finish_ok();
}

#[test]
fn explicit_missing_session_is_an_error() {
    let dir = TestDir::new();
    let err = engine(&dir)
        .summarize(&Period::Session(Some(dir.path().join("logs/nope.jsonl"))))
        .unwrap_err();
    assert!(matches!(err, TallyError::SessionNotFound { .. }));
}

#[test]
fn missing_log_root_yields_empty_summaries() {
    let dir = TestDir::new();
    let engine = engine(&dir);

    assert!(engine.summarize(&Period::Session(None)).unwrap().is_empty());
    assert!(engine.summarize(&Period::Today).unwrap().is_empty());
    assert!(engine.context(None).unwrap().primary.is_none());
}

#[test]
fn subagents_count_toward_session_and_duplicates_collapse() {
    let log = TestLogger::new("subagents_count_toward_session_and_duplicates_collapse");
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));
    let usage = TokenUsage::new(100, 10, 0, 0);

    let main = assistant_line("m1", "r1", "claude-haiku-4-5", usage);
    let shared = assistant_line("m2", "r2", "claude-haiku-4-5", usage);
    let sub_only = assistant_line("m3", "r3", "claude-haiku-4-5", usage);
    let session = tree.session("-home-dev-cli", "sess", &[&main, &shared]);
    tree.subagent("-home-dev-cli", "sess", "agent-1", &[&shared, &sub_only]);

    let summary = engine(&dir)
        .summarize(&Period::Session(Some(session)))
        .unwrap();

    assert_eq!(summary.stats.entry_count, 3);
    assert_eq!(summary.stats.tokens.input, 300);
    log.finish_ok();
}

#[test]
fn tiered_pricing_splits_across_threshold() {
    let log = TestLogger::new("tiered_pricing_splits_across_threshold");
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));

    let first = assistant_line("m1", "r1", "claude-sonnet-4-5", TokenUsage::new(150_000, 0, 0, 0));
    let second = assistant_line("m2", "r2", "claude-sonnet-4-5", TokenUsage::new(100_000, 0, 0, 0));
    tree.session("-home-dev-big", "big", &[&first, &second]);

    let summary = engine(&dir).summarize(&Period::Session(None)).unwrap();

    // 150k base, then 50k base and 50k at 1.25x
    let expected = 150_000.0 * 3e-6 + 50_000.0 * 3e-6 + 50_000.0 * 3.75e-6;
    assert!((summary.stats.cost_usd - expected).abs() < 1e-9);
    log.finish_ok();
}

#[test]
fn today_counts_only_timestamped_entries_since_midnight() {
    let log = TestLogger::new("today_counts_only_timestamped_entries_since_midnight");
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));
    let usage = TokenUsage::new(1000, 100, 0, 0);

    let now = timestamped_line("m1", "r1", "claude-haiku-4-5", usage, Utc::now());
    let old = timestamped_line(
        "m2",
        "r2",
        "claude-haiku-4-5",
        usage,
        Utc::now() - chrono::Duration::days(40),
    );
    let untimed = assistant_line("m3", "r3", "claude-haiku-4-5", usage);
    tree.session("-home-dev-app", "s", &[&now, &old, &untimed]);

    let engine = engine(&dir);
    let today = engine.summarize(&Period::Today).unwrap();
    assert_eq!(today.stats.entry_count, 1);
    assert!(today.first_entry_at.is_some());

    let since = engine
        .summarize(&Period::Since(Utc::now() - chrono::Duration::days(60)))
        .unwrap();
    assert_eq!(since.stats.entry_count, 2);
    log.finish_ok();
}

#[test]
fn context_window_reports_fill_and_compaction() {
    let log = TestLogger::new("context_window_reports_fill_and_compaction");
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));

    let early = assistant_line("m1", "r1", "claude-sonnet-4-5", TokenUsage::new(1_000, 10, 0, 0));
    let late = assistant_line(
        "m2",
        "r2",
        "claude-sonnet-4-5",
        TokenUsage::new(20_000, 500, 10_000, 140_000),
    );
    tree.session("-home-dev-app", "ctx", &[&early, &late]);

    let report = engine(&dir).context(None).unwrap();
    let primary = report.primary.expect("primary session");

    assert_eq!(primary.session_id, "ctx");
    assert_eq!(primary.current_tokens, 170_000);
    assert_eq!(primary.max_tokens, 200_000);
    assert!(primary.near_auto_compact);
    assert!(report.subagents.is_empty());
    log.finish_ok();
}

#[test]
fn extended_marker_selects_large_window() {
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));
    let line = assistant_line("m1", "r1", "claude-sonnet-4-5[1m]", TokenUsage::new(300_000, 0, 0, 0));
    tree.session("-home-dev-app", "wide", &[&line]);

    let primary = engine(&dir).context(None).unwrap().primary.unwrap();
    assert_eq!(primary.max_tokens, 1_000_000);
    assert!(!primary.near_auto_compact);
}

#[test]
fn recent_subagents_appear_in_context_report() {
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));
    let line = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(5_000, 0, 0, 0));
    let session = tree.session("-home-dev-app", "parent", &[&line]);
    tree.subagent("-home-dev-app", "parent", "fresh", &[&line]);
    let stale = tree.subagent("-home-dev-app", "parent", "stale", &[&line]);
    set_mtime_ago(&stale, Duration::from_secs(3600));

    let report = engine(&dir).context(Some(&session)).unwrap();
    assert_eq!(report.subagents.len(), 1);
    assert!(report.subagents[0].path.ends_with("fresh.jsonl"));
}

#[test]
fn active_sessions_respect_threshold_with_fallback() {
    let log = TestLogger::new("active_sessions_respect_threshold_with_fallback");
    let dir = TestDir::new();
    let tree = LogTree::new(&dir.path().join("logs"));
    let line = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(1, 1, 0, 0));

    let fresh = tree.session("-home-dev-webapp", "a", &[&line]);
    let old = tree.session("-home-dev-tools", "b", &[&line]);
    set_mtime_ago(&old, Duration::from_secs(2 * 3600));

    let engine = engine(&dir);
    let active = engine.active_sessions(Some(Duration::from_secs(30 * 60)));
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].path, fresh);
    assert_eq!(active[0].project_label, "webapp");

    // Nothing inside the window: the newest session is still returned.
    set_mtime_ago(&fresh, Duration::from_secs(3 * 3600));
    let fallback = engine.active_sessions(Some(Duration::from_secs(60)));
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].path, old);
    log.finish_ok();
}
