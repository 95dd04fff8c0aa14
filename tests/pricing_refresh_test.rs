//! Integration tests for the pricing refresh chain against a mock price server.
//!
//! Covers:
//! - Fresh cache short-circuits the network
//! - Network success installs a live table and rewrites the cache
//! - Retry after one transient failure
//! - Stale cache and bundled fallbacks
//! - Corrupt cache removal
//! - Forced refresh and the background schedule

mod common;

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cctally::core::models::Provenance;
use cctally::core::pricing::PricingStore;
use cctally::core::pricing_refresh::{PricingRefresher, RefreshSource, RefreshSettings};
use cctally::storage::pricing_cache::{CacheLoad, PricingCache};
use cctally::test_utils::{TestDir, make_test_pricing_snapshot, set_mtime_ago};

use common::fixtures::{load_fixture, offline_settings, refresh_settings};
use common::logger::TestLogger;

const TABLE_PATH: &str = "/prices.json";

fn refresher(dir: &TestDir, settings: RefreshSettings) -> Arc<PricingRefresher> {
    let store = Arc::new(PricingStore::with_bundled());
    let cache = PricingCache::new(dir.path().join("cache").join("prices.json"));
    Arc::new(PricingRefresher::new(store, cache, settings))
}

async fn mount_table(server: &MockServer) {
    let body: serde_json::Value = load_fixture("pricing/remote_table.json");
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn table_url(server: &MockServer) -> String {
    format!("{}{TABLE_PATH}", server.uri())
}

#[tokio::test]
async fn fresh_cache_skips_network() {
    let log = TestLogger::new("fresh_cache_skips_network");
    log.phase("setup");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));
    refresher
        .cache()
        .save(&make_test_pricing_snapshot(Provenance::Live))
        .expect("seed cache");

    log.phase("execute");
    let report = refresher.refresh().await;

    log.phase("verify");
    assert_eq!(report.source, RefreshSource::FreshCache);
    assert_eq!(report.provenance, Provenance::Cached);
    assert_eq!(refresher.store().provenance(), Provenance::Cached);
    assert_eq!(report.model_count, 2);
    log.finish_ok();
}

#[tokio::test]
async fn network_success_installs_live_table_and_writes_cache() {
    let log = TestLogger::new("network_success_installs_live_table_and_writes_cache");
    let server = MockServer::start().await;
    mount_table(&server).await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));

    log.phase("execute");
    log.http_request("GET", &table_url(&server));
    let report = refresher.refresh().await;

    log.phase("verify");
    assert_eq!(report.source, RefreshSource::Network);
    assert_eq!(report.provenance, Provenance::Live);
    // sonnet, opus, haiku; the non-vendor, sample and undecodable entries are dropped
    assert_eq!(report.model_count, 3);
    assert!(report.network_error.is_none());

    let snapshot = refresher.store().snapshot();
    assert!(snapshot.is_extended("claude-sonnet-4-5"));
    assert!(!snapshot.is_extended("claude-haiku-4-5"));
    assert!(snapshot.models().get("gpt-4o").is_none());

    // Missing cache rates are derived from the input rate.
    let haiku = snapshot.pricing("claude-haiku-4-5");
    assert!((haiku.cache_write - 1.25e-6).abs() < 1e-12);
    assert!((haiku.cache_read - 1e-7).abs() < 1e-12);

    match refresher.cache().load() {
        CacheLoad::Loaded { table, .. } => {
            assert_eq!(table.models.len(), 3);
            assert!(table.extended_context.contains("claude-sonnet-4-5"));
        }
        other => panic!("expected a loaded cache, got {other:?}"),
    }
    log.finish_ok();
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    let log = TestLogger::new("transient_failure_is_retried_once");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_table(&server).await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));

    log.phase("execute");
    let report = refresher.refresh().await;

    log.phase("verify");
    assert_eq!(report.source, RefreshSource::Network);
    assert_eq!(refresher.store().provenance(), Provenance::Live);
    log.finish_ok();
}

#[tokio::test]
async fn stale_cache_used_when_network_fails() {
    let log = TestLogger::new("stale_cache_used_when_network_fails");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));
    refresher
        .cache()
        .save(&make_test_pricing_snapshot(Provenance::Live))
        .expect("seed cache");
    set_mtime_ago(refresher.cache().path(), Duration::from_secs(2 * 3600));

    log.phase("execute");
    let report = refresher.refresh().await;

    log.phase("verify");
    assert_eq!(report.source, RefreshSource::StaleCache);
    assert_eq!(report.provenance, Provenance::Cached);
    assert!(report.network_error.is_some());
    assert_eq!(refresher.store().snapshot().model_count(), 2);
    log.finish_ok();
}

#[tokio::test]
async fn offline_without_cache_uses_bundled() {
    let log = TestLogger::new("offline_without_cache_uses_bundled");
    let dir = TestDir::new();
    let refresher = refresher(&dir, offline_settings());

    let report = refresher.refresh().await;

    assert_eq!(report.source, RefreshSource::Bundled);
    assert_eq!(report.provenance, Provenance::Bundled);
    assert_eq!(report.network_error.as_deref(), Some("offline mode"));
    assert!(report.model_count > 0);
    assert!(!refresher.cache().path().exists());
    log.finish_ok();
}

#[tokio::test]
async fn corrupt_cache_is_deleted_and_bundled_used() {
    let log = TestLogger::new("corrupt_cache_is_deleted_and_bundled_used");
    let dir = TestDir::new();
    dir.create_file("cache/prices.json", "{\"this\": \"is not a price table\"");
    let refresher = refresher(&dir, offline_settings());

    let report = refresher.refresh().await;

    assert_eq!(report.source, RefreshSource::Bundled);
    assert!(!dir.file_exists("cache/prices.json"));
    log.finish_ok();
}

#[tokio::test]
async fn invalid_document_falls_back() {
    let log = TestLogger::new("invalid_document_falls_back");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "gpt-4o": {"input_cost_per_token": 2.5e-6, "output_cost_per_token": 1e-5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));

    let report = refresher.refresh().await;

    // A table with no vendor entries is not retried.
    assert_eq!(report.source, RefreshSource::Bundled);
    assert!(report.network_error.is_some());
    log.finish_ok();
}

#[tokio::test]
async fn force_refresh_bypasses_fresh_cache() {
    let log = TestLogger::new("force_refresh_bypasses_fresh_cache");
    let server = MockServer::start().await;
    mount_table(&server).await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));
    refresher
        .cache()
        .save(&make_test_pricing_snapshot(Provenance::Live))
        .expect("seed cache");

    let report = refresher.force_refresh().await;

    assert_eq!(report.source, RefreshSource::Network);
    assert_eq!(refresher.store().provenance(), Provenance::Live);
    assert_eq!(refresher.last_report(), Some(report));
    log.finish_ok();
}

/// Every scheduled pass goes to the network: the cache is never fresh.
fn scheduled_settings(server: &MockServer, interval: Duration) -> RefreshSettings {
    RefreshSettings {
        cache_max_age: Duration::ZERO,
        refresh_interval: interval,
        ..refresh_settings(&table_url(server))
    }
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..150 {
        let seen = server.received_requests().await.map_or(0, |r| r.len());
        if seen >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} requests");
}

#[tokio::test]
async fn schedule_runs_immediately_and_stops_on_cancel() {
    let log = TestLogger::new("schedule_runs_immediately_and_stops_on_cancel");
    let server = MockServer::start().await;
    let body: serde_json::Value = load_fixture("pricing/remote_table.json");
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, scheduled_settings(&server, Duration::from_millis(400)));

    log.phase("execute");
    let handle = Arc::clone(&refresher).spawn_schedule();
    for _ in 0..100 {
        if refresher.last_report().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let first = refresher.last_report().expect("initial refresh ran");

    log.phase("verify");
    assert_eq!(first.source, RefreshSource::Network);
    assert_eq!(refresher.store().provenance(), Provenance::Live);

    // The task is now sleeping out the refresh interval.
    handle.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("schedule should stop promptly");

    // Well past the interval: a cancelled sleep must not turn into one last pass.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(refresher.last_report().unwrap().finished_at, first.finished_at);
    server.verify().await;
    log.finish_ok();
}

#[tokio::test]
async fn schedule_refreshes_again_after_interval() {
    let log = TestLogger::new("schedule_refreshes_again_after_interval");
    let server = MockServer::start().await;
    mount_table(&server).await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, scheduled_settings(&server, Duration::from_millis(100)));
    let handle = Arc::clone(&refresher).spawn_schedule();

    wait_for_requests(&server, 2).await;

    handle.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("schedule should stop promptly");
    assert_eq!(refresher.last_report().unwrap().source, RefreshSource::Network);
    log.finish_ok();
}

#[tokio::test]
async fn cancel_mid_fetch_keeps_current_snapshot() {
    let log = TestLogger::new("cancel_mid_fetch_keeps_current_snapshot");
    let server = MockServer::start().await;
    let body: serde_json::Value = load_fixture("pricing/remote_table.json");
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let dir = TestDir::new();
    let refresher = refresher(&dir, refresh_settings(&table_url(&server)));

    let handle = Arc::clone(&refresher).spawn_schedule();
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("cancel should not wait for the fetch");

    assert_eq!(refresher.store().provenance(), Provenance::Bundled);
    assert!(refresher.last_report().is_none());
    assert!(!refresher.cache().path().exists());
    log.finish_ok();
}
