//! Pricing refresh pipeline.
//!
//! Repopulates the [`PricingStore`] by trying, in order:
//!
//! 1. the local cache file, if younger than the freshness window;
//! 2. the remote price table, retried once after a fixed delay;
//! 3. the local cache file regardless of age;
//! 4. the bundled table loaded at startup.
//!
//! None of these failures escape: the outcome shows up as the store's provenance.
//! A new snapshot is installed only once it is complete, so cancelling a refresh at
//! any await point leaves the previous table in place.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::http::{build_client, fetch_json_with_timeout};
use crate::core::models::Provenance;
use crate::core::pricing::{EXTENDED_CONTEXT_MIN_TOKENS, ModelPricing, PricingSnapshot, PricingStore};
use crate::error::{Result, TallyError};
use crate::storage::pricing_cache::{CacheLoad, DecodedTable, PricingCache};

/// Remote price table.
pub const DEFAULT_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// Only remote keys containing this token are decoded.
pub const VENDOR_TOKEN: &str = "claude";

pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache-write rate as a multiple of the input rate when the remote entry omits it.
const CACHE_WRITE_INPUT_RATIO: f64 = 1.25;
/// Cache-read rate as a multiple of the input rate when the remote entry omits it.
const CACHE_READ_INPUT_RATIO: f64 = 0.1;

/// Knobs for the refresh pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    pub url: String,
    pub cache_max_age: Duration,
    pub retry_delay: Duration,
    pub refresh_interval: Duration,
    pub timeout: Duration,
    /// Skip the network step entirely.
    pub offline: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_PRICING_URL.to_string(),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            retry_delay: DEFAULT_RETRY_DELAY,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            timeout: DEFAULT_FETCH_TIMEOUT,
            offline: false,
        }
    }
}

// =============================================================================
// Remote table parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    input_cost_per_token: f64,
    output_cost_per_token: f64,
    cache_creation_input_token_cost: Option<f64>,
    cache_read_input_token_cost: Option<f64>,
    max_tokens: Option<f64>,
    max_input_tokens: Option<f64>,
}

impl RemoteEntry {
    fn pricing(&self) -> ModelPricing {
        ModelPricing {
            input: self.input_cost_per_token,
            output: self.output_cost_per_token,
            cache_write: self
                .cache_creation_input_token_cost
                .unwrap_or(self.input_cost_per_token * CACHE_WRITE_INPUT_RATIO),
            cache_read: self
                .cache_read_input_token_cost
                .unwrap_or(self.input_cost_per_token * CACHE_READ_INPUT_RATIO),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_extended_context(&self) -> bool {
        self.max_input_tokens
            .or(self.max_tokens)
            .is_some_and(|max| max >= EXTENDED_CONTEXT_MIN_TOKENS as f64)
    }
}

/// Accepted vendor entries of a remote table.
#[derive(Debug, Clone, Default)]
pub struct RemoteTable {
    pub models: HashMap<String, ModelPricing>,
    pub extended_context: HashSet<String>,
    /// Vendor entries that failed to decode.
    pub skipped: usize,
}

/// Decode the vendor's entries one at a time, skipping any that do not fit.
///
/// # Errors
///
/// `ParseResponse` when the document is not an object or no vendor entry decodes.
pub fn parse_remote_table(document: &Value) -> Result<RemoteTable> {
    let Some(entries) = document.as_object() else {
        return Err(TallyError::ParseResponse(
            "price table is not a JSON object".to_string(),
        ));
    };

    let mut table = RemoteTable::default();
    for (key, raw) in entries {
        let key = key.to_lowercase();
        if !key.contains(VENDOR_TOKEN) {
            continue;
        }
        let entry = match RemoteEntry::deserialize(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Skipping remote price entry");
                table.skipped += 1;
                continue;
            }
        };
        let pricing = entry.pricing();
        if !pricing.is_valid() {
            tracing::debug!(key = %key, "Skipping remote price entry with invalid rates");
            table.skipped += 1;
            continue;
        }
        if entry.is_extended_context() {
            table.extended_context.insert(key.clone());
        }
        table.models.insert(key, pricing);
    }

    if table.models.is_empty() {
        return Err(TallyError::ParseResponse(format!(
            "no usable '{VENDOR_TOKEN}' entries in price table"
        )));
    }
    Ok(table)
}

// =============================================================================
// Refresh outcome
// =============================================================================

/// Which step of the chain supplied the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshSource {
    FreshCache,
    Network,
    StaleCache,
    Bundled,
}

impl RefreshSource {
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        match self {
            Self::FreshCache | Self::StaleCache => Provenance::Cached,
            Self::Network => Provenance::Live,
            Self::Bundled => Provenance::Bundled,
        }
    }
}

/// Result of one pass through the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub source: RefreshSource,
    pub provenance: Provenance,
    pub model_count: usize,
    pub finished_at: DateTime<Utc>,
    /// Why the network step failed, when it was tried and failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_error: Option<String>,
}

// =============================================================================
// Refresher
// =============================================================================

/// Runs the fallback chain against one store and one cache file.
#[derive(Debug)]
pub struct PricingRefresher {
    store: Arc<PricingStore>,
    cache: PricingCache,
    settings: RefreshSettings,
    client: Option<Client>,
    in_flight: tokio::sync::Mutex<()>,
    last_report: Mutex<Option<RefreshReport>>,
}

impl PricingRefresher {
    #[must_use]
    pub fn new(store: Arc<PricingStore>, cache: PricingCache, settings: RefreshSettings) -> Self {
        let client = match build_client(settings.timeout) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "HTTP client unavailable; pricing stays offline");
                None
            }
        };
        Self {
            store,
            cache,
            settings,
            client,
            in_flight: tokio::sync::Mutex::new(()),
            last_report: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PricingStore> {
        &self.store
    }

    #[must_use]
    pub fn cache(&self) -> &PricingCache {
        &self.cache
    }

    #[must_use]
    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// The most recent completed pass, if any.
    #[must_use]
    pub fn last_report(&self) -> Option<RefreshReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the full chain, starting with the fresh-cache check.
    pub async fn refresh(&self) -> RefreshReport {
        self.run_chain(false).await
    }

    /// Run the chain without accepting a fresh cache, so the network is tried first.
    pub async fn force_refresh(&self) -> RefreshReport {
        self.run_chain(true).await
    }

    async fn run_chain(&self, skip_fresh_cache: bool) -> RefreshReport {
        // One pass at a time; a second caller waits and then runs its own pass.
        let _guard = self.in_flight.lock().await;

        let cached = self.load_cache().await;

        if !skip_fresh_cache {
            if let Some((table, age, modified_at)) = &cached {
                if *age < self.settings.cache_max_age {
                    return self.finish(
                        RefreshSource::FreshCache,
                        cached_snapshot(table, *modified_at),
                        None,
                    );
                }
            }
        }

        let network_error = if self.settings.offline {
            tracing::debug!("Offline mode; skipping price table download");
            Some("offline mode".to_string())
        } else {
            match self.fetch_with_retry().await {
                Ok(remote) => {
                    let snapshot = PricingSnapshot::new(
                        remote.models,
                        Some(remote.extended_context),
                        Provenance::Live,
                        Utc::now(),
                    );
                    self.save_cache(&snapshot).await;
                    return self.finish(RefreshSource::Network, snapshot, None);
                }
                Err(e) => Some(e.to_string()),
            }
        };

        if let Some((table, _, modified_at)) = &cached {
            return self.finish(
                RefreshSource::StaleCache,
                cached_snapshot(table, *modified_at),
                network_error,
            );
        }

        self.store.reset_to_baseline();
        let report = RefreshReport {
            source: RefreshSource::Bundled,
            provenance: Provenance::Bundled,
            model_count: self.store.snapshot().model_count(),
            finished_at: Utc::now(),
            network_error,
        };
        tracing::info!(
            models = report.model_count,
            reason = report.network_error.as_deref().unwrap_or(""),
            "Using bundled price table"
        );
        self.remember(report)
    }

    fn finish(
        &self,
        source: RefreshSource,
        snapshot: PricingSnapshot,
        network_error: Option<String>,
    ) -> RefreshReport {
        let report = RefreshReport {
            source,
            provenance: snapshot.provenance,
            model_count: snapshot.model_count(),
            finished_at: Utc::now(),
            network_error,
        };
        self.store.install(snapshot);
        tracing::info!(
            source = ?report.source,
            provenance = %report.provenance,
            models = report.model_count,
            "Price table refreshed"
        );
        self.remember(report)
    }

    fn remember(&self, report: RefreshReport) -> RefreshReport {
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }

    async fn load_cache(&self) -> Option<(DecodedTable, Duration, DateTime<Utc>)> {
        let cache = self.cache.clone();
        let load = tokio::task::spawn_blocking(move || cache.load())
            .await
            .unwrap_or(CacheLoad::Missing);
        match load {
            CacheLoad::Loaded {
                table,
                age,
                modified_at,
            } if !table.models.is_empty() => Some((table, age, modified_at)),
            _ => None,
        }
    }

    async fn save_cache(&self, snapshot: &PricingSnapshot) {
        let cache = self.cache.clone();
        let snapshot = snapshot.clone();
        let saved = tokio::task::spawn_blocking(move || cache.save(&snapshot)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to write pricing cache"),
            Err(e) => tracing::warn!(error = %e, "Pricing cache writer panicked"),
        }
    }

    /// Download and parse the remote table, retrying once on a transient failure.
    ///
    /// # Errors
    ///
    /// The last failure when both attempts fail, or the first non-transient one.
    pub async fn fetch_with_retry(&self) -> Result<RemoteTable> {
        match self.fetch_once().await {
            Ok(table) => Ok(table),
            Err(e) if e.is_retryable() => {
                tracing::info!(
                    error = %e,
                    retry_in = ?self.settings.retry_delay,
                    "Price table download failed; retrying once"
                );
                tokio::time::sleep(self.settings.retry_delay).await;
                self.fetch_once().await
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_once(&self) -> Result<RemoteTable> {
        let Some(client) = &self.client else {
            return Err(TallyError::Network("HTTP client unavailable".to_string()));
        };
        let document: Value =
            fetch_json_with_timeout(client, &self.settings.url, self.settings.timeout).await?;
        let table = parse_remote_table(&document)?;
        tracing::debug!(
            url = %self.settings.url,
            models = table.models.len(),
            extended = table.extended_context.len(),
            skipped = table.skipped,
            "Downloaded price table"
        );
        Ok(table)
    }

    /// Refresh now, then every `refresh_interval`, until the handle is cancelled.
    #[must_use]
    pub fn spawn_schedule(self: Arc<Self>) -> RefreshHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let interval = self.settings.refresh_interval;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = wait_cancelled(&mut cancel_rx) => break,
                    _ = self.refresh() => {}
                }
                tokio::select! {
                    biased;
                    () = wait_cancelled(&mut cancel_rx) => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!("Pricing refresh schedule stopped");
        });

        RefreshHandle {
            cancel: cancel_tx,
            task: Some(task),
        }
    }
}

fn cached_snapshot(table: &DecodedTable, modified_at: DateTime<Utc>) -> PricingSnapshot {
    PricingSnapshot::new(
        table.models.clone(),
        Some(table.extended_context.clone()),
        Provenance::Cached,
        table.updated_at.unwrap_or(modified_at),
    )
}

/// Resolves once cancellation is requested or the sender is gone.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

// =============================================================================
// Schedule handle
// =============================================================================

/// Owner of the background refresh task. Dropping it cancels the schedule.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Ask the task to stop at its next await point.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Pricing refresh task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}
