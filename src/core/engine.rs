//! Consumer-facing queries over session logs and the pricing store.
//!
//! `UsageEngine` wires one [`PricingStore`] to both the [`LogAggregator`] that reads
//! it and the [`PricingRefresher`] that replaces its snapshot, so every query sees
//! whichever table the last refresh installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};

use crate::core::aggregator::LogAggregator;
use crate::core::models::{
    ActiveSession, ContextReport, ModelIdentifier, PricingStatus, SessionSummary,
};
use crate::core::pricing::{ModelPricing, PricingStore, TieredModelPricing};
use crate::core::pricing_refresh::{PricingRefresher, RefreshHandle, RefreshReport, RefreshSettings};
use crate::core::session_logs::SessionLogFinder;
use crate::error::Result;
use crate::storage::config::ResolvedConfig;
use crate::storage::paths::AppPaths;
use crate::storage::pricing_cache::PricingCache;

/// Default activity threshold for [`UsageEngine::active_sessions`].
pub const DEFAULT_ACTIVE_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Default recency cut-off for sub-agents in [`UsageEngine::context`].
pub const DEFAULT_SUBAGENT_RECENCY: Duration = Duration::from_secs(10 * 60);

/// What a summary covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    /// One session and its sub-agents; latest session when `None`.
    Session(Option<PathBuf>),
    /// Since local midnight.
    Today,
    /// Since Monday 00:00 local time.
    Week,
    /// Since the first of the month, 00:00 local time.
    Month,
    /// Since an explicit instant.
    Since(DateTime<Utc>),
}

impl Period {
    /// Lower bound for time-bounded periods, `None` for sessions.
    #[must_use]
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start_at(&Local::now())
    }

    /// Lower bound relative to `now` in `now`'s time zone.
    #[must_use]
    pub fn start_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        match self {
            Self::Session(_) => None,
            Self::Since(at) => Some(*at),
            Self::Today => Some(local_midnight(now, today)),
            Self::Week => {
                let monday =
                    today - chrono::Duration::days(i64::from(today.weekday().num_days_from_monday()));
                Some(local_midnight(now, monday))
            }
            Self::Month => {
                let first = today.with_day(1).unwrap_or(today);
                Some(local_midnight(now, first))
            }
        }
    }

    /// Short label used as the command name in output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Session(_) => "session",
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Since(_) => "since",
        }
    }
}

/// Midnight starting `day` in `now`'s zone. When midnight does not exist (a DST gap)
/// the instant that many wall-clock hours before `now` is used.
fn local_midnight<Tz: TimeZone>(now: &DateTime<Tz>, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(chrono::NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map_or_else(
            || now.with_timezone(&Utc) - (now.naive_local() - naive),
            |dt| dt.with_timezone(&Utc),
        )
}

/// Usage queries, pricing lookups, and the refresh schedule behind one handle.
#[derive(Debug, Clone)]
pub struct UsageEngine {
    aggregator: LogAggregator,
    store: Arc<PricingStore>,
    refresher: Arc<PricingRefresher>,
    active_window: Duration,
    subagent_recency: Duration,
}

impl UsageEngine {
    /// Build from resolved configuration. The store starts on the bundled table;
    /// call [`UsageEngine::prepare_pricing`] to run the fallback chain.
    #[must_use]
    pub fn new(config: &ResolvedConfig, paths: &AppPaths) -> Self {
        Self::from_parts(
            SessionLogFinder::with_root(config.log_root.clone()),
            PricingCache::new(paths.pricing_cache_file()),
            config.pricing.clone(),
        )
        .with_windows(config.active_window, config.subagent_recency)
    }

    /// Build from explicit parts.
    #[must_use]
    pub fn from_parts(finder: SessionLogFinder, cache: PricingCache, settings: RefreshSettings) -> Self {
        let store = Arc::new(PricingStore::with_bundled());
        let aggregator = LogAggregator::new(finder, Arc::clone(&store));
        let refresher = Arc::new(PricingRefresher::new(Arc::clone(&store), cache, settings));
        Self {
            aggregator,
            store,
            refresher,
            active_window: DEFAULT_ACTIVE_WINDOW,
            subagent_recency: DEFAULT_SUBAGENT_RECENCY,
        }
    }

    #[must_use]
    pub const fn with_windows(mut self, active_window: Duration, subagent_recency: Duration) -> Self {
        self.active_window = active_window;
        self.subagent_recency = subagent_recency;
        self
    }

    #[must_use]
    pub const fn aggregator(&self) -> &LogAggregator {
        &self.aggregator
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<PricingStore> {
        &self.store
    }

    #[must_use]
    pub const fn refresher(&self) -> &Arc<PricingRefresher> {
        &self.refresher
    }

    #[must_use]
    pub fn log_root(&self) -> &Path {
        self.aggregator.finder().root()
    }

    /// Run the fallback chain once, accepting a fresh cache.
    pub async fn prepare_pricing(&self) -> RefreshReport {
        self.refresher.refresh().await
    }

    /// Summary without the per-model breakdown.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an explicit session path that does not exist, or a
    /// read failure on it.
    pub fn summarize(&self, period: &Period) -> Result<SessionSummary> {
        let mut summary = self.summarize_by_model(period)?;
        summary.by_model.clear();
        Ok(summary)
    }

    /// Summary including the per-pricing-key breakdown.
    ///
    /// # Errors
    ///
    /// See [`UsageEngine::summarize`].
    pub fn summarize_by_model(&self, period: &Period) -> Result<SessionSummary> {
        match period {
            Period::Session(path) => self.aggregator.summarize_session(path.as_deref()),
            other => {
                let since = other.start().unwrap_or_else(Utc::now);
                Ok(self.aggregator.summarize_since(since))
            }
        }
    }

    /// Off-runtime variant of [`UsageEngine::summarize_by_model`].
    ///
    /// # Errors
    ///
    /// See [`UsageEngine::summarize`]; a panicked worker maps to `Other`.
    pub async fn summarize_blocking(&self, period: Period) -> Result<SessionSummary> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.summarize_by_model(&period))
            .await
            .map_err(|e| crate::error::TallyError::Other(anyhow::anyhow!("summary task failed: {e}")))?
    }

    #[must_use]
    pub fn pricing_for_model(&self, raw_id: &str) -> (ModelIdentifier, ModelPricing) {
        self.store.pricing_for_model(raw_id)
    }

    #[must_use]
    pub fn tiered_pricing_for_model(&self, raw_id: &str) -> (ModelIdentifier, TieredModelPricing) {
        self.store.tiered_pricing_for_model(raw_id)
    }

    /// Where the active table came from and how old the cache file is.
    #[must_use]
    pub fn pricing_status(&self) -> PricingStatus {
        let snapshot = self.store.snapshot();
        let cache = self.refresher.cache();
        PricingStatus {
            provenance: snapshot.provenance,
            updated_at: snapshot.updated_at,
            model_count: snapshot.model_count(),
            extended_context_count: snapshot.extended_context_keys().len(),
            cache_path: Some(cache.path().to_path_buf()),
            cache_age_secs: cache.age().map(|age| age.as_secs()),
        }
    }

    /// Refresh from the network even if the cache is fresh.
    pub async fn refresh_pricing(&self) -> RefreshReport {
        self.refresher.force_refresh().await
    }

    /// Start the periodic refresh task. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start_refresh_schedule(&self) -> RefreshHandle {
        Arc::clone(&self.refresher).spawn_schedule()
    }

    /// Context-window state for a session (latest when `None`) and its recent sub-agents.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for a missing explicit path, or a read failure on it.
    pub fn context(&self, session_file: Option<&Path>) -> Result<ContextReport> {
        self.aggregator
            .context_report(session_file, self.subagent_recency)
    }

    /// Sessions written within `threshold` (the configured window when `None`).
    #[must_use]
    pub fn active_sessions(&self, threshold: Option<Duration>) -> Vec<ActiveSession> {
        self.aggregator
            .active_sessions(threshold.unwrap_or(self.active_window))
    }
}
