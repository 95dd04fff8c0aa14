//! Usage history storage layer.
//!
//! A rolling timeline of samples taken while `watch` runs: today's token and
//! cost totals next to the active session's context-window fill. The timeline
//! is independent of cost accounting; nothing reads it back into a summary.
//!
//! ## Retention
//!
//! Samples older than the retention window (default 30 days) are deleted.
//! [`HistoryStore::record_sample`] prunes opportunistically, at most once per
//! [`PRUNE_INTERVAL_HOURS`].

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use serde::Serialize;

use crate::core::models::{ContextWindowState, Provenance, SessionSummary, TokenUsage};
use crate::error::{Result, TallyError};
use crate::storage::history_schema::{DEFAULT_RETENTION_DAYS, db_error, run_migrations};

/// Minimum interval between automatic prunes (hours).
pub const PRUNE_INTERVAL_HOURS: i64 = 1;

/// Default retention window.
#[must_use]
pub const fn default_retention() -> Duration {
    Duration::from_secs(DEFAULT_RETENTION_DAYS as u64 * 86_400)
}

/// One point on the usage timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSample {
    pub recorded_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub context_tokens: u64,
    pub context_window: u64,
    pub today: TokenUsage,
    pub today_cost_usd: f64,
    pub pricing_provenance: Provenance,
}

impl UsageSample {
    /// Build a sample from today's summary and the primary session's context state.
    #[must_use]
    pub fn capture(
        today: &SessionSummary,
        context: Option<&ContextWindowState>,
        provenance: Provenance,
    ) -> Self {
        Self {
            recorded_at: Utc::now(),
            session_id: context.map(|c| c.session_id.clone()),
            context_tokens: context.map_or(0, |c| c.current_tokens),
            context_window: context.map_or(0, |c| c.max_tokens),
            today: today.stats.tokens,
            today_cost_usd: today.stats.cost_usd,
            pricing_provenance: provenance,
        }
    }
}

/// Result of a prune operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneResult {
    pub samples_deleted: usize,
    pub duration_ms: u64,
}

/// History database access layer.
pub struct HistoryStore {
    conn: Connection,
    retention: Duration,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Create or open a history database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path).map_err(|e| db_error("open history db", e))?;
        run_migrations(&mut conn)?;

        Ok(Self {
            conn,
            retention: default_retention(),
        })
    }

    /// Open an in-memory history database (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|e| db_error("open in-memory db", e))?;
        run_migrations(&mut conn)?;

        Ok(Self {
            conn,
            retention: default_retention(),
        })
    }

    /// Use a non-default retention window for automatic pruning.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Append a sample, pruning old rows if the last prune is over an hour ago.
    ///
    /// # Errors
    /// Returns an error if the INSERT fails. Prune failures are logged only.
    pub fn record_sample(&self, sample: &UsageSample) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO usage_samples ( \
                    recorded_at, session_id, context_tokens, context_window, \
                    today_input_tokens, today_output_tokens, \
                    today_cache_write_tokens, today_cache_read_tokens, \
                    today_cost_usd, pricing_provenance \
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .map_err(|e| db_error("prepare insert", e))?;

        stmt.execute(params![
            format_timestamp(sample.recorded_at),
            sample.session_id,
            to_sql_int(sample.context_tokens),
            to_sql_int(sample.context_window),
            to_sql_int(sample.today.input),
            to_sql_int(sample.today.output),
            to_sql_int(sample.today.cache_write),
            to_sql_int(sample.today.cache_read),
            sample.today_cost_usd,
            sample.pricing_provenance.as_str(),
        ])
        .map_err(|e| db_error("insert sample", e))?;

        let id = self.conn.last_insert_rowid();

        if let Err(e) = self.maybe_prune() {
            tracing::warn!(error = %e, "History prune failed");
        }

        Ok(id)
    }

    /// Samples recorded at or after `since`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn samples_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageSample>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT recorded_at, session_id, context_tokens, context_window, \
                    today_input_tokens, today_output_tokens, \
                    today_cache_write_tokens, today_cache_read_tokens, \
                    today_cost_usd, pricing_provenance \
                FROM usage_samples WHERE recorded_at >= ?1 \
                ORDER BY recorded_at ASC, id ASC",
            )
            .map_err(|e| db_error("prepare select", e))?;

        let rows = stmt
            .query_map([format_timestamp(since)], map_row)
            .map_err(|e| db_error("query samples", e))?;

        rows.map(|row| row.map_err(|e| db_error("map row", e)))
            .collect()
    }

    /// The most recent sample, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn latest(&self) -> Result<Option<UsageSample>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT recorded_at, session_id, context_tokens, context_window, \
                    today_input_tokens, today_output_tokens, \
                    today_cache_write_tokens, today_cache_read_tokens, \
                    today_cost_usd, pricing_provenance \
                FROM usage_samples ORDER BY recorded_at DESC, id DESC LIMIT 1",
            )
            .map_err(|e| db_error("prepare select", e))?;

        let mut rows = stmt
            .query_map([], map_row)
            .map_err(|e| db_error("query latest", e))?;

        rows.next()
            .transpose()
            .map_err(|e| db_error("map row", e))
    }

    /// Delete samples older than `retention` and record the prune.
    ///
    /// # Errors
    /// Returns an error if `retention` is zero or a statement fails.
    pub fn prune(&self, retention: Duration) -> Result<PruneResult> {
        if retention.is_zero() {
            return Err(TallyError::Config(
                "Retention window must be greater than 0".to_string(),
            ));
        }

        let start = Instant::now();
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| TallyError::Config(format!("Retention window out of range: {e}")))?;
        let cutoff = Utc::now() - retention;

        let deleted = self
            .conn
            .execute(
                "DELETE FROM usage_samples WHERE recorded_at < ?1",
                [format_timestamp(cutoff)],
            )
            .map_err(|e| db_error("delete old samples", e))?;

        let result = PruneResult {
            samples_deleted: deleted,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.record_prune(&result)?;

        tracing::debug!(deleted, cutoff = %cutoff, "Pruned usage history");
        Ok(result)
    }

    /// Prune with the configured retention if the last prune is old enough.
    ///
    /// # Errors
    /// Returns an error if pruning fails.
    pub fn maybe_prune(&self) -> Result<Option<PruneResult>> {
        let due = self.last_prune_time().is_none_or(|last| {
            (Utc::now() - last).num_hours() >= PRUNE_INTERVAL_HOURS
        });

        if due {
            self.prune(self.retention).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Number of stored samples.
    ///
    /// # Errors
    /// Returns an error if the COUNT query fails.
    pub fn sample_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM usage_samples", [], |row| row.get(0))
            .map_err(|e| db_error("count samples", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn last_prune_time(&self) -> Option<DateTime<Utc>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT pruned_at FROM prune_history ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();

        value.and_then(|s| parse_timestamp(&s))
    }

    fn record_prune(&self, result: &PruneResult) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO prune_history (pruned_at, samples_deleted, duration_ms) \
                 VALUES (?1, ?2, ?3)",
                params![
                    format_timestamp(Utc::now()),
                    i64::try_from(result.samples_deleted).unwrap_or(i64::MAX),
                    to_sql_int(result.duration_ms),
                ],
            )
            .map_err(|e| db_error("record prune", e))?;
        Ok(())
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<UsageSample> {
    let recorded_at: String = row.get(0)?;
    let recorded_at = parse_timestamp(&recorded_at).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{recorded_at}'").into(),
        )
    })?;
    let provenance: String = row.get(9)?;

    Ok(UsageSample {
        recorded_at,
        session_id: row.get(1)?,
        context_tokens: from_sql_int(row.get(2)?),
        context_window: from_sql_int(row.get(3)?),
        today: TokenUsage::new(
            from_sql_int(row.get(4)?),
            from_sql_int(row.get(5)?),
            from_sql_int(row.get(6)?),
            from_sql_int(row.get(7)?),
        ),
        today_cost_usd: row.get(8)?,
        pricing_provenance: Provenance::parse(&provenance).unwrap_or(Provenance::Bundled),
    })
}

/// Fixed-width UTC timestamps so that text comparison in SQL orders by time.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
