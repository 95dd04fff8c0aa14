//! Log aggregation: parsing, deduplication, pricing, and context-window state.
//!
//! One aggregation pass owns its dedup set and its per-pricing-key cumulative
//! token counters. Files are read in a fixed order and lines in file order, so the
//! tiered cost of a pass over unchanged logs is reproducible.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::models::{
    ActiveSession, ContextReport, ContextWindowState, LogEntry, SessionSummary, TokenStats,
    TokenUsage,
};
use crate::core::pricing::{PricingSnapshot, PricingStore};
use crate::core::session_logs::{SessionLogFinder, SessionLogPath, file_modified_at, session_id_from_path};
use crate::error::Result;

/// Placeholder model id the assistant writes for turns it generated itself.
pub const SYNTHETIC_MODEL: &str = "<synthetic>";

/// Context window of a standard session.
pub const BASE_CONTEXT_WINDOW: u64 = 200_000;

/// Context window of a session running an extended-context variant.
pub const EXTENDED_CONTEXT_WINDOW: u64 = 1_000_000;

/// Raw model id suffix that selects the extended window.
pub const EXTENDED_CONTEXT_MARKER: &str = "[1m]";

/// Fraction of the window at which the assistant compacts history.
pub const AUTO_COMPACT_RATIO: f64 = 0.8;

// =============================================================================
// Line parsing
// =============================================================================

/// Parse one log line. `None` for blank lines, invalid JSON, and non-objects.
#[must_use]
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(line).ok()?;
    if !value.is_object() {
        return None;
    }

    let message = value.get("message").filter(|m| m.is_object());
    let field = |key: &str| message.and_then(|m| m.get(key)).or_else(|| value.get(key));

    Some(LogEntry {
        session_id: non_empty_str(value.get("sessionId")),
        timestamp: value.get("timestamp").and_then(parse_timestamp),
        model: non_empty_str(field("model")),
        usage: field("usage").and_then(extract_usage),
        cost_usd: value
            .get("costUSD")
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite() && *c >= 0.0),
        message_id: non_empty_str(message.and_then(|m| m.get("id"))),
        request_id: non_empty_str(value.get("requestId").or_else(|| value.get("request_id"))),
        cwd: non_empty_str(value.get("cwd")),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn extract_usage(value: &Value) -> Option<TokenUsage> {
    if !value.is_object() {
        return None;
    }
    let input = first_u64(value, &["input_tokens"]);
    let output = first_u64(value, &["output_tokens"]);
    let cache_write = first_u64(value, &["cache_creation_input_tokens"]);
    let cache_read = first_u64(value, &["cache_read_input_tokens"]);

    if input.is_none() && output.is_none() && cache_write.is_none() && cache_read.is_none() {
        return None;
    }
    Some(TokenUsage::new(
        input.unwrap_or(0),
        output.unwrap_or(0),
        cache_write.unwrap_or(0),
        cache_read.unwrap_or(0),
    ))
}

fn first_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_u64))
}

/// RFC 3339 string, or epoch seconds / milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(num) => {
            let raw = num.as_i64()?;
            if raw > 1_000_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

/// Entries of one file plus the session id it declares.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    /// First `sessionId` found in the file.
    pub session_id: Option<String>,
    pub entries: Vec<LogEntry>,
    pub skipped_lines: usize,
}

/// Read a log file, skipping lines that do not parse.
///
/// # Errors
///
/// When the file cannot be opened or a read fails midway.
pub fn read_log(path: &Path) -> Result<ParsedLog> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut parsed = ParsedLog::default();
    for line in reader.split(b'\n') {
        let line = line?;
        let Ok(line) = std::str::from_utf8(&line) else {
            parsed.skipped_lines += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(entry) => {
                if parsed.session_id.is_none() {
                    parsed.session_id.clone_from(&entry.session_id);
                }
                parsed.entries.push(entry);
            }
            None => parsed.skipped_lines += 1,
        }
    }

    if parsed.skipped_lines > 0 {
        tracing::debug!(path = %path.display(), skipped = parsed.skipped_lines, "Skipped unparseable log lines");
    }
    Ok(parsed)
}

// =============================================================================
// Accounting pass
// =============================================================================

/// State of one aggregation pass.
struct Pass<'a> {
    snapshot: &'a PricingSnapshot,
    since: Option<DateTime<Utc>>,
    seen: HashSet<(String, String)>,
    cumulative: HashMap<String, u64>,
    summary: SessionSummary,
    duplicates: usize,
}

impl<'a> Pass<'a> {
    fn new(snapshot: &'a PricingSnapshot, since: Option<DateTime<Utc>>, session_id: Option<String>) -> Self {
        Self {
            snapshot,
            since,
            seen: HashSet::new(),
            cumulative: HashMap::new(),
            summary: SessionSummary::empty(session_id),
            duplicates: 0,
        }
    }

    fn in_window(&self, entry: &LogEntry) -> bool {
        match self.since {
            None => true,
            Some(since) => entry.timestamp.is_some_and(|ts| ts >= since),
        }
    }

    fn account_file(&mut self, parsed: &ParsedLog) {
        for entry in &parsed.entries {
            self.account(entry);
        }
    }

    fn account(&mut self, entry: &LogEntry) {
        let Some(usage) = entry.usage else {
            return;
        };
        if entry.model.as_deref() == Some(SYNTHETIC_MODEL) || !self.in_window(entry) {
            return;
        }
        if let Some((message_id, request_id)) = entry.dedup_key() {
            if !self
                .seen
                .insert((message_id.to_string(), request_id.to_string()))
            {
                self.duplicates += 1;
                return;
            }
        }

        let id = self.snapshot.resolve(entry.model.as_deref().unwrap_or_default());
        let prior = self.cumulative.get(&id.pricing_key).copied().unwrap_or(0);
        let cost = entry.cost_usd.unwrap_or_else(|| {
            self.snapshot
                .tiered_pricing(&id.pricing_key)
                .cost_for(&usage, prior)
        });
        *self.cumulative.entry(id.pricing_key.clone()).or_insert(0) += usage.input_side();

        let stats = TokenStats::single(usage, cost);
        self.summary.stats += stats;
        let breakdown = self.summary.by_model.entry(id.pricing_key.clone()).or_default();
        breakdown.stats += stats;
        breakdown.is_fallback |= id.is_fallback;

        if let Some(ts) = entry.timestamp {
            self.summary.record_timestamp(ts);
        }
        if entry.model.is_some() {
            self.summary.models.insert(id);
        }
    }

    fn finish(self) -> SessionSummary {
        if self.duplicates > 0 {
            tracing::debug!(duplicates = self.duplicates, "Dropped duplicate log entries");
        }
        self.summary
    }
}

fn read_or_skip(log: &SessionLogPath) -> Option<ParsedLog> {
    match read_log(&log.path) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(path = %log.path.display(), error = %e, "Skipping unreadable log file");
            None
        }
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Token and cost views over a log root, priced against a [`PricingStore`].
#[derive(Debug, Clone)]
pub struct LogAggregator {
    finder: SessionLogFinder,
    store: Arc<PricingStore>,
}

impl LogAggregator {
    #[must_use]
    pub fn new(finder: SessionLogFinder, store: Arc<PricingStore>) -> Self {
        Self { finder, store }
    }

    #[must_use]
    pub fn finder(&self) -> &SessionLogFinder {
        &self.finder
    }

    /// Totals for one session: the session file plus its sub-agent files.
    ///
    /// Uses the latest session when `session_file` is `None`; with no sessions at all
    /// the summary is empty.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` when an explicit path does not exist.
    pub fn summarize_session(&self, session_file: Option<&Path>) -> Result<SessionSummary> {
        let log = match session_file {
            Some(path) => self.finder.session_at(path)?,
            None => match self.finder.latest_session() {
                Some(log) => log,
                None => return Ok(SessionSummary::empty(None)),
            },
        };

        let snapshot = self.store.snapshot();
        let primary = read_log(&log.path)?;
        let session_id = primary
            .session_id
            .clone()
            .unwrap_or_else(|| log.session_id.clone());

        let mut pass = Pass::new(&snapshot, None, Some(session_id));
        pass.account_file(&primary);
        for sub in self.finder.subagent_logs(&log.path) {
            if let Some(parsed) = read_or_skip(&sub) {
                pass.account_file(&parsed);
            }
        }
        Ok(pass.finish())
    }

    /// Totals for every entry timestamped at or after `since`, across all files.
    ///
    /// Files modified before `since` are not opened; entries inside opened files are
    /// still filtered by their own timestamps.
    #[must_use]
    pub fn summarize_since(&self, since: DateTime<Utc>) -> SessionSummary {
        let snapshot = self.store.snapshot();
        let mut pass = Pass::new(&snapshot, Some(since), None);
        for log in self.finder.modified_since(since) {
            if let Some(parsed) = read_or_skip(&log) {
                pass.account_file(&parsed);
            }
        }
        pass.finish()
    }

    /// Context-window state from the most recent usage-bearing line of one file.
    ///
    /// # Errors
    ///
    /// When the file cannot be read.
    pub fn context_window(&self, path: &Path) -> Result<ContextWindowState> {
        let content = std::fs::read(path)?;
        let snapshot = self.store.snapshot();

        // One reverse pass: the first usage-bearing entry seen is the latest, and
        // the last session id seen is the file's first.
        let mut latest: Option<LogEntry> = None;
        let mut first_session_id = None;
        for entry in content
            .split(|byte| *byte == b'\n')
            .rev()
            .filter_map(|line| std::str::from_utf8(line).ok())
            .filter_map(parse_line)
        {
            if entry.session_id.is_some() {
                first_session_id.clone_from(&entry.session_id);
            }
            if latest.is_none()
                && entry.usage.is_some()
                && entry.model.as_deref() != Some(SYNTHETIC_MODEL)
            {
                latest = Some(entry);
            }
        }
        let session_id = first_session_id.unwrap_or_else(|| session_id_from_path(path));

        let current_tokens = latest
            .as_ref()
            .and_then(|e| e.usage)
            .map_or(0, |usage| usage.input_side());
        let raw_model = latest.as_ref().and_then(|e| e.model.as_deref());
        let max_tokens = context_window_size(raw_model, current_tokens);

        Ok(ContextWindowState {
            path: path.to_path_buf(),
            session_id,
            current_tokens,
            model: raw_model.map(|raw| snapshot.resolve(raw)),
            max_tokens,
            near_auto_compact: is_near_auto_compact(current_tokens, max_tokens),
            last_entry_at: latest.and_then(|e| e.timestamp),
            modified_at: file_modified_at(path),
        })
    }

    /// Context state for a session (latest when `None`) plus its sub-agents
    /// modified within `subagent_recency`, most recent first.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for a missing explicit path, or a read failure on it.
    pub fn context_report(
        &self,
        session_file: Option<&Path>,
        subagent_recency: Duration,
    ) -> Result<ContextReport> {
        let log = match session_file {
            Some(path) => self.finder.session_at(path)?,
            None => match self.finder.latest_session() {
                Some(log) => log,
                None => return Ok(ContextReport::default()),
            },
        };

        let primary = self.context_window(&log.path)?;
        let subagents = self
            .finder
            .recent_subagent_logs(&log.path, subagent_recency)
            .into_iter()
            .filter_map(|sub| match self.context_window(&sub.path) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::debug!(path = %sub.path.display(), error = %e, "Skipping sub-agent log");
                    None
                }
            })
            .collect();

        Ok(ContextReport {
            primary: Some(primary),
            subagents,
        })
    }

    /// See [`SessionLogFinder::active_sessions`].
    #[must_use]
    pub fn active_sessions(&self, threshold: Duration) -> Vec<ActiveSession> {
        self.finder.active_sessions(threshold)
    }
}

/// Base window unless the model id asks for the extended one or usage already
/// exceeds the base window.
#[must_use]
pub fn context_window_size(raw_model: Option<&str>, current_tokens: u64) -> u64 {
    let marked = raw_model.is_some_and(|m| m.to_lowercase().contains(EXTENDED_CONTEXT_MARKER));
    if marked || current_tokens > BASE_CONTEXT_WINDOW {
        EXTENDED_CONTEXT_WINDOW
    } else {
        BASE_CONTEXT_WINDOW
    }
}

#[allow(clippy::cast_precision_loss)]
fn is_near_auto_compact(current_tokens: u64, max_tokens: u64) -> bool {
    max_tokens > 0 && current_tokens as f64 >= max_tokens as f64 * AUTO_COMPACT_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Provenance;
    use crate::core::pricing::ModelPricing;
    use crate::test_utils::{LogTree, assistant_line, set_mtime_ago};
    use std::collections::HashMap as Map;
    use tempfile::TempDir;

    const SONNET: ModelPricing = ModelPricing::per_million(3.0, 15.0, 3.75, 0.30);
    const HAIKU: ModelPricing = ModelPricing::per_million(1.0, 5.0, 1.25, 0.10);

    fn store() -> Arc<PricingStore> {
        let mut models = Map::new();
        models.insert("claude-sonnet-4-5".to_string(), SONNET);
        models.insert("claude-haiku-4-5".to_string(), HAIKU);
        Arc::new(PricingStore::new(PricingSnapshot::new(
            models,
            Some(HashSet::from(["claude-sonnet-4-5".to_string()])),
            Provenance::Bundled,
            Utc::now(),
        )))
    }

    fn aggregator(root: &Path) -> LogAggregator {
        LogAggregator::new(SessionLogFinder::with_root(root), store())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // =========================================================================
    // Line parsing
    // =========================================================================

    #[test]
    fn parse_line_reads_nested_message() {
        let line = r#"{"sessionId":"s-1","timestamp":"2026-01-18T12:00:00Z","requestId":"req_1","cwd":"/w/app","message":{"id":"msg_1","model":"claude-haiku-4-5","usage":{"input_tokens":10,"output_tokens":20,"cache_creation_input_tokens":30,"cache_read_input_tokens":40}}}"#;
        let entry = parse_line(line).unwrap();
        assert_eq!(entry.session_id.as_deref(), Some("s-1"));
        assert_eq!(entry.model.as_deref(), Some("claude-haiku-4-5"));
        assert_eq!(entry.usage, Some(TokenUsage::new(10, 20, 30, 40)));
        assert_eq!(entry.dedup_key(), Some(("msg_1", "req_1")));
        assert_eq!(entry.cwd.as_deref(), Some("/w/app"));
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn parse_line_accepts_top_level_fields_and_epoch_millis() {
        let line = r#"{"model":"opus","usage":{"input_tokens":5},"timestamp":1768737600000,"request_id":"r","costUSD":0.5}"#;
        let entry = parse_line(line).unwrap();
        assert_eq!(entry.model.as_deref(), Some("opus"));
        assert_eq!(entry.usage, Some(TokenUsage::new(5, 0, 0, 0)));
        assert_eq!(entry.cost_usd, Some(0.5));
        assert_eq!(entry.request_id.as_deref(), Some("r"));
        assert_eq!(entry.timestamp.unwrap().timestamp(), 1_768_737_600);
    }

    #[test]
    fn parse_line_rejects_junk() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line("[1,2]").is_none());
        assert!(parse_line("42").is_none());
        let no_usage = parse_line(r#"{"type":"summary","usage":"n/a"}"#).unwrap();
        assert!(no_usage.usage.is_none());
    }

    // =========================================================================
    // Session summaries
    // =========================================================================

    #[test]
    fn malformed_and_duplicate_lines_are_not_accounted() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let first = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(100, 10, 0, 0));
        let second = assistant_line("m2", "r2", "claude-haiku-4-5", TokenUsage::new(200, 20, 0, 0));
        tree.session("proj", "s", &[&first, "{broken json", &second, &first]);

        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        assert_eq!(summary.stats.entry_count, 2);
        assert_eq!(summary.stats.tokens, TokenUsage::new(300, 30, 0, 0));
        assert_eq!(summary.session_id.as_deref(), Some("s"));
        assert_eq!(summary.models.len(), 1);
    }

    #[test]
    fn duplicates_across_subagent_files_count_once() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let shared = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(100, 0, 0, 0));
        let own = assistant_line("m2", "r2", "claude-haiku-4-5", TokenUsage::new(7, 0, 0, 0));
        let primary = tree.session("proj", "s", &[&shared]);
        tree.subagent("proj", "s", "agent", &[&shared, &own]);

        let summary = aggregator(temp.path())
            .summarize_session(Some(&primary))
            .unwrap();
        assert_eq!(summary.stats.entry_count, 2);
        assert_eq!(summary.stats.tokens.input, 107);
    }

    #[test]
    fn synthetic_entries_are_excluded() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let real = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(1, 1, 0, 0));
        let fake = assistant_line("m2", "r2", SYNTHETIC_MODEL, TokenUsage::new(999, 999, 0, 0));
        tree.session("proj", "s", &[&real, &fake]);

        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        assert_eq!(summary.stats.entry_count, 1);
        assert!(summary.models.iter().all(|m| m.raw_id != SYNTHETIC_MODEL));
    }

    #[test]
    fn embedded_session_id_overrides_file_name() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        tree.session("proj", "file-name", &[r#"{"sessionId":"real-id"}"#]);
        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        assert_eq!(summary.session_id.as_deref(), Some("real-id"));
        assert!(summary.is_empty());
    }

    #[test]
    fn precomputed_cost_is_trusted() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        tree.session(
            "proj",
            "s",
            &[r#"{"costUSD":1.5,"message":{"model":"claude-haiku-4-5","usage":{"input_tokens":10}}}"#],
        );
        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        assert!(close(summary.stats.cost_usd, 1.5));
    }

    #[test]
    fn tiering_carries_across_entries_of_same_key() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let a = assistant_line("m1", "r1", "claude-sonnet-4-5", TokenUsage::new(150_000, 0, 0, 0));
        let b = assistant_line("m2", "r2", "claude-sonnet-4-5", TokenUsage::new(100_000, 0, 0, 0));
        tree.session("proj", "s", &[&a, &b]);

        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        let expected = 200_000.0 * SONNET.input + 50_000.0 * SONNET.input * 1.25;
        assert!(close(summary.stats.cost_usd, expected));
    }

    #[test]
    fn repeated_passes_are_identical() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let a = assistant_line("m1", "r1", "claude-sonnet-4-5", TokenUsage::new(180_000, 5, 40_000, 0));
        let b = assistant_line("m2", "r2", "sonnet", TokenUsage::new(60_000, 5, 0, 10_000));
        tree.session("proj", "s", &[&a, &b]);

        let agg = aggregator(temp.path());
        let first = agg.summarize_session(None).unwrap();
        let second = agg.summarize_session(None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fallback_models_are_flagged() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let line = assistant_line("m1", "r1", "claude-haiku-9-9", TokenUsage::new(1, 0, 0, 0));
        tree.session("proj", "s", &[&line]);

        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        assert!(summary.has_estimates());
        assert!(summary.by_model["claude-haiku-4-5"].is_fallback);
    }

    #[test]
    fn no_sessions_yields_empty_summary() {
        let temp = TempDir::new().unwrap();
        let summary = aggregator(temp.path()).summarize_session(None).unwrap();
        assert!(summary.is_empty());
        assert!(summary.models.is_empty());
        assert_eq!(summary.stats, TokenStats::default());
    }

    // =========================================================================
    // Time-bounded summaries
    // =========================================================================

    #[test]
    fn since_filters_entries_by_their_own_timestamp() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let now = Utc::now();
        let yesterday = (now - chrono::Duration::days(1)).to_rfc3339();
        let old = format!(
            r#"{{"timestamp":"{yesterday}","requestId":"r1","message":{{"id":"m1","model":"claude-haiku-4-5","usage":{{"input_tokens":50}}}}}}"#
        );
        // Touched just now, but everything inside is from yesterday.
        tree.session("proj", "old-entries", &[&old]);

        let since = now - chrono::Duration::hours(1);
        let summary = aggregator(temp.path()).summarize_since(since);
        assert!(summary.is_empty());
    }

    #[test]
    fn since_skips_files_not_modified_in_period() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let ts = Utc::now().to_rfc3339();
        let line = format!(
            r#"{{"timestamp":"{ts}","message":{{"model":"claude-haiku-4-5","usage":{{"input_tokens":5}}}}}}"#
        );
        let stale = tree.session("proj", "stale", &[&line]);
        set_mtime_ago(&stale, Duration::from_secs(7200));
        tree.session("proj", "fresh", &[&line]);

        let summary = aggregator(temp.path()).summarize_since(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(summary.stats.entry_count, 1);
        assert!(summary.session_id.is_none());
    }

    // =========================================================================
    // Context window
    // =========================================================================

    #[test]
    fn context_uses_last_usage_line_not_running_total() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let early = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(90_000, 10, 0, 0));
        let last = assistant_line("m2", "r2", "claude-haiku-4-5", TokenUsage::new(1_000, 500, 1_500, 2_500));
        let path = tree.session("proj", "s", &[&early, &last, r#"{"type":"summary"}"#]);

        let state = aggregator(temp.path()).context_window(&path).unwrap();
        assert_eq!(state.current_tokens, 5_000);
        assert_eq!(state.max_tokens, BASE_CONTEXT_WINDOW);
        assert!(!state.near_auto_compact);
        assert_eq!(state.model.unwrap().pricing_key, "claude-haiku-4-5");
    }

    #[test]
    fn context_skips_non_utf8_lines() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let path = tree.session("proj", "s", &[]);
        let usage = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(1_000, 10, 2_000, 2_000));
        let mut bytes = b"\xff\xfe garbage\n{\"sessionId\":\"sess-utf8\"}\n".to_vec();
        bytes.extend_from_slice(usage.as_bytes());
        bytes.extend_from_slice(b"\n\xc3\x28\n");
        std::fs::write(&path, bytes).unwrap();

        let aggregator = aggregator(temp.path());
        let state = aggregator.context_window(&path).unwrap();
        assert_eq!(state.current_tokens, 5_000);
        assert_eq!(state.session_id, "sess-utf8");

        let summary = aggregator.summarize_session(Some(&path)).unwrap();
        assert_eq!(summary.stats.entry_count, 1);
    }

    #[test]
    fn context_window_switches_to_extended() {
        assert_eq!(context_window_size(Some("claude-sonnet-4-5[1m]"), 10), EXTENDED_CONTEXT_WINDOW);
        assert_eq!(context_window_size(Some("claude-sonnet-4-5"), 250_000), EXTENDED_CONTEXT_WINDOW);
        assert_eq!(context_window_size(None, 200_000), BASE_CONTEXT_WINDOW);
    }

    #[test]
    fn near_auto_compact_at_eighty_percent() {
        assert!(is_near_auto_compact(160_000, BASE_CONTEXT_WINDOW));
        assert!(!is_near_auto_compact(159_999, BASE_CONTEXT_WINDOW));
        assert!(!is_near_auto_compact(0, 0));
    }

    #[test]
    fn context_report_includes_recent_subagents() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let line = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(10, 0, 0, 0));
        tree.session("proj", "s", &[&line]);
        let old = tree.subagent("proj", "s", "old", &[&line]);
        set_mtime_ago(&old, Duration::from_secs(3600));
        tree.subagent("proj", "s", "new", &[&line]);

        let report = aggregator(temp.path())
            .context_report(None, Duration::from_secs(300))
            .unwrap();
        assert!(report.primary.is_some());
        assert_eq!(report.subagents.len(), 1);
        assert_eq!(report.subagents[0].session_id, "new");
    }

    #[test]
    fn context_report_orders_subagents_newest_first() {
        let temp = TempDir::new().unwrap();
        let tree = LogTree::new(temp.path());
        let line = assistant_line("m1", "r1", "claude-haiku-4-5", TokenUsage::new(10, 0, 0, 0));
        tree.session("proj", "s", &[&line]);
        let older = tree.subagent("proj", "s", "agent-a", &[&line]);
        let newest = tree.subagent("proj", "s", "agent-b", &[&line]);
        let middle = tree.subagent("proj", "s", "agent-c", &[&line]);
        set_mtime_ago(&older, Duration::from_secs(240));
        set_mtime_ago(&middle, Duration::from_secs(120));
        set_mtime_ago(&newest, Duration::from_secs(5));

        let report = aggregator(temp.path())
            .context_report(None, Duration::from_secs(300))
            .unwrap();
        let order: Vec<&str> = report.subagents.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(order, vec!["agent-b", "agent-c", "agent-a"]);
    }
}
