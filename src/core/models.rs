//! Core data models for usage accounting.
//!
//! These types are recomputed on demand from session logs and the current price
//! snapshot; none of them are persisted except through the history timeline.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Token Usage
// =============================================================================

/// Four token counters reported for one assistant turn (or a sum of turns).
///
/// Additive, with [`TokenUsage::zero`] as the identity element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_write: u64,
    pub cache_read: u64,
}

impl TokenUsage {
    /// Create a usage quadruple.
    #[must_use]
    pub const fn new(input: u64, output: u64, cache_write: u64, cache_read: u64) -> Self {
        Self {
            input,
            output,
            cache_write,
            cache_read,
        }
    }

    /// The additive identity.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Tokens that occupy the context window: input plus both cache counters.
    #[must_use]
    pub const fn input_side(&self) -> u64 {
        self.input
            .saturating_add(self.cache_write)
            .saturating_add(self.cache_read)
    }

    /// Sum of all four counters.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_side().saturating_add(self.output)
    }

    /// True when every counter is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input: self.input.saturating_add(rhs.input),
            output: self.output.saturating_add(rhs.output),
            cache_write: self.cache_write.saturating_add(rhs.cache_write),
            cache_read: self.cache_read.saturating_add(rhs.cache_read),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

// =============================================================================
// Token Stats
// =============================================================================

/// Token counters plus total cost for a set of accounted entries.
///
/// [`TokenStats::combine`] is commutative and associative, so summaries built from
/// disjoint entry sets can be merged in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub entry_count: u64,
}

impl TokenStats {
    /// Stats for a single accounted entry.
    #[must_use]
    pub const fn single(tokens: TokenUsage, cost_usd: f64) -> Self {
        Self {
            tokens,
            cost_usd,
            entry_count: 1,
        }
    }

    /// Merge two stats.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            tokens: self.tokens + other.tokens,
            cost_usd: self.cost_usd + other.cost_usd,
            entry_count: self.entry_count + other.entry_count,
        }
    }
}

impl Add for TokenStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.combine(rhs)
    }
}

impl AddAssign for TokenStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.combine(rhs);
    }
}

impl Sum for TokenStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Self::combine)
    }
}

// =============================================================================
// Model Identity
// =============================================================================

/// Model family detected from a raw model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Top tier (`opus`).
    Opus,
    /// Mid tier (`sonnet`).
    Sonnet,
    /// Fast tier (`haiku`).
    Haiku,
    Unknown,
}

impl ModelFamily {
    /// Families with a known token, in detection order.
    pub const KNOWN: [Self; 3] = [Self::Opus, Self::Sonnet, Self::Haiku];

    /// The substring that identifies this family in ids and pricing keys.
    #[must_use]
    pub const fn token(&self) -> Option<&'static str> {
        match self {
            Self::Opus => Some("opus"),
            Self::Sonnet => Some("sonnet"),
            Self::Haiku => Some("haiku"),
            Self::Unknown => None,
        }
    }

    /// Human-readable tier label.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Opus => "Opus",
            Self::Sonnet => "Sonnet",
            Self::Haiku => "Haiku",
            Self::Unknown => "Unknown",
        }
    }
}

/// A raw model id resolved against the current pricing keys.
///
/// Equality, ordering and hashing use the raw id only; two entries naming the same
/// model collapse to one element of a summary's model set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIdentifier {
    pub raw_id: String,
    pub family: ModelFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub pricing_key: String,
    pub is_fallback: bool,
}

impl PartialEq for ModelIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.raw_id == other.raw_id
    }
}

impl Eq for ModelIdentifier {}

impl Hash for ModelIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw_id.hash(state);
    }
}

impl PartialOrd for ModelIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModelIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw_id.cmp(&other.raw_id)
    }
}

// =============================================================================
// Log Entry
// =============================================================================

/// One parsed log line.
///
/// Every field is optional; which ones are present decides whether the entry is
/// accounted, deduplicated, or only contributes a session id or working directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
    pub session_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
    pub cost_usd: Option<f64>,
    pub message_id: Option<String>,
    pub request_id: Option<String>,
    pub cwd: Option<String>,
}

impl LogEntry {
    /// Dedup key, present only when both identity tokens are.
    #[must_use]
    pub fn dedup_key(&self) -> Option<(&str, &str)> {
        match (&self.message_id, &self.request_id) {
            (Some(message), Some(request)) => Some((message.as_str(), request.as_str())),
            _ => None,
        }
    }
}

// =============================================================================
// Summaries
// =============================================================================

/// Per-pricing-key slice of a summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBreakdown {
    pub stats: TokenStats,
    /// True if any entry under this key was priced by family fallback.
    pub is_fallback: bool,
}

/// Aggregated usage for a session or period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub stats: TokenStats,
    pub models: BTreeSet<ModelIdentifier>,
    /// Keyed by pricing key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_model: BTreeMap<String, ModelBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_entry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_entry_at: Option<DateTime<Utc>>,
}

impl SessionSummary {
    /// An empty summary for the given session.
    #[must_use]
    pub const fn empty(session_id: Option<String>) -> Self {
        Self {
            session_id,
            stats: TokenStats {
                tokens: TokenUsage::zero(),
                cost_usd: 0.0,
                entry_count: 0,
            },
            models: BTreeSet::new(),
            by_model: BTreeMap::new(),
            first_entry_at: None,
            last_entry_at: None,
        }
    }

    /// True when no entry was accounted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stats.entry_count == 0
    }

    /// True when at least one model was priced by fallback.
    #[must_use]
    pub fn has_estimates(&self) -> bool {
        self.models.iter().any(|m| m.is_fallback)
    }

    pub(crate) fn record_timestamp(&mut self, ts: DateTime<Utc>) {
        self.first_entry_at = Some(self.first_entry_at.map_or(ts, |cur| cur.min(ts)));
        self.last_entry_at = Some(self.last_entry_at.map_or(ts, |cur| cur.max(ts)));
    }
}

// =============================================================================
// Context Window
// =============================================================================

/// Current context-window occupancy for one log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowState {
    pub path: PathBuf,
    pub session_id: String,
    /// Input-side tokens of the most recent usage-bearing entry.
    pub current_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelIdentifier>,
    pub max_tokens: u64,
    pub near_auto_compact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_entry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ContextWindowState {
    /// Percentage of the window in use.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn used_percent(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        (self.current_tokens as f64 / self.max_tokens as f64) * 100.0
    }

    /// Percentage of the window still free.
    #[must_use]
    pub fn remaining_percent(&self) -> f64 {
        (100.0 - self.used_percent()).max(0.0)
    }
}

/// Context state for a session and its recently active sub-agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<ContextWindowState>,
    /// Most recently modified first.
    pub subagents: Vec<ContextWindowState>,
}

// =============================================================================
// Sessions
// =============================================================================

/// A session log that was written recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub path: PathBuf,
    pub parent_dir: String,
    pub project_label: String,
    pub modified_at: DateTime<Utc>,
}

// =============================================================================
// Pricing provenance
// =============================================================================

/// Where the active price table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Fetched from the network during this process.
    Live,
    /// Loaded from the local cache file.
    Cached,
    /// The snapshot compiled into the binary.
    Bundled,
}

impl Provenance {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cached => "cached",
            Self::Bundled => "bundled",
        }
    }

    /// Inverse of [`Provenance::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(Self::Live),
            "cached" => Some(Self::Cached),
            "bundled" => Some(Self::Bundled),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot metadata reported to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingStatus {
    pub provenance: Provenance,
    pub updated_at: DateTime<Utc>,
    pub model_count: usize,
    pub extended_context_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_secs: Option<u64>,
}

// =============================================================================
// Robot Output
// =============================================================================

/// Envelope for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,

    #[serde(default)]
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self::with_errors(command, data, Vec::new())
    }

    /// Create with errors.
    pub fn with_errors(command: impl Into<String>, data: T, errors: Vec<String>) -> Self {
        Self {
            schema_version: "cctally.v1".to_string(),
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors,
        }
    }
}
