//! Pricing data and cost calculation.
//!
//! A [`PricingSnapshot`] is an immutable price table: per-token rates keyed by
//! lowercase pricing key, the set of keys that need tiered pricing, and where the
//! data came from. [`PricingStore`] holds exactly one snapshot at a time and swaps it
//! wholesale on refresh, so readers never see a half-built table.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model_id::{self, detect_family, extract_version, parse_version};
use crate::core::models::{ModelFamily, ModelIdentifier, Provenance, TokenUsage};
use crate::storage::pricing_cache;

/// Cumulative input-side tokens per key after which tiered rates apply.
pub const TIER_THRESHOLD: u64 = 200_000;

/// Above-threshold rate multiplier for input, cache-write and cache-read.
pub const TIER_MULTIPLIER: f64 = 1.25;

/// Declared max window at or above which a remote entry counts as extended-context.
pub const EXTENDED_CONTEXT_MIN_TOKENS: u64 = 500_000;

/// Rates used for keys the table does not know (mid-tier, per token).
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::per_million(3.0, 15.0, 3.75, 0.30);

const BUNDLED_TABLE: &str = include_str!("../../assets/bundled_pricing.json");

// =============================================================================
// Rates
// =============================================================================

/// Per-token rates for one model (USD).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(rename = "input_cost_per_token")]
    pub input: f64,
    #[serde(rename = "output_cost_per_token")]
    pub output: f64,
    #[serde(rename = "cache_creation_input_token_cost")]
    pub cache_write: f64,
    #[serde(rename = "cache_read_input_token_cost")]
    pub cache_read: f64,
}

impl ModelPricing {
    /// Build from per-million-token prices, the unit vendors publish.
    #[must_use]
    pub const fn per_million(input: f64, output: f64, cache_write: f64, cache_read: f64) -> Self {
        Self {
            input: input / 1_000_000.0,
            output: output / 1_000_000.0,
            cache_write: cache_write / 1_000_000.0,
            cache_read: cache_read / 1_000_000.0,
        }
    }

    /// Flat cost of a usage quadruple.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        usage.input as f64 * self.input
            + usage.output as f64 * self.output
            + usage.cache_write as f64 * self.cache_write
            + usage.cache_read as f64 * self.cache_read
    }

    /// True when every rate is finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.input, self.output, self.cache_write, self.cache_read]
            .iter()
            .all(|rate| rate.is_finite() && *rate >= 0.0)
    }
}

/// Threshold and above-threshold rates of a tiered model.
///
/// Output tokens have no above-threshold rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    pub threshold: u64,
    pub input: f64,
    pub cache_write: f64,
    pub cache_read: f64,
}

/// Base rates plus an optional tier.
///
/// Threshold and above-threshold rates are present together or not at all; without
/// them cost is flat base-rate multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredModelPricing {
    pub base: ModelPricing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<PricingTier>,
}

impl TieredModelPricing {
    /// Untiered pricing.
    #[must_use]
    pub const fn flat(base: ModelPricing) -> Self {
        Self { base, tier: None }
    }

    /// Tiered at [`TIER_THRESHOLD`] with every eligible rate scaled by [`TIER_MULTIPLIER`].
    #[must_use]
    pub fn extended(base: ModelPricing) -> Self {
        Self {
            base,
            tier: Some(PricingTier {
                threshold: TIER_THRESHOLD,
                input: base.input * TIER_MULTIPLIER,
                cache_write: base.cache_write * TIER_MULTIPLIER,
                cache_read: base.cache_read * TIER_MULTIPLIER,
            }),
        }
    }

    #[must_use]
    pub const fn is_tiered(&self) -> bool {
        self.tier.is_some()
    }

    /// Cost of one entry given the input-side tokens already attributed to this key.
    ///
    /// The remaining below-threshold budget is consumed by input, then cache-write,
    /// then cache-read.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost_for(&self, usage: &TokenUsage, prior_cumulative: u64) -> f64 {
        let Some(tier) = self.tier else {
            return self.base.cost(usage);
        };

        let mut remaining = tier.threshold.saturating_sub(prior_cumulative);
        let mut split = |tokens: u64, base_rate: f64, above_rate: f64| {
            let below = tokens.min(remaining);
            remaining -= below;
            below as f64 * base_rate + (tokens - below) as f64 * above_rate
        };

        let input = split(usage.input, self.base.input, tier.input);
        let cache_write = split(usage.cache_write, self.base.cache_write, tier.cache_write);
        let cache_read = split(usage.cache_read, self.base.cache_read, tier.cache_read);

        input + cache_write + cache_read + usage.output as f64 * self.base.output
    }
}

/// Version-string guess at whether a key is an extended-context model.
///
/// Used only when the loaded table carries no context-size metadata. Any opus at
/// major version 4 or later, and any sonnet at 4.5 or later, counts as extended.
#[must_use]
pub fn is_extended_context_heuristic(pricing_key: &str) -> bool {
    let Some(version) = extract_version(pricing_key).as_deref().and_then(parse_version) else {
        return false;
    };
    match detect_family(pricing_key) {
        ModelFamily::Opus => version.0 >= 4,
        ModelFamily::Sonnet => version >= (4, 5),
        ModelFamily::Haiku | ModelFamily::Unknown => false,
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// A complete, immutable price table.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSnapshot {
    models: HashMap<String, ModelPricing>,
    extended_context: HashSet<String>,
    pub provenance: Provenance,
    pub updated_at: DateTime<Utc>,
}

impl PricingSnapshot {
    /// Build a snapshot, lowercasing keys.
    ///
    /// Without an explicit extended-context set, one is derived from the keys with
    /// [`is_extended_context_heuristic`].
    #[must_use]
    pub fn new(
        models: HashMap<String, ModelPricing>,
        extended_context: Option<HashSet<String>>,
        provenance: Provenance,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let models: HashMap<String, ModelPricing> = models
            .into_iter()
            .map(|(key, pricing)| (key.to_lowercase(), pricing))
            .collect();
        let extended_context = match extended_context {
            Some(keys) => keys.into_iter().map(|key| key.to_lowercase()).collect(),
            None => models
                .keys()
                .filter(|key| is_extended_context_heuristic(key))
                .cloned()
                .collect(),
        };
        Self {
            models,
            extended_context,
            provenance,
            updated_at,
        }
    }

    /// The table compiled into the binary.
    ///
    /// A bundled table that fails to decode yields an empty snapshot, which still
    /// prices everything at [`DEFAULT_PRICING`].
    #[must_use]
    pub fn bundled() -> Self {
        match pricing_cache::decode(BUNDLED_TABLE.as_bytes()) {
            Some(table) => Self::new(
                table.models,
                Some(table.extended_context),
                Provenance::Bundled,
                table.updated_at.unwrap_or_else(Utc::now),
            ),
            None => {
                tracing::error!("Bundled price table is unreadable; using default rates only");
                Self::new(HashMap::new(), None, Provenance::Bundled, Utc::now())
            }
        }
    }

    /// Same table, different provenance.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Known pricing keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    #[must_use]
    pub fn models(&self) -> &HashMap<String, ModelPricing> {
        &self.models
    }

    #[must_use]
    pub fn extended_context_keys(&self) -> &HashSet<String> {
        &self.extended_context
    }

    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Rates for a key: exact, then lowercase, then [`DEFAULT_PRICING`].
    #[must_use]
    pub fn pricing(&self, pricing_key: &str) -> ModelPricing {
        self.models
            .get(pricing_key)
            .or_else(|| self.models.get(&pricing_key.to_lowercase()))
            .copied()
            .unwrap_or(DEFAULT_PRICING)
    }

    /// True when the key is listed as extended-context or passes the heuristic.
    #[must_use]
    pub fn is_extended(&self, pricing_key: &str) -> bool {
        let lower = pricing_key.to_lowercase();
        self.extended_context.contains(&lower) || is_extended_context_heuristic(&lower)
    }

    /// Rates for a key, tiered when the key is extended-context.
    #[must_use]
    pub fn tiered_pricing(&self, pricing_key: &str) -> TieredModelPricing {
        let base = self.pricing(pricing_key);
        if self.is_extended(pricing_key) {
            TieredModelPricing::extended(base)
        } else {
            TieredModelPricing::flat(base)
        }
    }

    /// Resolve a raw model id against this table's keys.
    #[must_use]
    pub fn resolve(&self, raw_id: &str) -> ModelIdentifier {
        model_id::resolve(raw_id, self.keys())
    }
}

// =============================================================================
// Store
// =============================================================================

/// Owner of the current snapshot.
///
/// Readers clone an `Arc` and work against that point-in-time table; writers replace
/// the `Arc`. The bundled baseline is kept so the store can fall back to it.
#[derive(Debug)]
pub struct PricingStore {
    current: RwLock<Arc<PricingSnapshot>>,
    baseline: Arc<PricingSnapshot>,
}

impl Default for PricingStore {
    fn default() -> Self {
        Self::with_bundled()
    }
}

impl PricingStore {
    /// A store starting from the bundled table.
    #[must_use]
    pub fn with_bundled() -> Self {
        Self::new(PricingSnapshot::bundled())
    }

    /// A store whose baseline and current snapshot are `snapshot`.
    #[must_use]
    pub fn new(snapshot: PricingSnapshot) -> Self {
        let baseline = Arc::new(snapshot);
        Self {
            current: RwLock::new(Arc::clone(&baseline)),
            baseline,
        }
    }

    /// The snapshot in effect right now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PricingSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the current snapshot.
    pub fn install(&self, snapshot: PricingSnapshot) {
        let snapshot = Arc::new(snapshot);
        tracing::debug!(
            provenance = %snapshot.provenance,
            models = snapshot.model_count(),
            "Installing price table"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Go back to the bundled table.
    pub fn reset_to_baseline(&self) {
        let baseline = Arc::clone(&self.baseline);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = baseline;
    }

    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.snapshot().provenance
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.snapshot().updated_at
    }

    #[must_use]
    pub fn pricing(&self, pricing_key: &str) -> ModelPricing {
        self.snapshot().pricing(pricing_key)
    }

    #[must_use]
    pub fn tiered_pricing(&self, pricing_key: &str) -> TieredModelPricing {
        self.snapshot().tiered_pricing(pricing_key)
    }

    /// Resolve a raw model id and return its base rates.
    #[must_use]
    pub fn pricing_for_model(&self, raw_id: &str) -> (ModelIdentifier, ModelPricing) {
        let snapshot = self.snapshot();
        let id = snapshot.resolve(raw_id);
        let pricing = snapshot.pricing(&id.pricing_key);
        (id, pricing)
    }

    /// Resolve a raw model id and return its tiered rates.
    #[must_use]
    pub fn tiered_pricing_for_model(&self, raw_id: &str) -> (ModelIdentifier, TieredModelPricing) {
        let snapshot = self.snapshot();
        let id = snapshot.resolve(raw_id);
        let pricing = snapshot.tiered_pricing(&id.pricing_key);
        (id, pricing)
    }
}
