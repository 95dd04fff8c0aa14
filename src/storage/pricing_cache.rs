//! On-disk price table.
//!
//! Two layouts are understood. The current one is a versioned document carrying the
//! rates, the extended-context key set, and the time the rates were fetched. The
//! older one is a bare `key -> rates` map; reading it re-derives the extended set with
//! [`is_extended_context_heuristic`]. A file that is neither gets deleted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::pricing::{ModelPricing, PricingSnapshot, is_extended_context_heuristic};
use crate::error::Result;
use crate::storage::cache;

/// Version marker written into the current layout.
pub const CACHE_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheDocument {
    version: u32,
    updated_at: DateTime<Utc>,
    models: BTreeMap<String, ModelPricing>,
    #[serde(default)]
    extended_context_models: Vec<String>,
}

/// Which layout a table was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFormat {
    Versioned,
    Plain,
}

/// A decoded table, before it becomes a snapshot.
#[derive(Debug, Clone)]
pub struct DecodedTable {
    pub models: HashMap<String, ModelPricing>,
    pub extended_context: HashSet<String>,
    /// Fetch time recorded in the file (versioned layout only).
    pub updated_at: Option<DateTime<Utc>>,
    pub format: CacheFormat,
}

/// Decode either layout. `None` means the bytes are not a price table.
#[must_use]
pub fn decode(bytes: &[u8]) -> Option<DecodedTable> {
    if let Ok(doc) = serde_json::from_slice::<CacheDocument>(bytes) {
        if doc.version == CACHE_FORMAT_VERSION {
            return Some(DecodedTable {
                models: valid_only(doc.models),
                extended_context: doc
                    .extended_context_models
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .collect(),
                updated_at: Some(doc.updated_at),
                format: CacheFormat::Versioned,
            });
        }
        tracing::debug!(version = doc.version, "Unsupported pricing cache version");
    }

    let plain: BTreeMap<String, ModelPricing> = serde_json::from_slice(bytes).ok()?;
    let models = valid_only(plain);
    let extended_context = models
        .keys()
        .filter(|key| is_extended_context_heuristic(key))
        .cloned()
        .collect();
    Some(DecodedTable {
        models,
        extended_context,
        updated_at: None,
        format: CacheFormat::Plain,
    })
}

fn valid_only(models: BTreeMap<String, ModelPricing>) -> HashMap<String, ModelPricing> {
    models
        .into_iter()
        .filter(|(_, pricing)| pricing.is_valid())
        .map(|(key, pricing)| (key.to_lowercase(), pricing))
        .collect()
}

/// Encode a snapshot in the versioned layout with sorted keys.
pub fn encode(snapshot: &PricingSnapshot) -> Result<Vec<u8>> {
    let mut extended: Vec<String> = snapshot.extended_context_keys().iter().cloned().collect();
    extended.sort();
    let doc = CacheDocument {
        version: CACHE_FORMAT_VERSION,
        updated_at: snapshot.updated_at,
        models: snapshot
            .models()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect(),
        extended_context_models: extended,
    };
    Ok(serde_json::to_vec_pretty(&doc)?)
}

/// Outcome of reading the cache file.
#[derive(Debug)]
pub enum CacheLoad {
    /// No file (or unreadable).
    Missing,
    /// The file was not a price table and has been removed.
    Corrupt,
    Loaded {
        table: DecodedTable,
        age: Duration,
        modified_at: DateTime<Utc>,
    },
}

/// The pricing cache file at a fixed path.
#[derive(Debug, Clone)]
pub struct PricingCache {
    path: PathBuf,
}

impl PricingCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Age of the file, if present.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        cache::get_age(&self.path)
    }

    /// Read and decode the file, deleting it when it decodes as neither layout.
    #[must_use]
    pub fn load(&self) -> CacheLoad {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheLoad::Missing,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Pricing cache unreadable");
                return CacheLoad::Missing;
            }
        };

        let Some(table) = decode(&bytes) else {
            tracing::warn!(path = %self.path.display(), "Pricing cache is corrupt; deleting");
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete corrupt pricing cache");
            }
            return CacheLoad::Corrupt;
        };

        let age = self.age().unwrap_or(Duration::ZERO);
        let modified_at = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or_else(Utc::now);

        tracing::debug!(
            path = %self.path.display(),
            models = table.models.len(),
            format = ?table.format,
            age_secs = age.as_secs(),
            "Loaded pricing cache"
        );
        CacheLoad::Loaded {
            table,
            age,
            modified_at,
        }
    }

    /// Persist a snapshot atomically.
    pub fn save(&self, snapshot: &PricingSnapshot) -> Result<()> {
        let bytes = encode(snapshot)?;
        cache::write_bytes(&self.path, &bytes)?;
        tracing::debug!(path = %self.path.display(), models = snapshot.model_count(), "Saved pricing cache");
        Ok(())
    }
}
