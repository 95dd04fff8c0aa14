//! Storage for configuration, the pricing cache, and the usage-history timeline.

pub mod cache;
pub mod config;
pub mod history;
pub mod history_schema;
pub mod paths;
pub mod pricing_cache;

pub use config::{
    Config, ConfigSource, ConfigSources, ENV_CONFIG, ENV_FORMAT, ENV_LOG_ROOT, ENV_NO_COLOR,
    ENV_NO_COLOR_STD, ENV_OFFLINE, ENV_PRETTY, ENV_PRICING_URL, ENV_VERBOSE, ResolvedConfig,
};
pub use history::{HistoryStore, PRUNE_INTERVAL_HOURS, PruneResult, UsageSample};
pub use history_schema::{DEFAULT_RETENTION_DAYS, run_migrations};
pub use paths::AppPaths;
pub use pricing_cache::{CacheLoad, PricingCache};
