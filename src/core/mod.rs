//! Core accounting: model identity, pricing, log aggregation, and refresh.

pub mod aggregator;
pub mod debounce;
pub mod engine;
pub mod http;
pub mod log_watcher;
pub mod logging;
pub mod model_id;
pub mod models;
pub mod pricing;
pub mod pricing_refresh;
pub mod session_logs;

pub use aggregator::LogAggregator;
pub use debounce::{DebounceNotifier, Debouncer};
pub use engine::{Period, UsageEngine};
pub use log_watcher::LogWatcher;
pub use models::{
    ActiveSession, ContextReport, ContextWindowState, LogEntry, ModelBreakdown, ModelFamily,
    ModelIdentifier, PricingStatus, Provenance, RobotOutput, SessionSummary, TokenStats,
    TokenUsage,
};
pub use pricing::{ModelPricing, PricingSnapshot, PricingStore, TieredModelPricing};
pub use pricing_refresh::{PricingRefresher, RefreshHandle, RefreshReport, RefreshSettings};
pub use session_logs::{SessionLogFinder, SessionLogPath};
