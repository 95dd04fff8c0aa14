//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use crate::cli::args::OutputFormat;
use crate::core::models::{
    ActiveSession, ContextReport, ModelIdentifier, PricingStatus, SessionSummary,
};
use crate::core::pricing::TieredModelPricing;
use crate::core::pricing_refresh::RefreshReport;
use crate::error::Result;
use crate::storage::history::{PruneResult, UsageSample};

pub use robot::PricingShow;

/// Presentation options shared by every renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub color: bool,
}

impl RenderOptions {
    #[must_use]
    pub const fn new(format: OutputFormat, pretty: bool, color: bool) -> Self {
        Self {
            format,
            pretty,
            color,
        }
    }
}

/// Render a usage summary under `command` (`session`, `today`, ...).
pub fn render_summary(
    command: &str,
    title: &str,
    summary: &SessionSummary,
    opts: RenderOptions,
) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_summary(title, summary, opts.color)),
        OutputFormat::Json => robot::render_envelope(command, summary, opts.pretty),
    }
}

/// Render context-window state.
pub fn render_context(report: &ContextReport, opts: RenderOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_context(report, opts.color)),
        OutputFormat::Json => robot::render_envelope("context", report, opts.pretty),
    }
}

/// Render the active-session list.
pub fn render_sessions(sessions: &[ActiveSession], opts: RenderOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_sessions(sessions, opts.color)),
        OutputFormat::Json => robot::render_envelope("sessions", sessions, opts.pretty),
    }
}

/// Render pricing provenance and cache state.
pub fn render_pricing_status(status: &PricingStatus, opts: RenderOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_pricing_status(status, opts.color)),
        OutputFormat::Json => robot::render_envelope("pricing.status", status, opts.pretty),
    }
}

/// Render the rates for one model.
pub fn render_pricing_show(
    model: &ModelIdentifier,
    pricing: &TieredModelPricing,
    opts: RenderOptions,
) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_pricing_show(model, pricing, opts.color)),
        OutputFormat::Json => {
            robot::render_envelope("pricing.show", PricingShow { model, pricing }, opts.pretty)
        }
    }
}

/// Render a refresh outcome.
pub fn render_refresh_report(report: &RefreshReport, opts: RenderOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_refresh_report(report, opts.color)),
        OutputFormat::Json => robot::render_envelope("pricing.refresh", report, opts.pretty),
    }
}

/// Render the usage-history timeline.
pub fn render_history(samples: &[UsageSample], opts: RenderOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_history(samples, opts.color)),
        OutputFormat::Json => robot::render_envelope("history", samples, opts.pretty),
    }
}

/// Render a prune result.
pub fn render_prune(
    result: &PruneResult,
    retention_days: u32,
    opts: RenderOptions,
) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human::render_prune(result, retention_days, opts.color)),
        OutputFormat::Json => robot::render_envelope("history.prune", result, opts.pretty),
    }
}
