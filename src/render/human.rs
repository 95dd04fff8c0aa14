//! Human-readable output.
//!
//! Plain aligned text, styled with `colored` when color is enabled. Callers decide
//! whether color is enabled; nothing here inspects the terminal.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use colored::{ColoredString, Colorize};

use crate::core::models::{
    ActiveSession, ContextReport, ContextWindowState, ModelIdentifier, PricingStatus, Provenance,
    SessionSummary,
};
use crate::core::pricing::TieredModelPricing;
use crate::core::pricing_refresh::{RefreshReport, RefreshSource};
use crate::storage::history::{PruneResult, UsageSample};
use crate::util::{format_age, format_cost, format_percent, format_rate_per_million, format_tokens};

const LABEL_WIDTH: usize = 14;

/// Apply `style` only when color is on.
fn paint(text: &str, color: bool, style: impl Fn(&str) -> ColoredString) -> String {
    if color {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

fn row(out: &mut String, label: &str, value: &str, color: bool) {
    let label = format!("{label:<LABEL_WIDTH$}");
    let _ = writeln!(out, "  {}{value}", paint(&label, color, |s| s.dimmed()));
}

fn header(out: &mut String, title: &str, color: bool) {
    let _ = writeln!(out, "{}", paint(title, color, |s| s.bold().cyan()));
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn provenance_label(provenance: Provenance, color: bool) -> String {
    let text = provenance.as_str();
    paint(text, color, |s| match provenance {
        Provenance::Live => s.green(),
        Provenance::Cached => s.yellow(),
        Provenance::Bundled => s.red(),
    })
}

/// Color band for context-window usage.
fn usage_color(used_percent: f64, text: &str, color: bool) -> String {
    paint(text, color, |s| {
        if used_percent >= 90.0 {
            s.red().bold()
        } else if used_percent >= 75.0 {
            s.yellow()
        } else {
            s.green()
        }
    })
}

/// Render a usage summary.
#[must_use]
pub fn render_summary(title: &str, summary: &SessionSummary, color: bool) -> String {
    let mut out = String::new();
    header(&mut out, title, color);

    if summary.is_empty() {
        let _ = writeln!(out, "  {}", paint("No usage recorded", color, |s| s.dimmed()));
        return out;
    }

    if let Some(id) = &summary.session_id {
        row(&mut out, "Session", id, color);
    }

    let cost = format_cost(summary.stats.cost_usd);
    let cost = if summary.has_estimates() {
        format!("{cost} (estimated)")
    } else {
        cost
    };
    row(
        &mut out,
        "Cost",
        &paint(&cost, color, |s| s.bright_green().bold()),
        color,
    );

    let tokens = summary.stats.tokens;
    row(&mut out, "Input", &format_tokens(tokens.input), color);
    row(&mut out, "Output", &format_tokens(tokens.output), color);
    row(&mut out, "Cache write", &format_tokens(tokens.cache_write), color);
    row(&mut out, "Cache read", &format_tokens(tokens.cache_read), color);
    row(&mut out, "Messages", &summary.stats.entry_count.to_string(), color);

    if !summary.models.is_empty() {
        let names: Vec<String> = summary.models.iter().map(model_label).collect();
        row(&mut out, "Models", &names.join(", "), color);
    }

    if let (Some(first), Some(last)) = (summary.first_entry_at, summary.last_entry_at) {
        row(
            &mut out,
            "Span",
            &format!("{} to {}", local_time(first), local_time(last)),
            color,
        );
    }

    if !summary.by_model.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}", paint("By model", color, |s| s.bold()));
        for (key, breakdown) in &summary.by_model {
            let marker = if breakdown.is_fallback { "*" } else { "" };
            let _ = writeln!(
                out,
                "    {:<32} {:>10} {:>9} msgs",
                format!("{key}{marker}"),
                format_cost(breakdown.stats.cost_usd),
                breakdown.stats.entry_count,
            );
        }
        if summary.by_model.values().any(|b| b.is_fallback) {
            let _ = writeln!(
                out,
                "    {}",
                paint("* priced by family fallback", color, |s| s.dimmed())
            );
        }
    }

    out
}

fn model_label(model: &ModelIdentifier) -> String {
    if model.is_fallback {
        format!("{} (~{})", model.raw_id, model.pricing_key)
    } else {
        model.raw_id.clone()
    }
}

fn context_line(out: &mut String, state: &ContextWindowState, color: bool) {
    let used = state.used_percent();
    let gauge = format!(
        "{} / {} ({})",
        format_tokens(state.current_tokens),
        format_tokens(state.max_tokens),
        format_percent(used),
    );
    row(out, "Context", &usage_color(used, &gauge, color), color);
    if let Some(model) = &state.model {
        row(out, "Model", &model.raw_id, color);
    }
    if state.near_auto_compact {
        row(
            out,
            "Status",
            &paint("near auto-compact", color, |s| s.red().bold()),
            color,
        );
    }
}

/// Render context-window state for the primary session and its sub-agents.
#[must_use]
pub fn render_context(report: &ContextReport, color: bool) -> String {
    let mut out = String::new();
    header(&mut out, "Context window", color);

    let Some(primary) = &report.primary else {
        let _ = writeln!(out, "  {}", paint("No session found", color, |s| s.dimmed()));
        return out;
    };

    row(&mut out, "Session", &primary.session_id, color);
    context_line(&mut out, primary, color);

    for sub in &report.subagents {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}", paint(&file_stem(&sub.path), color, |s| s.bold()));
        context_line(&mut out, sub, color);
    }

    out
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
}

/// Render the list of recently written sessions.
#[must_use]
pub fn render_sessions(sessions: &[ActiveSession], color: bool) -> String {
    let mut out = String::new();
    header(&mut out, "Active sessions", color);

    if sessions.is_empty() {
        let _ = writeln!(out, "  {}", paint("No active sessions", color, |s| s.dimmed()));
        return out;
    }

    for session in sessions {
        let _ = writeln!(
            out,
            "  {:<28} {:<38} {}",
            paint(&session.project_label, color, |s| s.bold()),
            file_stem(&session.path),
            paint(
                &crate::util::format_relative_time(session.modified_at),
                color,
                |s| s.dimmed()
            ),
        );
    }

    out
}

/// Render where the active price table came from.
#[must_use]
pub fn render_pricing_status(status: &PricingStatus, color: bool) -> String {
    let mut out = String::new();
    header(&mut out, "Pricing", color);
    row(
        &mut out,
        "Source",
        &provenance_label(status.provenance, color),
        color,
    );
    row(&mut out, "Updated", &local_time(status.updated_at), color);
    row(&mut out, "Models", &status.model_count.to_string(), color);
    row(
        &mut out,
        "Tiered",
        &status.extended_context_count.to_string(),
        color,
    );
    if let Some(path) = &status.cache_path {
        let age = status.cache_age_secs.map_or_else(
            || "missing".to_string(),
            |secs| format!("{} old", format_age(Duration::from_secs(secs))),
        );
        row(
            &mut out,
            "Cache",
            &format!("{} ({age})", path.display()),
            color,
        );
    }
    out
}

/// Render the rates that apply to one model.
#[must_use]
pub fn render_pricing_show(
    model: &ModelIdentifier,
    pricing: &TieredModelPricing,
    color: bool,
) -> String {
    let mut out = String::new();
    header(&mut out, &model.raw_id, color);
    let key = if model.is_fallback {
        format!("{} (family fallback)", model.pricing_key)
    } else {
        model.pricing_key.clone()
    };
    row(&mut out, "Pricing key", &key, color);
    row(&mut out, "Family", model.family.display_name(), color);
    if let Some(version) = &model.version {
        row(&mut out, "Version", version, color);
    }

    let base = pricing.base;
    row(&mut out, "Input", &format_rate_per_million(base.input), color);
    row(&mut out, "Output", &format_rate_per_million(base.output), color);
    row(
        &mut out,
        "Cache write",
        &format_rate_per_million(base.cache_write),
        color,
    );
    row(
        &mut out,
        "Cache read",
        &format_rate_per_million(base.cache_read),
        color,
    );

    if let Some(tier) = pricing.tier {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "  {}",
            paint(
                &format!("Above {} tokens", format_tokens(tier.threshold)),
                color,
                |s| s.bold()
            )
        );
        row(&mut out, "Input", &format_rate_per_million(tier.input), color);
        row(
            &mut out,
            "Cache write",
            &format_rate_per_million(tier.cache_write),
            color,
        );
        row(
            &mut out,
            "Cache read",
            &format_rate_per_million(tier.cache_read),
            color,
        );
    }
    out
}

/// Render the outcome of a forced refresh.
#[must_use]
pub fn render_refresh_report(report: &RefreshReport, color: bool) -> String {
    let mut out = String::new();
    header(&mut out, "Pricing refresh", color);
    let source = match report.source {
        RefreshSource::FreshCache => "fresh cache",
        RefreshSource::Network => "network",
        RefreshSource::StaleCache => "stale cache",
        RefreshSource::Bundled => "bundled table",
    };
    row(&mut out, "Loaded from", source, color);
    row(
        &mut out,
        "Provenance",
        &provenance_label(report.provenance, color),
        color,
    );
    row(&mut out, "Models", &report.model_count.to_string(), color);
    if let Some(error) = &report.network_error {
        row(
            &mut out,
            "Network",
            &paint(error, color, |s| s.yellow()),
            color,
        );
    }
    out
}

/// Render the usage-history timeline, oldest first.
#[must_use]
pub fn render_history(samples: &[UsageSample], color: bool) -> String {
    let mut out = String::new();
    header(&mut out, "Usage history", color);

    if samples.is_empty() {
        let _ = writeln!(out, "  {}", paint("No samples recorded", color, |s| s.dimmed()));
        return out;
    }

    let _ = writeln!(
        out,
        "  {}",
        paint(
            &format!(
                "{:<17} {:>10} {:>10} {:>9}  {}",
                "Recorded", "Cost", "Tokens", "Context", "Pricing"
            ),
            color,
            |s| s.dimmed()
        )
    );
    for sample in samples {
        let context = if sample.context_window > 0 {
            #[allow(clippy::cast_precision_loss)]
            let pct = sample.context_tokens as f64 / sample.context_window as f64 * 100.0;
            format_percent(pct)
        } else {
            "-".to_string()
        };
        let _ = writeln!(
            out,
            "  {:<17} {:>10} {:>10} {:>9}  {}",
            local_time(sample.recorded_at),
            format_cost(sample.today_cost_usd),
            format_tokens(sample.today.total()),
            context,
            sample.pricing_provenance,
        );
    }

    if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
        let delta = last.today_cost_usd - first.today_cost_usd;
        if delta > 0.0 && first.recorded_at.date_naive() == last.recorded_at.date_naive() {
            let _ = writeln!(out);
            row(
                &mut out,
                "Spent",
                &paint(&format_cost(delta), color, |s| s.bright_green()),
                color,
            );
        }
    }

    out
}

/// Render the result of a history prune.
#[must_use]
pub fn render_prune(result: &PruneResult, retention_days: u32, color: bool) -> String {
    let mut out = String::new();
    header(&mut out, "History prune", color);
    row(&mut out, "Retention", &format!("{retention_days} days"), color);
    row(&mut out, "Deleted", &result.samples_deleted.to_string(), color);
    row(&mut out, "Took", &format!("{} ms", result.duration_ms), color);
    out
}
