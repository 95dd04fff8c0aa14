//! `session`, `today`, `week` and `month` commands.

use crate::cli::AppContext;
use crate::cli::args::{PeriodArgs, SessionArgs};
use crate::cli::emit;
use crate::core::engine::Period;
use crate::core::models::SessionSummary;
use crate::error::Result;
use crate::render;

/// Summarize one session (latest when no path is given).
///
/// # Errors
///
/// `SessionNotFound` for an explicit path that does not exist, or a render failure.
pub async fn execute_session(args: &SessionArgs, ctx: &AppContext) -> Result<()> {
    let period = Period::Session(args.path.clone());
    let summary = summarize(ctx, period.clone(), args.by_model).await?;
    let title = summary
        .session_id
        .as_deref()
        .map_or_else(|| "Session".to_string(), |id| format!("Session {id}"));
    emit(&render::render_summary(
        period.label(),
        &title,
        &summary,
        ctx.render,
    )?);
    Ok(())
}

/// Summarize a calendar period.
///
/// # Errors
///
/// Returns a render failure; a missing log root is an empty summary.
pub async fn execute_period(period: Period, args: &PeriodArgs, ctx: &AppContext) -> Result<()> {
    let summary = summarize(ctx, period.clone(), args.by_model).await?;
    emit(&render::render_summary(
        period.label(),
        title_for(&period),
        &summary,
        ctx.render,
    )?);
    Ok(())
}

async fn summarize(ctx: &AppContext, period: Period, by_model: bool) -> Result<SessionSummary> {
    let report = ctx.engine.prepare_pricing().await;
    tracing::debug!(source = ?report.source, provenance = %report.provenance, "Pricing ready");

    let mut summary = ctx.engine.summarize_blocking(period).await?;
    if !by_model {
        summary.by_model.clear();
    }
    Ok(summary)
}

const fn title_for(period: &Period) -> &'static str {
    match period {
        Period::Session(_) => "Session",
        Period::Today => "Today",
        Period::Week => "This week",
        Period::Month => "This month",
        Period::Since(_) => "Since",
    }
}
