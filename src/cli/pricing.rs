//! `pricing` subcommands.

use crate::cli::args::PricingCommand;
use crate::cli::{AppContext, emit};
use crate::error::Result;
use crate::render;

/// Execute a pricing subcommand.
///
/// # Errors
///
/// Only render failures; refresh problems show up as provenance, not errors.
pub async fn execute(cmd: &PricingCommand, ctx: &AppContext) -> Result<()> {
    match cmd {
        PricingCommand::Status => {
            ctx.engine.prepare_pricing().await;
            emit(&render::render_pricing_status(
                &ctx.engine.pricing_status(),
                ctx.render,
            )?);
        }
        PricingCommand::Refresh => {
            let report = ctx.engine.refresh_pricing().await;
            if let Some(error) = &report.network_error {
                tracing::warn!(error = %error, "Remote price table unavailable");
            }
            emit(&render::render_refresh_report(&report, ctx.render)?);
        }
        PricingCommand::Show { model } => {
            ctx.engine.prepare_pricing().await;
            let (identifier, pricing) = ctx.engine.tiered_pricing_for_model(model);
            emit(&render::render_pricing_show(
                &identifier,
                &pricing,
                ctx.render,
            )?);
        }
    }
    Ok(())
}
