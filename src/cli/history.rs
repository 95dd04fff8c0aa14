//! `history` command.
//!
//! Shows the usage-history timeline recorded by `watch`, or prunes it to the
//! configured retention window.

use chrono::Utc;

use crate::cli::args::{HistoryArgs, HistoryCommand, OutputFormat};
use crate::cli::{AppContext, emit};
use crate::error::{Result, TallyError};
use crate::render;
use crate::storage::history::HistoryStore;

/// Execute history commands.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried, or `days` is 0.
pub fn execute(args: &HistoryArgs, ctx: &AppContext) -> Result<()> {
    match &args.command {
        Some(HistoryCommand::Prune) => execute_prune(ctx),
        None => execute_show(args.days, ctx),
    }
}

fn execute_show(days: u32, ctx: &AppContext) -> Result<()> {
    if days == 0 {
        return Err(TallyError::ConfigInvalid {
            key: "days".to_string(),
            value: "0".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }

    let path = ctx.paths.history_db_file();
    if !path.exists() {
        match ctx.render.format {
            OutputFormat::Json => emit(&render::render_history(&[], ctx.render)?),
            OutputFormat::Human => {
                emit("No history data available.");
                emit("Run `cctally watch` to start collecting samples.");
            }
        }
        return Ok(());
    }

    let store = HistoryStore::open(&path)?;
    let since = Utc::now() - chrono::Duration::days(i64::from(days));
    let samples = store.samples_since(since)?;
    emit(&render::render_history(&samples, ctx.render)?);
    Ok(())
}

fn execute_prune(ctx: &AppContext) -> Result<()> {
    let retention = ctx.config.history_retention;
    let store = HistoryStore::open(&ctx.paths.history_db_file())?.with_retention(retention);
    let result = store.prune(retention)?;
    let days = u32::try_from(retention.as_secs() / 86_400).unwrap_or(u32::MAX);
    emit(&render::render_prune(&result, days, ctx.render)?);
    Ok(())
}
