//! `context` command.

use crate::cli::args::ContextArgs;
use crate::cli::{AppContext, emit};
use crate::error::Result;
use crate::render;

/// Show context-window fill for a session and its recently active sub-agents.
///
/// # Errors
///
/// `SessionNotFound` for an explicit path that does not exist, or a render failure.
pub fn execute(args: &ContextArgs, ctx: &AppContext) -> Result<()> {
    let report = ctx.engine.context(args.path.as_deref())?;
    emit(&render::render_context(&report, ctx.render)?);
    Ok(())
}
