//! `sessions` command.

use std::time::Duration;

use crate::cli::args::SessionsArgs;
use crate::cli::{AppContext, emit};
use crate::error::{Result, TallyError};
use crate::render;

/// List sessions written within the activity threshold.
///
/// # Errors
///
/// `ConfigInvalid` for a zero threshold, or a render failure.
pub fn execute(args: &SessionsArgs, ctx: &AppContext) -> Result<()> {
    let threshold = match args.active_minutes {
        Some(0) => {
            return Err(TallyError::ConfigInvalid {
                key: "active-minutes".to_string(),
                value: "0".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Some(minutes) => Some(Duration::from_secs(minutes * 60)),
        None => None,
    };

    let sessions = ctx.engine.active_sessions(threshold);
    emit(&render::render_sessions(&sessions, ctx.render)?);
    Ok(())
}
