//! cctally - token and cost accounting for local coding-assistant sessions.
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use cctally::cli::{AppContext, Cli};
use cctally::core::logging::{self, LogSettings};
use cctally::util::env::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = LogSettings::resolve(cli.log_level.as_deref(), cli.json_output, cli.verbose);
    logging::init(&settings);

    let format = cli.effective_format();
    let pretty = cli.pretty;
    let color = should_use_color(cli.no_color);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            let error_output = cctally::render::error::render_error(&e, format, color, pretty);
            eprintln!("{error_output}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: &Cli) -> cctally::Result<()> {
    let Some(command) = &cli.command else {
        print_quickstart();
        return Ok(());
    };

    let ctx = AppContext::from_cli(cli)?;
    tracing::debug!(
        log_root = %ctx.config.log_root.display(),
        log_root_source = %ctx.config.sources.log_root,
        offline = ctx.config.pricing.offline,
        "Configuration resolved"
    );
    cctally::cli::dispatch(command, &ctx).await
}

fn print_quickstart() {
    println!(
        r"cctally - token and cost accounting for coding-assistant sessions

USAGE:
    cctally [OPTIONS] <COMMAND>

COMMANDS:
    session         Summarize the latest (or a given) session
    today           Usage since local midnight
    week            Usage since Monday
    month           Usage since the first of the month
    context         Context-window fill for the latest session
    sessions        Recently active sessions
    pricing         Inspect or refresh model pricing
    watch           Live-updating summary as logs change
    history         Usage-history timeline recorded by watch

QUICK START:
    cctally today                 # Today's cost and tokens
    cctally session --by-model    # Latest session, per model
    cctally pricing status        # Where prices came from
    cctally watch                 # Keep today's total current

ROBOT MODE (for AI agents):
    cctally today --json          # JSON output

For more help: cctally --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
