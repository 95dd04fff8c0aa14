//! CLI argument parsing and command dispatch.

pub mod args;
pub mod context;
pub mod history;
pub mod pricing;
pub mod sessions;
pub mod summary;
pub mod watch;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::engine::UsageEngine;
use crate::error::Result;
use crate::render::RenderOptions;
use crate::storage::config::ResolvedConfig;
use crate::storage::paths::AppPaths;
use crate::util::env::should_use_color;

/// Everything a command needs: resolved settings, paths, and the engine.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: ResolvedConfig,
    pub paths: AppPaths,
    pub engine: UsageEngine,
    pub render: RenderOptions,
}

impl AppContext {
    /// Build from an already-resolved configuration.
    #[must_use]
    pub fn new(config: ResolvedConfig, paths: AppPaths) -> Self {
        let engine = UsageEngine::new(&config, &paths);
        let render = RenderOptions::new(
            config.format,
            config.pretty,
            should_use_color(config.no_color),
        );
        Self {
            config,
            paths,
            engine,
            render,
        }
    }

    /// Resolve configuration from the CLI, environment and config file.
    ///
    /// # Errors
    ///
    /// Propagates configuration errors from [`ResolvedConfig::resolve`].
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = ResolvedConfig::resolve(cli)?;
        Ok(Self::new(config, AppPaths::new()))
    }
}

/// Run one command to completion.
///
/// # Errors
///
/// Returns whatever the command returns; rendering is left to the caller.
pub async fn dispatch(command: &Commands, ctx: &AppContext) -> Result<()> {
    match command {
        Commands::Session(args) => summary::execute_session(args, ctx).await,
        Commands::Today(args) => summary::execute_period(crate::core::Period::Today, args, ctx).await,
        Commands::Week(args) => summary::execute_period(crate::core::Period::Week, args, ctx).await,
        Commands::Month(args) => summary::execute_period(crate::core::Period::Month, args, ctx).await,
        Commands::Context(args) => context::execute(args, ctx),
        Commands::Sessions(args) => sessions::execute(args, ctx),
        Commands::Pricing(cmd) => pricing::execute(cmd, ctx).await,
        Commands::Watch(args) => watch::execute(args, ctx).await,
        Commands::History(args) => history::execute(args, ctx),
    }
}

/// Print a rendered block to stdout without doubling the trailing newline.
pub(crate) fn emit(output: &str) {
    println!("{}", output.trim_end_matches('\n'));
}
