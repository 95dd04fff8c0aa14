//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// cctally - token and cost accounting for local coding-assistant sessions.
#[derive(Parser, Debug)]
#[command(name = "cctally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Session log root (default: ~/.claude/projects)
    #[arg(long, value_name = "DIR", global = true)]
    pub log_root: Option<PathBuf>,

    /// Never fetch the remote price table
    #[arg(long, global = true)]
    pub offline: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize the latest (or a given) session
    Session(SessionArgs),

    /// Summarize usage since local midnight
    Today(PeriodArgs),

    /// Summarize usage since Monday 00:00 local time
    Week(PeriodArgs),

    /// Summarize usage since the first of the month
    Month(PeriodArgs),

    /// Show context-window fill for the latest session and its sub-agents
    Context(ContextArgs),

    /// List recently active sessions
    Sessions(SessionsArgs),

    /// Inspect or refresh model pricing
    #[command(subcommand)]
    Pricing(PricingCommand),

    /// Keep today's summary up to date as logs change
    Watch(WatchArgs),

    /// Show or prune the usage-history timeline
    History(HistoryArgs),
}

/// Arguments for the `session` command.
#[derive(Parser, Debug, Default)]
pub struct SessionArgs {
    /// Session log file (default: most recently modified)
    #[arg(long, value_name = "FILE")]
    pub path: Option<PathBuf>,

    /// Include a per-model breakdown
    #[arg(long)]
    pub by_model: bool,
}

/// Arguments for the time-bounded summary commands.
#[derive(Parser, Debug, Default)]
pub struct PeriodArgs {
    /// Include a per-model breakdown
    #[arg(long)]
    pub by_model: bool,
}

/// Arguments for the `context` command.
#[derive(Parser, Debug, Default)]
pub struct ContextArgs {
    /// Session log file (default: most recently modified)
    #[arg(long, value_name = "FILE")]
    pub path: Option<PathBuf>,
}

/// Arguments for the `sessions` command.
#[derive(Parser, Debug, Default)]
pub struct SessionsArgs {
    /// Activity threshold in minutes
    #[arg(long, value_name = "N")]
    pub active_minutes: Option<u64>,
}

/// Pricing subcommands.
#[derive(Subcommand, Debug)]
pub enum PricingCommand {
    /// Show where current prices came from
    Status,

    /// Fetch the remote price table now
    Refresh,

    /// Show the rates applied to a model id
    Show {
        /// Raw model id, e.g. claude-opus-4-1-20250805
        model: String,
    },
}

/// Arguments for the `watch` command.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Re-render at least this often even without log changes
    #[arg(long, value_name = "N", default_value = "60")]
    pub interval_secs: u64,
}

impl WatchArgs {
    /// Validate argument combinations.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.interval_secs == 0 {
            return Err(crate::error::TallyError::Config(
                "Watch interval must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

/// Arguments for the `history` command.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: Option<HistoryCommand>,

    /// How many days of samples to show
    #[arg(long, default_value = "7")]
    pub days: u32,
}

/// History subcommands.
#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// Delete samples older than the retention window
    Prune,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    #[default]
    Human,
    /// JSON output
    Json,
}
