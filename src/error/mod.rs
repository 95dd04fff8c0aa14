//! Error types for cctally.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into five main categories:
//! - **Network**: Connection, timeout, or HTTP status issues while fetching prices
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Data**: Missing log roots or sessions, unreadable price tables
//! - **Environment**: Home directory or permission problems
//! - **Internal**: I/O, serialization, storage, or unclassified failures
//!
//! Each error has a stable error code (e.g., `CCT-N001`) for programmatic handling.
//!
//! Most of these never reach the user. Pricing refresh failures are absorbed into a
//! provenance change, and aggregation over missing data yields an empty summary. The
//! variants exist so the lower layers can report precisely what went wrong to the
//! layer that decides to recover.

pub mod suggestions;

use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network issues (timeout, HTTP status, connection failures).
    Network,
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// Data issues (missing logs, unusable price tables).
    Data,
    /// Environment issues (home directory, permissions).
    Environment,
    /// Internal errors (I/O, serialization, storage).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Data => "Data error",
            Self::Environment => "Environment error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Data => "D",
            Self::Environment => "E",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Config or data parse errors
    ParseError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for cctally operations.
#[derive(Error, Debug)]
pub enum TallyError {
    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Request timed out.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Connection failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// An in-flight operation was cancelled before it finished.
    #[error("operation cancelled")]
    Cancelled,

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse {
        path: String,
        line: Option<usize>,
        message: String,
    },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    // ==========================================================================
    // Data errors (Category: Data)
    // ==========================================================================
    /// Remote or cached price table could not be parsed.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    /// The log root directory does not exist.
    #[error("log directory not found: {path}")]
    LogRootNotFound { path: String },

    /// A requested session log does not exist.
    #[error("session log not found: {path}")]
    SessionNotFound { path: String },

    /// The persisted price cache is unreadable in every known format.
    #[error("corrupt pricing cache at {path}: {message}")]
    CorruptCache { path: String, message: String },

    // ==========================================================================
    // Environment errors (Category: Environment)
    // ==========================================================================
    /// Home directory could not be determined.
    #[error("cannot determine home directory")]
    HomeDirUnavailable,

    /// Permission denied accessing file or directory.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TallyError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::ParseResponse(_)
            | Self::CorruptCache { .. } => ExitCode::ParseError,

            Self::Timeout(_) => ExitCode::Timeout,

            Self::Network(_)
            | Self::Cancelled
            | Self::LogRootNotFound { .. }
            | Self::SessionNotFound { .. }
            | Self::HomeDirUnavailable
            | Self::PermissionDenied { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Cancelled => ErrorCategory::Network,

            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Self::ParseResponse(_)
            | Self::LogRootNotFound { .. }
            | Self::SessionNotFound { .. }
            | Self::CorruptCache { .. } => ErrorCategory::Data,

            Self::HomeDirUnavailable | Self::PermissionDenied { .. } => ErrorCategory::Environment,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `CCT-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            // Network errors (N001-N099)
            Self::Timeout(_) => "CCT-N001",
            Self::Cancelled => "CCT-N002",
            Self::Network(_) => "CCT-N099",

            // Configuration errors (C001-C099)
            Self::ConfigParse { .. } => "CCT-C002",
            Self::ConfigInvalid { .. } => "CCT-C003",
            Self::Config(_) => "CCT-C004",

            // Data errors (D001-D099)
            Self::LogRootNotFound { .. } => "CCT-D001",
            Self::SessionNotFound { .. } => "CCT-D002",
            Self::ParseResponse(_) => "CCT-D010",
            Self::CorruptCache { .. } => "CCT-D011",

            // Environment errors (E001-E099)
            Self::HomeDirUnavailable => "CCT-E001",
            Self::PermissionDenied { .. } => "CCT-E003",

            // Internal errors (X001-X099)
            Self::Io(_) => "CCT-X001",
            Self::Json(_) => "CCT-X002",
            Self::Other(_) => "CCT-X099",
        }
    }

    /// Returns whether the error is potentially recoverable by retrying.
    ///
    /// Only transport-level failures qualify; a malformed price table will be just as
    /// malformed five seconds later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::Timeout(seconds) => suggestions::timeout_suggestions(*seconds),
            Self::Network(message) => suggestions::network_suggestions(message),
            Self::Cancelled => Vec::new(),
            Self::Config(message) => vec![FixSuggestion::new(
                vec!["cctally --log-level debug today".to_string()],
                format!("Configuration error: {message}"),
            )],
            Self::ConfigParse {
                path,
                line,
                message,
            } => suggestions::config_parse_suggestions(path, *line, message),
            Self::ConfigInvalid {
                key,
                value,
                message,
            } => suggestions::config_invalid_suggestions(key, value, message),
            Self::ParseResponse(message) => suggestions::parse_response_suggestions(message),
            Self::LogRootNotFound { path } => suggestions::log_root_suggestions(path),
            Self::SessionNotFound { path } => suggestions::session_not_found_suggestions(path),
            Self::CorruptCache { path, .. } => suggestions::corrupt_cache_suggestions(path),
            Self::HomeDirUnavailable => suggestions::home_dir_suggestions(),
            Self::PermissionDenied { path } => suggestions::permission_denied_suggestions(path),
            Self::Io(_) | Self::Json(_) | Self::Other(_) => Vec::new(),
        }
    }
}

/// Result type alias for cctally operations.
pub type Result<T> = std::result::Result<T, TallyError>;
