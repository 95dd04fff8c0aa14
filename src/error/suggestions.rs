//! Fix suggestion database for cctally errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    /// These should be copy-paste ready for the terminal.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Suggestions for timeouts while fetching the remote price table.
#[must_use]
pub fn timeout_suggestions(seconds: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["cctally pricing refresh".to_string(), "cctally pricing status".to_string()],
            format!(
                "The price table did not download within {seconds}s. Cached or bundled \
                 prices stay in effect until a refresh succeeds."
            ),
        )
        .with_prevention("Raise `pricing.timeout_secs` in the config file on slow links."),
    ]
}

/// Suggestions for generic network failures.
#[must_use]
pub fn network_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["cctally pricing status".to_string()],
            format!("Network error: {message}. Check your internet connection."),
        )
        .with_prevention(
            "Set `pricing.offline = true` (or CCTALLY_OFFLINE=1) to skip network refreshes.",
        ),
    ]
}

/// Suggestions for config parse failures.
#[must_use]
pub fn config_parse_suggestions(path: &str, line: Option<usize>, message: &str) -> Vec<FixSuggestion> {
    let location = line.map_or_else(String::new, |l| format!(" at line {l}"));
    vec![FixSuggestion::new(
        vec![format!("$EDITOR {path}")],
        format!("The config file {path} could not be parsed{location}: {message}"),
    )]
}

/// Suggestions for invalid config values.
#[must_use]
pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("# set a valid value for {key}")],
        format!("The value '{value}' for '{key}' is invalid: {message}"),
    )]
}

/// Suggestions for unreadable price tables.
#[must_use]
pub fn parse_response_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["cctally pricing status".to_string()],
        format!(
            "The price table could not be parsed: {message}. The upstream format may \
             have changed; bundled prices remain available."
        ),
    )]
}

/// Suggestions when the log root is missing.
#[must_use]
pub fn log_root_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("ls {path}"), "CCTALLY_LOG_ROOT=/path/to/projects cctally today".to_string()],
            format!(
                "No session logs were found under {path}. The assistant writes them \
                 after its first conversation."
            ),
        )
        .with_prevention("Set `general.log_root` in the config file if logs live elsewhere."),
    ]
}

/// Suggestions when an explicit session path does not exist.
#[must_use]
pub fn session_not_found_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["cctally sessions".to_string()],
        format!("The session log {path} does not exist. List active sessions to pick one."),
    )]
}

/// Suggestions for a corrupt pricing cache.
#[must_use]
pub fn corrupt_cache_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("rm {path}"), "cctally pricing refresh".to_string()],
        format!("The pricing cache at {path} is unreadable and will be rebuilt on the next refresh."),
    )]
}

/// Suggestions when the home directory cannot be resolved.
#[must_use]
pub fn home_dir_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["export HOME=/path/to/home".to_string()],
        "The home directory could not be determined, so default log and cache paths are unknown.",
    )]
}

/// Suggestions for permission failures.
#[must_use]
pub fn permission_denied_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("ls -la {path}")],
        format!("Permission denied reading {path}."),
    )]
}
