//! Error rendering.
//!
//! Human format prints a short block with the error code and fix suggestions,
//! styled when stderr is a color terminal. JSON format prints a structured object
//! for machine consumption.

use std::fmt::Write as _;

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, TallyError};

// =============================================================================
// Public API
// =============================================================================

/// Render an error for the selected output format.
#[must_use]
pub fn render_error(error: &TallyError, format: OutputFormat, color: bool, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human => render_human(error, color),
    }
}

/// Render error as structured JSON.
#[must_use]
pub fn render_error_json(error: &TallyError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_human(error, false))
}

// =============================================================================
// Human Rendering
// =============================================================================

fn render_human(error: &TallyError, color: bool) -> String {
    let suggestions = error.fix_suggestions();
    let mut out = String::new();

    let head = format!("Error [{}]", error.error_code());
    if color {
        let _ = writeln!(out, "{}: {error}", head.red().bold());
    } else {
        let _ = writeln!(out, "{head}: {error}");
    }

    if let Some(suggestion) = suggestions.first() {
        render_suggestion(&mut out, suggestion, color);
    }

    out.trim_end().to_string()
}

fn render_suggestion(out: &mut String, suggestion: &FixSuggestion, color: bool) {
    if !suggestion.context.is_empty() {
        let _ = writeln!(out, "  {}", suggestion.context);
    }

    // Comment lines are hints, not commands.
    if let Some(cmd) = suggestion.commands.iter().find(|c| !c.starts_with('#')) {
        if color {
            let _ = writeln!(out, "  {} {}", "Fix:".bold(), cmd.cyan());
        } else {
            let _ = writeln!(out, "  Fix: {cmd}");
        }
    }

    if let Some(prevention) = &suggestion.prevention {
        if color {
            let _ = writeln!(out, "  {}", prevention.dimmed());
        } else {
            let _ = writeln!(out, "  {prevention}");
        }
    }
}

// =============================================================================
// JSON Rendering
// =============================================================================

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    error_code: String,
    category: String,
    message: String,
    is_retryable: bool,
    suggestions: Vec<SuggestionJson>,
}

#[derive(serde::Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &TallyError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                })
                .collect(),
        }
    }
}
