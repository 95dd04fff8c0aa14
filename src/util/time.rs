//! Time formatting utilities.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Format a relative time (past or future).
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(target);

    if duration.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let minutes = duration.num_minutes().abs();
    let hours = duration.num_hours().abs();
    let days = duration.num_days().abs();

    let suffix = if duration.num_seconds() > 0 {
        "ago"
    } else {
        "from now"
    };

    if days > 0 {
        format!("{days} day{} {suffix}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{hours} hour{} {suffix}", if hours == 1 { "" } else { "s" })
    } else {
        format!(
            "{minutes} minute{} {suffix}",
            if minutes == 1 { "" } else { "s" }
        )
    }
}

/// Format an age such as a cache file's as `2h 5m`, `45m`, or `30s`.
#[must_use]
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}
