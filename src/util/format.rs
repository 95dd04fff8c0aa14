//! Number formatting utilities.

/// Format a percentage without decimals.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{value:.0}%")
}

/// Format a cost in USD. Sub-cent amounts keep four decimals so they don't read as zero.
#[must_use]
pub fn format_cost(value: f64) -> String {
    if value > 0.0 && value < 0.01 {
        format!("${value:.4}")
    } else {
        format!("${value:.2}")
    }
}

/// Format a token count compactly (`12.5K`, `1.5M`).
#[must_use]
pub fn format_tokens(value: u64) -> String {
    fn format_compact(value: u64, divisor: u64, suffix: &str) -> String {
        let major = value / divisor;
        let minor = (value % divisor) / (divisor / 10);
        format!("{major}.{minor}{suffix}")
    }

    if value >= 1_000_000 {
        format_compact(value, 1_000_000, "M")
    } else if value >= 1_000 {
        format_compact(value, 1_000, "K")
    } else {
        value.to_string()
    }
}

/// Format a per-token rate as dollars per million tokens.
#[must_use]
pub fn format_rate_per_million(per_token: f64) -> String {
    format!("${:.2}/M", per_token * 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tokens_millions() {
        assert_eq!(format_tokens(1_500_000), "1.5M");
    }

    #[test]
    fn format_tokens_thousands() {
        assert_eq!(format_tokens(12_500), "12.5K");
    }

    #[test]
    fn format_tokens_small() {
        assert_eq!(format_tokens(500), "500");
    }

    #[test]
    fn format_cost_small_amounts() {
        assert_eq!(format_cost(0.0), "$0.00");
        assert_eq!(format_cost(0.0042), "$0.0042");
        assert_eq!(format_cost(12.345), "$12.35");
    }

    #[test]
    fn rate_per_million() {
        assert_eq!(format_rate_per_million(3e-6), "$3.00/M");
    }
}
