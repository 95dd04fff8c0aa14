//! Model identifier resolution.
//!
//! Maps a raw model id from a log line to a family, an optional version, and the
//! pricing key used to look up rates. Resolution never fails: an id nobody has heard
//! of still prices against [`DEFAULT_PRICING_KEY`], flagged as a fallback.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::models::{ModelFamily, ModelIdentifier};

/// Mid-tier key used when nothing better matches.
pub const DEFAULT_PRICING_KEY: &str = "claude-sonnet-4-5";

/// `vendor-family-major[-minor][-date]`, e.g. `claude-opus-4-5-20251101`.
static FAMILY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z]+-(opus|sonnet|haiku)-(\d+)(?:[-.](\d{1,2}))?(?:-\d{8})?(?:[^0-9]|$)")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Legacy `vendor-major[-minor]-family[-date]`, e.g. `claude-3-5-sonnet-20241022`.
static VERSION_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z]+-(\d+)(?:[-.](\d{1,2}))?-(opus|sonnet|haiku)(?:[^a-z]|$)")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Detect the family by case-insensitive substring match.
#[must_use]
pub fn detect_family(raw_id: &str) -> ModelFamily {
    let lower = raw_id.to_lowercase();
    ModelFamily::KNOWN
        .into_iter()
        .find(|family| family.token().is_some_and(|token| lower.contains(token)))
        .unwrap_or(ModelFamily::Unknown)
}

/// Extract a `major[.minor]` version string.
///
/// Ids that follow neither naming scheme have no version; that is expected.
#[must_use]
pub fn extract_version(raw_id: &str) -> Option<String> {
    if let Some(caps) = FAMILY_FIRST.captures(raw_id) {
        return Some(join_version(caps.get(2)?.as_str(), caps.get(3).map(|m| m.as_str())));
    }
    if let Some(caps) = VERSION_FIRST.captures(raw_id) {
        return Some(join_version(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str())));
    }
    None
}

fn join_version(major: &str, minor: Option<&str>) -> String {
    match minor {
        Some(minor) => format!("{major}.{minor}"),
        None => major.to_string(),
    }
}

/// Parse a version string into `(major, minor)`, treating a missing minor as zero.
#[must_use]
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Every run of ASCII digits in `key`, most significant first.
#[must_use]
pub fn numeric_components(key: &str) -> Vec<u64> {
    key.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .filter_map(|run| run.parse().ok())
        .collect()
}

/// The newest key containing the family token.
///
/// Keys compare by their numeric components element-wise; when one sequence is a
/// prefix of the other the longer one wins. Fully equal sequences fall back to the
/// lexicographically smaller key so the answer does not depend on iteration order.
#[must_use]
pub fn newest_key_in_family<'a>(
    family: ModelFamily,
    keys: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let token = family.token()?;
    keys.into_iter()
        .filter(|key| key.to_lowercase().contains(token))
        .map(|key| (numeric_components(key), key))
        .max_by(|(a_nums, a_key), (b_nums, b_key)| {
            a_nums.cmp(b_nums).then_with(|| b_key.cmp(a_key))
        })
        .map(|(_, key)| key)
}

/// Resolve a raw model id against the known pricing keys (lowercase).
///
/// Priority: exact match, bare family shorthand (newest in family, not a fallback),
/// newest in family (fallback), then [`DEFAULT_PRICING_KEY`] (fallback).
#[must_use]
pub fn resolve<'a>(raw_id: &str, known_keys: impl IntoIterator<Item = &'a str>) -> ModelIdentifier {
    let keys: Vec<&str> = known_keys.into_iter().collect();
    let trimmed = raw_id.trim();
    let family = detect_family(trimmed);
    let version = extract_version(trimmed);

    let build = |pricing_key: &str, is_fallback: bool| ModelIdentifier {
        raw_id: raw_id.to_string(),
        family,
        version: version.clone(),
        pricing_key: pricing_key.to_string(),
        is_fallback,
    };

    if let Some(key) = keys.iter().find(|key| key.eq_ignore_ascii_case(trimmed)) {
        return build(key, false);
    }

    let is_bare_family = family
        .token()
        .is_some_and(|token| trimmed.eq_ignore_ascii_case(token));

    if family != ModelFamily::Unknown {
        if let Some(newest) = newest_key_in_family(family, keys.iter().copied()) {
            if !is_bare_family {
                tracing::debug!(raw_id, pricing_key = newest, "Priced by family fallback");
            }
            return build(newest, !is_bare_family);
        }
    }

    tracing::debug!(raw_id, pricing_key = DEFAULT_PRICING_KEY, "Priced by default key");
    build(DEFAULT_PRICING_KEY, true)
}
