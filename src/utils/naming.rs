//! Event name normalization and filesystem-safe path segments.
//!
//! Everything here is pure: the same input always yields the same output,
//! which is what keeps relative paths stable across re-scrapes.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Event name used when a row group has no usable event text.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Longest segment (in bytes) most filesystems accept.
const MAX_SEGMENT_BYTES: usize = 255;

static LEADING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d\d)/(\d\d)/(\d{4})").unwrap());

static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/?<>\\:*|"]"#).unwrap());

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x80-\x9f]").unwrap());

static RESERVED_DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.+$").unwrap());

static WINDOWS_RESERVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(con|prn|aux|nul|com[0-9]|lpt[0-9])(\..*)?$").unwrap()
});

static WINDOWS_TRAILING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[. ]+$").unwrap());

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static DASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

/// Separator placed between the year, month and day of a rewritten date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSeparator {
    /// `2020-12-31`
    #[default]
    Dash,
    /// `2020_12_31`
    Underscore,
}

impl DateSeparator {
    pub fn as_char(&self) -> char {
        match self {
            Self::Dash => '-',
            Self::Underscore => '_',
        }
    }
}

impl fmt::Display for DateSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dash => write!(f, "dash"),
            Self::Underscore => write!(f, "underscore"),
        }
    }
}

impl FromStr for DateSeparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dash" | "-" => Ok(Self::Dash),
            "underscore" | "_" => Ok(Self::Underscore),
            other => Err(format!("unknown date separator: {}", other)),
        }
    }
}

/// Rewrite a leading `MM/DD/YYYY` date to `YYYY-MM-DD` (or `YYYY_MM_DD`).
///
/// The rest of the string is left untouched. An empty result becomes
/// [`UNKNOWN_EVENT`].
pub fn normalize_event(raw: &str, separator: DateSeparator) -> String {
    let sep = separator.as_char();
    let normalized = LEADING_DATE
        .replace(raw, |caps: &regex::Captures<'_>| {
            format!("{}{sep}{}{sep}{}", &caps[3], &caps[1], &caps[2])
        })
        .into_owned();

    if normalized.is_empty() {
        UNKNOWN_EVENT.to_string()
    } else {
        normalized
    }
}

/// Strip characters and names that are unsafe in a file name on any host OS.
///
/// Whitespace is preserved; see [`sanitize_segment`] for the path-segment form.
pub fn sanitize_filename(raw: &str) -> String {
    let cleaned = ILLEGAL_CHARS.replace_all(raw, "");
    let cleaned = CONTROL_CHARS.replace_all(&cleaned, "");
    let truncated = truncate_bytes(&cleaned, MAX_SEGMENT_BYTES);
    let trimmed = WINDOWS_TRAILING.replace(truncated, "");

    if RESERVED_DOTS.is_match(&trimmed) || WINDOWS_RESERVED.is_match(&trimmed) {
        return String::new();
    }
    trimmed.into_owned()
}

/// Turn an arbitrary string into a single safe path segment.
///
/// After [`sanitize_filename`], whitespace runs become one dash and dash runs
/// collapse to one dash. Applying it twice gives the same result as once.
pub fn sanitize_segment(raw: &str) -> String {
    let sanitized = sanitize_filename(raw);
    let dashed = WHITESPACE_RUN.replace_all(&sanitized, "-");
    let collapsed = DASH_RUN.replace_all(&dashed, "-");

    if collapsed.is_empty() {
        UNKNOWN_EVENT.to_string()
    } else {
        collapsed.into_owned()
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_event_rewrites_leading_date() {
        assert_eq!(
            normalize_event("12/31/2020 Annual Review", DateSeparator::Dash),
            "2020-12-31 Annual Review"
        );
        assert_eq!(
            normalize_event("12/31/2020 Annual Review", DateSeparator::Underscore),
            "2020_12_31 Annual Review"
        );
    }

    #[test]
    fn test_normalize_event_without_date() {
        assert_eq!(
            normalize_event("Miscellaneous", DateSeparator::Dash),
            "Miscellaneous"
        );
    }

    #[test]
    fn test_normalize_event_only_anchored_date() {
        assert_eq!(
            normalize_event("Filed 12/31/2020", DateSeparator::Dash),
            "Filed 12/31/2020"
        );
        assert_eq!(
            normalize_event("1/2/2020 Notice", DateSeparator::Dash),
            "1/2/2020 Notice"
        );
    }

    #[test]
    fn test_normalize_event_empty() {
        assert_eq!(normalize_event("", DateSeparator::Dash), "unknown");
    }

    #[test]
    fn test_sanitize_segment_reserved_chars() {
        let out = sanitize_segment("Report:  Guardian///Update");
        assert_eq!(out, "Report-GuardianUpdate");
        assert!(!out.contains('/'));
        assert!(!out.contains(':'));
        assert!(!out.contains("--"));
    }

    #[test]
    fn test_sanitize_segment_collapses_dashes() {
        assert_eq!(sanitize_segment("Report - Guardian"), "Report-Guardian");
        assert_eq!(sanitize_segment("a -- b"), "a-b");
    }

    #[test]
    fn test_sanitize_segment_is_idempotent() {
        let inputs = [
            "Report:  Guardian///Update",
            "2020-12-31 Review",
            "  leading and trailing  ",
            "con .",
            "notes...",
            "tab\tseparated\nlines",
            "CON",
            "a. b",
            "",
        ];
        for input in inputs {
            let once = sanitize_segment(input);
            assert_eq!(sanitize_segment(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_sanitize_segment_windows_rules() {
        assert_eq!(sanitize_segment("notes..."), "notes");
        assert_eq!(sanitize_segment("CON"), "unknown");
        assert_eq!(sanitize_segment("lpt1.txt"), "unknown");
        assert_eq!(sanitize_segment(".."), "unknown");
    }

    #[test]
    fn test_sanitize_filename_keeps_spaces() {
        assert_eq!(sanitize_filename("Jane Doe"), "Jane Doe");
        assert_eq!(sanitize_filename("P123/456"), "P123456");
    }

    #[test]
    fn test_sanitize_filename_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let out = sanitize_filename(&long);
        assert!(out.len() <= 255);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_date_separator_from_str() {
        assert_eq!("dash".parse::<DateSeparator>(), Ok(DateSeparator::Dash));
        assert_eq!("_".parse::<DateSeparator>(), Ok(DateSeparator::Underscore));
        assert!("slash".parse::<DateSeparator>().is_err());
    }
}
