//! Centralized filename parsing for the `YYYY-MM-DD-name` convention.
//!
//! Essays are conventionally named with their publication date in front of
//! the name (`2026-01-24-store-buffers.md`). This module extracts both parts
//! consistently and owns the slug and date rules every stage agrees on.
//!
//! ## Display Titles
//!
//! Dashes in the name portion are converted to spaces for display:
//! - `2026-01-24-store-buffers` → "store buffers"
//! - `virtual-dispatch` → "virtual dispatch"

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Result of parsing an entry name like `2026-01-24-store-buffers`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Date prefix if present (e.g. `2026-01-24`).
    pub date: Option<NaiveDate>,
    /// Raw name part after the date, dashes preserved. Empty if date-only.
    /// For undated entries, this is the full input.
    pub name: String,
    /// Display title: name with dashes converted to spaces.
    pub display_title: String,
}

/// Parse an entry name following the `YYYY-MM-DD-name` convention.
///
/// - `"2026-01-24-store-buffers"` → date=2026-01-24, name="store-buffers"
/// - `"2026-01-24"` → date=2026-01-24, name=""
/// - `"2026-13-01-nope"` → date=None, name="2026-13-01-nope" (not a real date)
/// - `"about"` → date=None, name="about"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if name.len() >= 10
        && name.is_char_boundary(10)
        && let Ok(date) = NaiveDate::parse_from_str(&name[..10], "%Y-%m-%d")
    {
        let rest = &name[10..];
        if rest.is_empty() || rest.starts_with('-') {
            let raw = rest.trim_start_matches('-');
            return ParsedName {
                date: Some(date),
                name: raw.to_string(),
                display_title: raw.replace('-', " "),
            };
        }
    }
    ParsedName {
        date: None,
        name: name.to_string(),
        display_title: name.replace('-', " "),
    }
}

/// Convert arbitrary text to a URL-safe slug.
///
/// Transliterates to ASCII, lowercases, replaces every run of
/// non-alphanumeric characters with a single `-` and trims dashes at both
/// ends. Returns an empty string when nothing survives.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Parse a publication date written in front-matter.
///
/// Accepts the shapes essays actually use: `2026-01-24`,
/// `2026-01-24 10:30:00`, `2026-01-24 10:30:00 +0100` and RFC 3339.
/// Only the calendar date is kept.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dated_with_multi_word_name() {
        let p = parse_entry_name("2026-01-24-store-buffers");
        assert_eq!(p.date, Some(ymd(2026, 1, 24)));
        assert_eq!(p.name, "store-buffers");
        assert_eq!(p.display_title, "store buffers");
    }

    #[test]
    fn date_only() {
        let p = parse_entry_name("2026-01-24");
        assert_eq!(p.date, Some(ymd(2026, 1, 24)));
        assert_eq!(p.name, "");
        assert_eq!(p.display_title, "");
    }

    #[test]
    fn undated_name() {
        let p = parse_entry_name("virtual-dispatch");
        assert_eq!(p.date, None);
        assert_eq!(p.name, "virtual-dispatch");
        assert_eq!(p.display_title, "virtual dispatch");
    }

    #[test]
    fn invalid_calendar_date_is_part_of_name() {
        let p = parse_entry_name("2026-13-01-nope");
        assert_eq!(p.date, None);
        assert_eq!(p.name, "2026-13-01-nope");
    }

    #[test]
    fn date_glued_to_name_is_not_a_prefix() {
        let p = parse_entry_name("2026-01-24x");
        assert_eq!(p.date, None);
    }

    #[test]
    fn short_and_multibyte_names_do_not_panic() {
        assert_eq!(parse_entry_name("ab").date, None);
        assert_eq!(parse_entry_name("日本語のエッセイ").date, None);
    }

    // =========================================================================
    // slugify
    // =========================================================================

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("The x86-TSO Memory Model"), "the-x86-tso-memory-model");
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("  --Hello,   World!--  "), "hello-world");
    }

    #[test]
    fn slugify_transliterates() {
        assert_eq!(slugify("Café Über"), "cafe-uber");
    }

    #[test]
    fn slugify_empty_when_nothing_survives() {
        assert_eq!(slugify("!!!"), "");
    }

    // =========================================================================
    // parse_date
    // =========================================================================

    #[test]
    fn parse_plain_date() {
        assert_eq!(parse_date("2026-01-20"), Some(ymd(2026, 1, 20)));
    }

    #[test]
    fn parse_jekyll_datetime_with_offset() {
        assert_eq!(
            parse_date("2026-01-24 10:00:00 +0000"),
            Some(ymd(2026, 1, 24))
        );
    }

    #[test]
    fn parse_rfc3339() {
        assert_eq!(parse_date("2026-01-24T23:10:00Z"), Some(ymd(2026, 1, 24)));
    }

    #[test]
    fn parse_naive_datetime() {
        assert_eq!(parse_date("2026-01-24 08:15:00"), Some(ymd(2026, 1, 24)));
    }

    #[test]
    fn reject_garbage_date() {
        assert_eq!(parse_date("last tuesday"), None);
        assert_eq!(parse_date("2026-02-30"), None);
    }
}
