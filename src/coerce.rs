//! Raw cell text to typed values.
//!
//! Everything here is pure; `file` columns only yield the URL to fetch and the
//! resolver does the fetching.

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{DateTime, NaiveDateTime};

use crate::mapping::{ColumnType, DateCandidate, DateFormat};
use crate::value::{Coerced, PropertyValue};

/// Tokens read as `true`, compared case-insensitively.
pub const BOOL_TRUISH: &[&str] = &["t", "true", "yes", "y", "1"];

/// Patterns tried, in order, when a date column has no explicit format.
const NATURAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%B %Y",
    "%b %Y",
    "%Y-%m",
    "%Y",
];

/// What a column's raw text turns into before any I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    Value(Coerced),
    /// A `file` column: the URL still has to be fetched.
    Fetch(String),
}

/// Coerce one non-blank raw value. `None` means the text does not parse as
/// the column's type.
pub fn coerce(raw: &str, column_type: &ColumnType) -> Option<Conversion> {
    let coerced = match column_type {
        ColumnType::String => Coerced::plain(PropertyValue::String(raw.to_string())),
        ColumnType::Bool => Coerced::plain(PropertyValue::Bool(parse_bool(raw))),
        ColumnType::Int => Coerced::plain(PropertyValue::Int(raw.trim().parse().ok()?)),
        ColumnType::Float => Coerced::plain(PropertyValue::Float(raw.trim().parse().ok()?)),
        ColumnType::Date(DateFormat::Natural) => {
            Coerced::plain(PropertyValue::DateTime(parse_natural_date(raw)?))
        }
        ColumnType::Date(DateFormat::Candidates(candidates)) => {
            let (value, precision) = parse_ranked_date(raw, candidates)?;
            Coerced::dated(value, precision)
        }
        ColumnType::File => return Some(Conversion::Fetch(raw.trim().to_string())),
    };
    Some(Conversion::Value(coerced))
}

pub fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    BOOL_TRUISH.contains(&lowered.as_str())
}

/// Try each candidate in rank order; the first match wins.
pub fn parse_ranked_date(
    raw: &str,
    candidates: &[DateCandidate],
) -> Option<(NaiveDateTime, crate::value::DatePrecision)> {
    let raw = raw.trim();
    candidates
        .iter()
        .find_map(|c| parse_with_format(raw, &c.format).map(|dt| (dt, c.precision)))
}

/// Parse with one strftime pattern. Components the pattern does not cover
/// take their lowest value, so `%Y` alone yields January 1st at midnight.
pub fn parse_with_format(raw: &str, format: &str) -> Option<NaiveDateTime> {
    let mut parsed = Parsed::new();
    parse(&mut parsed, raw, StrftimeItems::new(format)).ok()?;
    if let Ok(dt) = parsed.to_naive_datetime_with_offset(0) {
        return Some(dt);
    }
    // Setters refuse to overwrite a component the input already fixed.
    if parsed.to_naive_date().is_err() {
        let _ = parsed.set_month(1);
        let _ = parsed.set_day(1);
    }
    if parsed.to_naive_time().is_err() {
        let _ = parsed.set_hour(0);
        let _ = parsed.set_minute(0);
    }
    parsed.to_naive_datetime_with_offset(0).ok()
}

/// Best-effort date guessing for columns without a format.
pub fn parse_natural_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_utc());
    }
    NATURAL_FORMATS
        .iter()
        .find_map(|format| parse_with_format(raw, format))
}
