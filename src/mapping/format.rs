//! Date format candidates, compiled once per column.
//!
//! A `format` entry may be a single strftime string, a list of strings, or a
//! mapping keyed by precision (`time`, `day`, `month`, `year`) whose values are
//! themselves a string or a list. All shapes flatten into one candidate list
//! ranked from most to least precise.

use serde_yaml_ng::Value as YamlValue;

use crate::error::{LoaderError, Result};
use crate::value::DatePrecision;

/// One strftime pattern to try, tagged with the precision a match carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateCandidate {
    pub format: String,
    pub precision: DatePrecision,
}

/// Flatten a `format` value into ranked candidates.
pub fn compile_formats(spec: &YamlValue, column: &str) -> Result<Vec<DateCandidate>> {
    let mut candidates = match spec {
        YamlValue::String(_) | YamlValue::Sequence(_) => format_strings(spec, column)?
            .into_iter()
            .map(|format| DateCandidate {
                precision: infer_precision(&format),
                format,
            })
            .collect(),
        YamlValue::Mapping(map) => {
            let mut out = Vec::new();
            for (key, value) in map {
                let precision = key
                    .as_str()
                    .and_then(DatePrecision::from_key)
                    .ok_or_else(|| {
                        LoaderError::schema(format!(
                            "column {}: unknown date precision {:?} (expected time, day, month or year)",
                            column, key
                        ))
                    })?;
                for format in format_strings(value, column)? {
                    out.push(DateCandidate { format, precision });
                }
            }
            out
        }
        other => {
            return Err(LoaderError::schema(format!(
                "column {}: date format must be a string, a list or a mapping by precision, got {:?}",
                column, other
            )))
        }
    };

    if candidates.is_empty() {
        return Err(LoaderError::schema(format!(
            "column {}: date format lists no patterns",
            column
        )));
    }

    // Stable: declaration order is kept within one precision level.
    candidates.sort_by_key(|c| c.precision);
    Ok(candidates)
}

fn format_strings(value: &YamlValue, column: &str) -> Result<Vec<String>> {
    match value {
        YamlValue::String(s) => Ok(vec![s.clone()]),
        YamlValue::Sequence(seq) => seq
            .iter()
            .map(|item| match item {
                YamlValue::String(s) => Ok(s.clone()),
                other => Err(LoaderError::schema(format!(
                    "column {}: date format entries must be strings, got {:?}",
                    column, other
                ))),
            })
            .collect(),
        other => Err(LoaderError::schema(format!(
            "column {}: date format must be a string or a list of strings, got {:?}",
            column, other
        ))),
    }
}

/// Guess the precision of a bare pattern from the finest directive it uses.
pub fn infer_precision(format: &str) -> DatePrecision {
    let mut finest = DatePrecision::Year;
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            continue;
        }
        // skip padding and width modifiers such as %-d, %_H, %3f, %:z
        let directive = chars
            .by_ref()
            .find(|d| !matches!(d, '-' | '_' | '0'..='9' | '^' | '#' | ':' | '.'));
        let level = match directive {
            Some('H' | 'I' | 'k' | 'l' | 'M' | 'S' | 'T' | 'R' | 'r' | 'X' | 'c' | 's' | 'f') => {
                DatePrecision::Time
            }
            Some('d' | 'e' | 'j' | 'D' | 'F' | 'x') => DatePrecision::Day,
            Some('m' | 'b' | 'B' | 'h') => DatePrecision::Month,
            _ => continue,
        };
        finest = finest.min(level);
    }
    finest
}
