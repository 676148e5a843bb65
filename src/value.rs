//! Typed property values produced by coercion.

use base64::Engine;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;

/// How specific a parsed date is, most precise first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Time,
    Day,
    Month,
    Year,
}

impl DatePrecision {
    /// All levels, most precise first.
    pub const RANKED: [DatePrecision; 4] = [
        DatePrecision::Time,
        DatePrecision::Day,
        DatePrecision::Month,
        DatePrecision::Year,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "time" => Some(DatePrecision::Time),
            "day" => Some(DatePrecision::Day),
            "month" => Some(DatePrecision::Month),
            "year" => Some(DatePrecision::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatePrecision::Time => "time",
            DatePrecision::Day => "day",
            DatePrecision::Month => "month",
            DatePrecision::Year => "year",
        }
    }
}

impl fmt::Display for DatePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content fetched for a `file` column. The name is the URL it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FileValue {
    pub name: String,
    pub data: Vec<u8>,
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    File(FileValue),
}

/// The result of coercing one raw value: the value plus, for formatted
/// dates, the precision of the candidate that matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: PropertyValue,
    pub precision: Option<DatePrecision>,
}

impl Coerced {
    pub fn plain(value: PropertyValue) -> Self {
        Self {
            value,
            precision: None,
        }
    }

    pub fn dated(value: NaiveDateTime, precision: DatePrecision) -> Self {
        Self {
            value: PropertyValue::DateTime(value),
            precision: Some(precision),
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyValue::Null => serializer.serialize_none(),
            PropertyValue::String(s) => serializer.serialize_str(s),
            PropertyValue::Bool(b) => serializer.serialize_bool(*b),
            PropertyValue::Int(i) => serializer.serialize_i64(*i),
            PropertyValue::Float(f) => serializer.serialize_f64(*f),
            PropertyValue::DateTime(dt) => {
                serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            PropertyValue::File(file) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("file_name", &file.name)?;
                map.serialize_entry(
                    "data",
                    &base64::engine::general_purpose::STANDARD.encode(&file.data),
                )?;
                map.end()
            }
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            PropertyValue::File(file) => write!(f, "<file {} ({} bytes)>", file.name, file.data.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_precision_ranking() {
        assert!(DatePrecision::Time < DatePrecision::Day);
        assert!(DatePrecision::Month < DatePrecision::Year);
        assert_eq!(DatePrecision::from_key("month"), Some(DatePrecision::Month));
        assert_eq!(DatePrecision::from_key("week"), None);
    }

    #[test]
    fn test_value_json() {
        let dt = NaiveDate::from_ymd_opt(2020, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let json = serde_json::to_value(PropertyValue::DateTime(dt)).unwrap();
        assert_eq!(json, serde_json::json!("2020-03-01T00:00:00"));
        assert_eq!(
            serde_json::to_value(PropertyValue::Null).unwrap(),
            serde_json::Value::Null
        );
    }

    #[test]
    fn test_file_value_json_is_base64() {
        let value = PropertyValue::File(FileValue {
            name: "http://example.org/a.txt".to_string(),
            data: b"hi".to_vec(),
        });
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["file_name"], "http://example.org/a.txt");
        assert_eq!(json["data"], "aGk=");
    }
}
