//! Value codec: decodes raw extracted strings into typed values.
//!
//! Entities store every field as the raw string read from the document.
//! Decoding happens on read, so derived columns and consumers share one
//! set of parsing rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Declared value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Float,
    Percent,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Float => "float",
            ColumnType::Percent => "percent",
            ColumnType::String => "string",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = CodecError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "float" => Ok(ColumnType::Float),
            "percent" => Ok(ColumnType::Percent),
            "string" => Ok(ColumnType::String),
            other => Err(CodecError::UnknownType(other.to_string())),
        }
    }
}

/// How FLOAT values are cleaned before parsing.
///
/// `Separators` drops grouping characters (`,`, spaces, apostrophes) and keeps
/// the sign and decimal point. `DigitsOnly` keeps ASCII digits and nothing else;
/// it exists for compatibility with older exports and corrupts fractional values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatParsing {
    #[default]
    Separators,
    DigitsOnly,
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown data type: {0}")]
    UnknownType(String),

    #[error("'{raw}' is not a valid {column_type} value")]
    NotNumeric { raw: String, column_type: ColumnType },
}

/// Decode a raw field with the default FLOAT rules.
pub fn decode(raw: &str, column_type: ColumnType) -> Result<Value, CodecError> {
    decode_with(raw, column_type, FloatParsing::default())
}

/// Decode a raw field whose type arrives as a string tag (e.g. from JSON).
///
/// Fails with [`CodecError::UnknownType`] for anything other than
/// `float`, `percent` or `string`.
pub fn decode_tagged(raw: &str, tag: &str) -> Result<Value, CodecError> {
    decode(raw, tag.parse()?)
}

pub fn decode_with(
    raw: &str,
    column_type: ColumnType,
    float_parsing: FloatParsing,
) -> Result<Value, CodecError> {
    let not_numeric = || CodecError::NotNumeric {
        raw: raw.to_string(),
        column_type,
    };

    match column_type {
        ColumnType::String => Ok(Value::Text(raw.to_string())),
        ColumnType::Percent => leading_number(raw.trim())
            .map(|v| Value::Number(v / 100.0))
            .ok_or_else(not_numeric),
        ColumnType::Float => {
            let parsed = match float_parsing {
                FloatParsing::Separators => {
                    let cleaned: String = raw
                        .trim()
                        .chars()
                        .filter(|c| !matches!(c, ',' | ' ' | '\'' | '\u{a0}'))
                        .collect();
                    leading_number(&cleaned)
                }
                FloatParsing::DigitsOnly => {
                    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
                    digits.parse::<f64>().ok()
                }
            };
            parsed.map(Value::Number).ok_or_else(not_numeric)
        }
    }
}

/// Encode a number in the raw form `decode` accepts for the given type.
pub fn encode(value: f64, column_type: ColumnType) -> String {
    match column_type {
        ColumnType::Percent => format!("{}", value * 100.0),
        ColumnType::Float | ColumnType::String => format!("{value}"),
    }
}

/// Fixed-point rendering used for derived values (`25.00`).
pub fn format_fixed(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}

/// Parse the longest numeric prefix: sign, digits, fraction, exponent.
///
/// Trailing text such as a `%` sign is ignored. Returns `None` when the
/// prefix holds no digits or does not parse to a finite number.
fn leading_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}
