use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::process::utils::clean_str;

pub const CNPJ_DIGITS: usize = 14;

/// Expected format of CVM reference dates.
pub const CVM_DATE_FORMAT: &str = "%Y-%m-%d";

/// A normalized CNPJ: exactly 14 ASCII digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cnpj(String);

impl Cnpj {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip punctuation from a CNPJ and left-pad it to 14 digits.
///
/// Returns `None` for inputs with no digits or more than 14 of them, so one
/// malformed row never aborts a batch. Idempotent on its own output.
pub fn normalize_cnpj(value: &str) -> Option<Cnpj> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() > CNPJ_DIGITS {
        return None;
    }
    Some(Cnpj(format!("{:0>width$}", digits, width = CNPJ_DIGITS)))
}

/// Parse a CVM reference date; anything unparseable is `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    parse_date_with(value, &[CVM_DATE_FORMAT])
}

/// Try each format in order.
pub fn parse_date_with(value: &str, formats: &[&str]) -> Option<NaiveDate> {
    let cleaned = clean_str(value);
    if cleaned.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
}

/// Parse a monetary/quantity value written with either `.` or `,` as the
/// decimal separator (`1234.5`, `1234,5`, `1.234,5`).
pub fn parse_decimal(value: &str) -> Option<f64> {
    let cleaned = clean_str(value);
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer counts; integral decimals such as `"12.0"` are accepted.
pub fn parse_count(value: &str) -> Option<i64> {
    let cleaned = clean_str(value);
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    parse_decimal(cleaned)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}
