// ABOUTME: Cell-level normalization for date-time, decimal and free-form JSON values
// ABOUTME: Dates become UTC millisecond strings; decimals are rounded to two places

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value as JsonValue;

use crate::watermark::epoch_sentinel;

/// Serialized date-time layout (millisecond precision, no timezone).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Fractional digits kept for decimal columns.
pub const DECIMAL_SCALE: u32 = 2;

/// Largest magnitude that fits `Decimal(15, 2)`.
const DECIMAL_INTEGER_DIGITS: u32 = 13;

/// What a missing or empty numeric value becomes.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum MissingNumbers {
    /// Empty cell; the sink stores NULL.
    #[default]
    Blank,
    /// Explicit zero.
    Zero,
}

/// Render any JSON value as a cell: strings verbatim, scalars via their JSON
/// text, null as empty, nested values as compact JSON.
pub fn value_to_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Parse the tracker's timestamp variants, converting aware values to UTC.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Tracker style: 2024-05-01T10:00:00.123+0000
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Normalize a date-time cell.
///
/// Missing, null and empty values become the epoch sentinel. Unparseable
/// text also becomes the sentinel unless `strict` is set, in which case the
/// reason is returned as an error.
pub fn normalize_datetime(value: Option<&JsonValue>, strict: bool) -> Result<String, String> {
    let raw = match value {
        None | Some(JsonValue::Null) => return Ok(format_datetime(&epoch_sentinel())),
        Some(JsonValue::String(s)) if s.trim().is_empty() => {
            return Ok(format_datetime(&epoch_sentinel()))
        }
        Some(JsonValue::String(s)) => s.as_str(),
        Some(other) => {
            return fallback_datetime(&other.to_string(), strict);
        }
    };

    match parse_datetime(raw) {
        Some(parsed) => Ok(format_datetime(&parsed)),
        None => fallback_datetime(raw, strict),
    }
}

fn fallback_datetime(raw: &str, strict: bool) -> Result<String, String> {
    if strict {
        return Err(format!("unparseable date-time '{}'", raw));
    }
    tracing::warn!(value = raw, "unparseable date-time, using epoch sentinel");
    Ok(format_datetime(&epoch_sentinel()))
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Normalize a decimal cell to [`DECIMAL_SCALE`] places.
///
/// Missing, null and empty values follow `missing`; anything present that is
/// not a number is an error, never a silent zero.
pub fn normalize_decimal(value: Option<&JsonValue>, missing: MissingNumbers) -> Result<String, String> {
    let parsed = match value {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::Number(n)) => Some(
            parse_decimal(&n.to_string()).ok_or_else(|| format!("number '{}' is out of range", n))?,
        ),
        Some(JsonValue::String(s)) if s.trim().is_empty() => None,
        Some(JsonValue::String(s)) => Some(
            parse_decimal(s.trim()).ok_or_else(|| format!("'{}' is not a number", s))?,
        ),
        Some(other) => return Err(format!("expected a number, got {}", other)),
    };

    let Some(number) = parsed else {
        return Ok(match missing {
            MissingNumbers::Blank => String::new(),
            MissingNumbers::Zero => format_decimal(Decimal::ZERO),
        });
    };

    let rounded = number.round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::MidpointAwayFromZero);
    let limit = Decimal::from(10u64.pow(DECIMAL_INTEGER_DIGITS));
    if rounded.abs() >= limit {
        return Err(format!(
            "{} does not fit {} integer digits",
            rounded, DECIMAL_INTEGER_DIGITS
        ));
    }
    Ok(format_decimal(rounded))
}

fn format_decimal(mut value: Decimal) -> String {
    value.rescale(DECIMAL_SCALE);
    value.to_string()
}
