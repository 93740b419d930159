//! Default coercion of representation values to declared attribute types
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::types::TransformError;
use crate::config::MappingConfig;
use crate::object::AttributeValue;
use crate::schema::AttributeType;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Coerce a value to the declared attribute type
///
/// `Null` passes through unchanged. Collections accept any collection and
/// wrap a lone scalar; anything can be stored as `Json`.
pub fn coerce(
    value: &AttributeValue,
    to: AttributeType,
    config: &MappingConfig,
) -> Result<AttributeValue, TransformError> {
    if value.is_null() || (to != AttributeType::Json && value.conforms_to(to)) {
        return Ok(value.clone());
    }

    let result = match (value, to) {
        (_, AttributeType::Json) => match value {
            AttributeValue::Json(_) => value.clone(),
            other => AttributeValue::Json(other.to_json()),
        },

        (AttributeValue::Integer(i), AttributeType::String) => AttributeValue::String(i.to_string()),
        (AttributeValue::Float(f), AttributeType::String) => AttributeValue::String(f.to_string()),
        (AttributeValue::Bool(b), AttributeType::String) => AttributeValue::String(b.to_string()),
        (AttributeValue::Date(d), AttributeType::String) => AttributeValue::String(format_date(d, config)),

        (AttributeValue::Float(f), AttributeType::Integer) => float_to_integer(*f)
            .map(AttributeValue::Integer)
            .ok_or_else(|| TransformError::conversion(value, to))?,
        (AttributeValue::Bool(b), AttributeType::Integer) => AttributeValue::Integer(i64::from(*b)),
        (AttributeValue::String(s), AttributeType::Integer) => parse_integer(s.trim())
            .map(AttributeValue::Integer)
            .ok_or_else(|| TransformError::conversion(value, to))?,

        (AttributeValue::Integer(i), AttributeType::Float) => AttributeValue::Float(*i as f64),
        (AttributeValue::Bool(b), AttributeType::Float) => AttributeValue::Float(if *b { 1.0 } else { 0.0 }),
        (AttributeValue::String(s), AttributeType::Float) => s
            .trim()
            .parse::<f64>()
            .map(AttributeValue::Float)
            .map_err(|_| TransformError::conversion(value, to))?,

        (AttributeValue::Integer(i), AttributeType::Boolean) => AttributeValue::Bool(*i != 0),
        (AttributeValue::Float(f), AttributeType::Boolean) => AttributeValue::Bool(*f != 0.0),
        (AttributeValue::String(s), AttributeType::Boolean) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => AttributeValue::Bool(true),
            "false" | "no" | "0" | "off" => AttributeValue::Bool(false),
            _ => return Err(TransformError::conversion(value, to)),
        },

        (AttributeValue::String(s), AttributeType::Date) => {
            AttributeValue::Date(parse_date(s, config).ok_or_else(|| TransformError::DateParse {
                value: s.clone(),
                formats: config.date_formats.clone(),
            })?)
        }
        (AttributeValue::Integer(secs), AttributeType::Date) => {
            AttributeValue::Date(from_unix(*secs as f64).ok_or_else(|| TransformError::conversion(value, to))?)
        }
        (AttributeValue::Float(secs), AttributeType::Date) => {
            AttributeValue::Date(from_unix(*secs).ok_or_else(|| TransformError::conversion(value, to))?)
        }

        (_, AttributeType::Array) | (_, AttributeType::Set) | (_, AttributeType::OrderedSet) => {
            let items = collection_items(value).ok_or_else(|| TransformError::conversion(value, to))?;
            match to {
                AttributeType::Set => AttributeValue::set_from(items),
                AttributeType::OrderedSet => AttributeValue::ordered_set_from(items),
                _ => AttributeValue::Array(items),
            }
        }

        _ => return Err(TransformError::conversion(value, to)),
    };

    Ok(result)
}

fn parse_integer(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    float_to_integer(s.parse::<f64>().ok()?)
}

/// Integral floats within the exactly representable range
pub(crate) fn float_to_integer(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn collection_items(value: &AttributeValue) -> Option<Vec<AttributeValue>> {
    match value {
        AttributeValue::Array(items) | AttributeValue::Set(items) | AttributeValue::OrderedSet(items) => {
            Some(items.clone())
        }
        AttributeValue::Json(serde_json::Value::Array(items)) => {
            Some(items.iter().map(AttributeValue::from_json).collect())
        }
        AttributeValue::Json(_) => None,
        scalar => Some(vec![scalar.clone()]),
    }
}

/// Parse a date string: RFC 3339, then each configured format interpreted in
/// the default timezone, then unix seconds
pub fn parse_date(s: &str, config: &MappingConfig) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }

    let offset = config.timezone_offset().ok()?;
    config
        .date_formats
        .iter()
        .find_map(|format| parse_with_format(s, format, &offset))
        .or_else(|| s.parse::<f64>().ok().and_then(from_unix))
}

/// Parse a date string with one strftime format in the given timezone.
/// Formats without a time component yield midnight.
pub fn parse_with_format(s: &str, format: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_str(s, format) {
        return Some(date.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, format)
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, format).ok()?.and_hms_opt(0, 0, 0))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|d| d.with_timezone(&Utc))
}

/// Format a date with the configured output format, RFC 3339 by default
pub fn format_date(date: &DateTime<Utc>, config: &MappingConfig) -> String {
    match (&config.output_date_format, config.timezone_offset()) {
        (Some(format), Ok(offset)) => date.with_timezone(&offset).format(format).to_string(),
        _ => date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    }
}

pub(crate) fn from_unix(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
