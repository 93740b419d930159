//! Built-in transformers for common operations
//!
//! This module provides ready-made transformers for enum lookups, linear
//! unit conversions and the usual date encodings, plus combinators for
//! chaining transformers and wrapping closures.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::coerce::{float_to_integer, from_unix, parse_with_format};
use super::types::{SharedTransformer, TransformError, ValueTransformer};
use crate::error::{Error, Result};
use crate::object::AttributeValue;
use crate::schema::AttributeType;
use chrono::{FixedOffset, SecondsFormat};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Lookup table from representation strings to attribute strings
#[derive(Debug, Clone)]
pub struct EnumTransformer {
    mappings: BTreeMap<String, String>,
    default: Option<String>,
}

impl ValueTransformer for EnumTransformer {
    fn name(&self) -> &str {
        "enum"
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        matches!(to, AttributeType::String | AttributeType::Json)
    }

    fn transform(&self, value: &AttributeValue, _to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        let key = match value {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Integer(_) | AttributeValue::Bool(_) => value.to_string(),
            _ => {
                return Err(TransformError::EnumMapping {
                    value: value.to_string(),
                    available_mappings: self.mappings.keys().cloned().collect(),
                })
            }
        };

        match self.mappings.get(&key).or(self.default.as_ref()) {
            Some(mapped) => Ok(AttributeValue::String(mapped.clone())),
            None => Err(TransformError::EnumMapping {
                value: key,
                available_mappings: self.mappings.keys().cloned().collect(),
            }),
        }
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        let mappings = self
            .mappings
            .iter()
            .map(|(from, to)| (to.clone(), from.clone()))
            .collect();
        Some(Arc::new(EnumTransformer { mappings, default: None }))
    }
}

/// `output = input * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransformer {
    scale: f64,
    offset: f64,
}

impl ValueTransformer for LinearTransformer {
    fn name(&self) -> &str {
        "linear"
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        matches!(to, AttributeType::Float | AttributeType::Integer)
    }

    fn transform(&self, value: &AttributeValue, to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        let input = match value {
            AttributeValue::Integer(i) => *i as f64,
            AttributeValue::Float(f) => *f,
            AttributeValue::String(s) => s.trim().parse::<f64>().map_err(|_| TransformError::UnitConversion {
                message: format!("'{}' is not a number", s),
            })?,
            other => {
                return Err(TransformError::UnitConversion {
                    message: format!("{} is not a number", other.kind()),
                })
            }
        };

        let output = input * self.scale + self.offset;
        match to {
            AttributeType::Integer => float_to_integer(output.round())
                .map(AttributeValue::Integer)
                .ok_or_else(|| TransformError::UnitConversion {
                    message: format!("{} does not fit an integer", output),
                }),
            _ => Ok(AttributeValue::Float(output)),
        }
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        Some(Arc::new(LinearTransformer {
            scale: 1.0 / self.scale,
            offset: -self.offset / self.scale,
        }))
    }
}

/// Parses strings with explicit strftime formats; the inverse formats with
/// the first one
#[derive(Debug, Clone)]
pub struct DateFormatTransformer {
    formats: Vec<String>,
    timezone: FixedOffset,
}

impl ValueTransformer for DateFormatTransformer {
    fn name(&self) -> &str {
        "date_format"
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        to == AttributeType::Date
    }

    fn transform(&self, value: &AttributeValue, to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        let AttributeValue::String(s) = value else {
            return Err(TransformError::conversion(value, to));
        };
        self.formats
            .iter()
            .find_map(|format| parse_with_format(s.trim(), format, &self.timezone))
            .map(AttributeValue::Date)
            .ok_or_else(|| TransformError::DateParse {
                value: s.clone(),
                formats: self.formats.clone(),
            })
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        let format = self.formats.first()?.clone();
        let timezone = self.timezone;
        Some(from_fn("date_format_inverse", AttributeType::String, move |value| match value {
            AttributeValue::Date(d) => Ok(AttributeValue::String(d.with_timezone(&timezone).format(&format).to_string())),
            other => Err(TransformError::conversion(other, AttributeType::String)),
        }))
    }
}

/// Numbers of seconds (or milliseconds) since the unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixTimestampTransformer {
    millis: bool,
}

impl ValueTransformer for UnixTimestampTransformer {
    fn name(&self) -> &str {
        if self.millis {
            "unix_millis"
        } else {
            "unix_seconds"
        }
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        to == AttributeType::Date
    }

    fn transform(&self, value: &AttributeValue, to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        let raw = match value {
            AttributeValue::Integer(i) => *i as f64,
            AttributeValue::Float(f) => *f,
            AttributeValue::String(s) => s.trim().parse::<f64>().map_err(|_| TransformError::conversion(value, to))?,
            other => return Err(TransformError::conversion(other, to)),
        };
        let secs = if self.millis { raw / 1000.0 } else { raw };
        from_unix(secs)
            .map(AttributeValue::Date)
            .ok_or_else(|| TransformError::conversion(value, to))
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        let millis = self.millis;
        Some(from_fn("unix_timestamp_inverse", AttributeType::Integer, move |value| match value {
            AttributeValue::Date(d) if millis => Ok(AttributeValue::Integer(d.timestamp_millis())),
            AttributeValue::Date(d) => Ok(AttributeValue::Integer(d.timestamp())),
            other => Err(TransformError::conversion(other, AttributeType::Integer)),
        }))
    }
}

/// RFC 3339 / ISO 8601 timestamps
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso8601Transformer;

impl ValueTransformer for Iso8601Transformer {
    fn name(&self) -> &str {
        "iso8601"
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        matches!(to, AttributeType::Date | AttributeType::String)
    }

    fn transform(&self, value: &AttributeValue, to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        match (value, to) {
            (AttributeValue::String(s), AttributeType::Date) => chrono::DateTime::parse_from_rfc3339(s.trim())
                .map(|d| AttributeValue::Date(d.with_timezone(&chrono::Utc)))
                .map_err(|_| TransformError::DateParse {
                    value: s.clone(),
                    formats: vec!["rfc3339".to_string()],
                }),
            (AttributeValue::Date(d), AttributeType::String) => {
                Ok(AttributeValue::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            }
            (other, to) => Err(TransformError::conversion(other, to)),
        }
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        Some(Arc::new(Iso8601Transformer))
    }
}

/// Tries each transformer that can produce the requested type, in order,
/// returning the first success
#[derive(Debug, Clone)]
pub struct CompositeTransformer {
    transformers: Vec<SharedTransformer>,
}

impl ValueTransformer for CompositeTransformer {
    fn name(&self) -> &str {
        "composite"
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        self.transformers.iter().any(|t| t.can_transform(to))
    }

    fn transform(&self, value: &AttributeValue, to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        let mut last_error = None;
        for transformer in self.transformers.iter().filter(|t| t.can_transform(to)) {
            match transformer.transform(value, to) {
                Ok(result) => return Ok(result),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or(TransformError::Unsupported {
            transformer: self.name().to_string(),
            to,
        }))
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        let inverses: Vec<SharedTransformer> = self.transformers.iter().filter_map(|t| t.inverse()).collect();
        if inverses.is_empty() {
            None
        } else {
            Some(Arc::new(CompositeTransformer { transformers: inverses }))
        }
    }
}

type TransformFn = dyn Fn(&AttributeValue) -> std::result::Result<AttributeValue, TransformError> + Send + Sync;

/// Transformer backed by a closure
pub struct FnTransformer {
    name: String,
    output: AttributeType,
    func: Arc<TransformFn>,
    inverse: Option<SharedTransformer>,
}

impl FnTransformer {
    /// Attach the transformer used for the opposite direction
    pub fn with_inverse(mut self, inverse: SharedTransformer) -> Self {
        self.inverse = Some(inverse);
        self
    }
}

impl fmt::Debug for FnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer")
            .field("name", &self.name)
            .field("output", &self.output)
            .finish()
    }
}

impl ValueTransformer for FnTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_transform(&self, to: AttributeType) -> bool {
        to == self.output || to == AttributeType::Json
    }

    fn transform(&self, value: &AttributeValue, _to: AttributeType) -> std::result::Result<AttributeValue, TransformError> {
        (self.func)(value)
    }

    fn inverse(&self) -> Option<SharedTransformer> {
        self.inverse.clone()
    }
}

/// Create an enum lookup transformer
pub fn map_values<I, K, V>(mappings: I, default: Option<String>) -> SharedTransformer
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    Arc::new(EnumTransformer {
        mappings: mappings.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        default,
    })
}

/// Create a linear conversion. The scale must be non-zero so the inverse exists.
pub fn linear(scale: f64, offset: f64) -> Result<SharedTransformer> {
    if scale == 0.0 || !scale.is_finite() || !offset.is_finite() {
        return Err(Error::configuration(format!(
            "Linear transformer needs a finite non-zero scale, got scale={} offset={}",
            scale, offset
        )));
    }
    Ok(Arc::new(LinearTransformer { scale, offset }))
}

/// Create a date parser for explicit formats in a fixed timezone
pub fn date_format<I, S>(formats: I, timezone: FixedOffset) -> Result<SharedTransformer>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let formats: Vec<String> = formats.into_iter().map(Into::into).collect();
    if formats.is_empty() {
        return Err(Error::configuration("Date format transformer needs at least one format"));
    }
    Ok(Arc::new(DateFormatTransformer { formats, timezone }))
}

/// Create a unix seconds transformer
pub fn unix_seconds() -> SharedTransformer {
    Arc::new(UnixTimestampTransformer { millis: false })
}

/// Create a unix milliseconds transformer
pub fn unix_millis() -> SharedTransformer {
    Arc::new(UnixTimestampTransformer { millis: true })
}

/// Create an ISO 8601 transformer
pub fn iso8601() -> SharedTransformer {
    Arc::new(Iso8601Transformer)
}

/// Chain transformers, first success wins
pub fn composite(transformers: Vec<SharedTransformer>) -> SharedTransformer {
    Arc::new(CompositeTransformer { transformers })
}

/// Wrap a closure producing values of one type
pub fn from_fn<F>(name: impl Into<String>, output: AttributeType, func: F) -> SharedTransformer
where
    F: Fn(&AttributeValue) -> std::result::Result<AttributeValue, TransformError> + Send + Sync + 'static,
{
    Arc::new(FnTransformer {
        name: name.into(),
        output,
        func: Arc::new(func),
        inverse: None,
    })
}

/// Wrap a closure together with its inverse
pub fn reversible<F, G>(name: impl Into<String>, output: AttributeType, forward: F, inverse_output: AttributeType, backward: G) -> SharedTransformer
where
    F: Fn(&AttributeValue) -> std::result::Result<AttributeValue, TransformError> + Send + Sync + 'static,
    G: Fn(&AttributeValue) -> std::result::Result<AttributeValue, TransformError> + Send + Sync + 'static,
{
    let name = name.into();
    let inverse = from_fn(format!("{}_inverse", name), inverse_output, backward);
    Arc::new(
        FnTransformer {
            name,
            output,
            func: Arc::new(forward),
            inverse: None,
        }
        .with_inverse(inverse),
    )
}
