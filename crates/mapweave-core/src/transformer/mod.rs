//! Value transformation between representation values and typed attributes
//!
//! Every attribute write goes through [`transform_value`]: a transformer
//! attached to the property (or to the whole object mapping) runs first when
//! it can produce the declared type, and default [`coerce`]ion handles the
//! rest.
//!
//! # Module Organization
//!
//! - [`types`] - The [`ValueTransformer`] trait and [`TransformError`]
//! - [`coerce`] - Default coercion rules and date parsing
//! - [`built_in`] - Ready-made transformers and combinators
//!
//! # Examples
//!
//! ```
//! use mapweave_core::transformer::{built_in, transform_value};
//! use mapweave_core::{AttributeType, AttributeValue, MappingConfig};
//!
//! let status = built_in::map_values([("0", "draft"), ("1", "published")], None);
//! let value = transform_value(
//!     &AttributeValue::Integer(1),
//!     AttributeType::String,
//!     Some(status.as_ref()),
//!     &MappingConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(value, AttributeValue::String("published".to_string()));
//! ```
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

pub mod types;

pub mod coerce;

pub mod built_in;

pub use coerce::{coerce, format_date, parse_date};
pub use types::{SharedTransformer, TransformError, ValueTransformer};

use crate::config::MappingConfig;
use crate::object::AttributeValue;
use crate::schema::AttributeType;

/// Produce a value of the declared type, preferring the given transformer
pub fn transform_value(
    value: &AttributeValue,
    to: AttributeType,
    transformer: Option<&dyn ValueTransformer>,
    config: &MappingConfig,
) -> Result<AttributeValue, TransformError> {
    if value.is_null() {
        return Ok(AttributeValue::Null);
    }

    match transformer {
        Some(t) if t.can_transform(to) => {
            let transformed = t.transform(value, to)?;
            // transformers may return a looser type, e.g. a list for a set attribute
            coerce(&transformed, to, config)
        }
        Some(t) => {
            log::warn!(
                "Transformer '{}' cannot produce {}; falling back to default coercion",
                t.name(),
                to
            );
            coerce(value, to, config)
        }
        None => coerce(value, to, config),
    }
}
