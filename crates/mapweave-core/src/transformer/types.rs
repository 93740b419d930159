//! Core types for value transformation
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::object::AttributeValue;
use crate::schema::AttributeType;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while transforming a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Type conversion failed
    #[error("Type conversion failed: cannot convert {from} to {to} for value: {value}")]
    TypeConversion {
        from: String,
        to: AttributeType,
        value: String,
    },

    /// No date format matched
    #[error("Date parsing failed for '{value}' (tried {formats:?})")]
    DateParse { value: String, formats: Vec<String> },

    /// Enum mapping not found
    #[error("Enum mapping not found: {value}")]
    EnumMapping {
        value: String,
        available_mappings: Vec<String>,
    },

    /// Numeric conversion failed
    #[error("Unit conversion failed: {message}")]
    UnitConversion { message: String },

    /// The transformer cannot produce the requested type
    #[error("Transformer '{transformer}' cannot produce {to}")]
    Unsupported {
        transformer: String,
        to: AttributeType,
    },

    /// Failure reported by a user supplied transformer
    #[error("{message}")]
    Custom { message: String },
}

impl TransformError {
    pub(crate) fn conversion(value: &AttributeValue, to: AttributeType) -> Self {
        TransformError::TypeConversion {
            from: value.kind().to_string(),
            to,
            value: value.to_string(),
        }
    }
}

impl From<TransformError> for crate::Error {
    fn from(err: TransformError) -> Self {
        crate::Error::Transformation {
            message: err.to_string(),
            key_path: None,
        }
    }
}

/// Converts values between representation and object form
///
/// Transformers are attached to property mappings or to a whole object
/// mapping. They are shared between threads and must be stateless.
pub trait ValueTransformer: Send + Sync + fmt::Debug {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Whether this transformer can produce values of the given type
    fn can_transform(&self, to: AttributeType) -> bool;

    /// Transform a value into the given type
    fn transform(&self, value: &AttributeValue, to: AttributeType) -> Result<AttributeValue, TransformError>;

    /// The transformer for the opposite direction, used when serializing
    fn inverse(&self) -> Option<Arc<dyn ValueTransformer>> {
        None
    }
}

/// Shared handle to a transformer
pub type SharedTransformer = Arc<dyn ValueTransformer>;
