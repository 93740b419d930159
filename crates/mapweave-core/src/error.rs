//! Error types for the Mapweave core library
//!
//! Two layers of errors live here. [`Error`] is the fatal error type returned
//! through [`Result`]: configuration mistakes, structurally invalid
//! descriptors, untraversable input and cancellation. [`MappingError`] is the
//! non-fatal condition accumulated per node during a mapping pass and exposed
//! on the [`MappingResult`](crate::MappingResult).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for Mapweave operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid descriptor, schema or connection configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A descriptor requires identity resolution but no identity cache was supplied
    #[error("Mapping for entity '{entity}' declares identity attributes {attributes:?} but no identity cache is configured")]
    NilIdentityCache {
        entity: String,
        attributes: Vec<String>,
    },

    /// A connection description is structurally invalid
    #[error("Invalid connection for relationship '{relationship}': {message}")]
    InvalidConnection {
        relationship: String,
        message: String,
    },

    /// Schema lookups and type checks against registered entities
    #[error("Schema error: {entity} - {message}")]
    Schema {
        entity: String,
        message: String,
    },

    /// An object id does not resolve to a live object in the graph
    #[error("Object {id} does not exist in the object graph")]
    UnknownObject { id: u64 },

    /// The representation handed to the mapper cannot be traversed
    #[error("Unmappable representation: {message}")]
    UnmappableRepresentation { message: String },

    /// Value transformation failures surfaced outside of a mapping pass
    #[error("Transformation failed: {message}")]
    Transformation {
        message: String,
        key_path: Option<String>,
    },

    /// Invalid key path syntax
    #[error("Invalid key path '{path}': {message}")]
    KeyPath { path: String, message: String },

    /// Operation was used outside its permitted lifecycle
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The mapping pass or connection operation was cancelled before it started
    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    /// Unsupported feature or operation
    #[error("Unsupported operation: {message}")]
    Unsupported {
        message: String,
        feature: Option<String>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parsing errors
    #[error("YAML error: {message}")]
    Yaml {
        message: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn schema(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

/// Severity levels for accumulated mapping conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational, no action required
    Info,
    /// Warning, should be reviewed
    Warning,
    /// Error, the node was not mapped or only partially mapped
    Error,
}

/// Kinds of non-fatal mapping conditions
///
/// The numeric codes are stable and match the historical error domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingErrorCode {
    /// No mapping applies to a reachable node
    NotFound,
    /// Target object and descriptor disagree, or a value could not be coerced
    TypeMismatch,
    /// No property mapping found a value in the representation
    UnmappableRepresentation,
    /// Post-mapping validation rejected the object
    ValidationFailure,
    /// A dynamic mapping had no matching concrete mapping
    UnableToDetermineMapping,
    /// The data source produced no target object
    NilDestinationObject,
    /// Identity resolution required but no cache available
    NilIdentityCache,
    /// A connection could not be evaluated
    InvalidConnection,
}

impl MappingErrorCode {
    /// Stable numeric code
    pub fn code(&self) -> u32 {
        match self {
            MappingErrorCode::NotFound => 1001,
            MappingErrorCode::TypeMismatch => 1002,
            MappingErrorCode::UnmappableRepresentation => 1003,
            MappingErrorCode::ValidationFailure => 1005,
            MappingErrorCode::UnableToDetermineMapping => 1006,
            MappingErrorCode::NilDestinationObject => 1007,
            MappingErrorCode::NilIdentityCache => 1008,
            MappingErrorCode::InvalidConnection => 1010,
        }
    }

    /// Default severity when recorded during a pass
    pub fn default_severity(&self) -> Severity {
        match self {
            MappingErrorCode::UnmappableRepresentation => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A non-fatal condition recorded while mapping one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingError {
    /// Kind of condition
    pub code: MappingErrorCode,
    /// Key path the condition is associated with, if any
    pub key_path: Option<String>,
    /// Human readable description
    pub message: String,
    /// How serious the condition is
    pub severity: Severity,
}

impl MappingError {
    /// Create a condition with the code's default severity
    pub fn new(code: MappingErrorCode, key_path: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            key_path,
            message: message.into(),
            severity: code.default_severity(),
        }
    }

    /// Prefix the key path with the path of an enclosing node
    pub fn nested_under(mut self, parent: &str) -> Self {
        if parent.is_empty() {
            return self;
        }
        self.key_path = Some(match self.key_path.take() {
            Some(path) if !path.is_empty() => format!("{}.{}", parent, path),
            _ => parent.to_string(),
        });
        self
    }

    /// Whether this condition is only a warning
    pub fn is_warning(&self) -> bool {
        self.severity < Severity::Error
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_path {
            Some(path) => write!(f, "[{}] {} at '{}': {}", self.code.code(), self.code, path, self.message),
            None => write!(f, "[{}] {}: {}", self.code.code(), self.code, self.message),
        }
    }
}

impl fmt::Display for MappingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingErrorCode::NotFound => write!(f, "NotFound"),
            MappingErrorCode::TypeMismatch => write!(f, "TypeMismatch"),
            MappingErrorCode::UnmappableRepresentation => write!(f, "UnmappableRepresentation"),
            MappingErrorCode::ValidationFailure => write!(f, "ValidationFailure"),
            MappingErrorCode::UnableToDetermineMapping => write!(f, "UnableToDetermineMapping"),
            MappingErrorCode::NilDestinationObject => write!(f, "NilDestinationObject"),
            MappingErrorCode::NilIdentityCache => write!(f, "NilIdentityCache"),
            MappingErrorCode::InvalidConnection => write!(f, "InvalidConnection"),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}
