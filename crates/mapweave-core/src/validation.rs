//! Post-mapping validation of target objects
//!
//! Validators attached to an object mapping run once per target object after
//! every property mapping has been applied. A rejection rolls the object back
//! and surfaces a `ValidationFailure` condition for that node.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::object::{ObjectGraph, ObjectId};
use std::fmt;
use std::sync::Arc;

/// Why a validator rejected an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Attribute or relationship the failure concerns
    pub key_path: Option<String>,
    /// Human readable reason
    pub message: String,
}

impl ValidationFailure {
    /// Create a failure for a key path
    pub fn new(key_path: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            key_path: key_path.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_path {
            Some(path) => write!(f, "{}: {}", path, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Validates the final state of a mapped object
pub trait Validator: Send + Sync + fmt::Debug {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Accept or reject the object
    fn validate(&self, graph: &ObjectGraph, object: ObjectId) -> Result<(), ValidationFailure>;
}

/// Shared handle to a validator
pub type SharedValidator = Arc<dyn Validator>;

/// Rejects objects whose listed attributes are unset or null
#[derive(Debug, Clone)]
pub struct RequiredAttributes {
    attributes: Vec<String>,
}

impl Validator for RequiredAttributes {
    fn name(&self) -> &str {
        "required_attributes"
    }

    fn validate(&self, graph: &ObjectGraph, object: ObjectId) -> Result<(), ValidationFailure> {
        for name in &self.attributes {
            match graph.attribute(object, name) {
                Some(value) if !value.is_null() => {}
                _ => return Err(ValidationFailure::new(Some(name), "required attribute is missing")),
            }
        }
        Ok(())
    }
}

type ValidateFn = dyn Fn(&ObjectGraph, ObjectId) -> Result<(), ValidationFailure> + Send + Sync;

/// Validator backed by a closure
pub struct FnValidator {
    name: String,
    func: Box<ValidateFn>,
}

impl fmt::Debug for FnValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl Validator for FnValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, graph: &ObjectGraph, object: ObjectId) -> Result<(), ValidationFailure> {
        (self.func)(graph, object)
    }
}

/// Require the given attributes to be present and non-null
pub fn required<I, S>(attributes: I) -> SharedValidator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(RequiredAttributes {
        attributes: attributes.into_iter().map(Into::into).collect(),
    })
}

/// Wrap a closure as a validator
pub fn from_fn<F>(name: impl Into<String>, func: F) -> SharedValidator
where
    F: Fn(&ObjectGraph, ObjectId) -> Result<(), ValidationFailure> + Send + Sync + 'static,
{
    Arc::new(FnValidator {
        name: name.into(),
        func: Box::new(func),
    })
}
