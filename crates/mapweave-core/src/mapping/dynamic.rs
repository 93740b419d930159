//! Dynamic mappings that pick a concrete object mapping per node
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::ObjectMapping;
use crate::error::{Error, Result};
use crate::keypath::KeyPath;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type RepresentationPredicate = dyn Fn(&Value) -> bool + Send + Sync;

/// Condition evaluated against a node's representation
#[derive(Clone)]
pub enum MatchCondition {
    /// The value at the key path equals the expected value. Numbers compare
    /// by value and match their string form.
    KeyPath { key_path: KeyPath, expected: Value },
    /// The string form of the value at the key path matches a regex
    Pattern { key_path: KeyPath, pattern: Regex },
    /// Arbitrary predicate over the whole representation
    Predicate(Arc<RepresentationPredicate>),
}

impl MatchCondition {
    /// Evaluate against a representation
    pub fn matches(&self, representation: &Value) -> bool {
        match self {
            MatchCondition::KeyPath { key_path, expected } => key_path
                .get_ref(representation)
                .is_some_and(|actual| values_match(actual, expected)),
            MatchCondition::Pattern { key_path, pattern } => match key_path.get_ref(representation) {
                Some(Value::String(s)) => pattern.is_match(s),
                Some(Value::Number(n)) => pattern.is_match(&n.to_string()),
                Some(Value::Bool(b)) => pattern.is_match(&b.to_string()),
                _ => false,
            },
            MatchCondition::Predicate(predicate) => predicate(representation),
        }
    }
}

impl fmt::Debug for MatchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCondition::KeyPath { key_path, expected } => {
                write!(f, "KeyPath({} == {})", key_path, expected)
            }
            MatchCondition::Pattern { key_path, pattern } => {
                write!(f, "Pattern({} =~ /{}/)", key_path, pattern.as_str())
            }
            MatchCondition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => s.trim() == b.to_string(),
        _ => false,
    }
}

/// A condition paired with the mapping it selects
#[derive(Debug, Clone)]
pub struct MappingMatcher {
    condition: MatchCondition,
    mapping: Arc<ObjectMapping>,
}

impl MappingMatcher {
    /// Select `mapping` when the value at `key_path` equals `expected`
    pub fn key_path(key_path: &str, expected: impl Into<Value>, mapping: Arc<ObjectMapping>) -> Result<Self> {
        Ok(Self {
            condition: MatchCondition::KeyPath {
                key_path: KeyPath::parse(key_path)?,
                expected: expected.into(),
            },
            mapping,
        })
    }

    /// Select `mapping` when the value at `key_path` matches a regex
    pub fn pattern(key_path: &str, pattern: &str, mapping: Arc<ObjectMapping>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::Configuration {
            message: format!("Invalid matcher pattern '{}'", pattern),
            source: Some(e.into()),
        })?;
        Ok(Self {
            condition: MatchCondition::Pattern {
                key_path: KeyPath::parse(key_path)?,
                pattern,
            },
            mapping,
        })
    }

    /// Select `mapping` when the predicate accepts the representation
    pub fn predicate<F>(predicate: F, mapping: Arc<ObjectMapping>) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: MatchCondition::Predicate(Arc::new(predicate)),
            mapping,
        }
    }

    /// The condition
    pub fn condition(&self) -> &MatchCondition {
        &self.condition
    }

    /// The mapping selected on match
    pub fn mapping(&self) -> &Arc<ObjectMapping> {
        &self.mapping
    }
}

/// Ordered matchers; the first one that matches wins
#[derive(Debug, Clone, Default)]
pub struct DynamicMapping {
    matchers: Vec<MappingMatcher>,
}

impl DynamicMapping {
    /// Create a dynamic mapping with no matchers
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a matcher
    pub fn matcher(mut self, matcher: MappingMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// The matchers in evaluation order
    pub fn matchers(&self) -> &[MappingMatcher] {
        &self.matchers
    }

    /// Concrete mapping for a representation, `None` when nothing matches
    pub fn object_mapping_for(&self, representation: &Value) -> Option<&Arc<ObjectMapping>> {
        self.matchers
            .iter()
            .find(|m| m.condition.matches(representation))
            .map(|m| &m.mapping)
    }
}
