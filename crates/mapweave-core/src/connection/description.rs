//! Declarations of how a relationship is connected
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use crate::keypath::KeyPath;
use crate::object::{AttributeValue, KeyPathValue, ObjectGraph, ObjectId};
use crate::schema::Schema;
use std::fmt;
use std::sync::Arc;

/// How related objects are found
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionKind {
    /// Look up destination objects whose attributes equal the source
    /// object's attributes, pairwise (`source attribute -> destination attribute`)
    ForeignKey { attributes: Vec<(String, String)> },
    /// Read related objects directly from a key path on the source object
    KeyPath { key_path: KeyPath },
}

type ConnectionPredicate = dyn Fn(&ObjectGraph, ObjectId) -> bool + Send + Sync;

/// Restricts which source objects a connection applies to
#[derive(Clone)]
pub enum ConnectionMatcher {
    /// The value at the key path equals the expected value
    KeyPath {
        key_path: KeyPath,
        expected: AttributeValue,
    },
    /// Arbitrary predicate over the source object
    Predicate(Arc<ConnectionPredicate>),
}

impl ConnectionMatcher {
    /// Match when the attribute at `key_path` equals `expected`
    pub fn key_path(key_path: &str, expected: impl Into<AttributeValue>) -> Result<Self> {
        Ok(ConnectionMatcher::KeyPath {
            key_path: KeyPath::parse(key_path)?,
            expected: expected.into(),
        })
    }

    /// Match with a closure
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&ObjectGraph, ObjectId) -> bool + Send + Sync + 'static,
    {
        ConnectionMatcher::Predicate(Arc::new(predicate))
    }

    /// Evaluate against a source object
    pub fn matches(&self, graph: &ObjectGraph, object: ObjectId) -> bool {
        match self {
            ConnectionMatcher::KeyPath { key_path, expected } => match graph.value_for_key_path(object, key_path) {
                Some(KeyPathValue::Attribute(actual)) => actual.cache_key() == expected.cache_key(),
                _ => false,
            },
            ConnectionMatcher::Predicate(predicate) => predicate(graph, object),
        }
    }
}

impl fmt::Debug for ConnectionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMatcher::KeyPath { key_path, expected } => f
                .debug_struct("KeyPath")
                .field("key_path", &key_path.to_string())
                .field("expected", expected)
                .finish(),
            ConnectionMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Declares how one relationship of a mapped object is populated by lookup
///
/// Construction validates structure so that a malformed connection is caught
/// before any object is touched.
#[derive(Debug, Clone)]
pub struct ConnectionDescription {
    relationship: String,
    kind: ConnectionKind,
    matcher: Option<ConnectionMatcher>,
}

impl ConnectionDescription {
    /// Connect by attribute equivalence. Source and destination attributes
    /// are paired by position, so both lists must have the same length.
    pub fn foreign_key(relationship: &str, source_attributes: &[&str], destination_attributes: &[&str]) -> Result<Self> {
        if source_attributes.len() != destination_attributes.len() {
            return Err(invalid(
                relationship,
                format!(
                    "{} source attributes but {} destination attributes",
                    source_attributes.len(),
                    destination_attributes.len()
                ),
            ));
        }
        Self::foreign_key_pairs(
            relationship,
            source_attributes
                .iter()
                .zip(destination_attributes)
                .map(|(s, d)| (s.to_string(), d.to_string())),
        )
    }

    /// Connect by attribute equivalence from explicit pairs
    pub fn foreign_key_pairs<I>(relationship: &str, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        check_name(relationship, relationship)?;
        let attributes: Vec<(String, String)> = pairs.into_iter().collect();
        if attributes.is_empty() {
            return Err(invalid(relationship, "foreign key connection needs at least one attribute pair"));
        }
        for (source, destination) in &attributes {
            check_name(relationship, source)?;
            check_name(relationship, destination)?;
        }
        let mut sources: Vec<&String> = attributes.iter().map(|(s, _)| s).collect();
        sources.sort();
        sources.dedup();
        if sources.len() != attributes.len() {
            return Err(invalid(relationship, "source attributes must be distinct"));
        }

        Ok(Self {
            relationship: relationship.to_string(),
            kind: ConnectionKind::ForeignKey { attributes },
            matcher: None,
        })
    }

    /// Connect by reading a key path on the source object
    pub fn key_path(relationship: &str, key_path: &str) -> Result<Self> {
        check_name(relationship, relationship)?;
        let key_path = KeyPath::parse(key_path).map_err(|e| invalid(relationship, e.to_string()))?;
        if key_path.is_root() {
            return Err(invalid(relationship, "key path must not be empty"));
        }
        Ok(Self {
            relationship: relationship.to_string(),
            kind: ConnectionKind::KeyPath { key_path },
            matcher: None,
        })
    }

    /// Only connect source objects accepted by the matcher
    pub fn with_matcher(mut self, matcher: ConnectionMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Name of the relationship being populated
    pub fn relationship(&self) -> &str {
        &self.relationship
    }

    /// Lookup strategy
    pub fn kind(&self) -> &ConnectionKind {
        &self.kind
    }

    /// Optional source object filter
    pub fn matcher(&self) -> Option<&ConnectionMatcher> {
        self.matcher.as_ref()
    }

    /// Check the connection against the schema of the source entity
    pub fn validate_against(&self, schema: &Schema, entity: &str) -> Result<()> {
        let source = schema.entity(entity)?;
        let relationship = source.relationship_named(&self.relationship).ok_or_else(|| {
            invalid(&self.relationship, format!("'{}' has no such relationship", entity))
        })?;

        if let ConnectionKind::ForeignKey { attributes } = &self.kind {
            let destination = schema.entity(&relationship.destination_entity)?;
            for (source_attribute, destination_attribute) in attributes {
                if source.attribute_named(source_attribute).is_none() {
                    return Err(invalid(
                        &self.relationship,
                        format!("'{}' has no attribute '{}'", entity, source_attribute),
                    ));
                }
                if destination.attribute_named(destination_attribute).is_none() {
                    return Err(invalid(
                        &self.relationship,
                        format!("'{}' has no attribute '{}'", destination.name, destination_attribute),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_name(relationship: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(invalid(relationship, "names must not be empty"));
    }
    Ok(())
}

fn invalid(relationship: &str, message: impl Into<String>) -> Error {
    Error::InvalidConnection {
        relationship: relationship.to_string(),
        message: message.into(),
    }
}
