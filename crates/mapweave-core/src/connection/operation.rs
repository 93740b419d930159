//! Populating relationships of a mapped object by lookup
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::description::{ConnectionDescription, ConnectionKind};
use crate::cache::IdentityCache;
use crate::cancel::CancellationToken;
use crate::config::MappingConfig;
use crate::error::{Error, MappingError, MappingErrorCode, Result};
use crate::object::{AttributeValue, KeyPathValue, ObjectGraph, ObjectId, RelationshipValue};
use crate::schema::{Cardinality, CollectionKind, RelationshipDescription};
use crate::transformer::coerce;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

/// What a connection assigned to its relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectedValue {
    /// A to-one relationship connected to one object
    Object(ObjectId),
    /// A to-many relationship connected to a collection, possibly empty
    Collection {
        kind: CollectionKind,
        objects: Vec<ObjectId>,
    },
    /// A to-one relationship for which nothing was found
    NoValue,
}

impl ConnectedValue {
    /// Connected object ids, in relationship order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        match self {
            ConnectedValue::Object(id) => vec![*id],
            ConnectedValue::Collection { objects, .. } => objects.clone(),
            ConnectedValue::NoValue => Vec::new(),
        }
    }

    /// Whether nothing was connected
    pub fn is_no_value(&self) -> bool {
        matches!(self, ConnectedValue::NoValue)
    }
}

/// Outcome of one [`ConnectionOperation`]
#[derive(Debug, Clone, Default)]
pub struct ConnectionReport {
    /// Source object whose relationships were connected
    pub object: Option<ObjectId>,
    /// Relationship name to connected value
    pub connections: BTreeMap<String, ConnectedValue>,
    /// Relationships whose matcher rejected the source object
    pub skipped: Vec<String>,
    /// Connections that could not be applied
    pub errors: Vec<MappingError>,
}

type CompletionCallback = Box<dyn FnOnce(&BTreeMap<String, ConnectedValue>) + Send>;

/// Connects the relationships of one mapped object
///
/// Not finding a related object is a normal outcome: a to-one relationship
/// receives [`ConnectedValue::NoValue`] and a to-many relationship an empty
/// collection.
pub struct ConnectionOperation {
    object: ObjectId,
    connections: Vec<ConnectionDescription>,
    cancellation: CancellationToken,
    config: MappingConfig,
    completion: Option<CompletionCallback>,
}

impl fmt::Debug for ConnectionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOperation")
            .field("object", &self.object)
            .field("connections", &self.connections)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

impl ConnectionOperation {
    /// Create an operation for an object and the connections of its mapping
    pub fn new(object: ObjectId, connections: Vec<ConnectionDescription>) -> Self {
        Self {
            object,
            connections,
            cancellation: CancellationToken::new(),
            config: MappingConfig::default(),
            completion: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Configuration used to coerce foreign key values
    pub fn with_config(mut self, config: MappingConfig) -> Self {
        self.config = config;
        self
    }

    /// Callback invoked once with every connected value after the operation
    pub fn on_completion<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&BTreeMap<String, ConnectedValue>) + Send + 'static,
    {
        self.completion = Some(Box::new(callback));
        self
    }

    /// Source object
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Whether the operation's token was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run every connection against the graph
    pub fn perform(mut self, graph: &mut ObjectGraph, cache: &dyn IdentityCache) -> Result<ConnectionReport> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled {
                message: format!("connection operation for {} cancelled before start", self.object),
            });
        }
        let entity = graph.record(self.object)?.entity.clone();

        let mut report = ConnectionReport {
            object: Some(self.object),
            ..Default::default()
        };

        for connection in &self.connections {
            let name = connection.relationship();
            if let Some(matcher) = connection.matcher() {
                if !matcher.matches(graph, self.object) {
                    trace!(object = %self.object, relationship = name, "connection matcher rejected object");
                    report.skipped.push(name.to_string());
                    continue;
                }
            }

            let description = match graph.entity_of(self.object)?.relationship_named(name) {
                Some(description) => description.clone(),
                None => {
                    report.errors.push(invalid(name, format!("'{}' has no relationship '{}'", entity, name)));
                    continue;
                }
            };

            let found = match connection.kind() {
                ConnectionKind::ForeignKey { attributes } => {
                    self.find_by_foreign_key(graph, cache, &description, attributes)?
                }
                ConnectionKind::KeyPath { key_path } => match graph.value_for_key_path(self.object, key_path) {
                    None => Vec::new(),
                    Some(KeyPathValue::Object(id)) => vec![id],
                    Some(KeyPathValue::Objects(ids)) => ids,
                    Some(KeyPathValue::Attribute(value)) if value.is_null() => Vec::new(),
                    Some(KeyPathValue::Attribute(value)) => {
                        report.errors.push(invalid(
                            name,
                            format!("key path '{}' reads {} instead of objects", key_path, value.kind()),
                        ));
                        continue;
                    }
                },
            };

            let found: Vec<ObjectId> = found
                .into_iter()
                .filter(|id| {
                    graph
                        .get(*id)
                        .is_some_and(|record| record.entity == description.destination_entity)
                })
                .collect();

            let (relationship, connected) = match description.cardinality {
                Cardinality::ToOne => match found.first() {
                    Some(id) => (RelationshipValue::ToOne(Some(*id)), ConnectedValue::Object(*id)),
                    None => (RelationshipValue::ToOne(None), ConnectedValue::NoValue),
                },
                Cardinality::ToMany => {
                    let relationship = RelationshipValue::to_many(description.collection_kind, found);
                    let connected = ConnectedValue::Collection {
                        kind: description.collection_kind,
                        objects: relationship.object_ids(),
                    };
                    (relationship, connected)
                }
            };

            if let Err(e) = graph.set_relationship(self.object, name, relationship) {
                report.errors.push(invalid(name, e.to_string()));
                continue;
            }
            debug!(object = %self.object, relationship = name, connected = ?connected, "connected relationship");
            report.connections.insert(name.to_string(), connected);
        }

        if let Some(callback) = self.completion.take() {
            callback(&report.connections);
        }
        Ok(report)
    }

    /// Destination objects whose attributes equal the source attributes.
    /// Collection-valued source attributes match any of their elements.
    fn find_by_foreign_key(
        &self,
        graph: &ObjectGraph,
        cache: &dyn IdentityCache,
        description: &RelationshipDescription,
        attributes: &[(String, String)],
    ) -> Result<Vec<ObjectId>> {
        let destination = graph.schema().entity(&description.destination_entity)?;

        let mut candidates: Vec<Vec<(String, AttributeValue)>> = vec![Vec::new()];
        for (source_attribute, destination_attribute) in attributes {
            let values = match graph.attribute(self.object, source_attribute) {
                None | Some(AttributeValue::Null) => return Ok(Vec::new()),
                Some(value) => match value.elements() {
                    Some(elements) => elements.to_vec(),
                    None => vec![value.clone()],
                },
            };
            let Some(declared) = destination.attribute_named(destination_attribute) else {
                return Ok(Vec::new());
            };

            let values: Vec<AttributeValue> = values
                .iter()
                .filter_map(|value| coerce(value, declared.attribute_type, &self.config).ok())
                .filter(|value| !value.is_null())
                .collect();

            candidates = candidates
                .into_iter()
                .flat_map(|query| {
                    values.iter().map(move |value| {
                        let mut query = query.clone();
                        query.push((destination_attribute.clone(), value.clone()));
                        query
                    })
                })
                .collect();
        }

        let mut found = Vec::new();
        for query in candidates {
            let mut matches = cache.find_objects(graph, &destination.name, &query)?;
            matches.sort();
            for id in matches {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        Ok(found)
    }
}

fn invalid(relationship: &str, message: String) -> MappingError {
    MappingError::new(MappingErrorCode::InvalidConnection, Some(relationship.to_string()), message)
}
