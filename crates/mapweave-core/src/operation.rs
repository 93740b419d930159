//! Applying one object mapping to one representation and one target object
//!
//! A [`MappingOperation`] walks the property mappings of its descriptor in
//! declaration order, reads each source key path from the representation,
//! converts the value and writes it to the target object. Property-level
//! problems are accumulated and never stop the remaining properties. The
//! whole operation only fails when there is no target object, the target
//! belongs to another entity, the representation has the wrong shape, or a
//! validator rejects the result; a rejected object is rolled back to its
//! state before the operation.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::config::MappingConfig;
use crate::data_source::{MappingDataSource, TargetObject};
use crate::error::{MappingError, MappingErrorCode, Result};
use crate::keypath::{join_paths, value_at, KeyPath};
use crate::mapping::{AssignmentPolicy, AttributeMapping, ObjectMapping, PropertyMapping, RelationshipMapping};
use crate::object::{AttributeValue, ObjectGraph, ObjectId, ObjectRecord, RelationshipValue};
use crate::schema::{Cardinality, RelationshipDescription};
use crate::transformer::transform_value;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Source key path recorded for the key of a forced-collection element
pub const NESTED_KEY_SOURCE: &str = "@key";

/// Value written by one property mapping
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedValue {
    Attribute(AttributeValue),
    Relationship(RelationshipValue),
}

/// One `(source key path, destination key path, value)` write
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMapping {
    pub source_key_path: Option<String>,
    pub destination_key_path: String,
    pub value: AppliedValue,
}

/// An object mapped successfully, with the mapping that produced it
#[derive(Debug, Clone)]
pub struct MappedObject {
    pub id: ObjectId,
    pub mapping: Arc<ObjectMapping>,
}

/// Outcome of a [`MappingOperation`]
#[derive(Debug, Clone, Default)]
pub struct MappingOperationReport {
    /// The mapped object; `None` when the operation failed as a whole
    pub object: Option<ObjectId>,
    /// Writes that were performed, in order
    pub applied: Vec<AppliedMapping>,
    /// Destination key paths whose value was already current
    pub unchanged: Vec<String>,
    /// Conditions recorded for this node and its nested nodes
    pub errors: Vec<MappingError>,
    /// Every object mapped by this operation, nested ones first
    pub mapped: Vec<MappedObject>,
    /// Objects allocated by this operation, nested ones included
    pub created: Vec<ObjectId>,
    /// Records of existing objects as they were before this operation first
    /// touched them, in the order they were taken
    pub(crate) snapshots: Vec<ObjectRecord>,
    /// Objects dropped by `Replace` relationships, deleted once the whole
    /// operation tree has been accepted
    pub(crate) pending_deletions: Vec<ObjectId>,
}

impl MappingOperationReport {
    /// Whether the object was mapped
    pub fn succeeded(&self) -> bool {
        self.object.is_some()
    }

    /// Whether any error-level condition was recorded
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.is_warning())
    }
}

/// Applies an object mapping to one representation and one target object
pub struct MappingOperation<'a> {
    source: &'a Value,
    target: Option<ObjectId>,
    mapping: Arc<ObjectMapping>,
    data_source: &'a dyn MappingDataSource,
    config: &'a MappingConfig,
    key_path: Option<String>,
    nested_key: Option<String>,
    target_created: bool,
}

impl<'a> MappingOperation<'a> {
    /// Create an operation for a representation and an already resolved target
    pub fn new(
        source: &'a Value,
        target: Option<ObjectId>,
        mapping: Arc<ObjectMapping>,
        data_source: &'a dyn MappingDataSource,
        config: &'a MappingConfig,
    ) -> Self {
        Self {
            source,
            target,
            mapping,
            data_source,
            config,
            key_path: None,
            nested_key: None,
            target_created: false,
        }
    }

    /// Key path of this node within the document, used to prefix conditions
    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        let key_path = key_path.into();
        self.key_path = if key_path.is_empty() { None } else { Some(key_path) };
        self
    }

    /// Key of this node in a forced collection
    pub fn with_nested_key(mut self, key: impl Into<String>) -> Self {
        self.nested_key = Some(key.into());
        self
    }

    /// Mark the target as freshly allocated, so a rejected object is discarded
    /// instead of restored
    pub fn with_created_target(mut self, created: bool) -> Self {
        self.target_created = created;
        self
    }

    fn condition(&self, code: MappingErrorCode, key_path: Option<&str>, message: impl Into<String>) -> MappingError {
        MappingError::new(code, join_paths(self.key_path.as_deref(), key_path), message)
    }

    fn failed(&self, code: MappingErrorCode, message: impl Into<String>) -> MappingOperationReport {
        MappingOperationReport {
            errors: vec![self.condition(code, None, message)],
            ..Default::default()
        }
    }

    /// Run the operation
    ///
    /// Returns `Err` only for configuration errors raised while resolving
    /// nested objects (for example a missing identity cache). Objects
    /// replaced through `Replace` relationships are deleted only when the
    /// object is accepted.
    pub fn perform(self, graph: &mut ObjectGraph) -> Result<MappingOperationReport> {
        let data_source = self.data_source;
        let mut report = self.run(graph)?;
        if report.succeeded() {
            for orphan in report.pending_deletions.drain(..) {
                if graph.remove(orphan).is_some() {
                    debug!(object = %orphan, "deleting replaced object");
                    data_source.did_delete_object(orphan);
                }
            }
        }
        report.pending_deletions.clear();
        Ok(report)
    }

    fn run(self, graph: &mut ObjectGraph) -> Result<MappingOperationReport> {
        let Some(target) = self.target.filter(|id| graph.contains(*id)) else {
            return Ok(self.failed(
                MappingErrorCode::NilDestinationObject,
                format!("no target object for {}", self.mapping.entity()),
            ));
        };

        let entity = graph.record(target)?.entity.clone();
        if entity != self.mapping.entity() {
            return Ok(self.failed(
                MappingErrorCode::TypeMismatch,
                format!("target {} is a {} but the mapping produces {}", target, entity, self.mapping.entity()),
            ));
        }

        let maps_whole_representation = self.mapping.property_mappings().iter().any(|p| p.source_key_path().is_none());
        if !self.source.is_object() && !maps_whole_representation {
            return Ok(self.failed(
                MappingErrorCode::UnmappableRepresentation,
                format!("expected a dictionary for {}, got {}", self.mapping.entity(), kind_of(self.source)),
            ));
        }

        let mut report = MappingOperationReport::default();
        if !self.target_created {
            report.snapshots.push(graph.record(target)?.clone());
        }
        let mut found_any = false;

        trace!(entity = %entity, object = %target, key_path = ?self.key_path, "mapping object");

        if let (Some(attribute), Some(key)) = (self.mapping.nested_dictionary_key_attribute(), &self.nested_key) {
            found_any = true;
            self.write_attribute(
                graph,
                target,
                Some(NESTED_KEY_SOURCE),
                attribute,
                &AttributeValue::String(key.clone()),
                None,
                &mut report,
            );
        }

        let mapping = Arc::clone(&self.mapping);
        for property in mapping.property_mappings() {
            match property {
                PropertyMapping::Attribute(attribute) => {
                    found_any |= self.apply_attribute(graph, target, attribute, &mut report);
                }
                PropertyMapping::Relationship(relationship) => {
                    found_any |= self.apply_relationship(graph, target, relationship, &mut report)?;
                }
            }
        }

        if !found_any {
            if self.config.log_unmappable {
                warn!(entity = %entity, key_path = ?self.key_path, "no property mapping found a value");
            }
            report.errors.push(self.condition(
                MappingErrorCode::UnmappableRepresentation,
                None,
                format!("no property mapping of {} found a value", entity),
            ));
        }

        for validator in self.mapping.validators() {
            if let Err(failure) = validator.validate(graph, target) {
                debug!(entity = %entity, object = %target, validator = validator.name(), "validation rejected object");
                self.roll_back(graph, target, &report);
                report.errors.push(self.condition(
                    MappingErrorCode::ValidationFailure,
                    failure.key_path.as_deref(),
                    format!("{} rejected {}: {}", validator.name(), entity, failure.message),
                ));
                report.object = None;
                report.mapped.clear();
                report.created.clear();
                report.snapshots.clear();
                report.pending_deletions.clear();
                return Ok(report);
            }
        }

        self.data_source.did_map_object(
            graph,
            TargetObject {
                id: target,
                created: self.target_created,
            },
        );
        if self.target_created {
            report.created.push(target);
        }
        report.mapped.push(MappedObject {
            id: target,
            mapping: Arc::clone(&self.mapping),
        });
        report.object = Some(target);
        Ok(report)
    }

    /// Put every touched existing object back to its first snapshot and
    /// discard every object allocated on the way
    fn roll_back(&self, graph: &mut ObjectGraph, target: ObjectId, report: &MappingOperationReport) {
        let mut discarded = report.created.clone();
        if self.target_created {
            discarded.push(target);
        }

        let mut restored: Vec<ObjectId> = Vec::new();
        for snapshot in &report.snapshots {
            if restored.contains(&snapshot.id) || discarded.contains(&snapshot.id) {
                continue;
            }
            restored.push(snapshot.id);
            graph.restore(snapshot.clone());
        }
        for object in discarded {
            graph.remove(object);
            self.data_source.did_delete_object(object);
        }
        for object in restored {
            self.data_source.did_map_object(graph, TargetObject { id: object, created: false });
        }
    }

    /// Snapshot an object other than the target before a key-path write
    /// changes it
    fn remember(graph: &ObjectGraph, object: ObjectId, report: &mut MappingOperationReport) {
        if report.created.contains(&object) || report.snapshots.iter().any(|s| s.id == object) {
            return;
        }
        if let Some(record) = graph.get(object) {
            report.snapshots.push(record.clone());
        }
    }

    /// Returns whether the source value was present
    fn apply_attribute(
        &self,
        graph: &mut ObjectGraph,
        target: ObjectId,
        attribute: &AttributeMapping,
        report: &mut MappingOperationReport,
    ) -> bool {
        let source = attribute.source_key_path.as_deref();
        let destination = attribute.destination_key_path.as_str();
        let transformer = attribute
            .transformer
            .as_ref()
            .or(self.mapping.transformer())
            .map(|t| t.as_ref());

        match value_at(self.source, source) {
            Some(value) => {
                let value = AttributeValue::from_json(&value);
                self.write_attribute(graph, target, source, destination, &value, transformer, report);
                true
            }
            None => {
                if let Some(default) = self.mapping.default_value(destination) {
                    let value = AttributeValue::from_json(default);
                    self.write_attribute(graph, target, source, destination, &value, None, report);
                }
                false
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_attribute(
        &self,
        graph: &mut ObjectGraph,
        target: ObjectId,
        source: Option<&str>,
        destination: &str,
        value: &AttributeValue,
        transformer: Option<&dyn crate::transformer::ValueTransformer>,
        report: &mut MappingOperationReport,
    ) {
        let error_path = source.unwrap_or(destination);
        let resolved = KeyPath::parse(destination).and_then(|path| graph.resolve_owner(target, &path));
        let (owner, name) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                report
                    .errors
                    .push(self.condition(MappingErrorCode::NilDestinationObject, Some(error_path), e.to_string()));
                return;
            }
        };

        let declared = match graph.entity_of(owner).ok().and_then(|e| e.attribute_named(&name)) {
            Some(attribute) => attribute.attribute_type,
            None => {
                report.errors.push(self.condition(
                    MappingErrorCode::TypeMismatch,
                    Some(error_path),
                    format!("'{}' is not an attribute", destination),
                ));
                return;
            }
        };

        let converted = match transform_value(value, declared, transformer, self.config) {
            Ok(converted) => converted,
            Err(e) => {
                report
                    .errors
                    .push(self.condition(MappingErrorCode::TypeMismatch, Some(error_path), e.to_string()));
                return;
            }
        };

        if self.config.skip_unchanged_values && graph.attribute(owner, &name) == Some(&converted) {
            report.unchanged.push(destination.to_string());
            return;
        }

        if owner != target {
            Self::remember(graph, owner, report);
        }
        match graph.set_attribute(owner, &name, converted.clone()) {
            Ok(()) => report.applied.push(AppliedMapping {
                source_key_path: source.map(str::to_string),
                destination_key_path: destination.to_string(),
                value: AppliedValue::Attribute(converted),
            }),
            Err(e) => report
                .errors
                .push(self.condition(MappingErrorCode::TypeMismatch, Some(error_path), e.to_string())),
        }
    }

    /// Returns whether the source value was present
    fn apply_relationship(
        &self,
        graph: &mut ObjectGraph,
        target: ObjectId,
        relationship: &RelationshipMapping,
        report: &mut MappingOperationReport,
    ) -> Result<bool> {
        let source = relationship.source_key_path.as_deref();
        let destination = relationship.destination_key_path.as_str();
        let error_path = source.unwrap_or(destination);

        let Some(value) = value_at(self.source, source) else {
            return Ok(false);
        };

        let resolved = KeyPath::parse(destination).and_then(|path| graph.resolve_owner(target, &path));
        let (owner, name) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                report
                    .errors
                    .push(self.condition(MappingErrorCode::NilDestinationObject, Some(error_path), e.to_string()));
                return Ok(true);
            }
        };
        let description = match graph.entity_of(owner).ok().and_then(|e| e.relationship_named(&name)) {
            Some(description) => description.clone(),
            None => {
                report.errors.push(self.condition(
                    MappingErrorCode::TypeMismatch,
                    Some(error_path),
                    format!("'{}' is not a relationship", destination),
                ));
                return Ok(true);
            }
        };

        let child_path = join_paths(self.key_path.as_deref(), Some(error_path)).unwrap_or_default();
        let Some(objects) = self.map_nested(graph, &value, relationship, &description, &child_path, report)? else {
            return Ok(true);
        };

        let current = graph.relationship(owner, &name).cloned();
        let new_value = match description.cardinality {
            Cardinality::ToOne => RelationshipValue::ToOne(objects.first().copied()),
            Cardinality::ToMany => {
                let mut ids = Vec::new();
                if relationship.policy() == AssignmentPolicy::Union {
                    ids.extend(current.as_ref().map(RelationshipValue::object_ids).unwrap_or_default());
                }
                ids.extend(objects);
                RelationshipValue::to_many(description.collection_kind, ids)
            }
        };

        if self.config.skip_unchanged_values && current.as_ref() == Some(&new_value) {
            report.unchanged.push(destination.to_string());
            return Ok(true);
        }

        if owner != target {
            Self::remember(graph, owner, report);
        }
        if let Err(e) = graph.set_relationship(owner, &name, new_value) {
            report
                .errors
                .push(self.condition(MappingErrorCode::TypeMismatch, Some(error_path), e.to_string()));
            return Ok(true);
        }
        let assigned = graph
            .relationship(owner, &name)
            .cloned()
            .unwrap_or(RelationshipValue::ToOne(None));

        if relationship.policy() == AssignmentPolicy::Replace {
            let kept = assigned.object_ids();
            let orphans = current
                .map(|c| c.object_ids())
                .unwrap_or_default()
                .into_iter()
                .filter(|id| !kept.contains(id));
            for orphan in orphans {
                trace!(object = %orphan, relationship = %name, "object replaced");
                if !report.pending_deletions.contains(&orphan) {
                    report.pending_deletions.push(orphan);
                }
            }
        }

        report.applied.push(AppliedMapping {
            source_key_path: source.map(str::to_string),
            destination_key_path: destination.to_string(),
            value: AppliedValue::Relationship(assigned),
        });
        Ok(true)
    }

    /// Map the nested representation of a relationship. `None` means the
    /// value had the wrong shape and a condition was recorded.
    fn map_nested(
        &self,
        graph: &mut ObjectGraph,
        value: &Value,
        relationship: &RelationshipMapping,
        description: &RelationshipDescription,
        path: &str,
        report: &mut MappingOperationReport,
    ) -> Result<Option<Vec<ObjectId>>> {
        let mapping = relationship.mapping();
        let elements: Vec<(String, Option<String>, &Value)> = match (value, description.cardinality) {
            (Value::Null, _) => Vec::new(),
            (Value::Array(items), Cardinality::ToMany) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{}[{}]", path, i), None, item))
                .collect(),
            (Value::Object(map), Cardinality::ToMany) if mapping.force_collection_mapping() => map
                .iter()
                .map(|(key, item)| (format!("{}[{}]", path, key), Some(key.clone()), item))
                .collect(),
            (Value::Object(_), _) => vec![(path.to_string(), None, value)],
            (Value::Array(_), Cardinality::ToOne) => {
                report.errors.push(MappingError::new(
                    MappingErrorCode::TypeMismatch,
                    Some(path.to_string()),
                    format!("to-one relationship '{}' cannot hold a collection", description.name),
                ));
                return Ok(None);
            }
            (scalar, _) if mapping.object_mappings().iter().any(|m| m.property_mappings().iter().any(|p| p.source_key_path().is_none())) => {
                vec![(path.to_string(), None, scalar)]
            }
            (other, _) => {
                report.errors.push(MappingError::new(
                    MappingErrorCode::UnmappableRepresentation,
                    Some(path.to_string()),
                    format!("cannot map {} into relationship '{}'", kind_of(other), description.name),
                ));
                return Ok(None);
            }
        };

        let mut objects = Vec::with_capacity(elements.len());
        for (element_path, nested_key, element) in elements {
            let Some(resolved) = mapping.resolve(element) else {
                report.errors.push(MappingError::new(
                    MappingErrorCode::UnableToDetermineMapping,
                    Some(element_path),
                    "no dynamic mapping matcher matched",
                ));
                continue;
            };

            let target = self
                .data_source
                .target_object_for(graph, element, &resolved, nested_key.as_deref(), self.config)?;
            let Some(target) = target else {
                report.errors.push(MappingError::new(
                    MappingErrorCode::NilDestinationObject,
                    Some(element_path),
                    format!("data source produced no {}", resolved.entity()),
                ));
                continue;
            };

            let mut operation = MappingOperation::new(element, Some(target.id), resolved, self.data_source, self.config)
                .with_key_path(element_path)
                .with_created_target(target.created);
            if let Some(key) = nested_key {
                operation = operation.with_nested_key(key);
            }
            let nested = operation.run(graph)?;

            report.errors.extend(nested.errors);
            report.mapped.extend(nested.mapped);
            report.created.extend(nested.created);
            for snapshot in nested.snapshots {
                if !report.snapshots.iter().any(|s| s.id == snapshot.id) {
                    report.snapshots.push(snapshot);
                }
            }
            report.pending_deletions.extend(nested.pending_deletions);
            if let Some(id) = nested.object {
                objects.push(id);
            }
        }
        Ok(Some(objects))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a dictionary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::data_source::{ManagedDataSource, TransientDataSource};
    use crate::error::Error;
    use crate::mapping::{DynamicMapping, MappingMatcher};
    use crate::schema::{AttributeType, CollectionKind, EntityDescription, Schema};
    use crate::validation;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_entity(
                EntityDescription::new("User")
                    .attribute("user_id", AttributeType::Integer)
                    .attribute("name", AttributeType::String)
                    .attribute("age", AttributeType::Integer)
                    .attribute("birth_date", AttributeType::Date)
                    .attribute("active", AttributeType::Boolean)
                    .attribute("tags", AttributeType::Set)
                    .to_one("address", "Address")
                    .to_many("friends", "User", CollectionKind::OrderedSet),
            )
            .unwrap()
            .with_entity(EntityDescription::new("Address").attribute("city", AttributeType::String))
            .unwrap()
    }

    fn graph() -> ObjectGraph {
        ObjectGraph::new(Arc::new(schema()))
    }

    fn user_mapping(schema: &Schema) -> Arc<ObjectMapping> {
        ObjectMapping::builder("User")
            .attribute("id", "user_id")
            .attribute("name", "name")
            .attribute("age", "age")
            .attribute("birthdate", "birth_date")
            .attribute("active", "active")
            .attribute("tags", "tags")
            .build(schema)
            .unwrap()
    }

    #[test]
    fn test_attributes_coerced_and_recorded() {
        let mut graph = graph();
        let mapping = user_mapping(graph.schema());
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let representation = json!({
            "id": "31337",
            "name": "Blake Watters",
            "birthdate": "11/27/1982",
            "active": "yes",
            "tags": ["b", "a", "b"]
        });

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();

        assert!(report.succeeded());
        assert!(report.errors.is_empty());
        assert_eq!(report.applied.len(), 5);
        assert_eq!(report.applied[0].source_key_path.as_deref(), Some("id"));
        assert_eq!(graph.attribute(user, "user_id"), Some(&AttributeValue::Integer(31337)));
        assert_eq!(graph.attribute(user, "active"), Some(&AttributeValue::Bool(true)));
        assert_eq!(
            graph.attribute(user, "tags"),
            Some(&AttributeValue::Set(vec!["a".into(), "b".into()]))
        );
        assert!(matches!(graph.attribute(user, "birth_date"), Some(AttributeValue::Date(_))));
        // absent key path leaves the attribute untouched
        assert!(graph.attribute(user, "age").is_none());
    }

    #[test]
    fn test_partial_failure_isolated() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = ObjectMapping::builder("User")
            .attribute("age", "age")
            .attribute("name", "name")
            .attribute("id", "user_id")
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let representation = json!({"age": "old", "name": "blake", "id": 7});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, MappingErrorCode::TypeMismatch);
        assert_eq!(report.errors[0].key_path.as_deref(), Some("age"));
        assert_eq!(report.applied.len(), 2);
        assert_eq!(graph.attribute(user, "name"), Some(&"blake".into()));
        assert_eq!(graph.attribute(user, "user_id"), Some(&AttributeValue::Integer(7)));
    }

    #[test]
    fn test_later_mapping_overwrites_earlier() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = ObjectMapping::builder("User")
            .attribute("first", "name")
            .attribute("second", "name")
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let representation = json!({"first": "a", "second": "b"});
        MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(graph.attribute(user, "name"), Some(&"b".into()));
    }

    #[test]
    fn test_defaults_and_explicit_null() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = ObjectMapping::builder("User")
            .attribute("name", "name")
            .attribute("age", "age")
            .default_value("age", json!(0))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        graph.set_attribute(user, "name", "before".into()).unwrap();
        let config = MappingConfig::default();

        let representation = json!({"name": null});
        MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(graph.attribute(user, "name"), Some(&AttributeValue::Null));
        assert_eq!(graph.attribute(user, "age"), Some(&AttributeValue::Integer(0)));
    }

    #[test]
    fn test_equality_skip_records_unchanged() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = ObjectMapping::builder("User").attribute("name", "name").build(&schema).unwrap();
        let user = graph.insert("User").unwrap();
        graph.set_attribute(user, "name", "same".into()).unwrap();
        let config = MappingConfig::default();
        let representation = json!({"name": "same"});

        let report = MappingOperation::new(&representation, Some(user), mapping.clone(), &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.unchanged, vec!["name".to_string()]);

        let config = MappingConfig {
            skip_unchanged_values: false,
            ..MappingConfig::default()
        };
        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(report.applied.len(), 1);
    }

    #[test]
    fn test_whole_operation_failures() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = user_mapping(&schema);
        let config = MappingConfig::default();
        let representation = json!({"name": "x"});

        let report = MappingOperation::new(&representation, None, mapping.clone(), &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.errors[0].code, MappingErrorCode::NilDestinationObject);

        let address = graph.insert("Address").unwrap();
        let report = MappingOperation::new(&representation, Some(address), mapping.clone(), &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(report.errors[0].code, MappingErrorCode::TypeMismatch);

        let user = graph.insert("User").unwrap();
        let scalar = json!("just a string");
        let report = MappingOperation::new(&scalar, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.errors[0].code, MappingErrorCode::UnmappableRepresentation);
    }

    #[test]
    fn test_nothing_found_is_warning() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = user_mapping(&schema);
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let representation = json!({"unrelated": 1});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].is_warning());
        assert!(!report.has_errors());
    }

    #[test]
    fn test_validation_rolls_back() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let address = ObjectMapping::builder("Address").attribute("city", "city").build(&schema).unwrap();
        let mapping = ObjectMapping::builder("User")
            .attribute("name", "name")
            .attribute("age", "age")
            .relationship("address", "address", address)
            .validator(validation::from_fn("adult", |graph, id| match graph.attribute(id, "age") {
                Some(AttributeValue::Integer(age)) if *age >= 18 => Ok(()),
                _ => Err(validation::ValidationFailure::new(Some("age"), "too young")),
            }))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        graph.set_attribute(user, "name", "before".into()).unwrap();
        let config = MappingConfig::default();
        let representation = json!({"name": "after", "age": 12, "address": {"city": "Pittsburgh"}});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, MappingErrorCode::ValidationFailure);
        assert_eq!(graph.attribute(user, "name"), Some(&"before".into()));
        assert!(graph.attribute(user, "age").is_none());
        assert!(graph.relationship(user, "address").is_none());
        assert_eq!(graph.objects_of("Address").count(), 0);
    }

    #[test]
    fn test_rejected_replace_keeps_replaced_objects() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let friend = ObjectMapping::builder("User").attribute("name", "name").build(&schema).unwrap();
        let mapping = ObjectMapping::builder("User")
            .attribute("age", "age")
            .property(PropertyMapping::relationship("friends", "friends", friend).with_policy(AssignmentPolicy::Replace))
            .validator(validation::required(["name"]))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let old = graph.insert("User").unwrap();
        graph.set_attribute(old, "name", "old".into()).unwrap();
        graph
            .set_relationship(user, "friends", RelationshipValue::to_many(CollectionKind::OrderedSet, vec![old]))
            .unwrap();
        let config = MappingConfig::default();
        let representation = json!({"age": 3, "friends": [{"name": "new"}]});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();

        assert!(!report.succeeded());
        assert!(graph.contains(old));
        assert_eq!(graph.relationship(user, "friends").unwrap().object_ids(), vec![old]);
        assert_eq!(graph.objects_of("User").count(), 2);
        assert!(graph.attribute(user, "age").is_none());
    }

    #[test]
    fn test_rejected_parent_restores_fetched_nested_objects() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let friend = ObjectMapping::builder("User")
            .attribute("id", "user_id")
            .attribute("name", "name")
            .identification_attributes(["user_id"])
            .build(&schema)
            .unwrap();
        let mapping = ObjectMapping::builder("User")
            .property(PropertyMapping::relationship("friends", "friends", friend).with_policy(AssignmentPolicy::Union))
            .validator(validation::required(["name"]))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let jeff = graph.insert("User").unwrap();
        graph.set_attribute(jeff, "user_id", AttributeValue::Integer(7)).unwrap();
        graph.set_attribute(jeff, "name", "jeff".into()).unwrap();
        let dan = graph.insert("User").unwrap();
        graph.set_attribute(dan, "user_id", AttributeValue::Integer(8)).unwrap();
        graph
            .set_relationship(user, "friends", RelationshipValue::to_many(CollectionKind::OrderedSet, vec![dan]))
            .unwrap();
        let data_source = ManagedDataSource::new(Arc::new(InMemoryCache::new()));
        let config = MappingConfig::default();
        let representation = json!({"friends": [{"id": 7, "name": "geoff"}, {"id": 9, "name": "new"}]});

        let report = MappingOperation::new(&representation, Some(user), mapping, &data_source, &config)
            .perform(&mut graph)
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(graph.attribute(jeff, "name"), Some(&"jeff".into()));
        assert_eq!(graph.relationship(user, "friends").unwrap().object_ids(), vec![dan]);
        assert_eq!(graph.objects_of("User").count(), 3);

        // the identity cache still resolves the restored object
        let found = data_source
            .find_objects(&graph, "User", &[("user_id".to_string(), AttributeValue::Integer(7))])
            .unwrap();
        assert_eq!(found, vec![jeff]);
    }

    #[test]
    fn test_rejected_object_restores_key_path_owner() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let mapping = ObjectMapping::builder("User")
            .attribute("city", "address.city")
            .validator(validation::required(["name"]))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let address = graph.insert("Address").unwrap();
        graph.set_attribute(address, "city", "Carrboro".into()).unwrap();
        graph
            .set_relationship(user, "address", RelationshipValue::ToOne(Some(address)))
            .unwrap();
        let config = MappingConfig::default();
        let representation = json!({"city": "Pittsburgh"});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(graph.attribute(address, "city"), Some(&"Carrboro".into()));
    }

    #[test]
    fn test_relationships_mapped_recursively() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let address = ObjectMapping::builder("Address").attribute("city", "city").build(&schema).unwrap();
        let friend = ObjectMapping::builder("User")
            .attribute("id", "user_id")
            .attribute("name", "name")
            .identification_attributes(["user_id"])
            .build(&schema)
            .unwrap();
        let mapping = ObjectMapping::builder("User")
            .attribute("name", "name")
            .relationship("address", "address", address)
            .relationship("friends", "friends", friend)
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let data_source = ManagedDataSource::new(Arc::new(InMemoryCache::new()));
        let config = MappingConfig::default();
        let representation = json!({
            "name": "blake",
            "address": {"city": "Pittsburgh"},
            "friends": [{"id": 1, "name": "jeff"}, {"id": 2, "name": "dan"}, {"id": 1, "name": "jeff"}]
        });

        let report = MappingOperation::new(&representation, Some(user), mapping, &data_source, &config)
            .perform(&mut graph)
            .unwrap();

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let Some(RelationshipValue::ToOne(Some(address))) = graph.relationship(user, "address") else {
            panic!("address not connected");
        };
        assert_eq!(graph.attribute(*address, "city"), Some(&"Pittsburgh".into()));

        // identity resolution collapses the repeated friend, ordered set keeps first-seen order
        let Some(RelationshipValue::ToMany { kind, objects }) = graph.relationship(user, "friends") else {
            panic!("friends not mapped");
        };
        assert_eq!(*kind, CollectionKind::OrderedSet);
        assert_eq!(objects.len(), 2);
        assert_eq!(graph.attribute(objects[0], "name"), Some(&"jeff".into()));
        // address, jeff, dan, jeff again, then the user
        assert_eq!(report.mapped.len(), 5);
    }

    #[test]
    fn test_nested_errors_prefixed() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let friend = ObjectMapping::builder("User").attribute("age", "age").build(&schema).unwrap();
        let mapping = ObjectMapping::builder("User")
            .relationship("friends", "friends", friend)
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let representation = json!({"friends": [{"age": 3}, {"age": "x"}]});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .with_key_path("users[0]")
            .perform(&mut graph)
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].key_path.as_deref(), Some("users[0].friends[1].age"));
    }

    #[test]
    fn test_dynamic_relationship_without_match() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let friend = ObjectMapping::builder("User").attribute("name", "name").build(&schema).unwrap();
        let dynamic = DynamicMapping::new().matcher(MappingMatcher::key_path("type", "friend", friend).unwrap());
        let mapping = ObjectMapping::builder("User")
            .property(PropertyMapping::relationship("friends", "friends", dynamic))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let representation = json!({"friends": [{"type": "friend", "name": "a"}, {"type": "enemy", "name": "b"}]});

        let report = MappingOperation::new(&representation, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, MappingErrorCode::UnableToDetermineMapping);
        assert_eq!(graph.relationship(user, "friends").unwrap().object_ids().len(), 1);
    }

    #[test]
    fn test_union_and_replace_policies() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let friend = ObjectMapping::builder("User").attribute("name", "name").build(&schema).unwrap();
        let union = ObjectMapping::builder("User")
            .property(PropertyMapping::relationship("friends", "friends", friend.clone()).with_policy(AssignmentPolicy::Union))
            .build(&schema)
            .unwrap();
        let replace = ObjectMapping::builder("User")
            .property(PropertyMapping::relationship("friends", "friends", friend).with_policy(AssignmentPolicy::Replace))
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();

        let first = json!({"friends": [{"name": "a"}]});
        let second = json!({"friends": [{"name": "b"}]});
        MappingOperation::new(&first, Some(user), union.clone(), &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        MappingOperation::new(&second, Some(user), union, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(graph.relationship(user, "friends").unwrap().object_ids().len(), 2);

        let third = json!({"friends": [{"name": "c"}]});
        MappingOperation::new(&third, Some(user), replace, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(graph.relationship(user, "friends").unwrap().object_ids().len(), 1);
        // a and b were deleted, leaving the owner and c
        assert_eq!(graph.objects_of("User").count(), 2);
    }

    #[test]
    fn test_explicit_null_clears_relationship() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let address = ObjectMapping::builder("Address").attribute("city", "city").build(&schema).unwrap();
        let mapping = ObjectMapping::builder("User")
            .relationship("address", "address", address)
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();

        let with = json!({"address": {"city": "x"}});
        MappingOperation::new(&with, Some(user), mapping.clone(), &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert!(matches!(graph.relationship(user, "address"), Some(RelationshipValue::ToOne(Some(_)))));

        let without = json!({"address": null});
        MappingOperation::new(&without, Some(user), mapping, &TransientDataSource, &config)
            .perform(&mut graph)
            .unwrap();
        assert_eq!(graph.relationship(user, "address"), Some(&RelationshipValue::ToOne(None)));
    }

    #[test]
    fn test_missing_cache_for_nested_identity_is_fatal() {
        let mut graph = graph();
        let schema = graph.schema_handle();
        let friend = ObjectMapping::builder("User")
            .attribute("id", "user_id")
            .identification_attributes(["user_id"])
            .build(&schema)
            .unwrap();
        let mapping = ObjectMapping::builder("User")
            .relationship("friends", "friends", friend)
            .build(&schema)
            .unwrap();
        let user = graph.insert("User").unwrap();
        let config = MappingConfig::default();
        let data_source = ManagedDataSource::without_cache();
        let representation = json!({"friends": [{"id": 1}]});

        let result = MappingOperation::new(&representation, Some(user), mapping, &data_source, &config).perform(&mut graph);
        assert!(matches!(result, Err(Error::NilIdentityCache { .. })));
    }
}
