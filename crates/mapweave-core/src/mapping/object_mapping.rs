//! Object mappings and their builder
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::property::{AttributeMapping, PropertyMapping, RelationshipMapping};
use super::{Mapping, MappingId};
use crate::connection::ConnectionDescription;
use crate::error::{Error, Result};
use crate::keypath::{value_at, KeyPath};
use crate::schema::{Cardinality, EntityDescription, Schema};
use crate::transformer::SharedTransformer;
use crate::validation::SharedValidator;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Describes how one shape of representation maps onto one entity
///
/// Built once with [`ObjectMappingBuilder`], checked against the schema, then
/// shared read-only between any number of mapping operations.
#[derive(Debug)]
pub struct ObjectMapping {
    id: MappingId,
    entity: String,
    property_mappings: Vec<PropertyMapping>,
    identification_attributes: Vec<String>,
    root_key_path: Option<String>,
    force_collection_mapping: bool,
    nested_dictionary_key_attribute: Option<String>,
    default_values: BTreeMap<String, Value>,
    transformer: Option<SharedTransformer>,
    connections: Vec<ConnectionDescription>,
    validators: Vec<SharedValidator>,
}

impl ObjectMapping {
    /// Start building a mapping for an entity
    pub fn builder(entity: impl Into<String>) -> ObjectMappingBuilder {
        ObjectMappingBuilder::new(entity)
    }

    /// Identifier referenced by owned property mappings
    pub fn id(&self) -> MappingId {
        self.id
    }

    /// Entity every mapped object belongs to
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Property mappings in declaration order
    pub fn property_mappings(&self) -> &[PropertyMapping] {
        &self.property_mappings
    }

    /// Attribute mappings in declaration order
    pub fn attribute_mappings(&self) -> impl Iterator<Item = &AttributeMapping> {
        self.property_mappings.iter().filter_map(|p| match p {
            PropertyMapping::Attribute(a) => Some(a),
            PropertyMapping::Relationship(_) => None,
        })
    }

    /// Relationship mappings in declaration order
    pub fn relationship_mappings(&self) -> impl Iterator<Item = &RelationshipMapping> {
        self.property_mappings.iter().filter_map(|p| match p {
            PropertyMapping::Relationship(r) => Some(r),
            PropertyMapping::Attribute(_) => None,
        })
    }

    /// The last declared property mapping writing to a destination key path
    pub fn mapping_for_destination(&self, destination: &str) -> Option<&PropertyMapping> {
        self.property_mappings
            .iter()
            .rev()
            .find(|p| p.destination_key_path() == destination)
    }

    /// The first declared property mapping reading a source key path
    pub fn mapping_for_source(&self, source: &str) -> Option<&PropertyMapping> {
        self.property_mappings
            .iter()
            .find(|p| p.source_key_path() == Some(source))
    }

    /// Attributes identifying an object for find-or-create. Empty means
    /// every node maps to a new object.
    pub fn identification_attributes(&self) -> &[String] {
        &self.identification_attributes
    }

    /// Whether identity resolution is attempted
    pub fn requires_identity(&self) -> bool {
        !self.identification_attributes.is_empty()
    }

    /// Key path the mapped content is nested under
    pub fn root_key_path(&self) -> Option<&str> {
        self.root_key_path.as_deref()
    }

    /// Whether a dictionary is treated as a collection of its values
    pub fn force_collection_mapping(&self) -> bool {
        self.force_collection_mapping
    }

    /// Attribute receiving the key of each element of a forced collection
    pub fn nested_dictionary_key_attribute(&self) -> Option<&str> {
        self.nested_dictionary_key_attribute.as_deref()
    }

    /// Default for an attribute missing from the representation
    pub fn default_value(&self, attribute: &str) -> Option<&Value> {
        self.default_values.get(attribute)
    }

    /// Transformer used by attribute mappings that carry none of their own
    pub fn transformer(&self) -> Option<&SharedTransformer> {
        self.transformer.as_ref()
    }

    /// Connections established after the mapping pass
    pub fn connections(&self) -> &[ConnectionDescription] {
        &self.connections
    }

    /// Validators run on each mapped object
    pub fn validators(&self) -> &[SharedValidator] {
        &self.validators
    }

    /// Raw identity values of a representation, in declaration order
    ///
    /// Returns `None` when any identity value is missing or null, in which
    /// case the data source must allocate a new object.
    pub fn identity_values(&self, representation: &Value, nested_key: Option<&str>) -> Option<Vec<(String, Value)>> {
        if self.identification_attributes.is_empty() {
            return None;
        }

        let mut values = Vec::with_capacity(self.identification_attributes.len());
        for attribute in &self.identification_attributes {
            let value = if self.nested_dictionary_key_attribute.as_deref() == Some(attribute.as_str()) {
                Value::String(nested_key?.to_string())
            } else {
                let source = self.source_for_attribute(attribute)?;
                value_at(representation, source)?
            };
            if value.is_null() {
                return None;
            }
            values.push((attribute.clone(), value));
        }
        Some(values)
    }

    /// Transformer applied when writing an attribute: the one on its last
    /// attribute mapping, else the mapping-level transformer. The key of a
    /// forced-collection element is written untransformed.
    pub fn transformer_for_attribute(&self, attribute: &str) -> Option<&SharedTransformer> {
        if self.nested_dictionary_key_attribute.as_deref() == Some(attribute) {
            return None;
        }
        self.attribute_mappings()
            .filter(|a| a.destination_key_path == attribute)
            .last()
            .and_then(|a| a.transformer.as_ref())
            .or(self.transformer.as_ref())
    }

    fn source_for_attribute(&self, attribute: &str) -> Option<Option<&str>> {
        self.attribute_mappings()
            .filter(|a| a.destination_key_path == attribute)
            .last()
            .map(|a| a.source_key_path.as_deref())
    }
}

/// Builder for [`ObjectMapping`]
pub struct ObjectMappingBuilder {
    entity: String,
    property_mappings: Vec<PropertyMapping>,
    identification_attributes: Vec<String>,
    root_key_path: Option<String>,
    force_collection_mapping: bool,
    nested_dictionary_key_attribute: Option<String>,
    default_values: BTreeMap<String, Value>,
    transformer: Option<SharedTransformer>,
    connections: Vec<ConnectionDescription>,
    validators: Vec<SharedValidator>,
}

impl ObjectMappingBuilder {
    /// Create a builder for an entity
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            property_mappings: Vec::new(),
            identification_attributes: Vec::new(),
            root_key_path: None,
            force_collection_mapping: false,
            nested_dictionary_key_attribute: None,
            default_values: BTreeMap::new(),
            transformer: None,
            connections: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Add any property mapping
    pub fn property(mut self, property: PropertyMapping) -> Self {
        self.property_mappings.push(property);
        self
    }

    /// Map a source key path to an attribute
    pub fn attribute(self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.property(PropertyMapping::attribute(source, destination))
    }

    /// Map a source key path to an attribute through a transformer
    pub fn attribute_with_transformer(
        self,
        source: impl Into<String>,
        destination: impl Into<String>,
        transformer: SharedTransformer,
    ) -> Self {
        self.property(PropertyMapping::attribute(source, destination).with_transformer(transformer))
    }

    /// Map several `(source, destination)` pairs
    pub fn attributes<I, S, D>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        for (source, destination) in pairs {
            self = self.attribute(source, destination);
        }
        self
    }

    /// Map keys onto attributes of the same name
    pub fn attributes_named<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self = self.attribute(name.clone(), name);
        }
        self
    }

    /// Map a nested representation to a relationship
    pub fn relationship(self, source: impl Into<String>, destination: impl Into<String>, mapping: impl Into<Mapping>) -> Self {
        self.property(PropertyMapping::relationship(source, destination, mapping))
    }

    /// Remove every property mapping writing to a destination key path
    pub fn remove_property(mut self, destination: &str) -> Self {
        self.property_mappings.retain(|p| p.destination_key_path() != destination);
        self
    }

    /// Declare the identity attributes (composite when more than one)
    pub fn identification_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identification_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Key path the mapped content is nested under
    pub fn root_key_path(mut self, key_path: impl Into<String>) -> Self {
        let key_path = key_path.into();
        self.root_key_path = if key_path.is_empty() { None } else { Some(key_path) };
        self
    }

    /// Treat a dictionary as a collection of its values
    pub fn force_collection_mapping(mut self, force: bool) -> Self {
        self.force_collection_mapping = force;
        self
    }

    /// Store the key of each element of a forced collection in an attribute.
    /// Implies `force_collection_mapping`.
    pub fn map_key_of_nested_dictionary_to(mut self, attribute: impl Into<String>) -> Self {
        self.nested_dictionary_key_attribute = Some(attribute.into());
        self.force_collection_mapping = true;
        self
    }

    /// Value written when the representation lacks an attribute's source
    pub fn default_value(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.default_values.insert(attribute.into(), value);
        self
    }

    /// Transformer for attribute mappings without their own
    pub fn transformer(mut self, transformer: SharedTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Add a connection established after the mapping pass
    pub fn connection(mut self, connection: ConnectionDescription) -> Self {
        self.connections.push(connection);
        self
    }

    /// Add a validator
    pub fn validator(mut self, validator: SharedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Check every declaration against the schema and build the mapping
    pub fn build(self, schema: &Schema) -> Result<Arc<ObjectMapping>> {
        let entity = schema.entity(&self.entity)?;
        let id = MappingId::next();

        let mut property_mappings = self.property_mappings;
        for property in &mut property_mappings {
            check_property(schema, entity, property)?;
            property.set_owner(id);
        }

        for attribute in &self.identification_attributes {
            require_attribute(entity, attribute)?;
            let is_nested_key = self.nested_dictionary_key_attribute.as_deref() == Some(attribute.as_str());
            let is_mapped = property_mappings.iter().any(|p| {
                matches!(p, PropertyMapping::Attribute(_)) && p.destination_key_path() == attribute
            });
            if !is_nested_key && !is_mapped {
                return Err(Error::configuration(format!(
                    "Identity attribute '{}' of '{}' is not the destination of any attribute mapping",
                    attribute, entity.name
                )));
            }
        }

        if let Some(attribute) = &self.nested_dictionary_key_attribute {
            require_attribute(entity, attribute)?;
        }
        for attribute in self.default_values.keys() {
            require_attribute(entity, attribute)?;
        }
        if let Some(root) = &self.root_key_path {
            KeyPath::parse(root)?;
        }
        for connection in &self.connections {
            connection.validate_against(schema, &entity.name)?;
        }

        Ok(Arc::new(ObjectMapping {
            id,
            entity: self.entity,
            property_mappings,
            identification_attributes: self.identification_attributes,
            root_key_path: self.root_key_path,
            force_collection_mapping: self.force_collection_mapping,
            nested_dictionary_key_attribute: self.nested_dictionary_key_attribute,
            default_values: self.default_values,
            transformer: self.transformer,
            connections: self.connections,
            validators: self.validators,
        }))
    }
}

fn require_attribute(entity: &EntityDescription, attribute: &str) -> Result<()> {
    if entity.attribute_named(attribute).is_none() {
        return Err(Error::schema(&entity.name, format!("unknown attribute '{}'", attribute)));
    }
    Ok(())
}

/// Follow the parent segments of a destination through to-one relationships
/// and return the entity owning the last segment
fn owning_entity<'a>(schema: &'a Schema, entity: &'a EntityDescription, path: &KeyPath) -> Result<&'a EntityDescription> {
    let mut current = entity;
    for segment in path.parent().segments() {
        let relationship = current
            .relationship_named(segment)
            .filter(|r| r.cardinality == Cardinality::ToOne)
            .ok_or_else(|| {
                Error::schema(
                    &current.name,
                    format!("'{}' in '{}' is not a to-one relationship", segment, path),
                )
            })?;
        current = schema.entity(&relationship.destination_entity)?;
    }
    Ok(current)
}

fn check_property(schema: &Schema, entity: &EntityDescription, property: &PropertyMapping) -> Result<()> {
    if let Some(source) = property.source_key_path() {
        KeyPath::parse(source)?;
    }
    let destination = KeyPath::parse(property.destination_key_path())?;
    let name = destination.last().ok_or_else(|| {
        Error::configuration(format!("Property mapping of '{}' has an empty destination", entity.name))
    })?;
    let owner = owning_entity(schema, entity, &destination)?;

    match property {
        PropertyMapping::Attribute(_) => require_attribute(owner, name),
        PropertyMapping::Relationship(relationship) => {
            let description = owner.relationship_named(name).ok_or_else(|| {
                Error::schema(&owner.name, format!("unknown relationship '{}'", name))
            })?;
            for candidate in relationship.mapping.object_mappings() {
                if candidate.entity() != description.destination_entity {
                    return Err(Error::schema(
                        &owner.name,
                        format!(
                            "relationship '{}' holds {} but its mapping produces {}",
                            name,
                            description.destination_entity,
                            candidate.entity()
                        ),
                    ));
                }
            }
            Ok(())
        }
    }
}
