//! Inverse mapping of objects back into representations
//!
//! [`ObjectSerializer`] reads each destination key path of an object mapping
//! from an object and writes it at the mapping's source key path, so the
//! mapping used to read a payload can also produce one. Attribute values go
//! through the inverse of their transformer when it has one; dates use the
//! configured output format and sets become arrays.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::config::MappingConfig;
use crate::error::{Error, Result};
use crate::keypath::{set_value_at, KeyPath};
use crate::mapping::{AttributeMapping, Mapping, ObjectMapping, RelationshipMapping};
use crate::object::{AttributeValue, KeyPathValue, ObjectGraph, ObjectId, RelationshipValue};
use crate::schema::AttributeType;
use crate::transformer::{format_date, ValueTransformer};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Types tried, in order, when asking an inverse transformer for output
const INVERSE_OUTPUT_TYPES: [AttributeType; 5] = [
    AttributeType::String,
    AttributeType::Integer,
    AttributeType::Float,
    AttributeType::Boolean,
    AttributeType::Json,
];

/// Serializes objects with the mappings that read them
#[derive(Debug, Clone, Copy)]
pub struct ObjectSerializer<'a> {
    graph: &'a ObjectGraph,
    config: &'a MappingConfig,
}

impl<'a> ObjectSerializer<'a> {
    pub fn new(graph: &'a ObjectGraph, config: &'a MappingConfig) -> Self {
        Self { graph, config }
    }

    /// Representation of one object, wrapped in the mapping's root key path
    pub fn serialize(&self, object: ObjectId, mapping: &ObjectMapping) -> Result<Value> {
        let body = self.object_body(object, mapping, &mut Vec::new())?;
        self.wrap(mapping, body)
    }

    /// Representation of several objects. A mapping with a nested dictionary
    /// key attribute produces a dictionary keyed by that attribute, anything
    /// else an array.
    pub fn serialize_collection(&self, objects: &[ObjectId], mapping: &ObjectMapping) -> Result<Value> {
        let mut stack = Vec::new();
        let body = match mapping.nested_dictionary_key_attribute() {
            Some(attribute) => {
                let mut map = Map::new();
                for object in objects {
                    let key = match self.graph.attribute(*object, attribute) {
                        Some(AttributeValue::String(s)) => s.clone(),
                        Some(value) if !value.is_null() => value.to_string(),
                        _ => {
                            return Err(Error::InvalidState {
                                message: format!("{} has no value for key attribute '{}'", object, attribute),
                            })
                        }
                    };
                    map.insert(key, self.object_body(*object, mapping, &mut stack)?);
                }
                Value::Object(map)
            }
            None => Value::Array(
                objects
                    .iter()
                    .map(|object| self.object_body(*object, mapping, &mut stack))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        self.wrap(mapping, body)
    }

    fn wrap(&self, mapping: &ObjectMapping, body: Value) -> Result<Value> {
        match mapping.root_key_path() {
            Some(root) => {
                let mut wrapped = Value::Object(Map::new());
                set_value_at(&mut wrapped, root, body)?;
                Ok(wrapped)
            }
            None => Ok(body),
        }
    }

    fn object_body(&self, object: ObjectId, mapping: &ObjectMapping, stack: &mut Vec<ObjectId>) -> Result<Value> {
        let record = self.graph.record(object)?;
        if record.entity != mapping.entity() {
            return Err(Error::schema(
                mapping.entity(),
                format!("cannot serialize {} which is a {}", object, record.entity),
            ));
        }

        stack.push(object);
        let mut output = Value::Object(Map::new());
        for attribute in mapping.attribute_mappings() {
            if let Some(value) = self.attribute_value(object, mapping, attribute)? {
                write(&mut output, attribute.source_key_path.as_deref(), value)?;
            }
        }
        for relationship in mapping.relationship_mappings() {
            if let Some(value) = self.relationship_value(object, relationship, stack)? {
                write(&mut output, relationship.source_key_path.as_deref(), value)?;
            }
        }
        stack.pop();
        Ok(output)
    }

    fn attribute_value(
        &self,
        object: ObjectId,
        mapping: &ObjectMapping,
        attribute: &AttributeMapping,
    ) -> Result<Option<Value>> {
        let path = KeyPath::parse(&attribute.destination_key_path)?;
        let value = match self.graph.value_for_key_path(object, &path) {
            Some(KeyPathValue::Attribute(value)) => value,
            _ => return Ok(None),
        };
        if value.is_null() {
            return Ok(Some(Value::Null));
        }

        let inverse = attribute
            .transformer
            .as_ref()
            .or(mapping.transformer())
            .and_then(|t| t.inverse());
        let value = match inverse {
            Some(inverse) => self.reverse(&value, inverse.as_ref()).map_err(|e| Error::Transformation {
                message: e.to_string(),
                key_path: Some(attribute.destination_key_path.clone()),
            })?,
            None => value,
        };
        Ok(Some(self.to_representation(&value)))
    }

    fn reverse(
        &self,
        value: &AttributeValue,
        inverse: &dyn ValueTransformer,
    ) -> std::result::Result<AttributeValue, crate::transformer::TransformError> {
        let mut last_error = None;
        for to in INVERSE_OUTPUT_TYPES.into_iter().filter(|t| inverse.can_transform(*t)) {
            match inverse.transform(value, to) {
                Ok(reversed) => return Ok(reversed),
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(value.clone()),
        }
    }

    fn relationship_value(
        &self,
        object: ObjectId,
        relationship: &RelationshipMapping,
        stack: &mut Vec<ObjectId>,
    ) -> Result<Option<Value>> {
        let path = KeyPath::parse(&relationship.destination_key_path)?;
        match self.graph.value_for_key_path(object, &path) {
            Some(KeyPathValue::Object(id)) => self.related_value(id, relationship.mapping(), stack),
            Some(KeyPathValue::Objects(ids)) => {
                let mut items = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(value) = self.related_value(id, relationship.mapping(), stack)? {
                        items.push(value);
                    }
                }
                Ok(Some(Value::Array(items)))
            }
            Some(KeyPathValue::Attribute(_)) => Ok(None),
            None => Ok(match self.graph.relationship(object, &relationship.destination_key_path) {
                Some(RelationshipValue::ToOne(None)) => Some(Value::Null),
                _ => None,
            }),
        }
    }

    /// A related object already being serialized further up is omitted
    fn related_value(&self, object: ObjectId, mapping: &Mapping, stack: &mut Vec<ObjectId>) -> Result<Option<Value>> {
        if stack.contains(&object) {
            return Ok(None);
        }
        let entity = self.graph.record(object)?.entity.as_str();
        let concrete: Option<Arc<ObjectMapping>> = mapping
            .object_mappings()
            .into_iter()
            .find(|m| m.entity() == entity)
            .cloned();
        match concrete {
            Some(concrete) => self.object_body(object, &concrete, stack).map(Some),
            None => Ok(None),
        }
    }

    fn to_representation(&self, value: &AttributeValue) -> Value {
        match value {
            AttributeValue::Date(date) => Value::String(format_date(date, self.config)),
            AttributeValue::Array(items) | AttributeValue::Set(items) | AttributeValue::OrderedSet(items) => {
                Value::Array(items.iter().map(|item| self.to_representation(item)).collect())
            }
            other => other.to_json(),
        }
    }
}

/// Write at a source key path; the whole-representation mapping replaces the output
fn write(output: &mut Value, source: Option<&str>, value: Value) -> Result<()> {
    match source {
        Some(path) => set_value_at(output, path, value),
        None => {
            *output = value;
            Ok(())
        }
    }
}
