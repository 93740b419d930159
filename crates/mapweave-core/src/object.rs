//! Target objects and the object graph that owns them
//!
//! Mapped objects live in an [`ObjectGraph`] arena and are addressed by
//! [`ObjectId`]. The graph is the single-owner mutation context of a mapping
//! pass: every write goes through `&mut ObjectGraph` and is checked against
//! the registered [`Schema`]. Typed Rust values are recovered with
//! [`ObjectGraph::decode`].
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use crate::keypath::KeyPath;
use crate::schema::{AttributeType, Cardinality, CollectionKind, EntityDescription, Schema};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Handle of an object inside an [`ObjectGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<AttributeValue>),
    /// Unordered unique values, kept in canonical order
    Set(Vec<AttributeValue>),
    /// Unique values in first-seen order
    OrderedSet(Vec<AttributeValue>),
    Json(Value),
}

impl AttributeValue {
    /// Loosely convert a representation value without a declared type
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => AttributeValue::String(s.clone()),
            Value::Array(items) => AttributeValue::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(_) => AttributeValue::Json(value.clone()),
        }
    }

    /// Plain JSON rendition. Dates become RFC 3339 strings and sets become arrays.
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Integer(i) => Value::from(*i),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            AttributeValue::Array(items) | AttributeValue::Set(items) | AttributeValue::OrderedSet(items) => {
                Value::Array(items.iter().map(Self::to_json).collect())
            }
            AttributeValue::Json(v) => v.clone(),
        }
    }

    /// Build a set, removing duplicates and sorting into canonical order
    pub fn set_from(items: Vec<AttributeValue>) -> Self {
        let mut keyed: Vec<(String, AttributeValue)> =
            items.into_iter().map(|v| (v.cache_key(), v)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        AttributeValue::Set(keyed.into_iter().map(|(_, v)| v).collect())
    }

    /// Build an ordered set, removing duplicates but keeping first-seen order
    pub fn ordered_set_from(items: Vec<AttributeValue>) -> Self {
        let mut seen = HashSet::new();
        AttributeValue::OrderedSet(
            items
                .into_iter()
                .filter(|v| seen.insert(v.cache_key()))
                .collect(),
        )
    }

    /// Canonical string used for hashing and equality in identity indexes.
    /// Integral floats share the key of the equal integer.
    pub fn cache_key(&self) -> String {
        match self {
            AttributeValue::Null => "null".to_string(),
            AttributeValue::Bool(b) => format!("b:{}", b),
            AttributeValue::Integer(i) => format!("n:{}", i),
            AttributeValue::Float(f) => match crate::transformer::coerce::float_to_integer(*f) {
                Some(i) => format!("n:{}", i),
                None => format!("n:{}", f),
            },
            AttributeValue::String(s) => format!("s:{}", s),
            AttributeValue::Date(d) => format!("d:{}", d.timestamp_micros()),
            AttributeValue::Array(items) | AttributeValue::Set(items) | AttributeValue::OrderedSet(items) => {
                let keys: Vec<String> = items.iter().map(Self::cache_key).collect();
                format!("[{}]", keys.join(","))
            }
            AttributeValue::Json(v) => format!("j:{}", v),
        }
    }

    /// Whether the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Elements of a collection value
    pub fn elements(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::Array(items) | AttributeValue::Set(items) | AttributeValue::OrderedSet(items) => {
                Some(items)
            }
            _ => None,
        }
    }

    /// Whether the value may be stored in an attribute of the given type
    pub fn conforms_to(&self, attribute_type: AttributeType) -> bool {
        matches!(
            (self, attribute_type),
            (AttributeValue::Null, _)
                | (AttributeValue::Bool(_), AttributeType::Boolean)
                | (AttributeValue::Integer(_), AttributeType::Integer)
                | (AttributeValue::Float(_), AttributeType::Float)
                | (AttributeValue::String(_), AttributeType::String)
                | (AttributeValue::Date(_), AttributeType::Date)
                | (AttributeValue::Array(_), AttributeType::Array)
                | (AttributeValue::Set(_), AttributeType::Set)
                | (AttributeValue::OrderedSet(_), AttributeType::OrderedSet)
                | (_, AttributeType::Json)
        )
    }

    /// Short name of the value's kind for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "boolean",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Float(_) => "float",
            AttributeValue::String(_) => "string",
            AttributeValue::Date(_) => "date",
            AttributeValue::Array(_) => "array",
            AttributeValue::Set(_) => "set",
            AttributeValue::OrderedSet(_) => "ordered_set",
            AttributeValue::Json(_) => "json",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(d: DateTime<Utc>) -> Self {
        AttributeValue::Date(d)
    }
}

/// Value of a relationship
///
/// A relationship key absent from an [`ObjectRecord`] has not been evaluated;
/// `ToOne(None)` is the explicit "no value" marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipValue {
    ToOne(Option<ObjectId>),
    ToMany {
        kind: CollectionKind,
        objects: Vec<ObjectId>,
    },
}

impl RelationshipValue {
    /// Build a to-many value honoring the collection kind's uniqueness rules
    pub fn to_many(kind: CollectionKind, objects: Vec<ObjectId>) -> Self {
        let objects = match kind {
            CollectionKind::Array => objects,
            CollectionKind::Set => {
                let mut objects = objects;
                objects.sort();
                objects.dedup();
                objects
            }
            CollectionKind::OrderedSet => {
                let mut seen = HashSet::new();
                objects.into_iter().filter(|id| seen.insert(*id)).collect()
            }
        };
        RelationshipValue::ToMany { kind, objects }
    }

    /// Related object ids
    pub fn object_ids(&self) -> Vec<ObjectId> {
        match self {
            RelationshipValue::ToOne(Some(id)) => vec![*id],
            RelationshipValue::ToOne(None) => Vec::new(),
            RelationshipValue::ToMany { objects, .. } => objects.clone(),
        }
    }

    fn without(&self, removed: ObjectId) -> Self {
        match self {
            RelationshipValue::ToOne(Some(id)) if *id == removed => RelationshipValue::ToOne(None),
            RelationshipValue::ToOne(other) => RelationshipValue::ToOne(*other),
            RelationshipValue::ToMany { kind, objects } => RelationshipValue::ToMany {
                kind: *kind,
                objects: objects.iter().copied().filter(|id| *id != removed).collect(),
            },
        }
    }
}

/// One object of the graph
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Handle of the object
    pub id: ObjectId,
    /// Entity the object belongs to
    pub entity: String,
    /// Attribute values that have been set
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Relationship values that have been evaluated
    pub relationships: BTreeMap<String, RelationshipValue>,
}

/// Result of reading a key path on an object
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPathValue {
    Attribute(AttributeValue),
    Object(ObjectId),
    Objects(Vec<ObjectId>),
}

/// Arena of schema-checked objects
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    schema: Arc<Schema>,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    next_id: u64,
}

impl ObjectGraph {
    /// Create an empty graph over a schema
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            objects: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// The schema objects are checked against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Shared handle to the schema
    pub fn schema_handle(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Allocate a new, empty object of a registered entity
    pub fn insert(&mut self, entity: &str) -> Result<ObjectId> {
        self.schema.entity(entity)?;
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            ObjectRecord {
                id,
                entity: entity.to_string(),
                attributes: BTreeMap::new(),
                relationships: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Remove an object and every reference to it
    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectRecord> {
        let removed = self.objects.remove(&id)?;
        for record in self.objects.values_mut() {
            for value in record.relationships.values_mut() {
                *value = value.without(id);
            }
        }
        Some(removed)
    }

    /// Put back a previously captured snapshot of an object
    pub fn restore(&mut self, record: ObjectRecord) {
        self.next_id = self.next_id.max(record.id.0 + 1);
        self.objects.insert(record.id, record);
    }

    /// Look up an object
    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(&id)
    }

    /// Look up an object, failing if it does not exist
    pub fn record(&self, id: ObjectId) -> Result<&ObjectRecord> {
        self.objects.get(&id).ok_or(Error::UnknownObject { id: id.0 })
    }

    /// Whether the object exists
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the graph has no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects of an entity, in allocation order
    pub fn objects_of<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a ObjectRecord> + 'a {
        self.objects.values().filter(move |r| r.entity == entity)
    }

    /// Entity description of an object
    pub fn entity_of(&self, id: ObjectId) -> Result<&EntityDescription> {
        let record = self.record(id)?;
        self.schema.entity(&record.entity)
    }

    /// Current value of an attribute, `None` if never set
    pub fn attribute(&self, id: ObjectId, name: &str) -> Option<&AttributeValue> {
        self.objects.get(&id)?.attributes.get(name)
    }

    /// Set an attribute, checking the declared type
    pub fn set_attribute(&mut self, id: ObjectId, name: &str, value: AttributeValue) -> Result<()> {
        let entity = self.entity_of(id)?;
        let attribute = entity.attribute_named(name).ok_or_else(|| {
            Error::schema(&entity.name, format!("unknown attribute '{}'", name))
        })?;
        if !value.conforms_to(attribute.attribute_type) {
            return Err(Error::schema(
                &entity.name,
                format!(
                    "attribute '{}' is declared {} but got {}",
                    name,
                    attribute.attribute_type,
                    value.kind()
                ),
            ));
        }

        let record = self.objects.get_mut(&id).ok_or(Error::UnknownObject { id: id.0 })?;
        record.attributes.insert(name.to_string(), value);
        Ok(())
    }

    /// Current value of a relationship, `None` if never evaluated
    pub fn relationship(&self, id: ObjectId, name: &str) -> Option<&RelationshipValue> {
        self.objects.get(&id)?.relationships.get(name)
    }

    /// Set a relationship, checking cardinality and destination entity
    pub fn set_relationship(&mut self, id: ObjectId, name: &str, value: RelationshipValue) -> Result<()> {
        let entity = self.entity_of(id)?;
        let relationship = entity.relationship_named(name).ok_or_else(|| {
            Error::schema(&entity.name, format!("unknown relationship '{}'", name))
        })?;

        let expected = match &value {
            RelationshipValue::ToOne(_) => Cardinality::ToOne,
            RelationshipValue::ToMany { .. } => Cardinality::ToMany,
        };
        if expected != relationship.cardinality {
            return Err(Error::schema(
                &entity.name,
                format!("relationship '{}' is {:?}", name, relationship.cardinality),
            ));
        }

        for related in value.object_ids() {
            let record = self.record(related)?;
            if record.entity != relationship.destination_entity {
                return Err(Error::schema(
                    &entity.name,
                    format!(
                        "relationship '{}' expects {} but {} is a {}",
                        name, relationship.destination_entity, related, record.entity
                    ),
                ));
            }
        }

        let value = match value {
            RelationshipValue::ToMany { objects, .. } => {
                RelationshipValue::to_many(relationship.collection_kind, objects)
            }
            other => other,
        };

        let record = self.objects.get_mut(&id).ok_or(Error::UnknownObject { id: id.0 })?;
        record.relationships.insert(name.to_string(), value);
        Ok(())
    }

    /// Follow the to-one relationships of a key path's parent segments and
    /// return the object owning the final segment together with its name.
    pub fn resolve_owner(&self, id: ObjectId, path: &KeyPath) -> Result<(ObjectId, String)> {
        let last = path.last().ok_or_else(|| Error::KeyPath {
            path: path.to_string(),
            message: "destination key path must not be empty".to_string(),
        })?;

        let mut current = id;
        for segment in path.parent().segments() {
            current = match self.relationship(current, segment) {
                Some(RelationshipValue::ToOne(Some(next))) => *next,
                _ => {
                    return Err(Error::KeyPath {
                        path: path.to_string(),
                        message: format!("'{}' is not a connected to-one relationship of {}", segment, current),
                    })
                }
            };
        }
        Ok((current, last.to_string()))
    }

    /// Read a key path, traversing relationships
    pub fn value_for_key_path(&self, id: ObjectId, path: &KeyPath) -> Option<KeyPathValue> {
        let (first, rest) = path.segments().split_first()?;
        let record = self.objects.get(&id)?;

        if let Some(value) = record.attributes.get(first) {
            return if rest.is_empty() { Some(KeyPathValue::Attribute(value.clone())) } else { None };
        }

        let rest = KeyPath::parse(&rest.join(".")).ok()?;
        match record.relationships.get(first)? {
            RelationshipValue::ToOne(None) => None,
            RelationshipValue::ToOne(Some(next)) if rest.is_root() => Some(KeyPathValue::Object(*next)),
            RelationshipValue::ToOne(Some(next)) => self.value_for_key_path(*next, &rest),
            RelationshipValue::ToMany { objects, .. } if rest.is_root() => {
                Some(KeyPathValue::Objects(objects.clone()))
            }
            RelationshipValue::ToMany { objects, .. } => {
                let mut ids = Vec::new();
                let mut values = Vec::new();
                for next in objects {
                    match self.value_for_key_path(*next, &rest) {
                        Some(KeyPathValue::Object(o)) => ids.push(o),
                        Some(KeyPathValue::Objects(os)) => ids.extend(os),
                        Some(KeyPathValue::Attribute(v)) => values.push(v),
                        None => {}
                    }
                }
                if values.is_empty() {
                    Some(KeyPathValue::Objects(ids))
                } else {
                    Some(KeyPathValue::Attribute(AttributeValue::Array(values)))
                }
            }
        }
    }

    /// JSON rendition of an object with related objects embedded.
    /// An object already being rendered further up is emitted as `null`.
    pub fn to_json(&self, id: ObjectId) -> Result<Value> {
        let mut stack = Vec::new();
        self.render(id, &mut stack)
    }

    fn render(&self, id: ObjectId, stack: &mut Vec<ObjectId>) -> Result<Value> {
        if stack.contains(&id) {
            return Ok(Value::Null);
        }
        let record = self.record(id)?;
        stack.push(id);

        let mut map = Map::new();
        for (name, value) in &record.attributes {
            map.insert(name.clone(), value.to_json());
        }
        for (name, value) in &record.relationships {
            let rendered = match value {
                RelationshipValue::ToOne(None) => Value::Null,
                RelationshipValue::ToOne(Some(related)) => self.render(*related, stack)?,
                RelationshipValue::ToMany { objects, .. } => Value::Array(
                    objects
                        .iter()
                        .map(|related| self.render(*related, stack))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            map.insert(name.clone(), rendered);
        }

        stack.pop();
        Ok(Value::Object(map))
    }

    /// Deserialize an object (with related objects embedded) into a typed value
    pub fn decode<T: DeserializeOwned>(&self, id: ObjectId) -> Result<T> {
        let value = self.to_json(id)?;
        Ok(serde_json::from_value(value)?)
    }
}
