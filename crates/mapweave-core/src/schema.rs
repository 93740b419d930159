//! Entity schema: the typed accessor table for target objects
//!
//! Each target type registers an [`EntityDescription`] once, naming its
//! attributes with their declared [`AttributeType`] and its relationships with
//! their destination entity, cardinality and collection kind. Mapping
//! operations consult the schema instead of inspecting objects at run time.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Array,
    Set,
    OrderedSet,
    /// Arbitrary JSON, stored untouched
    Json,
}

impl AttributeType {
    /// Whether this is one of the collection types
    pub fn is_collection(&self) -> bool {
        matches!(self, AttributeType::Array | AttributeType::Set | AttributeType::OrderedSet)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::Array => "array",
            AttributeType::Set => "set",
            AttributeType::OrderedSet => "ordered_set",
            AttributeType::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// Whether a relationship points at one object or many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// Collection type of a to-many relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    #[default]
    Array,
    Set,
    OrderedSet,
}

/// An attribute of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    /// Attribute name
    pub name: String,
    /// Declared type values are coerced to
    pub attribute_type: AttributeType,
}

/// A relationship of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescription {
    /// Relationship name
    pub name: String,
    /// Entity of the related objects
    pub destination_entity: String,
    /// To-one or to-many
    pub cardinality: Cardinality,
    /// Collection type for to-many relationships
    #[serde(default)]
    pub collection_kind: CollectionKind,
}

impl RelationshipDescription {
    /// Whether the relationship is to-many
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }
}

/// Description of one target type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    /// Entity name
    pub name: String,
    /// Attributes by name
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDescription>,
    /// Relationships by name
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDescription>,
}

impl EntityDescription {
    /// Create an entity with no properties
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Add an attribute
    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        let name = name.into();
        self.attributes.insert(
            name.clone(),
            AttributeDescription { name, attribute_type },
        );
        self
    }

    /// Add a to-one relationship
    pub fn to_one(mut self, name: impl Into<String>, destination_entity: impl Into<String>) -> Self {
        let name = name.into();
        self.relationships.insert(
            name.clone(),
            RelationshipDescription {
                name,
                destination_entity: destination_entity.into(),
                cardinality: Cardinality::ToOne,
                collection_kind: CollectionKind::Array,
            },
        );
        self
    }

    /// Add a to-many relationship
    pub fn to_many(
        mut self,
        name: impl Into<String>,
        destination_entity: impl Into<String>,
        collection_kind: CollectionKind,
    ) -> Self {
        let name = name.into();
        self.relationships.insert(
            name.clone(),
            RelationshipDescription {
                name,
                destination_entity: destination_entity.into(),
                cardinality: Cardinality::ToMany,
                collection_kind,
            },
        );
        self
    }

    /// Look up an attribute
    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.get(name)
    }

    /// Look up a relationship
    pub fn relationship_named(&self, name: &str) -> Option<&RelationshipDescription> {
        self.relationships.get(name)
    }

    /// Whether a name is a known attribute or relationship
    pub fn has_property(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.relationships.contains_key(name)
    }
}

/// The set of registered entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    entities: BTreeMap<String, EntityDescription>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a schema from a JSON document of the form `{"entities": {...}}`
    pub fn from_json_str(content: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Register an entity. Registering the same name twice is an error.
    pub fn register(&mut self, entity: EntityDescription) -> Result<()> {
        if self.entities.contains_key(&entity.name) {
            return Err(Error::schema(&entity.name, "entity is already registered"));
        }
        if let Some(name) = entity.attributes.keys().find(|n| entity.relationships.contains_key(*n)) {
            return Err(Error::schema(
                &entity.name,
                format!("'{}' is declared as both attribute and relationship", name),
            ));
        }
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_entity(mut self, entity: EntityDescription) -> Result<Self> {
        self.register(entity)?;
        Ok(self)
    }

    /// Look up an entity, failing if it is unknown
    pub fn entity(&self, name: &str) -> Result<&EntityDescription> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::schema(name, "entity is not registered"))
    }

    /// Look up an entity
    pub fn get(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.get(name)
    }

    /// All registered entities
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescription> {
        self.entities.values()
    }

    /// Check that every relationship targets a registered entity
    pub fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            for relationship in entity.relationships.values() {
                if !self.entities.contains_key(&relationship.destination_entity) {
                    return Err(Error::schema(
                        &entity.name,
                        format!(
                            "relationship '{}' targets unknown entity '{}'",
                            relationship.name, relationship.destination_entity
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
