//! Attribute and relationship property mappings
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::{Mapping, MappingId};
use crate::transformer::SharedTransformer;

/// How a relationship mapping combines new objects with existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentPolicy {
    /// Replace the relationship value with the mapped objects
    #[default]
    Assign,
    /// Add the mapped objects to the existing to-many value
    Union,
    /// Assign, then delete previously related objects that are no longer related
    Replace,
}

/// Copies a value from the representation into an attribute
#[derive(Debug, Clone)]
pub struct AttributeMapping {
    pub(crate) source_key_path: Option<String>,
    pub(crate) destination_key_path: String,
    pub(crate) transformer: Option<SharedTransformer>,
    pub(crate) owner: Option<MappingId>,
}

/// Maps a nested representation into related objects
#[derive(Debug, Clone)]
pub struct RelationshipMapping {
    pub(crate) source_key_path: Option<String>,
    pub(crate) destination_key_path: String,
    pub(crate) mapping: Mapping,
    pub(crate) policy: AssignmentPolicy,
    pub(crate) owner: Option<MappingId>,
}

impl RelationshipMapping {
    /// Descriptor applied to the nested representation
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Assignment policy for the relationship value
    pub fn policy(&self) -> AssignmentPolicy {
        self.policy
    }
}

/// One source key path to destination key path rule
///
/// Property mappings are immutable once added to an object mapping. The
/// owning mapping is referenced by id.
#[derive(Debug, Clone)]
pub enum PropertyMapping {
    Attribute(AttributeMapping),
    Relationship(RelationshipMapping),
}

impl PropertyMapping {
    /// Map `source` (empty for the whole representation) to an attribute
    pub fn attribute(source: impl Into<String>, destination: impl Into<String>) -> Self {
        PropertyMapping::Attribute(AttributeMapping {
            source_key_path: normalize(source.into()),
            destination_key_path: destination.into(),
            transformer: None,
            owner: None,
        })
    }

    /// Map the nested representation at `source` to a relationship
    pub fn relationship(source: impl Into<String>, destination: impl Into<String>, mapping: impl Into<Mapping>) -> Self {
        PropertyMapping::Relationship(RelationshipMapping {
            source_key_path: normalize(source.into()),
            destination_key_path: destination.into(),
            mapping: mapping.into(),
            policy: AssignmentPolicy::Assign,
            owner: None,
        })
    }

    /// Attach a value transformer (attribute mappings only)
    pub fn with_transformer(mut self, transformer: SharedTransformer) -> Self {
        if let PropertyMapping::Attribute(attribute) = &mut self {
            attribute.transformer = Some(transformer);
        }
        self
    }

    /// Set the assignment policy (relationship mappings only)
    pub fn with_policy(mut self, policy: AssignmentPolicy) -> Self {
        if let PropertyMapping::Relationship(relationship) = &mut self {
            relationship.policy = policy;
        }
        self
    }

    /// Source key path, `None` for the whole representation
    pub fn source_key_path(&self) -> Option<&str> {
        match self {
            PropertyMapping::Attribute(a) => a.source_key_path.as_deref(),
            PropertyMapping::Relationship(r) => r.source_key_path.as_deref(),
        }
    }

    /// Destination key path on the target object
    pub fn destination_key_path(&self) -> &str {
        match self {
            PropertyMapping::Attribute(a) => &a.destination_key_path,
            PropertyMapping::Relationship(r) => &r.destination_key_path,
        }
    }

    /// Attached value transformer
    pub fn transformer(&self) -> Option<&SharedTransformer> {
        match self {
            PropertyMapping::Attribute(a) => a.transformer.as_ref(),
            PropertyMapping::Relationship(_) => None,
        }
    }

    /// Id of the object mapping this property belongs to
    pub fn owner(&self) -> Option<MappingId> {
        match self {
            PropertyMapping::Attribute(a) => a.owner,
            PropertyMapping::Relationship(r) => r.owner,
        }
    }

    /// Whether this is a relationship mapping
    pub fn is_relationship(&self) -> bool {
        matches!(self, PropertyMapping::Relationship(_))
    }

    pub(crate) fn set_owner(&mut self, owner: MappingId) {
        match self {
            PropertyMapping::Attribute(a) => a.owner = Some(owner),
            PropertyMapping::Relationship(r) => r.owner = Some(owner),
        }
    }
}

fn normalize(path: String) -> Option<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "$" {
        None
    } else {
        Some(trimmed.to_string())
    }
}
