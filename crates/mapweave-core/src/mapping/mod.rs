//! Mapping descriptors
//!
//! An [`ObjectMapping`] declares, for one entity, which representation key
//! paths feed which attributes and relationships. A [`DynamicMapping`] picks
//! an object mapping per node by evaluating matchers against the node's
//! representation. [`Mapping`] is either of the two and is what providers
//! and relationship mappings hold.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

pub mod dynamic;
pub mod object_mapping;
pub mod property;

pub use dynamic::{DynamicMapping, MappingMatcher, MatchCondition};
pub use object_mapping::{ObjectMapping, ObjectMappingBuilder};
pub use property::{AssignmentPolicy, AttributeMapping, PropertyMapping, RelationshipMapping};

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of an object mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingId(u64);

impl MappingId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        MappingId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mapping-{}", self.0)
    }
}

/// A static or dynamic mapping
#[derive(Debug, Clone)]
pub enum Mapping {
    Object(Arc<ObjectMapping>),
    Dynamic(Arc<DynamicMapping>),
}

impl Mapping {
    /// Concrete mapping for a node, `None` when a dynamic mapping has no match
    pub fn resolve(&self, representation: &Value) -> Option<Arc<ObjectMapping>> {
        match self {
            Mapping::Object(mapping) => Some(Arc::clone(mapping)),
            Mapping::Dynamic(dynamic) => dynamic.object_mapping_for(representation).cloned(),
        }
    }

    /// Every object mapping this mapping can produce
    pub fn object_mappings(&self) -> Vec<&Arc<ObjectMapping>> {
        match self {
            Mapping::Object(mapping) => vec![mapping],
            Mapping::Dynamic(dynamic) => dynamic.matchers().iter().map(|m| m.mapping()).collect(),
        }
    }

    /// Root key path of a static mapping
    pub fn root_key_path(&self) -> Option<&str> {
        match self {
            Mapping::Object(mapping) => mapping.root_key_path(),
            Mapping::Dynamic(_) => None,
        }
    }

    /// Whether dictionaries are mapped as collections
    pub fn force_collection_mapping(&self) -> bool {
        match self {
            Mapping::Object(mapping) => mapping.force_collection_mapping(),
            Mapping::Dynamic(_) => false,
        }
    }

    /// Attribute receiving the key of each element of a forced collection
    pub fn nested_dictionary_key_attribute(&self) -> Option<&str> {
        match self {
            Mapping::Object(mapping) => mapping.nested_dictionary_key_attribute(),
            Mapping::Dynamic(_) => None,
        }
    }
}

impl From<Arc<ObjectMapping>> for Mapping {
    fn from(mapping: Arc<ObjectMapping>) -> Self {
        Mapping::Object(mapping)
    }
}

impl From<Arc<DynamicMapping>> for Mapping {
    fn from(mapping: Arc<DynamicMapping>) -> Self {
        Mapping::Dynamic(mapping)
    }
}

impl From<DynamicMapping> for Mapping {
    fn from(mapping: DynamicMapping) -> Self {
        Mapping::Dynamic(Arc::new(mapping))
    }
}
