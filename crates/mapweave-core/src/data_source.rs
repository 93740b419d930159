//! Data sources resolve the target object for each mapped node
//!
//! [`ManagedDataSource`] performs find-or-create against an identity cache
//! whenever the object mapping declares identity attributes.
//! [`TransientDataSource`] always allocates new objects.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::cache::{FetchCache, IdentityCache};
use crate::config::MappingConfig;
use crate::error::{Error, Result};
use crate::mapping::ObjectMapping;
use crate::object::{AttributeValue, ObjectGraph, ObjectId};
use crate::transformer::transform_value;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Object a node maps into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetObject {
    /// The object
    pub id: ObjectId,
    /// Whether it was allocated for this node
    pub created: bool,
}

/// Source of target objects for mapping operations
pub trait MappingDataSource: Send + Sync + fmt::Debug {
    /// Find or allocate the object a representation maps into
    fn target_object_for(
        &self,
        graph: &mut ObjectGraph,
        representation: &Value,
        mapping: &ObjectMapping,
        nested_key: Option<&str>,
        config: &MappingConfig,
    ) -> Result<Option<TargetObject>>;

    /// Exact-match lookup of existing objects
    fn find_objects(
        &self,
        graph: &ObjectGraph,
        entity: &str,
        attributes: &[(String, AttributeValue)],
    ) -> Result<Vec<ObjectId>>;

    /// Reject mappings this data source cannot serve, before anything is mapped
    fn validate_mapping(&self, _mapping: &ObjectMapping) -> Result<()> {
        Ok(())
    }

    /// An object finished mapping and passed validation
    fn did_map_object(&self, _graph: &ObjectGraph, _target: TargetObject) {}

    /// An object was removed from the graph
    fn did_delete_object(&self, _object: ObjectId) {}

    /// Cache used by connection operations
    fn identity_cache(&self) -> Option<Arc<dyn IdentityCache>> {
        None
    }
}

/// Find-or-create against an identity cache
#[derive(Debug, Clone, Default)]
pub struct ManagedDataSource {
    cache: Option<Arc<dyn IdentityCache>>,
}

impl ManagedDataSource {
    /// Create a data source backed by a cache
    pub fn new(cache: Arc<dyn IdentityCache>) -> Self {
        Self { cache: Some(cache) }
    }

    /// Create a data source with no cache. Mappings that declare identity
    /// attributes are rejected.
    pub fn without_cache() -> Self {
        Self { cache: None }
    }

    fn require_cache(&self, mapping: &ObjectMapping) -> Result<&Arc<dyn IdentityCache>> {
        self.cache.as_ref().ok_or_else(|| Error::NilIdentityCache {
            entity: mapping.entity().to_string(),
            attributes: mapping.identification_attributes().to_vec(),
        })
    }

    /// Identity values converted the way the attribute writes convert them,
    /// so they compare equal to stored values. `None` when a value is missing
    /// or cannot be converted.
    fn identity_query(
        graph: &ObjectGraph,
        representation: &Value,
        mapping: &ObjectMapping,
        nested_key: Option<&str>,
        config: &MappingConfig,
    ) -> Result<Option<Vec<(String, AttributeValue)>>> {
        let Some(raw) = mapping.identity_values(representation, nested_key) else {
            return Ok(None);
        };

        let entity = graph.schema().entity(mapping.entity())?;
        let mut query = Vec::with_capacity(raw.len());
        for (attribute, value) in raw {
            let declared = entity
                .attribute_named(&attribute)
                .ok_or_else(|| Error::schema(mapping.entity(), format!("unknown attribute '{}'", attribute)))?;
            let transformer = mapping.transformer_for_attribute(&attribute).map(|t| t.as_ref());
            match transform_value(&AttributeValue::from_json(&value), declared.attribute_type, transformer, config) {
                Ok(coerced) if !coerced.is_null() => query.push((attribute, coerced)),
                Ok(_) => return Ok(None),
                Err(e) => {
                    debug!(entity = mapping.entity(), attribute = %attribute, error = %e, "identity value not coercible");
                    return Ok(None);
                }
            }
        }
        Ok(Some(query))
    }
}

impl MappingDataSource for ManagedDataSource {
    fn target_object_for(
        &self,
        graph: &mut ObjectGraph,
        representation: &Value,
        mapping: &ObjectMapping,
        nested_key: Option<&str>,
        config: &MappingConfig,
    ) -> Result<Option<TargetObject>> {
        if mapping.requires_identity() {
            let cache = self.require_cache(mapping)?;
            match Self::identity_query(graph, representation, mapping, nested_key, config)? {
                Some(query) => {
                    let mut found = cache.find_objects(graph, mapping.entity(), &query)?;
                    found.sort();
                    if found.len() > 1 {
                        warn!(
                            entity = mapping.entity(),
                            matches = found.len(),
                            "identity lookup matched several objects; using the oldest"
                        );
                    }
                    if let Some(id) = found.first() {
                        return Ok(Some(TargetObject { id: *id, created: false }));
                    }
                }
                None => debug!(entity = mapping.entity(), "nil identity value; allocating a new object"),
            }
        }

        let id = graph.insert(mapping.entity())?;
        Ok(Some(TargetObject { id, created: true }))
    }

    fn find_objects(
        &self,
        graph: &ObjectGraph,
        entity: &str,
        attributes: &[(String, AttributeValue)],
    ) -> Result<Vec<ObjectId>> {
        match &self.cache {
            Some(cache) => cache.find_objects(graph, entity, attributes),
            None => FetchCache.find_objects(graph, entity, attributes),
        }
    }

    fn validate_mapping(&self, mapping: &ObjectMapping) -> Result<()> {
        if mapping.requires_identity() {
            self.require_cache(mapping)?;
        }
        Ok(())
    }

    fn did_map_object(&self, graph: &ObjectGraph, target: TargetObject) {
        if let Some(cache) = &self.cache {
            if target.created {
                cache.did_create(graph, target.id);
            } else {
                cache.did_fetch(graph, target.id);
            }
        }
    }

    fn did_delete_object(&self, object: ObjectId) {
        if let Some(cache) = &self.cache {
            cache.did_delete(object);
        }
    }

    fn identity_cache(&self) -> Option<Arc<dyn IdentityCache>> {
        self.cache.clone()
    }
}

/// Allocates a new object for every node and ignores identity attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientDataSource;

impl TransientDataSource {
    /// Create a transient data source
    pub fn new() -> Self {
        Self
    }
}

impl MappingDataSource for TransientDataSource {
    fn target_object_for(
        &self,
        graph: &mut ObjectGraph,
        _representation: &Value,
        mapping: &ObjectMapping,
        _nested_key: Option<&str>,
        _config: &MappingConfig,
    ) -> Result<Option<TargetObject>> {
        let id = graph.insert(mapping.entity())?;
        Ok(Some(TargetObject { id, created: true }))
    }

    fn find_objects(
        &self,
        graph: &ObjectGraph,
        entity: &str,
        attributes: &[(String, AttributeValue)],
    ) -> Result<Vec<ObjectId>> {
        FetchCache.find_objects(graph, entity, attributes)
    }
}
