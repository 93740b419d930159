//! Mapping pass over a whole representation
//!
//! A [`Mapper`] asks its [`MappingProvider`] which mapping governs each key
//! path of the representation, runs one [`MappingOperation`] per mappable
//! node and collects the objects and conditions into a [`MappingResult`].
//! Once every node has been mapped, the connections declared by the mappings
//! run against the objects of the finished pass.
//!
//! ```
//! use mapweave_core::{
//!     EntityDescription, AttributeType, Mapper, MappingConfig, MappingsDictionary,
//!     ObjectGraph, ObjectMapping, Schema, TransientDataSource,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Schema::new()
//!     .with_entity(EntityDescription::new("User").attribute("name", AttributeType::String))?;
//! let user = ObjectMapping::builder("User").attribute("name", "name").build(&schema)?;
//! let provider = MappingsDictionary::new().with_key_path("user", user);
//!
//! let mut graph = ObjectGraph::new(Arc::new(schema));
//! let representation = json!({"user": {"name": "Blake"}});
//! let config = MappingConfig::default();
//! let result = Mapper::new(&representation, &provider, &TransientDataSource, &config).execute(&mut graph)?;
//!
//! let blake = result.first_object().unwrap();
//! assert_eq!(graph.attribute(blake, "name"), Some(&"Blake".into()));
//! # Ok::<(), mapweave_core::Error>(())
//! ```
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::cache::FetchCache;
use crate::cancel::CancellationToken;
use crate::config::MappingConfig;
use crate::connection::{ConnectedValue, ConnectionOperation, ConnectionQueue, ConnectionReport};
use crate::data_source::{MappingDataSource, TargetObject};
use crate::error::{Error, MappingError, MappingErrorCode, Result};
use crate::keypath::{join_paths, value_at};
use crate::mapping::{Mapping, MappingId, ObjectMapping};
use crate::object::{ObjectGraph, ObjectId};
use crate::operation::{MappedObject, MappingOperation};
use crate::result::{MappedValue, MappingResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, trace};

/// Source of the mappings governing a representation
pub trait MappingProvider: Send + Sync + fmt::Debug {
    /// Key paths with a mapping, in mapping order. `None` is the root
    /// representation.
    fn mappings(&self) -> Vec<(Option<String>, Mapping)>;

    /// Mapping governing one key path
    fn mapping_for_key_path(&self, key_path: Option<&str>) -> Option<Mapping> {
        self.mappings()
            .into_iter()
            .find(|(k, _)| k.as_deref() == key_path)
            .map(|(_, m)| m)
    }
}

/// Ordered key path to mapping table
#[derive(Debug, Clone, Default)]
pub struct MappingsDictionary {
    entries: Vec<(Option<String>, Mapping)>,
}

impl MappingsDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the root representation
    pub fn with_root(self, mapping: impl Into<Mapping>) -> Self {
        self.with_entry(None, mapping.into())
    }

    /// Map the value at a key path. An empty key path is the root.
    pub fn with_key_path(self, key_path: impl Into<String>, mapping: impl Into<Mapping>) -> Self {
        let key_path = key_path.into();
        let key_path = if key_path.is_empty() { None } else { Some(key_path) };
        self.with_entry(key_path, mapping.into())
    }

    fn with_entry(mut self, key_path: Option<String>, mapping: Mapping) -> Self {
        match self.entries.iter_mut().find(|(k, _)| *k == key_path) {
            Some(entry) => entry.1 = mapping,
            None => self.entries.push((key_path, mapping)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MappingProvider for MappingsDictionary {
    fn mappings(&self) -> Vec<(Option<String>, Mapping)> {
        self.entries.clone()
    }
}

/// Lifecycle of a [`Mapper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperState {
    Idle,
    Mapping,
    Finished,
    Cancelled,
}

/// Called once per connection operation with the object and its connected values
pub type ConnectionCallback = Arc<dyn Fn(ObjectId, &BTreeMap<String, ConnectedValue>) + Send + Sync>;

/// One node of the representation with the mapping that governs it
struct Node<'v> {
    key_path: String,
    nested_key: Option<String>,
    value: &'v Value,
}

/// Drives one mapping pass. A mapper executes once.
pub struct Mapper<'a> {
    representation: &'a Value,
    provider: &'a dyn MappingProvider,
    data_source: &'a dyn MappingDataSource,
    config: &'a MappingConfig,
    cancellation: CancellationToken,
    target_object: Option<ObjectId>,
    connection_callback: Option<ConnectionCallback>,
    state: MapperState,
}

impl<'a> Mapper<'a> {
    pub fn new(
        representation: &'a Value,
        provider: &'a dyn MappingProvider,
        data_source: &'a dyn MappingDataSource,
        config: &'a MappingConfig,
    ) -> Self {
        Self {
            representation,
            provider,
            data_source,
            config,
            cancellation: CancellationToken::new(),
            target_object: None,
            connection_callback: None,
            state: MapperState::Idle,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Update this object with the root mapping instead of asking the data
    /// source for a target
    pub fn with_target_object(mut self, object: ObjectId) -> Self {
        self.target_object = Some(object);
        self
    }

    /// Observe the connected values of every connection operation the pass
    /// runs
    pub fn with_connection_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(ObjectId, &BTreeMap<String, ConnectedValue>) + Send + Sync + 'static,
    {
        self.connection_callback = Some(Arc::new(callback));
        self
    }

    pub fn state(&self) -> MapperState {
        self.state
    }

    /// Token observed by this mapper; cancelling it stops the pass before the
    /// next node
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn check_cancelled(&mut self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            self.state = MapperState::Cancelled;
            return Err(Error::Cancelled {
                message: "mapping pass cancelled".to_string(),
            });
        }
        Ok(())
    }

    /// Run the pass
    ///
    /// Per-node conditions are collected in the result. Returns `Err` when
    /// the mapper already ran, when the representation is neither a
    /// dictionary nor an array, when a mapping cannot be served by the data
    /// source, or when the pass is cancelled.
    pub fn execute(&mut self, graph: &mut ObjectGraph) -> Result<MappingResult> {
        if self.state != MapperState::Idle {
            return Err(Error::InvalidState {
                message: format!("mapper is {:?}; construct a new mapper per pass", self.state),
            });
        }
        self.state = MapperState::Mapping;
        self.check_cancelled()?;

        if !(self.representation.is_object() || self.representation.is_array()) {
            self.state = MapperState::Finished;
            return Err(Error::UnmappableRepresentation {
                message: "representation must be a dictionary or an array".to_string(),
            });
        }

        let mappings = self.provider.mappings();
        if let Err(e) = self.validate_mappings(&mappings) {
            self.state = MapperState::Finished;
            return Err(e);
        }

        let span = info_span!("mapping_pass", mappings = mappings.len());
        let _guard = span.enter();

        let mut result = MappingResult::new();
        let mut mapped: Vec<MappedObject> = Vec::new();
        let mut found_any = false;

        for (key_path, mapping) in &mappings {
            // an array fanned out over a key no element has reads as absent
            let Some(value) = value_at(self.representation, key_path.as_deref()) else {
                trace!(key_path = ?key_path, "no value at key path");
                continue;
            };
            let root = mapping.root_key_path();
            let Some(value) = value_at(&value, root).filter(|v| !v.is_null()) else {
                trace!(key_path = ?key_path, root_key_path = ?root, "no value at root key path");
                continue;
            };
            found_any = true;

            let base = join_paths(key_path.as_deref(), root).unwrap_or_default();
            let (nodes, is_collection) = collect_nodes(&value, mapping, &base);
            debug!(key_path = ?key_path, nodes = nodes.len(), collection = is_collection, "mapping key path");

            let mut objects = Vec::with_capacity(nodes.len());
            for node in nodes {
                self.check_cancelled()?;
                let target_override = if key_path.is_none() && !is_collection {
                    self.target_object
                } else {
                    None
                };
                if let Some(id) = self.map_node(graph, &node, mapping, target_override, &mut result, &mut mapped)? {
                    objects.push(id);
                }
            }

            if is_collection {
                result.insert(key_path.as_deref(), MappedValue::Collection(objects));
            } else if let Some(id) = objects.first() {
                result.insert(key_path.as_deref(), MappedValue::Object(*id));
            }
        }

        if !found_any {
            result.push_error(MappingError::new(
                MappingErrorCode::NotFound,
                None,
                "no mappable values were found in the representation",
            ));
        }

        self.check_cancelled()?;
        let reports = self.connect(graph, mapped)?;
        self.check_cancelled()?;
        result.set_connection_reports(reports);

        debug!(objects = result.count(), errors = result.error_count(), "mapping pass finished");
        self.state = MapperState::Finished;
        Ok(result)
    }

    /// Reject mappings the data source cannot serve before anything is touched
    fn validate_mappings(&self, mappings: &[(Option<String>, Mapping)]) -> Result<()> {
        let mut seen: Vec<MappingId> = Vec::new();
        let mut stack: Vec<Arc<ObjectMapping>> = mappings
            .iter()
            .flat_map(|(_, m)| m.object_mappings().into_iter().cloned())
            .collect();

        while let Some(mapping) = stack.pop() {
            if seen.contains(&mapping.id()) {
                continue;
            }
            seen.push(mapping.id());
            self.data_source.validate_mapping(&mapping)?;
            for relationship in mapping.relationship_mappings() {
                stack.extend(relationship.mapping().object_mappings().into_iter().cloned());
            }
        }
        Ok(())
    }

    fn map_node(
        &self,
        graph: &mut ObjectGraph,
        node: &Node<'_>,
        mapping: &Mapping,
        target_override: Option<ObjectId>,
        result: &mut MappingResult,
        mapped: &mut Vec<MappedObject>,
    ) -> Result<Option<ObjectId>> {
        let key_path = (!node.key_path.is_empty()).then(|| node.key_path.clone());

        let Some(resolved) = mapping.resolve(node.value) else {
            result.push_error(MappingError::new(
                MappingErrorCode::UnableToDetermineMapping,
                key_path,
                "no dynamic mapping matcher matched",
            ));
            return Ok(None);
        };

        let target = match target_override {
            Some(id) => Some(TargetObject { id, created: false }),
            None => self.data_source.target_object_for(
                graph,
                node.value,
                &resolved,
                node.nested_key.as_deref(),
                self.config,
            )?,
        };
        let Some(target) = target else {
            result.push_error(MappingError::new(
                MappingErrorCode::NilDestinationObject,
                key_path,
                format!("data source produced no {}", resolved.entity()),
            ));
            return Ok(None);
        };

        let mut operation = MappingOperation::new(node.value, Some(target.id), resolved, self.data_source, self.config)
            .with_key_path(node.key_path.clone())
            .with_created_target(target.created);
        if let Some(key) = &node.nested_key {
            operation = operation.with_nested_key(key.clone());
        }

        let report = operation.perform(graph)?;
        result.extend_errors(report.errors);
        mapped.extend(report.mapped);
        Ok(report.object)
    }

    /// Run the connections of every object mapped in this pass
    fn connect(&self, graph: &mut ObjectGraph, mapped: Vec<MappedObject>) -> Result<Vec<ConnectionReport>> {
        let mut queue = ConnectionQueue::new();
        let mut enqueued: Vec<(ObjectId, MappingId)> = Vec::new();
        for MappedObject { id, mapping } in mapped {
            if mapping.connections().is_empty() || !graph.contains(id) || enqueued.contains(&(id, mapping.id())) {
                continue;
            }
            enqueued.push((id, mapping.id()));
            let mut operation = ConnectionOperation::new(id, mapping.connections().to_vec())
                .with_cancellation(self.cancellation.clone())
                .with_config(self.config.clone());
            if let Some(callback) = &self.connection_callback {
                let callback = Arc::clone(callback);
                operation = operation.on_completion(move |values| callback(id, values));
            }
            queue.enqueue(operation);
        }
        queue.mark_pass_complete();

        if queue.is_empty() {
            return Ok(Vec::new());
        }
        match self.data_source.identity_cache() {
            Some(cache) => queue.drain(graph, cache.as_ref()),
            None => queue.drain(graph, &FetchCache),
        }
    }
}

/// Split a value into the nodes a mapping applies to
fn collect_nodes<'v>(value: &'v Value, mapping: &Mapping, base: &str) -> (Vec<Node<'v>>, bool) {
    match value {
        Value::Array(items) => (
            items
                .iter()
                .enumerate()
                .map(|(i, item)| Node {
                    key_path: format!("{}[{}]", base, i),
                    nested_key: None,
                    value: item,
                })
                .collect(),
            true,
        ),
        Value::Object(map) if mapping.force_collection_mapping() => (
            map.iter()
                .map(|(key, item)| Node {
                    key_path: format!("{}[{}]", base, key),
                    nested_key: Some(key.clone()),
                    value: item,
                })
                .collect(),
            true,
        ),
        _ => (
            vec![Node {
                key_path: base.to_string(),
                nested_key: None,
                value,
            }],
            false,
        ),
    }
}
