//! In-memory identity cache with lazily built attribute indexes
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::{record_matches, IdentityCache};
use crate::error::{Error, Result};
use crate::object::{AttributeValue, ObjectGraph, ObjectId, ObjectRecord};
use std::collections::HashMap;
use std::sync::RwLock;

const KEY_SEPARATOR: char = '\u{1f}';

/// Index of one entity over one set of attributes
#[derive(Debug, Default)]
struct AttributeIndex {
    by_key: HashMap<String, Vec<ObjectId>>,
    by_object: HashMap<ObjectId, String>,
}

impl AttributeIndex {
    fn insert(&mut self, object: ObjectId, key: String) {
        self.remove(object);
        self.by_key.entry(key.clone()).or_default().push(object);
        self.by_object.insert(object, key);
    }

    fn remove(&mut self, object: ObjectId) {
        if let Some(key) = self.by_object.remove(&object) {
            if let Some(objects) = self.by_key.get_mut(&key) {
                objects.retain(|id| *id != object);
                if objects.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
    }
}

/// (entity, sorted attribute names)
type IndexKey = (String, Vec<String>);

/// Statistics about the indexes held by an [`InMemoryCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Number of (entity, attribute set) indexes built so far
    pub indexes: usize,
    /// Number of indexed objects across all indexes
    pub entries: usize,
}

/// Identity cache keeping one index per entity and attribute set
///
/// An index is built from the graph on the first query for its entity and
/// attributes, then kept current by the change hooks. Candidates are checked
/// against the graph before being returned, so a stale or deleted object is
/// never handed out.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    indexes: RwLock<HashMap<IndexKey, AttributeIndex>>,
}

impl InMemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index statistics
    pub fn stats(&self) -> CacheStats {
        match self.indexes.read() {
            Ok(indexes) => CacheStats {
                indexes: indexes.len(),
                entries: indexes.values().map(|i| i.by_object.len()).sum(),
            },
            Err(_) => CacheStats::default(),
        }
    }

    /// Drop every index
    pub fn clear(&self) {
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.clear();
        }
    }

    fn build_index(graph: &ObjectGraph, entity: &str, names: &[String]) -> AttributeIndex {
        let mut index = AttributeIndex::default();
        for record in graph.objects_of(entity) {
            if let Some(key) = record_key(record, names) {
                index.insert(record.id, key);
            }
        }
        index
    }

    fn reindex(&self, graph: &ObjectGraph, object: ObjectId) {
        let Some(record) = graph.get(object) else {
            return;
        };
        if let Ok(mut indexes) = self.indexes.write() {
            for ((entity, names), index) in indexes.iter_mut() {
                if *entity != record.entity {
                    continue;
                }
                match record_key(record, names) {
                    Some(key) => index.insert(object, key),
                    None => index.remove(object),
                }
            }
        }
    }
}

fn composite_key<'a>(values: impl Iterator<Item = &'a AttributeValue>) -> String {
    let keys: Vec<String> = values.map(AttributeValue::cache_key).collect();
    keys.join(&KEY_SEPARATOR.to_string())
}

fn record_key(record: &ObjectRecord, names: &[String]) -> Option<String> {
    let mut values = Vec::with_capacity(names.len());
    for name in names {
        match record.attributes.get(name) {
            Some(value) if !value.is_null() => values.push(value),
            _ => return None,
        }
    }
    Some(composite_key(values.into_iter()))
}

fn poisoned() -> Error {
    Error::InvalidState {
        message: "identity cache lock was poisoned".to_string(),
    }
}

impl IdentityCache for InMemoryCache {
    fn find_objects(
        &self,
        graph: &ObjectGraph,
        entity: &str,
        attributes: &[(String, AttributeValue)],
    ) -> Result<Vec<ObjectId>> {
        graph.schema().entity(entity)?;

        let mut sorted: Vec<&(String, AttributeValue)> = attributes.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let names: Vec<String> = sorted.iter().map(|(name, _)| name.clone()).collect();
        let key = composite_key(sorted.iter().map(|(_, value)| value));
        let index_key = (entity.to_string(), names);

        let candidates = {
            let indexes = self.indexes.read().map_err(|_| poisoned())?;
            indexes
                .get(&index_key)
                .map(|index| index.by_key.get(&key).cloned().unwrap_or_default())
        };

        let candidates = match candidates {
            Some(candidates) => candidates,
            None => {
                let mut indexes = self.indexes.write().map_err(|_| poisoned())?;
                let index = indexes
                    .entry(index_key.clone())
                    .or_insert_with(|| Self::build_index(graph, entity, &index_key.1));
                index.by_key.get(&key).cloned().unwrap_or_default()
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|id| {
                graph
                    .get(*id)
                    .is_some_and(|record| record.entity == entity && record_matches(record, attributes))
            })
            .collect())
    }

    fn did_fetch(&self, graph: &ObjectGraph, object: ObjectId) {
        self.reindex(graph, object);
    }

    fn did_create(&self, graph: &ObjectGraph, object: ObjectId) {
        self.reindex(graph, object);
    }

    fn did_delete(&self, object: ObjectId) {
        if let Ok(mut indexes) = self.indexes.write() {
            for index in indexes.values_mut() {
                index.remove(object);
            }
        }
    }
}
