//! Index-less cache that scans the graph on every query
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use super::{record_matches, IdentityCache};
use crate::error::Result;
use crate::object::{AttributeValue, ObjectGraph, ObjectId};

/// Answers every query by scanning the objects of the entity
///
/// Always current, linear in the number of objects per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchCache;

impl FetchCache {
    /// Create a fetch cache
    pub fn new() -> Self {
        Self
    }
}

impl IdentityCache for FetchCache {
    fn find_objects(
        &self,
        graph: &ObjectGraph,
        entity: &str,
        attributes: &[(String, AttributeValue)],
    ) -> Result<Vec<ObjectId>> {
        graph.schema().entity(entity)?;
        Ok(graph
            .objects_of(entity)
            .filter(|record| record_matches(record, attributes))
            .map(|record| record.id)
            .collect())
    }
}
