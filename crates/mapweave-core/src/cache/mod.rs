//! Identity caches used for find-or-create and connection lookups
//!
//! An [`IdentityCache`] answers exact-match queries of the form "objects of
//! entity E whose attributes equal these values". Caches are shared between
//! mapping operations and connection operations, so they must be `Send +
//! Sync` and tolerate concurrent callers.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

pub mod fetch;
pub mod in_memory;

pub use fetch::FetchCache;
pub use in_memory::{CacheStats, InMemoryCache};

use crate::error::Result;
use crate::object::{AttributeValue, ObjectGraph, ObjectId, ObjectRecord};
use std::fmt;

/// Exact-match lookup of objects by attribute values
pub trait IdentityCache: Send + Sync + fmt::Debug {
    /// Objects of `entity` whose attributes equal every given value.
    /// Result order is unspecified.
    fn find_objects(
        &self,
        graph: &ObjectGraph,
        entity: &str,
        attributes: &[(String, AttributeValue)],
    ) -> Result<Vec<ObjectId>>;

    /// An existing object was found and mapped
    fn did_fetch(&self, _graph: &ObjectGraph, _object: ObjectId) {}

    /// A new object was created and mapped
    fn did_create(&self, _graph: &ObjectGraph, _object: ObjectId) {}

    /// An object was deleted. Must take effect before the next query.
    fn did_delete(&self, _object: ObjectId) {}
}

/// Whether a record currently holds every given attribute value
pub(crate) fn record_matches(record: &ObjectRecord, attributes: &[(String, AttributeValue)]) -> bool {
    attributes.iter().all(|(name, expected)| {
        record
            .attributes
            .get(name)
            .is_some_and(|actual| !actual.is_null() && actual.cache_key() == expected.cache_key())
    })
}
