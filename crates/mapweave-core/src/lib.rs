//! Mapweave Core - descriptor-driven object mapping
//!
//! This crate maps loosely typed representations (already parsed JSON) onto
//! a typed object graph and back. Mappings are declared once per entity and
//! reused for every payload.
//!
//! # Main Components
//!
//! - **Schema and objects**: [`Schema`] declares entities, [`ObjectGraph`]
//!   stores their instances
//! - **Mappings**: [`ObjectMapping`] and [`DynamicMapping`] describe how key
//!   paths of a representation feed attributes and relationships
//! - **Mapping engine**: [`MappingOperation`] maps one node, [`Mapper`] drives
//!   a whole pass and produces a [`MappingResult`]
//! - **Identity**: [`MappingDataSource`] implementations find or create target
//!   objects through an [`IdentityCache`]
//! - **Connections**: [`ConnectionDescription`] populates relationships by
//!   lookup once a pass has finished
//! - **Serialization**: [`ObjectSerializer`] turns objects back into
//!   representations
//!
//! # Example
//!
//! ```
//! use mapweave_core::{
//!     AttributeType, AttributeValue, EntityDescription, InMemoryCache, ManagedDataSource, Mapper,
//!     MappingConfig, MappingsDictionary, ObjectGraph, ObjectMapping, Result, Schema,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! fn example() -> Result<()> {
//!     let schema = Schema::new().with_entity(
//!         EntityDescription::new("User")
//!             .attribute("user_id", AttributeType::Integer)
//!             .attribute("name", AttributeType::String),
//!     )?;
//!     let users = ObjectMapping::builder("User")
//!         .attribute("id", "user_id")
//!         .attribute("name", "name")
//!         .identification_attributes(["user_id"])
//!         .build(&schema)?;
//!     let provider = MappingsDictionary::new().with_key_path("users", users);
//!     let data_source = ManagedDataSource::new(Arc::new(InMemoryCache::new()));
//!     let config = MappingConfig::default();
//!     let mut graph = ObjectGraph::new(Arc::new(schema));
//!
//!     let payload = json!({"users": [{"id": 1, "name": "Blake"}, {"id": 2, "name": "Rachit"}]});
//!     let result = Mapper::new(&payload, &provider, &data_source, &config).execute(&mut graph)?;
//!     assert_eq!(result.count(), 2);
//!
//!     // the same identity updates the existing object
//!     let payload = json!({"users": [{"id": 1, "name": "Blake Watters"}]});
//!     let result = Mapper::new(&payload, &provider, &data_source, &config).execute(&mut graph)?;
//!     let blake = result.first_object().unwrap();
//!     assert_eq!(graph.len(), 2);
//!     assert_eq!(graph.attribute(blake, "name"), Some(&AttributeValue::from("Blake Watters")));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

pub mod cache;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod data_source;
pub mod error;
pub mod keypath;
pub mod mapper;
pub mod mapping;
pub mod object;
pub mod operation;
pub mod result;
pub mod schema;
pub mod serializer;
pub mod transformer;
pub mod validation;

// Re-export main types for convenience
pub use error::{Error, MappingError, MappingErrorCode, Result, Severity};
pub use config::MappingConfig;
pub use cancel::CancellationToken;
pub use keypath::KeyPath;
pub use schema::{
    AttributeDescription, AttributeType, Cardinality, CollectionKind, EntityDescription, RelationshipDescription,
    Schema,
};
pub use object::{AttributeValue, KeyPathValue, ObjectGraph, ObjectId, ObjectRecord, RelationshipValue};
pub use transformer::{SharedTransformer, TransformError, ValueTransformer};
pub use mapping::{
    AssignmentPolicy, DynamicMapping, Mapping, MappingId, MappingMatcher, MatchCondition, ObjectMapping,
    ObjectMappingBuilder, PropertyMapping,
};
pub use cache::{CacheStats, FetchCache, IdentityCache, InMemoryCache};
pub use data_source::{ManagedDataSource, MappingDataSource, TargetObject, TransientDataSource};
pub use validation::{SharedValidator, ValidationFailure, Validator};
pub use operation::{AppliedMapping, AppliedValue, MappedObject, MappingOperation, MappingOperationReport};
pub use connection::{
    ConnectedValue, ConnectionDescription, ConnectionKind, ConnectionMatcher, ConnectionOperation, ConnectionQueue,
    ConnectionReport,
};
pub use mapper::{ConnectionCallback, Mapper, MapperState, MappingProvider, MappingsDictionary};
pub use result::{MappedValue, MappingResult};
pub use serializer::ObjectSerializer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
