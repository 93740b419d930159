//! Connecting relationships of mapped objects by lookup
//!
//! A [`ConnectionDescription`] declares how one relationship is populated,
//! either by foreign key equivalence or by reading a key path on the source
//! object. [`ConnectionOperation`] applies the descriptions of one mapped
//! object and [`ConnectionQueue`] defers those operations until the mapping
//! pass that created the objects has completed.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

pub mod description;
pub mod operation;
pub mod queue;

pub use description::{ConnectionDescription, ConnectionKind, ConnectionMatcher};
pub use operation::{ConnectedValue, ConnectionOperation, ConnectionReport};
pub use queue::ConnectionQueue;
