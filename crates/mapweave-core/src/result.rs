//! Aggregate output of a mapping pass
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::connection::ConnectionReport;
use crate::error::MappingError;
use crate::object::ObjectId;

/// Key under which the root representation's objects are stored
pub const ROOT_KEY: &str = "";

/// Objects mapped at one key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedValue {
    /// A single dictionary was mapped
    Object(ObjectId),
    /// A collection was mapped; failed elements are absent
    Collection(Vec<ObjectId>),
}

impl MappedValue {
    /// Mapped objects in representation order
    pub fn objects(&self) -> &[ObjectId] {
        match self {
            MappedValue::Object(id) => std::slice::from_ref(id),
            MappedValue::Collection(ids) => ids,
        }
    }
}

/// Ordered key path to mapped objects, with every condition recorded
#[derive(Debug, Clone, Default)]
pub struct MappingResult {
    entries: Vec<(String, MappedValue)>,
    errors: Vec<MappingError>,
    connection_reports: Vec<ConnectionReport>,
}

impl MappingResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, key_path: Option<&str>, value: MappedValue) {
        let key = key_path.unwrap_or(ROOT_KEY).to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub(crate) fn push_error(&mut self, error: MappingError) {
        self.errors.push(error);
    }

    pub(crate) fn extend_errors(&mut self, errors: impl IntoIterator<Item = MappingError>) {
        self.errors.extend(errors);
    }

    pub(crate) fn set_connection_reports(&mut self, reports: Vec<ConnectionReport>) {
        for report in &reports {
            self.errors.extend(report.errors.iter().cloned());
        }
        self.connection_reports = reports;
    }

    /// Entries in the order their key paths were mapped
    pub fn entries(&self) -> &[(String, MappedValue)] {
        &self.entries
    }

    /// Objects mapped at a key path (`""` or `None` for the root)
    pub fn get(&self, key_path: Option<&str>) -> Option<&MappedValue> {
        let key = key_path.unwrap_or(ROOT_KEY);
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First mapped object across all key paths
    pub fn first_object(&self) -> Option<ObjectId> {
        self.objects().into_iter().next()
    }

    /// Every mapped object, key path order then representation order
    pub fn objects(&self) -> Vec<ObjectId> {
        self.entries.iter().flat_map(|(_, v)| v.objects().iter().copied()).collect()
    }

    /// Number of mapped objects
    pub fn count(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.objects().len()).sum()
    }

    /// All recorded conditions, warnings included
    pub fn errors(&self) -> &[MappingError] {
        &self.errors
    }

    /// Number of recorded conditions
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Reports of the deferred connection operations
    pub fn connection_reports(&self) -> &[ConnectionReport] {
        &self.connection_reports
    }

    /// Nothing usable was mapped
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether an error-level condition was recorded
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.is_warning())
    }

    /// Objects were mapped but some conditions were recorded as errors
    pub fn is_partial(&self) -> bool {
        !self.is_empty() && self.has_errors()
    }
}
