//! Key paths over loosely typed representations
//!
//! A key path is a dotted sequence of keys such as `address.city`. An empty
//! key path denotes the whole representation. Reading a non-numeric key from
//! an array collects that key from every element, so `users.id` over an array
//! of users yields the array of their ids. Numeric segments index arrays.
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// A parsed key path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The key path denoting the whole representation
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted key path. A leading `$.` is tolerated.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        let trimmed = trimmed.strip_prefix("$.").unwrap_or(trimmed);
        if trimmed.is_empty() || trimmed == "$" {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('.') {
            if segment.is_empty() {
                return Err(Error::KeyPath {
                    path: path.to_string(),
                    message: "empty segment".to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Parse an optional key path, treating `None` as the root
    pub fn parse_optional(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::parse(p),
            None => Ok(Self::root()),
        }
    }

    /// Whether this key path denotes the whole representation
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The individual keys
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last key, if any
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Everything but the last key
    pub fn parent(&self) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Append another key path
    pub fn join(&self, other: &KeyPath) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Read the value at this key path
    ///
    /// Returns `None` if any segment is missing. Reading through an array with
    /// a non-numeric key yields an owned array, so the result is a `Value`.
    pub fn get(&self, data: &Value) -> Option<Value> {
        read_segments(data, &self.segments)
    }

    /// Borrow the value at this key path without array fan-out
    pub fn get_ref<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        let mut current = data;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write a value at this key path, creating intermediate objects
    pub fn set(&self, data: &mut Value, value: Value) -> Result<()> {
        if self.is_root() {
            *data = value;
            return Ok(());
        }

        let last = self.segments.len() - 1;
        let mut current = data;
        for (i, segment) in self.segments.iter().enumerate() {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            let map = match current {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::KeyPath {
                        path: self.to_string(),
                        message: format!("parent of segment '{}' is not an object", segment),
                    })
                }
            };
            if i == last {
                map.insert(segment.clone(), value);
                return Ok(());
            }
            current = map.entry(segment.clone()).or_insert(Value::Object(Map::new()));
        }

        Ok(())
    }
}

fn read_segments(data: &Value, segments: &[String]) -> Option<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(data.clone());
    };

    match data {
        Value::Object(map) => read_segments(map.get(segment)?, rest),
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                return read_segments(items.get(index)?, rest);
            }
            let collected: Vec<Value> = items
                .iter()
                .filter_map(|item| read_segments(item, segments))
                .collect();
            // no element holds the key: the path is absent, not an empty list
            (!collected.is_empty()).then_some(Value::Array(collected))
        }
        _ => None,
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl std::str::FromStr for KeyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Read the value at an optional key path, tolerating malformed paths
pub fn value_at(data: &Value, path: Option<&str>) -> Option<Value> {
    KeyPath::parse_optional(path).ok()?.get(data)
}

/// Write a value at a key path
pub fn set_value_at(data: &mut Value, path: &str, value: Value) -> Result<()> {
    KeyPath::parse(path)?.set(data, value)
}

/// Join two optional key path strings into one
pub fn join_paths(parent: Option<&str>, child: Option<&str>) -> Option<String> {
    match (parent.filter(|p| !p.is_empty()), child.filter(|c| !c.is_empty())) {
        (Some(p), Some(c)) => Some(format!("{}.{}", p, c)),
        (Some(p), None) => Some(p.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    }
}
