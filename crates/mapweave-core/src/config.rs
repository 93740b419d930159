//! Mapping configuration
//!
//! Everything the engine would otherwise read from process-wide defaults
//! (date formats, the timezone for naive timestamps, policy switches) lives in
//! [`MappingConfig`], which is handed explicitly to the mapper, mapping
//! operations and the serializer. Configuration can be loaded from:
//! - Default values
//! - Configuration files (YAML/JSON)
//! - Environment variables (via [`MappingConfig::merge_with_env`])
//!
//! Copyright (c) 2025 Mapweave Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding [`MappingConfig::default_timezone`]
pub const TIMEZONE_ENV: &str = "MAPWEAVE_TIMEZONE";

/// Environment variable overriding [`MappingConfig::date_formats`] (`;` separated)
pub const DATE_FORMATS_ENV: &str = "MAPWEAVE_DATE_FORMATS";

/// Configuration shared by every operation of a mapping pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// strftime formats tried, in order, when coercing strings to dates.
    /// RFC 3339 is always tried first.
    pub date_formats: Vec<String>,

    /// strftime format used when serializing dates. `None` means RFC 3339.
    pub output_date_format: Option<String>,

    /// Timezone applied to timestamps that carry no offset ("UTC" or "+HH:MM")
    pub default_timezone: String,

    /// Skip writes whose new value equals the current value
    pub skip_unchanged_values: bool,

    /// Emit a warning event for representations that mapped nothing
    pub log_unmappable: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            date_formats: vec![
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%d".to_string(),
                "%m/%d/%Y".to_string(),
            ],
            output_date_format: None,
            default_timezone: "UTC".to_string(),
            skip_unchanged_values: true,
            log_unmappable: true,
        }
    }
}

impl MappingConfig {
    /// Parse configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(Error::configuration(format!(
                "Unsupported configuration file extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Apply environment overrides
    pub fn merge_with_env(&mut self) -> Result<()> {
        if let Ok(tz) = std::env::var(TIMEZONE_ENV) {
            self.default_timezone = tz;
        }

        if let Ok(formats) = std::env::var(DATE_FORMATS_ENV) {
            let formats: Vec<String> = formats
                .split(';')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            if !formats.is_empty() {
                self.date_formats = formats;
            }
        }

        self.validate()
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        self.timezone_offset()?;
        if self.date_formats.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::configuration("Date formats must not be empty strings"));
        }
        Ok(())
    }

    /// The configured default timezone as a fixed offset
    pub fn timezone_offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.default_timezone).ok_or_else(|| {
            Error::configuration(format!(
                "Invalid default timezone '{}', expected 'UTC' or '+HH:MM'",
                self.default_timezone
            ))
        })
    }
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("utc") || tz.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match tz.chars().next()? {
        '+' => (1, &tz[1..]),
        '-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() == 4 => (rest[..2].parse::<i32>().ok()?, rest[2..].parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
