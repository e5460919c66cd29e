//! TOML configuration surface
//!
//! ```toml
//! rows = 20
//! sort_by = ["tottime", "calls"]
//! destination = { logger = "perf" }
//! ```
//!
//! `destination` accepts a plain string (a file path) or one of the tables
//! `{ file = "..." }`, `{ logger = "..." }`, `{ stream = "stdout" }`,
//! `{ stream = "stderr" }`. Leaving it out reports to stdout.

use crate::config::{ProfileConfig, DEFAULT_ROWS};
use crate::destination::Destination;
use crate::error::{ProfileError, Result};
use crate::sort_key::SortBy;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DESTINATION_SHAPES: &str = "a file path string, { file = \"...\" }, \
{ logger = \"...\" }, { stream = \"stdout\" | \"stderr\" }, or absent";

/// Unvalidated settings as read from a configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileSettings {
    pub rows: usize,
    pub sort_by: SortBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<toml::Value>,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            sort_by: SortBy::default(),
            destination: None,
        }
    }
}

impl ProfileSettings {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| ProfileError::invalid(format!("Failed to parse profile settings: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate the settings into a [`ProfileConfig`]
    pub fn into_config(self) -> Result<ProfileConfig> {
        let destination = parse_destination(self.destination.as_ref())?;
        ProfileConfig::builder()
            .rows(self.rows)
            .sort_by(self.sort_by)
            .destination(destination)
            .build()
    }
}

fn parse_destination(value: Option<&toml::Value>) -> Result<Destination> {
    let invalid = || {
        ProfileError::invalid(format!(
            "Invalid destination. Must be {DESTINATION_SHAPES}."
        ))
    };

    let value = match value {
        None => return Ok(Destination::default()),
        Some(value) => value,
    };

    if let Some(path) = value.as_str() {
        return Ok(Destination::file(path));
    }

    let table = value.as_table().ok_or_else(invalid)?;
    if table.len() != 1 {
        return Err(invalid());
    }

    match table.iter().next() {
        Some((kind, toml::Value::String(target))) => match (kind.as_str(), target.as_str()) {
            ("file", path) => Ok(Destination::file(path)),
            ("logger", name) => Ok(Destination::logger(name)),
            ("stream", "stdout") => Ok(Destination::stdout()),
            ("stream", "stderr") => Ok(Destination::stderr()),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}
