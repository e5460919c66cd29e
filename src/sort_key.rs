//! Sort keys for ordering report rows
//!
//! The vocabulary follows the classic `pstats` sort criteria. Several
//! criteria accept an alias (`tottime` for `time`, `cumtime` for
//! `cumulative`, ...), both forms are accepted on input.

use crate::error::{ProfileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A statistic the report can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Total number of calls (descending)
    Calls,
    /// Cumulative time including callees (descending)
    Cumulative,
    /// Source file name (ascending)
    Filename,
    /// Line number (ascending)
    Line,
    /// Function name (ascending)
    Name,
    /// Name, then file, then line (ascending)
    Nfl,
    /// Primitive (non-recursive) calls (descending)
    PrimitiveCalls,
    /// Standard `file:line(name)` string (ascending)
    StdName,
    /// Own time excluding callees (descending)
    Time,
}

impl SortKey {
    /// Canonical sort keys, in the order they are listed in messages
    pub const ALL: [SortKey; 9] = [
        SortKey::Calls,
        SortKey::Cumulative,
        SortKey::Filename,
        SortKey::Line,
        SortKey::Name,
        SortKey::Nfl,
        SortKey::PrimitiveCalls,
        SortKey::StdName,
        SortKey::Time,
    ];

    const ALIASES: [(&'static str, SortKey); 5] = [
        ("ncalls", SortKey::Calls),
        ("cumtime", SortKey::Cumulative),
        ("tottime", SortKey::Time),
        ("file", SortKey::Filename),
        ("module", SortKey::Filename),
    ];

    /// Canonical identifier
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Calls => "calls",
            SortKey::Cumulative => "cumulative",
            SortKey::Filename => "filename",
            SortKey::Line => "line",
            SortKey::Name => "name",
            SortKey::Nfl => "nfl",
            SortKey::PrimitiveCalls => "pcalls",
            SortKey::StdName => "stdname",
            SortKey::Time => "time",
        }
    }

    /// Human readable description used in the report header
    pub fn description(self) -> &'static str {
        match self {
            SortKey::Calls => "call count",
            SortKey::Cumulative => "cumulative time",
            SortKey::Filename => "file name",
            SortKey::Line => "line number",
            SortKey::Name => "function name",
            SortKey::Nfl => "name/file/line",
            SortKey::PrimitiveCalls => "primitive call count",
            SortKey::StdName => "standard name",
            SortKey::Time => "internal time",
        }
    }

    /// Every identifier accepted by [`SortKey::from_str`], canonical names first
    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .map(|key| key.as_str())
            .chain(Self::ALIASES.iter().map(|(alias, _)| *alias))
            .collect()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .or_else(|| {
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == s)
                    .map(|(_, key)| *key)
            })
            .ok_or_else(|| {
                ProfileError::invalid(format!(
                    "Invalid sort_by option: {s}. Valid options are: {}.",
                    SortKey::valid_names().join(", ")
                ))
            })
    }
}

/// Sort criteria as supplied by the caller: a single key or a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortBy {
    One(String),
    Many(Vec<String>),
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::One(SortKey::Cumulative.as_str().to_string())
    }
}

impl From<&str> for SortBy {
    fn from(key: &str) -> Self {
        SortBy::One(key.to_string())
    }
}

impl From<String> for SortBy {
    fn from(key: String) -> Self {
        SortBy::One(key)
    }
}

impl From<SortKey> for SortBy {
    fn from(key: SortKey) -> Self {
        SortBy::One(key.as_str().to_string())
    }
}

impl From<Vec<String>> for SortBy {
    fn from(keys: Vec<String>) -> Self {
        SortBy::Many(keys)
    }
}

impl From<Vec<&str>> for SortBy {
    fn from(keys: Vec<&str>) -> Self {
        SortBy::Many(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for SortBy {
    fn from(keys: &[&str]) -> Self {
        SortBy::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SortBy {
    fn from(keys: [&str; N]) -> Self {
        SortBy::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl From<Vec<SortKey>> for SortBy {
    fn from(keys: Vec<SortKey>) -> Self {
        SortBy::Many(keys.iter().map(|k| k.as_str().to_string()).collect())
    }
}

/// Validate and normalize sort criteria
///
/// A single key becomes a one-element sequence. Order is preserved. Fails
/// with [`ProfileError::InvalidConfiguration`] when the sequence is empty or
/// when any key is unknown; the message lists every unknown key followed by
/// the full set of accepted keys.
///
/// # Example
/// ```
/// use callprof::{validate_sort_keys, SortKey};
///
/// let keys = validate_sort_keys(["tottime", "calls"]).unwrap();
/// assert_eq!(keys, vec![SortKey::Time, SortKey::Calls]);
/// assert!(validate_sort_keys("bogus").is_err());
/// ```
pub fn validate_sort_keys(sort_by: impl Into<SortBy>) -> Result<Vec<SortKey>> {
    let raw = match sort_by.into() {
        SortBy::One(key) => vec![key],
        SortBy::Many(keys) => keys,
    };

    if raw.is_empty() {
        return Err(ProfileError::invalid("sort_by cannot be empty."));
    }

    let mut keys = Vec::with_capacity(raw.len());
    let mut invalid: Vec<&str> = Vec::new();
    for name in &raw {
        match name.parse::<SortKey>() {
            Ok(key) => keys.push(key),
            Err(_) => {
                if !invalid.contains(&name.as_str()) {
                    invalid.push(name.as_str());
                }
            }
        }
    }

    if !invalid.is_empty() {
        return Err(ProfileError::invalid(format!(
            "Invalid sort_by options: {}. Valid options are: {}.",
            invalid.join(", "),
            SortKey::valid_names().join(", ")
        )));
    }

    Ok(keys)
}
