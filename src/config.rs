//! Validated profiler configuration
//!
//! A [`ProfileConfig`] can only be obtained through validation, so holding
//! one means the sort keys are known and the destination was reachable at
//! configuration time.

use crate::destination::{validate_destination, Destination};
use crate::error::{ProfileError, Result};
use crate::sort_key::{validate_sort_keys, SortBy, SortKey};

/// Default number of report rows
pub const DEFAULT_ROWS: usize = 50;

/// Immutable profiler configuration
///
/// # Example
/// ```
/// use callprof::{Destination, ProfileConfig, SortKey};
///
/// let config = ProfileConfig::builder()
///     .rows(10)
///     .sort_by(["tottime", "calls"])
///     .destination(Destination::stderr())
///     .build()
///     .unwrap();
/// assert_eq!(config.rows(), 10);
/// assert_eq!(config.sort_keys(), &[SortKey::Time, SortKey::Calls]);
/// ```
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    rows: usize,
    sort_keys: Vec<SortKey>,
    destination: Destination,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            sort_keys: vec![SortKey::Cumulative],
            destination: Destination::default(),
        }
    }
}

impl ProfileConfig {
    pub fn builder() -> ProfileConfigBuilder {
        ProfileConfigBuilder::default()
    }

    /// Maximum number of functions listed in a report
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }
}

/// Builder for [`ProfileConfig`]; unset fields take their defaults
#[derive(Debug, Clone, Default)]
pub struct ProfileConfigBuilder {
    rows: Option<usize>,
    sort_by: Option<SortBy>,
    destination: Option<Destination>,
}

impl ProfileConfigBuilder {
    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn sort_by(mut self, sort_by: impl Into<SortBy>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<Destination>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Validate every field and produce the configuration
    pub fn build(self) -> Result<ProfileConfig> {
        let rows = self.rows.unwrap_or(DEFAULT_ROWS);
        if rows == 0 {
            return Err(ProfileError::invalid("rows must be greater than zero."));
        }

        let destination = self.destination.unwrap_or_default();
        validate_destination(&destination)?;

        let sort_keys = validate_sort_keys(self.sort_by.unwrap_or_default())?;

        Ok(ProfileConfig {
            rows,
            sort_keys,
            destination,
        })
    }
}
