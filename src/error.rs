//! Error types for profiling configuration and report dispatch
//!
//! Configuration errors surface when a [`crate::ProfileConfig`] is built,
//! before any wrapped function runs. I/O errors surface from the call that
//! produced the report.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while configuring a profiler or delivering its report
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Error writing to file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing profile report to stream: {0}")]
    Stream(#[source] std::io::Error),
}

impl ProfileError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ProfileError::InvalidConfiguration(message.into())
    }

    /// True for errors raised while validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProfileError::InvalidConfiguration(_))
    }
}

/// Result type for profiling operations
pub type Result<T> = std::result::Result<T, ProfileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = ProfileError::Io {
            path: PathBuf::from("/tmp/report.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let message = err.to_string();
        assert!(message.contains("/tmp/report.txt"));
        assert!(message.contains("denied"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_invalid_configuration() {
        let err = ProfileError::invalid("rows must be positive");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: rows must be positive"
        );
    }
}
