//! Report destinations
//!
//! A report goes to exactly one of three sinks, chosen when the profiler is
//! configured:
//! - a file path, created or truncated on every report
//! - a named [`Logger`], which emits one `INFO` event per report
//! - a caller-owned [`ReportStream`] such as stdout or an in-memory buffer

use crate::error::{ProfileError, Result};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Target of the `tracing` events emitted by [`Logger`]
pub const REPORT_TARGET: &str = "callprof::report";

/// Named logger handle
///
/// Reports are emitted as `INFO` events with target [`REPORT_TARGET`] and a
/// `logger` field carrying the handle's name, so subscribers can route them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    name: String,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit `message` as a single informational record
    pub fn info(&self, message: &str) {
        tracing::info!(target: REPORT_TARGET, logger = %self.name, "{}", message);
    }
}

/// Writable stream owned by the caller
///
/// The profiler only ever writes to it: no flush, no close. Clones share the
/// same underlying writer.
#[derive(Clone)]
pub struct ReportStream {
    label: String,
    writer: Arc<Mutex<dyn Write + Send>>,
}

impl ReportStream {
    /// Wrap any writer
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            label: "custom".to_string(),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Wrap a writer the caller keeps a handle to, e.g. an in-memory buffer
    pub fn shared<W: Write + Send + 'static>(writer: Arc<Mutex<W>>) -> Self {
        Self {
            label: "shared".to_string(),
            writer,
        }
    }

    pub fn stdout() -> Self {
        Self {
            label: "stdout".to_string(),
            writer: Arc::new(Mutex::new(std::io::stdout())),
        }
    }

    pub fn stderr() -> Self {
        Self {
            label: "stderr".to_string(),
            writer: Arc::new(Mutex::new(std::io::stderr())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn write(&self, report: &str) -> Result<()> {
        // A panic in another writer leaves the stream itself usable
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(report.as_bytes())
            .map_err(ProfileError::Stream)
    }
}

impl fmt::Debug for ReportStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportStream")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Where a formatted report is delivered
#[derive(Debug, Clone)]
pub enum Destination {
    File(PathBuf),
    Logger(Logger),
    Stream(ReportStream),
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Stream(ReportStream::stdout())
    }
}

impl Destination {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Destination::File(path.into())
    }

    pub fn logger(name: impl Into<String>) -> Self {
        Destination::Logger(Logger::new(name))
    }

    pub fn stdout() -> Self {
        Destination::Stream(ReportStream::stdout())
    }

    pub fn stderr() -> Self {
        Destination::Stream(ReportStream::stderr())
    }

    /// Deliver `report` exactly once
    ///
    /// File destinations are opened only here, so a failure between
    /// validation and dispatch (permissions changed, disk full) is reported
    /// as [`ProfileError::Io`].
    pub fn dispatch(&self, report: &str) -> Result<()> {
        tracing::debug!(destination = %self, bytes = report.len(), "dispatching profile report");

        match self {
            Destination::File(path) => write_file(path, report),
            Destination::Logger(logger) => {
                logger.info(report);
                Ok(())
            }
            Destination::Stream(stream) => stream.write(report),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::File(path) => write!(f, "file:{}", path.display()),
            Destination::Logger(logger) => write!(f, "logger:{}", logger.name()),
            Destination::Stream(stream) => write!(f, "stream:{}", stream.label()),
        }
    }
}

impl From<PathBuf> for Destination {
    fn from(path: PathBuf) -> Self {
        Destination::File(path)
    }
}

impl From<&Path> for Destination {
    fn from(path: &Path) -> Self {
        Destination::File(path.to_path_buf())
    }
}

impl From<Logger> for Destination {
    fn from(logger: Logger) -> Self {
        Destination::Logger(logger)
    }
}

impl From<ReportStream> for Destination {
    fn from(stream: ReportStream) -> Self {
        Destination::Stream(stream)
    }
}

fn write_file(path: &Path, report: &str) -> Result<()> {
    let io_error = |source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(io_error)?;
    file.write_all(report.as_bytes()).map_err(io_error)
}

/// Check that a destination can plausibly receive reports
///
/// Loggers and streams are always accepted. For a file path the parent
/// directory must exist, and an existing file must be writable by this
/// process. Nothing is created. The check is advisory: the file is opened
/// again at dispatch time.
pub fn validate_destination(destination: &Destination) -> Result<()> {
    match destination {
        Destination::Logger(_) | Destination::Stream(_) => Ok(()),
        Destination::File(path) => validate_file_path(path),
    }
}

fn validate_file_path(path: &Path) -> Result<()> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| {
                ProfileError::invalid(format!("Cannot resolve relative path {}: {e}", path.display()))
            })?
            .join(path)
    };

    let parent = absolute.parent().ok_or_else(|| {
        ProfileError::invalid(format!("Path has no parent directory: {}", absolute.display()))
    })?;

    if !parent.is_dir() {
        return Err(ProfileError::invalid(format!(
            "Directory for the given path does not exist or is not a directory: {}",
            parent.display()
        )));
    }

    if absolute.is_dir() {
        return Err(ProfileError::invalid(format!(
            "The path {} is a directory, not a file.",
            absolute.display()
        )));
    }

    if absolute.exists() && !is_writable(&absolute) {
        return Err(ProfileError::invalid(format!(
            "The file at {} is not writable.",
            absolute.display()
        )));
    }

    Ok(())
}

/// Ask the OS whether this process may write `path`, without opening it
#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|metadata| !metadata.permissions().readonly())
}
