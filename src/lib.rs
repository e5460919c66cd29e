//! callprof - Function-level execution profiler
//!
//! Wraps a synchronous or asynchronous function, records call counts and
//! timings for every instrumented function it invokes, and delivers a
//! sorted, row-limited report to a file, a logger or a stream after each
//! completed call.
//!
//! Callees are instrumented with `tracing` spans, typically through
//! `#[tracing::instrument]`:
//!
//! ```
//! use callprof::{Destination, ProfileConfig, Profiler};
//!
//! #[tracing::instrument]
//! fn parse(line: &str) -> usize {
//!     line.split_whitespace().count()
//! }
//!
//! fn count_words(text: &str) -> usize {
//!     text.lines().map(parse).sum()
//! }
//!
//! let config = ProfileConfig::builder()
//!     .rows(20)
//!     .sort_by(["tottime", "calls"])
//!     .destination(Destination::stderr())
//!     .build()
//!     .unwrap();
//!
//! let count_words = Profiler::new(config).wrap(count_words);
//! assert_eq!(count_words.call("a b\nc").unwrap(), 3);
//! ```

pub mod config;
pub mod destination;
pub mod engine;
pub mod error;
pub mod settings;
pub mod sort_key;
pub mod stats;
pub mod wrapper;

pub use config::{ProfileConfig, ProfileConfigBuilder, DEFAULT_ROWS};
pub use destination::{validate_destination, Destination, Logger, ReportStream, REPORT_TARGET};
pub use engine::Trace;
pub use error::{ProfileError, Result};
pub use settings::ProfileSettings;
pub use sort_key::{validate_sort_keys, SortBy, SortKey};
pub use stats::{FunctionKey, FunctionStats, Stats};
pub use wrapper::{profile, profile_async, Callable, Profiled, ProfiledAsync, Profiler};
