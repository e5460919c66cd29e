//! Per-function statistics and report formatting
//!
//! A [`Stats`] value is produced when a trace stops. It holds one
//! [`FunctionStats`] entry per instrumented callee plus the entry for the
//! profiled function itself, and renders a `pstats`-style table ordered by
//! any sequence of [`SortKey`]s.

use crate::sort_key::SortKey;
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Identity of a profiled function: where it is defined and what it is called
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub name: String,
    pub file: String,
    pub line: u32,
}

impl FunctionKey {
    pub fn new(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line,
        }
    }

    /// `file:line(name)`, the form used in the report's last column
    pub fn std_name(&self) -> String {
        format!("{}:{}({})", self.file, self.line, self.name)
    }
}

/// Statistics for a single function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionStats {
    pub key: FunctionKey,
    /// Number of times the function was entered
    pub calls: u64,
    /// Calls that were not recursive
    pub primitive_calls: u64,
    /// Time spent in the function itself, excluding callees
    pub total_time: Duration,
    /// Time spent in the function including callees
    pub cumulative_time: Duration,
}

impl FunctionStats {
    pub fn new(key: FunctionKey) -> Self {
        Self {
            key,
            calls: 0,
            primitive_calls: 0,
            total_time: Duration::ZERO,
            cumulative_time: Duration::ZERO,
        }
    }

    /// Own time per call, in seconds
    pub fn total_per_call(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.total_time.as_secs_f64() / self.calls as f64
    }

    /// Cumulative time per primitive call, in seconds
    pub fn cumulative_per_call(&self) -> f64 {
        if self.primitive_calls == 0 {
            return 0.0;
        }
        self.cumulative_time.as_secs_f64() / self.primitive_calls as f64
    }

    fn compare(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::Calls => other.calls.cmp(&self.calls),
            SortKey::PrimitiveCalls => other.primitive_calls.cmp(&self.primitive_calls),
            SortKey::Cumulative => other.cumulative_time.cmp(&self.cumulative_time),
            SortKey::Time => other.total_time.cmp(&self.total_time),
            SortKey::Filename => self.key.file.cmp(&other.key.file),
            SortKey::Line => self.key.line.cmp(&other.key.line),
            SortKey::Name => self.key.name.cmp(&other.key.name),
            SortKey::Nfl => self
                .key
                .name
                .cmp(&other.key.name)
                .then_with(|| self.key.file.cmp(&other.key.file))
                .then_with(|| self.key.line.cmp(&other.key.line)),
            SortKey::StdName => self.key.std_name().cmp(&other.key.std_name()),
        }
    }
}

/// Statistics collected for one profiled invocation
#[derive(Debug, Clone, Default)]
pub struct Stats {
    functions: Vec<FunctionStats>,
    total_time: Duration,
}

impl Stats {
    pub fn new(functions: Vec<FunctionStats>, total_time: Duration) -> Self {
        Self {
            functions,
            total_time,
        }
    }

    pub fn functions(&self) -> &[FunctionStats] {
        &self.functions
    }

    /// Look up the first entry with the given function name
    pub fn get(&self, name: &str) -> Option<&FunctionStats> {
        self.functions.iter().find(|f| f.key.name == name)
    }

    pub fn total_calls(&self) -> u64 {
        self.functions.iter().map(|f| f.calls).sum()
    }

    pub fn primitive_calls(&self) -> u64 {
        self.functions.iter().map(|f| f.primitive_calls).sum()
    }

    /// Wall time of the profiled invocation
    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// Order entries by each key in turn; later keys only break ties
    pub fn sort(&mut self, keys: &[SortKey]) {
        self.functions.sort_by(|a, b| {
            keys.iter()
                .fold(Ordering::Equal, |ord, key| ord.then_with(|| a.compare(b, *key)))
        });
    }

    /// Format the top `rows` entries ordered by `keys`
    pub fn render(&self, rows: usize, keys: &[SortKey]) -> String {
        let mut sorted = self.clone();
        sorted.sort(keys);
        Report {
            stats: &sorted,
            rows,
            keys,
        }
        .to_string()
    }
}

/// Formatted view over sorted statistics
struct Report<'a> {
    stats: &'a Stats,
    rows: usize,
    keys: &'a [SortKey],
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_calls = self.stats.total_calls();
        let primitive_calls = self.stats.primitive_calls();

        write!(f, "{:>9} function calls", total_calls)?;
        if primitive_calls != total_calls {
            write!(f, " ({} primitive calls)", primitive_calls)?;
        }
        writeln!(
            f,
            " in {:.3} seconds",
            self.stats.total_time().as_secs_f64()
        )?;
        writeln!(f)?;

        let ordered_by: Vec<_> = self.keys.iter().map(|k| k.description()).collect();
        writeln!(f, "   Ordered by: {}", ordered_by.join(", "))?;

        let available = self.stats.functions().len();
        let shown = available.min(self.rows);
        if shown < available {
            writeln!(
                f,
                "   List reduced from {} to {} due to restriction <{}>",
                available, shown, self.rows
            )?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{:>9} {:>8} {:>8} {:>8} {:>8} filename:lineno(function)",
            "ncalls", "tottime", "percall", "cumtime", "percall"
        )?;

        for stats in self.stats.functions().iter().take(shown) {
            let ncalls = if stats.calls == stats.primitive_calls {
                stats.calls.to_string()
            } else {
                format!("{}/{}", stats.calls, stats.primitive_calls)
            };
            writeln!(
                f,
                "{:>9} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {}",
                ncalls,
                stats.total_time.as_secs_f64(),
                stats.total_per_call(),
                stats.cumulative_time.as_secs_f64(),
                stats.cumulative_per_call(),
                stats.key.std_name()
            )?;
        }

        writeln!(f)
    }
}
