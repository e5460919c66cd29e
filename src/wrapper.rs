//! Profiling wrappers for sync and async callables
//!
//! There are two ways in:
//! - [`profile`] / [`profile_async`] wrap a function with the default
//!   configuration (50 rows, sorted by cumulative time, printed to stdout)
//! - [`Profiler`] carries a validated [`ProfileConfig`] and wraps any number
//!   of functions with it
//!
//! Whether a wrapper is sync or async is fixed when it is created. Each call
//! runs under a fresh [`Trace`], so concurrent calls of the same wrapper
//! never see each other's statistics.
//!
//! Per call: start trace, run the function, stop trace, render, dispatch,
//! return the function's value. Dispatch only happens once the function has
//! completed successfully: a panic, a dropped future or an `Err` from one of
//! the `try_*` methods releases the trace without producing a report.

use crate::config::ProfileConfig;
use crate::engine::Trace;
use crate::error::{ProfileError, Result};
use crate::settings::ProfileSettings;
use crate::stats::FunctionKey;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

/// Wrap a synchronous function with the default configuration
///
/// # Example
/// ```
/// fn total(n: u64) -> u64 {
///     (0..n).sum()
/// }
///
/// let profiled = callprof::profile(total);
/// assert_eq!(profiled.call(100).unwrap(), 4950);
/// ```
#[track_caller]
pub fn profile<F>(func: F) -> Profiled<F> {
    Profiled::new(func, Arc::new(ProfileConfig::default()))
}

/// Wrap an asynchronous function with the default configuration
#[track_caller]
pub fn profile_async<F>(func: F) -> ProfiledAsync<F> {
    ProfiledAsync::new(func, Arc::new(ProfileConfig::default()))
}

/// Factory for wrappers sharing one configuration
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    config: Arc<ProfileConfig>,
}

impl Profiler {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build a profiler from file settings, validating them first
    pub fn from_settings(settings: ProfileSettings) -> Result<Self> {
        settings.into_config().map(Self::new)
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    #[track_caller]
    pub fn wrap<F>(&self, func: F) -> Profiled<F> {
        Profiled::new(func, Arc::clone(&self.config))
    }

    #[track_caller]
    pub fn wrap_async<F>(&self, func: F) -> ProfiledAsync<F> {
        ProfiledAsync::new(func, Arc::clone(&self.config))
    }
}

/// A function that can be called with its arguments packed in a tuple
///
/// Implemented for every `Fn` taking up to six parameters, so
/// `callable.call_with((a, b))` calls `callable(a, b)`.
pub trait Callable<Args> {
    type Output;

    fn call_with(&self, args: Args) -> Self::Output;
}

macro_rules! impl_callable {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg),*> Callable<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Ret,
        {
            type Output = Ret;

            #[allow(non_snake_case)]
            fn call_with(&self, ($($arg,)*): ($($arg,)*)) -> Ret {
                self($($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A1);
impl_callable!(A1, A2);
impl_callable!(A1, A2, A3);
impl_callable!(A1, A2, A3, A4);
impl_callable!(A1, A2, A3, A4, A5);
impl_callable!(A1, A2, A3, A4, A5, A6);

/// Last meaningful path segment of a function's type name
///
/// `my_crate::io::load` becomes `load`; a closure defined in `main` becomes
/// `main`.
fn function_name<F>() -> String {
    let full = std::any::type_name::<F>();
    full.rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with("{{"))
        .unwrap_or(full)
        .to_string()
}

#[track_caller]
fn wrap_site<F>() -> FunctionKey {
    let location = Location::caller();
    FunctionKey::new(function_name::<F>(), location.file(), location.line())
}

/// Stop the trace and deliver its report
fn finish(trace: Trace, config: &ProfileConfig) -> Result<()> {
    let stats = trace.stop();
    let report = stats.render(config.rows(), config.sort_keys());
    config.destination().dispatch(&report)
}

/// A synchronous function wrapped for profiling
#[derive(Debug, Clone)]
pub struct Profiled<F> {
    func: F,
    key: FunctionKey,
    config: Arc<ProfileConfig>,
}

impl<F> Profiled<F> {
    #[track_caller]
    fn new(func: F, config: Arc<ProfileConfig>) -> Self {
        Self {
            func,
            key: wrap_site::<F>(),
            config,
        }
    }

    /// Override the name shown for this function in reports
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.key.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    fn profile_call<R>(&self, invoke: impl FnOnce() -> R) -> Result<R> {
        let trace = Trace::start(self.key.clone());
        let value = trace.in_scope(invoke);
        finish(trace, &self.config)?;
        Ok(value)
    }

    fn try_profile_call<T, E>(
        &self,
        invoke: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<ProfileError>,
    {
        let trace = Trace::start(self.key.clone());
        match trace.in_scope(invoke) {
            Ok(value) => {
                finish(trace, &self.config)?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(function = %self.key.name, "call failed, profile report skipped");
                Err(err)
            }
        }
    }

    /// Profile a call of a zero-argument function
    pub fn run<R>(&self) -> Result<R>
    where
        F: Fn() -> R,
    {
        self.profile_call(|| (self.func)())
    }

    /// Profile a call of a one-argument function
    pub fn call<A, R>(&self, args: A) -> Result<R>
    where
        F: Fn(A) -> R,
    {
        self.profile_call(|| (self.func)(args))
    }

    /// Profile a call spreading `args` over the function's parameters
    ///
    /// # Example
    /// ```
    /// fn add(a: u32, b: u32) -> u32 {
    ///     a + b
    /// }
    ///
    /// let profiled = callprof::profile(add);
    /// assert_eq!(profiled.call_with((1, 2)).unwrap(), 3);
    /// ```
    pub fn call_with<Args>(&self, args: Args) -> Result<<F as Callable<Args>>::Output>
    where
        F: Callable<Args>,
    {
        self.profile_call(|| self.func.call_with(args))
    }

    /// Profile a fallible zero-argument function
    ///
    /// The function's error is returned unchanged and no report is written.
    /// A report delivery failure is converted into `E`.
    pub fn try_run<T, E>(&self) -> std::result::Result<T, E>
    where
        F: Fn() -> std::result::Result<T, E>,
        E: From<ProfileError>,
    {
        self.try_profile_call(|| (self.func)())
    }

    /// Profile a fallible function called with `args`
    pub fn try_call<A, T, E>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> std::result::Result<T, E>,
        E: From<ProfileError>,
    {
        self.try_profile_call(|| (self.func)(args))
    }

    /// Profile a fallible function, spreading `args` over its parameters
    pub fn try_call_with<Args, T, E>(&self, args: Args) -> std::result::Result<T, E>
    where
        F: Callable<Args, Output = std::result::Result<T, E>>,
        E: From<ProfileError>,
    {
        self.try_profile_call(|| self.func.call_with(args))
    }
}

/// An asynchronous function wrapped for profiling
///
/// The returned futures suspend exactly where the wrapped future does.
/// Dropping one before completion discards its trace.
#[derive(Debug, Clone)]
pub struct ProfiledAsync<F> {
    func: F,
    key: FunctionKey,
    config: Arc<ProfileConfig>,
}

impl<F> ProfiledAsync<F> {
    #[track_caller]
    fn new(func: F, config: Arc<ProfileConfig>) -> Self {
        Self {
            func,
            key: wrap_site::<F>(),
            config,
        }
    }

    /// Override the name shown for this function in reports
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.key.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    async fn profile_call<Fut>(&self, invoke: impl FnOnce() -> Fut) -> Result<Fut::Output>
    where
        Fut: Future,
    {
        let trace = Trace::start(self.key.clone());
        let future = trace.in_scope(invoke);
        let value = trace.instrument(future).await;
        finish(trace, &self.config)?;
        Ok(value)
    }

    async fn try_profile_call<Fut, T, E>(
        &self,
        invoke: impl FnOnce() -> Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ProfileError>,
    {
        let trace = Trace::start(self.key.clone());
        let future = trace.in_scope(invoke);
        match trace.instrument(future).await {
            Ok(value) => {
                finish(trace, &self.config)?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(function = %self.key.name, "call failed, profile report skipped");
                Err(err)
            }
        }
    }

    /// Profile a call of a zero-argument async function
    pub async fn run<Fut>(&self) -> Result<Fut::Output>
    where
        F: Fn() -> Fut,
        Fut: Future,
    {
        self.profile_call(|| (self.func)()).await
    }

    /// Profile a call of a one-argument async function
    pub async fn call<A, Fut>(&self, args: A) -> Result<Fut::Output>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        self.profile_call(|| (self.func)(args)).await
    }

    /// Profile a call spreading `args` over the function's parameters
    pub async fn call_with<Args, Fut>(&self, args: Args) -> Result<Fut::Output>
    where
        F: Callable<Args, Output = Fut>,
        Fut: Future,
    {
        self.profile_call(|| self.func.call_with(args)).await
    }

    /// Profile a fallible zero-argument async function
    pub async fn try_run<Fut, T, E>(&self) -> std::result::Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ProfileError>,
    {
        self.try_profile_call(|| (self.func)()).await
    }

    /// Profile a fallible async function called with `args`
    pub async fn try_call<A, Fut, T, E>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ProfileError>,
    {
        self.try_profile_call(|| (self.func)(args)).await
    }

    pub async fn try_call_with<Args, Fut, T, E>(&self, args: Args) -> std::result::Result<T, E>
    where
        F: Callable<Args, Output = Fut>,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ProfileError>,
    {
        self.try_profile_call(|| self.func.call_with(args)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::ReportStream;
    use std::sync::Mutex;

    fn buffered() -> (Profiler, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let config = ProfileConfig::builder()
            .destination(ReportStream::shared(buffer.clone()))
            .build()
            .unwrap();
        (Profiler::new(config), buffer)
    }

    fn contents(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
    }

    fn square(x: u64) -> u64 {
        x * x
    }

    #[test]
    fn test_function_name_of_fn_item() {
        let profiled = profile(square);
        assert_eq!(profiled.name(), "square");
    }

    #[test]
    fn test_function_name_of_closure() {
        let profiled = profile(|| 1);
        assert_eq!(profiled.name(), "test_function_name_of_closure");
    }

    #[test]
    fn test_named_override() {
        let profiled = profile(|| 1).named("startup");
        assert_eq!(profiled.name(), "startup");
    }

    #[test]
    fn test_call_reports_to_stream() {
        let (profiler, buffer) = buffered();
        let profiled = profiler.wrap(square);

        assert_eq!(profiled.call(12).unwrap(), 144);
        let report = contents(&buffer);
        assert!(report.contains("function calls"));
        assert!(report.contains("(square)"));
        assert!(report.contains("wrapper.rs"));
    }

    #[test]
    fn test_run_zero_arguments() {
        let (profiler, buffer) = buffered();
        let value = profiler.wrap(|| "done").named("noop").run().unwrap();
        assert_eq!(value, "done");
        assert!(contents(&buffer).contains("(noop)"));
    }

    #[test]
    fn test_try_call_error_skips_report() {
        let (profiler, buffer) = buffered();
        let parse = profiler.wrap(|s: &str| s.parse::<u32>().map_err(anyhow::Error::from));

        assert_eq!(parse.try_call("17").unwrap(), 17);
        let after_success = contents(&buffer);
        assert!(!after_success.is_empty());

        assert!(parse.try_call("seventeen").is_err());
        assert_eq!(contents(&buffer), after_success);
    }

    fn add(a: u32, b: u32) -> u32 {
        a + b
    }

    fn clamp(value: i64, low: i64, high: i64) -> i64 {
        value.max(low).min(high)
    }

    #[test]
    fn test_call_with_spreads_arguments() {
        let (profiler, buffer) = buffered();

        assert_eq!(profiler.wrap(add).call_with((1, 2)).unwrap(), 3);
        assert_eq!(profiler.wrap(clamp).call_with((15, 0, 10)).unwrap(), 10);
        assert_eq!(profiler.wrap(|| 7).call_with(()).unwrap(), 7);

        let text = contents(&buffer);
        assert!(text.contains("(add)"));
        assert!(text.contains("(clamp)"));
    }

    #[test]
    fn test_try_call_with_error_skips_report() {
        let (profiler, buffer) = buffered();
        let divide = profiler.wrap(|a: u32, b: u32| {
            a.checked_div(b).ok_or_else(|| anyhow::anyhow!("division by zero"))
        });

        assert!(divide.try_call_with((1, 0)).is_err());
        assert!(contents(&buffer).is_empty());
        assert_eq!(divide.try_call_with((9, 3)).unwrap(), 3);
        assert!(contents(&buffer).contains("function calls"));
    }

    #[test]
    fn test_reports_are_independent_per_call() {
        let (profiler, buffer) = buffered();
        let profiled = profiler.wrap(square);

        profiled.call(2).unwrap();
        let first = contents(&buffer);
        profiled.call(3).unwrap();
        let both = contents(&buffer);
        let second = &both[first.len()..];

        assert!(second.contains("1 function calls"));
        assert!(!second.contains("2 function calls"));
    }

    #[test]
    fn test_profiler_clone_shares_config() {
        let (profiler, _) = buffered();
        let clone = profiler.clone();
        assert!(Arc::ptr_eq(&profiler.config, &clone.config));
    }
}
