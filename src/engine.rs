//! Span-based call statistics
//!
//! A [`Trace`] owns a private `tracing` dispatcher for the duration of one
//! profiled invocation. Every span created while the dispatcher is active
//! counts as one call of the function it instruments (for example a function
//! annotated with `#[tracing::instrument]`); time accrues between span enter
//! and exit, so an async callee only accrues time while it is being polled.
//!
//! Because each trace has its own dispatcher and collector, concurrent
//! invocations never share statistics. Events emitted inside a trace are
//! forwarded to whichever dispatcher was current when the trace started.
//! Spans are not forwarded, so an event whose explicit `parent:` is one of the
//! trace's own spans has no meaning to that dispatcher and is dropped.

use crate::stats::{FunctionKey, FunctionStats, Stats};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tracing::callsite::Identifier;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::span::{Attributes, Id};
use tracing::{Dispatch, Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

/// An entered span on one thread's stack
#[derive(Debug)]
struct Frame {
    callsite: Identifier,
    span: Id,
    entered: Instant,
    child_time: Duration,
}

#[derive(Debug, Default)]
struct Collector {
    functions: HashMap<Identifier, FunctionStats>,
    stacks: HashMap<ThreadId, Vec<Frame>>,
    /// Time spent in spans entered directly by the profiled function
    top_level_time: Duration,
}

impl Collector {
    fn entry(&mut self, metadata: &'static Metadata<'static>) -> &mut FunctionStats {
        self.functions
            .entry(metadata.callsite())
            .or_insert_with(|| FunctionStats::new(function_key(metadata)))
    }

    fn record_call(&mut self, metadata: &'static Metadata<'static>, recursive: bool) {
        let entry = self.entry(metadata);
        entry.calls += 1;
        if !recursive {
            entry.primitive_calls += 1;
        }
    }

    fn enter(&mut self, metadata: &'static Metadata<'static>, span: Id) {
        let thread = std::thread::current().id();
        self.stacks.entry(thread).or_default().push(Frame {
            callsite: metadata.callsite(),
            span,
            entered: Instant::now(),
            child_time: Duration::ZERO,
        });
    }

    fn exit(&mut self, metadata: &'static Metadata<'static>, span: &Id) {
        let thread = std::thread::current().id();
        let Some(stack) = self.stacks.get_mut(&thread) else {
            return;
        };
        let Some(position) = stack.iter().rposition(|frame| &frame.span == span) else {
            return;
        };

        let frame = stack.remove(position);
        let elapsed = frame.entered.elapsed();
        let still_active = stack.iter().any(|f| f.callsite == frame.callsite);

        match stack.last_mut() {
            Some(parent) => parent.child_time += elapsed,
            None => self.top_level_time += elapsed,
        }

        let entry = self.entry(metadata);
        entry.total_time += elapsed.saturating_sub(frame.child_time);
        // Recursive frames are already covered by the outermost one
        if !still_active {
            entry.cumulative_time += elapsed;
        }
    }
}

fn function_key(metadata: &Metadata<'_>) -> FunctionKey {
    FunctionKey::new(
        metadata.name(),
        metadata.file().unwrap_or("~"),
        metadata.line().unwrap_or(0),
    )
}

fn lock(collector: &Mutex<Collector>) -> std::sync::MutexGuard<'_, Collector> {
    collector.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Layer that turns span lifecycles into per-function statistics
struct CallStatsLayer {
    collector: Arc<Mutex<Collector>>,
}

impl<S> Layer<S> for CallStatsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let metadata = attrs.metadata();
        let callsite = metadata.callsite();
        let recursive = ctx.span(id).is_some_and(|span| {
            span.scope()
                .skip(1)
                .any(|ancestor| ancestor.metadata().callsite() == callsite)
        });

        lock(&self.collector).record_call(metadata, recursive);
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            lock(&self.collector).enter(span.metadata(), id.clone());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            lock(&self.collector).exit(span.metadata(), id);
        }
    }
}

/// Layer that hands events to the dispatcher the trace replaced
struct ForwardEvents {
    outer: Dispatch,
}

impl<S> Layer<S> for ForwardEvents
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if event.parent().is_some_and(|parent| ctx.span(parent).is_some()) {
            return;
        }
        if self.outer.enabled(event.metadata()) {
            self.outer.event(event);
        }
    }
}

/// Live profiling state for a single invocation
///
/// Dropping a trace without calling [`Trace::stop`] discards everything it
/// recorded.
pub struct Trace {
    root: FunctionKey,
    started: Instant,
    collector: Arc<Mutex<Collector>>,
    dispatch: Dispatch,
}

impl Trace {
    /// Start recording on behalf of the function identified by `root`
    pub fn start(root: FunctionKey) -> Self {
        let outer = tracing::dispatcher::get_default(Dispatch::clone);
        let collector = Arc::new(Mutex::new(Collector::default()));
        let subscriber = Registry::default()
            .with(CallStatsLayer {
                collector: Arc::clone(&collector),
            })
            .with(ForwardEvents { outer });

        tracing::debug!(function = %root.name, "profiling trace started");

        Self {
            root,
            started: Instant::now(),
            collector,
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// Run `f` with this trace as the current dispatcher
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this trace the current dispatcher every time `future` is polled
    pub fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }

    /// Stop recording and return the accumulated statistics
    ///
    /// The profiled function itself appears as one call whose cumulative
    /// time is the wall time since [`Trace::start`].
    pub fn stop(self) -> Stats {
        let elapsed = self.started.elapsed();
        let collector = std::mem::take(&mut *lock(&self.collector));

        let mut root = FunctionStats::new(self.root);
        root.calls = 1;
        root.primitive_calls = 1;
        root.total_time = elapsed.saturating_sub(collector.top_level_time);
        root.cumulative_time = elapsed;

        let mut functions = Vec::with_capacity(collector.functions.len() + 1);
        functions.push(root);
        functions.extend(collector.functions.into_values());

        tracing::debug!(
            function = %functions[0].key.name,
            callees = functions.len() - 1,
            elapsed_us = elapsed.as_micros() as u64,
            "profiling trace stopped"
        );

        Stats::new(functions, elapsed)
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("root", &self.root)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> FunctionKey {
        FunctionKey::new("root", "src/engine.rs", 1)
    }

    #[tracing::instrument]
    fn leaf() -> u64 {
        std::thread::sleep(Duration::from_millis(2));
        1
    }

    #[tracing::instrument]
    fn branch() -> u64 {
        leaf() + leaf()
    }

    #[tracing::instrument]
    fn countdown(n: u32) -> u32 {
        if n == 0 {
            0
        } else {
            countdown(n - 1) + 1
        }
    }

    #[test]
    fn test_counts_calls_per_callee() {
        let trace = Trace::start(root());
        let value = trace.in_scope(|| branch() + leaf());
        let stats = trace.stop();

        assert_eq!(value, 3);
        assert_eq!(stats.get("branch").unwrap().calls, 1);
        assert_eq!(stats.get("leaf").unwrap().calls, 3);
        assert_eq!(stats.get("root").unwrap().calls, 1);
        assert_eq!(stats.total_calls(), 5);
    }

    #[test]
    fn test_own_time_excludes_children() {
        let trace = Trace::start(root());
        trace.in_scope(branch);
        let stats = trace.stop();

        let branch = stats.get("branch").unwrap();
        let leaf = stats.get("leaf").unwrap();
        assert!(branch.cumulative_time >= Duration::from_millis(4));
        assert!(branch.total_time < branch.cumulative_time);
        assert!(leaf.cumulative_time >= Duration::from_millis(4));

        let root = stats.get("root").unwrap();
        assert!(root.cumulative_time >= branch.cumulative_time);
    }

    #[test]
    fn test_recursion_counts_primitive_calls_once() {
        let trace = Trace::start(root());
        let value = trace.in_scope(|| countdown(4));
        let stats = trace.stop();

        assert_eq!(value, 4);
        let entry = stats.get("countdown").unwrap();
        assert_eq!(entry.calls, 5);
        assert_eq!(entry.primitive_calls, 1);
        assert!(entry.cumulative_time <= stats.get("root").unwrap().cumulative_time);
    }

    #[test]
    fn test_spans_outside_scope_are_not_recorded() {
        let trace = Trace::start(root());
        leaf();
        let stats = trace.stop();

        assert!(stats.get("leaf").is_none());
        assert_eq!(stats.functions().len(), 1);
    }

    #[derive(Clone, Default)]
    struct Targets(Arc<Mutex<Vec<&'static str>>>);

    impl<S: Subscriber> Layer<S> for Targets {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(event.metadata().target());
        }
    }

    #[test]
    fn test_events_parented_to_trace_spans_are_not_forwarded() {
        let targets = Targets::default();
        let outer = Dispatch::new(Registry::default().with(targets.clone()));

        tracing::dispatcher::with_default(&outer, || {
            let trace = Trace::start(root());
            trace.in_scope(|| {
                let step = tracing::info_span!("step");
                tracing::info!(target: "contextual", "inside");
                tracing::info!(target: "explicit_root", parent: None, "detached");
                tracing::info!(target: "trace_child", parent: &step, "scoped");
            });
            trace.stop();
        });

        assert_eq!(*targets.0.lock().unwrap(), vec!["contextual", "explicit_root"]);
    }

    #[test]
    fn test_traces_are_independent() {
        let first = Trace::start(root());
        first.in_scope(branch);
        let first = first.stop();

        let second = Trace::start(root());
        second.in_scope(leaf);
        let second = second.stop();

        assert_eq!(first.get("leaf").unwrap().calls, 2);
        assert_eq!(second.get("leaf").unwrap().calls, 1);
        assert!(second.get("branch").is_none());
    }

    #[test]
    fn test_function_key_from_metadata() {
        let trace = Trace::start(root());
        trace.in_scope(leaf);
        let stats = trace.stop();

        let key = &stats.get("leaf").unwrap().key;
        assert!(key.file.ends_with("engine.rs"));
        assert!(key.line > 0);
    }
}
