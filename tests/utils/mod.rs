// Integration test utilities
//
// Event capture for logger destinations and in-memory report streams

#![allow(dead_code)]

use callprof::{Destination, ProfileConfig, Profiler, ReportStream};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// One event seen by [`CaptureLayer`]
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub logger: Option<String>,
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    logger: Option<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "logger" => self.logger = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "logger" => self.logger = Some(format!("{:?}", value)),
            _ => {}
        }
    }
}

/// Layer that records every event it sees
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events emitted through a `callprof::Logger`
    pub fn reports(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.target == callprof::REPORT_TARGET)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            logger: visitor.logger,
        });
    }
}

/// Subscriber that feeds a [`CaptureLayer`]
pub fn capture_subscriber() -> (impl Subscriber + Send + Sync + 'static, CaptureLayer) {
    let layer = CaptureLayer::default();
    (Registry::default().with(layer.clone()), layer)
}

/// In-memory report stream and a profiler writing to it
pub fn buffered_profiler(rows: usize, sort_by: &[&str]) -> (Profiler, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let config = ProfileConfig::builder()
        .rows(rows)
        .sort_by(sort_by)
        .destination(Destination::from(ReportStream::shared(buffer.clone())))
        .build()
        .unwrap();
    (Profiler::new(config), buffer)
}

pub fn buffer_text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
}

/// Number of reports written to a buffer
pub fn report_count(text: &str) -> usize {
    text.matches("function calls").count()
}
