//! Observability for scan sessions
//!
//! - Structured JSON-lines logging with a process-wide minimum severity
//! - Typed lifecycle and per-chunk events
//! - Passive atomic counters
//!
//! # Usage
//!
//! ```ignore
//! use chunkscan::observability::{log_event, Event, Logger, Severity};
//!
//! Logger::set_min_severity(Severity::Trace);
//! log_event(Event::ChunkLoaded, &[("base_rowid", "8192")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, ScanMetrics};
pub use scope::ObservationScope;

/// Log a typed event at its default severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
