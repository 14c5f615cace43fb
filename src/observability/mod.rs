//! Observability subsystem for aeroexec
//!
//! - Structured logging (JSON lines)
//! - Lock-free execution counters
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing logged or counted here influences
//! scheduling, validation or commit.
//!
//! ```ignore
//! use aeroexec::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::TxnValidated, &[("txn_index", "4")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{ExecutionMetrics, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = event.severity();
    if severity >= Severity::Error {
        Logger::log_stderr(severity, event.as_str(), fields);
    } else {
        Logger::log(severity, event.as_str(), fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::EngineReset);
        log_event(Event::TxnExecute);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::FlushComplete, &[("keys", "7")]);
    }
}
