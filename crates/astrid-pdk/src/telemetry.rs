//! `tracing` integration.
//!
//! Plugins can keep using `tracing::info!` and friends; [`HostLogLayer`]
//! forwards every event to the host log sink at the matching level.
//!
//! ```rust,no_run
//! # fn main() -> Result<(), astrid_pdk::telemetry::TelemetryError> {
//! astrid_pdk::telemetry::setup_logging()?;
//! tracing::info!(items = 3, "processing batch");
//! # Ok(())
//! # }
//! ```

use std::fmt::{self, Write as _};

use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::log::{self, LogLevel};

/// Errors that can occur while installing the host log layer.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("Initialization error: {0}")]
    InitError(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// A [`Layer`] that sends `tracing` events to the host log sink.
///
/// Fields other than `message` are appended as `key=value` pairs. Events
/// below the host's minimum level are skipped before being formatted.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLogLayer;

impl HostLogLayer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S: Subscriber> Layer<S> for HostLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = to_log_level(*event.metadata().level());
        if !log::enabled(level) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let _ = log::write(level, &visitor.finish());
    }
}

/// A subscriber that forwards everything to the host.
#[must_use]
pub fn subscriber() -> impl Subscriber + Send + Sync {
    Registry::default().with(HostLogLayer::new())
}

/// Install [`subscriber`] as the global default.
///
/// # Errors
/// [`TelemetryError::InitError`] if a global subscriber is already set.
pub fn setup_logging() -> Result<(), TelemetryError> {
    tracing::subscriber::set_global_default(subscriber())?;
    Ok(())
}

fn to_log_level(level: Level) -> LogLevel {
    match level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={value:?}", field.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_pdk_sys::sim::{self, Level as HostLevel};

    fn messages() -> Vec<(HostLevel, String)> {
        sim::with_host(|h| {
            h.logs()
                .iter()
                .map(|r| (r.level, r.message.clone()))
                .collect()
        })
    }

    #[test]
    fn events_are_forwarded_with_fields() {
        sim::reset();
        tracing::subscriber::with_default(subscriber(), || {
            tracing::info!("plain");
            tracing::warn!(attempt = 2, url = "https://example", "retrying");
        });
        assert_eq!(
            messages(),
            vec![
                (HostLevel::Info, "plain".to_string()),
                (
                    HostLevel::Warn,
                    "retrying attempt=2 url=\"https://example\"".to_string()
                ),
            ]
        );
    }

    #[test]
    fn host_level_filters_events() {
        sim::reset();
        sim::with_host(|h| h.set_log_level(LogLevel::Error.as_i32()));
        tracing::subscriber::with_default(subscriber(), || {
            tracing::debug!("hidden");
            tracing::error!("shown");
        });
        assert_eq!(messages(), vec![(HostLevel::Error, "shown".to_string())]);
    }
}
