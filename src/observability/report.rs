//! Reporting of adapter events.
//!
//! # Responsibilities
//! - Name every event the adapter reports (lifespan, unknown input, failures)
//! - Route them to `tracing` by default
//!
//! # Design Decisions
//! - The reporter is passed to the `Dispatcher` explicitly instead of being
//!   looked up globally, so each dispatcher can report somewhere else

use std::fmt;

use crate::exchange::ExchangeId;

/// Severity of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LifespanStartup,
    LifespanShutdown,
    UnknownLifespanMessage(String),
    UnknownScope(String),
    /// An error was caught and converted at a driver boundary.
    ExchangeFailed {
        id: ExchangeId,
        phase: &'static str,
        /// `"<Kind> in <phase>: <message>"`.
        message: String,
    },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::LifespanStartup | Event::LifespanShutdown => Level::Info,
            Event::UnknownLifespanMessage(_) | Event::UnknownScope(_) => Level::Warn,
            Event::ExchangeFailed { .. } => Level::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::LifespanStartup => f.write_str("starting up"),
            Event::LifespanShutdown => f.write_str("shutting down"),
            Event::UnknownLifespanMessage(kind) => write!(f, "unknown lifespan message {kind}"),
            Event::UnknownScope(kind) => write!(f, "unknown connection kind {kind}"),
            Event::ExchangeFailed { message, .. } => f.write_str(message),
        }
    }
}

/// Sink for adapter events.
pub trait Reporter: Send + Sync + 'static {
    fn report(&self, event: &Event);
}

/// Default reporter: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::ExchangeFailed { id, phase, message } => {
                tracing::error!(exchange_id = %id, phase, "{message}");
            }
            other => match other.level() {
                Level::Info => tracing::info!("{other}"),
                Level::Warn => tracing::warn!("{other}"),
                Level::Error => tracing::error!("{other}"),
            },
        }
    }
}
