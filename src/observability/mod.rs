//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and drivers produce:
//!     → report.rs (adapter events through an explicit Reporter)
//!     → metrics.rs (exchange counters, active gauge)
//!     → tracing macros everywhere (state transitions, debug detail)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, filtered)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The library never installs a global subscriber; only the binary does
//! - Reporting is an injected trait object so embedders and tests can
//!   capture events without touching global state
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
pub mod report;

pub use report::{Event, Level, Reporter, TracingReporter};
