//! Core analysis passes over crawler telemetry: event coalescing, client
//! classification, per-group aggregation, and the multi-day progression.

pub mod aggregate;
pub mod client;
pub mod events;
pub mod progression;

pub use aggregate::{aggregate, distinct_values, AggregateMode};
pub use client::{classify, Classification, ClientFamily};
pub use events::{coalesce_events, SessionSummary, TimeBounds, DEBOUNCE_WINDOW_MILLIS};
pub use progression::{scan_progression, DistributionRow, ProgressionReport};
