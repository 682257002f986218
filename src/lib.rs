//! Fan-in coordination for asynchronous therapy data stores.
//!
//! This crate coordinates independent asynchronous operations against three
//! backing stores - an insulin dose/reservoir log, a carbohydrate log, and a
//! glucose log - and joins them into single results delivered exactly once on
//! a serial delivery context:
//!
//! - [`JoinEpisode`] is the fan-in primitive: register each operation before
//!   dispatching it, complete it when its result arrives, and the armed
//!   continuation fires once the pending count drains to zero.
//! - [`ReportAggregator`] collects per-store diagnostic text into one ordered
//!   report, tolerating stores that are not configured.
//! - [`backfill_series`](series::backfill_series) generates a synthetic,
//!   backward-looking reservoir history whose writes all join into one
//!   completion message.
//! - [`DataManager`] ties the stores to these primitives and exposes the two
//!   aggregated operations.

pub mod delivery;
pub mod domain;
pub mod error;
pub mod join;
pub mod manager;
pub mod report;
pub mod series;
pub mod store;

// Re-export commonly used types
pub use delivery::DeliveryHandle;
pub use domain::{NewCarbEntry, NewGlucoseSample, ReservoirValue, SeriesPoint, StoreKind};
pub use error::{GlucologError, Result};
pub use join::{JoinEpisode, JoinOutcome};
pub use manager::{DataManager, SampleDataConfig, run_diagnostic_command, run_generate_command};
pub use report::ReportAggregator;
pub use store::{
    CarbStore, DoseStore, GlucoseStore, InMemoryCarbStore, InMemoryDoseStore, InMemoryGlucoseStore,
};
