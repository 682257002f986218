//! Error types for store operations.

use thiserror::Error;

use crate::domain::StoreKind;

/// Result type alias using the glucolog error type.
pub type Result<T> = std::result::Result<T, GlucologError>;

/// Main error type for store operations.
///
/// These are environmental failures reported by a backing store. They are
/// collected into the join outcome and never abort sibling operations.
/// Coordination bugs (completing an episode more times than it was registered)
/// are not represented here; those panic.
#[derive(Error, Debug)]
pub enum GlucologError {
    /// A store refused to persist a sample or reading.
    #[error("sample rejected by {kind} store: {reason}")]
    SampleRejected { kind: StoreKind, reason: String },

    /// The store exists but cannot be reached right now.
    #[error("{0} store is unavailable")]
    StoreUnavailable(StoreKind),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
