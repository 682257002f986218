//! Core domain types shared across the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of therapy data stores the coordinator knows about.
///
/// The variant order here is also the fixed presentation order for combined
/// diagnostic reports: dose first, then carbs, then glucose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Dose,
    Carb,
    Glucose,
}

impl StoreKind {
    /// Fixed presentation order for combined diagnostic reports.
    pub const REPORT_ORDER: [StoreKind; 3] = [StoreKind::Dose, StoreKind::Carb, StoreKind::Glucose];
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Dose => write!(f, "dose"),
            StoreKind::Carb => write!(f, "carb"),
            StoreKind::Glucose => write!(f, "glucose"),
        }
    }
}

/// One point of a generated time series: a timestamp and the running value at
/// that instant. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A recorded reservoir reading, as returned by the dose store after a write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservoirValue {
    /// When the reading was taken.
    pub start_date: DateTime<Utc>,
    /// Remaining insulin in the reservoir, in units.
    pub unit_volume: f64,
}

/// A glucose sample to be written to the glucose store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGlucoseSample {
    pub date: DateTime<Utc>,
    /// Glucose concentration in mg/dL.
    pub quantity_mg_dl: f64,
    /// Deduplication identifier for the backing store.
    pub sync_identifier: Uuid,
}

impl NewGlucoseSample {
    /// Create a sample with a fresh sync identifier.
    pub fn new(date: DateTime<Utc>, quantity_mg_dl: f64) -> Self {
        Self {
            date,
            quantity_mg_dl,
            sync_identifier: Uuid::new_v4(),
        }
    }
}

/// A carbohydrate entry to be written to the carb store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewCarbEntry {
    pub date: DateTime<Utc>,
    /// Carbohydrate quantity in grams.
    pub grams: f64,
}
