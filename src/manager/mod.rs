//! Data manager tying the stores to the coordination primitives.
//!
//! [`DataManager`] owns one store per kind (the carb store is optional; a
//! deployment without carbohydrate logging is a supported configuration) and
//! exposes the two aggregated operations: a combined diagnostic report and
//! synthetic sample-data generation. Both fan out asynchronous operations
//! against the stores, join them through one episode, and deliver a single
//! result on the caller's delivery queue.
//!
//! The free functions at the bottom are the command layer: they take a weak
//! manager reference so a deferred command whose owner has been torn down
//! degrades to a no-op instead of dereferencing a dead handle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryHandle;
use crate::domain::{NewGlucoseSample, StoreKind};
use crate::join::JoinEpisode;
use crate::report::ReportAggregator;
use crate::series::{backfill_series, uniform_delta};
use crate::store::{CarbStore, DoseStore, GlucoseStore};

/// Immediate indicator returned while an aggregated operation is running.
pub const GENERATING: &str = "Generating…";

/// Completion message when every write in a generation episode succeeded.
pub const COMPLETED: &str = "Completed";

/// Indicator returned when the manager behind a command is gone.
pub const NO_DATA_MANAGER: &str = "no data manager";

/// Configuration for synthetic sample-data generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleDataConfig {
    /// How far back the reservoir backfill starts, in milliseconds.
    pub reservoir_lookback_ms: u64,

    /// Cadence between generated reservoir readings, in milliseconds.
    pub reservoir_step_ms: u64,

    /// Reservoir volume before any drift is applied, in units.
    pub starting_unit_volume: f64,

    /// Upper bound of the uniform per-step drift, in units.
    pub max_reservoir_delta: f64,

    /// Value of the single current-time glucose sample, in mg/dL.
    pub glucose_mg_dl: f64,
}

impl Default for SampleDataConfig {
    fn default() -> Self {
        Self {
            reservoir_lookback_ms: 6 * 60 * 60 * 1000, // 6 hours
            reservoir_step_ms: 5 * 60 * 1000,          // 5 minutes
            starting_unit_volume: 150.0,
            max_reservoir_delta: 2.0,
            glucose_mg_dl: 101.0,
        }
    }
}

/// Owns the configured stores and runs aggregated operations against them.
pub struct DataManager {
    dose_store: Arc<dyn DoseStore>,
    carb_store: Option<Arc<dyn CarbStore>>,
    glucose_store: Arc<dyn GlucoseStore>,
    config: SampleDataConfig,
}

impl DataManager {
    /// Create a manager over the given stores with the default sample-data
    /// configuration. The carb store may be absent.
    pub fn new(
        dose_store: Arc<dyn DoseStore>,
        carb_store: Option<Arc<dyn CarbStore>>,
        glucose_store: Arc<dyn GlucoseStore>,
    ) -> Self {
        Self {
            dose_store,
            carb_store,
            glucose_store,
            config: SampleDataConfig::default(),
        }
    }

    /// Replace the sample-data configuration.
    pub fn with_config(mut self, config: SampleDataConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SampleDataConfig {
        &self.config
    }

    /// Generate a combined diagnostic report across all configured stores.
    ///
    /// One fragment per store kind, in fixed order (dose, carb, glucose),
    /// joined with a blank line. An unconfigured store contributes an empty
    /// fragment. `on_complete` runs on `delivery` exactly once, after every
    /// configured store has reported.
    #[tracing::instrument(skip_all)]
    pub fn diagnostic_report(
        &self,
        delivery: &DeliveryHandle,
        on_complete: impl FnOnce(String) + Send + 'static,
    ) {
        let aggregator = ReportAggregator::begin(&StoreKind::REPORT_ORDER);

        let dose = self.dose_store.clone();
        aggregator.fulfill(StoreKind::Dose, async move { dose.diagnostic_report().await });

        if let Some(carb) = self.carb_store.clone() {
            aggregator.fulfill(StoreKind::Carb, async move { carb.diagnostic_report().await });
        } else {
            tracing::debug!("carb store not configured, fragment stays empty");
        }

        let glucose = self.glucose_store.clone();
        aggregator.fulfill(StoreKind::Glucose, async move {
            glucose.diagnostic_report().await
        });

        aggregator.finish(delivery, on_complete);
    }

    /// Backfill a synthetic reservoir history and insert one current-time
    /// glucose sample, all in one join episode.
    ///
    /// Returns [`GENERATING`] immediately; the caller gets the real
    /// completion later on `delivery`, once every write has resolved. A
    /// failed write never aborts its siblings; the completion message counts
    /// the failures instead.
    #[tracing::instrument(skip_all)]
    pub fn generate_sample_data(
        &self,
        delivery: &DeliveryHandle,
        on_complete: impl FnOnce(String) + Send + 'static,
    ) -> &'static str {
        let episode = JoinEpisode::new();
        let now = Utc::now();

        let series = backfill_series(
            now,
            Duration::from_millis(self.config.reservoir_lookback_ms),
            Duration::from_millis(self.config.reservoir_step_ms),
            self.config.starting_unit_volume,
            uniform_delta(self.config.max_reservoir_delta),
        );

        let mut reservoir_writes = 0usize;
        for point in series {
            // Register before dispatch: a fast completion must never drain
            // the episode while later writes are still being started.
            episode.register();
            reservoir_writes += 1;
            let store = self.dose_store.clone();
            let episode = episode.clone();
            tokio::spawn(async move {
                let result = store.add_reservoir_value(point.value, point.timestamp).await;
                episode.complete(result.map(|_| ()));
            });
        }

        episode.register();
        let store = self.glucose_store.clone();
        let sample = NewGlucoseSample::new(now, self.config.glucose_mg_dl);
        {
            let episode = episode.clone();
            tokio::spawn(async move {
                let result = store.add_glucose_samples(vec![sample]).await;
                episode.complete(result.map(|_| ()));
            });
        }

        tracing::info!(
            reservoir_writes,
            glucose_samples = 1,
            "sample data generation dispatched"
        );

        episode.notify(delivery, move |outcome| {
            let message = if outcome.is_success() {
                COMPLETED.to_string()
            } else {
                format!("Completed with {} failed operations", outcome.failures.len())
            };
            tracing::info!(
                completed = outcome.completed,
                failures = outcome.failures.len(),
                "sample data generation finished"
            );
            on_complete(message);
        });

        GENERATING
    }
}

// ============================================================================
// Command layer
// ============================================================================

/// Run the diagnostic-report command against a possibly-gone manager.
///
/// Returns an immediate in-progress indicator; if the manager has been torn
/// down, the completion receives an empty string and the indicator says so.
pub fn run_diagnostic_command(
    manager: &Weak<DataManager>,
    delivery: &DeliveryHandle,
    on_complete: impl FnOnce(String) + Send + 'static,
) -> &'static str {
    let Some(manager) = manager.upgrade() else {
        tracing::warn!("diagnostic command invoked after manager teardown");
        on_complete(String::new());
        return NO_DATA_MANAGER;
    };
    manager.diagnostic_report(delivery, on_complete);
    "…"
}

/// Run the sample-data-generation command against a possibly-gone manager.
pub fn run_generate_command(
    manager: &Weak<DataManager>,
    delivery: &DeliveryHandle,
    on_complete: impl FnOnce(String) + Send + 'static,
) -> &'static str {
    let Some(manager) = manager.upgrade() else {
        tracing::warn!("generate command invoked after manager teardown");
        on_complete(String::new());
        return NO_DATA_MANAGER;
    };
    manager.generate_sample_data(delivery, on_complete)
}
