//! Store trait abstractions and in-memory implementations.
//!
//! Each backing subsystem is modeled as a trait whose operations complete
//! asynchronously: the dose/reservoir log, the carbohydrate log, and the
//! glucose log. The coordinator only ever talks to these traits, which keeps
//! the join logic testable without a real persistence layer.
//!
//! The `InMemory*` implementations double as test fixtures: they record every
//! write, can inject latency or failures, and can hold a completion open
//! until manually triggered, which is how the race-oriented tests control
//! completion interleavings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::domain::{NewCarbEntry, NewGlucoseSample, ReservoirValue, StoreKind};
use crate::error::{GlucologError, Result};

/// Insulin dose / reservoir log.
#[async_trait]
pub trait DoseStore: Send + Sync {
    /// Record a reservoir reading at a point in time.
    async fn add_reservoir_value(&self, unit_volume: f64, at: DateTime<Utc>)
    -> Result<ReservoirValue>;

    /// Produce this store's diagnostic report text.
    async fn diagnostic_report(&self) -> String;
}

/// Carbohydrate intake log.
#[async_trait]
pub trait CarbStore: Send + Sync {
    /// Record one carbohydrate entry.
    async fn add_carb_entry(&self, entry: NewCarbEntry) -> Result<()>;

    /// Produce this store's diagnostic report text.
    async fn diagnostic_report(&self) -> String;
}

/// Glucose measurement log.
#[async_trait]
pub trait GlucoseStore: Send + Sync {
    /// Record a batch of glucose samples, returning how many were accepted.
    async fn add_glucose_samples(&self, samples: Vec<NewGlucoseSample>) -> Result<usize>;

    /// Produce this store's diagnostic report text.
    async fn diagnostic_report(&self) -> String;
}

// ============================================================================
// Shared in-memory behavior
// ============================================================================

/// Write-path behavior shared by the in-memory stores: artificial latency,
/// failure injection, and manual completion triggers.
struct Behavior {
    kind: StoreKind,
    latency: Mutex<Option<Duration>>,
    fail_writes: AtomicBool,
    writes_started: AtomicUsize,
    triggers: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl Behavior {
    fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            latency: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
            writes_started: AtomicUsize::new(0),
            triggers: Mutex::new(VecDeque::new()),
        }
    }

    /// Run the configured delay/trigger, then report success or the injected
    /// failure.
    async fn before_write(&self) -> Result<()> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let trigger = self.triggers.lock().pop_front();
        if let Some(trigger) = trigger {
            // Sender dropped counts as triggered; the write must still finish.
            let _ = trigger.await;
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GlucologError::SampleRejected {
                kind: self.kind,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

macro_rules! behavior_accessors {
    () => {
        /// Add artificial latency to every write.
        pub fn set_latency(&self, latency: Duration) {
            *self.behavior.latency.lock() = Some(latency);
        }

        /// Make every subsequent write fail with `SampleRejected`.
        pub fn fail_writes(&self, fail: bool) {
            self.behavior.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Hold the next write open until the returned sender is triggered
        /// (or dropped). Triggers apply in FIFO order, one per write.
        pub fn hold_next_write(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.behavior.triggers.lock().push_back(rx);
            tx
        }

        /// Number of writes that have started (including ones still held).
        pub fn writes_started(&self) -> usize {
            self.behavior.writes_started.load(Ordering::SeqCst)
        }
    };
}

// ============================================================================
// In-memory stores
// ============================================================================

/// In-memory dose/reservoir log.
pub struct InMemoryDoseStore {
    behavior: Behavior,
    values: Mutex<Vec<ReservoirValue>>,
}

impl InMemoryDoseStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::new(StoreKind::Dose),
            values: Mutex::new(Vec::new()),
        })
    }

    /// All recorded readings, in write order.
    pub fn values(&self) -> Vec<ReservoirValue> {
        self.values.lock().clone()
    }

    behavior_accessors!();
}

#[async_trait]
impl DoseStore for InMemoryDoseStore {
    async fn add_reservoir_value(
        &self,
        unit_volume: f64,
        at: DateTime<Utc>,
    ) -> Result<ReservoirValue> {
        self.behavior.before_write().await?;
        let value = ReservoirValue {
            start_date: at,
            unit_volume,
        };
        self.values.lock().push(value);
        Ok(value)
    }

    async fn diagnostic_report(&self) -> String {
        let values = self.values.lock();
        format!("### DoseStore\n* reservoirValues: {}", values.len())
    }
}

/// In-memory carbohydrate log.
pub struct InMemoryCarbStore {
    behavior: Behavior,
    entries: Mutex<Vec<NewCarbEntry>>,
}

impl InMemoryCarbStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::new(StoreKind::Carb),
            entries: Mutex::new(Vec::new()),
        })
    }

    /// All recorded entries, in write order.
    pub fn entries(&self) -> Vec<NewCarbEntry> {
        self.entries.lock().clone()
    }

    behavior_accessors!();
}

#[async_trait]
impl CarbStore for InMemoryCarbStore {
    async fn add_carb_entry(&self, entry: NewCarbEntry) -> Result<()> {
        self.behavior.before_write().await?;
        self.entries.lock().push(entry);
        Ok(())
    }

    async fn diagnostic_report(&self) -> String {
        let entries = self.entries.lock();
        format!("### CarbStore\n* carbEntries: {}", entries.len())
    }
}

/// In-memory glucose log.
pub struct InMemoryGlucoseStore {
    behavior: Behavior,
    samples: Mutex<Vec<NewGlucoseSample>>,
}

impl InMemoryGlucoseStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::new(StoreKind::Glucose),
            samples: Mutex::new(Vec::new()),
        })
    }

    /// All recorded samples, in write order.
    pub fn samples(&self) -> Vec<NewGlucoseSample> {
        self.samples.lock().clone()
    }

    behavior_accessors!();
}

#[async_trait]
impl GlucoseStore for InMemoryGlucoseStore {
    async fn add_glucose_samples(&self, samples: Vec<NewGlucoseSample>) -> Result<usize> {
        self.behavior.before_write().await?;
        let accepted = samples.len();
        self.samples.lock().extend(samples);
        Ok(accepted)
    }

    async fn diagnostic_report(&self) -> String {
        let samples = self.samples.lock();
        format!("### GlucoseStore\n* latestGlucoseSamples: {}", samples.len())
    }
}
