//! Combined diagnostic reports across multiple stores.
//!
//! A [`ReportAggregator`] owns one slot of report text per expected store, in
//! fixed presentation order, and a [`JoinEpisode`] that fires once every
//! fulfilled store has produced its fragment. Stores that are not configured
//! for a given manager are simply never fulfilled; their slot stays empty,
//! which is policy, not an error. Each store writes only its own slot, so the
//! slots need no cross-slot coordination beyond the episode's counter.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::delivery::DeliveryHandle;
use crate::domain::StoreKind;
use crate::join::JoinEpisode;

/// Separator between per-store fragments in the combined report.
const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Collects per-store diagnostic text into one ordered report.
pub struct ReportAggregator {
    episode: JoinEpisode,
    order: Vec<StoreKind>,
    slots: Arc<Vec<Mutex<String>>>,
}

impl ReportAggregator {
    /// Start a report with one empty slot per expected store, in the given
    /// order. The order here is the order fragments appear in the output,
    /// regardless of which store finishes first.
    pub fn begin(expected: &[StoreKind]) -> Self {
        Self {
            episode: JoinEpisode::new(),
            order: expected.to_vec(),
            slots: Arc::new(expected.iter().map(|_| Mutex::new(String::new())).collect()),
        }
    }

    /// The episode backing this report, for callers that want to attach
    /// additional operations to the same join.
    pub fn episode(&self) -> &JoinEpisode {
        &self.episode
    }

    /// Register and dispatch one store's diagnostic operation.
    ///
    /// The registration happens synchronously, before the future is spawned,
    /// so a fast completion can never drain the episode while siblings are
    /// still being set up. A kind that was not declared in
    /// [`begin`](Self::begin) is logged and ignored.
    pub fn fulfill<F>(&self, kind: StoreKind, operation: F)
    where
        F: Future<Output = String> + Send + 'static,
    {
        let Some(index) = self.order.iter().position(|k| *k == kind) else {
            tracing::warn!(kind = %kind, "diagnostic fragment for undeclared store, ignoring");
            return;
        };

        self.episode.register();
        let episode = self.episode.clone();
        let slots = self.slots.clone();
        tokio::spawn(async move {
            let fragment = operation.await;
            tracing::debug!(kind = %kind, len = fragment.len(), "diagnostic fragment ready");
            *slots[index].lock() = fragment;
            episode.complete(Ok(()));
        });
    }

    /// Arm the final continuation: once every fulfilled store has reported,
    /// the slots are joined in declaration order with a blank-line separator
    /// and delivered as one string on `delivery`.
    ///
    /// With nothing fulfilled this fires immediately with the empty slots.
    pub fn finish(self, delivery: &DeliveryHandle, on_complete: impl FnOnce(String) + Send + 'static) {
        let slots = self.slots.clone();
        self.episode.notify(delivery, move |outcome| {
            let combined = slots
                .iter()
                .map(|slot| slot.lock().clone())
                .collect::<Vec<_>>()
                .join(FRAGMENT_SEPARATOR);
            tracing::info!(
                sources = slots.len(),
                completed = outcome.completed,
                "combined diagnostic report ready"
            );
            on_complete(combined);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn finish_and_wait(aggregator: ReportAggregator) -> String {
        let delivery = DeliveryHandle::spawn();
        let (tx, rx) = oneshot::channel();
        aggregator.finish(&delivery, move |report| {
            let _ = tx.send(report);
        });
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("report never completed")
            .unwrap()
    }

    #[tokio::test]
    async fn fragments_appear_in_declaration_order() {
        let aggregator = ReportAggregator::begin(&StoreKind::REPORT_ORDER);
        // Fulfilled out of order, with the first-declared store the slowest.
        aggregator.fulfill(StoreKind::Glucose, async { "glucose report".to_string() });
        aggregator.fulfill(StoreKind::Dose, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "dose report".to_string()
        });
        aggregator.fulfill(StoreKind::Carb, async { "carb report".to_string() });

        let report = finish_and_wait(aggregator).await;
        assert_eq!(report, "dose report\n\ncarb report\n\nglucose report");
    }

    #[tokio::test]
    async fn absent_store_leaves_an_empty_fragment() {
        let aggregator = ReportAggregator::begin(&StoreKind::REPORT_ORDER);
        aggregator.fulfill(StoreKind::Dose, async { "dose report".to_string() });
        // Carb store not configured: never fulfilled.
        aggregator.fulfill(StoreKind::Glucose, async { "glucose report".to_string() });

        let report = finish_and_wait(aggregator).await;
        assert_eq!(report, "dose report\n\n\n\nglucose report");
        assert_eq!(report.split(FRAGMENT_SEPARATOR).count(), 3);
    }

    #[tokio::test]
    async fn zero_fulfilled_stores_complete_immediately() {
        let aggregator = ReportAggregator::begin(&StoreKind::REPORT_ORDER);
        let report = finish_and_wait(aggregator).await;
        assert_eq!(report, "\n\n\n\n");
        assert_eq!(report.split(FRAGMENT_SEPARATOR).count(), 3);
    }

    #[tokio::test]
    async fn undeclared_store_is_ignored() {
        let aggregator = ReportAggregator::begin(&[StoreKind::Dose]);
        aggregator.fulfill(StoreKind::Dose, async { "dose report".to_string() });
        aggregator.fulfill(StoreKind::Glucose, async { "should not appear".to_string() });

        let report = finish_and_wait(aggregator).await;
        assert_eq!(report, "dose report");
    }
}
