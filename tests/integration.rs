use std::sync::Arc;
use std::time::Duration;

use glucolog::manager::{COMPLETED, GENERATING, NO_DATA_MANAGER};
use glucolog::{
    DataManager, DeliveryHandle, GlucoseStore, InMemoryCarbStore, InMemoryDoseStore,
    InMemoryGlucoseStore, SampleDataConfig, run_diagnostic_command, run_generate_command,
};
use tokio::sync::oneshot;

fn full_manager() -> (
    Arc<DataManager>,
    Arc<InMemoryDoseStore>,
    Arc<InMemoryCarbStore>,
    Arc<InMemoryGlucoseStore>,
) {
    let dose = InMemoryDoseStore::new();
    let carb = InMemoryCarbStore::new();
    let glucose = InMemoryGlucoseStore::new();
    let manager = Arc::new(DataManager::new(
        dose.clone(),
        Some(carb.clone()),
        glucose.clone(),
    ));
    (manager, dose, carb, glucose)
}

async fn await_completion(rx: oneshot::Receiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("aggregated operation never completed")
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn diagnostic_report_combines_all_stores_in_order() {
    let (manager, dose, _carb, glucose) = full_manager();
    // Slow down the first store so completion order differs from slot order.
    dose.set_latency(Duration::from_millis(50));
    glucose
        .add_glucose_samples(vec![glucolog::NewGlucoseSample::new(
            chrono::Utc::now(),
            101.0,
        )])
        .await
        .unwrap();

    let delivery = DeliveryHandle::spawn();
    let (tx, rx) = oneshot::channel();
    manager.diagnostic_report(&delivery, move |report| {
        let _ = tx.send(report);
    });

    let report = await_completion(rx).await;
    let fragments: Vec<&str> = report.split("\n\n").collect();
    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].starts_with("### DoseStore"));
    assert!(fragments[1].starts_with("### CarbStore"));
    assert!(fragments[2].starts_with("### GlucoseStore"));
    assert!(fragments[2].contains("latestGlucoseSamples: 1"));
}

#[test_log::test(tokio::test)]
async fn missing_carb_store_leaves_an_empty_fragment() {
    let dose = InMemoryDoseStore::new();
    let glucose = InMemoryGlucoseStore::new();
    let manager = Arc::new(DataManager::new(dose, None, glucose));

    let delivery = DeliveryHandle::spawn();
    let (tx, rx) = oneshot::channel();
    manager.diagnostic_report(&delivery, move |report| {
        let _ = tx.send(report);
    });

    let report = await_completion(rx).await;
    let fragments: Vec<&str> = report.split("\n\n").collect();
    assert_eq!(fragments.len(), 3, "slot count is fixed by configuration");
    assert!(fragments[0].starts_with("### DoseStore"));
    assert_eq!(fragments[1], "");
    assert!(fragments[2].starts_with("### GlucoseStore"));
}

#[test_log::test(tokio::test)]
async fn generate_sample_data_backfills_and_inserts_one_sample() {
    let (manager, dose, _carb, glucose) = full_manager();

    let delivery = DeliveryHandle::spawn();
    let (tx, rx) = oneshot::channel();
    let indicator = manager.generate_sample_data(&delivery, move |message| {
        let _ = tx.send(message);
    });
    assert_eq!(indicator, GENERATING);

    let message = await_completion(rx).await;
    assert_eq!(message, COMPLETED);

    // 6 hours at a 5 minute cadence, plus one current-time glucose sample.
    let values = dose.values();
    assert_eq!(values.len(), 72);
    assert_eq!(glucose.samples().len(), 1);
    assert_eq!(glucose.samples()[0].quantity_mg_dl, 101.0);

    // Values drift monotonically downward from the starting volume; the
    // stores may record writes out of order, so sort by timestamp first.
    let mut values = values;
    values.sort_by_key(|v| v.start_date);
    for pair in values.windows(2) {
        assert!(pair[0].start_date < pair[1].start_date);
        assert!(pair[0].unit_volume >= pair[1].unit_volume);
    }
    assert!(values[0].unit_volume <= 150.0);
    assert!(values.last().unwrap().start_date < glucose.samples()[0].date);
}

#[test_log::test(tokio::test)]
async fn generation_tolerates_and_counts_write_failures() {
    let (manager, dose, _carb, glucose) = full_manager();
    dose.fail_writes(true);

    let delivery = DeliveryHandle::spawn();
    let (tx, rx) = oneshot::channel();
    manager.generate_sample_data(&delivery, move |message| {
        let _ = tx.send(message);
    });

    let message = await_completion(rx).await;
    assert_eq!(message, "Completed with 72 failed operations");

    // The failing store aborted nothing else: the glucose write still landed.
    assert!(dose.values().is_empty());
    assert_eq!(glucose.samples().len(), 1);
}

#[test_log::test(tokio::test)]
async fn generation_with_a_short_window_still_joins() {
    let dose = InMemoryDoseStore::new();
    let glucose = InMemoryGlucoseStore::new();
    let manager = Arc::new(
        DataManager::new(dose.clone(), None, glucose.clone()).with_config(SampleDataConfig {
            reservoir_lookback_ms: 15 * 60 * 1000,
            reservoir_step_ms: 5 * 60 * 1000,
            ..SampleDataConfig::default()
        }),
    );

    let delivery = DeliveryHandle::spawn();
    let (tx, rx) = oneshot::channel();
    manager.generate_sample_data(&delivery, move |message| {
        let _ = tx.send(message);
    });

    assert_eq!(await_completion(rx).await, COMPLETED);
    assert_eq!(dose.values().len(), 3);
    assert_eq!(glucose.samples().len(), 1);
}

#[test_log::test(tokio::test)]
async fn held_write_delays_the_join_until_triggered() {
    let dose = InMemoryDoseStore::new();
    let glucose = InMemoryGlucoseStore::new();
    let manager = Arc::new(
        DataManager::new(dose.clone(), None, glucose.clone()).with_config(SampleDataConfig {
            reservoir_lookback_ms: 5 * 60 * 1000, // a single reservoir write
            ..SampleDataConfig::default()
        }),
    );
    let trigger = dose.hold_next_write();

    let delivery = DeliveryHandle::spawn();
    let (tx, mut rx) = oneshot::channel();
    manager.generate_sample_data(&delivery, move |message| {
        let _ = tx.send(message);
    });

    // The held reservoir write keeps the episode open even after the glucose
    // write has finished.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());

    trigger.send(()).unwrap();
    assert_eq!(await_completion(rx).await, COMPLETED);
    assert_eq!(dose.values().len(), 1);
}

#[test_log::test(tokio::test)]
async fn commands_survive_manager_teardown() {
    let (manager, _dose, _carb, _glucose) = full_manager();
    let weak = Arc::downgrade(&manager);
    let delivery = DeliveryHandle::spawn();

    // Live manager: the command runs normally.
    let (tx, rx) = oneshot::channel();
    let indicator = run_diagnostic_command(&weak, &delivery, move |report| {
        let _ = tx.send(report);
    });
    assert_eq!(indicator, "…");
    assert!(!await_completion(rx).await.is_empty());

    // Torn-down manager: immediate empty completion, no panic.
    drop(manager);
    let (tx, rx) = oneshot::channel();
    let indicator = run_diagnostic_command(&weak, &delivery, move |report| {
        let _ = tx.send(report);
    });
    assert_eq!(indicator, NO_DATA_MANAGER);
    assert_eq!(await_completion(rx).await, "");

    let (tx, rx) = oneshot::channel();
    let indicator = run_generate_command(&weak, &delivery, move |message| {
        let _ = tx.send(message);
    });
    assert_eq!(indicator, NO_DATA_MANAGER);
    assert_eq!(await_completion(rx).await, "");
}

#[test_log::test(tokio::test)]
async fn concurrent_reports_use_independent_episodes() {
    let (manager, dose, _carb, _glucose) = full_manager();
    dose.set_latency(Duration::from_millis(20));
    let delivery = DeliveryHandle::spawn();

    let mut receivers = Vec::new();
    for _ in 0..10 {
        let (tx, rx) = oneshot::channel();
        manager.diagnostic_report(&delivery, move |report| {
            let _ = tx.send(report);
        });
        receivers.push(rx);
    }

    let mut reports = Vec::new();
    for rx in receivers {
        reports.push(await_completion(rx).await);
    }
    assert_eq!(reports.len(), 10);
    for report in &reports {
        assert_eq!(report.split("\n\n").count(), 3);
        assert_eq!(report, &reports[0]);
    }
}
