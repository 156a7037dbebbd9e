use ecu_framework::mock::RecordingSink;
use ecu_framework::Job;
use ecu_sample::goals::{EcuGoal, LOGGER};
use ecu_sample::lifecycle::{EcuSystem, SystemSettings};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn settings(sink: &RecordingSink) -> SystemSettings {
    SystemSettings {
        poll_interval: Duration::from_secs(3600),
        sensor_offset: 1.0,
        error_sink: Arc::new(sink.clone()),
    }
}

async fn wait_for_readings(system: &EcuSystem, n: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while system.logger.state().len() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("readings did not reach the logger in time");
}

/// A requested reading goes router → sensor → router → logger.
#[tokio::test]
async fn test_requested_reading_reaches_logger() {
    let sink = RecordingSink::new();
    let system = EcuSystem::with_settings(settings(&sink)).expect("Failed to build system");
    system.start().await.expect("Failed to start system");

    system.request_reading("test");
    wait_for_readings(&system, 1).await;

    let readings = system.logger.state().readings();
    assert_eq!(readings[0].sensor, "sensor-1");
    assert_eq!(readings[0].sample, 1);
    assert!((readings[0].celsius - 21.1).abs() < 1e-9);
    assert_eq!(system.sensor.state().samples(), 1);
    assert!(sink.is_empty());

    system.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_unknown_target_is_reported_and_system_continues() {
    let sink = RecordingSink::new();
    let system = EcuSystem::with_settings(settings(&sink)).expect("Failed to build system");
    system.start().await.expect("Failed to start system");

    system.submit(Job::new(EcuGoal::Read, "test").with_target("gps"));
    system.submit(Job::new(EcuGoal::Read, "test"));
    system.request_reading("test");
    wait_for_readings(&system, 1).await;

    assert_eq!(sink.labels(), ["hook_failed", "hook_failed"]);
    assert_eq!(sink.actors(), ["mcu", "mcu"]);
    assert!(sink.messages()[0].contains("gps"));

    system.shutdown().await.expect("Failed to shut down");
}

/// A malformed reading fails the logger's solver; the logger keeps serving.
#[tokio::test]
async fn test_malformed_reading_is_reported_by_logger() {
    let sink = RecordingSink::new();
    let system = EcuSystem::with_settings(settings(&sink)).expect("Failed to build system");
    system.start().await.expect("Failed to start system");

    system.submit(
        Job::new(EcuGoal::StoreReading, "test")
            .with_target(LOGGER)
            .with_data(json!({ "sensor": "sensor-9" })),
    );
    system.request_reading("test");
    wait_for_readings(&system, 1).await;

    assert_eq!(sink.actors(), ["logger-1"]);
    assert!(sink.messages()[0].contains("Invalid reading"));
    assert_eq!(system.logger.state().readings()[0].sensor, "sensor-1");

    system.shutdown().await.expect("Failed to shut down");
}

#[tokio::test(start_paused = true)]
async fn test_sensor_polls_on_its_own() {
    let sink = RecordingSink::new();
    let system = EcuSystem::with_settings(SystemSettings {
        poll_interval: Duration::from_millis(100),
        ..settings(&sink)
    })
    .expect("Failed to build system");
    system.start().await.expect("Failed to start system");

    tokio::time::sleep(Duration::from_millis(450)).await;
    wait_for_readings(&system, 4).await;

    let samples: Vec<u64> = system.logger.state().readings().iter().map(|r| r.sample).collect();
    assert_eq!(&samples[..4], [1, 2, 3, 4]);

    system.shutdown().await.expect("Failed to shut down");
}
