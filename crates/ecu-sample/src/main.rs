//! # ECU Sample
//!
//! Starts an [`EcuSystem`], requests a few readings through the router, lets the
//! sensor poll on its own for a while, then shuts everything down.
//!
//! ```bash
//! RUST_LOG=info cargo run -p ecu-sample
//! RUST_LOG=debug cargo run -p ecu-sample   # follow every job
//! ```

use ecu_framework::tracing::setup_tracing;
use ecu_framework::Job;
use ecu_sample::goals::EcuGoal;
use ecu_sample::lifecycle::{EcuSystem, SystemSettings};
use std::time::Duration;
use tracing::{info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    info!("Starting ECU sample");

    let settings = SystemSettings {
        poll_interval: Duration::from_millis(500),
        sensor_offset: 0.5,
        ..SystemSettings::default()
    };
    let system = EcuSystem::with_settings(settings)?;
    system.start().await?;

    let span = tracing::info_span!("on_demand_reads");
    async {
        for _ in 0..3 {
            info!("Requesting reading");
            system.request_reading("main");
        }
    }
    .instrument(span)
    .await;

    // A target nobody serves: the router reports it and carries on.
    system.submit(Job::new(EcuGoal::Read, "main").with_target("gps"));

    tokio::time::sleep(Duration::from_secs(2)).await;

    let readings = system.logger.state().readings();
    info!(stored = readings.len(), "Readings collected");
    for reading in &readings {
        info!(sensor = %reading.sensor, sample = reading.sample, celsius = reading.celsius, "Reading");
    }
    if readings.is_empty() {
        warn!("No reading reached the logger");
    }

    system.shutdown().await?;
    info!("ECU sample completed");
    Ok(())
}
