//! # Sensor Module
//!
//! Answers `read` jobs by taking a temperature sample and sending it, as a
//! `store_reading` job targeted at the logger, back through the router.
//!
//! A `poll` timer enqueues a `read` job into the sensor's own inbox every
//! poll interval. Polled reads use priority 2, so reads requested through the
//! router (priority 1) are always served first.
//!
//! ## Structure
//!
//! - [`SensorState`] - the sample counter and calibration offset
//! - [`registry()`] - the sensor's capability table
//! - [`new()`] - factory building a ready-to-register module

pub mod error;

pub use error::SensorError;

use crate::goals::{EcuGoal, Reading, LOGGER, SENSOR};
use ecu_framework::{FrameworkError, HookError, Job, Module, ModuleHandle, ModuleRegistry, SharedSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const POLL_PRIORITY: i32 = 2;
const BASE_CELSIUS: f64 = 20.0;

#[derive(Debug, Default)]
pub struct SensorState {
    samples: AtomicU64,
    offset: f64,
}

impl SensorState {
    pub fn with_offset(offset: f64) -> Self {
        Self {
            samples: AtomicU64::new(0),
            offset,
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }

    fn sample(&self, sensor: &str) -> Reading {
        let sample = self.samples.fetch_add(1, Ordering::SeqCst) + 1;
        Reading {
            sensor: sensor.to_string(),
            sample,
            celsius: BASE_CELSIUS + self.offset + (sample % 5) as f64 * 0.1,
        }
    }
}

async fn read(module: ModuleHandle<SensorState>, job: Job) -> Result<(), HookError> {
    let reading = module.state().sample(module.tag());
    debug!(module = module.tag(), requested_by = job.producer(), sample = reading.sample, "Sampled");

    let payload = serde_json::to_value(&reading).map_err(SensorError::from)?;
    let store = Job::new(EcuGoal::StoreReading, module.tag())
        .with_target(LOGGER)
        .with_data(payload);
    module.send_job(store).await?;
    Ok(())
}

pub fn registry(poll_interval: Duration) -> Result<ModuleRegistry<SensorState>, FrameworkError> {
    ModuleRegistry::new()
        .setup(|module: ModuleHandle<SensorState>| async move {
            info!(module = module.tag(), offset = module.state().offset, "Sensor ready");
            Ok(())
        })?
        .on_goal(EcuGoal::Read, read)?
        .timer("poll", poll_interval, |module: ModuleHandle<SensorState>| async move {
            module.enqueue(Job::new(EcuGoal::Read, module.tag()).with_priority(POLL_PRIORITY));
            Ok(())
        })
}

/// Creates a sensor module polling every `poll_interval`.
pub fn new(
    tag: &str,
    state: SensorState,
    poll_interval: Duration,
    sink: SharedSink,
) -> Result<Module<SensorState>, FrameworkError> {
    Module::builder(tag, SENSOR)
        .shared_error_sink(sink)
        .build(state, registry(poll_interval)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_framework::TracingSink;
    use std::sync::Arc;

    #[test]
    fn samples_are_numbered_from_one() {
        let state = SensorState::with_offset(1.0);
        let first = state.sample("sensor-1");
        let second = state.sample("sensor-1");
        assert_eq!(first.sample, 1);
        assert_eq!(second.sample, 2);
        assert!((first.celsius - 21.1).abs() < 1e-9);
        assert_eq!(state.samples(), 2);
    }

    #[test]
    fn registry_declares_read_and_poll() {
        let registry = registry(POLL_INTERVAL).unwrap();
        assert!(registry.solver(&EcuGoal::Read.into()).is_some());
        assert_eq!(registry.timer_names().collect::<Vec<_>>(), ["poll"]);
    }

    #[tokio::test]
    async fn read_without_router_still_samples() {
        let module = new("sensor-1", SensorState::default(), POLL_INTERVAL, Arc::new(TracingSink)).unwrap();
        module.handle().run_job(Job::new(EcuGoal::Read, "test")).await.unwrap();
        assert_eq!(module.handle().state().samples(), 1);
    }
}
