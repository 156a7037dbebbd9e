//! # Logger Module
//!
//! Stores every reading it receives through `store_reading` jobs. The reading
//! travels as the job's JSON payload; a missing or malformed payload fails the
//! solver, which the framework reports and drops.

pub mod error;

pub use error::LoggerError;

use crate::goals::{EcuGoal, Reading, LOGGER};
use ecu_framework::{FrameworkError, HookError, Job, Module, ModuleHandle, ModuleRegistry, SharedSink};
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggerState {
    readings: Mutex<Vec<Reading>>,
}

impl LoggerState {
    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.readings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.lock().is_empty()
    }
}

fn decode(job: &Job) -> Result<Reading, LoggerError> {
    let data = job
        .data()
        .ok_or_else(|| LoggerError::MissingReading(job.producer().to_string()))?;
    Ok(serde_json::from_value(data.clone())?)
}

async fn store(module: ModuleHandle<LoggerState>, job: Job) -> Result<(), HookError> {
    let reading = decode(&job)?;
    info!(
        module = module.tag(),
        sensor = %reading.sensor,
        sample = reading.sample,
        celsius = reading.celsius,
        "Reading stored"
    );
    module.state().readings.lock().push(reading);
    Ok(())
}

pub fn registry() -> Result<ModuleRegistry<LoggerState>, FrameworkError> {
    ModuleRegistry::new().on_goal(EcuGoal::StoreReading, store)
}

pub fn new(tag: &str, sink: SharedSink) -> Result<Module<LoggerState>, FrameworkError> {
    Module::builder(tag, LOGGER)
        .shared_error_sink(sink)
        .build(LoggerState::default(), registry()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_framework::TracingSink;
    use serde_json::json;
    use std::sync::Arc;

    fn logger() -> Module<LoggerState> {
        new("logger-1", Arc::new(TracingSink)).unwrap()
    }

    #[tokio::test]
    async fn stores_valid_readings() {
        let module = logger();
        let job = Job::new(EcuGoal::StoreReading, "sensor-1")
            .with_data(json!({ "sensor": "sensor-1", "sample": 3, "celsius": 20.3 }));
        module.handle().run_job(job).await.unwrap();

        let readings = module.handle().state().readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sample, 3);
    }

    #[tokio::test]
    async fn rejects_missing_and_malformed_payloads() {
        let module = logger();
        let handle = module.handle();

        let err = handle
            .run_job(Job::new(EcuGoal::StoreReading, "sensor-1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("carries no reading"));

        let malformed = Job::new(EcuGoal::StoreReading, "sensor-1").with_data(json!({ "celsius": "hot" }));
        let err = handle.run_job(malformed).await.unwrap_err();
        assert_eq!(err.as_label(), "hook_failed");
        assert!(handle.state().is_empty());
    }
}
