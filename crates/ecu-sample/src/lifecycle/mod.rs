//! # System Lifecycle & Orchestration
//!
//! [`EcuSystem`] is the conductor: it creates the router and the modules, wires
//! them together, starts them in order and shuts them down.
//!
//! ## Wiring
//!
//! ```text
//!  request_reading ──▶ mcu ──assigning_job──▶ sensor-1 ──send_job──▶ mcu ──assigning_job──▶ logger-1
//!                                               ▲ poll timer
//! ```
//!
//! The router's `assigning_job` hook routes by [`Job::target`]: a job whose target
//! has no registered module fails the hook with [`RoutingError`], which the
//! router's error sink reports.
//!
//! ## Shutdown
//!
//! [`EcuSystem::shutdown`] stops the router first, so no new jobs are assigned,
//! then every module. Jobs still queued at that point are dropped.

pub mod error;

pub use error::RoutingError;

use crate::goals::{EcuGoal, SENSOR};
use crate::logger::{self, LoggerState};
use crate::sensor::{self, SensorState, POLL_INTERVAL};
use ecu_framework::{
    FrameworkError, HookError, Job, Mcu, ModuleHandle, RouterHandle, RouterRegistry, SharedSink, TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const ROUTER_NAME: &str = "mcu";
pub const SENSOR_TAG: &str = "sensor-1";
pub const LOGGER_TAG: &str = "logger-1";

/// Knobs for building an [`EcuSystem`].
#[derive(Clone)]
pub struct SystemSettings {
    pub poll_interval: Duration,
    pub sensor_offset: f64,
    pub error_sink: SharedSink,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            sensor_offset: 0.0,
            error_sink: Arc::new(TracingSink),
        }
    }
}

fn router_registry() -> Result<RouterRegistry, FrameworkError> {
    RouterRegistry::new()
        .on_receiver(|router: RouterHandle, job: Job| async move {
            debug!(router = router.name(), goal = %job.goal(), producer = job.producer(), "Forwarded by module");
            router.enqueue(job);
            Ok(())
        })?
        .assigning_job(|router: RouterHandle, job: Job| async move {
            let Some(target) = job.target().cloned() else {
                return Err(HookError::from(RoutingError::NoTarget(job.goal().to_string())));
            };
            let Some(module) = router.module_by_target(&target) else {
                return Err(HookError::from(RoutingError::UnknownTarget(target.to_string())));
            };
            module.enqueue(job);
            Ok(())
        })
}

/// The running application: a router, one sensor, one logger.
pub struct EcuSystem {
    mcu: Mcu,
    pub sensor: ModuleHandle<SensorState>,
    pub logger: ModuleHandle<LoggerState>,
}

impl EcuSystem {
    /// Builds and wires the system. Nothing runs until [`EcuSystem::start`].
    pub fn new() -> Result<Self, FrameworkError> {
        Self::with_settings(SystemSettings::default())
    }

    pub fn with_settings(settings: SystemSettings) -> Result<Self, FrameworkError> {
        let mcu = Mcu::builder(ROUTER_NAME)
            .shared_error_sink(settings.error_sink.clone())
            .build(router_registry()?)?;

        let sensor = sensor::new(
            SENSOR_TAG,
            SensorState::with_offset(settings.sensor_offset),
            settings.poll_interval,
            settings.error_sink.clone(),
        )?;
        let logger = logger::new(LOGGER_TAG, settings.error_sink)?;
        let (sensor_handle, logger_handle) = (sensor.handle(), logger.handle());

        mcu.register_modules([sensor.into_ref(), logger.into_ref()])?;

        Ok(Self {
            mcu,
            sensor: sensor_handle,
            logger: logger_handle,
        })
    }

    pub async fn start(&self) -> Result<(), FrameworkError> {
        self.mcu.start().await?;
        info!(modules = self.mcu.modules().len(), "System started");
        Ok(())
    }

    /// Asks the router for a fresh reading from the sensor.
    pub fn request_reading(&self, requested_by: &str) {
        self.mcu.enqueue(Job::new(EcuGoal::Read, requested_by).with_target(SENSOR));
    }

    /// Puts an arbitrary job into the router's inbox.
    pub fn submit(&self, job: Job) {
        self.mcu.enqueue(job);
    }

    pub fn router(&self) -> RouterHandle {
        self.mcu.handle()
    }

    pub async fn shutdown(self) -> Result<(), FrameworkError> {
        info!("Shutting down system...");
        self.mcu.stop().await?;
        info!(
            samples = self.sensor.state().samples(),
            stored = self.logger.state().len(),
            "System shut down"
        );
        Ok(())
    }
}
