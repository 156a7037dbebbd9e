//! # Test Doubles
//!
//! Small helpers for testing modules and routers without sleeping on fixed
//! delays or scraping log output.
//!
//! | Helper            | Use it to                                             |
//! |-------------------|-------------------------------------------------------|
//! | [`RecordingSink`] | assert on which dispatch failures an actor reported   |
//! | [`CallCounter`]   | count hook invocations and wait until N have happened |
//!
//! ## Pattern: asserting on swallowed failures
//!
//! Background loops never propagate per-job errors, so tests inject a
//! [`RecordingSink`] and inspect it afterwards:
//!
//! ```rust
//! use ecu_framework::mock::{CallCounter, RecordingSink};
//! use ecu_framework::{Job, Module, ModuleRegistry};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = RecordingSink::new();
//!     let registry = ModuleRegistry::<CallCounter>::new().on_goal("read", |module, _| async move {
//!         module.state().hit();
//!         Ok(())
//!     })?;
//!     let module = Module::builder("sensor-1", "sensor")
//!         .error_sink(sink.clone())
//!         .build(CallCounter::default(), registry)?;
//!
//!     module.start().await?;
//!     module.enqueue(Job::new("calibrate", "test"));
//!     module.enqueue(Job::new("read", "test").with_priority(2));
//!     module.handle().state().wait_for(1, Duration::from_secs(1)).await;
//!
//!     assert_eq!(sink.labels(), ["missing_handler"]);
//!     module.stop().await?;
//!     Ok(())
//! }
//! ```

use crate::error::DispatchError;
use crate::sink::ErrorSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Report {
    actor: String,
    label: &'static str,
    message: String,
}

/// An [`ErrorSink`] that keeps every report in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error labels (see [`DispatchError::as_label`]) in report order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.reports.lock().iter().map(|r| r.label).collect()
    }

    /// Names of the reporting actors, in report order.
    pub fn actors(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.actor.clone()).collect()
    }

    /// Rendered error messages, in report order.
    pub fn messages(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, actor: &str, error: &DispatchError) {
        self.reports.lock().push(Report {
            actor: actor.to_string(),
            label: error.as_label(),
            message: error.to_string(),
        });
    }
}

/// Shared invocation counter. Clones count into the same total.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` calls were counted.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` elapses first.
    pub async fn wait_for(&self, n: usize, timeout: Duration) {
        let reached = tokio::time::timeout(timeout, async {
            while self.count() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        if reached.is_err() {
            panic!("expected {n} calls within {timeout:?}, saw {}", self.count());
        }
    }
}
