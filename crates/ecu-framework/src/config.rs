//! # Actor Configuration
//!
//! The framework reads nothing from files or the environment (log filtering via
//! `RUST_LOG` aside). The few knobs an embedding application may want to turn
//! live in [`ActorConfig`], passed to an actor through its builder
//! (`Module::builder(..).config(..)`, `Mcu::builder(..).config(..)`).

use std::time::Duration;

/// Interval used for a main-loop hook registered without one.
pub const DEFAULT_MAIN_LOOP_INTERVAL: Duration = Duration::from_secs(1);

/// How long `stop()` waits for background loops before aborting them.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorConfig {
    pub main_loop_interval: Duration,
    pub stop_grace: Duration,
}

impl ActorConfig {
    pub fn with_main_loop_interval(mut self, interval: Duration) -> Self {
        self.main_loop_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            main_loop_interval: DEFAULT_MAIN_LOOP_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}
