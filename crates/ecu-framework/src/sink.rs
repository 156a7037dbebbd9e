//! # Error Sink
//!
//! Dispatch loops never propagate per-job failures. They hand them to the actor's
//! [`ErrorSink`] and keep going. The default [`TracingSink`] turns every report
//! into a `warn!` event; applications that want to count, alert or test on
//! failures inject their own sink through the builders' `error_sink`.

use crate::error::DispatchError;
use std::sync::Arc;
use tracing::warn;

/// Receives per-job failures observed by an actor's background loops.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, actor: &str, error: &DispatchError);
}

/// Shared, type-erased sink held by controllers.
pub type SharedSink = Arc<dyn ErrorSink>;

/// Logs every report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, actor: &str, error: &DispatchError) {
        warn!(actor, kind = error.as_label(), error = %error, "Dispatch failed");
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &DispatchError) + Send + Sync + 'static,
{
    fn report(&self, actor: &str, error: &DispatchError) {
        self(actor, error)
    }
}

pub(crate) fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}
