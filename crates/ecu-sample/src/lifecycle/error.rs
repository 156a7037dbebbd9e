//! Routing failures raised by the router's `assigning_job` hook.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RoutingError {
    #[error("Job for goal {0} has no target")]
    NoTarget(String),

    #[error("No module registered for target {0}")]
    UnknownTarget(String),
}
