//! # Framework Errors
//!
//! Two families of errors flow through the framework:
//!
//! - [`FrameworkError`]: configuration and lifecycle mistakes. These surface from
//!   `bind`, `run`, `start` and `register_modules` and are expected to abort startup.
//! - [`DispatchError`]: per-job failures inside a running actor. These never escape
//!   a dispatch loop; they are handed to the actor's [`ErrorSink`](crate::ErrorSink)
//!   and the loop moves on to the next job.

use crate::job::Goal;
use std::time::Duration;

/// Boxed error returned by application hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result type every application hook resolves to.
pub type HookResult = Result<(), HookError>;

/// Configuration and lifecycle errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("actor `{0}` used before a registry was bound")]
    Unbound(String),
    #[error("actor `{0}` is already bound to a registry")]
    AlreadyBound(String),
    #[error("registry for actor `{0}` declares no hooks")]
    EmptyRegistry(String),
    #[error("required hook `{hook}` missing for actor `{actor}`")]
    MissingHook { actor: String, hook: &'static str },
    #[error("hook `{0}` registered twice")]
    DuplicateHook(String),
    #[error("module `{0}` is already registered")]
    DuplicateModule(String),
    #[error("actor `{0}` is already running")]
    AlreadyRunning(String),
    #[error("actor `{0}` has been stopped")]
    Stopped(String),
    #[error("setup hook of actor `{actor}` failed: {source}")]
    SetupFailed {
        actor: String,
        #[source]
        source: HookError,
    },
    #[error("shutdown of `{actor}` exceeded {grace:?}; stuck: {stuck:?}")]
    ShutdownTimeout {
        actor: String,
        grace: Duration,
        stuck: Vec<String>,
    },
}

impl FrameworkError {
    /// Short stable label for structured logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FrameworkError::Unbound(_) => "unbound",
            FrameworkError::AlreadyBound(_) => "already_bound",
            FrameworkError::EmptyRegistry(_) => "empty_registry",
            FrameworkError::MissingHook { .. } => "missing_hook",
            FrameworkError::DuplicateHook(_) => "duplicate_hook",
            FrameworkError::DuplicateModule(_) => "duplicate_module",
            FrameworkError::AlreadyRunning(_) => "already_running",
            FrameworkError::Stopped(_) => "stopped",
            FrameworkError::SetupFailed { .. } => "setup_failed",
            FrameworkError::ShutdownTimeout { .. } => "shutdown_timeout",
        }
    }
}

/// Errors raised while dispatching a single job or running a single hook invocation.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No solver is registered for the job's goal. The job is dropped.
    #[error("no solver registered for goal `{goal}` (producer `{producer}`)")]
    MissingHandler { goal: Goal, producer: String },
    /// An application hook returned an error.
    #[error("hook `{hook}` failed: {source}")]
    HookFailed {
        hook: String,
        #[source]
        source: HookError,
    },
    /// An application hook panicked. The job, if any, is dropped.
    #[error("hook `{hook}` panicked: {message}")]
    HookPanicked { hook: String, message: String },
}

impl DispatchError {
    pub fn hook(hook: impl Into<String>, source: HookError) -> Self {
        DispatchError::HookFailed {
            hook: hook.into(),
            source,
        }
    }

    /// Short stable label for structured logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::MissingHandler { .. } => "missing_handler",
            DispatchError::HookFailed { .. } => "hook_failed",
            DispatchError::HookPanicked { .. } => "hook_panicked",
        }
    }
}
