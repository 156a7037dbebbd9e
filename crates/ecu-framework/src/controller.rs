//! # Controller Core
//!
//! The part of an actor controller that doesn't care whether the actor is the
//! router or a module: the inbox, the lifecycle phase, the error sink, and the set
//! of background loops launched by `run()`.
//!
//! ```text
//! Uninitialized ──bind──▶ Ready ──run──▶ Running ──stop──▶ Stopped
//! ```
//!
//! `bind` and `run` are one-shot. `stop` is idempotent.

use crate::config::ActorConfig;
use crate::error::{DispatchError, FrameworkError};
use crate::inbox::Inbox;
use crate::job::Job;
use crate::error::HookResult;
use crate::looped::{catch_panic, looped_with, LoopHandle};
use crate::registry::{CommonHooks, Hook};
use crate::sink::SharedSink;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maps a hook outcome, possibly a caught panic, to what the sink should hear.
pub(crate) fn dispatch_failure(hook: String, outcome: Result<HookResult, String>) -> Option<DispatchError> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(source)) => Some(DispatchError::hook(hook, source)),
        Err(message) => Some(DispatchError::HookPanicked { hook, message }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

pub(crate) struct ControllerCore {
    name: String,
    inbox: Inbox,
    phase: Mutex<Phase>,
    loops: Mutex<Vec<LoopHandle>>,
    shutdown: CancellationToken,
    sink: SharedSink,
    config: ActorConfig,
}

impl ControllerCore {
    pub(crate) fn new(name: String, config: ActorConfig, sink: SharedSink) -> Self {
        Self {
            name,
            inbox: Inbox::new(),
            phase: Mutex::new(Phase::Uninitialized),
            loops: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            sink,
            config,
        }
    }

    pub(crate) fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub(crate) fn enqueue(&self, job: Job) {
        debug!(
            actor = %self.name,
            goal = %job.goal(),
            producer = job.producer(),
            priority = job.priority(),
            "Enqueued"
        );
        self.inbox.push(job);
    }

    /// Uninitialized → Ready. The caller stores the registry only when this succeeds.
    pub(crate) fn mark_bound(&self) -> Result<(), FrameworkError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Uninitialized => {
                *phase = Phase::Ready;
                Ok(())
            }
            _ => Err(FrameworkError::AlreadyBound(self.name.clone())),
        }
    }

    /// Ready → Running.
    pub(crate) fn begin_run(&self) -> Result<(), FrameworkError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Ready => {
                *phase = Phase::Running;
                Ok(())
            }
            Phase::Uninitialized => Err(FrameworkError::Unbound(self.name.clone())),
            Phase::Running | Phase::Stopped => Err(FrameworkError::AlreadyRunning(self.name.clone())),
        }
    }

    pub(crate) fn report(&self, error: &DispatchError) {
        self.sink.report(&self.name, error);
    }

    /// Launches a loop tied to this actor's shutdown token and keeps its handle.
    pub(crate) fn spawn_loop<F, Fut>(&self, hook: &str, interval: Option<Duration>, f: F)
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        let loop_token = token.clone();
        let mut f = f;
        let handle = looped_with(
            format!("{}:{hook}", self.name),
            token,
            interval,
            move || f(loop_token.clone()),
        );
        self.loops.lock().push(handle);
    }

    /// Runs `setup`, then launches every timer and the main loop declared in `hooks`.
    pub(crate) async fn start_common<A>(
        &self,
        hooks: &CommonHooks<A>,
        actor: &A,
    ) -> Result<(), FrameworkError>
    where
        A: Clone + Send + Sync + 'static,
    {
        if let Some(setup) = &hooks.setup {
            debug!(actor = %self.name, "Running setup");
            if let Err(source) = setup(actor.clone()).await {
                *self.phase.lock() = Phase::Stopped;
                return Err(FrameworkError::SetupFailed {
                    actor: self.name.clone(),
                    source,
                });
            }
        }

        for (name, timer) in &hooks.timers {
            let hook_name = format!("timer:{name}");
            self.spawn_periodic(hook_name, Some(timer.interval), timer.hook.clone(), actor);
        }

        if let Some(main_loop) = &hooks.main_loop {
            let interval = main_loop.interval.unwrap_or(self.config.main_loop_interval);
            self.spawn_periodic("main_loop".to_string(), Some(interval), main_loop.hook.clone(), actor);
        }

        Ok(())
    }

    fn spawn_periodic<A>(
        &self,
        hook_name: String,
        interval: Option<Duration>,
        hook: Hook<A>,
        actor: &A,
    ) where
        A: Clone + Send + Sync + 'static,
    {
        let actor = actor.clone();
        let sink = self.sink.clone();
        let name = self.name.clone();
        let label = hook_name.clone();
        self.spawn_loop(&hook_name, interval, move |_| {
            let hook = hook.clone();
            let actor = actor.clone();
            let sink = sink.clone();
            let name = name.clone();
            let label = label.clone();
            async move {
                let outcome = catch_panic(async move { hook(actor).await }).await;
                if let Some(error) = dispatch_failure(label, outcome) {
                    sink.report(&name, &error);
                }
            }
        });
    }

    /// Cancels every loop and waits for them within the configured grace period.
    pub(crate) async fn stop(&self) -> Result<(), FrameworkError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                Phase::Running => *phase = Phase::Stopped,
                Phase::Stopped => return Ok(()),
                // Never started: nothing to join, and it may still be started later.
                Phase::Uninitialized | Phase::Ready => return Ok(()),
            }
        }

        self.shutdown.cancel();
        let mut handles = std::mem::take(&mut *self.loops.lock());
        let grace = self.config.stop_grace;
        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();

        for handle in handles.iter_mut() {
            let joined = tokio::time::timeout_at(deadline, handle.join_handle_mut()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(actor = %self.name, hook = handle.name(), error = %e, "Loop ended abnormally"),
                Err(_) => {
                    handle.abort();
                    stuck.push(handle.name().to_string());
                }
            }
        }

        if !stuck.is_empty() {
            warn!(actor = %self.name, ?stuck, "Loops exceeded stop grace period");
            return Err(FrameworkError::ShutdownTimeout {
                actor: self.name.clone(),
                grace,
                stuck,
            });
        }

        info!(actor = %self.name, loops = handles.len(), pending = self.inbox.len(), "Stopped");
        Ok(())
    }

    pub(crate) fn loop_count(&self) -> usize {
        self.loops.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TracingSink;
    use std::sync::Arc;

    fn core() -> ControllerCore {
        ControllerCore::new("core".to_string(), ActorConfig::default(), Arc::new(TracingSink))
    }

    #[test]
    fn lifecycle_transitions() {
        let core = core();
        assert!(matches!(core.begin_run(), Err(FrameworkError::Unbound(_))));

        core.mark_bound().unwrap();
        assert!(matches!(core.mark_bound(), Err(FrameworkError::AlreadyBound(_))));
        assert_eq!(core.phase(), Phase::Ready);

        core.begin_run().unwrap();
        assert_eq!(core.phase(), Phase::Running);
        assert!(matches!(core.begin_run(), Err(FrameworkError::AlreadyRunning(_))));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_joins_loops() {
        let core = core();
        core.stop().await.unwrap();
        assert_eq!(core.phase(), Phase::Uninitialized);

        core.mark_bound().unwrap();
        core.begin_run().unwrap();
        core.spawn_loop("spin", None, |_| async {});
        core.spawn_loop("tick", Some(Duration::from_millis(5)), |_| async {});
        assert_eq!(core.loop_count(), 2);

        core.stop().await.unwrap();
        assert_eq!(core.phase(), Phase::Stopped);
        assert_eq!(core.loop_count(), 0);
        core.stop().await.unwrap();
    }

    #[test]
    fn dispatch_failure_distinguishes_errors_and_panics() {
        assert!(dispatch_failure("main_loop".into(), Ok(Ok(()))).is_none());

        let failed = dispatch_failure("main_loop".into(), Ok(Err("bus off".into()))).unwrap();
        assert_eq!(failed.as_label(), "hook_failed");

        let panicked = dispatch_failure("main_loop".into(), Err("boom".into())).unwrap();
        assert_eq!(panicked.to_string(), "hook `main_loop` panicked: boom");
    }
}
