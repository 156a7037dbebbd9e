//! # Modules
//!
//! A [`Module`] is a worker actor. It owns:
//!
//! - a [`ModuleController`] holding its priority inbox and its background loops,
//! - the application state `S` (the "actor instance" every hook receives, wrapped
//!   in a [`ModuleHandle`]),
//! - its [`ModuleRegistry`], frozen once bound,
//! - at most one [`Receiver`], handed over by the router at registration.
//!
//! When started, a module runs its `setup` hook, then launches:
//!
//! - the **drain loop**: waits for a job, then gives it to `on_incoming_data` or,
//!   if that hook isn't registered, to the solver registered for the job's goal;
//! - one loop per **timer**;
//! - the **main loop**, if any.
//!
//! ```rust
//! use ecu_framework::{Job, Module, ModuleRegistry};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Counter {
//!     reads: AtomicUsize,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModuleRegistry::<Counter>::new().on_goal("read", |module, _job| async move {
//!         module.state().reads.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     })?;
//!
//!     let module = Module::new("counter-1", "counter", Counter::default(), registry)?;
//!     module.start().await?;
//!     module.enqueue(Job::new("read", "doc"));
//!
//!     while module.handle().state().reads.load(Ordering::SeqCst) == 0 {
//!         tokio::task::yield_now().await;
//!     }
//!     module.stop().await?;
//!     Ok(())
//! }
//! ```

use crate::actor::{ModuleActor, ModuleRef};
use crate::config::ActorConfig;
use crate::controller::{ControllerCore, Phase};
use crate::error::{DispatchError, FrameworkError};
use crate::job::{Job, ModuleType};
use crate::looped::catch_panic;
use crate::registry::ModuleRegistry;
use crate::router::Receiver;
use crate::sink::{default_sink, ErrorSink, SharedSink};
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Outcome of [`ModuleHandle::send_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the router's receiver.
    Forwarded,
    /// The module has no receiver; the job was dropped.
    NoReceiver,
}

struct Bound<S: Send + Sync + 'static> {
    state: S,
    registry: Arc<ModuleRegistry<S>>,
}

struct ModuleShared<S: Send + Sync + 'static> {
    tag: String,
    module_type: ModuleType,
    core: ControllerCore,
    bound: OnceLock<Arc<Bound<S>>>,
    receiver: OnceLock<Receiver>,
}

/// The module side of the dispatch engine: inbox, registry binding, receiver, loops.
pub struct ModuleController<S: Send + Sync + 'static> {
    shared: Arc<ModuleShared<S>>,
}

impl<S: Send + Sync + 'static> ModuleController<S> {
    pub fn new(tag: impl Into<String>, module_type: impl Into<ModuleType>) -> Self {
        Self::with_settings(tag, module_type, ActorConfig::default(), default_sink())
    }

    pub fn with_settings(
        tag: impl Into<String>,
        module_type: impl Into<ModuleType>,
        config: ActorConfig,
        sink: SharedSink,
    ) -> Self {
        let tag = tag.into();
        Self {
            shared: Arc::new(ModuleShared {
                core: ControllerCore::new(tag.clone(), config, sink),
                tag,
                module_type: module_type.into(),
                bound: OnceLock::new(),
                receiver: OnceLock::new(),
            }),
        }
    }

    /// Binds the registry and the application state. One-time.
    pub fn bind(&self, registry: ModuleRegistry<S>, state: S) -> Result<(), FrameworkError> {
        self.shared.core.mark_bound()?;
        let bound = Arc::new(Bound {
            state,
            registry: Arc::new(registry),
        });
        if self.shared.bound.set(bound).is_err() {
            return Err(FrameworkError::AlreadyBound(self.shared.tag.clone()));
        }
        Ok(())
    }

    pub fn tag(&self) -> &str {
        &self.shared.tag
    }

    pub fn module_type(&self) -> &ModuleType {
        &self.shared.module_type
    }

    pub fn phase(&self) -> Phase {
        self.shared.core.phase()
    }

    pub fn pending(&self) -> usize {
        self.shared.core.inbox().len()
    }

    pub fn enqueue(&self, job: Job) {
        self.shared.core.enqueue(job);
    }

    /// Stores the router's receiver. Only the first call has an effect; later calls
    /// return `false` and leave the first receiver in place.
    pub fn register_receiver(&self, receiver: Receiver) -> bool {
        let router = receiver.router_name().to_string();
        match self.shared.receiver.set(receiver) {
            Ok(()) => {
                debug!(module = %self.shared.tag, %router, "Receiver registered");
                true
            }
            Err(_) => {
                warn!(module = %self.shared.tag, %router, "Receiver already registered, ignoring");
                false
            }
        }
    }

    pub fn has_receiver(&self) -> bool {
        self.shared.receiver.get().is_some()
    }

    /// Returns the handle hooks receive. Fails before `bind`.
    pub fn handle(&self) -> Result<ModuleHandle<S>, FrameworkError> {
        let bound = self
            .shared
            .bound
            .get()
            .ok_or_else(|| FrameworkError::Unbound(self.shared.tag.clone()))?;
        Ok(ModuleHandle {
            shared: self.shared.clone(),
            bound: bound.clone(),
        })
    }

    /// Runs `setup` and launches the drain loop, timers and main loop.
    /// Returns as soon as everything is launched.
    pub async fn run(&self) -> Result<(), FrameworkError> {
        let handle = self.handle()?;
        let registry = handle.bound.registry.clone();
        if registry.is_empty() {
            return Err(FrameworkError::EmptyRegistry(self.shared.tag.clone()));
        }
        self.shared.core.begin_run()?;

        self.shared.core.start_common(&registry.common, &handle).await?;

        let drains = registry.on_incoming_data.is_some() || !registry.goal_solvers.is_empty();
        if drains {
            let drain_handle = handle.clone();
            self.shared.core.spawn_loop("on_incoming_data", None, move |token| {
                let module = drain_handle.clone();
                async move {
                    let job = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        job = module.shared.core.inbox().pop() => job,
                    };
                    let hook = module.drain_hook(&job);
                    match catch_panic(module.on_incoming(job)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => module.report(&e),
                        Err(message) => module.report(&DispatchError::HookPanicked { hook, message }),
                    }
                }
            });
        }

        info!(
            module = %self.shared.tag,
            module_type = %self.shared.module_type,
            goals = registry.goal_solvers.len(),
            timers = registry.common.timers.len(),
            loops = self.shared.core.loop_count(),
            "Module started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), FrameworkError> {
        self.shared.core.stop().await
    }
}

/// What hooks receive as their first argument: access to the module's state and
/// the module's outbound path. Cheap to clone.
pub struct ModuleHandle<S: Send + Sync + 'static> {
    shared: Arc<ModuleShared<S>>,
    bound: Arc<Bound<S>>,
}

impl<S: Send + Sync + 'static> Clone for ModuleHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            bound: self.bound.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> fmt::Debug for ModuleHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("tag", &self.shared.tag)
            .field("module_type", &self.shared.module_type)
            .finish()
    }
}

impl<S: Send + Sync + 'static> ModuleHandle<S> {
    pub fn state(&self) -> &S {
        &self.bound.state
    }

    pub fn tag(&self) -> &str {
        &self.shared.tag
    }

    pub fn module_type(&self) -> &ModuleType {
        &self.shared.module_type
    }

    /// Puts a job into this module's own inbox.
    pub fn enqueue(&self, job: Job) {
        self.shared.core.enqueue(job);
    }

    /// Sends a job to the router. Without a receiver the job is dropped.
    pub async fn send_job(&self, job: Job) -> Result<Delivery, DispatchError> {
        match self.shared.receiver.get() {
            Some(receiver) => {
                debug!(module = %self.shared.tag, goal = %job.goal(), "Sending job");
                receiver.forward(job).await?;
                Ok(Delivery::Forwarded)
            }
            None => {
                debug!(module = %self.shared.tag, goal = %job.goal(), "No receiver, job dropped");
                Ok(Delivery::NoReceiver)
            }
        }
    }

    /// Gives `job` to the solver registered for its goal.
    pub async fn run_job(&self, job: Job) -> Result<(), DispatchError> {
        let Some(solver) = self.bound.registry.solver(job.goal()) else {
            return Err(DispatchError::MissingHandler {
                goal: job.goal().clone(),
                producer: job.producer().to_string(),
            });
        };
        let goal = job.goal().clone();
        debug!(module = %self.shared.tag, %goal, producer = job.producer(), "Solving");
        solver(self.clone(), job)
            .await
            .map_err(|source| DispatchError::hook(format!("goal:{goal}"), source))
    }

    fn drain_hook(&self, job: &Job) -> String {
        match self.bound.registry.on_incoming_data {
            Some(_) => "on_incoming_data".to_string(),
            None => format!("goal:{}", job.goal()),
        }
    }

    async fn on_incoming(&self, job: Job) -> Result<(), DispatchError> {
        match &self.bound.registry.on_incoming_data {
            Some(hook) => hook(self.clone(), job)
                .await
                .map_err(|source| DispatchError::hook("on_incoming_data", source)),
            None => self.run_job(job).await,
        }
    }

    /// Reports a failure through the module's error sink.
    pub fn report(&self, error: &DispatchError) {
        self.shared.core.report(error);
    }
}

/// A worker actor: a controller bound to a registry and application state.
pub struct Module<S: Send + Sync + 'static> {
    controller: ModuleController<S>,
    handle: ModuleHandle<S>,
}

impl<S: Send + Sync + 'static> Module<S> {
    /// Creates a module with default configuration and the tracing error sink.
    pub fn new(
        tag: impl Into<String>,
        module_type: impl Into<ModuleType>,
        state: S,
        registry: ModuleRegistry<S>,
    ) -> Result<Self, FrameworkError> {
        Self::builder(tag, module_type).build(state, registry)
    }

    pub fn builder(tag: impl Into<String>, module_type: impl Into<ModuleType>) -> ModuleBuilder<S> {
        ModuleBuilder {
            tag: tag.into(),
            module_type: module_type.into(),
            config: ActorConfig::default(),
            sink: default_sink(),
            state: PhantomData,
        }
    }

    pub fn controller(&self) -> &ModuleController<S> {
        &self.controller
    }

    pub fn handle(&self) -> ModuleHandle<S> {
        self.handle.clone()
    }

    pub fn enqueue(&self, job: Job) {
        self.controller.enqueue(job);
    }

    /// Type-erases the module so a router can hold it next to modules of other state types.
    pub fn into_ref(self) -> ModuleRef {
        Arc::new(self)
    }

    pub async fn start(&self) -> Result<(), FrameworkError> {
        info!(module = %self.controller.tag(), "Module starting");
        self.controller.run().await
    }

    pub async fn stop(&self) -> Result<(), FrameworkError> {
        self.controller.stop().await
    }
}

/// Builder for modules that need a non-default configuration or error sink.
pub struct ModuleBuilder<S> {
    tag: String,
    module_type: ModuleType,
    config: ActorConfig,
    sink: SharedSink,
    state: PhantomData<fn() -> S>,
}

impl<S: Send + Sync + 'static> ModuleBuilder<S> {
    pub fn config(mut self, config: ActorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn error_sink(mut self, sink: impl ErrorSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn shared_error_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self, state: S, registry: ModuleRegistry<S>) -> Result<Module<S>, FrameworkError> {
        let controller =
            ModuleController::with_settings(self.tag, self.module_type, self.config, self.sink);
        controller.bind(registry, state)?;
        let handle = controller.handle()?;
        Ok(Module { controller, handle })
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> ModuleActor for Module<S> {
    fn tag(&self) -> &str {
        self.controller.tag()
    }

    fn module_type(&self) -> &ModuleType {
        self.controller.module_type()
    }

    fn enqueue(&self, job: Job) {
        self.controller.enqueue(job);
    }

    fn register_receiver(&self, receiver: Receiver) -> bool {
        self.controller.register_receiver(receiver)
    }

    fn has_receiver(&self) -> bool {
        self.controller.has_receiver()
    }

    fn phase(&self) -> Phase {
        self.controller.phase()
    }

    async fn start(&self) -> Result<(), FrameworkError> {
        Module::start(self).await
    }

    async fn stop(&self) -> Result<(), FrameworkError> {
        Module::stop(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;
    use crate::mock::{CallCounter, RecordingSink};
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        reads: CallCounter,
    }

    fn read_registry() -> ModuleRegistry<Probe> {
        ModuleRegistry::new()
            .on_goal("read", |module: ModuleHandle<Probe>, _job| async move {
                module.state().reads.hit();
                Ok(())
            })
            .unwrap()
    }

    #[tokio::test]
    async fn bind_is_one_time() {
        let controller = ModuleController::<Probe>::new("probe-1", "probe");
        assert_eq!(controller.phase(), Phase::Uninitialized);
        assert!(matches!(controller.handle(), Err(FrameworkError::Unbound(_))));
        assert!(matches!(controller.run().await, Err(FrameworkError::Unbound(_))));

        controller.bind(read_registry(), Probe::default()).unwrap();
        assert_eq!(controller.phase(), Phase::Ready);

        let err = controller.bind(read_registry(), Probe::default()).unwrap_err();
        assert!(matches!(err, FrameworkError::AlreadyBound(_)));
    }

    #[tokio::test]
    async fn empty_registry_refuses_to_run() {
        let module = Module::new("idle", "probe", Probe::default(), ModuleRegistry::new()).unwrap();
        let err = module.start().await.unwrap_err();
        assert!(matches!(err, FrameworkError::EmptyRegistry(_)));
    }

    #[tokio::test]
    async fn run_twice_fails() {
        let module = Module::new("probe-1", "probe", Probe::default(), read_registry()).unwrap();
        module.start().await.unwrap();
        assert!(matches!(module.start().await, Err(FrameworkError::AlreadyRunning(_))));
        module.stop().await.unwrap();
        assert_eq!(module.controller().phase(), Phase::Stopped);
        assert!(matches!(module.start().await, Err(FrameworkError::AlreadyRunning(_))));
    }

    #[tokio::test]
    async fn run_job_reports_missing_handler() {
        let module = Module::new("probe-1", "probe", Probe::default(), read_registry()).unwrap();
        let err = module
            .handle()
            .run_job(Job::new("calibrate", "tester"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingHandler { ref goal, .. } if goal.as_str() == "calibrate"));

        module.handle().run_job(Job::new("READ", "tester")).await.unwrap();
        assert_eq!(module.handle().state().reads.count(), 1);
    }

    #[tokio::test]
    async fn unknown_goal_is_dropped_and_the_loop_continues() {
        let sink = RecordingSink::new();
        let module = Module::builder("probe-1", "probe")
            .error_sink(sink.clone())
            .build(Probe::default(), read_registry())
            .unwrap();
        module.start().await.unwrap();

        module.enqueue(Job::new("calibrate", "tester"));
        module.enqueue(Job::new("read", "tester").with_priority(5));

        let state = module.handle();
        state.state().reads.wait_for(1, Duration::from_secs(1)).await;
        assert_eq!(sink.labels(), ["missing_handler"]);
        assert_eq!(sink.actors(), ["probe-1"]);

        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn solver_error_goes_to_the_sink() {
        let sink = RecordingSink::new();
        let registry = ModuleRegistry::<Probe>::new()
            .on_goal("read", |module: ModuleHandle<Probe>, job: Job| async move {
                module.state().reads.hit();
                if job.priority() == 0 {
                    return Err(HookError::from("sensor not ready"));
                }
                Ok(())
            })
            .unwrap();
        let module = Module::builder("probe-1", "probe")
            .error_sink(sink.clone())
            .build(Probe::default(), registry)
            .unwrap();
        module.start().await.unwrap();

        module.enqueue(Job::new("read", "tester").with_priority(0));
        module.enqueue(Job::new("read", "tester").with_priority(1));
        module.handle().state().reads.wait_for(2, Duration::from_secs(1)).await;

        assert_eq!(sink.labels(), ["hook_failed"]);
        assert!(sink.messages()[0].contains("sensor not ready"));
        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn panicking_solver_is_reported_and_the_loop_continues() {
        let sink = RecordingSink::new();
        let registry = ModuleRegistry::<Probe>::new()
            .on_goal("read", |module: ModuleHandle<Probe>, job: Job| async move {
                module.state().reads.hit();
                if job.priority() == 0 {
                    panic!("adc returned garbage");
                }
                Ok(())
            })
            .unwrap();
        let module = Module::builder("probe-1", "probe")
            .error_sink(sink.clone())
            .build(Probe::default(), registry)
            .unwrap();
        module.start().await.unwrap();

        module.enqueue(Job::new("read", "tester").with_priority(0));
        module.enqueue(Job::new("read", "tester").with_priority(1));
        module.handle().state().reads.wait_for(2, Duration::from_secs(1)).await;

        assert_eq!(sink.labels(), ["hook_panicked"]);
        assert_eq!(sink.messages(), ["hook `goal:read` panicked: adc returned garbage"]);
        module.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_timer_is_reported_and_keeps_ticking() {
        let sink = RecordingSink::new();
        let registry = read_registry()
            .timer("poll", Duration::from_millis(10), |module: ModuleHandle<Probe>| async move {
                module.state().reads.hit();
                if module.state().reads.count() == 1 {
                    panic!("poll glitch");
                }
                Ok(())
            })
            .unwrap();
        let module = Module::builder("probe-1", "probe")
            .error_sink(sink.clone())
            .build(Probe::default(), registry)
            .unwrap();
        module.start().await.unwrap();

        module.handle().state().reads.wait_for(3, Duration::from_secs(1)).await;
        assert_eq!(sink.labels(), ["hook_panicked"]);
        assert_eq!(sink.actors(), ["probe-1"]);
        assert!(sink.messages()[0].contains("timer:poll"));
        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn on_incoming_data_replaces_default_dispatch() {
        let seen = CallCounter::default();
        let registry = ModuleRegistry::<CallCounter>::new()
            .on_incoming_data(|module: ModuleHandle<CallCounter>, _job| async move {
                module.state().hit();
                Ok(())
            })
            .unwrap();
        let module = Module::new("raw", "probe", seen, registry).unwrap();
        module.start().await.unwrap();

        module.enqueue(Job::new("anything", "tester"));
        module.enqueue(Job::new("else", "tester"));
        module.handle().state().wait_for(2, Duration::from_secs(1)).await;
        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn send_job_without_receiver_is_a_no_op() {
        let module = Module::new("probe-1", "probe", Probe::default(), read_registry()).unwrap();
        assert!(!module.controller().has_receiver());
        let delivery = module.handle().send_job(Job::new("read", "probe-1")).await.unwrap();
        assert_eq!(delivery, Delivery::NoReceiver);
    }

    #[tokio::test]
    async fn setup_failure_aborts_start() {
        let registry = read_registry().setup(|_| async { Err(HookError::from("no i2c bus")) }).unwrap();
        let module = Module::new("probe-1", "probe", Probe::default(), registry).unwrap();
        let err = module.start().await.unwrap_err();
        assert!(matches!(err, FrameworkError::SetupFailed { .. }));
        assert_eq!(module.controller().phase(), Phase::Stopped);
        module.stop().await.unwrap();
    }
}
