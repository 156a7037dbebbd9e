//! # Router
//!
//! The [`Mcu`] is the central actor. Modules never talk to each other directly:
//! they forward jobs through the [`Receiver`] the router handed them, the router
//! drains its own inbox, and its `assigning_job` hook decides which module gets
//! each job.
//!
//! ```text
//!  module A ──send_job──▶ Receiver ──on_receiver──▶ router inbox
//!                                                       │ drain loop
//!                                                       ▼
//!                                               assigning_job(router, job)
//!                                                       │ module_by_target(..).enqueue(job)
//!                                                       ▼
//!                                                 module B inbox ──▶ solver
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ecu_framework::{Job, Mcu, Module, ModuleRegistry, RouterRegistry};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = RouterRegistry::new().assigning_job(|router, job| async move {
//!         router.route_by_target(job);
//!         Ok(())
//!     })?;
//!     let mcu = Mcu::new("mcu", router)?;
//!
//!     let solved = Arc::new(AtomicBool::new(false));
//!     let flag = solved.clone();
//!     let sensor = ModuleRegistry::<()>::new().on_goal("read", move |_, _| {
//!         let flag = flag.clone();
//!         async move {
//!             flag.store(true, Ordering::SeqCst);
//!             Ok(())
//!         }
//!     })?;
//!     mcu.register_modules([Module::new("sensor-1", "sensor", (), sensor)?.into_ref()])?;
//!
//!     mcu.start().await?;
//!     mcu.enqueue(Job::new("read", "doc").with_target("sensor"));
//!     while !solved.load(Ordering::SeqCst) {
//!         tokio::task::yield_now().await;
//!     }
//!     mcu.stop().await?;
//!     Ok(())
//! }
//! ```

use crate::actor::ModuleRef;
use crate::config::ActorConfig;
use crate::controller::{dispatch_failure, ControllerCore, Phase};
use crate::error::{DispatchError, FrameworkError};
use crate::job::{Job, ModuleType};
use crate::looped::catch_panic;
use crate::registry::{JobHook, RouterRegistry};
use crate::sink::{default_sink, ErrorSink, SharedSink};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, info, warn};

struct McuShared {
    name: String,
    core: ControllerCore,
    registry: OnceLock<Arc<RouterRegistry>>,
    modules: RwLock<Vec<ModuleRef>>,
}

/// The router as its hooks see it. Cheap to clone.
#[derive(Clone)]
pub struct RouterHandle {
    shared: Arc<McuShared>,
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle")
            .field("name", &self.shared.name)
            .field("modules", &self.shared.modules.read().len())
            .finish()
    }
}

impl RouterHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Puts a job into the router's inbox.
    pub fn enqueue(&self, job: Job) {
        self.shared.core.enqueue(job);
    }

    pub fn pending(&self) -> usize {
        self.shared.core.inbox().len()
    }

    /// First registered module whose type is `target`, in registration order.
    pub fn module_by_target(&self, target: &ModuleType) -> Option<ModuleRef> {
        self.shared
            .modules
            .read()
            .iter()
            .find(|module| module.module_type() == target)
            .cloned()
    }

    pub fn module(&self, tag: &str) -> Option<ModuleRef> {
        self.shared
            .modules
            .read()
            .iter()
            .find(|module| module.tag() == tag)
            .cloned()
    }

    pub fn modules(&self) -> Vec<ModuleRef> {
        self.shared.modules.read().clone()
    }

    /// Enqueues `job` into the first module matching its target. Returns the tag of
    /// the module that received it, or `None` if the job was dropped.
    pub fn route_by_target(&self, job: Job) -> Option<String> {
        let Some(target) = job.target() else {
            debug!(router = %self.shared.name, goal = %job.goal(), "Job has no target, dropped");
            return None;
        };
        match self.module_by_target(target) {
            Some(module) => {
                let tag = module.tag().to_string();
                debug!(router = %self.shared.name, goal = %job.goal(), %target, module = %tag, "Assigned");
                module.enqueue(job);
                Some(tag)
            }
            None => {
                debug!(router = %self.shared.name, goal = %job.goal(), %target, "No module for target, dropped");
                None
            }
        }
    }

    /// Reports a failure through the router's error sink.
    pub fn report(&self, error: &DispatchError) {
        self.shared.core.report(error);
    }
}

/// Forwarding handle the router gives every module it registers.
///
/// Holds the router weakly: modules never keep a stopped router alive.
#[derive(Clone)]
pub struct Receiver {
    router: Weak<McuShared>,
    router_name: String,
    on_receiver: Option<JobHook<RouterHandle>>,
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("router", &self.router_name)
            .field("on_receiver", &self.on_receiver.is_some())
            .finish()
    }
}

impl Receiver {
    pub fn router_name(&self) -> &str {
        &self.router_name
    }

    /// Hands `job` to the router: through `on_receiver` if registered, otherwise
    /// straight into the router's inbox.
    pub async fn forward(&self, job: Job) -> Result<(), DispatchError> {
        let Some(shared) = self.router.upgrade() else {
            debug!(router = %self.router_name, goal = %job.goal(), "Router gone, job dropped");
            return Ok(());
        };
        let router = RouterHandle { shared };
        match &self.on_receiver {
            Some(hook) => hook(router, job)
                .await
                .map_err(|source| DispatchError::hook("on_receiver", source)),
            None => {
                router.enqueue(job);
                Ok(())
            }
        }
    }
}

/// The router side of the dispatch engine.
pub struct McuController {
    shared: Arc<McuShared>,
}

impl McuController {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, ActorConfig::default(), default_sink())
    }

    pub fn with_settings(name: impl Into<String>, config: ActorConfig, sink: SharedSink) -> Self {
        let name = name.into();
        Self {
            shared: Arc::new(McuShared {
                core: ControllerCore::new(name.clone(), config, sink),
                name,
                registry: OnceLock::new(),
                modules: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Binds the router registry. One-time.
    pub fn bind(&self, registry: RouterRegistry) -> Result<(), FrameworkError> {
        self.shared.core.mark_bound()?;
        if self.shared.registry.set(Arc::new(registry)).is_err() {
            return Err(FrameworkError::AlreadyBound(self.shared.name.clone()));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn phase(&self) -> Phase {
        self.shared.core.phase()
    }

    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn enqueue(&self, job: Job) {
        self.shared.core.enqueue(job);
    }

    /// Builds the receiver handed to modules. Fails before `bind`.
    pub fn receiver(&self) -> Result<Receiver, FrameworkError> {
        let registry = self.registry()?;
        Ok(Receiver {
            router: Arc::downgrade(&self.shared),
            router_name: self.shared.name.clone(),
            on_receiver: registry.on_receiver.clone(),
        })
    }

    pub fn add_module(&self, module: ModuleRef) {
        self.shared.modules.write().push(module);
    }

    pub fn modules(&self) -> Vec<ModuleRef> {
        self.shared.modules.read().clone()
    }

    pub fn module_by_target(&self, target: &ModuleType) -> Option<ModuleRef> {
        self.handle().module_by_target(target)
    }

    fn registry(&self) -> Result<Arc<RouterRegistry>, FrameworkError> {
        self.shared
            .registry
            .get()
            .cloned()
            .ok_or_else(|| FrameworkError::Unbound(self.shared.name.clone()))
    }

    /// Runs `setup` and launches the dispatch loop, timers and main loop.
    pub async fn run(&self) -> Result<(), FrameworkError> {
        let registry = self.registry()?;
        let Some(assigning_job) = registry.assigning_job.clone() else {
            return Err(FrameworkError::MissingHook {
                actor: self.shared.name.clone(),
                hook: "assigning_job",
            });
        };
        self.shared.core.begin_run()?;

        let handle = self.handle();
        self.shared.core.start_common(&registry.common, &handle).await?;

        let drain_handle = handle.clone();
        self.shared.core.spawn_loop("assigning_job", None, move |token| {
            let router = drain_handle.clone();
            let assigning_job = assigning_job.clone();
            async move {
                let job = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    job = router.shared.core.inbox().pop() => job,
                };
                debug!(router = %router.shared.name, goal = %job.goal(), priority = job.priority(), "Dispatching");
                let outcome = catch_panic(assigning_job(router.clone(), job)).await;
                if let Some(error) = dispatch_failure("assigning_job".to_string(), outcome) {
                    router.report(&error);
                }
            }
        });

        info!(
            router = %self.shared.name,
            modules = self.shared.modules.read().len(),
            loops = self.shared.core.loop_count(),
            "Router started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), FrameworkError> {
        self.shared.core.stop().await
    }
}

/// The central actor: a router controller plus the modules registered with it.
pub struct Mcu {
    controller: McuController,
}

impl Mcu {
    pub fn new(name: impl Into<String>, registry: RouterRegistry) -> Result<Self, FrameworkError> {
        Self::builder(name).build(registry)
    }

    pub fn builder(name: impl Into<String>) -> McuBuilder {
        McuBuilder {
            name: name.into(),
            config: ActorConfig::default(),
            sink: default_sink(),
        }
    }

    pub fn name(&self) -> &str {
        self.controller.name()
    }

    pub fn controller(&self) -> &McuController {
        &self.controller
    }

    pub fn handle(&self) -> RouterHandle {
        self.controller.handle()
    }

    /// Pushes a job straight into the router's inbox.
    pub fn enqueue(&self, job: Job) {
        self.controller.enqueue(job);
    }

    pub fn modules(&self) -> Vec<ModuleRef> {
        self.controller.modules()
    }

    /// Registers modules and gives each the router's receiver.
    ///
    /// The same module passed twice is registered once. Nothing is registered, and
    /// [`FrameworkError::DuplicateModule`] is returned, if a module is already
    /// registered (here or with another router) or two distinct modules share a tag.
    pub fn register_modules(
        &self,
        modules: impl IntoIterator<Item = ModuleRef>,
    ) -> Result<(), FrameworkError> {
        match self.controller.phase() {
            Phase::Running => return Err(FrameworkError::AlreadyRunning(self.name().to_string())),
            Phase::Stopped => return Err(FrameworkError::Stopped(self.name().to_string())),
            Phase::Uninitialized | Phase::Ready => {}
        }
        let receiver = self.controller.receiver()?;
        let handle = self.controller.handle();

        let mut candidates: Vec<ModuleRef> = Vec::new();
        for module in modules {
            match candidates.iter().find(|seen| seen.tag() == module.tag()) {
                Some(seen) if Arc::ptr_eq(seen, &module) => {}
                Some(_) => return Err(FrameworkError::DuplicateModule(module.tag().to_string())),
                None => candidates.push(module),
            }
        }

        for module in &candidates {
            if handle.module(module.tag()).is_some() || module.has_receiver() {
                return Err(FrameworkError::DuplicateModule(module.tag().to_string()));
            }
        }

        for module in candidates {
            module.register_receiver(receiver.clone());
            info!(router = %self.name(), module = module.tag(), module_type = %module.module_type(), "Module registered");
            self.controller.add_module(module);
        }
        Ok(())
    }

    /// Starts the router's own loops, then every registered module in order.
    ///
    /// If any module fails to start, the router and the modules already started
    /// are stopped again before the error is returned.
    pub async fn start(&self) -> Result<(), FrameworkError> {
        info!(router = %self.name(), "Modules starting");
        self.controller.run().await?;

        let modules = self.controller.modules();
        if modules.is_empty() {
            warn!(router = %self.name(), "No module to start");
        }
        for (started, module) in modules.iter().enumerate() {
            if let Err(e) = module.start().await {
                error!(router = %self.name(), module = module.tag(), error = %e, "Module failed to start, aborting");
                self.abort_start(&modules[..started]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn abort_start(&self, started: &[ModuleRef]) {
        if let Err(e) = self.controller.stop().await {
            warn!(router = %self.name(), error = %e, "Router stop failed");
        }
        for module in started.iter().rev() {
            if let Err(e) = module.stop().await {
                warn!(router = %self.name(), module = module.tag(), error = %e, "Module stop failed");
            }
        }
    }

    /// Stops the router, then every module. Returns the first error encountered.
    pub async fn stop(&self) -> Result<(), FrameworkError> {
        info!(router = %self.name(), "Shutting down");
        let mut first_error = self.controller.stop().await.err();

        for module in self.controller.modules() {
            if let Err(e) = module.stop().await {
                warn!(router = %self.name(), module = module.tag(), error = %e, "Module stop failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(router = %self.name(), "Shutdown complete");
                Ok(())
            }
        }
    }
}

/// Builder for routers that need a non-default configuration or error sink.
pub struct McuBuilder {
    name: String,
    config: ActorConfig,
    sink: SharedSink,
}

impl McuBuilder {
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

    pub fn build(self, registry: RouterRegistry) -> Result<Mcu, FrameworkError> {
        let controller = McuController::with_settings(self.name, self.config, self.sink);
        controller.bind(registry)?;
        Ok(Mcu { controller })
    }
}
