//! # Capability Tables
//!
//! A registry declares, before an actor starts, which application callable answers
//! which hook. It is built with ordinary method calls, handed to the actor once,
//! and never changes again: the actor keeps it behind an `Arc` and only reads it.
//!
//! There is one registry per actor kind:
//!
//! | Hook               | [`ModuleRegistry`] | [`RouterRegistry`] |
//! |--------------------|:------------------:|:------------------:|
//! | goal solvers       | ✔                  |                    |
//! | `on_incoming_data` | ✔                  |                    |
//! | `on_receiver`      |                    | ✔                  |
//! | `assigning_job`    |                    | ✔ (required)       |
//! | timers             | ✔                  | ✔                  |
//! | `main_loop`        | ✔                  | ✔                  |
//! | `setup`            | ✔                  | ✔                  |
//!
//! Every hook is an async closure resolving to [`HookResult`]. The first argument
//! is the actor's handle ([`ModuleHandle`] or [`RouterHandle`]); job hooks also get
//! the [`Job`] by value.
//!
//! Registering the same goal, the same timer name, or the same singleton hook twice
//! fails with [`FrameworkError::DuplicateHook`].
//!
//! ```rust
//! use ecu_framework::{ModuleRegistry, Job};
//! use std::time::Duration;
//!
//! struct Thermometer;
//!
//! let registry = ModuleRegistry::<Thermometer>::new()
//!     .on_goal("read", |_module, job: Job| async move {
//!         println!("read requested by {}", job.producer());
//!         Ok(())
//!     })?
//!     .timer("poll", Duration::from_secs(2), |_module| async move { Ok(()) })?;
//!
//! assert!(registry.solver(&"read".into()).is_some());
//! assert!(ModuleRegistry::<Thermometer>::new()
//!     .on_goal("read", |_, _| async { Ok(()) })?
//!     .on_goal("READ", |_, _| async { Ok(()) })
//!     .is_err());
//! # Ok::<(), ecu_framework::FrameworkError>(())
//! ```
//!
//! [`ModuleHandle`]: crate::ModuleHandle
//! [`RouterHandle`]: crate::RouterHandle

use crate::error::{FrameworkError, HookResult};
use crate::job::{Goal, Job};
use crate::module::ModuleHandle;
use crate::router::RouterHandle;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Type-erased hook taking only the actor handle.
pub type Hook<A> = Arc<dyn Fn(A) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Type-erased hook taking the actor handle and a job.
pub type JobHook<A> = Arc<dyn Fn(A, Job) -> BoxFuture<'static, HookResult> + Send + Sync>;

fn hook<A, F, Fut>(f: F) -> Hook<A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |actor| f(actor).boxed())
}

fn job_hook<A, F, Fut>(f: F) -> JobHook<A>
where
    F: Fn(A, Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |actor, job| f(actor, job).boxed())
}

fn set_once<T>(slot: &mut Option<T>, name: &str, value: T) -> Result<(), FrameworkError> {
    if slot.is_some() {
        return Err(FrameworkError::DuplicateHook(name.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

/// A named hook that runs every `interval`.
pub struct Timer<A> {
    pub interval: Duration,
    pub hook: Hook<A>,
}

impl<A> Clone for Timer<A> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            hook: self.hook.clone(),
        }
    }
}

/// The main loop hook. `interval = None` means "use the actor's configured default".
pub struct MainLoop<A> {
    pub interval: Option<Duration>,
    pub hook: Hook<A>,
}

impl<A> Clone for MainLoop<A> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            hook: self.hook.clone(),
        }
    }
}

/// Hooks both actor kinds understand.
pub(crate) struct CommonHooks<A> {
    pub(crate) timers: BTreeMap<String, Timer<A>>,
    pub(crate) main_loop: Option<MainLoop<A>>,
    pub(crate) setup: Option<Hook<A>>,
}

impl<A> Default for CommonHooks<A> {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
            main_loop: None,
            setup: None,
        }
    }
}

impl<A: 'static> CommonHooks<A> {
    fn add_timer<F, Fut>(&mut self, name: String, interval: Duration, f: F) -> Result<(), FrameworkError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        if self.timers.contains_key(&name) {
            return Err(FrameworkError::DuplicateHook(format!("timer:{name}")));
        }
        self.timers.insert(name, Timer { interval, hook: hook(f) });
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.main_loop.is_none() && self.setup.is_none()
    }
}

/// Capability table for a module whose application state is `S`.
pub struct ModuleRegistry<S: Send + Sync + 'static> {
    pub(crate) goal_solvers: HashMap<Goal, JobHook<ModuleHandle<S>>>,
    pub(crate) on_incoming_data: Option<JobHook<ModuleHandle<S>>>,
    pub(crate) common: CommonHooks<ModuleHandle<S>>,
}

impl<S: Send + Sync + 'static> ModuleRegistry<S> {
    pub fn new() -> Self {
        Self {
            goal_solvers: HashMap::new(),
            on_incoming_data: None,
            common: CommonHooks::default(),
        }
    }

    /// Registers the solver for `goal`.
    pub fn on_goal<F, Fut>(mut self, goal: impl Into<Goal>, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(ModuleHandle<S>, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let goal = goal.into();
        if self.goal_solvers.contains_key(&goal) {
            return Err(FrameworkError::DuplicateHook(format!("goal:{goal}")));
        }
        self.goal_solvers.insert(goal, job_hook(f));
        Ok(self)
    }

    pub fn timer<F, Fut>(
        mut self,
        name: impl Into<String>,
        interval: Duration,
        f: F,
    ) -> Result<Self, FrameworkError>
    where
        F: Fn(ModuleHandle<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.common.add_timer(name.into(), interval, f)?;
        Ok(self)
    }

    pub fn main_loop<F, Fut>(mut self, interval: Option<Duration>, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(ModuleHandle<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let main_loop = MainLoop {
            interval,
            hook: hook(f),
        };
        set_once(&mut self.common.main_loop, "main_loop", main_loop)?;
        Ok(self)
    }

    /// Runs once when the module starts, before any loop is launched.
    pub fn setup<F, Fut>(mut self, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(ModuleHandle<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        set_once(&mut self.common.setup, "setup", hook(f))?;
        Ok(self)
    }

    /// Replaces the default drain behaviour (dispatch to the goal solver) with a
    /// custom hook. The hook may still call [`ModuleHandle::run_job`].
    pub fn on_incoming_data<F, Fut>(mut self, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(ModuleHandle<S>, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        set_once(&mut self.on_incoming_data, "on_incoming_data", job_hook(f))?;
        Ok(self)
    }

    pub fn solver(&self, goal: &Goal) -> Option<&JobHook<ModuleHandle<S>>> {
        self.goal_solvers.get(goal)
    }

    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.goal_solvers.keys()
    }

    pub fn timer_names(&self) -> impl Iterator<Item = &str> {
        self.common.timers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.goal_solvers.is_empty() && self.on_incoming_data.is_none() && self.common.is_empty()
    }
}

impl<S: Send + Sync + 'static> Default for ModuleRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability table for the router.
#[derive(Default)]
pub struct RouterRegistry {
    pub(crate) on_receiver: Option<JobHook<RouterHandle>>,
    pub(crate) assigning_job: Option<JobHook<RouterHandle>>,
    pub(crate) common: CommonHooks<RouterHandle>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on the sending module's task for every job a module forwards.
    /// Without it, forwarded jobs go straight into the router's inbox.
    pub fn on_receiver<F, Fut>(mut self, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(RouterHandle, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        set_once(&mut self.on_receiver, "on_receiver", job_hook(f))?;
        Ok(self)
    }

    /// Decides where each job drained from the router's inbox goes.
    pub fn assigning_job<F, Fut>(mut self, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(RouterHandle, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        set_once(&mut self.assigning_job, "assigning_job", job_hook(f))?;
        Ok(self)
    }

    pub fn timer<F, Fut>(
        mut self,
        name: impl Into<String>,
        interval: Duration,
        f: F,
    ) -> Result<Self, FrameworkError>
    where
        F: Fn(RouterHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.common.add_timer(name.into(), interval, f)?;
        Ok(self)
    }

    pub fn main_loop<F, Fut>(mut self, interval: Option<Duration>, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(RouterHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let main_loop = MainLoop {
            interval,
            hook: hook(f),
        };
        set_once(&mut self.common.main_loop, "main_loop", main_loop)?;
        Ok(self)
    }

    pub fn setup<F, Fut>(mut self, f: F) -> Result<Self, FrameworkError>
    where
        F: Fn(RouterHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        set_once(&mut self.common.setup, "setup", hook(f))?;
        Ok(self)
    }

    pub fn has_assigning_job(&self) -> bool {
        self.assigning_job.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.on_receiver.is_none() && self.assigning_job.is_none() && self.common.is_empty()
    }
}
