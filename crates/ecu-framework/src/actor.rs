//! # Module Actor Trait
//!
//! The router drives modules of different state types side by side, so it can't
//! hold them as `Module<S>`. [`ModuleActor`] is the object-safe face every module
//! shows the router: identity, inbox access, receiver registration, lifecycle.
//!
//! [`Module<S>`](crate::Module) implements it for every `S`; applications rarely
//! need to implement it themselves.

use crate::controller::Phase;
use crate::error::FrameworkError;
use crate::job::{Job, ModuleType};
use crate::router::Receiver;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared reference to a registered module, as held by the router.
pub type ModuleRef = Arc<dyn ModuleActor>;

#[async_trait]
pub trait ModuleActor: Send + Sync + 'static {
    /// Unique name of this module instance (e.g. `"sensor-1"`).
    fn tag(&self) -> &str;

    /// Kind of module, matched against [`Job::target`].
    fn module_type(&self) -> &ModuleType;

    /// Puts a job into the module's inbox.
    fn enqueue(&self, job: Job);

    /// Gives the module the router's receiver. Returns `false` if it already had one.
    fn register_receiver(&self, receiver: Receiver) -> bool;

    fn has_receiver(&self) -> bool;

    fn phase(&self) -> Phase;

    /// Launches the module's background loops.
    async fn start(&self) -> Result<(), FrameworkError>;

    /// Stops the module's background loops.
    async fn stop(&self) -> Result<(), FrameworkError>;
}
