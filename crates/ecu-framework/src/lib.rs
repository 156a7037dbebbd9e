//! # ECU Framework
//!
//! An actor-style message bus for independently running **modules** (worker units,
//! e.g. the sensor handlers of an embedded controller) that exchange prioritized
//! [`Job`]s through a central router, the [`Mcu`], without knowing about each other.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────── Mcu ────────────────────────┐
//!                 │  inbox ──drain──▶ assigning_job ──module_by_target──┼──┐
//!                 └──────▲──────────────────────────────────────────────┘  │
//!                        │ Receiver (on_receiver)                          │ enqueue
//!   ┌──── Module A ──────┴───┐                              ┌──── Module B ▼─────────┐
//!   │ solver ──send_job──────┘                              │ inbox ──drain──▶ solver │
//!   └────────────────────────┘                              └─────────────────────────┘
//! ```
//!
//! The framework is split into small layers:
//!
//! 1. **Job model** ([`Job`], [`Goal`], [`ModuleType`]) - the message envelope.
//!    Jobs order by priority only; lower value wins.
//! 2. **Capability tables** ([`ModuleRegistry`], [`RouterRegistry`]) - which async
//!    closure answers which hook. Built once, frozen when bound.
//! 3. **Dispatch engine** ([`Inbox`], [`looped`], [`ModuleController`],
//!    [`McuController`]) - priority inboxes drained by background loops.
//! 4. **Actors** ([`Module`], [`Mcu`]) - lifecycle: register, start, stop.
//!
//! ## Concurrency Model
//!
//! - Every hook an actor runs (drain loop, each timer, main loop) gets its own Tokio task
//! - Within one inbox, jobs leave lowest priority value first, then oldest first
//! - There is no ordering across inboxes
//! - `stop()` cancels an actor's loops through a shared `CancellationToken` and joins them
//!
//! ## Failures
//!
//! Configuration mistakes surface as [`FrameworkError`] from `bind`, `run`, `start`
//! and `register_modules`. Per-job failures ([`DispatchError`]) never stop a loop:
//! they go to the actor's [`ErrorSink`], which logs them by default.
//!
//! ## Testing
//!
//! The [`mock`] module provides a recording error sink and a call counter that let
//! tests wait for hooks instead of sleeping.

pub mod actor;
pub mod config;
mod controller;
pub mod error;
pub mod inbox;
pub mod job;
pub mod looped;
pub mod mock;
pub mod module;
pub mod registry;
pub mod router;
pub mod sink;
pub mod tracing;

#[doc(hidden)]
pub mod __private {
    pub use paste::paste;
}

pub use actor::{ModuleActor, ModuleRef};
pub use config::ActorConfig;
pub use controller::Phase;
pub use error::{DispatchError, FrameworkError, HookError, HookResult};
pub use inbox::Inbox;
pub use job::{Goal, Job, ModuleType, Subscription, DEFAULT_PRIORITY};
pub use looped::{looped, looped_with, LoopHandle};
pub use module::{Delivery, Module, ModuleBuilder, ModuleController, ModuleHandle};
pub use registry::{Hook, JobHook, MainLoop, ModuleRegistry, RouterRegistry, Timer};
pub use router::{Mcu, McuBuilder, McuController, Receiver, RouterHandle};
pub use sink::{ErrorSink, SharedSink, TracingSink};
