//! # Observability & Tracing
//!
//! Every actor logs through the `tracing` crate with structured fields instead of
//! formatted strings: modules use `module`/`module_type`, the router uses `router`,
//! and dispatch events carry `goal`, `producer` and `priority`.
//!
//! ## Levels
//!
//! - `info`: lifecycle (started, registered, stopped)
//! - `warn`: failures reported by the default error sink, stop grace exceeded
//! - `error`: a hook panicked inside a background loop
//! - `debug`: every enqueue, dispatch and forward
//!
//! ## Usage
//!
//! ```bash
//! # Lifecycle only
//! RUST_LOG=info cargo run -p ecu-sample
//!
//! # Follow every job through the router
//! RUST_LOG=debug cargo run -p ecu-sample
//!
//! # Only the framework internals
//! RUST_LOG=ecu_framework=debug cargo run -p ecu-sample
//! ```
//!
//! With `RUST_LOG=debug` a routed job looks like:
//!
//! ```text
//! DEBUG Enqueued actor="mcu" goal=read producer="main" priority=1
//! DEBUG Dispatching router="mcu" goal=read priority=1
//! DEBUG Assigned router="mcu" goal=read target=sensor module="sensor-1"
//! DEBUG Solving module="sensor-1" goal=read producer="main"
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Call once, at the top of `main`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
