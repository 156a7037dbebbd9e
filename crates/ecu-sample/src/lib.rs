//! # ECU Sample Library
//!
//! A small engine-control application built on `ecu_framework`, exposed as a
//! library for integration testing.
//!
//! - [`sensor`]: a temperature sensor module that answers `read` jobs and polls itself
//! - [`logger`]: a logger module that stores every reading it receives
//! - [`lifecycle`]: [`EcuSystem`](lifecycle::EcuSystem), which wires both to the router
//! - [`goals`]: the goals and module types the application uses

pub mod goals;
pub mod lifecycle;
pub mod logger;
pub mod sensor;
