//! RoboArm presence-sensing library.
//!
//! Exposes the sensing core for integration testing and for the firmware
//! binary. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod sensors;
pub mod wake;

pub use error::{ConfigError, Error, GpioError, InitError, ObserverError, Result, TaskError};
