//! Platform drivers: GPIO input/interrupt plumbing and task scheduling.

pub mod gpio;
pub mod task;
