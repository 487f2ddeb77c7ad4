//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulated GPIO bank and mock schedulers.  All tests run on
//! the host (x86_64) with no real hardware required.

#![cfg(not(target_os = "espidf"))]

mod mock_rtos;
mod presence_tests;
