//! Presence sensor configuration parameters
//!
//! Tunables for the debounce task and the sensing pin.  Values can be
//! overridden from a persisted postcard blob; anything that fails to decode
//! or validate falls back to the defaults.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::drivers::task::Core;
use crate::error::ConfigError;

/// Upper bound on observers per sensor.  The registry is a fixed array of
/// this size; it never allocates.
pub const MAX_OBSERVERS_PER_SENSOR: usize = 4;

/// Default debounce window (milliseconds).
pub const DEFAULT_SETTLE_MS: u32 = 10;

/// Internal pull resistor applied to the sensing pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// Interrupt sensitivity of an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptEdge {
    Rising,
    Falling,
    AnyEdge,
}

/// Per-sensor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    // --- Debounce ---
    /// Settle interval after an edge, during which the pin interrupt is off
    pub settle_ms: u32,

    // --- Task ---
    /// Stack budget of the debounce task (KiB)
    pub task_stack_kb: u16,
    /// FreeRTOS priority of the debounce task (0 = idle)
    pub task_priority: u8,
    /// CPU core the debounce task is pinned to
    pub core: Core,

    // --- Pin ---
    pub pull: Pull,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,

            task_stack_kb: 4,
            task_priority: 1, // idle + 1
            core: Core::App,

            pull: Pull::Down,
        }
    }
}

impl SensorConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.settle_ms) {
            return Err(ConfigError::ValidationFailed("settle_ms must be 1–1000"));
        }
        if !(2..=32).contains(&self.task_stack_kb) {
            return Err(ConfigError::ValidationFailed("task_stack_kb must be 2–32"));
        }
        if !(1..=24).contains(&self.task_priority) {
            return Err(ConfigError::ValidationFailed("task_priority must be 1–24"));
        }
        Ok(())
    }

    pub fn settle(&self) -> core::time::Duration {
        core::time::Duration::from_millis(u64::from(self.settle_ms))
    }

    /// Encode for persistence.
    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Decode and validate a persisted blob.
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Decode a persisted blob if there is one, falling back to defaults.
    pub fn load_or_default(blob: Option<&[u8]>) -> Self {
        match blob {
            None => {
                info!("config: no stored sensor config, using defaults");
                Self::default()
            }
            Some(bytes) => match Self::from_blob(bytes) {
                Ok(cfg) => {
                    info!("config: loaded sensor config ({} bytes)", bytes.len());
                    cfg
                }
                Err(e) => {
                    warn!("config: stored sensor config rejected ({}), using defaults", e);
                    Self::default()
                }
            },
        }
    }
}
