//! Log-based presence observer.
//!
//! Writes every debounced presence change to the ESP-IDF logger (UART /
//! USB-CDC in production).  A future MQTT or BLE observer would implement
//! the same trait.

use log::info;

use crate::sensors::observer::Observer;

/// Observer that logs presence transitions under a fixed label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogObserver {
    label: &'static str,
}

impl LogObserver {
    pub const fn new(label: &'static str) -> Self {
        Self { label }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Observer<bool> for LogObserver {
    fn receive(&self, present: bool) {
        info!(
            "PRESENCE | {} | {}",
            self.label,
            if present { "DETECTED" } else { "CLEAR" }
        );
    }
}
