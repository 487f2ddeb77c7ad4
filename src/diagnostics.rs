//! Runtime diagnostics for the presence sensors.
//!
//! Failures inside the debounce task cannot be returned to anyone, so they
//! land here instead of being swallowed.  Counters are plain atomics so the
//! ISR path can bump them; the last task-side fault is kept for display.
//! Snapshots serialise with serde for the periodic JSON log line.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::GpioError;

/// A failure observed by the debounce task after `begin` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The pin interrupt could not be masked before settling.
    InterruptDisable(GpioError),
    /// The pin interrupt could not be re-armed after settling; the sensor
    /// is deaf until restarted.
    InterruptEnable(GpioError),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterruptDisable(e) => write!(f, "interrupt disable: {e}"),
            Self::InterruptEnable(e) => write!(f, "interrupt enable: {e}"),
        }
    }
}

#[derive(Default)]
pub struct Diagnostics {
    edges: AtomicU32,
    spurious_signals: AtomicU32,
    cycles: AtomicU32,
    notifications: AtomicU32,
    suppressed: AtomicU32,
    faults: AtomicU32,
    last_fault: Mutex<Option<Fault>>,
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    /// Edges handed to the debounce task.
    pub edges: u32,
    /// Edges dropped because no task was listening.
    pub spurious_signals: u32,
    /// Completed settle-and-evaluate cycles.
    pub cycles: u32,
    pub notifications: u32,
    /// Cycles whose settled level matched the previous value.
    pub suppressed: u32,
    pub faults: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    // ── ISR side (lock-free) ──────────────────────────────────

    pub fn record_edge(&self) {
        self.edges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spurious(&self) {
        self.spurious_signals.fetch_add(1, Ordering::Relaxed);
    }

    // ── Task side ─────────────────────────────────────────────

    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Published last in a cycle, after any notification.
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Release);
    }

    pub fn record_fault(&self, fault: Fault) {
        log::error!("diagnostics: {}", fault);
        self.faults.fetch_add(1, Ordering::Relaxed);
        *self.last_fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault);
    }

    pub fn last_fault(&self) -> Option<Fault> {
        *self.last_fault.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            cycles: self.cycles.load(Ordering::Acquire),
            edges: self.edges.load(Ordering::Relaxed),
            spurious_signals: self.spurious_signals.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

impl DiagnosticsSnapshot {
    /// Compact JSON for the serial log.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
