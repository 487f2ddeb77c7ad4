//! Port traits: the boundary between the sensing core and the platform.
//!
//! ```text
//!   EspGpio / SimGpio ──▶ GpioPort ──┐
//!                                    ├──▶ PresenceSensor (core)
//!   ThreadRtos        ──▶ RtosPort ──┘
//! ```
//!
//! The core never touches registers or the scheduler directly; it is
//! generic over these two traits so the same debounce protocol runs on the
//! ESP32 and on the host simulation used by the tests.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::{InterruptEdge, Pull};
use crate::drivers::task::TaskConfig;
use crate::error::{GpioError, TaskError};

/// Interrupt handler bound to a sensor instance at attach time.
///
/// Runs in interrupt context: it must not block, allocate, or fail.
pub type IsrHandler = Arc<dyn Fn() + Send + Sync>;

/// Task entry point handed to [`RtosPort::spawn`].
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

// ───────────────────────────────────────────────────────────────
// GPIO port (driven adapter: core ↔ pin hardware)
// ───────────────────────────────────────────────────────────────

/// GPIO driver and interrupt controller, as seen by a sensor.
///
/// Shared between setup code and the sensor's background task, hence
/// `&self` everywhere.
pub trait GpioPort: Send + Sync {
    /// Configure `pin` as an input with the given pull and sensitivity.
    /// The pin interrupt is left disabled.
    fn configure_input(&self, pin: i32, pull: Pull, edge: InterruptEdge) -> Result<(), GpioError>;

    /// Instantaneous raw level (`true` = high).
    fn read_level(&self, pin: i32) -> bool;

    fn enable_interrupt(&self, pin: i32) -> Result<(), GpioError>;

    fn disable_interrupt(&self, pin: i32) -> Result<(), GpioError>;

    /// Route `pin`'s interrupt to `handler`.
    ///
    /// The adapter keeps `handler` alive until [`detach_isr`](Self::detach_isr)
    /// returns, so anything the closure captures outlives the registration.
    fn attach_isr(&self, pin: i32, handler: IsrHandler) -> Result<(), GpioError>;

    /// Remove the handler.  Once this returns the handler is never invoked
    /// again.  No-op if nothing is attached.
    fn detach_isr(&self, pin: i32) -> Result<(), GpioError>;
}

// ───────────────────────────────────────────────────────────────
// RTOS port (driven adapter: core ↔ scheduler)
// ───────────────────────────────────────────────────────────────

/// Scheduler services used by [`CooperativeTask`](crate::drivers::task::CooperativeTask)
/// and the debounce loop.
pub trait RtosPort: Send + Sync {
    /// Create a schedulable context running `entry`.
    fn spawn(&self, config: &TaskConfig, entry: TaskEntry) -> Result<JoinHandle<()>, TaskError>;

    /// Block the calling task for `duration`.
    fn delay(&self, duration: core::time::Duration);
}
