//! Interrupt-to-task wake signal.
//!
//! A GPIO ISR produces, one background task consumes.  Unlike a queue,
//! the signal is a single boolean: any number of edges before the task
//! wakes collapse into one pending wake, so the backlog can never grow.
//!
//! ```text
//! ┌────────────┐  signal_from_isr()  ┌────────────┐  wait()  ┌──────────────┐
//! │ GPIO ISR   │────────────────────▶│ WakeSignal │─────────▶│ WakeListener │
//! └────────────┘   (dropped unless   └────────────┘          │ (task only)  │
//!                   armed)                                   └──────────────┘
//! ```
//!
//! - ESP-IDF: a FreeRTOS task notification, the ISR-safe primitive.  The
//!   notification is bound to the task that calls [`WakeSignal::arm`].
//! - Host/simulation: an `embassy_sync` [`Signal`] waited with
//!   `futures_lite::future::block_on`.

use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(target_os = "espidf"))]
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
#[cfg(not(target_os = "espidf"))]
use embassy_sync::signal::Signal;

#[cfg(target_os = "espidf")]
use core::num::NonZeroU32;
#[cfg(target_os = "espidf")]
use esp_idf_hal::task::notification::{Notification, Notifier};
#[cfg(target_os = "espidf")]
use std::sync::{Arc, OnceLock};

pub struct WakeSignal {
    armed: AtomicBool,
    #[cfg(not(target_os = "espidf"))]
    signal: Signal<CriticalSectionRawMutex, ()>,
    #[cfg(target_os = "espidf")]
    notifier: OnceLock<Arc<Notifier>>,
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeSignal {
    pub fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            #[cfg(not(target_os = "espidf"))]
            signal: Signal::new(),
            #[cfg(target_os = "espidf")]
            notifier: OnceLock::new(),
        }
    }

    /// Bind the signal to the calling task.  Call once, from the task that
    /// will wait; until then every `signal_from_isr` is dropped.
    pub fn arm(&self) -> WakeListener<'_> {
        #[cfg(target_os = "espidf")]
        {
            let notification = Notification::new();
            if self.notifier.set(notification.notifier()).is_err() {
                log::warn!("wake: signal armed twice, keeping the first notifier");
            }
            self.armed.store(true, Ordering::Release);
            WakeListener { wake: self, notification }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.armed.store(true, Ordering::Release);
            WakeListener { wake: self }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Wake the listener.  Lock-free and never fails, so it is safe in interrupt context.
    ///
    /// Returns `false` (and does nothing) when no task is listening.
    pub fn signal_from_isr(&self) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }

        #[cfg(target_os = "espidf")]
        {
            match self.notifier.get() {
                // SAFETY: the notifier's task is alive while `armed` is set;
                // the listener clears `armed` before the task exits.
                Some(n) => {
                    let _ = unsafe { n.notify_and_yield(NonZeroU32::MIN) };
                    true
                }
                None => false,
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.signal.signal(());
            true
        }
    }

    /// Wake the listener from task context (shutdown path).
    pub fn wake(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.armed.load(Ordering::Acquire) {
                if let Some(n) = self.notifier.get() {
                    // SAFETY: as in `signal_from_isr`.
                    let _ = unsafe { n.notify(NonZeroU32::MIN) };
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.signal.signal(());
    }
}

/// Consumer half, owned by the task that armed the signal.  Dropping it
/// disarms the signal.
pub struct WakeListener<'a> {
    wake: &'a WakeSignal,
    #[cfg(target_os = "espidf")]
    notification: Notification,
}

impl WakeListener<'_> {
    /// Block until the next wake.  Pending wakes are consumed, not counted.
    pub fn wait(&self) {
        #[cfg(target_os = "espidf")]
        self.notification.wait_any();

        #[cfg(not(target_os = "espidf"))]
        futures_lite::future::block_on(self.wake.signal.wait());
    }
}

impl Drop for WakeListener<'_> {
    fn drop(&mut self) {
        self.wake.armed.store(false, Ordering::Release);
    }
}
