//! GPIO input and per-pin interrupt plumbing behind [`GpioPort`].
//!
//! ## Dual-target design
//!
//! On ESP-IDF: [`EspGpio`] drives the pins with raw `esp_idf_svc::sys`
//! calls and routes each pin's interrupt through the shared GPIO ISR
//! service to a boxed [`IsrHandler`].
//! On host/test: [`SimGpio`] keeps pin levels in memory; driving a level
//! fires the attached handler exactly like an any-edge interrupt would.

use std::sync::{Mutex, PoisonError};

use crate::app::ports::{GpioPort, IsrHandler};
use crate::config::{InterruptEdge, Pull};
use crate::error::GpioError;

/// Pins that can have a handler attached at the same time.
pub const MAX_ISR_PINS: usize = 8;

// ── ESP-IDF adapter ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspGpio;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::sys::*;
    use log::info;

    use super::*;

    /// Trampoline registered with `gpio_isr_handler_add`.
    ///
    /// SAFETY: `arg` points at a boxed `IsrHandler` owned by the handler
    /// table; it is only freed after `gpio_isr_handler_remove` returned.
    unsafe extern "C" fn isr_trampoline(arg: *mut core::ffi::c_void) {
        let handler = unsafe { &*(arg as *const IsrHandler) };
        handler();
    }

    fn check(ret: esp_err_t, err: fn(i32) -> GpioError) -> Result<(), GpioError> {
        if ret == ESP_OK as i32 { Ok(()) } else { Err(err(ret)) }
    }

    /// Raw ESP-IDF GPIO driver.
    pub struct EspGpio {
        handlers: Mutex<heapless::Vec<(i32, Box<IsrHandler>), MAX_ISR_PINS>>,
    }

    impl EspGpio {
        /// Install the per-pin GPIO ISR service.  Idempotent:
        /// `ESP_ERR_INVALID_STATE` means it was already installed.
        pub fn new() -> Result<Self, GpioError> {
            // SAFETY: one-shot service install from task context.
            let ret = unsafe { gpio_install_isr_service(0) };
            if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
                return Err(GpioError::IsrInstallFailed(ret));
            }
            info!("gpio: ISR service ready");
            Ok(Self { handlers: Mutex::new(heapless::Vec::new()) })
        }
    }

    impl GpioPort for EspGpio {
        fn configure_input(&self, pin: i32, pull: Pull, edge: InterruptEdge) -> Result<(), GpioError> {
            if !(0..64).contains(&pin) {
                return Err(GpioError::InvalidPin(pin));
            }
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << pin,
                mode: gpio_mode_t_GPIO_MODE_INPUT,
                pull_up_en: if pull == Pull::Up {
                    gpio_pullup_t_GPIO_PULLUP_ENABLE
                } else {
                    gpio_pullup_t_GPIO_PULLUP_DISABLE
                },
                pull_down_en: if pull == Pull::Down {
                    gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
                } else {
                    gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
                },
                intr_type: match edge {
                    InterruptEdge::Rising => gpio_int_type_t_GPIO_INTR_POSEDGE,
                    InterruptEdge::Falling => gpio_int_type_t_GPIO_INTR_NEGEDGE,
                    InterruptEdge::AnyEdge => gpio_int_type_t_GPIO_INTR_ANYEDGE,
                },
            };
            // SAFETY: plain register configuration of a validated pin.
            check(unsafe { gpio_config(&cfg) }, GpioError::ConfigFailed)?;
            // gpio_config enables the interrupt when intr_type is set.
            self.disable_interrupt(pin)?;
            info!("gpio: GPIO{} input, pull={:?}, intr={:?}", pin, pull, edge);
            Ok(())
        }

        fn read_level(&self, pin: i32) -> bool {
            // SAFETY: gpio_get_level is a read-only register access.
            (unsafe { gpio_get_level(pin) }) != 0
        }

        fn enable_interrupt(&self, pin: i32) -> Result<(), GpioError> {
            // SAFETY: register write on a configured pin.
            check(unsafe { gpio_intr_enable(pin) }, GpioError::InterruptControl)
        }

        fn disable_interrupt(&self, pin: i32) -> Result<(), GpioError> {
            // SAFETY: register write on a configured pin.
            check(unsafe { gpio_intr_disable(pin) }, GpioError::InterruptControl)
        }

        fn attach_isr(&self, pin: i32, handler: IsrHandler) -> Result<(), GpioError> {
            let mut table = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            if table.iter().any(|(p, _)| *p == pin) {
                drop(table);
                self.detach_isr(pin)?;
                table = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            }
            if table.is_full() {
                return Err(GpioError::HandlerSlotsFull);
            }

            let boxed = Box::new(handler);
            let arg = &*boxed as *const IsrHandler as *mut core::ffi::c_void;
            // SAFETY: `arg` stays valid while the box sits in the table.
            check(
                unsafe { gpio_isr_handler_add(pin, Some(isr_trampoline), arg) },
                GpioError::IsrInstallFailed,
            )?;
            // Capacity checked above under the same lock.
            let _ = table.push((pin, boxed));
            Ok(())
        }

        fn detach_isr(&self, pin: i32) -> Result<(), GpioError> {
            let mut table = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(i) = table.iter().position(|(p, _)| *p == pin) else {
                return Ok(());
            };
            // SAFETY: after removal the ISR service no longer holds `arg`.
            check(unsafe { gpio_isr_handler_remove(pin) }, GpioError::IsrInstallFailed)?;
            table.swap_remove(i);
            Ok(())
        }
    }
}

// ── Host simulation ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Clone, Default)]
struct SimPin {
    pin: i32,
    level: bool,
    config: Option<(Pull, InterruptEdge)>,
    irq_enabled: bool,
    handler: Option<IsrHandler>,
    masked_edges: u32,
}

/// Which [`SimGpio`] calls should fail, for exercising init error paths.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub configure: bool,
    pub attach: bool,
    pub enable: bool,
}

/// In-memory GPIO bank.  Drive levels with [`SimGpio::set_level`].
///
/// Handlers run under `dispatch`, which `detach_isr` also takes, so a
/// detach waits for an in-flight handler the way removing an entry from
/// the ISR service does.  A handler must not call back into the bank.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimGpio {
    pins: Mutex<heapless::Vec<SimPin, 16>>,
    faults: Mutex<SimFaults>,
    dispatch: Mutex<()>,
}

#[cfg(not(target_os = "espidf"))]
const SIM_ERR: i32 = -1;

#[cfg(not(target_os = "espidf"))]
impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_faults(&self, faults: SimFaults) {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
    }

    fn faults(&self) -> SimFaults {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_pin<R>(&self, pin: i32, f: impl FnOnce(&mut SimPin) -> R) -> Result<R, GpioError> {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = pins.iter_mut().find(|p| p.pin == pin) {
            return Ok(f(p));
        }
        pins.push(SimPin { pin, ..SimPin::default() })
            .map_err(|_| GpioError::InvalidPin(pin))?;
        let last = pins.len() - 1;
        Ok(f(&mut pins[last]))
    }

    /// Drive `pin` to `level`.  A change is an edge: it invokes the attached
    /// handler if the pin interrupt is enabled, otherwise it is counted as
    /// masked.  The handler runs on the caller's thread, outside the pin
    /// table lock but inside the dispatch lock.
    pub fn set_level(&self, pin: i32, level: bool) {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let fire = self
            .with_pin(pin, |p| {
                if p.level == level {
                    return None;
                }
                p.level = level;
                let sensitive = match p.config {
                    Some((_, InterruptEdge::AnyEdge)) => true,
                    Some((_, InterruptEdge::Rising)) => level,
                    Some((_, InterruptEdge::Falling)) => !level,
                    None => false,
                };
                if !sensitive {
                    return None;
                }
                match (&p.handler, p.irq_enabled) {
                    (Some(h), true) => Some(h.clone()),
                    _ => {
                        p.masked_edges += 1;
                        None
                    }
                }
            })
            .ok()
            .flatten();

        if let Some(handler) = fire {
            handler();
        }
    }

    pub fn is_interrupt_enabled(&self, pin: i32) -> bool {
        self.with_pin(pin, |p| p.irq_enabled).unwrap_or(false)
    }

    pub fn has_handler(&self, pin: i32) -> bool {
        self.with_pin(pin, |p| p.handler.is_some()).unwrap_or(false)
    }

    pub fn is_configured(&self, pin: i32) -> bool {
        self.with_pin(pin, |p| p.config.is_some()).unwrap_or(false)
    }

    pub fn pull(&self, pin: i32) -> Option<Pull> {
        self.with_pin(pin, |p| p.config.map(|(pull, _)| pull)).ok().flatten()
    }

    /// Edges that arrived while the pin interrupt was disabled.
    pub fn masked_edges(&self, pin: i32) -> u32 {
        self.with_pin(pin, |p| p.masked_edges).unwrap_or(0)
    }
}

#[cfg(not(target_os = "espidf"))]
impl GpioPort for SimGpio {
    fn configure_input(&self, pin: i32, pull: Pull, edge: InterruptEdge) -> Result<(), GpioError> {
        if self.faults().configure {
            return Err(GpioError::ConfigFailed(SIM_ERR));
        }
        self.with_pin(pin, |p| {
            p.config = Some((pull, edge));
            p.irq_enabled = false;
        })
    }

    fn read_level(&self, pin: i32) -> bool {
        self.with_pin(pin, |p| p.level).unwrap_or(false)
    }

    fn enable_interrupt(&self, pin: i32) -> Result<(), GpioError> {
        if self.faults().enable {
            return Err(GpioError::InterruptControl(SIM_ERR));
        }
        self.with_pin(pin, |p| p.irq_enabled = true)
    }

    fn disable_interrupt(&self, pin: i32) -> Result<(), GpioError> {
        self.with_pin(pin, |p| p.irq_enabled = false)
    }

    fn attach_isr(&self, pin: i32, handler: IsrHandler) -> Result<(), GpioError> {
        if self.faults().attach {
            return Err(GpioError::HandlerSlotsFull);
        }
        self.with_pin(pin, |p| p.handler = Some(handler))
    }

    fn detach_isr(&self, pin: i32) -> Result<(), GpioError> {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        self.with_pin(pin, |p| p.handler = None)
    }
}
