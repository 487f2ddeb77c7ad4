//! Interrupt-driven presence sensor with settle-window debouncing.
//!
//! ```text
//!   edge ──▶ ISR: wake.signal_from_isr() ──▶ debounce task
//!                                             │ disable pin interrupt
//!                                             │ delay(settle)
//!                                             │ enable pin interrupt
//!                                             │ read level
//!                                             └▶ changed? notify observers
//! ```
//!
//! The ISR only raises the wake signal and bumps a counter; it never reads
//! the pin, touches the debounced value, or walks the observer set.  Edges
//! that land while the interrupt is masked are not seen at all, and edges
//! that land between the re-enable and the next wait collapse into one
//! pending wake.  At most one cycle is ever in flight.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::app::ports::{GpioPort, IsrHandler, RtosPort};
use crate::config::{InterruptEdge, SensorConfig};
use crate::diagnostics::{Diagnostics, Fault};
use crate::drivers::task::{CooperativeTask, TaskBody, TaskContext};
use crate::error::{Error, InitError};
use crate::sensors::ObservableSensor;
use crate::sensors::observer::Observable;
use crate::wake::WakeSignal;

// ── Debouncer ─────────────────────────────────────────────────

/// One settle-and-evaluate step on a single pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    pin: i32,
    settle: Duration,
}

impl Debouncer {
    pub const fn new(pin: i32, settle: Duration) -> Self {
        Self { pin, settle }
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Mask the pin interrupt, wait out the settle window, unmask, then
    /// compare the settled level with `last`.
    ///
    /// Returns `Some(level)` when the level changed (and `last` now holds
    /// it), `None` when it did not.  If the interrupt cannot be masked the
    /// cycle is skipped; if it cannot be unmasked the level is not
    /// evaluated.  Either way `last` is left alone.
    pub fn cycle<G, R>(&self, gpio: &G, rtos: &R, last: &AtomicBool) -> Result<Option<bool>, Fault>
    where
        G: GpioPort + ?Sized,
        R: RtosPort + ?Sized,
    {
        gpio.disable_interrupt(self.pin).map_err(Fault::InterruptDisable)?;
        rtos.delay(self.settle);
        gpio.enable_interrupt(self.pin).map_err(Fault::InterruptEnable)?;

        let level = gpio.read_level(self.pin);
        let previous = last.swap(level, Ordering::AcqRel);
        Ok((level != previous).then_some(level))
    }
}

// ── Shared state ──────────────────────────────────────────────

/// State reachable from the sensor handle, its task, and its ISR.
#[derive(Default)]
struct SensorShared {
    observers: Observable<bool>,
    /// Last debounced level.  Written only by the debounce task (and by
    /// `begin` before the interrupt is enabled).
    last: AtomicBool,
    diagnostics: Diagnostics,
}

/// Body of the per-sensor debounce task.
struct DebounceTask<G, R> {
    label: &'static str,
    shared: Arc<SensorShared>,
    gpio: Arc<G>,
    rtos: Arc<R>,
    wake: Arc<WakeSignal>,
    debouncer: Debouncer,
}

impl<G, R> TaskBody for DebounceTask<G, R>
where
    G: GpioPort + 'static,
    R: RtosPort + 'static,
{
    fn run(&self, ctx: &TaskContext) {
        let listener = self.wake.arm();
        ctx.ready();
        info!(
            "{}: debounce task up (GPIO{}, settle={:?})",
            self.label,
            self.debouncer.pin(),
            self.debouncer.settle()
        );

        while !ctx.stop_requested() {
            listener.wait();
            if ctx.stop_requested() {
                break;
            }

            let diag = &self.shared.diagnostics;
            match self.debouncer.cycle(&*self.gpio, &*self.rtos, &self.shared.last) {
                Ok(Some(level)) => {
                    debug!("{}: settled at {}", self.label, level);
                    diag.record_notification();
                    self.shared.observers.notify(level);
                }
                Ok(None) => diag.record_suppressed(),
                Err(fault) => diag.record_fault(fault),
            }
            diag.record_cycle();
        }

        info!("{}: debounce task exiting", self.label);
    }

    fn unblock(&self) {
        self.wake.wake();
    }
}

// ── PresenceSensor ────────────────────────────────────────────

/// Lifecycle of a [`PresenceSensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    /// Constructed or ended; may `begin`.
    Inert,
    /// Task running, handler attached, interrupt enabled.
    Live,
    /// `begin` failed with the given error; the sensor stays non-functional.
    Disabled(InitError),
}

/// Binary presence input on one GPIO, debounced by a background task and
/// published to up to [`MAX_OBSERVERS_PER_SENSOR`](crate::config::MAX_OBSERVERS_PER_SENSOR)
/// observers.
pub struct PresenceSensor<G: GpioPort + 'static, R: RtosPort + 'static> {
    name: &'static str,
    gpio: Arc<G>,
    rtos: Arc<R>,
    config: SensorConfig,
    task: CooperativeTask,
    shared: Arc<SensorShared>,
    pin: Option<i32>,
    state: SensorState,
}

impl<G: GpioPort + 'static, R: RtosPort + 'static> PresenceSensor<G, R> {
    /// Construct an inert sensor.  Nothing touches hardware until `begin`.
    pub fn new(name: &'static str, gpio: Arc<G>, rtos: Arc<R>, config: SensorConfig) -> Self {
        Self {
            name,
            gpio,
            rtos,
            config,
            task: CooperativeTask::new(name, config.task_priority).with_core(config.core),
            shared: Arc::new(SensorShared::default()),
            pin: None,
            state: SensorState::Inert,
        }
    }

    /// Start sensing on `pin`.
    ///
    /// Starts the debounce task, configures the pin as a pulled input with
    /// any-edge sensitivity, attaches the interrupt handler, primes the
    /// debounced value from a raw read and finally enables the interrupt.
    /// An invalid [`SensorConfig`] is refused before anything is started.
    /// A failure undoes the steps already taken and disables the sensor.
    pub fn begin(&mut self, pin: i32) -> Result<(), InitError> {
        match self.state {
            SensorState::Live => return Err(InitError::AlreadyLive),
            SensorState::Disabled(_) => return Err(InitError::Disabled),
            SensorState::Inert => {}
        }

        if let Err(e) = self.config.validate() {
            let e = InitError::Config(e);
            error!("{}: refusing GPIO{}: {}", self.name, pin, e);
            self.state = SensorState::Disabled(e);
            return Err(e);
        }

        match self.bring_up(pin) {
            Ok(()) => {
                self.pin = Some(pin);
                self.state = SensorState::Live;
                info!(
                    "{}: live on GPIO{} (initial={})",
                    self.name,
                    pin,
                    self.shared.last.load(Ordering::Acquire)
                );
                Ok(())
            }
            Err(e) => {
                error!("{}: init on GPIO{} failed: {}", self.name, pin, e);
                // Rollback failures are already logged; `e` is what matters.
                let _ = self.tear_down(pin);
                self.state = SensorState::Disabled(e);
                Err(e)
            }
        }
    }

    fn bring_up(&mut self, pin: i32) -> Result<(), InitError> {
        let wake = Arc::new(WakeSignal::new());
        let body = Arc::new(DebounceTask {
            label: self.name,
            shared: Arc::clone(&self.shared),
            gpio: Arc::clone(&self.gpio),
            rtos: Arc::clone(&self.rtos),
            wake: Arc::clone(&wake),
            debouncer: Debouncer::new(pin, self.config.settle()),
        });
        self.task
            .start(&*self.rtos, usize::from(self.config.task_stack_kb), body)
            .map_err(InitError::TaskStart)?;

        self.gpio
            .configure_input(pin, self.config.pull, InterruptEdge::AnyEdge)
            .map_err(InitError::PinConfig)?;

        let shared = Arc::clone(&self.shared);
        let handler: IsrHandler = Arc::new(move || {
            if wake.signal_from_isr() {
                shared.diagnostics.record_edge();
            } else {
                shared.diagnostics.record_spurious();
            }
        });
        self.gpio.attach_isr(pin, handler).map_err(InitError::IsrAttach)?;

        // Interrupt still masked: the task cannot race this store.
        self.shared.last.store(self.gpio.read_level(pin), Ordering::Release);

        self.gpio.enable_interrupt(pin).map_err(InitError::InterruptEnable)
    }

    /// Best-effort undo of `bring_up`; reports the first failure.
    ///
    /// The task is joined before the pin is touched: an in-flight cycle
    /// unmasks the interrupt on its way out.  Edges between the join and
    /// the mask find the listener disarmed and count as spurious.
    fn tear_down(&mut self, pin: i32) -> Result<(), Error> {
        let stopped = self.task.stop().map_err(Error::from);
        if let Err(e) = &stopped {
            warn!("{}: stop task: {}", self.name, e);
        }
        let masked = self.gpio.disable_interrupt(pin).map_err(Error::from);
        if let Err(e) = &masked {
            warn!("{}: disable interrupt on GPIO{}: {}", self.name, pin, e);
        }
        let detached = self.gpio.detach_isr(pin).map_err(Error::from);
        if let Err(e) = &detached {
            warn!("{}: detach ISR on GPIO{}: {}", self.name, pin, e);
        }

        stopped.and(masked).and(detached)
    }

    /// Return a live sensor to the inert state: stop and join the debounce
    /// task, letting a running cycle finish, then mask and detach the
    /// interrupt.  Observers and the last debounced value are kept.  No-op
    /// unless live.
    pub fn end(&mut self) -> Result<(), Error> {
        if self.state != SensorState::Live {
            return Ok(());
        }
        let Some(pin) = self.pin.take() else {
            return Ok(());
        };

        let result = self.tear_down(pin);
        self.state = SensorState::Inert;
        info!("{}: ended on GPIO{}", self.name, pin);
        result
    }

    /// Last debounced level.
    pub fn debounced(&self) -> bool {
        self.shared.last.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == SensorState::Live
    }

    pub fn pin(&self) -> Option<i32> {
        self.pin
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn is_task_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.shared.diagnostics
    }
}

impl<G: GpioPort + 'static, R: RtosPort + 'static> ObservableSensor<bool> for PresenceSensor<G, R> {
    fn observers(&self) -> &Observable<bool> {
        &self.shared.observers
    }

    /// Raw, non-debounced pin level while live; the last debounced value
    /// otherwise.
    fn read(&self) -> bool {
        match (self.state, self.pin) {
            (SensorState::Live, Some(pin)) => self.gpio.read_level(pin),
            _ => self.debounced(),
        }
    }
}

impl<G: GpioPort + 'static, R: RtosPort + 'static> Drop for PresenceSensor<G, R> {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            error!("{}: teardown on drop: {}", self.name, e);
        }
    }
}
