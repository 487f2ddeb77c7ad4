//! Mock schedulers, GPIO wrappers and observers for integration tests.
//!
//! `ScriptedRtos` spawns real threads but lets a test inject pin activity
//! *inside* a settle window, which is the only way to hit the masked-edge
//! paths deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use roboarm_presence::app::ports::{GpioPort, IsrHandler, RtosPort, TaskEntry};
use roboarm_presence::config::{InterruptEdge, Pull};
use roboarm_presence::drivers::gpio::SimGpio;
use roboarm_presence::drivers::task::{TaskConfig, spawn_on_core};
use roboarm_presence::error::{GpioError, TaskError};
use roboarm_presence::sensors::observer::Observer;

pub const PIN: i32 = 4;
pub const TIMEOUT: Duration = Duration::from_secs(2);

type Script = Box<dyn FnOnce() + Send>;

// ── ScriptedRtos ──────────────────────────────────────────────

/// Real threads; each `delay` first runs the next queued script, if any.
#[derive(Default)]
pub struct ScriptedRtos {
    scripts: Mutex<VecDeque<Script>>,
    delays: Mutex<Vec<Duration>>,
    spawned: Mutex<Vec<TaskConfig>>,
}

#[allow(dead_code)]
impl ScriptedRtos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the debounce task while the pin interrupt is masked.
    pub fn during_next_settle(&self, f: impl FnOnce() + Send + 'static) {
        self.scripts.lock().unwrap().push_back(Box::new(f));
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> Vec<TaskConfig> {
        self.spawned.lock().unwrap().clone()
    }
}

impl RtosPort for ScriptedRtos {
    fn spawn(&self, config: &TaskConfig, entry: TaskEntry) -> Result<JoinHandle<()>, TaskError> {
        self.spawned.lock().unwrap().push(*config);
        spawn_on_core(config, entry)
    }

    fn delay(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        let script = self.scripts.lock().unwrap().pop_front();
        if let Some(script) = script {
            script();
        }
        std::thread::sleep(duration);
    }
}

// ── FlakyRtos ─────────────────────────────────────────────────

/// Refuses every spawn whose 1-based index is in `failing`; `None`
/// refuses them all.
pub struct FlakyRtos {
    failing: Option<&'static [usize]>,
    spawns: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyRtos {
    pub fn always() -> Self {
        Self { failing: None, spawns: AtomicUsize::new(0) }
    }

    pub fn on(failing: &'static [usize]) -> Self {
        Self { failing: Some(failing), spawns: AtomicUsize::new(0) }
    }
}

impl RtosPort for FlakyRtos {
    fn spawn(&self, config: &TaskConfig, entry: TaskEntry) -> Result<JoinHandle<()>, TaskError> {
        let n = self.spawns.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.is_none_or(|f| f.contains(&n)) {
            return Err(TaskError::SpawnFailed);
        }
        spawn_on_core(config, entry)
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ── RetainingGpio ─────────────────────────────────────────────

/// [`SimGpio`] that remembers the last attached handler after detach, to
/// model an interrupt that races the teardown.
#[derive(Default)]
pub struct RetainingGpio {
    pub sim: SimGpio,
    retained: Mutex<Option<IsrHandler>>,
}

#[allow(dead_code)]
impl RetainingGpio {
    pub fn fire_retained(&self) {
        let handler = self.retained.lock().unwrap().clone();
        if let Some(h) = handler {
            h();
        }
    }
}

impl GpioPort for RetainingGpio {
    fn configure_input(&self, pin: i32, pull: Pull, edge: InterruptEdge) -> Result<(), GpioError> {
        self.sim.configure_input(pin, pull, edge)
    }

    fn read_level(&self, pin: i32) -> bool {
        self.sim.read_level(pin)
    }

    fn enable_interrupt(&self, pin: i32) -> Result<(), GpioError> {
        self.sim.enable_interrupt(pin)
    }

    fn disable_interrupt(&self, pin: i32) -> Result<(), GpioError> {
        self.sim.disable_interrupt(pin)
    }

    fn attach_isr(&self, pin: i32, handler: IsrHandler) -> Result<(), GpioError> {
        *self.retained.lock().unwrap() = Some(Arc::clone(&handler));
        self.sim.attach_isr(pin, handler)
    }

    fn detach_isr(&self, pin: i32) -> Result<(), GpioError> {
        self.sim.detach_isr(pin)
    }
}

// ── Recorder ──────────────────────────────────────────────────

/// Observer that records every value it receives.
#[derive(Default)]
pub struct Recorder {
    values: Mutex<Vec<bool>>,
    changed: Condvar,
}

#[allow(dead_code)]
impl Recorder {
    /// Leaked so it satisfies the `'static` observer bound.
    pub fn leaked() -> &'static Recorder {
        Box::leak(Box::new(Recorder::default()))
    }

    pub fn values(&self) -> Vec<bool> {
        self.values.lock().unwrap().clone()
    }

    /// Block until at least `n` values arrived or [`TIMEOUT`] passes.
    pub fn wait_for(&self, n: usize) -> Vec<bool> {
        let guard = self.values.lock().unwrap();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, TIMEOUT, |v| v.len() < n)
            .unwrap();
        guard.clone()
    }
}

impl Observer<bool> for Recorder {
    fn receive(&self, value: bool) {
        self.values.lock().unwrap().push(value);
        self.changed.notify_all();
    }
}

/// Poll `cond` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
