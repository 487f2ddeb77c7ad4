//! Cooperative background tasks on core-pinned threads.
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair in [`spawn_on_core`] must
//! not be interleaved with other thread creation on the same thread.
//!
//! [`CooperativeTask`] separates *how* a background activity is scheduled
//! from *what* it does ([`TaskBody`]).  Its lifecycle:
//!
//! ```text
//!   start() ──▶ trampoline ──▶ body.run() returns ──▶ running = false ──▶ context ends
//!      │                                      ▲
//!      └── stop()/drop: request stop, body.unblock(), join
//! ```
//!
//! The running flag is cleared *before* the context goes away, so nobody
//! can observe `is_running() == true` for a dead task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{RtosPort, TaskEntry};
use crate::error::TaskError;

/// How long `start` waits for the body to report ready.
const START_TIMEOUT: Duration = Duration::from_secs(1);

/// CPU core identifiers for the ESP32 Xtensa dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks (WiFi, BLE, lwIP).
    Pro = 0,
    /// Core 1 (APP_CPU): application logic.
    App = 1,
}

/// Scheduling parameters for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    pub name: &'static str,
    pub priority: u8,
    pub stack_kb: usize,
    pub core: Core,
}

// ── Spawning ──────────────────────────────────────────────────

/// Spawn a thread pinned to a specific core with explicit priority and stack.
///
/// On ESP-IDF, uses `esp_pthread_set_cfg()` to configure core affinity,
/// priority, and stack size before spawning.
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(config: &TaskConfig, f: TaskEntry) -> Result<JoinHandle<()>, TaskError> {
    let c_name = std::ffi::CString::new(config.name).map_err(|_| TaskError::SpawnFailed)?;

    // SAFETY: the pthread config is thread-local to the caller and consumed
    // by the spawn below; `c_name` outlives that spawn.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = config.core as i32;
        cfg.prio = i32::from(config.priority);
        cfg.stack_size = (config.stack_kb * 1024) as _;
        cfg.thread_name = c_name.as_ptr();
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            log::error!("esp_pthread_set_cfg failed for '{}': {}", config.name, ret);
            return Err(TaskError::SpawnFailed);
        }
    }

    info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        config.name, config.core, config.priority, config.stack_kb
    );

    std::thread::Builder::new()
        .name(config.name.into())
        .stack_size(config.stack_kb * 1024)
        .spawn(f)
        .map_err(|e| {
            log::error!("spawn '{}' failed: {}", config.name, e);
            TaskError::SpawnFailed
        })
}

/// Simulation fallback; ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(config: &TaskConfig, f: TaskEntry) -> Result<JoinHandle<()>, TaskError> {
    info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        config.name, config.stack_kb
    );

    // Host threads need more headroom than the firmware budget.
    let stack = (config.stack_kb * 1024).max(64 * 1024);
    std::thread::Builder::new()
        .name(config.name.into())
        .stack_size(stack)
        .spawn(f)
        .map_err(|e| {
            log::error!("spawn '{}' (sim) failed: {}", config.name, e);
            TaskError::SpawnFailed
        })
}

/// [`RtosPort`] backed by core-pinned std threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRtos;

impl RtosPort for ThreadRtos {
    fn spawn(&self, config: &TaskConfig, entry: TaskEntry) -> Result<JoinHandle<()>, TaskError> {
        spawn_on_core(config, entry)
    }

    #[cfg(target_os = "espidf")]
    fn delay(&self, duration: Duration) {
        esp_idf_hal::delay::FreeRtos::delay_ms(duration.as_millis() as u32);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ── Task body ─────────────────────────────────────────────────

/// What a [`CooperativeTask`] runs.
pub trait TaskBody: Send + Sync + 'static {
    /// Entry point.  Call [`TaskContext::ready`] once set up, then loop
    /// until [`TaskContext::stop_requested`].
    fn run(&self, ctx: &TaskContext);

    /// Wake `run` out of a blocking wait after a stop was requested.
    fn unblock(&self) {}
}

/// Handed to [`TaskBody::run`].
pub struct TaskContext {
    stop: Arc<AtomicBool>,
    ready: Option<mpsc::SyncSender<()>>,
}

impl TaskContext {
    /// Report that the body is set up; releases the caller of `start`.
    pub fn ready(&self) {
        if let Some(tx) = &self.ready {
            let _ = tx.try_send(());
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

// ── CooperativeTask ───────────────────────────────────────────

/// Clears the running flag when the trampoline ends, panics included.
struct ClearOnExit(Arc<AtomicBool>);

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CooperativeTask {
    name: &'static str,
    priority: u8,
    core: Core,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    unblock: Option<Arc<dyn TaskBody>>,
}

impl CooperativeTask {
    pub fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            core: Core::App,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            unblock: None,
        }
    }

    pub fn with_core(mut self, core: Core) -> Self {
        self.core = core;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// True while the task context exists.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn `body` on a new task with `stack_kb` of stack and wait until
    /// it reports ready (or returns).
    pub fn start<B: TaskBody>(
        &mut self,
        rtos: &dyn RtosPort,
        stack_kb: usize,
        body: Arc<B>,
    ) -> Result<(), TaskError> {
        if self.is_running() {
            return Err(TaskError::AlreadyRunning);
        }
        // Reap a context that already finished on its own.
        self.reap();

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let running = Arc::clone(&self.running);
        let entry_body = Arc::clone(&body);
        let ctx = TaskContext {
            stop: Arc::clone(&stop),
            ready: Some(ready_tx),
        };

        // Set before spawning so a fast body can't race the flag.
        running.store(true, Ordering::Release);
        let trampoline_running = Arc::clone(&running);
        let trampoline: TaskEntry = Box::new(move || {
            let _clear = ClearOnExit(trampoline_running);
            entry_body.run(&ctx);
            drop(ctx);
        });

        let config = TaskConfig {
            name: self.name,
            priority: self.priority,
            stack_kb,
            core: self.core,
        };
        let handle = match rtos.spawn(&config, trampoline) {
            Ok(h) => h,
            Err(e) => {
                running.store(false, Ordering::Release);
                return Err(e);
            }
        };

        self.stop = stop;
        self.handle = Some(handle);
        self.unblock = Some(body as Arc<dyn TaskBody>);

        match ready_rx.recv_timeout(START_TIMEOUT) {
            // Disconnected: the body returned without signalling; it ran.
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => Ok(()),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("task '{}': no ready report within {:?}", self.name, START_TIMEOUT);
                let _ = self.stop();
                Err(TaskError::StartTimeout)
            }
        }
    }

    /// Request a stop, unblock the body, and join the context.
    ///
    /// Called from inside the task itself this only raises the request.
    pub fn stop(&mut self) -> Result<(), TaskError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.stop.store(true, Ordering::Release);
        if let Some(body) = self.unblock.take() {
            body.unblock();
        }

        if handle.thread().id() == std::thread::current().id() {
            warn!("task '{}': stop requested from its own context, not joining", self.name);
            return Ok(());
        }

        let result = handle.join();
        self.running.store(false, Ordering::Release);
        match result {
            Ok(()) => {
                info!("task '{}' stopped", self.name);
                Ok(())
            }
            Err(_) => {
                log::error!("task '{}' panicked", self.name);
                Err(TaskError::Panicked)
            }
        }
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("task '{}' had panicked", self.name);
            }
        }
        self.unblock = None;
    }
}

impl Drop for CooperativeTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}
