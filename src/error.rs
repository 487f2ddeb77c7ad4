//! Unified error types for the presence-sensing firmware.
//!
//! A single top-level `Error` enum that every subsystem converts into, with
//! one small `Copy` enum per concern.  None of these are ever produced in
//! interrupt context: ISR paths are total and report through diagnostics.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Sensor initialisation (`begin`) failed.
    Init(InitError),
    /// Observer registration was rejected.
    Observer(ObserverError),
    /// A GPIO driver call failed.
    Gpio(GpioError),
    /// The background task could not be scheduled or stopped.
    Task(TaskError),
    /// Configuration is invalid or could not be decoded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(e) => write!(f, "init: {e}"),
            Self::Observer(e) => write!(f, "observer: {e}"),
            Self::Gpio(e) => write!(f, "gpio: {e}"),
            Self::Task(e) => write!(f, "task: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Initialisation errors
// ---------------------------------------------------------------------------

/// Why `PresenceSensor::begin` failed.  Any of these leaves the sensor
/// disabled; nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The debounce task could not be started.
    TaskStart(TaskError),
    /// The pin could not be configured as an interrupt input.
    PinConfig(GpioError),
    /// The interrupt handler could not be attached.
    IsrAttach(GpioError),
    /// The pin interrupt could not be enabled.
    InterruptEnable(GpioError),
    /// `begin` was called on a sensor that is already live.
    AlreadyLive,
    /// A previous `begin` failed; the sensor stays non-functional.
    Disabled,
    /// The sensor config is out of range; nothing was started.
    Config(ConfigError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskStart(e) => write!(f, "debounce task start failed ({e})"),
            Self::PinConfig(e) => write!(f, "pin config failed ({e})"),
            Self::IsrAttach(e) => write!(f, "ISR attach failed ({e})"),
            Self::InterruptEnable(e) => write!(f, "interrupt enable failed ({e})"),
            Self::AlreadyLive => write!(f, "sensor already live"),
            Self::Disabled => write!(f, "sensor disabled by an earlier init failure"),
            Self::Config(e) => write!(f, "invalid config ({e})"),
        }
    }
}

impl std::error::Error for InitError {}

impl From<InitError> for Error {
    fn from(e: InitError) -> Self {
        Self::Init(e)
    }
}

// ---------------------------------------------------------------------------
// Observer registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverError {
    /// The fixed-capacity observer set is full.
    CapacityExceeded,
    /// The same observer is already subscribed.
    AlreadyRegistered,
}

impl fmt::Display for ObserverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "observer capacity exceeded"),
            Self::AlreadyRegistered => write!(f, "observer already registered"),
        }
    }
}

impl std::error::Error for ObserverError {}

impl From<ObserverError> for Error {
    fn from(e: ObserverError) -> Self {
        Self::Observer(e)
    }
}

// ---------------------------------------------------------------------------
// GPIO driver errors
// ---------------------------------------------------------------------------

/// Errors from the GPIO collaborator.  `i32` payloads are raw `esp_err_t`
/// return codes (always `-1` on the simulation target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    ConfigFailed(i32),
    IsrInstallFailed(i32),
    InterruptControl(i32),
    /// The adapter's fixed handler table has no free slot.
    HandlerSlotsFull,
    InvalidPin(i32),
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR install failed (rc={})", rc),
            Self::InterruptControl(rc) => write!(f, "GPIO interrupt enable/disable failed (rc={})", rc),
            Self::HandlerSlotsFull => write!(f, "no free ISR handler slot"),
            Self::InvalidPin(pin) => write!(f, "invalid GPIO {}", pin),
        }
    }
}

impl std::error::Error for GpioError {}

impl From<GpioError> for Error {
    fn from(e: GpioError) -> Self {
        Self::Gpio(e)
    }
}

// ---------------------------------------------------------------------------
// Task errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The scheduler could not allocate the task context.
    SpawnFailed,
    /// `start` was called while the task is still running.
    AlreadyRunning,
    /// The task never reported ready.
    StartTimeout,
    /// The task body panicked.
    Panicked,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed => write!(f, "task spawn failed"),
            Self::AlreadyRunning => write!(f, "task already running"),
            Self::StartTimeout => write!(f, "task did not report ready"),
            Self::Panicked => write!(f, "task panicked"),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<TaskError> for Error {
    fn from(e: TaskError) -> Self {
        Self::Task(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation; the message names the field.
    ValidationFailed(&'static str),
    /// A persisted blob could not be decoded.
    Corrupted,
    /// The backing store (NVS) returned an ESP-IDF error code.
    Storage(i32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::Storage(rc) => write!(f, "storage error (rc={})", rc),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
