//! RoboArm presence firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  EspGpio (GpioPort)      ThreadRtos (RtosPort)           │
//! │  NvsConfigStore          LogObserver (Observer<bool>)    │
//! │                                                          │
//! │  ─────────────── Port Trait Boundary ──────────────      │
//! │                                                          │
//! │  PresenceSensor × N: ISR ─▶ debounce task ─▶ observers   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! After startup the main task only idles and periodically logs each
//! sensor's diagnostics as JSON; all sensing happens on the debounce
//! tasks.
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use roboarm_presence::adapters::log_sink::LogObserver;
use roboarm_presence::adapters::nvs::NvsConfigStore;
use roboarm_presence::app::startup::{start_presence_sensors, SensorBinding};
use roboarm_presence::config::SensorConfig;
use roboarm_presence::drivers::gpio::EspGpio;
use roboarm_presence::drivers::task::ThreadRtos;
use roboarm_presence::pins;
use roboarm_presence::sensors::ObservableSensor;

/// Period of the diagnostics log line.
const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(30);

static PRESENCE_LOG: LogObserver = LogObserver::new("presence");

const BINDINGS: &[SensorBinding] = &[
    SensorBinding { name: "gripper", pin: pins::PRESENCE_SENSOR_GPIO },
    SensorBinding { name: "bay", pin: pins::BAY_PRESENCE_GPIO },
];

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("RoboArm presence v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match NvsConfigStore::new() {
        Ok(store) => store.load_or_default(),
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults", e);
            SensorConfig::default()
        }
    };
    info!("Sensor config: {:?}", config);

    // ── 3. Adapters ───────────────────────────────────────────
    let gpio = Arc::new(EspGpio::new()?);
    let rtos = Arc::new(ThreadRtos);

    // ── 4. Sensors ────────────────────────────────────────────
    let presence = start_presence_sensors(&gpio, &rtos, config, BINDINGS, &PRESENCE_LOG);
    if !presence.all_live() {
        warn!(
            "{} of {} presence sensors unavailable",
            presence.sensors.len() - presence.live,
            presence.sensors.len()
        );
    }

    info!("System ready.");

    // ── 5. Idle loop ──────────────────────────────────────────
    loop {
        std::thread::sleep(DIAGNOSTICS_INTERVAL);
        for sensor in &presence.sensors {
            info!(
                "DIAG | {} | state={:?} level={} | {}",
                sensor.name(),
                sensor.state(),
                sensor.read(),
                sensor.diagnostics().snapshot().to_json()
            );
            if let Some(fault) = sensor.diagnostics().last_fault() {
                warn!("DIAG | {} | last fault: {}", sensor.name(), fault);
            }
        }
    }
}
