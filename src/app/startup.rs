//! Boot-time composition of the presence sensors.
//!
//! Builds one [`PresenceSensor`] per binding, subscribes the shared
//! observer and brings each one up.  A sensor whose init fails is kept in
//! the returned list (disabled) so its state and diagnostics stay
//! inspectable; boot continues with the rest.

use std::sync::Arc;

use log::{error, info, warn};

use crate::app::ports::{GpioPort, RtosPort};
use crate::config::SensorConfig;
use crate::sensors::observer::ObserverRef;
use crate::sensors::{ObservableSensor, PresenceSensor};

/// Upper bound on presence sensors wired at boot.
pub const MAX_PRESENCE_SENSORS: usize = 4;

/// A named sensor and the GPIO it listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorBinding {
    pub name: &'static str,
    pub pin: i32,
}

/// Result of [`start_presence_sensors`].
pub struct PresenceSensors<G: GpioPort + 'static, R: RtosPort + 'static> {
    pub sensors: heapless::Vec<PresenceSensor<G, R>, MAX_PRESENCE_SENSORS>,
    /// How many of `sensors` came up live.
    pub live: usize,
}

impl<G: GpioPort + 'static, R: RtosPort + 'static> PresenceSensors<G, R> {
    pub fn get(&self, name: &str) -> Option<&PresenceSensor<G, R>> {
        self.sensors.iter().find(|s| s.name() == name)
    }

    pub fn all_live(&self) -> bool {
        self.live == self.sensors.len()
    }
}

pub fn start_presence_sensors<G, R>(
    gpio: &Arc<G>,
    rtos: &Arc<R>,
    config: SensorConfig,
    bindings: &[SensorBinding],
    observer: ObserverRef<bool>,
) -> PresenceSensors<G, R>
where
    G: GpioPort + 'static,
    R: RtosPort + 'static,
{
    let mut out = PresenceSensors {
        sensors: heapless::Vec::new(),
        live: 0,
    };

    for binding in bindings {
        if out.sensors.is_full() {
            warn!(
                "startup: no slot for '{}' (max {} sensors), skipped",
                binding.name, MAX_PRESENCE_SENSORS
            );
            continue;
        }

        let mut sensor = PresenceSensor::new(binding.name, Arc::clone(gpio), Arc::clone(rtos), config);
        if let Err(e) = sensor.add_observer(observer) {
            warn!("startup: '{}' observer not registered: {}", binding.name, e);
        }

        match sensor.begin(binding.pin) {
            Ok(()) => {
                out.live += 1;
                info!("startup: '{}' live on GPIO{}", binding.name, binding.pin);
            }
            Err(e) => error!(
                "startup: '{}' on GPIO{} failed ({}), continuing without it",
                binding.name, binding.pin, e
            ),
        }

        // Capacity checked above.
        let _ = out.sensors.push(sensor);
    }

    info!("startup: {}/{} presence sensors live", out.live, out.sensors.len());
    out
}
