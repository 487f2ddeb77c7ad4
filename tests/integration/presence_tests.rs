//! End-to-end debounce behaviour of `PresenceSensor` on the simulated pin.

use std::sync::{Arc, mpsc};
use std::time::Duration;

use roboarm_presence::config::{Pull, SensorConfig};
use roboarm_presence::drivers::gpio::SimGpio;
use roboarm_presence::drivers::task::Core;
use roboarm_presence::error::{InitError, ObserverError, TaskError};
use roboarm_presence::sensors::{ObservableSensor, PresenceSensor, SensorState};

use crate::mock_rtos::{FlakyRtos, PIN, Recorder, RetainingGpio, ScriptedRtos, TIMEOUT, wait_until};

fn live_sensor(gpio: &Arc<SimGpio>, rtos: &Arc<ScriptedRtos>) -> PresenceSensor<SimGpio, ScriptedRtos> {
    let mut sensor = PresenceSensor::new("presence", Arc::clone(gpio), Arc::clone(rtos), SensorConfig::default());
    sensor.begin(PIN).unwrap();
    sensor
}

fn cycles<G, R>(sensor: &PresenceSensor<G, R>) -> u32
where
    G: roboarm_presence::app::ports::GpioPort + 'static,
    R: roboarm_presence::app::ports::RtosPort + 'static,
{
    sensor.diagnostics().snapshot().cycles
}

// ── Scenarios ─────────────────────────────────────────────────

#[test]
fn pulse_held_past_the_window_notifies_once() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let sensor = live_sensor(&gpio, &rtos);
    let rec = Recorder::leaked();
    sensor.add_observer(rec).unwrap();

    gpio.set_level(PIN, true);

    assert_eq!(rec.wait_for(1), vec![true]);
    assert!(wait_until(|| cycles(&sensor) == 1));
    assert_eq!(rec.values(), vec![true]);
    assert!(sensor.debounced());
    assert_eq!(rtos.delays(), vec![Duration::from_millis(10)]);

    let snap = sensor.diagnostics().snapshot();
    assert_eq!(snap.edges, 1);
    assert_eq!(snap.notifications, 1);
    assert_eq!(snap.suppressed, 0);
}

#[test]
fn glitch_inside_the_window_is_suppressed() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let sensor = live_sensor(&gpio, &rtos);
    let rec = Recorder::leaked();
    sensor.add_observer(rec).unwrap();

    let g = Arc::clone(&gpio);
    rtos.during_next_settle(move || g.set_level(PIN, false));
    gpio.set_level(PIN, true);

    assert!(wait_until(|| cycles(&sensor) == 1));
    assert!(rec.values().is_empty());
    assert!(!sensor.debounced());
    assert_eq!(gpio.masked_edges(PIN), 1);

    let snap = sensor.diagnostics().snapshot();
    assert_eq!(snap.suppressed, 1);
    assert_eq!(snap.notifications, 0);
}

#[test]
fn two_observers_see_both_transitions_in_order() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let sensor = live_sensor(&gpio, &rtos);
    let (a, b) = (Recorder::leaked(), Recorder::leaked());
    sensor.add_observer(a).unwrap();
    sensor.add_observer(b).unwrap();

    gpio.set_level(PIN, true);
    assert!(wait_until(|| cycles(&sensor) == 1));
    gpio.set_level(PIN, false);
    assert!(wait_until(|| cycles(&sensor) == 2));

    assert_eq!(a.values(), vec![true, false]);
    assert_eq!(b.values(), vec![true, false]);
}

#[test]
fn task_allocation_failure_fails_begin_and_read_stays_defined() {
    let gpio = Arc::new(SimGpio::new());
    gpio.set_level(PIN, true);
    let mut sensor = PresenceSensor::new("presence", Arc::clone(&gpio), Arc::new(FlakyRtos::always()), SensorConfig::default());

    let err = sensor.begin(PIN).unwrap_err();
    assert_eq!(err, InitError::TaskStart(TaskError::SpawnFailed));
    assert_eq!(sensor.state(), SensorState::Disabled(err));
    assert!(!sensor.is_task_running());
    assert!(!gpio.is_configured(PIN));
    assert!(!gpio.has_handler(PIN));

    // Never primed, never touches the pin.
    assert!(!sensor.read());
    assert_eq!(sensor.begin(PIN), Err(InitError::Disabled));
}

// ── Coalescing ────────────────────────────────────────────────

#[test]
fn burst_inside_the_window_yields_one_notification_of_the_final_level() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let sensor = live_sensor(&gpio, &rtos);
    let rec = Recorder::leaked();
    sensor.add_observer(rec).unwrap();

    let g = Arc::clone(&gpio);
    rtos.during_next_settle(move || {
        for _ in 0..5 {
            g.set_level(PIN, false);
            g.set_level(PIN, true);
        }
    });
    gpio.set_level(PIN, true);

    assert_eq!(rec.wait_for(1), vec![true]);
    assert!(wait_until(|| cycles(&sensor) == 1));
    assert_eq!(gpio.masked_edges(PIN), 10);
    assert_eq!(rec.values(), vec![true]);
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn task_runs_with_the_configured_parameters() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let config = SensorConfig {
        settle_ms: 25,
        task_stack_kb: 6,
        task_priority: 3,
        core: Core::Pro,
        pull: Pull::Up,
    };
    let mut sensor = PresenceSensor::new("gripper", Arc::clone(&gpio), Arc::clone(&rtos), config);
    sensor.begin(PIN).unwrap();

    let spawned = rtos.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].name, "gripper");
    assert_eq!(spawned[0].priority, 3);
    assert_eq!(spawned[0].stack_kb, 6);
    assert_eq!(spawned[0].core, Core::Pro);
    assert_eq!(gpio.pull(PIN), Some(Pull::Up));

    gpio.set_level(PIN, true);
    assert!(wait_until(|| cycles(&sensor) == 1));
    assert_eq!(rtos.delays(), vec![Duration::from_millis(25)]);
}

#[test]
fn end_detaches_and_a_second_begin_resumes() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let mut sensor = live_sensor(&gpio, &rtos);
    let rec = Recorder::leaked();
    sensor.add_observer(rec).unwrap();

    sensor.end().unwrap();
    assert_eq!(sensor.state(), SensorState::Inert);
    assert_eq!(sensor.pin(), None);
    assert!(!sensor.is_task_running());
    assert!(!gpio.has_handler(PIN));
    assert!(!gpio.is_interrupt_enabled(PIN));

    gpio.set_level(PIN, true);
    assert_eq!(gpio.masked_edges(PIN), 1);
    assert_eq!(sensor.diagnostics().snapshot().edges, 0);
    // Inert: last debounced value, not the pin.
    assert!(!sensor.read());

    sensor.begin(PIN).unwrap();
    assert!(sensor.is_live());
    assert!(sensor.debounced(), "re-begin primes from the current level");
    assert_eq!(sensor.observer_count(), 1, "observers survive end()");

    gpio.set_level(PIN, false);
    assert_eq!(rec.wait_for(1), vec![false]);
}

#[test]
fn end_during_a_settle_leaves_the_pin_masked() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let config = SensorConfig { settle_ms: 200, ..SensorConfig::default() };
    let mut sensor = PresenceSensor::new("presence", Arc::clone(&gpio), Arc::clone(&rtos), config);
    let rec = Recorder::leaked();
    sensor.add_observer(rec).unwrap();
    sensor.begin(PIN).unwrap();

    let (settling, in_settle) = mpsc::channel();
    rtos.during_next_settle(move || settling.send(()).unwrap());
    gpio.set_level(PIN, true);
    in_settle.recv_timeout(TIMEOUT).unwrap();
    assert!(!gpio.is_interrupt_enabled(PIN));

    sensor.end().unwrap();

    assert!(!gpio.is_interrupt_enabled(PIN), "the finishing cycle must not leave the pin unmasked");
    assert!(!gpio.has_handler(PIN));
    assert!(!sensor.is_task_running());
    // The in-flight cycle ran to completion before the join returned.
    assert_eq!(cycles(&sensor), 1);
    assert_eq!(rec.values(), vec![true]);

    gpio.set_level(PIN, false);
    assert_eq!(gpio.masked_edges(PIN), 1);
}

#[test]
fn late_interrupt_after_end_is_counted_as_spurious() {
    let gpio = Arc::new(RetainingGpio::default());
    let mut sensor = PresenceSensor::new("presence", Arc::clone(&gpio), Arc::new(ScriptedRtos::new()), SensorConfig::default());
    let rec = Recorder::leaked();
    sensor.add_observer(rec).unwrap();
    sensor.begin(PIN).unwrap();
    sensor.end().unwrap();

    gpio.fire_retained();
    gpio.fire_retained();

    let snap = sensor.diagnostics().snapshot();
    assert_eq!(snap.spurious_signals, 2);
    assert_eq!(snap.edges, 0);
    assert_eq!(snap.cycles, 0);
    assert!(rec.values().is_empty());
}

#[test]
fn dropping_a_live_sensor_tears_it_down() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    {
        let _sensor = live_sensor(&gpio, &rtos);
        assert!(gpio.has_handler(PIN));
    }
    assert!(!gpio.has_handler(PIN));
    assert!(!gpio.is_interrupt_enabled(PIN));
}

// ── Observers ─────────────────────────────────────────────────

#[test]
fn observer_registration_is_bounded_and_unique() {
    let gpio = Arc::new(SimGpio::new());
    let sensor: PresenceSensor<SimGpio, ScriptedRtos> =
        PresenceSensor::new("presence", gpio, Arc::new(ScriptedRtos::new()), SensorConfig::default());

    let first = Recorder::leaked();
    sensor.add_observer(first).unwrap();
    assert_eq!(sensor.add_observer(first), Err(ObserverError::AlreadyRegistered));
    for _ in 1..roboarm_presence::config::MAX_OBSERVERS_PER_SENSOR {
        sensor.add_observer(Recorder::leaked()).unwrap();
    }
    assert_eq!(sensor.add_observer(Recorder::leaked()), Err(ObserverError::CapacityExceeded));
    assert_eq!(sensor.observer_count(), roboarm_presence::config::MAX_OBSERVERS_PER_SENSOR);

    assert!(sensor.remove_observer(first));
    assert!(!sensor.remove_observer(first));
    sensor.notify_observers(true);
    assert!(first.values().is_empty());

    sensor.clear_observers();
    assert_eq!(sensor.observer_count(), 0);
}

#[test]
fn observer_removed_mid_run_stops_receiving() {
    let gpio = Arc::new(SimGpio::new());
    let rtos = Arc::new(ScriptedRtos::new());
    let sensor = live_sensor(&gpio, &rtos);
    let (stays, leaves) = (Recorder::leaked(), Recorder::leaked());
    sensor.add_observer(stays).unwrap();
    sensor.add_observer(leaves).unwrap();

    gpio.set_level(PIN, true);
    assert!(wait_until(|| cycles(&sensor) == 1));
    assert!(sensor.remove_observer(leaves));
    gpio.set_level(PIN, false);
    assert!(wait_until(|| cycles(&sensor) == 2));

    assert_eq!(stays.values(), vec![true, false]);
    assert_eq!(leaves.values(), vec![true]);
}
