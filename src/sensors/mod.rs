//! Sensor subsystem: the generic observable-value contract and the
//! interrupt-debounced presence sensor built on it.

pub mod observer;
pub mod presence;

use crate::error::ObserverError;
use observer::{Observable, ObserverRef};

pub use presence::{Debouncer, PresenceSensor, SensorState};

/// A value source that publishes changes to registered observers.
///
/// Implementors expose their [`Observable`]; registration and delivery
/// come for free.
pub trait ObservableSensor<T: Copy + 'static> {
    fn observers(&self) -> &Observable<T>;

    /// Instantaneous value, as the implementor defines it.
    fn read(&self) -> T;

    /// Register `observer`.  Fails without side effects when the set is
    /// full or `observer` is already registered.
    fn add_observer(&self, observer: ObserverRef<T>) -> Result<(), ObserverError> {
        self.observers().add(observer)
    }

    /// Unregister `observer`; returns whether it was registered.
    fn remove_observer(&self, observer: ObserverRef<T>) -> bool {
        self.observers().remove(observer)
    }

    /// Deliver `value` to every observer, in registration order, on the
    /// calling thread.
    fn notify_observers(&self, value: T) {
        self.observers().notify(value);
    }

    fn observer_count(&self) -> usize {
        self.observers().len()
    }

    fn clear_observers(&self) {
        self.observers().clear();
    }
}
