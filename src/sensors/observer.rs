//! Fixed-capacity observer registry.
//!
//! Observers are owned elsewhere; the registry stores `&'static` references
//! in a `heapless::Vec`, so the bound is a compile-time constant and
//! registration never touches the heap.  The `'static` bound is what lets
//! the sensor's background task deliver to them without a liveness check.

use std::sync::{Mutex, PoisonError};

use crate::config::MAX_OBSERVERS_PER_SENSOR;
use crate::error::ObserverError;

/// Receives value-change notifications from a sensor.
pub trait Observer<T>: Send + Sync {
    fn receive(&self, value: T);
}

impl<T, F: Fn(T) + Send + Sync> Observer<T> for F {
    fn receive(&self, value: T) {
        self(value);
    }
}

/// Non-owning observer reference.
pub type ObserverRef<T> = &'static dyn Observer<T>;

fn same_observer<T>(a: ObserverRef<T>, b: ObserverRef<T>) -> bool {
    core::ptr::addr_eq(a as *const dyn Observer<T>, b as *const dyn Observer<T>)
}

/// Ordered, duplicate-free set of at most `N` observers.
pub struct ObserverSet<T: 'static, const N: usize = MAX_OBSERVERS_PER_SENSOR> {
    observers: heapless::Vec<ObserverRef<T>, N>,
}

impl<T: 'static, const N: usize> Clone for ObserverSet<T, N> {
    fn clone(&self) -> Self {
        Self { observers: self.observers.clone() }
    }
}

impl<T: 'static, const N: usize> Default for ObserverSet<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, const N: usize> ObserverSet<T, N> {
    pub const fn new() -> Self {
        Self { observers: heapless::Vec::new() }
    }

    /// Append `observer`.  Existing observers are untouched on error.
    pub fn add(&mut self, observer: ObserverRef<T>) -> Result<(), ObserverError> {
        if self.contains(observer) {
            return Err(ObserverError::AlreadyRegistered);
        }
        self.observers
            .push(observer)
            .map_err(|_| ObserverError::CapacityExceeded)
    }

    /// Remove `observer`, keeping the others in registration order.
    /// Returns whether it was registered.
    pub fn remove(&mut self, observer: ObserverRef<T>) -> bool {
        match self.observers.iter().position(|o| same_observer(*o, observer)) {
            Some(i) => {
                self.observers.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, observer: ObserverRef<T>) -> bool {
        self.observers.iter().any(|o| same_observer(*o, observer))
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Deliver `value` to every observer in registration order.
    pub fn notify(&self, value: T)
    where
        T: Copy,
    {
        for observer in &self.observers {
            observer.receive(value);
        }
    }
}

/// [`ObserverSet`] shared between setup code and a sensor task.
///
/// Delivery works on a snapshot taken under the lock, so an observer may
/// (un)subscribe from inside `receive` without deadlocking.
pub struct Observable<T: 'static, const N: usize = MAX_OBSERVERS_PER_SENSOR> {
    set: Mutex<ObserverSet<T, N>>,
}

impl<T: 'static, const N: usize> Default for Observable<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, const N: usize> Observable<T, N> {
    pub const fn new() -> Self {
        Self { set: Mutex::new(ObserverSet::new()) }
    }

    fn with_set<R>(&self, f: impl FnOnce(&mut ObserverSet<T, N>) -> R) -> R {
        let mut guard = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn add(&self, observer: ObserverRef<T>) -> Result<(), ObserverError> {
        self.with_set(|s| s.add(observer))
    }

    pub fn remove(&self, observer: ObserverRef<T>) -> bool {
        self.with_set(|s| s.remove(observer))
    }

    pub fn clear(&self) {
        self.with_set(ObserverSet::clear);
    }

    pub fn len(&self) -> usize {
        self.with_set(|s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, value: T)
    where
        T: Copy,
    {
        let snapshot = self.with_set(|s| s.clone());
        snapshot.notify(value);
    }
}
