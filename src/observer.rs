/// Registry of listeners told when the display properties change.
use log::{debug, error};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// The connector went from connected to disconnected or back.
    HdmiChange,
    /// Resolution, refresh rate or physical size changed while connected.
    ResolutionChange,
    HdcpChange,
    /// HDR mode or audio passthrough changed with the same geometry.
    FormatChange,
}

/// Callers re-read the snapshot accessors for the new values.
pub trait DisplayObserver: Send + Sync {
    fn updated(&self, reason: ChangeReason);
}

#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Arc<dyn DisplayObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn DisplayObserver>>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Panics if `observer` is already registered.
    pub fn register(&self, observer: Arc<dyn DisplayObserver>) {
        let mut observers = self.lock();
        let present = observers.iter().any(|o| Arc::ptr_eq(o, &observer));
        if present {
            drop(observers);
            panic!("display observer registered twice");
        }
        observers.push(observer);
        debug!("Registered display observer ({} total)", observers.len());
    }

    /// Panics if `observer` was never registered.
    pub fn unregister(&self, observer: &Arc<dyn DisplayObserver>) {
        let mut observers = self.lock();
        let Some(index) = observers.iter().position(|o| Arc::ptr_eq(o, observer)) else {
            drop(observers);
            panic!("unregistering a display observer that is not registered");
        };
        observers.remove(index);
        debug!("Unregistered display observer ({} left)", observers.len());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call every registrant outside the registry lock.
    ///
    /// A panicking observer is logged and skipped; the rest are still called.
    pub fn notify(&self, reason: ChangeReason) {
        let observers: Vec<_> = self.lock().clone();

        for observer in observers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| observer.updated(reason)));
            if result.is_err() {
                error!("Display observer panicked while handling {:?}", reason);
            }
        }
    }
}
