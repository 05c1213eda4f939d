use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::CoreError;
use crate::state::CameraState;

/// Events pushed from the camera controller to attached observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// An applied lifecycle transition. Also sent for the `Recording ->
    /// Recording` self-transition on every chunk rotation.
    StateChanged(CameraState),
    /// Sent to a single observer right after it is attached, carrying the
    /// state at attach time so the observer does not race the next
    /// natural transition.
    Attached(CameraState),
    /// Sent to a single observer right after it is detached.
    Detached,
}

/// An observer of camera lifecycle events.
///
/// `update` runs synchronously on the notifying thread and must return
/// quickly; a slow observer stalls whoever requested the transition.
/// Observers must not call back into the controller from `update`.
pub trait Observer: Send + Sync {
    fn update(&self, event: &CameraEvent) -> Result<(), CoreError>;
}

/// Fan-out of camera events to an ordered list of observers.
///
/// A failing observer is logged and skipped; delivery to the remaining
/// observers is unaffected.
#[derive(Default)]
pub struct ObserverHub {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer and immediately delivers `Attached` with the
    /// current state.
    pub fn attach(&self, observer: Arc<dyn Observer>, current: CameraState) {
        self.observers.lock().unwrap().push(Arc::clone(&observer));
        Self::deliver(observer.as_ref(), &CameraEvent::Attached(current));
    }

    /// Removes an observer by identity and delivers `Detached` to it.
    /// Unknown observers are ignored.
    pub fn detach(&self, observer: &Arc<dyn Observer>) {
        let removed = {
            let mut observers = self.observers.lock().unwrap();
            match observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
                Some(pos) => {
                    observers.remove(pos);
                    true
                }
                None => false,
            }
        };
        if removed {
            Self::deliver(observer.as_ref(), &CameraEvent::Detached);
        }
    }

    /// Delivers `event` to every attached observer in attachment order.
    pub fn notify(&self, event: &CameraEvent) {
        // Snapshot the list so updates run without holding the hub lock.
        let observers: Vec<_> = self.observers.lock().unwrap().clone();
        for observer in &observers {
            Self::deliver(observer.as_ref(), event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    fn deliver(observer: &dyn Observer, event: &CameraEvent) {
        if let Err(e) = observer.update(event) {
            warn!("observer failed to handle {:?}: {}", event, e);
        }
    }
}
