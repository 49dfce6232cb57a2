//! Observer registration and dispatch

use crate::{MonitorError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error};
use trunkr_core::StateSnapshot;
use uuid::Uuid;

/// Receives state after every committed refresh
///
/// Closures `Fn(&StateSnapshot) -> Result<()>` implement this trait.
pub trait StateObserver: Send + Sync {
    /// Called with a copy of the current state
    ///
    /// # Errors
    ///
    /// A returned error is logged and otherwise ignored.
    fn on_update(&self, snapshot: &StateSnapshot) -> Result<()>;
}

impl<F> StateObserver for F
where
    F: Fn(&StateSnapshot) -> Result<()> + Send + Sync,
{
    fn on_update(&self, snapshot: &StateSnapshot) -> Result<()> {
        self(snapshot)
    }
}

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Entry = (ObserverId, Arc<dyn StateObserver>);

/// Registered observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<Entry>>,
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer, then invoke it once with the snapshot from `current`
    ///
    /// `current` runs only after the observer is in the registry, so a
    /// refresh committed in between is either dispatched to it or contained
    /// in the replay. The replay runs on the caller's thread before this
    /// returns. A failing replay is logged and the observer stays registered.
    pub fn register<F>(&self, observer: Arc<dyn StateObserver>, current: F) -> ObserverId
    where
        F: FnOnce() -> StateSnapshot,
    {
        let id = ObserverId::new();
        self.observers.write().push((id, Arc::clone(&observer)));
        debug!(observer = %id, total = self.len(), "Observer registered");

        if let Err(e) = invoke(&observer, &current()) {
            error!(observer = %id, error = %e, "Observer failed on initial replay");
        }
        id
    }

    /// Remove an observer; `false` when the id is unknown
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        let removed = observers.len() != before;
        drop(observers);

        if removed {
            debug!(observer = %id, "Observer unregistered");
        }
        removed
    }

    /// Invoke every observer with `snapshot`
    ///
    /// Returns the number of observers that failed. Observers are called
    /// outside the registry lock, so they may register or unregister.
    pub fn notify_all(&self, snapshot: &StateSnapshot) -> usize {
        let observers: Vec<Entry> = self.observers.read().clone();

        observers
            .iter()
            .filter(|(id, observer)| match invoke(observer, snapshot) {
                Ok(()) => false,
                Err(e) => {
                    error!(observer = %id, error = %e, "Observer failed");
                    true
                }
            })
            .count()
    }

    /// Number of registered observers
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

fn invoke(observer: &Arc<dyn StateObserver>, snapshot: &StateSnapshot) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| observer.on_update(snapshot))) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(MonitorError::observer(format!("panicked: {message}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn StateObserver>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer: Arc<dyn StateObserver> = Arc::new(move |_: &StateSnapshot| -> Result<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, observer)
    }

    #[test]
    fn test_register_replays_once() {
        let registry = ObserverRegistry::new();
        let (count, observer) = counting();

        registry.register(observer, StateSnapshot::default);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_replay_sees_current_state() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let observer: Arc<dyn StateObserver> = Arc::new(move |s: &StateSnapshot| -> Result<()> {
            *sink.lock() = s.refreshed_at;
            Ok(())
        });

        let current = StateSnapshot {
            refreshed_at: Some(1234),
            ..StateSnapshot::default()
        };
        registry.register(observer, || current);
        assert_eq!(*seen.lock(), Some(1234));
    }

    #[test]
    fn test_replay_snapshot_taken_after_registration() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Arc<dyn StateObserver> = Arc::new(move |s: &StateSnapshot| -> Result<()> {
            sink.lock().push(s.refreshed_at);
            Ok(())
        });

        let older = StateSnapshot {
            refreshed_at: Some(100),
            ..StateSnapshot::default()
        };
        registry.register(observer, || {
            // A refresh dispatched while the replay snapshot is being read
            assert_eq!(registry.len(), 1);
            registry.notify_all(&older);
            StateSnapshot {
                refreshed_at: Some(101),
                ..StateSnapshot::default()
            }
        });

        assert_eq!(*seen.lock(), vec![Some(100), Some(101)]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = ObserverRegistry::new();
        let snapshot = StateSnapshot::default();

        let (before, first) = counting();
        registry.register(first, || snapshot.clone());

        let failing: Arc<dyn StateObserver> =
            Arc::new(|_: &StateSnapshot| -> Result<()> { Err(MonitorError::observer("render failed")) });
        registry.register(failing, || snapshot.clone());

        let panicking: Arc<dyn StateObserver> =
            Arc::new(|_: &StateSnapshot| -> Result<()> { panic!("terminal gone") });
        registry.register(panicking, || snapshot.clone());

        let (after, last) = counting();
        registry.register(last, || snapshot.clone());

        let failures = registry.notify_all(&snapshot);
        assert_eq!(failures, 2);
        assert_eq!(before.load(Ordering::SeqCst), 2);
        assert_eq!(after.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_unregister() {
        let registry = ObserverRegistry::new();
        let (count, observer) = counting();
        let id = registry.register(observer, StateSnapshot::default);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());

        registry.notify_all(&StateSnapshot::default());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_unregister_itself() {
        let registry = Arc::new(ObserverRegistry::new());
        let id_slot = Arc::new(parking_lot::Mutex::new(None::<ObserverId>));

        let handle = Arc::clone(&registry);
        let slot = Arc::clone(&id_slot);
        let observer: Arc<dyn StateObserver> = Arc::new(move |_: &StateSnapshot| -> Result<()> {
            if let Some(id) = *slot.lock() {
                handle.unregister(id);
            }
            Ok(())
        });

        let id = registry.register(observer, StateSnapshot::default);
        *id_slot.lock() = Some(id);

        registry.notify_all(&StateSnapshot::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_debug_shows_count() {
        let registry = ObserverRegistry::new();
        let (_, observer) = counting();
        registry.register(observer, StateSnapshot::default);
        assert_eq!(format!("{registry:?}"), "ObserverRegistry { observers: 1 }");
    }
}
