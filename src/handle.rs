//! Stop handles returned by the engine's entry points.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type StopAction = Box<dyn FnOnce() + Send>;

/// A one-shot, clonable "stop" action.
///
/// The first call to [`StopHandle::stop`] (from any clone, on any thread)
/// runs the action; every later call is a no-op.
#[derive(Clone)]
#[must_use = "dropping the handle leaves playback running with no way to stop it"]
pub struct StopHandle {
    action: Arc<Mutex<Option<StopAction>>>,
}

impl StopHandle {
    /// Wraps `action` so that it runs at most once.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    /// A handle with nothing to stop.
    pub fn noop() -> Self {
        Self {
            action: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs the stop action if it has not run yet.
    pub fn stop(&self) {
        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(action) = action {
            action();
        }
    }

    /// Returns true once the action has run (or if there never was one).
    pub fn is_stopped(&self) -> bool {
        self.action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stop_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = StopHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let clone = handle.clone();
        handle.stop();
        clone.stop();
        handle.stop();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(clone.is_stopped());
    }

    #[test]
    fn test_noop_handle() {
        let handle = StopHandle::noop();
        assert!(handle.is_stopped());
        handle.stop();
    }
}
