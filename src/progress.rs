//! Observer trait for session lifecycle events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] via
//! [`crate::session::Session::with_observer`] to be told when the phase
//! changes or a late response is thrown away. The terminal front end uses it
//! to start and stop its spinner; tests use it to record the phase sequence.
//!
//! ```rust
//! use embryo_analyzer::{Phase, Session, SessionObserver};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<Phase>>);
//!
//! impl SessionObserver for Recorder {
//!     fn on_phase_change(&self, _from: Phase, to: Phase) {
//!         self.0.lock().unwrap().push(to);
//!     }
//! }
//!
//! let recorder = Arc::new(Recorder::default());
//! let session = Session::new().with_observer(recorder.clone());
//! assert!(recorder.0.lock().unwrap().is_empty());
//! # drop(session);
//! ```

use crate::session::Phase;
use std::sync::Arc;

/// Receives session events. All methods default to no-ops.
///
/// Calls are made synchronously from inside the session's mutating methods,
/// so implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// The phase moved from `from` to `to`. Not called when a transition
    /// leaves the phase unchanged (e.g. a second invalid selection).
    fn on_phase_change(&self, from: Phase, to: Phase) {
        let _ = (from, to);
    }

    /// A completion arrived for generation `stale` while the session was
    /// already at `current`, and was discarded.
    fn on_stale_response(&self, stale: u64, current: u64) {
        let _ = (stale, current);
    }

    /// A user-facing message was set (validation, failure, or a refused
    /// trigger).
    fn on_message(&self, message: &str) {
        let _ = message;
    }
}

/// Observer that ignores everything. Used when none is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Shared observer handle as stored on the session.
pub type ObserverHandle = Arc<dyn SessionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        changes: AtomicUsize,
        stale: AtomicUsize,
        messages: AtomicUsize,
    }

    impl SessionObserver for Counting {
        fn on_phase_change(&self, _from: Phase, _to: Phase) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stale_response(&self, _stale: u64, _current: u64) {
            self.stale.fetch_add(1, Ordering::SeqCst);
        }

        fn on_message(&self, _message: &str) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_phase_change(Phase::Idle, Phase::Ready);
        o.on_stale_response(1, 2);
        o.on_message("hello");
    }

    #[test]
    fn arc_dyn_observer_receives_events() {
        let counting = Arc::new(Counting::default());
        let handle: ObserverHandle = counting.clone();
        handle.on_phase_change(Phase::Ready, Phase::Requesting);
        handle.on_phase_change(Phase::Requesting, Phase::Success);
        handle.on_stale_response(3, 4);
        handle.on_message("x");

        assert_eq!(counting.changes.load(Ordering::SeqCst), 2);
        assert_eq!(counting.stale.load(Ordering::SeqCst), 1);
        assert_eq!(counting.messages.load(Ordering::SeqCst), 1);
    }
}
