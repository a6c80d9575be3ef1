//! Callback plumbing shared by the capability adapters and the transport.
//!
//! Speech engines and the network reader run on their own tasks and report
//! back through an [`EventSink`].  The session coordinator builds each sink
//! with a closure that stamps the event with the session epoch (and listen /
//! utterance generation) before queueing it, so a late callback can always
//! be recognised as stale.

use std::fmt;
use std::sync::Arc;

/// Cloneable, thread-safe callback that receives events of type `E`.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use voice_dialogue::events::EventSink;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen2 = Arc::clone(&seen);
/// let sink = EventSink::new(move |n: u32| seen2.lock().unwrap().push(n));
///
/// sink.emit(1);
/// sink.clone().emit(2);
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// ```
pub struct EventSink<E> {
    deliver: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> EventSink<E> {
    /// Wrap `deliver` as a sink.
    pub fn new(deliver: impl Fn(E) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Hand `event` to the owner of this sink.
    ///
    /// Never blocks; delivery into a closed channel is silently dropped by
    /// the closures the coordinator installs.
    pub fn emit(&self, event: E) {
        (self.deliver)(event);
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<E> fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}
