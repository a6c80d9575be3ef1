//! Recognizer adapter with listen generations.
//!
//! [`SpeechInputAdapter`] owns a [`SpeechRecognizer`] and tracks whether a
//! listen is active.  Every `start` gets a fresh generation number that is
//! stamped onto the events of that listen; after `abort` (or once the listen
//! has produced its terminal event) events carrying an older generation are
//! reported as stale by [`is_current`](SpeechInputAdapter::is_current).

use super::{RecognitionEvent, RecognitionSink, SpeechError, SpeechRecognizer};

pub struct SpeechInputAdapter {
    recognizer: Box<dyn SpeechRecognizer>,
    generation: u64,
    listening: bool,
}

impl SpeechInputAdapter {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            generation: 0,
            listening: false,
        }
    }

    /// Begin a new listen.
    ///
    /// `deliver` receives every event of this listen together with its
    /// generation.  Calling `start` while already listening is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the recognizer's error, typically
    /// [`SpeechError::CapabilityUnavailable`].
    pub fn start<F>(&mut self, deliver: F) -> Result<(), SpeechError>
    where
        F: Fn(u64, RecognitionEvent) + Send + Sync + 'static,
    {
        if self.listening {
            return Ok(());
        }
        let generation = self.generation + 1;
        self.recognizer
            .start(RecognitionSink::new(move |event| deliver(generation, event)))?;
        self.generation = generation;
        self.listening = true;
        log::debug!("speech input: listen #{generation} started");
        Ok(())
    }

    /// Halt the active listen and invalidate its pending events.
    ///
    /// Idempotent: does nothing when not listening.
    pub fn abort(&mut self) {
        if !self.listening {
            return;
        }
        self.recognizer.abort();
        self.listening = false;
        self.generation += 1;
        log::debug!("speech input: aborted");
    }

    /// Record that the listen `generation` produced its terminal event.
    pub fn settle(&mut self, generation: u64) {
        if self.listening && generation == self.generation {
            self.listening = false;
        }
    }

    /// `true` when events stamped with `generation` belong to the live listen.
    pub fn is_current(&self, generation: u64) -> bool {
        self.listening && generation == self.generation
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        starts: usize,
        aborts: usize,
        sink: Option<RecognitionSink>,
    }

    struct FakeRecognizer {
        calls: Arc<Mutex<Calls>>,
        available: bool,
    }

    impl SpeechRecognizer for FakeRecognizer {
        fn start(&mut self, sink: RecognitionSink) -> Result<(), SpeechError> {
            if !self.available {
                return Err(SpeechError::CapabilityUnavailable("none".into()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.starts += 1;
            calls.sink = Some(sink);
            Ok(())
        }

        fn abort(&mut self) {
            self.calls.lock().unwrap().aborts += 1;
        }
    }

    fn adapter(available: bool) -> (SpeechInputAdapter, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let rec = FakeRecognizer {
            calls: Arc::clone(&calls),
            available,
        };
        (SpeechInputAdapter::new(Box::new(rec)), calls)
    }

    #[test]
    fn start_stamps_events_with_generation() {
        let (mut input, calls) = adapter(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let target = Arc::clone(&seen);
        input
            .start(move |g, ev| target.lock().unwrap().push((g, ev)))
            .unwrap();

        let sink = calls.lock().unwrap().sink.clone().unwrap();
        sink.emit(RecognitionEvent::NoResult);

        assert_eq!(*seen.lock().unwrap(), vec![(1, RecognitionEvent::NoResult)]);
        assert!(input.is_current(1));
    }

    #[test]
    fn second_start_while_listening_is_noop() {
        let (mut input, calls) = adapter(true);
        input.start(|_, _| {}).unwrap();
        input.start(|_, _| {}).unwrap();
        assert_eq!(calls.lock().unwrap().starts, 1);
    }

    #[test]
    fn abort_is_idempotent_and_invalidates() {
        let (mut input, calls) = adapter(true);
        input.start(|_, _| {}).unwrap();
        input.abort();
        input.abort();

        assert_eq!(calls.lock().unwrap().aborts, 1);
        assert!(!input.is_listening());
        assert!(!input.is_current(1));
    }

    #[test]
    fn settle_ends_only_the_matching_listen() {
        let (mut input, _calls) = adapter(true);
        input.start(|_, _| {}).unwrap();
        input.settle(7);
        assert!(input.is_listening());
        input.settle(1);
        assert!(!input.is_listening());
    }

    #[test]
    fn restart_after_abort_uses_new_generation() {
        let (mut input, _calls) = adapter(true);
        input.start(|_, _| {}).unwrap();
        input.abort();
        input.start(|_, _| {}).unwrap();
        assert!(!input.is_current(1));
        assert!(input.is_current(3));
    }

    #[test]
    fn unavailable_capability_is_reported() {
        let (mut input, _calls) = adapter(false);
        let err = input.start(|_, _| {}).unwrap_err();
        assert!(matches!(err, SpeechError::CapabilityUnavailable(_)));
        assert!(!input.is_listening());
    }
}
