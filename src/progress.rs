//! Progress-callback trait for streaming quiz generation.
//!
//! Inject an [`Arc<dyn QuizProgressCallback>`] via
//! [`crate::config::QuizConfigBuilder::progress_callback`] to receive events
//! as [`crate::stream::generate_quiz_stream`] observes questions arriving.
//! The same information is available from the stream items themselves; the
//! callback exists for hosts that want a side channel (a terminal progress
//! bar, a websocket push) without re-plumbing the stream consumer.
//!
//! # Example
//!
//! ```rust
//! use quizforge::{QuizConfig, QuizProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl QuizProgressCallback for Counter {
//!     fn on_question_ready(&self, index: usize, expected: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("question {}/{} ready", index + 1, expected);
//!     }
//! }
//!
//! let config = QuizConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the streaming pipeline as a quiz is generated.
///
/// All methods have no-op defaults. Calls for one generation arrive in
/// order from a single task; separate generations may call concurrently.
pub trait QuizProgressCallback: Send + Sync {
    /// The request has been sent; `expected` questions were asked for.
    fn on_generation_start(&self, expected: usize) {
        let _ = expected;
    }

    /// Question `index` (0-based) is complete in the partial reply.
    fn on_question_ready(&self, index: usize, expected: usize) {
        let _ = (index, expected);
    }

    /// The quiz passed validation.
    fn on_generation_complete(&self, question_count: usize) {
        let _ = question_count;
    }

    /// The run ended in a failure.
    fn on_generation_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl QuizProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::QuizConfig`].
pub type ProgressCallback = Arc<dyn QuizProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl QuizProgressCallback for Recorder {
        fn on_generation_start(&self, expected: usize) {
            self.events.lock().unwrap().push(format!("start:{expected}"));
        }

        fn on_question_ready(&self, index: usize, _expected: usize) {
            self.events.lock().unwrap().push(format!("ready:{index}"));
        }

        fn on_generation_error(&self, error: &str) {
            self.events.lock().unwrap().push(format!("error:{error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_generation_start(4);
        cb.on_question_ready(0, 4);
        cb.on_generation_complete(4);
        cb.on_generation_error("boom");
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_generation_start(2);
        rec.on_question_ready(0, 2);
        rec.on_question_ready(1, 2);
        rec.on_generation_complete(2);
        rec.on_generation_error("late");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start:2", "ready:0", "ready:1", "error:late"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_generation_start(10);
        cb.on_question_ready(3, 10);
    }
}
