// ============================================================================
// reactive-core - Error type
//
// User callback errors (a reaction body, a disposable, a lazy promise
// producer) are caught at the engine's call sites with `catch_unwind` and
// carried as `ReactiveError` rather than left to unwind arbitrarily, per
// spec Section 7. Misuse conditions (double-resolve, operating on a
// disposed scope, re-disposing a scope) remain plain panics raised
// synchronously at the call site, matching the spec's own "raises
// immediately" language.
// ============================================================================

use std::any::Any;
use std::fmt;

/// A caught panic payload, carried through scope error handlers and the
/// microtask-deferral hook.
pub struct ReactiveError {
    payload: Box<dyn Any + Send + 'static>,
}

impl ReactiveError {
    pub fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// Borrow the payload as a string message when it is one, which covers
    /// the overwhelming majority of panics raised via `panic!`/`unwrap`.
    pub fn message(&self) -> &str {
        if let Some(s) = self.payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = self.payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "non-string panic payload"
        }
    }

    pub fn into_payload(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }
}

impl fmt::Debug for ReactiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveError").field("message", &self.message()).finish()
    }
}

impl fmt::Display for ReactiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ReactiveError {}
