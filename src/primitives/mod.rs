// ============================================================================
// reactive-core - Primitives Module
// Public reactive building blocks: signal, memo, effect, lazy promise and
// its combinators.
// ============================================================================

pub mod combinators;
pub mod effect;
pub mod memo;
pub mod promise;
pub mod signal;

pub use combinators::{catch_error, eager, lazy, map, CancelSignal, Eager, EagerError, LazyError, Projected};
pub use effect::effect;
pub use memo::{memo, memo_with_equals, Memo};
pub use promise::{create_lazy_promise, is_lazy_promise, never, IsLazyPromise, LazyPromise, Reject, Resolve};
pub use signal::{signal, signal_always_notify, signal_with_equals, Signal};
