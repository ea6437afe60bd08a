// ============================================================================
// reactive-core - A Synchronous Fine-Grained Reactivity Runtime
// ============================================================================
//
// Signals, memos and effects wired through a single propagation engine that
// marks dependents dirty (or merely "might be dirty") and only recomputes
// what a read actually demands. Scopes form an intrusive tree so disposing
// one subtree tears down every signal, memo and effect it owns in a single
// pass. `LazyPromise` extends the same graph to one-shot asynchronous
// production: pull-activated, cancellable, and re-producible after every
// subscriber has gone away.
//
// Everything here runs on one thread against thread-local state; there is
// no scheduler, no executor, and no cross-thread synchronization.
// ============================================================================

pub mod core;
pub mod error;
pub mod graph;
pub mod primitives;
pub mod scope;

pub use core::context::set_error_deferral_hook;
pub use core::types::{default_equals, AnyReaction, AnySource, EqualsFn};
pub use error::ReactiveError;

pub use graph::{batch, push, push_self, pull, untrack};

pub use scope::{
    create_root_scope, create_scope, create_scope_with_parent, current_scope, dispose_scope,
    get_context, is_ancestor, is_descendant, is_scope_disposed, is_scope_running, on_dispose,
    run_in_scope, set_context, ContextKey, Scope,
};

pub use primitives::{
    catch_error, create_lazy_promise, eager, effect, is_lazy_promise, lazy, map, memo,
    memo_with_equals, never, signal, signal_always_notify, signal_with_equals, CancelSignal,
    Eager, EagerError, IsLazyPromise, LazyError, LazyPromise, Memo, Projected, Reject, Resolve,
    Signal,
};
