// ============================================================================
// reactive-core - Reactive Context
// Thread-local state shared by the propagation engine and the scope tree.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use super::types::AnyReaction;
use crate::error::ReactiveError;
use crate::scope::ScopeInner;

/// Thread-local runtime state: the currently-executing reaction, the
/// currently-active scope, the batch depth, and the pending effect queue.
/// All reactive operations run on one thread by design (see spec Section 5);
/// there is no cross-thread synchronization anywhere in this crate.
pub struct ReactiveContext {
    /// Currently executing reaction, if any. `pull` registers a dependency
    /// edge against this when present and not untracking.
    active_reaction: RefCell<Option<Weak<dyn AnyReaction>>>,

    /// Whether `untrack` is suppressing dependency recording.
    untracking: Cell<bool>,

    /// Scope active for the extent of the innermost `run_in_scope` call.
    active_scope: RefCell<Option<Weak<ScopeInner>>>,

    /// Batch nesting depth; the effect queue only drains when this reaches 0.
    batch_depth: Cell<u32>,

    /// FIFO of effects awaiting a sweep. An effect's `ENQUEUED` flag bit
    /// mirrors membership here to keep enqueueing idempotent.
    effect_queue: RefCell<VecDeque<Weak<dyn AnyReaction>>>,

    /// Re-entrancy guard so a push triggered while already draining the
    /// queue doesn't start a second concurrent drain loop.
    draining: Cell<bool>,

    /// Hook invoked for errors that have nowhere synchronous to go: an
    /// unhandled `runInScope` error with no ancestor handler, or an error
    /// raised from a disposable during `disposeScope`. Defaults to an
    /// eprintln in debug builds and a no-op in release builds, since a
    /// synchronous library has no event loop of its own to schedule onto.
    defer_error_hook: RefCell<Rc<dyn Fn(ReactiveError)>>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            active_reaction: RefCell::new(None),
            untracking: Cell::new(false),
            active_scope: RefCell::new(None),
            batch_depth: Cell::new(0),
            effect_queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            defer_error_hook: RefCell::new(Rc::new(default_defer_error)),
        }
    }

    pub fn active_reaction(&self) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.borrow().clone()
    }

    pub fn set_active_reaction(
        &self,
        reaction: Option<Weak<dyn AnyReaction>>,
    ) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.replace(reaction)
    }

    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn active_scope(&self) -> Option<Rc<ScopeInner>> {
        self.active_scope.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_active_scope(&self, scope: Option<Weak<ScopeInner>>) -> Option<Weak<ScopeInner>> {
        self.active_scope.replace(scope)
    }

    pub fn batch_depth(&self) -> u32 {
        self.batch_depth.get()
    }

    pub fn enter_batch(&self) -> u32 {
        let d = self.batch_depth.get() + 1;
        self.batch_depth.set(d);
        d
    }

    pub fn exit_batch(&self) -> u32 {
        let d = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(d);
        d
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    pub fn enqueue_effect(&self, effect: Weak<dyn AnyReaction>) {
        self.effect_queue.borrow_mut().push_back(effect);
    }

    pub fn pop_effect(&self) -> Option<Weak<dyn AnyReaction>> {
        self.effect_queue.borrow_mut().pop_front()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.effect_queue.borrow().is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    pub fn set_draining(&self, value: bool) -> bool {
        self.draining.replace(value)
    }

    pub fn defer_error(&self, error: ReactiveError) {
        let hook = self.defer_error_hook.borrow().clone();
        hook(error);
    }

    pub fn set_defer_error_hook(&self, hook: Rc<dyn Fn(ReactiveError)>) {
        *self.defer_error_hook.borrow_mut() = hook;
    }
}

fn default_defer_error(error: ReactiveError) {
    #[cfg(debug_assertions)]
    {
        eprintln!("reactive-core: unhandled error deferred: {error}");
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = error;
    }
}

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

/// True when a reaction is executing and `untrack` is not suppressing it.
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.active_reaction().is_some() && !ctx.is_untracking())
}

/// True when inside `untrack`.
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

/// True when inside `batch`.
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

/// Install a custom error-deferral hook. Intended for tests that need to
/// observe errors that would otherwise only be `eprintln!`'d in debug
/// builds; see spec Section 7 and Design Notes.
pub fn set_error_deferral_hook(hook: impl Fn(ReactiveError) + 'static) {
    with_context(|ctx| ctx.set_defer_error_hook(Rc::new(hook)));
}
