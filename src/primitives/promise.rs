// ============================================================================
// reactive-core - Lazy promise
//
// A one-shot, lazily-produced, cancellable, reactively-tracked asynchronous
// value (spec 4.E). Its internal state triplet {idle, resolved, rejected} is
// modeled as a reaction exactly like a memo: `call` (the spec's invocation
// with onResolve/onReject) subscribes through an effect, whose first run
// pulls the promise and so triggers `run_once` — production starts there,
// not at construction time. `resolve`/`reject` are the producer's own push:
// they settle the state and `push(self)`, waking every subscriber effect.
//
// Cancellation and the lazy-restart property live outside the graph proper:
// the producer runs inside its own freshly created scope so it can register
// `on_dispose` hooks, and that scope is torn down the moment the subscriber
// count drops to zero, then rebuilt from scratch on the next subscribe.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::{REACTION, SUBJECT};
use crate::core::types::{AnyReaction, AnySource};
use crate::graph::{pull, push};
use crate::primitives::effect::effect;
use crate::scope::{create_root_scope, current_scope, dispose_scope, on_dispose, run_in_scope, Scope};

enum PromiseState<V, E> {
    Idle,
    Resolved(V),
    Rejected(E),
}

struct LazyPromiseInner<V, E> {
    flags: Cell<u32>,
    state: RefCell<PromiseState<V, E>>,
    parents: RefCell<Vec<Weak<dyn AnyReaction>>>,
    children: RefCell<Vec<Rc<dyn AnySource>>>,
    prefix: Cell<usize>,
    flushed: Cell<bool>,
    self_weak: RefCell<Weak<LazyPromiseInner<V, E>>>,

    producer: Box<dyn Fn(Resolve<V, E>, Reject<V, E>)>,
    production_scope: RefCell<Option<Scope>>,
    /// Set once `run_once` has invoked the producer for the current
    /// activation; cleared on cancellation so the next subscribe restarts
    /// production from scratch (the "lazy restart" property).
    started: Cell<bool>,
    /// Set once `resolve`/`reject` has settled this activation; cleared
    /// alongside `started` on restart. Guards against a duplicate
    /// resolve/reject being anything but a client bug.
    settled: Cell<bool>,
    subscriber_count: Cell<usize>,
}

impl<V: 'static, E: 'static> AnySource for LazyPromiseInner<V, E> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn parents(&self) -> &RefCell<Vec<Weak<dyn AnyReaction>>> {
        &self.parents
    }

    fn as_reaction(&self) -> Option<Rc<dyn AnyReaction>> {
        self.self_weak.borrow().upgrade().map(|rc| rc as Rc<dyn AnyReaction>)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<V: 'static, E: 'static> AnyReaction for LazyPromiseInner<V, E> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn children(&self) -> &RefCell<Vec<Rc<dyn AnySource>>> {
        &self.children
    }

    fn prefix(&self) -> &Cell<usize> {
        &self.prefix
    }

    fn flushed(&self) -> &Cell<bool> {
        &self.flushed
    }

    /// Called by the engine's `rerun` the first time this promise is
    /// pulled while dirty. Starts production exactly once per activation;
    /// re-running this reaction later (there is no cause to, since nothing
    /// ever pushes it dirty again except a cancel/restart) would be a no-op
    /// guarded by `started`.
    fn run_once(&self) {
        if self.started.get() {
            return;
        }
        self.started.set(true);
        let rc = self.self_weak.borrow().upgrade().expect("lazy promise self_weak not initialized");
        start_production(&rc);
    }

    fn as_source(&self) -> Rc<dyn AnySource> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
            .expect("lazy promise self_weak not yet initialized")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn start_production<V: 'static, E: 'static>(inner: &Rc<LazyPromiseInner<V, E>>) {
    let scope = create_root_scope(None);
    let resolve = Resolve { inner: Rc::downgrade(inner) };
    let reject = Reject { inner: Rc::downgrade(inner) };
    let producer = &inner.producer;
    run_in_scope(&scope, || producer(resolve, reject));
    *inner.production_scope.borrow_mut() = Some(scope);
}

/// Dispose the production scope (firing any `on_dispose` hook the producer
/// registered, e.g. to abort an underlying computation) and reset state so
/// the next subscriber triggers production afresh.
fn cancel_production<V: 'static, E: 'static>(inner: &Rc<LazyPromiseInner<V, E>>) {
    if let Some(scope) = inner.production_scope.borrow_mut().take() {
        if !scope.is_disposed() {
            dispose_scope(&scope);
        }
    }
    *inner.state.borrow_mut() = PromiseState::Idle;
    inner.started.set(false);
    inner.settled.set(false);
    // Mark dirty directly: by construction every subscriber effect has
    // already been torn down (and so removed as a parent) by the time the
    // count reaches zero, so there is nothing to notify, only the next
    // `pull` to make fall through to `run_once` again.
    inner.set_flags(inner.flags.get() & !crate::core::constants::STATUS_MASK);
}

/// Drop one subscription, cancelling production once none remain. Shared
/// between the scope-owned `on_dispose` hook and the disposer `call`
/// returns, guarded by `torn_down` so a subscriber torn down both ways
/// (its scope disposed *and* its disposer called) only decrements once.
fn unsubscribe<V: 'static, E: 'static>(inner: &Rc<LazyPromiseInner<V, E>>, torn_down: &Cell<bool>) {
    if torn_down.get() {
        return;
    }
    torn_down.set(true);
    let remaining = inner.subscriber_count.get().saturating_sub(1);
    inner.subscriber_count.set(remaining);
    if remaining == 0 {
        cancel_production(inner);
    }
}

fn settle<V: 'static, E: 'static>(inner: &Rc<LazyPromiseInner<V, E>>, state: PromiseState<V, E>) {
    if inner.settled.get() {
        panic!("lazy promise: resolve/reject called twice in the same activation");
    }
    inner.settled.set(true);
    *inner.state.borrow_mut() = state;
    let source: Rc<dyn AnySource> = inner.clone();
    push(&source);
}

/// A handle the producer calls (possibly long after `p` itself returns, via
/// whatever external asynchrony it scheduled) to settle the promise with a
/// value.
pub struct Resolve<V: 'static, E: 'static> {
    inner: Weak<LazyPromiseInner<V, E>>,
}

impl<V: 'static, E: 'static> Clone for Resolve<V, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<V: 'static, E: 'static> Resolve<V, E> {
    pub fn call(&self, value: V) {
        if let Some(inner) = self.inner.upgrade() {
            settle(&inner, PromiseState::Resolved(value));
        }
    }
}

/// The rejecting counterpart of [`Resolve`].
pub struct Reject<V: 'static, E: 'static> {
    inner: Weak<LazyPromiseInner<V, E>>,
}

impl<V: 'static, E: 'static> Clone for Reject<V, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<V: 'static, E: 'static> Reject<V, E> {
    pub fn call(&self, error: E) {
        if let Some(inner) = self.inner.upgrade() {
            settle(&inner, PromiseState::Rejected(error));
        }
    }
}

/// A pull-activated, cancellable, one-shot asynchronous value (spec 4.E).
pub struct LazyPromise<V: 'static, E: 'static> {
    inner: Rc<LazyPromiseInner<V, E>>,
}

impl<V, E> Clone for LazyPromise<V, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Marker trait for compile-time `isLazyPromise`-style discrimination,
/// mirroring the teacher's own `IsBinding`/`IsSlot` convention.
pub trait IsLazyPromise {}
impl<V, E> IsLazyPromise for LazyPromise<V, E> {}

pub fn is_lazy_promise<T: IsLazyPromise>(_value: &T) -> bool {
    true
}

impl<V: Clone + 'static, E: Clone + 'static> LazyPromise<V, E> {
    /// Invoke with `(on_resolve?, on_reject?)`, per spec 4.E. Creates an
    /// effect (bound to the currently active scope, if any) that pulls this
    /// promise — triggering production on the very first such pull across
    /// all subscribers — then dispatches whichever callback matches the
    /// settled state once it is known. Returns a disposer that unsubscribes
    /// explicitly; disposing the scope active at the time of this call has
    /// the same effect, since a subscription's teardown must be reachable
    /// through ordinary scope disposal, not only through the returned
    /// closure (spec 4.C, component H).
    ///
    /// An effect subscribing with no `on_reject` that observes a rejection
    /// raises the error into its own scope (it panics inside the effect's
    /// callback, where the engine's usual catch-and-route handles it).
    pub fn call(
        &self,
        on_resolve: Option<Box<dyn FnOnce(V)>>,
        on_reject: Option<Box<dyn FnOnce(E)>>,
    ) -> impl FnOnce() {
        let inner = self.inner.clone();
        inner.subscriber_count.set(inner.subscriber_count.get() + 1);

        let torn_down = Rc::new(Cell::new(false));
        if current_scope().is_some() {
            let inner_for_dispose = inner.clone();
            let torn_down_for_dispose = torn_down.clone();
            on_dispose(move || unsubscribe(&inner_for_dispose, &torn_down_for_dispose));
        }

        let on_resolve = RefCell::new(on_resolve);
        let on_reject = RefCell::new(on_reject);
        let reaction_source: Rc<dyn AnySource> = inner.clone();
        let inner_for_effect = inner.clone();
        let dispose_effect = effect(move || {
            pull(reaction_source.clone());
            match &*inner_for_effect.state.borrow() {
                PromiseState::Idle => {}
                PromiseState::Resolved(v) => {
                    if let Some(f) = on_resolve.borrow_mut().take() {
                        f(v.clone());
                    }
                }
                PromiseState::Rejected(e) => match on_reject.borrow_mut().take() {
                    Some(f) => f(e.clone()),
                    None => panic!("unhandled lazy promise rejection"),
                },
            }
        });

        move || {
            dispose_effect();
            unsubscribe(&inner, &torn_down);
        }
    }

    /// Convenience over [`call`](Self::call) for the common case of wanting
    /// both callbacks.
    pub fn subscribe(
        &self,
        on_resolve: impl FnOnce(V) + 'static,
        on_reject: impl FnOnce(E) + 'static,
    ) -> impl FnOnce() {
        self.call(Some(Box::new(on_resolve)), Some(Box::new(on_reject)))
    }
}

/// Create a pull-activated lazy promise from a producer. `producer` runs,
/// inside a fresh scope it may register `on_dispose` hooks against, the
/// first time any subscriber's effect reaches this promise — not at
/// creation time, and not again after that until every subscriber has
/// disposed and a new one arrives.
pub fn create_lazy_promise<V, E>(
    producer: impl Fn(Resolve<V, E>, Reject<V, E>) + 'static,
) -> LazyPromise<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    let inner = Rc::new(LazyPromiseInner {
        flags: Cell::new(SUBJECT | REACTION),
        state: RefCell::new(PromiseState::Idle),
        parents: RefCell::new(Vec::new()),
        children: RefCell::new(Vec::new()),
        prefix: Cell::new(0),
        flushed: Cell::new(false),
        self_weak: RefCell::new(Weak::new()),
        producer: Box::new(producer),
        production_scope: RefCell::new(None),
        started: Cell::new(false),
        settled: Cell::new(false),
        subscriber_count: Cell::new(0),
    });
    *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
    // No CLEAN/CHECK bit: a fresh lazy promise starts dirty, exactly like a
    // fresh memo, so its first pull always runs `run_once`.
    LazyPromise { inner }
}

/// The distinguished lazy promise that never resolves nor rejects.
pub fn never<V, E>() -> LazyPromise<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    create_lazy_promise(|_resolve, _reject| {})
}
