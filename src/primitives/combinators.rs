// ============================================================================
// reactive-core - Lazy promise combinators
//
// `map`, `catch_error`, `lazy`, and `eager` are the surface-level adapters
// spec Section 1 names as external collaborators ("thin adapters specified
// only by their input/output contract on the lazy-promise interface") —
// they add no new engine behavior, only compose `create_lazy_promise`,
// `subscribe`, and the scope tree's `on_dispose`/`run_in_scope`.
// ============================================================================

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use std::cell::RefCell;

use crate::error::ReactiveError;
use crate::primitives::promise::{create_lazy_promise, LazyPromise};
use crate::scope::{create_root_scope, create_scope_with_parent, dispose_scope, on_dispose, run_in_scope, Scope};

/// What a `map`/`catch_error` projection produced: a plain value, or a
/// nested lazy promise whose own eventual result should be forwarded
/// instead (spec 4.E: "or, if project returns a lazy promise, the inner
/// result"). Rust has no single type that is ambiguously "a value or a
/// promise of one" the way the source language does, so callers make the
/// distinction explicit by constructing the matching variant.
pub enum Projected<A, B> {
    Value(A),
    Chain(LazyPromise<A, B>),
}

/// `map(project)(source)` from spec 4.E, expressed as a direct two-argument
/// function rather than curried — idiomatic Rust favors this over a
/// closure-returning-closure for the same contract.
pub fn map<V, R, E, F>(source: &LazyPromise<V, E>, project: F) -> LazyPromise<R, E>
where
    V: Clone + 'static,
    R: Clone + 'static,
    E: Clone + 'static,
    F: Fn(V) -> Projected<R, E> + Clone + 'static,
{
    let source = source.clone();
    create_lazy_promise(move |resolve, reject| {
        let project = project.clone();
        let resolve_value = resolve.clone();
        let resolve_chain = resolve.clone();
        let reject_chain = reject.clone();
        let disposer = source.subscribe(
            move |v| match project(v) {
                Projected::Value(r) => resolve_value.call(r),
                Projected::Chain(inner) => {
                    let resolve_inner = resolve_chain.clone();
                    let reject_inner = reject_chain.clone();
                    let d = inner.subscribe(move |r| resolve_inner.call(r), move |e| reject_inner.call(e));
                    on_dispose(d);
                }
            },
            move |e| reject.call(e),
        );
        on_dispose(disposer);
    })
}

/// `catchError(handler)(source)` from spec 4.E: maps rejections through
/// `handler`, which may recover with a value or chain to another lazy
/// promise; resolutions pass through untouched.
pub fn catch_error<V, E, E2, F>(source: &LazyPromise<V, E>, handler: F) -> LazyPromise<V, E2>
where
    V: Clone + 'static,
    E: Clone + 'static,
    E2: Clone + 'static,
    F: Fn(E) -> Projected<V, E2> + Clone + 'static,
{
    let source = source.clone();
    create_lazy_promise(move |resolve, reject| {
        let handler = handler.clone();
        let resolve_ok = resolve.clone();
        let resolve_recovered = resolve.clone();
        let reject_chain = reject.clone();
        let disposer = source.subscribe(
            move |v| resolve_ok.call(v),
            move |e| match handler(e) {
                Projected::Value(v) => resolve_recovered.call(v),
                Projected::Chain(inner) => {
                    let resolve_inner = resolve_recovered.clone();
                    let reject_inner = reject_chain.clone();
                    let d = inner.subscribe(move |v| resolve_inner.call(v), move |e2| reject_inner.call(e2));
                    on_dispose(d);
                }
            },
        );
        on_dispose(disposer);
    })
}

/// Handed to a `lazy` producer so it can observe cancellation without
/// reaching back into the scope tree directly.
#[derive(Clone)]
pub struct CancelSignal(Rc<Cell<bool>>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Distinguishes an abort-induced rejection from any other failure a
/// `lazy`-wrapped computation can produce, per spec 4.E's "ambient
/// abort-error discriminator".
#[derive(Clone)]
pub enum LazyError<E> {
    Abort,
    Other(E),
}

/// `lazy(asyncCb)`: wraps a producer that takes a [`CancelSignal`] (fired
/// when this lazy promise's own production scope disposes) and returns an
/// inner lazy promise. Abort-derived rejections are swallowed rather than
/// forwarded.
pub fn lazy<V, E, F>(async_cb: F) -> LazyPromise<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
    F: Fn(CancelSignal) -> LazyPromise<V, LazyError<E>> + 'static,
{
    create_lazy_promise(move |resolve, reject| {
        let cancelled = Rc::new(Cell::new(false));
        let signal = CancelSignal(cancelled.clone());
        on_dispose(move || cancelled.set(true));

        let inner = async_cb(signal);
        let resolve_inner = resolve.clone();
        let disposer = inner.subscribe(
            move |v| resolve_inner.call(v),
            move |e| match e {
                LazyError::Abort => {}
                LazyError::Other(err) => reject.call(err),
            },
        );
        on_dispose(disposer);
    })
}

/// What `eager` resolves a future with: either the lazy promise's own
/// rejection, or an error raised uncaught inside its root scope (spec
/// 4.E's `eager`: "Uncaught scope errors also reject").
pub enum EagerError<E> {
    Promise(E),
    Scope(String),
}

/// The ambient-promise bridge for `eager(lp)`: a fresh root scope,
/// subscribed once, whose resolve/reject (or an uncaught scope error)
/// completes a `std::future::Future`. Dropping the future before it
/// resolves disposes the scope, cancelling production the same way
/// disposing any other subscriber does.
pub struct Eager<V: 'static, E: 'static> {
    result: Rc<RefCell<Option<Result<V, EagerError<E>>>>>,
    waker: Rc<RefCell<Option<Waker>>>,
    scope: Scope,
    disposer: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl<V, E> Future for Eager<V, E> {
    type Output = Result<V, EagerError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.result.borrow_mut().take() {
            return Poll::Ready(result);
        }
        *self.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<V, E> Drop for Eager<V, E> {
    fn drop(&mut self) {
        if let Some(disposer) = self.disposer.borrow_mut().take() {
            disposer();
        }
        if !self.scope.is_disposed() && !self.scope.is_running() {
            dispose_scope(&self.scope);
        }
    }
}

/// `eager(lp) -> promise`: creates a fresh root scope, subscribes `lp`, and
/// bridges resolve/reject (and any uncaught scope error) into the returned
/// future.
pub fn eager<V, E>(lp: &LazyPromise<V, E>) -> Eager<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    let result: Rc<RefCell<Option<Result<V, EagerError<E>>>>> = Rc::new(RefCell::new(None));
    let waker: Rc<RefCell<Option<Waker>>> = Rc::new(RefCell::new(None));

    let result_for_handler = result.clone();
    let waker_for_handler = waker.clone();
    let scope = create_root_scope(Some(Rc::new(move |e: &ReactiveError| {
        if result_for_handler.borrow().is_none() {
            *result_for_handler.borrow_mut() = Some(Err(EagerError::Scope(e.message().to_string())));
        }
        if let Some(w) = waker_for_handler.borrow_mut().take() {
            w.wake();
        }
    })));

    // The subscription lives in a child of `scope` rather than `scope`
    // itself, keeping the handler scope free of any directly owned effect
    // so the only way into its handler is via a descendant's failure.
    let subscriber_scope = create_scope_with_parent(None, Some(scope.clone()));

    let result_ok = result.clone();
    let waker_ok = waker.clone();
    let result_err = result.clone();
    let waker_err = waker.clone();
    let disposer = run_in_scope(&subscriber_scope, || {
        lp.call(
            Some(Box::new(move |v| {
                if result_ok.borrow().is_none() {
                    *result_ok.borrow_mut() = Some(Ok(v));
                }
                if let Some(w) = waker_ok.borrow_mut().take() {
                    w.wake();
                }
            })),
            Some(Box::new(move |e| {
                if result_err.borrow().is_none() {
                    *result_err.borrow_mut() = Some(Err(EagerError::Promise(e)));
                }
                if let Some(w) = waker_err.borrow_mut().take() {
                    w.wake();
                }
            })),
        )
    });

    Eager { result, waker, scope, disposer: RefCell::new(disposer.map(|d| Box::new(d) as Box<dyn FnOnce()>)) }
}
