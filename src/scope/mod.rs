// ============================================================================
// reactive-core - Scope tree
//
// A hierarchical lifetime/cancellation/error-handling structure. Scopes are
// threaded through a single doubly-linked list in deterministic DFS
// pre-order (the `prev`/`next` fields below), generalizing the
// parent/first_child/last_child/prev_sibling/next_sibling shape an effect
// tree already needs into a flat intrusive list that disposes the whole
// subtree in one linear walk with O(1) pointer stores per node.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::core::context::with_context;
use crate::error::ReactiveError;

mod context_key;
pub use context_key::ContextKey;

type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;
type Disposable = Box<dyn FnOnce()>;

pub struct ScopeInner {
    parent: RefCell<Option<Weak<ScopeInner>>>,
    /// Previous node in the pre-order thread (weak: the thread owns nodes
    /// forward via `next`, never backward).
    prev: RefCell<Option<Weak<ScopeInner>>>,
    /// Next node in the pre-order thread. Strong: this is the link that
    /// keeps a scope with no other referents alive while it is reachable
    /// from an ancestor, mirroring the effect tree's own first_child link.
    next: RefCell<Option<Rc<ScopeInner>>>,
    self_weak: RefCell<Weak<ScopeInner>>,

    disposables: RefCell<Vec<Disposable>>,
    error_handler: RefCell<Option<ErrorHandler>>,
    context_values: RefCell<std::collections::HashMap<usize, Rc<dyn Any>>>,

    running: Cell<bool>,
    disposed: Cell<bool>,
}

impl ScopeInner {
    fn parent(&self) -> Option<Rc<ScopeInner>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn identity(&self) -> *const ScopeInner {
        self as *const ScopeInner
    }
}

/// A handle to a scope node. Scopes are not disposed by dropping their
/// handle (per spec 4.F, a root scope "must be disposed explicitly to
/// reclaim resources") — disposal is always the explicit tree operation
/// `dispose_scope`, independent of handle lifetime. Non-root scopes stay
/// alive regardless because the pre-order thread holds a strong reference
/// from their nearest living predecessor.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub(crate) fn inner(&self) -> &Rc<ScopeInner> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Rc<ScopeInner>) -> Self {
        Self { inner }
    }
}

/// Create a scope whose parent is the currently active scope (or no
/// parent, if called outside any `run_in_scope`), per
/// `createScope(errorHandler?, parent? = current)`.
pub fn create_scope(error_handler: Option<ErrorHandler>) -> Scope {
    let parent = with_context(|ctx| ctx.active_scope());
    create_scope_with_parent(error_handler, parent.map(Scope::from_inner))
}

/// Create a scope with no parent. Used for top-level work and for the
/// `eager` bridge's fresh root scope (spec 4.E).
pub fn create_root_scope(error_handler: Option<ErrorHandler>) -> Scope {
    create_scope_with_parent(error_handler, None)
}

/// Create a scope under an explicit parent (or none), inserting it
/// immediately after the parent in the pre-order thread so repeated
/// creation yields LIFO disposal order among siblings.
pub fn create_scope_with_parent(error_handler: Option<ErrorHandler>, parent: Option<Scope>) -> Scope {
    let inner = Rc::new(ScopeInner {
        parent: RefCell::new(parent.as_ref().map(|p| Rc::downgrade(p.inner()))),
        prev: RefCell::new(None),
        next: RefCell::new(None),
        self_weak: RefCell::new(Weak::new()),
        disposables: RefCell::new(Vec::new()),
        error_handler: RefCell::new(error_handler),
        context_values: RefCell::new(std::collections::HashMap::new()),
        running: Cell::new(false),
        disposed: Cell::new(false),
    });
    *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);

    if let Some(parent) = &parent {
        insert_after(parent.inner(), &inner);
    }

    Scope::from_inner(inner)
}

/// Splice `node` into the thread immediately after `anchor`.
fn insert_after(anchor: &Rc<ScopeInner>, node: &Rc<ScopeInner>) {
    let old_next = anchor.next.borrow_mut().replace(node.clone());
    *node.prev.borrow_mut() = Some(Rc::downgrade(anchor));
    if let Some(ref on) = old_next {
        *on.prev.borrow_mut() = Some(Rc::downgrade(node));
    }
    *node.next.borrow_mut() = old_next;
}

/// Remove `node` from the thread, relinking its neighbors.
fn unlink(node: &Rc<ScopeInner>) {
    let prev = node.prev.borrow_mut().take().and_then(|w| w.upgrade());
    let next = node.next.borrow_mut().take();
    if let Some(ref p) = prev {
        *p.next.borrow_mut() = next.clone();
    }
    if let Some(ref n) = next {
        *n.prev.borrow_mut() = prev.as_ref().map(Rc::downgrade);
    }
}

/// The scope active when `f` runs becomes `scope`; restored on return.
/// Returns `None` (rather than diverging) when `f` panics: the panic is
/// caught, `scope` is disposed, and the error is routed to the nearest
/// ancestor error handler (or deferred) before this function returns
/// normally, per spec 4.B.
pub fn run_in_scope<F, R>(scope: &Scope, f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    assert!(!scope.is_disposed(), "run_in_scope: operation on disposed scope");

    scope.inner.running.set(true);
    let prev = with_context(|ctx| ctx.set_active_scope(Some(Rc::downgrade(scope.inner()))));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    with_context(|ctx| {
        ctx.set_active_scope(prev);
    });
    scope.inner.running.set(false);

    match result {
        Ok(value) => Some(value),
        Err(payload) => {
            fail_scope(scope, ReactiveError::new(payload));
            None
        }
    }
}

/// Dispose `scope` (if not already disposed) and route an error to the
/// nearest handler at or above it, deferring it if none exists. Shared by
/// `run_in_scope`'s own panic handling and by the propagation engine when
/// an effect's callback panics outside of any `run_in_scope` call: in the
/// latter case `scope` is the effect's *owning* scope, so its own handler
/// (installed via `createScope(errorHandler)`) is the nearest candidate,
/// per spec Section 7 ("bubbles via the scope that owns the effect").
pub(crate) fn fail_scope(scope: &Scope, err: ReactiveError) {
    if !scope.is_disposed() {
        dispose_scope(scope);
    }
    route_error(scope.inner().clone(), err);
}

fn route_error(mut scope: Rc<ScopeInner>, mut err: ReactiveError) {
    loop {
        let handler = scope.error_handler.borrow().clone();
        match handler {
            Some(h) => {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| h(&err)));
                match result {
                    Ok(()) => return,
                    Err(payload) => {
                        err = ReactiveError::new(payload);
                    }
                }
            }
            None => {}
        }
        scope = match scope.parent() {
            Some(p) => p,
            None => {
                with_context(|ctx| ctx.defer_error(err));
                return;
            }
        };
    }
}

/// Register a LIFO disposable on the currently active scope. Panics if
/// there is no active scope, or if it is already disposed.
pub fn on_dispose(callback: impl FnOnce() + 'static) {
    let scope = with_context(|ctx| ctx.active_scope())
        .expect("on_dispose: called outside a scope");
    assert!(!scope.disposed.get(), "on_dispose: scope is already disposed");
    scope.disposables.borrow_mut().push(Box::new(callback));
}

/// Tear down a scope and its entire subtree. Two-pass: first every node is
/// marked disposed, then disposables run in a post-order walk of the
/// subtree — descendants before ancestors, and sibling subtrees in reverse
/// creation order (spec Section 5 and Section 8). Errors raised by a
/// disposable are deferred (the spec's microtask semantics) but do not stop
/// the remaining disposals. Panics if `scope` is currently running.
pub fn dispose_scope(scope: &Scope) {
    assert!(!scope.is_running(), "dispose_scope: cannot dispose a running scope");
    if scope.is_disposed() {
        panic!("dispose_scope: scope already disposed");
    }

    // Pass 1: collect the subtree in pre-order thread order, marking each
    // node disposed as we go. Membership in the subtree is decided with a
    // transient pointer set rather than a chain walk per node, giving O(1)
    // amortized work per node while it is built.
    let mut subtree_ptrs: HashSet<*const ScopeInner> = HashSet::new();
    subtree_ptrs.insert(scope.inner().identity());
    let mut nodes: Vec<Rc<ScopeInner>> = vec![scope.inner().clone()];
    scope.inner().disposed.set(true);

    let mut cursor = scope.inner().next.borrow().clone();
    while let Some(node) = cursor {
        let belongs = node
            .parent
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|p| subtree_ptrs.contains(&p.identity()))
            .unwrap_or(false);
        if !belongs {
            break;
        }
        subtree_ptrs.insert(node.identity());
        node.disposed.set(true);
        let next = node.next.borrow().clone();
        nodes.push(node);
        cursor = next;
    }

    // Detach the whole subtree from the thread in one splice before
    // running user code, so disposables can't observe a half-disposed
    // thread through sibling pointers.
    unlink(scope.inner());

    // Pass 2: run disposables in true post-order, not a flat reversal of
    // `nodes`. `insert_after` always splices a new child immediately after
    // its parent, so the thread's forward order already lists each child's
    // *entire* subtree ahead of an earlier-created sibling's; grouping by
    // each node's recorded parent and walking children in that order gives
    // reverse-creation order among siblings, with every descendant running
    // before the scope that owns it. A plain `.rev()` of `nodes` would flip
    // sibling order back to creation order, which is the wrong way round.
    let mut children: HashMap<*const ScopeInner, Vec<Rc<ScopeInner>>> = HashMap::new();
    for node in &nodes[1..] {
        if let Some(parent) = node.parent.borrow().as_ref().and_then(Weak::upgrade) {
            children.entry(parent.identity()).or_default().push(node.clone());
        }
    }

    fn run_post_order(node: &Rc<ScopeInner>, children: &HashMap<*const ScopeInner, Vec<Rc<ScopeInner>>>) {
        if let Some(kids) = children.get(&node.identity()) {
            for kid in kids {
                run_post_order(kid, children);
            }
        }
        let disposables = std::mem::take(&mut *node.disposables.borrow_mut());
        for disposable in disposables.into_iter().rev() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(disposable));
            if let Err(payload) = result {
                with_context(|ctx| ctx.defer_error(ReactiveError::new(payload)));
            }
        }
    }

    run_post_order(scope.inner(), &children);
}

pub fn is_scope_disposed(scope: &Scope) -> bool {
    scope.is_disposed()
}

pub fn is_scope_running(scope: &Scope) -> bool {
    scope.is_running()
}

/// The scope active for the extent of the innermost `run_in_scope` call.
pub fn current_scope() -> Option<Scope> {
    with_context(|ctx| ctx.active_scope()).map(Scope::from_inner)
}

/// Store a value for `key` on the currently active scope.
pub fn set_context<T: 'static>(key: &ContextKey<T>, value: T) {
    let scope = with_context(|ctx| ctx.active_scope())
        .expect("set_context: called outside a scope");
    scope.context_values.borrow_mut().insert(key.id(), Rc::new(value));
}

/// Walk from the currently active scope up through ancestors, returning
/// the first value stored for `key`.
pub fn get_context<T: 'static>(key: &ContextKey<T>) -> Option<Rc<T>> {
    let mut scope = with_context(|ctx| ctx.active_scope())?;
    loop {
        if let Some(value) = scope.context_values.borrow().get(&key.id()) {
            if let Ok(typed) = Rc::downcast::<T>(value.clone()) {
                return Some(typed);
            }
        }
        scope = scope.parent()?;
    }
}

/// Reflexive ancestor test: `a` is an ancestor of `b` if `a == b` or `a`
/// appears somewhere on `b`'s parent chain.
pub fn is_ancestor(a: &Scope, b: &Scope) -> bool {
    let mut cur = Some(b.inner().clone());
    while let Some(node) = cur {
        if Rc::ptr_eq(&node, a.inner()) {
            return true;
        }
        cur = node.parent();
    }
    false
}

/// Reflexive descendant test, the mirror of `is_ancestor`.
pub fn is_descendant(a: &Scope, b: &Scope) -> bool {
    is_ancestor(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn create_and_dispose_a_scope() {
        let s = create_root_scope(None);
        assert!(!s.is_disposed());
        dispose_scope(&s);
        assert!(s.is_disposed());
    }

    #[test]
    #[should_panic(expected = "already disposed")]
    fn redispose_is_an_error() {
        let s = create_root_scope(None);
        dispose_scope(&s);
        dispose_scope(&s);
    }

    #[test]
    fn on_dispose_runs_lifo() {
        let s = create_root_scope(None);
        let log = Rc::new(StdRefCell::new(Vec::new()));
        run_in_scope(&s, || {
            let log1 = log.clone();
            on_dispose(move || log1.borrow_mut().push(1));
            let log2 = log.clone();
            on_dispose(move || log2.borrow_mut().push(2));
            let log3 = log.clone();
            on_dispose(move || log3.borrow_mut().push(3));
        });
        dispose_scope(&s);
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn nested_scopes_dispose_descendants_before_ancestors() {
        let parent = create_root_scope(None);
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let child = run_in_scope(&parent, || {
            let log1 = log.clone();
            on_dispose(move || log1.borrow_mut().push("parent"));
            create_scope(None)
        })
        .unwrap();
        run_in_scope(&child, || {
            let log2 = log.clone();
            on_dispose(move || log2.borrow_mut().push("child"));
        });
        dispose_scope(&parent);
        assert_eq!(*log.borrow(), vec!["child", "parent"]);
        assert!(child.is_disposed());
    }

    #[test]
    fn sibling_subtrees_dispose_in_reverse_creation_order() {
        let parent = create_root_scope(None);
        let log = Rc::new(StdRefCell::new(Vec::new()));
        run_in_scope(&parent, || {
            let child_a = create_scope(None);
            run_in_scope(&child_a, || {
                let log_a = log.clone();
                on_dispose(move || log_a.borrow_mut().push("a"));
            });
            let child_b = create_scope(None);
            run_in_scope(&child_b, || {
                let log_b = log.clone();
                on_dispose(move || log_b.borrow_mut().push("b"));
            });
        });
        dispose_scope(&parent);
        assert_eq!(
            *log.borrow(),
            vec!["b", "a"],
            "b was created after a, so it must dispose first"
        );
    }

    #[test]
    fn nested_grandchildren_dispose_before_their_own_parent_and_respect_sibling_order() {
        let root = create_root_scope(None);
        let log = Rc::new(StdRefCell::new(Vec::new()));
        run_in_scope(&root, || {
            let first = create_scope(None);
            run_in_scope(&first, || {
                let log1 = log.clone();
                on_dispose(move || log1.borrow_mut().push("first"));
                let grandchild = create_scope(None);
                run_in_scope(&grandchild, || {
                    let logg = log.clone();
                    on_dispose(move || logg.borrow_mut().push("grandchild"));
                });
            });
            let second = create_scope(None);
            run_in_scope(&second, || {
                let log2 = log.clone();
                on_dispose(move || log2.borrow_mut().push("second"));
            });
        });
        dispose_scope(&root);
        assert_eq!(*log.borrow(), vec!["second", "grandchild", "first"]);
    }

    #[test]
    fn scope_error_routes_to_nearest_ancestor_handler() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let log_handler = log.clone();
        let handler: ErrorHandler = Rc::new(move |e: &ReactiveError| {
            log_handler.borrow_mut().push(e.message().to_string());
        });
        let b = create_root_scope(Some(handler));
        let c = run_in_scope(&b, || create_scope(None)).unwrap();

        let result = run_in_scope(&c, || -> () {
            panic!("oops");
        });
        assert!(result.is_none());
        assert!(c.is_disposed());
        assert_eq!(*log.borrow(), vec!["oops".to_string()]);
    }

    #[test]
    fn a_handler_that_throws_replaces_the_error_and_continues_upward() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let log_b = log.clone();
        let b = create_root_scope(Some(Rc::new(move |e: &ReactiveError| {
            log_b.borrow_mut().push(e.message().to_string());
        })));
        let a = run_in_scope(&b, || {
            create_scope(Some(Rc::new(|_: &ReactiveError| panic!("handler failed too"))))
        })
        .unwrap();
        let c = run_in_scope(&a, || create_scope(None)).unwrap();

        run_in_scope(&c, || -> () {
            panic!("oops");
        });

        assert!(c.is_disposed());
        assert_eq!(
            *log.borrow(),
            vec!["handler failed too".to_string()],
            "b must see the error raised by a's handler, not the original"
        );
    }

    #[test]
    fn running_scope_cannot_be_disposed() {
        let s = create_root_scope(None);
        run_in_scope(&s, || {
            assert!(s.is_running());
        });
        assert!(!s.is_running());
    }

    #[test]
    fn context_lookup_walks_ancestors() {
        let key: ContextKey<i32> = ContextKey::new();
        let parent = create_root_scope(None);
        run_in_scope(&parent, || {
            set_context(&key, 42);
            let child = create_scope(None);
            run_in_scope(&child, || {
                assert_eq!(*get_context(&key).unwrap(), 42);
            });
        });
    }

    #[test]
    fn is_ancestor_is_reflexive() {
        let a = create_root_scope(None);
        assert!(is_ancestor(&a, &a));
        let b = run_in_scope(&a, || create_scope(None)).unwrap();
        assert!(is_ancestor(&a, &b));
        assert!(!is_ancestor(&b, &a));
        assert!(is_descendant(&b, &a));
    }
}
