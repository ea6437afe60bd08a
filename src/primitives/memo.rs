// ============================================================================
// reactive-core - Memo
//
// A reaction whose "side effect" is writing a cached value, observed
// through the subject half of the same struct (spec 4.D/G). One concrete
// struct implements both `AnySource` and `AnyReaction` via a shared flags
// field, the same pattern a derived signal already needs.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::{REACTION, SUBJECT};
use crate::core::types::{default_equals, AnyReaction, AnySource, EqualsFn};
use crate::graph::{pull, push};

struct MemoInner<T> {
    flags: Cell<u32>,
    compute: RefCell<Box<dyn FnMut() -> T>>,
    value: RefCell<Option<T>>,
    equals: EqualsFn<T>,
    parents: RefCell<Vec<Weak<dyn AnyReaction>>>,
    children: RefCell<Vec<Rc<dyn AnySource>>>,
    prefix: Cell<usize>,
    flushed: Cell<bool>,
    self_weak: RefCell<Weak<MemoInner<T>>>,
}

impl<T: 'static> AnySource for MemoInner<T> {
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

impl<T: 'static> AnyReaction for MemoInner<T> {
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

    fn run_once(&self) {
        let new_value = (self.compute.borrow_mut())();
        let changed = match &*self.value.borrow() {
            Some(old) => !(self.equals)(old, &new_value),
            None => true,
        };
        *self.value.borrow_mut() = Some(new_value);
        if changed {
            if let Some(self_rc) = self.self_weak.borrow().upgrade() {
                push(&(self_rc as Rc<dyn AnySource>));
            }
        }
    }

    fn as_source(&self) -> Rc<dyn AnySource> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
            .expect("memo self_weak not yet initialized")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A cached reactive derivation.
///
/// Recomputes only when a dependency actually changed (not merely "maybe
/// changed" — that distinction is exactly what the three-color sweep
/// decides before `get` ever calls back into user code). `get` pulls the
/// memo (sweeping it clean first if needed) and returns the cached value.
pub struct Memo<T> {
    inner: Rc<MemoInner<T>>,
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: 'static + Clone> Memo<T> {
    pub fn get(&self) -> T {
        pull(self.inner.clone() as Rc<dyn AnySource>);
        self.inner
            .value
            .borrow()
            .clone()
            .expect("memo value missing after pull; sweep should have computed it")
    }
}

/// Create a memo with the default (strict) equality between successive
/// computed values.
pub fn memo<T, F>(f: F) -> Memo<T>
where
    T: 'static + Clone + PartialEq,
    F: FnMut() -> T + 'static,
{
    memo_with_equals(f, default_equals)
}

/// Create a memo with a custom equality function for deciding whether a
/// recomputed value counts as a change.
pub fn memo_with_equals<T, F>(f: F, equals: EqualsFn<T>) -> Memo<T>
where
    T: 'static + Clone,
    F: FnMut() -> T + 'static,
{
    let inner = Rc::new(MemoInner {
        flags: Cell::new(SUBJECT | REACTION),
        compute: RefCell::new(Box::new(f)),
        value: RefCell::new(None),
        equals,
        parents: RefCell::new(Vec::new()),
        children: RefCell::new(Vec::new()),
        prefix: Cell::new(0),
        flushed: Cell::new(false),
        self_weak: RefCell::new(Weak::new()),
    });
    *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
    // No CLEAN/CHECK bit set above: a fresh memo starts dirty, so the
    // first `get()` always computes it.
    Memo { inner }
}
