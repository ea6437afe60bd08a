// ============================================================================
// reactive-core - Signal
// A value cell plus a subject: `get` pulls, `set`/`update` push on change.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::core::constants::{CLEAN, SUBJECT};
use crate::core::types::{default_equals, AnyReaction, AnySource, EqualsFn, SourceInner};
use crate::graph::{pull, push};

struct SignalInner<T> {
    source: SourceInner<T>,
}

impl<T: 'static> AnySource for SignalInner<T> {
    fn flags(&self) -> u32 {
        self.source.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.source.flags.set(flags);
    }

    fn parents(&self) -> &RefCell<Vec<Weak<dyn AnyReaction>>> {
        &self.source.parents
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A reactive value cell.
///
/// `get` registers a dependency on the currently executing reaction (if
/// any) and returns a clone of the value. `set`/`update` only push a
/// change when the new value differs from the old one under the signal's
/// equality function (identity/`PartialEq` by default, per spec 4.D).
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: 'static + Clone> Signal<T> {
    pub fn get(&self) -> T {
        pull(self.as_any_source());
        self.inner.source.value.borrow().clone()
    }

    /// Read without registering a dependency. Equivalent to
    /// `untrack(|| signal.get())`.
    pub fn peek(&self) -> T {
        self.inner.source.value.borrow().clone()
    }

    pub fn set(&self, value: T) {
        let changed = {
            let mut slot = self.inner.source.value.borrow_mut();
            let equals = self.inner.source.equals;
            if equals(&slot, &value) {
                false
            } else {
                *slot = value;
                true
            }
        };
        if changed {
            push(&self.as_any_source());
        }
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.source.value.borrow());
        self.set(next);
    }

    fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone() as Rc<dyn AnySource>
    }
}

/// Create a signal with the default (strict) equality.
pub fn signal<T: 'static + Clone + PartialEq>(initial: T) -> Signal<T> {
    signal_with_equals(initial, default_equals)
}

/// Create a signal with a custom equality function, e.g. for types whose
/// `PartialEq` is unsuitable for change detection (NaN-bearing floats,
/// types that should always be treated as changed).
pub fn signal_with_equals<T: 'static + Clone>(initial: T, equals: EqualsFn<T>) -> Signal<T> {
    let inner = Rc::new(SignalInner {
        source: SourceInner::new(initial, SUBJECT | CLEAN, equals),
    });
    Signal { inner }
}

/// A signal whose writes are always treated as changes, regardless of
/// value equality. Useful for cells holding values with no meaningful
/// equality, or where every write must notify observers.
pub fn signal_always_notify<T: 'static + Clone>(initial: T) -> Signal<T> {
    signal_with_equals(initial, |_, _| false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::effect::effect;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn get_returns_initial_value() {
        let s = signal(5);
        assert_eq!(s.get(), 5);
    }

    #[test]
    fn set_with_same_value_does_not_notify() {
        let s = signal(1);
        let runs = Rc::new(StdRefCell::new(0));
        let _dispose = {
            let (s, runs) = (s.clone(), runs.clone());
            effect(move || {
                s.get();
                *runs.borrow_mut() += 1;
            })
        };
        assert_eq!(*runs.borrow(), 1);
        s.set(1);
        assert_eq!(*runs.borrow(), 1, "writing an equal value must not re-run dependents");
        s.set(2);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn peek_does_not_track() {
        let s = signal(1);
        let runs = Rc::new(StdRefCell::new(0));
        let _dispose = {
            let (s, runs) = (s.clone(), runs.clone());
            effect(move || {
                s.peek();
                *runs.borrow_mut() += 1;
            })
        };
        assert_eq!(*runs.borrow(), 1);
        s.set(2);
        assert_eq!(*runs.borrow(), 1, "peek must not create a dependency");
    }

    #[test]
    fn update_applies_a_function_to_the_current_value() {
        let s = signal(10);
        s.update(|v| v + 5);
        assert_eq!(s.get(), 15);
    }

    #[test]
    fn always_notify_signal_fires_even_on_equal_value() {
        let s = signal_always_notify(1);
        let runs = Rc::new(StdRefCell::new(0));
        let _dispose = {
            let (s, runs) = (s.clone(), runs.clone());
            effect(move || {
                s.get();
                *runs.borrow_mut() += 1;
            })
        };
        assert_eq!(*runs.borrow(), 1);
        s.set(1);
        assert_eq!(*runs.borrow(), 2);
    }
}
