// ============================================================================
// reactive-core - Effect
//
// A reaction with no cached value: its entire purpose is the side effect
// performed by its callback. Created bound to whichever scope is active,
// so disposing that scope also severs the effect from everything it was
// observing (spec 4.C) without the engine ever disposing a reaction on
// its own.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::{DESTROYED, EFFECT, REACTION, SUBJECT};
use crate::core::types::{AnyReaction, AnySource};
use crate::graph::{disconnect_reaction, schedule_initial_run};
use crate::scope::{current_scope, on_dispose, Scope};

struct EffectInner {
    flags: Cell<u32>,
    callback: RefCell<Box<dyn FnMut()>>,
    parents: RefCell<Vec<Weak<dyn AnyReaction>>>,
    children: RefCell<Vec<Rc<dyn AnySource>>>,
    prefix: Cell<usize>,
    flushed: Cell<bool>,
    owner_scope: RefCell<Option<Scope>>,
    self_weak: RefCell<Weak<EffectInner>>,
}

impl AnySource for EffectInner {
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

impl AnyReaction for EffectInner {
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
        (self.callback.borrow_mut())();
    }

    fn as_source(&self) -> Rc<dyn AnySource> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
            .expect("effect self_weak not yet initialized")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolve the scope an effect was created under, if any. Used by the
/// propagation engine to route a callback panic (spec Section 7: the
/// reaction itself is left alone, but its owning scope is disposed).
pub(crate) fn owner_scope_of(effect: &Rc<dyn AnyReaction>) -> Option<Scope> {
    let inner = effect.as_any().downcast_ref::<EffectInner>()?;
    inner.owner_scope.borrow().clone()
}

fn destroy(inner: &Rc<EffectInner>) {
    if inner.flags.get() & DESTROYED != 0 {
        return;
    }
    inner.flags.set(inner.flags.get() | DESTROYED);
    let rc = inner.clone() as Rc<dyn AnyReaction>;
    disconnect_reaction(&rc);
    *inner.owner_scope.borrow_mut() = None;
}

/// Create a reaction run purely for its side effects. Pulls performed
/// while `f` runs become dependencies exactly as for a memo; any
/// dependency changing schedules another run through the same effect
/// queue every other effect uses.
///
/// Runs synchronously as soon as it's created, unless a batch is
/// currently active, in which case the first run happens on batch exit
/// alongside everything else queued (spec 4.A/4.C).
///
/// If a scope is active when this is called, the effect is torn down
/// automatically when that scope is disposed. The returned closure does
/// the same thing manually, for effects created outside any scope or
/// disposed independently of their scope's lifetime.
pub fn effect<F>(f: F) -> impl FnOnce()
where
    F: FnMut() + 'static,
{
    let owner = current_scope();
    let inner = Rc::new(EffectInner {
        flags: Cell::new(SUBJECT | REACTION | EFFECT),
        callback: RefCell::new(Box::new(f)),
        parents: RefCell::new(Vec::new()),
        children: RefCell::new(Vec::new()),
        prefix: Cell::new(0),
        flushed: Cell::new(false),
        owner_scope: RefCell::new(owner.clone()),
        self_weak: RefCell::new(Weak::new()),
    });
    *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);

    if owner.is_some() {
        let weak = Rc::downgrade(&inner);
        on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                destroy(&inner);
            }
        });
    }

    let rc: Rc<dyn AnyReaction> = inner.clone();
    schedule_initial_run(&rc);

    move || destroy(&inner)
}
