// ============================================================================
// reactive-core - Propagation engine
//
// The three-color (clean/check/dirty) mark-and-sweep algorithm from spec
// Section 4.A: `push` taints the ancestor chain, `pull` registers an edge
// and, for reactions, sweeps them clean first, `sweep` is the recursive
// decision procedure that reruns a reaction only when one of its children
// actually changed. Ordered children with positional prefix-matching
// (`record_pull`/`flush_tail`) is the dependency re-tracking strategy,
// deliberately distinct from a version-stamp dedup scheme.
// ============================================================================

use std::rc::{Rc, Weak};

use crate::core::constants::{CHECK, CLEAN, DESTROYED, EFFECT, ENQUEUED, RUNNING, STATUS_MASK};
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource};
use crate::error::ReactiveError;

/// Register a dependency edge from the currently executing reaction (if
/// any) onto `s`, then ensure `s` is clean. Outside a reaction this just
/// ensures cleanliness and records no edge, per spec 4.A.
pub fn pull(s: Rc<dyn AnySource>) {
    if s.flags() & DESTROYED != 0 {
        return;
    }
    if let Some(reaction) = s.as_reaction() {
        if reaction.flags() & STATUS_MASK != CLEAN {
            sweep(reaction);
        }
    }

    let active = with_context(|ctx| {
        if ctx.is_untracking() {
            None
        } else {
            ctx.active_reaction().and_then(|w| w.upgrade())
        }
    });
    if let Some(active) = active {
        record_pull(&active, &s);
    }
}

/// Mark all transitive parents of `s` tainted: direct parents become
/// dirty, their ancestors become check, stopping as soon as a node is
/// already at the same or a stronger color (conservative early-exit).
/// Drains the pending effect queue afterward unless a batch is active.
pub fn push(s: &Rc<dyn AnySource>) {
    let parents = collect_live_parents(s);
    for parent in parents {
        if parent.flags() & STATUS_MASK == 0 {
            // already dirty: this path was already propagated
            continue;
        }
        parent.set_flags(parent.flags() & !STATUS_MASK);
        enqueue_if_effect(&parent);
        push_check(&parent);
    }
    maybe_drain_effects();
}

/// Push with no explicit subject: the convention is "the current reaction
/// pushes itself". Raises if there is no active reaction, per the spec's
/// own resolution of this ambiguity ("pick raise for safety").
pub fn push_self() {
    let active = with_context(|ctx| ctx.active_reaction())
        .and_then(|w| w.upgrade())
        .expect("push: no subject given and no reaction is currently running");
    push(&active.as_source());
}

/// Taint `r`'s own parents to `check` (not `dirty` — `r` itself merely
/// *might* be affected by whatever change caused one of its dependencies
/// to be marked dirty), propagating further up while nodes are still
/// clean.
fn push_check(r: &Rc<dyn AnyReaction>) {
    let parents = collect_live_parents(&r.as_source());
    for parent in parents {
        let status = parent.flags() & STATUS_MASK;
        if status & CLEAN == 0 {
            // already check or dirty: stop here
            continue;
        }
        parent.set_flags((parent.flags() & !STATUS_MASK) | CHECK);
        enqueue_if_effect(&parent);
        push_check(&parent);
    }
}

/// Sweep `r` clean. Precondition per spec: `r` is not already clean (the
/// call is a no-op otherwise, satisfying the idempotent-clean-sweep
/// property).
pub fn sweep(r: Rc<dyn AnyReaction>) {
    if r.flags() & DESTROYED != 0 {
        return;
    }
    let status = r.flags() & STATUS_MASK;
    if status & CLEAN != 0 {
        return;
    }
    if status & CHECK != 0 {
        let children: Vec<Rc<dyn AnySource>> = r.children().borrow().clone();
        for child in &children {
            if let Some(child_reaction) = child.as_reaction() {
                sweep(child_reaction);
            }
        }
        if r.flags() & STATUS_MASK == CHECK {
            // None of the children actually changed: still check, never
            // became dirty. Mark clean without rerunning.
            r.set_flags((r.flags() & !STATUS_MASK) | CLEAN);
            return;
        }
        // Fell through to dirty during the children sweep; rerun below.
    }
    rerun(r);
}

/// Re-run a reaction's callback, rebuilding its children list via ordered
/// prefix-matching, then mark it clean.
fn rerun(r: Rc<dyn AnyReaction>) {
    r.set_flags(r.flags() | RUNNING);
    r.prefix().set(0);
    r.flushed().set(false);

    let prev_active = with_context(|ctx| ctx.set_active_reaction(Some(Rc::downgrade(&r))));
    r.run_once();
    with_context(|ctx| {
        ctx.set_active_reaction(prev_active);
    });

    // Anything left over from the previous run that was never re-matched
    // this time must be unregistered.
    flush_tail(&r);

    r.set_flags((r.flags() & !RUNNING & !STATUS_MASK) | CLEAN);
}

/// Positional prefix-match against `active`'s previous children list. A
/// match just advances the prefix counter with no graph edit; a mismatch
/// flushes the unmatched tail once, then every subsequent pull this run is
/// a plain append.
fn record_pull(active: &Rc<dyn AnyReaction>, s: &Rc<dyn AnySource>) {
    if !active.flushed().get() {
        let prefix = active.prefix().get();
        let matched = {
            let children = active.children().borrow();
            prefix < children.len() && children[prefix].identity() == s.identity()
        };
        if matched {
            active.prefix().set(prefix + 1);
            return;
        }
        flush_tail(active);
    }
    active.children().borrow_mut().push(s.clone());
    add_parent(s, active);
}

/// Unregister `active` from the parents list of every child beyond the
/// current prefix, then truncate. Idempotent: a second call after
/// `flushed` is already set does nothing.
fn flush_tail(active: &Rc<dyn AnyReaction>) {
    if active.flushed().get() {
        return;
    }
    active.flushed().set(true);
    let prefix = active.prefix().get();
    let tail: Vec<Rc<dyn AnySource>> = {
        let mut children = active.children().borrow_mut();
        if prefix >= children.len() {
            return;
        }
        children.split_off(prefix)
    };
    for child in &tail {
        remove_parent(child, active);
    }
}

fn add_parent(s: &Rc<dyn AnySource>, r: &Rc<dyn AnyReaction>) {
    s.parents().borrow_mut().push(Rc::downgrade(r));
}

fn remove_parent(s: &Rc<dyn AnySource>, r: &Rc<dyn AnyReaction>) {
    let target = r.identity();
    s.parents()
        .borrow_mut()
        .retain(|weak| weak.upgrade().map(|p| p.identity() != target).unwrap_or(false));
}

/// Upgrade and compact `s`'s parents list, following the teacher's own
/// collect-then-mutate pattern: dead weak references are dropped while we
/// have the borrow, live ones are cloned into a plain `Vec` before any
/// mutation of the graph happens in the caller.
fn collect_live_parents(s: &Rc<dyn AnySource>) -> Vec<Rc<dyn AnyReaction>> {
    let mut live = Vec::new();
    s.parents().borrow_mut().retain(|weak| match weak.upgrade() {
        Some(rc) => {
            live.push(rc);
            true
        }
        None => false,
    });
    live
}

// =============================================================================
// EFFECT QUEUE
// =============================================================================

fn enqueue_if_effect(r: &Rc<dyn AnyReaction>) {
    if r.flags() & EFFECT == 0 {
        return;
    }
    if r.flags() & ENQUEUED != 0 {
        return;
    }
    r.set_flags(r.flags() | ENQUEUED);
    with_context(|ctx| ctx.enqueue_effect(Rc::downgrade(r)));
}

/// Enqueue a freshly created effect for its first sweep, honoring the same
/// batching rules as any other push-triggered enqueue: runs synchronously
/// unless a batch is active, in which case it runs on batch exit.
pub fn schedule_initial_run(r: &Rc<dyn AnyReaction>) {
    enqueue_if_effect(r);
    maybe_drain_effects();
}

/// Remove `r` from the parents list of everything it currently has as a
/// child, then clear its own children list. Used when an effect is
/// destroyed: it must stop observing everything it was pulling.
pub fn disconnect_reaction(r: &Rc<dyn AnyReaction>) {
    let children = std::mem::take(&mut *r.children().borrow_mut());
    for child in &children {
        remove_parent(child, r);
    }
}

/// Drain the pending effect queue in FIFO insertion order, unless a batch
/// is active or a drain is already in progress higher up the call stack
/// (in which case that outer loop will pick up anything enqueued here).
fn maybe_drain_effects() {
    let should_start = with_context(|ctx| {
        if ctx.is_batching() || ctx.is_draining() {
            false
        } else {
            ctx.set_draining(true);
            true
        }
    });
    if !should_start {
        return;
    }

    loop {
        let next = with_context(|ctx| ctx.pop_effect());
        let Some(weak) = next else { break };
        let Some(effect) = weak.upgrade() else { continue };
        effect.set_flags(effect.flags() & !ENQUEUED);
        if effect.flags() & DESTROYED != 0 {
            continue;
        }
        run_effect_catching(effect);
    }

    with_context(|ctx| ctx.set_draining(false));
}

/// Sweep an effect, catching any panic from its callback (or from any
/// memo it transitively pulls) and routing it to the effect's owning
/// scope, per spec Section 7. The reaction itself is left intact; only
/// its owning scope is torn down automatically by `run_in_scope`/
/// `dispose_scope`, never the engine.
fn run_effect_catching(effect: Rc<dyn AnyReaction>) {
    let owner = effect_owner_scope(&effect);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sweep(effect.clone())));
    if let Err(payload) = result {
        let error = ReactiveError::new(payload);
        match owner {
            Some(scope) => crate::scope::fail_scope(&scope, error),
            None => with_context(|ctx| ctx.defer_error(error)),
        }
    }
}

fn effect_owner_scope(effect: &Rc<dyn AnyReaction>) -> Option<crate::scope::Scope> {
    crate::primitives::effect::owner_scope_of(effect)
}

/// Defer draining the effect queue until the outermost `batch` call
/// returns. Re-entrant batches coalesce into a single drain.
pub fn batch<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = BatchGuard::enter();
    f()
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        with_context(|ctx| ctx.enter_batch());
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = with_context(|ctx| ctx.exit_batch());
        if depth == 0 {
            maybe_drain_effects();
        }
    }
}

/// Run `f` with the "current reaction" slot cleared so any `pull` inside
/// records no dependency edges.
pub fn untrack<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = UntrackGuard::enter();
    f()
}

struct UntrackGuard {
    prev: bool,
}

impl UntrackGuard {
    fn enter() -> Self {
        let prev = with_context(|ctx| ctx.set_untracking(true));
        Self { prev }
    }
}

impl Drop for UntrackGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.set_untracking(self.prev));
    }
}
