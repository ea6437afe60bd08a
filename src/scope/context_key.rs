// ============================================================================
// reactive-core - Context keys
// A process-wide registry of typed keys used by `set_context`/`get_context`.
// ============================================================================

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static NEXT_ID: Cell<usize> = Cell::new(0);
}

/// A unique, typed key for scope-tree context values. Create one per
/// logical piece of ambient data (mirroring a module-level symbol in the
/// source this was distilled from) and share it wherever that data needs
/// to be read back out with `get_context`.
pub struct ContextKey<T> {
    id: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub fn new() -> Self {
        let id = NEXT_ID.with(|c| {
            let v = c.get();
            c.set(v + 1);
            v
        });
        Self { id, _marker: PhantomData }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }
}

impl<T> Default for ContextKey<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual Clone/Copy: derive would require T: Clone, but the key carries no
// T value, only a tag for it.
impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        Self { id: self.id, _marker: PhantomData }
    }
}
impl<T> Copy for ContextKey<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keys_get_distinct_ids() {
        let a: ContextKey<i32> = ContextKey::new();
        let b: ContextKey<i32> = ContextKey::new();
        assert_ne!(a.id(), b.id());
    }
}
