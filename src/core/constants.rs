// ============================================================================
// reactive-core - Constants
// Bit flags for node kind and three-color sweep status.
// ============================================================================

// =============================================================================
// NODE KIND FLAGS
// =============================================================================

/// Node can be pulled and pushed (every reaction is also a subject).
pub const SUBJECT: u32 = 1 << 0;

/// Node additionally carries a callback and an ordered children list.
pub const REACTION: u32 = 1 << 1;

/// Reaction is an effect: its lifetime is bound to a scope and it is
/// enqueued onto the process-wide dirty-effect queue instead of being
/// swept inline by its parent.
pub const EFFECT: u32 = 1 << 2;

// =============================================================================
// SCHEDULING FLAGS
// =============================================================================

/// Reaction is currently present in the pending effect queue. Prevents a
/// reaction from being enqueued twice for the same propagation.
pub const ENQUEUED: u32 = 1 << 3;

/// Reaction is currently executing (guards against naive re-entrant sweep).
pub const RUNNING: u32 = 1 << 4;

/// Node has been torn down; no further pulls/pushes should touch it.
pub const DESTROYED: u32 = 1 << 5;

// =============================================================================
// THREE-COLOR STATUS
// =============================================================================
//
// "Dirty" has no dedicated bit: per the design notes, absence of state
// encodes dirty. A freshly-created reaction therefore starts dirty without
// needing to clear anything, and `push` marks a node dirty simply by
// clearing whichever status bit it held.

/// Node is known to be up to date; re-running its callback would be a no-op.
pub const CLEAN: u32 = 1 << 6;

/// Node may no longer be clean; deciding requires sweeping its children.
pub const CHECK: u32 = 1 << 7;

/// Mask covering both status bits, for clear-then-set updates. A value of
/// `flags & STATUS_MASK == 0` means dirty.
pub const STATUS_MASK: u32 = CLEAN | CHECK;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_distinct() {
        let all_flags = [
            SUBJECT, REACTION, EFFECT, ENQUEUED, RUNNING, DESTROYED, CLEAN, CHECK,
        ];
        for (i, &a) in all_flags.iter().enumerate() {
            for (j, &b) in all_flags.iter().enumerate() {
                if i != j {
                    assert_eq!(a & b, 0, "flags at {i} and {j} overlap: {a:b} & {b:b}");
                }
            }
        }
    }

    #[test]
    fn status_mask_clears_only_status_bits() {
        let flags = REACTION | EFFECT | CHECK;
        let cleared = flags & !STATUS_MASK;
        assert_eq!(cleared & STATUS_MASK, 0);
        assert_ne!(cleared & REACTION, 0);
        assert_ne!(cleared & EFFECT, 0);
    }

    #[test]
    fn absence_of_status_bits_is_dirty() {
        let flags = REACTION | EFFECT;
        assert_eq!(flags & STATUS_MASK, 0, "no CLEAN/CHECK bit set means dirty");
    }

    #[test]
    fn can_transition_check_to_dirty_by_clearing() {
        let mut flags = REACTION | CHECK;
        assert_ne!(flags & CHECK, 0);
        flags &= !STATUS_MASK;
        assert_eq!(flags & STATUS_MASK, 0);
    }
}
