// ============================================================================
// reactive-core - Core Module
// Fundamental types, flag constants, and thread-local context.
// ============================================================================

pub mod constants;
pub mod context;
pub mod types;

pub use constants::*;
pub use context::{
    is_batching, is_tracking, is_untracking, set_error_deferral_hook, with_context,
    ReactiveContext,
};
pub use types::{default_equals, AnyReaction, AnySource, EqualsFn, SourceInner};
