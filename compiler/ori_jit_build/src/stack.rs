//! Stack growth for the recursive snapshot walk.
//!
//! Inlining trees are shallow in practice, but polymorphic chains recurse
//! once per candidate and a background worker thread may have a small stack.
//! Each recursive step goes through [`ensure_sufficient_stack`], which grows
//! the stack on native targets when fewer than [`RED_ZONE`] bytes remain.

/// Minimum stack space to keep available before recursing (100KB).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if the red zone has been reached.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack; call directly.
#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
