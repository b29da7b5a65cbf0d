//! Stack safety for the recursive-descent IR traversals.
//!
//! Scope building, constant evaluation and fragment building all recurse
//! once per nested expression or statement. Deeply nested bodies (long
//! string concatenations, generated `else if` chains) would overflow a
//! thread's default stack, so every recursive visit goes through
//! [`ensure_sufficient_stack`].
//!
//! Native targets grow the stack on demand with `stacker`. On wasm the call
//! is a passthrough.
//!
//! [`RecursionLimit`] bounds recursion that is driven by program data rather
//! than tree shape, such as a constant initializer reading another constant.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 100 * 1024;

/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, growing the stack first if little of it remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Depth counter with a fixed ceiling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecursionLimit {
    depth: u32,
    limit: u32,
}

impl RecursionLimit {
    pub const fn new(limit: u32) -> Self {
        Self { depth: 0, limit }
    }

    /// Enter one level. Returns `false` (without entering) at the ceiling.
    #[must_use]
    pub fn enter(&mut self) -> bool {
        if self.depth >= self.limit {
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn exit(&mut self) {
        debug_assert!(self.depth > 0, "unbalanced RecursionLimit::exit");
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[cfg(test)]
mod tests;
