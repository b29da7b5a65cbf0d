//! Constant evaluation over the binary IR.
//!
//! [`ConstantEvaluator`] resolves the compile-time-constant subset of
//! expressions. Results are interned in the unit's [`ConstantPool`] and
//! memoized in its [`ConstantCache`] by expression offset, so every
//! compilation of the unit shares them.
//!
//! # Scope
//!
//! - Literals, logical and conditional expressions, string concatenation
//! - Operations on constant receivers through a [`ConstInvoker`]
//! - Const list, map and constructor literals
//! - Static const field reads, with cycle detection
//!
//! Does NOT cover:
//! - Calls to user functions (never constant)
//! - Instance `==` overrides
//!
//! [`ConstantPool`]: flint_ir::ConstantPool
//! [`ConstantCache`]: flint_ir::ConstantCache

use std::sync::Arc;

use rustc_hash::FxHashMap;

mod builtins;
mod error;
mod eval;

pub use builtins::{interpolate, BuiltinInvoker, ConstArgs, ConstInvoker};
pub use error::ConstError;
pub use eval::ConstantEvaluator;

use flint_ir::{ConstantId, SourceError};

/// Recursion ceiling for constant evaluation.
pub const DEFAULT_MAX_DEPTH: u32 = 4096;

/// Knobs of the constant evaluator.
#[derive(Clone, Debug)]
pub struct ConstOptions {
    /// `-D name=value` defines read by `fromEnvironment` constructors.
    pub defines: Arc<FxHashMap<String, String>>,
    /// Deepest nesting of evaluations before failing with `TooDeep`.
    pub max_depth: u32,
}

impl Default for ConstOptions {
    fn default() -> Self {
        Self {
            defines: Arc::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ConstOptions {
    #[must_use]
    pub fn with_define(mut self, name: &str, value: &str) -> Self {
        Arc::make_mut(&mut self.defines).insert(name.to_owned(), value.to_owned());
        self
    }
}

/// Where the caller's cursor ends up after an evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CursorMode {
    /// Back at the start of the expression.
    #[default]
    Reset,
    /// Just past the expression.
    Advance,
}

/// Outcome of [`ConstantEvaluator::evaluate_safe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstResult {
    Value(ConstantId),
    /// The expression is not constant; callers fall back to runtime code.
    Error(SourceError),
}

impl ConstResult {
    pub fn value(&self) -> Option<ConstantId> {
        match self {
            ConstResult::Value(id) => Some(*id),
            ConstResult::Error(_) => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, ConstResult::Value(_))
    }
}

/// Counters probing how much work the evaluator did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Expressions evaluated from their bytes.
    pub evaluations: u64,
    /// Expressions answered from the constant cache.
    pub cache_hits: u64,
}

#[cfg(test)]
mod tests;
