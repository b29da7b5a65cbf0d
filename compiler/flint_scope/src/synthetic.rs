//! Compiler-introduced variables.
//!
//! Each is created at most once per function, or once per nesting depth for the
//! per-depth kinds. A variable an enclosing function already lifted into its
//! context is reused through that context instead of being declared again.

use crate::VarId;

/// Names of synthetic variables.
pub mod names {
    pub const THIS: &str = "this";
    pub const CLOSURE: &str = ":closure";
    pub const TYPE_ARGUMENTS: &str = ":type_arguments";
    pub const FUNCTION_TYPE_ARGUMENTS: &str = ":function_type_arguments";
    pub const SWITCH: &str = ":switch_variable";
    pub const EXPRESSION_TEMP: &str = ":expr_temp";
    pub const FINALLY_RETURN: &str = ":finally_ret_val";
    pub const AWAIT_JUMP: &str = ":await_jump_var";
    pub const AWAIT_CONTEXT: &str = ":await_ctx_var";
    pub const ASYNC_EXCEPTION: &str = ":exception";
    pub const ASYNC_STACK_TRACE: &str = ":stack_trace";
}

/// Synthetic variables kept one per nesting depth.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PerDepth {
    /// Per for-in depth.
    Iterator,
    /// Per catch depth.
    Exception,
    StackTrace,
    /// Unboxed aliases of the exception pair, rethrown as-is.
    RawException,
    RawStackTrace,
    /// Per try depth: context to restore when a handler is entered.
    SavedTryContext,
}

impl PerDepth {
    /// Name of the variable for nesting `depth` (1-based).
    pub fn name(self, depth: u32) -> String {
        let base = match self {
            PerDepth::Iterator => ":iterator",
            PerDepth::Exception => ":exception",
            PerDepth::StackTrace => ":stack_trace",
            PerDepth::RawException => ":raw_exception",
            PerDepth::RawStackTrace => ":raw_stack_trace",
            PerDepth::SavedTryContext => ":saved_try_context_var",
        };
        format!("{base}{}", depth - 1)
    }

    pub fn forced_stack(self) -> bool {
        matches!(
            self,
            PerDepth::RawException | PerDepth::RawStackTrace | PerDepth::SavedTryContext
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyntheticVariables {
    pub this: Option<VarId>,
    pub closure: Option<VarId>,
    /// Type arguments passed to a factory.
    pub type_arguments: Option<VarId>,
    /// Type arguments of a generic function.
    pub function_type_arguments: Option<VarId>,
    pub switch_variable: Option<VarId>,
    pub expression_temp: Option<VarId>,
    pub finally_return: Option<VarId>,
    /// Resumption index of a generator body.
    pub await_jump: Option<VarId>,
    /// Context saved at a suspension point.
    pub await_context: Option<VarId>,
    /// Exception and stack trace a yielding closure is resumed with.
    pub async_exception: Option<VarId>,
    pub async_stack_trace: Option<VarId>,
    pub(crate) iterators: Vec<VarId>,
    pub(crate) exceptions: Vec<VarId>,
    pub(crate) stack_traces: Vec<VarId>,
    pub(crate) raw_exceptions: Vec<VarId>,
    pub(crate) raw_stack_traces: Vec<VarId>,
    pub(crate) saved_try_contexts: Vec<VarId>,
}

impl SyntheticVariables {
    /// Variable of `kind` for nesting `depth` (1-based), if one was created.
    pub fn at_depth(&self, kind: PerDepth, depth: u32) -> Option<VarId> {
        let index = usize::try_from(depth.checked_sub(1)?).ok()?;
        self.slots(kind).get(index).copied()
    }

    /// How many depths have a variable of `kind`.
    pub fn depth_count(&self, kind: PerDepth) -> usize {
        self.slots(kind).len()
    }

    fn slots(&self, kind: PerDepth) -> &[VarId] {
        match kind {
            PerDepth::Iterator => &self.iterators,
            PerDepth::Exception => &self.exceptions,
            PerDepth::StackTrace => &self.stack_traces,
            PerDepth::RawException => &self.raw_exceptions,
            PerDepth::RawStackTrace => &self.raw_stack_traces,
            PerDepth::SavedTryContext => &self.saved_try_contexts,
        }
    }

    pub(crate) fn slots_mut(&mut self, kind: PerDepth) -> &mut Vec<VarId> {
        match kind {
            PerDepth::Iterator => &mut self.iterators,
            PerDepth::Exception => &mut self.exceptions,
            PerDepth::StackTrace => &mut self.stack_traces,
            PerDepth::RawException => &mut self.raw_exceptions,
            PerDepth::RawStackTrace => &mut self.raw_stack_traces,
            PerDepth::SavedTryContext => &mut self.saved_try_contexts,
        }
    }
}
