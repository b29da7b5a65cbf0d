//! Flow graph construction for one function of a source unit.
//!
//! [`build_flow_graph`] walks a function's IR a second time, after scope
//! building, and lowers it into a [`FlowGraph`]:
//!
//! - structured control flow (loops, switches, try/catch/finally) becomes
//!   explicit blocks and edges
//! - variable accesses become stack or context accesses, as the scope result
//!   allocated them
//! - constant sub-expressions are folded by the constant evaluator; source
//!   errors in them are deferred to code that throws at runtime
//! - generator bodies get a resumption dispatch at their entry
//!
//! # Architecture
//!
//! Every visit takes the [`Fragment`] built so far and returns it extended.
//! Fragments live in a [`GraphBuilder`] arena that is finalized into blocks
//! once the whole body is built.
//!
//! ```text
//! ScopeResult ──┐
//!               ├─▶ FlowBuilder ──▶ GraphBuilder ──finish──▶ FlowGraph
//! IR cursor ────┘        │
//!                        └─▶ ConstantEvaluator
//! ```

mod builder;
mod error;
mod fragment;
mod ir;
mod print;

pub use builder::build_flow_graph;
pub use error::{BuildError, FragmentError};
pub use fragment::{Fragment, GraphBuilder, NodeId};
pub use ir::{
    Block, BlockId, BlockKind, Call, Callee, FlowGraph, Handler, Instr, InstrId, Op, Terminator,
    YieldContinuation,
};
pub use print::GraphPrinter;

/// Knobs of flow building.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlowOptions {
    /// Lower `assert` statements; they are skipped otherwise.
    pub enable_asserts: bool,
    /// Emit stack overflow checks at function entry and loop headers.
    pub stack_checks: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            enable_asserts: false,
            stack_checks: true,
        }
    }
}

#[cfg(test)]
mod tests;
