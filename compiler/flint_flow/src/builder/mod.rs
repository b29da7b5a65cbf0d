//! The flow builder.
//!
//! A second recursive descent over the function body, parallel to the scope
//! walk: every arm consumes exactly the fields its `skip_*` arm skips, and
//! enters scopes at the same offsets the scope builder keyed them by.
//!
//! Expression visits leave exactly one value on the value stack; statement
//! visits leave none.

mod exceptions;
mod expr;
mod prologue;
mod stmt;
mod yields;

use std::sync::Arc;

use tracing::debug;

use flint_const::ConstantEvaluator;
use flint_ir::{
    ConstantId, ConstantPool, Cursor, NameResolver, NodeRef, SourceError, SourceUnit, Symbol,
    TokenPos, TypeTranslator,
};
use flint_scope::{DepthState, PerDepth, ScopeId, ScopeResult, Storage, VarId, VariableKind};

use crate::ir::{Call, Callee, FlowGraph, Instr, InstrId, Op};
use crate::{BuildError, FlowOptions, Fragment, GraphBuilder, NodeId};

type BuildResult<T> = Result<T, BuildError>;

/// Build the flow graph of the function `scopes` was built for.
///
/// `evaluator` must be the evaluator (or one over the same unit) the scopes
/// were built with; constants it already produced are reused from the unit's
/// cache.
pub fn build_flow_graph<'u>(
    unit: &'u SourceUnit,
    scopes: &ScopeResult,
    evaluator: &mut ConstantEvaluator<'u>,
    translator: &dyn TypeTranslator,
    options: &FlowOptions,
) -> Result<FlowGraph, BuildError> {
    let symbol = unit
        .program()
        .resolve(scopes.member)
        .ok_or(BuildError::UnknownMember(scopes.member))?;
    debug!(
        member = %unit.program().qualified_name(scopes.member),
        kind = %scopes.kind,
        "building flow graph"
    );
    let builder = FlowBuilder {
        unit,
        scopes,
        evaluator,
        translator,
        options,
        symbol,
        graph: GraphBuilder::new(),
        values: Vec::new(),
        context_level: scopes.outer_context_level,
        depth: DepthState::default(),
        labels: Vec::new(),
        switch_cases: Vec::new(),
        finally_stack: Vec::new(),
        try_frames: Vec::new(),
        resume_points: Vec::new(),
    };
    builder.build()
}

/// Where a `break` or `continue` lands, and what it must unwind to get there.
#[derive(Copy, Clone, Debug)]
struct JumpTarget {
    /// Created on the first jump.
    node: Option<NodeId>,
    try_index: Option<u32>,
    context_level: u32,
    /// Enclosing finalizers at the target; deeper ones run before the jump.
    finally_depth: usize,
}

/// An enclosing try/finally whose finalizer non-local exits must run.
#[derive(Copy, Clone, Debug)]
struct FinallyEntry {
    finalizer: NodeRef,
    /// Handler around the whole try/finally.
    outer_try: Option<u32>,
    context_level: u32,
    /// Nesting at the try/finally statement itself.
    depth: DepthState,
    /// Labels and switch cases enclosing the statement.
    labels: usize,
    switch_cases: usize,
}

/// The context a handler restores, saved when its try body is entered.
#[derive(Copy, Clone, Debug)]
struct TryFrame {
    saved: VarId,
    context_level: u32,
}

/// What a suspension point needs rebuilt on resumption besides the context.
#[derive(Clone, Debug)]
struct ResumePoint {
    context_level: u32,
    /// Tries whose bodies enclose the suspension point, innermost first.
    tries: Vec<TryFrame>,
    catches: u32,
}

pub(crate) struct FlowBuilder<'a, 'u> {
    unit: &'u SourceUnit,
    scopes: &'a ScopeResult,
    evaluator: &'a mut ConstantEvaluator<'u>,
    translator: &'a dyn TypeTranslator,
    options: &'a FlowOptions,
    symbol: &'u Symbol,
    graph: GraphBuilder,
    values: Vec<InstrId>,
    /// Level of the current context.
    context_level: u32,
    depth: DepthState,
    /// Enclosing labeled statements, outermost first.
    labels: Vec<JumpTarget>,
    /// Case bodies of every enclosing switch, outermost switch first.
    switch_cases: Vec<JumpTarget>,
    finally_stack: Vec<FinallyEntry>,
    /// Indexed by handler.
    try_frames: Vec<TryFrame>,
    /// Indexed by resumption index minus one.
    resume_points: Vec<ResumePoint>,
}

impl FlowBuilder<'_, '_> {
    fn build(mut self) -> BuildResult<FlowGraph> {
        let entry = self.graph.target();
        let prologue = self.prologue(Fragment::at(entry))?;
        let prologue_level = self.context_level;

        let start = self.graph.target();
        let body = self.body(Fragment::at(start))?;
        if body.is_open() {
            let (body, null) = self.null(body, TokenPos::NO_SOURCE)?;
            self.graph.ret(body, null)?;
        }

        self.context_level = prologue_level;
        self.graph.set_try_index(None);
        self.dispatch(prologue, start)?;
        Ok(self.graph.finish(entry)?)
    }

    // ── Emission ────────────────────────────────────────────────

    fn emit(&mut self, body: Fragment, op: Op, pos: TokenPos) -> BuildResult<(Fragment, InstrId)> {
        let (segment, id) = self.graph.emit(Instr {
            op,
            pos,
            inferred: None,
        });
        Ok((self.graph.append(body, segment)?, id))
    }

    /// Like [`emit`](Self::emit), annotated with the type inferred for the
    /// expression at `node`.
    fn emit_typed(
        &mut self,
        body: Fragment,
        op: Op,
        pos: TokenPos,
        node: NodeRef,
    ) -> BuildResult<(Fragment, InstrId)> {
        let (segment, id) = self.graph.emit(Instr {
            op,
            pos,
            inferred: self.unit.metadata().inferred_type(node),
        });
        Ok((self.graph.append(body, segment)?, id))
    }

    fn constant(
        &mut self,
        body: Fragment,
        id: ConstantId,
        pos: TokenPos,
    ) -> BuildResult<(Fragment, InstrId)> {
        self.emit(body, Op::Constant(id), pos)
    }

    fn null(&mut self, body: Fragment, pos: TokenPos) -> BuildResult<(Fragment, InstrId)> {
        self.constant(body, ConstantPool::NULL, pos)
    }

    fn call(
        &mut self,
        body: Fragment,
        call: Call,
        pos: TokenPos,
        node: NodeRef,
    ) -> BuildResult<(Fragment, InstrId)> {
        self.emit_typed(body, Op::Call(Box::new(call)), pos, node)
    }

    fn call_instance(
        &mut self,
        body: Fragment,
        name: &str,
        args: Vec<InstrId>,
        pos: TokenPos,
    ) -> BuildResult<(Fragment, InstrId)> {
        let call = Call::new(Callee::Instance(Arc::from(name)), args);
        self.emit(body, Op::Call(Box::new(call)), pos)
    }

    fn stack_check(&mut self, body: Fragment, pos: TokenPos) -> BuildResult<Fragment> {
        if !self.options.stack_checks {
            return Ok(body);
        }
        let op = Op::CheckStackOverflow {
            loop_depth: self.depth.loops,
        };
        Ok(self.emit(body, op, pos)?.0)
    }

    /// Throw `error` at runtime, continuing in an unreachable block.
    fn throw_error(&mut self, body: Fragment, error: SourceError) -> BuildResult<Fragment> {
        debug!(%error, "source error deferred to runtime");
        let pos = error.pos;
        let (body, value) = self.emit(body, Op::MakeError(error), pos)?;
        let closed = self.graph.throw(body, value)?;
        Ok(Fragment {
            entry: closed.entry,
            current: Some(self.graph.target()),
        })
    }

    // ── Value stack ─────────────────────────────────────────────

    fn push(&mut self, value: InstrId) {
        self.values.push(value);
    }

    fn pop(&mut self) -> BuildResult<InstrId> {
        self.values.pop().ok_or(BuildError::StackUnderflow)
    }

    // ── Variables ───────────────────────────────────────────────

    fn lookup(&self, decl: NodeRef) -> BuildResult<VarId> {
        self.scopes
            .lookup(decl)
            .ok_or(BuildError::UnknownVariable(decl))
    }

    fn synthetic(&self, var: Option<VarId>, name: &str) -> BuildResult<VarId> {
        var.ok_or_else(|| BuildError::MissingSynthetic(name.to_owned()))
    }

    fn at_depth(&self, kind: PerDepth, depth: u32) -> BuildResult<VarId> {
        self.scopes
            .synthetic
            .at_depth(kind, depth)
            .ok_or_else(|| BuildError::MissingSynthetic(kind.name(depth.max(1))))
    }

    fn this(&mut self, body: Fragment, pos: TokenPos) -> BuildResult<(Fragment, InstrId)> {
        let this = self.synthetic(self.scopes.synthetic.this, flint_scope::names::THIS)?;
        self.load(body, this, pos)
    }

    /// Parent links from the current context to the one at `level`.
    fn hops(&self, var: VarId, level: u32) -> BuildResult<u32> {
        self.context_level
            .checked_sub(level)
            .ok_or(BuildError::ContextUnderflow(var))
    }

    fn load(&mut self, body: Fragment, var: VarId, pos: TokenPos) -> BuildResult<(Fragment, InstrId)> {
        let variable = self.scopes.variable(var);
        if variable.kind == VariableKind::Local {
            if let Some(value) = variable.const_value {
                return self.constant(body, value, pos);
            }
        }
        let op = match variable.storage {
            Storage::Stack { .. } | Storage::Parameter { .. } => Op::LoadLocal(var),
            Storage::Context { level, index } => Op::LoadContext {
                var,
                hops: self.hops(var, level)?,
                index,
            },
            Storage::Unallocated => return Err(BuildError::Unallocated(var)),
        };
        self.emit(body, op, pos)
    }

    fn store(
        &mut self,
        body: Fragment,
        var: VarId,
        value: InstrId,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        let op = match self.scopes.variable(var).storage {
            Storage::Stack { .. } | Storage::Parameter { .. } => Op::StoreLocal { var, value },
            Storage::Context { level, index } => Op::StoreContext {
                var,
                hops: self.hops(var, level)?,
                index,
                value,
            },
            Storage::Unallocated => return Err(BuildError::Unallocated(var)),
        };
        Ok(self.emit(body, op, pos)?.0)
    }

    // ── Contexts ────────────────────────────────────────────────

    /// Enter the scope opened at `node`, allocating its context if it has
    /// one. Returns the level to restore on exit.
    fn enter_scope(
        &mut self,
        body: Fragment,
        node: NodeRef,
        pos: TokenPos,
    ) -> BuildResult<(Fragment, u32)> {
        match self.scopes.scope_at(node) {
            Some(scope) => self.enter_scope_id(body, scope, pos),
            None => Ok((body, self.context_level)),
        }
    }

    fn enter_scope_id(
        &mut self,
        body: Fragment,
        scope: ScopeId,
        pos: TokenPos,
    ) -> BuildResult<(Fragment, u32)> {
        let saved = self.context_level;
        let scope = self.scopes.scope(scope);
        let Some(level) = scope.context_level else {
            return Ok((body, saved));
        };
        let op = Op::EnterContext {
            level,
            size: scope.context_size,
        };
        let (body, _) = self.emit(body, op, pos)?;
        self.context_level = level;
        Ok((body, saved))
    }

    fn exit_scope(&mut self, body: Fragment, saved: u32) -> BuildResult<Fragment> {
        let body = if body.is_open() && self.context_level != saved {
            self.emit(body, Op::ExitContext, TokenPos::NO_SOURCE)?.0
        } else {
            body
        };
        self.context_level = saved;
        Ok(body)
    }

    /// Leave contexts until the one at `level` is current.
    fn unwind_context(&mut self, mut body: Fragment, level: u32) -> BuildResult<Fragment> {
        while self.context_level > level {
            body = self.emit(body, Op::ExitContext, TokenPos::NO_SOURCE)?.0;
            self.context_level -= 1;
        }
        Ok(body)
    }

    // ── Non-local exits ─────────────────────────────────────────

    fn jump_target(&self) -> JumpTarget {
        JumpTarget {
            node: None,
            try_index: self.graph.try_index(),
            context_level: self.context_level,
            finally_depth: self.finally_stack.len(),
        }
    }

    /// Node of `target`, creating it on first use.
    fn resolve_target(graph: &mut GraphBuilder, target: &mut JumpTarget) -> NodeId {
        let try_index = target.try_index;
        *target.node.get_or_insert_with(|| graph.target_in(try_index))
    }

    /// Jump to `node`, running the finalizers and leaving the contexts
    /// between here and `target`.
    fn jump(&mut self, body: Fragment, target: JumpTarget, node: NodeId) -> BuildResult<Fragment> {
        let (level, try_index) = (self.context_level, self.graph.try_index());
        let result = self.jump_unwinding(body, target, node);
        self.context_level = level;
        self.graph.set_try_index(try_index);
        result
    }

    fn jump_unwinding(
        &mut self,
        body: Fragment,
        target: JumpTarget,
        node: NodeId,
    ) -> BuildResult<Fragment> {
        let body = self.run_finalizers(body, target.finally_depth)?;
        if body.is_closed() {
            return Ok(body);
        }
        let body = self.unwind_context(body, target.context_level)?;
        Ok(self.graph.goto(body, node)?)
    }

    /// Inline the finalizers above `down_to`, innermost first.
    ///
    /// Leaves the context level and try index of the outermost one run.
    fn run_finalizers(&mut self, mut body: Fragment, down_to: usize) -> BuildResult<Fragment> {
        for index in (down_to..self.finally_stack.len()).rev() {
            let entry = self.finally_stack[index];
            body = self.unwind_context(body, entry.context_level)?;
            body = self.inline_finalizer(body, entry, index)?;
            if body.is_closed() {
                break;
            }
        }
        Ok(body)
    }

    /// A fresh copy of the finalizer of `entry`, the `index`th enclosing
    /// try/finally. Leaves the try index at the handler around it.
    fn inline_finalizer(
        &mut self,
        body: Fragment,
        entry: FinallyEntry,
        index: usize,
    ) -> BuildResult<Fragment> {
        let start = self.graph.target_in(entry.outer_try);
        let head = self.graph.goto(body, start)?;
        self.graph.set_try_index(entry.outer_try);

        let saved_depth = self.depth;
        self.depth = entry.depth;
        self.depth.catches += 1;
        self.depth.finallies += 1;
        let inner = self.finally_stack.split_off(index);
        let labels = self.labels.split_off(entry.labels);
        let switch_cases = self.switch_cases.split_off(entry.switch_cases);
        let mut c = self.unit.cursor_at(entry.finalizer);
        let tail = self.visit_statement(Fragment::at(start), &mut c);
        self.finally_stack.extend(inner);
        self.labels.extend(labels);
        self.switch_cases.extend(switch_cases);
        self.depth = saved_depth;

        Ok(Fragment {
            entry: head.entry,
            current: tail?.current,
        })
    }

    /// Visit the expression at `node` without moving `c`.
    fn value_at(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        node: NodeRef,
    ) -> BuildResult<(Fragment, InstrId)> {
        c.with_alternate_position(node, |c| self.visit_value(body, c))
    }
}
