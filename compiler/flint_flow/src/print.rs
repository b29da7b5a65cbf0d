//! Textual form of a [`FlowGraph`].
//!
//! ```text
//! B0 entry:
//!   i0 = const null
//!   return i0
//! B1 join <- B0, B2 [try 0]:
//! ```
//!
//! Without a unit, references and constants print as raw ids.

use std::fmt::{self, Write};

use flint_ir::{CanonicalRef, ConstantId, NameResolver, SourceUnit};

use crate::ir::{BlockKind, Call, Callee, FlowGraph, InstrId, Op, Terminator};

/// Renders a graph, resolving names through `unit` when given one.
pub struct GraphPrinter<'a> {
    graph: &'a FlowGraph,
    unit: Option<&'a SourceUnit>,
}

impl<'a> GraphPrinter<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self { graph, unit: None }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: &'a SourceUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    fn name(&self, r: CanonicalRef) -> String {
        match self.unit {
            Some(unit) => unit.program().qualified_name(r),
            None => format!("{r:?}"),
        }
    }

    fn constant(&self, id: ConstantId) -> String {
        match self.unit.and_then(|unit| unit.pool().get(id)) {
            Some(value) => value.to_string(),
            None => format!("#{}", id.raw()),
        }
    }

    fn op(&self, f: &mut fmt::Formatter<'_>, op: &Op) -> fmt::Result {
        match op {
            Op::Constant(id) => write!(f, "const {}", self.constant(*id)),
            Op::Parameter { index, default } => {
                write!(f, "param {index}")?;
                if let Some(default) = default {
                    write!(f, " default {}", self.constant(*default))?;
                }
                Ok(())
            }
            Op::LoadLocal(var) => write!(f, "load {var}"),
            Op::StoreLocal { var, value } => write!(f, "store {var}, {value}"),
            Op::LoadContext { var, hops, index } => write!(f, "load_context {var} @{hops}.{index}"),
            Op::StoreContext {
                var,
                hops,
                index,
                value,
            } => write!(f, "store_context {var} @{hops}.{index}, {value}"),
            Op::EnterContext { level, size } => write!(f, "enter_context level {level} size {size}"),
            Op::ExitContext => f.write_str("exit_context"),
            Op::CloneContext => f.write_str("clone_context"),
            Op::CurrentContext => f.write_str("current_context"),
            Op::SetContext(value) => write!(f, "set_context {value}"),
            Op::ClosureContext(value) => write!(f, "closure_context {value}"),
            Op::ClosureReceiver(value) => write!(f, "closure_receiver {value}"),
            Op::LoadStatic(field) => write!(f, "load_static {}", self.name(*field)),
            Op::InitStatic(field) => write!(f, "init_static {}", self.name(*field)),
            Op::StoreStatic { field, value } => {
                write!(f, "store_static {}, {value}", self.name(*field))
            }
            Op::LoadField { receiver, field } => {
                write!(f, "load_field {receiver}.{}", self.name(*field))
            }
            Op::StoreField {
                receiver,
                field,
                value,
            } => write!(f, "store_field {receiver}.{}, {value}", self.name(*field)),
            Op::Call(call) => self.call(f, call),
            Op::AllocateObject(class) => write!(f, "allocate {}", self.name(*class)),
            Op::AllocateClosure { function } => write!(f, "closure {function}"),
            Op::TearOff { receiver, target } => {
                write!(f, "tear_off {receiver}.{}", self.name(*target))
            }
            Op::Not(value) => write!(f, "not {value}"),
            Op::Equals { left, right } => write!(f, "equals {left}, {right}"),
            Op::IsNull(value) => write!(f, "is_null {value}"),
            Op::CheckNull(value) => write!(f, "check_null {value}"),
            Op::InstanceOf { value, ty } => write!(f, "instance_of {value}, {ty}"),
            Op::AssertAssignable { value, ty, name } => {
                write!(f, "assert_assignable {value}, {ty}, '{name}'")
            }
            Op::InstantiateType(ty) => write!(f, "instantiate {ty}"),
            Op::Interpolate(values) => list(f, "interpolate", values),
            Op::CreateList(values) => list(f, "list", values),
            Op::CreateMap(values) => list(f, "map", values),
            Op::LoadException => f.write_str("load_exception"),
            Op::LoadStackTrace => f.write_str("load_stack_trace"),
            Op::MakeError(error) => write!(f, "error \"{error}\""),
            Op::AssertionError { message, start, end } => {
                write!(f, "assertion_error [{start}, {end}]")?;
                if let Some(message) = message {
                    write!(f, " {message}")?;
                }
                Ok(())
            }
            Op::InvocationMirror {
                name,
                arguments,
                names,
            } => {
                write!(f, "invocation '{name}'")?;
                args(f, arguments, names)
            }
            Op::CheckStackOverflow { loop_depth } => write!(f, "check_stack loop {loop_depth}"),
        }
    }

    fn call(&self, f: &mut fmt::Formatter<'_>, call: &Call) -> fmt::Result {
        match &call.callee {
            Callee::Static(target) => write!(f, "call {}", self.name(*target))?,
            Callee::Instance(name) => write!(f, "call_instance '{name}'")?,
            Callee::Closure => f.write_str("call_closure")?,
        }
        if !call.type_arguments.is_empty() {
            f.write_char('<')?;
            for (i, ty) in call.type_arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{ty}")?;
            }
            f.write_char('>')?;
        }
        args(f, &call.args, &call.names)
    }
}

/// `(i1, i2, name: i3)`; the last `names.len()` values are named.
fn args(f: &mut fmt::Formatter<'_>, values: &[InstrId], names: &[std::sync::Arc<str>]) -> fmt::Result {
    let positional = values.len().saturating_sub(names.len());
    f.write_char('(')?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if let Some(name) = i.checked_sub(positional).and_then(|n| names.get(n)) {
            write!(f, "{name}: ")?;
        }
        write!(f, "{value}")?;
    }
    f.write_char(')')
}

fn list(f: &mut fmt::Formatter<'_>, head: &str, values: &[InstrId]) -> fmt::Result {
    write!(f, "{head}")?;
    args(f, values, &[])
}

impl fmt::Display for GraphPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.graph.blocks {
            write!(f, "{}", block.id)?;
            match block.kind {
                BlockKind::FunctionEntry => f.write_str(" entry")?,
                BlockKind::Target => f.write_str(" target")?,
                BlockKind::Join => f.write_str(" join")?,
                BlockKind::Catch { handler } => write!(f, " catch {handler}")?,
            }
            for (i, pred) in block.predecessors.iter().enumerate() {
                f.write_str(if i == 0 { " <- " } else { ", " })?;
                write!(f, "{pred}")?;
            }
            if let Some(index) = block.try_index {
                write!(f, " [try {index}]")?;
            }
            f.write_str(":\n")?;

            for (id, instr) in self.graph.block_instrs(block.id) {
                write!(f, "  {id} = ")?;
                self.op(f, &instr.op)?;
                f.write_char('\n')?;
            }
            match &block.terminator {
                Terminator::Goto(target) => writeln!(f, "  goto {target}")?,
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => writeln!(f, "  branch {cond}, {then_block}, {else_block}")?,
                Terminator::Return(value) => writeln!(f, "  return {value}")?,
                Terminator::Throw(value) => writeln!(f, "  throw {value}")?,
                Terminator::Rethrow {
                    exception,
                    stack_trace,
                } => writeln!(f, "  rethrow {exception}, {stack_trace}")?,
            }
        }
        for (i, continuation) in self.graph.continuations.iter().enumerate() {
            writeln!(f, "resume {} -> {}", i + 1, continuation.entry)?;
        }
        Ok(())
    }
}

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        GraphPrinter::new(self).fmt(f)
    }
}
