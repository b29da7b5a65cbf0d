//! Text output of the `flint` commands.
//!
//! Each command renders into a `String` so the binary only prints it.

use std::fmt::Write as _;

use flint_flow::GraphPrinter;
use flint_ir::{NameResolver, SourceUnit};
use flint_scope::{FunctionKind, ScopeTarget};

use crate::pipeline::{analyze, compile_all, compile_member, field_initializer, resolve_member};
use crate::{CompileError, CompiledMember, CompilerOptions};

/// `flint dump`: the decoded tree of every function and field initializer.
pub fn dump(unit: &SourceUnit) -> Result<String, CompileError> {
    let mut out = String::new();
    for (r, symbol) in unit.program().iter() {
        let name = unit.program().qualified_name(r);
        if let Some(function) = symbol.function() {
            let tree = unit.cursor_at(function).decode_function_node()?;
            let _ = writeln!(out, "{name} @{function}:\n{tree:#?}");
        } else if let Some(init) = field_initializer(symbol) {
            let tree = unit.cursor_at(init).decode_expression()?;
            let _ = writeln!(out, "{name} = @{init}:\n{tree:#?}");
        }
    }
    Ok(out)
}

/// `flint scopes`: variable descriptors of a member.
pub fn scopes(
    unit: &SourceUnit,
    member: &str,
    kind: Option<FunctionKind>,
    options: &CompilerOptions,
) -> Result<String, CompileError> {
    let r = resolve_member(unit, member)?;
    let target = match kind {
        Some(kind) => ScopeTarget::synthetic(unit, r, kind)?,
        None => ScopeTarget::member(unit, r)?,
    };
    let result = analyze(unit, &target, options)?;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{member} ({}): {} stack slots, outer context level {}",
        result.kind, result.num_stack_locals, result.outer_context_level
    );
    for descriptor in result.var_descriptors() {
        let _ = writeln!(out, "  {descriptor}");
    }
    Ok(out)
}

/// `flint graph`: the graph of one member and its closures, or of the whole
/// unit when no member is named.
pub fn graph(
    unit: &SourceUnit,
    member: Option<&str>,
    kind: Option<FunctionKind>,
    options: &CompilerOptions,
) -> Result<String, CompileError> {
    let mut out = String::new();
    match member {
        Some(name) => {
            let r = resolve_member(unit, name)?;
            let compiled = compile_member(unit, r, kind, options)?;
            render_member(&mut out, unit, &compiled);
        }
        None => {
            for result in compile_all(unit, options)? {
                match result {
                    Ok(compiled) => render_member(&mut out, unit, &compiled),
                    Err(error) => {
                        let _ = writeln!(out, "error: {error}\n");
                    }
                }
            }
        }
    }
    Ok(out)
}

fn render_member(out: &mut String, unit: &SourceUnit, compiled: &CompiledMember) {
    for function in &compiled.functions {
        match function.closure {
            Some(node) => {
                let _ = writeln!(out, "== {} closure @{node} ==", compiled.name);
            }
            None => {
                let _ = writeln!(out, "== {} ({}) ==", compiled.name, function.kind);
            }
        }
        let _ = writeln!(out, "{}", GraphPrinter::new(&function.graph).with_unit(unit));
    }
}
