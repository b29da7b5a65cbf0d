//! Scope building and flow graph construction for members of a unit.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, debug_span, warn};

use flint_const::ConstantEvaluator;
use flint_flow::{build_flow_graph, FlowGraph};
use flint_ir::{CanonicalRef, DefaultTypeTranslator, NameResolver, NodeRef, SourceUnit, Symbol};
use flint_scope::{build_scopes, FunctionKind, ScopeResult, ScopeTarget};

use crate::{CompileError, CompilerOptions};

/// One function's scopes and graph.
#[derive(Debug)]
pub struct CompiledFunction {
    pub member: CanonicalRef,
    pub kind: FunctionKind,
    /// Function node of a closure; `None` for the member itself.
    pub closure: Option<NodeRef>,
    pub scopes: ScopeResult,
    pub graph: FlowGraph,
}

/// A member together with the closures it creates, outermost first.
#[derive(Debug)]
pub struct CompiledMember {
    pub member: CanonicalRef,
    pub name: String,
    pub functions: Vec<CompiledFunction>,
}

/// Member by qualified name, such as `app::C::m`.
pub fn resolve_member(unit: &SourceUnit, name: &str) -> Result<CanonicalRef, CompileError> {
    unit.member(name)
        .ok_or_else(|| CompileError::UnknownMember(name.to_owned()))
}

/// Scopes of one function, without building its graph.
pub fn analyze(
    unit: &SourceUnit,
    target: &ScopeTarget,
    options: &CompilerOptions,
) -> Result<ScopeResult, CompileError> {
    let mut evaluator = ConstantEvaluator::new(unit, &options.const_options());
    Ok(build_scopes(unit, target, &mut evaluator, &DefaultTypeTranslator)?)
}

/// Compile one function. The evaluator is shared by both passes, so
/// constants folded while building scopes are not folded twice.
pub fn compile_function(
    unit: &SourceUnit,
    target: &ScopeTarget,
    options: &CompilerOptions,
) -> Result<CompiledFunction, CompileError> {
    let mut evaluator = ConstantEvaluator::new(unit, &options.const_options());
    let scopes = build_scopes(unit, target, &mut evaluator, &DefaultTypeTranslator)?;
    let graph = build_flow_graph(
        unit,
        &scopes,
        &mut evaluator,
        &DefaultTypeTranslator,
        &options.flow_options(),
    )?;
    Ok(CompiledFunction {
        member: scopes.member,
        kind: scopes.kind,
        closure: target.function.filter(|_| scopes.kind == FunctionKind::Closure),
        scopes,
        graph,
    })
}

/// Compile `member` as `kind` (its declared kind when `None`), then every
/// closure it creates, transitively.
pub fn compile_member(
    unit: &SourceUnit,
    member: CanonicalRef,
    kind: Option<FunctionKind>,
    options: &CompilerOptions,
) -> Result<CompiledMember, CompileError> {
    let name = unit.program().qualified_name(member);
    let _span = debug_span!("compile", member = %name).entered();

    let target = match kind {
        Some(kind) => ScopeTarget::synthetic(unit, member, kind)?,
        None => ScopeTarget::member(unit, member)?,
    };
    let mut functions = vec![compile_function(unit, &target, options)?];
    let mut next = 0;
    while next < functions.len() {
        let closures: Vec<ScopeTarget> = {
            let scopes = &functions[next].scopes;
            scopes
                .closures()
                .filter_map(|closure| {
                    let context = scopes.context_scope_for(closure)?;
                    Some(ScopeTarget::closure(member, closure, Arc::new(context)))
                })
                .collect()
        };
        for target in &closures {
            functions.push(compile_function(unit, target, options)?);
        }
        next += 1;
    }
    debug!(functions = functions.len(), "compiled");
    Ok(CompiledMember {
        member,
        name,
        functions,
    })
}

/// Members with a body of their own: procedures, constructors and fields.
pub fn compilable_members(unit: &SourceUnit) -> Vec<CanonicalRef> {
    unit.program()
        .iter()
        .filter(|(_, symbol)| symbol.function().is_some() || symbol.as_field().is_some())
        .map(|(r, _)| r)
        .collect()
}

/// Compile every member of `unit` in parallel, in member order.
///
/// A member that fails does not stop the others.
pub fn compile_all(
    unit: &SourceUnit,
    options: &CompilerOptions,
) -> Result<Vec<Result<CompiledMember, CompileError>>, CompileError> {
    let members = compilable_members(unit);
    debug!(members = members.len(), jobs = ?options.jobs, "compiling unit");
    let run = || {
        members
            .par_iter()
            .map(|&member| {
                let result = compile_member(unit, member, None, options);
                if let Err(error) = &result {
                    warn!(member = %unit.program().qualified_name(member), %error, "member failed");
                }
                result
            })
            .collect::<Vec<_>>()
    };
    match options.jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|e| CompileError::ThreadPool(e.to_string()))?;
            Ok(pool.install(run))
        }
        None => Ok(run()),
    }
}

/// Field symbols have initializers but no function node.
pub(crate) fn field_initializer(symbol: &Symbol) -> Option<NodeRef> {
    symbol.as_field().and_then(|field| field.initializer)
}
