#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use flint_const::{ConstOptions, ConstantEvaluator};
use flint_ir::ast::{
    Catch, Expression, FunctionNode, Statement, SwitchCase, TypeNode, VarLabel,
    VariableDeclaration,
};
use flint_ir::program::{FieldFlags, ProcedureFlags, ProcedureKind};
use flint_ir::tag::{yield_flags, AsyncMarker};
use flint_ir::{
    CanonicalRef, DefaultTypeTranslator, SourceError, SourceErrorKind, SourceUnit, TokenPos,
    UnitBuilder,
};
use flint_scope::{build_scopes, FunctionKind, PerDepth, ScopeResult, ScopeTarget, Storage, VarId};

use super::*;

fn builder() -> (UnitBuilder, CanonicalRef) {
    let mut builder = UnitBuilder::new();
    let lib = builder.program_mut().add_library("app");
    (builder, lib)
}

fn compile_with(unit: &SourceUnit, target: &ScopeTarget, options: &FlowOptions) -> FlowGraph {
    let mut evaluator = ConstantEvaluator::new(unit, &ConstOptions::default());
    let scopes = build_scopes(unit, target, &mut evaluator, &DefaultTypeTranslator).unwrap();
    build_flow_graph(unit, &scopes, &mut evaluator, &DefaultTypeTranslator, options).unwrap()
}

fn compile_with_scopes(unit: &SourceUnit, member: CanonicalRef) -> (ScopeResult, FlowGraph) {
    let target = ScopeTarget::member(unit, member).unwrap();
    let mut evaluator = ConstantEvaluator::new(unit, &ConstOptions::default());
    let scopes = build_scopes(unit, &target, &mut evaluator, &DefaultTypeTranslator).unwrap();
    let options = FlowOptions::default();
    let graph =
        build_flow_graph(unit, &scopes, &mut evaluator, &DefaultTypeTranslator, &options).unwrap();
    (scopes, graph)
}

fn compile(unit: &SourceUnit, member: CanonicalRef) -> FlowGraph {
    let target = ScopeTarget::member(unit, member).unwrap();
    compile_with(unit, &target, &FlowOptions::default())
}

fn count(graph: &FlowGraph, pred: impl Fn(&Op) -> bool) -> usize {
    graph.placed_instrs().filter(|(_, _, instr)| pred(&instr.op)).count()
}

fn count_terminators(graph: &FlowGraph, pred: impl Fn(&Terminator) -> bool) -> usize {
    graph.blocks.iter().filter(|block| pred(&block.terminator)).count()
}

fn calls_to(graph: &FlowGraph, target: CanonicalRef) -> usize {
    count(graph, |op| matches!(op, Op::Call(call) if call.callee == Callee::Static(target)))
}

fn instance_calls(graph: &FlowGraph) -> Vec<String> {
    graph
        .placed_instrs()
        .filter_map(|(_, _, instr)| match &instr.op {
            Op::Call(call) => match &call.callee {
                Callee::Instance(name) => Some(name.to_string()),
                Callee::Static(_) | Callee::Closure => None,
            },
            _ => None,
        })
        .collect()
}

fn static_function(builder: &mut UnitBuilder, lib: CanonicalRef, name: &str, f: &FunctionNode) -> CanonicalRef {
    builder.add_static_function(lib, name, f).unwrap()
}

fn empty_function(builder: &mut UnitBuilder, lib: CanonicalRef, label: u32, name: &str) -> CanonicalRef {
    static_function(builder, lib, name, &FunctionNode::new(label, vec![], Statement::block(vec![])))
}

fn stores_to(graph: &FlowGraph, var: VarId) -> usize {
    count(graph, |op| matches!(op, Op::StoreLocal { var: v, .. } if *v == var))
}

/// The block calling `target`, in a graph that calls it once.
fn block_calling(graph: &FlowGraph, target: CanonicalRef) -> &Block {
    graph
        .placed_instrs()
        .find(|(_, _, instr)| {
            matches!(&instr.op, Op::Call(call) if call.callee == Callee::Static(target))
        })
        .map(|(block, _, _)| graph.block(block))
        .unwrap()
}

/// Blocks calling `target`, by how they end.
fn terminators_after_calls(graph: &FlowGraph, target: CanonicalRef) -> Vec<&Terminator> {
    graph
        .blocks
        .iter()
        .filter(|block| {
            graph.block_instrs(block.id).any(|(_, instr)| {
                matches!(&instr.op, Op::Call(call) if call.callee == Callee::Static(target))
            })
        })
        .map(|block| &block.terminator)
        .collect()
}

fn param(label: u32, name: &str) -> VariableDeclaration {
    VariableDeclaration::new(label, name)
}

#[test]
fn empty_function_returns_null() {
    let (mut builder, lib) = builder();
    let main = empty_function(&mut builder, lib, 0, "main");
    let unit = builder.finish();

    let graph = compile(&unit, main);
    let text = GraphPrinter::new(&graph).with_unit(&unit).to_string();
    assert_eq!(
        text,
        "B0 entry:\n  i0 = check_stack loop 0\n  goto B1\n\
         B1 target <- B0:\n  i1 = const null\n  return i1\n"
    );
}

#[test]
fn stack_checks_can_be_disabled() {
    let (mut builder, lib) = builder();
    let main = empty_function(&mut builder, lib, 0, "main");
    let unit = builder.finish();

    let options = FlowOptions {
        stack_checks: false,
        ..FlowOptions::default()
    };
    let graph = compile_with(&unit, &ScopeTarget::member(&unit, main).unwrap(), &options);
    assert_eq!(count(&graph, |op| matches!(op, Op::CheckStackOverflow { .. })), 0);
}

#[test]
fn returns_run_enclosing_finalizers() {
    // main() { try { return 1; } finally { log(); } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let body = Statement::TryFinally {
        body: Box::new(Statement::ret(Some(Expression::int(1)))),
        finalizer: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
    };
    let main = static_function(&mut builder, lib, "main", &FunctionNode::new(0, vec![], body));
    let unit = builder.finish();

    let graph = compile(&unit, main);
    // Once before the return, once in the catch-all handler.
    assert_eq!(calls_to(&graph, log), 2);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Rethrow { .. })), 1);
    assert_eq!(graph.handlers.len(), 1);
    let entry = graph.handlers[0].entry.unwrap();
    assert_eq!(graph.block(entry).kind, BlockKind::Catch { handler: 0 });
}

#[test]
fn finalizers_run_on_the_normal_path() {
    // main() { try { log(); } finally { log(); } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let call = || Statement::expr(Expression::static_call(log, vec![]));
    let body = Statement::TryFinally {
        body: Box::new(call()),
        finalizer: Box::new(call()),
    };
    let main = static_function(&mut builder, lib, "main", &FunctionNode::new(0, vec![], body));
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(calls_to(&graph, log), 3);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Return(_))), 1);
}

#[test]
fn breaks_run_enclosing_finalizers() {
    // main() { L: try { break L; } finally { log(); } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let body = Statement::Labeled(Box::new(Statement::TryFinally {
        body: Box::new(Statement::brk(0)),
        finalizer: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
    }));
    let main = static_function(&mut builder, lib, "main", &FunctionNode::new(0, vec![], body));
    let unit = builder.finish();

    let graph = compile(&unit, main);
    let exit = graph
        .blocks
        .iter()
        .find(|block| matches!(block.terminator, Terminator::Return(_)))
        .unwrap();
    // The break edge, then the catch-all handler.
    let ends = terminators_after_calls(&graph, log);
    assert_eq!(ends.len(), 2);
    assert!(ends.contains(&&Terminator::Goto(exit.id)), "{ends:?}");
    assert!(ends.iter().any(|t| matches!(t, Terminator::Rethrow { .. })), "{ends:?}");
    assert_eq!(exit.predecessors.len(), 1);
}

#[test]
fn continues_run_enclosing_finalizers() {
    // main(x) { while (x) { L: try { continue L; } finally { log(); } } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let inner = Statement::Labeled(Box::new(Statement::TryFinally {
        body: Box::new(Statement::brk(0)),
        finalizer: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
    }));
    let body = Statement::While {
        pos: TokenPos::NO_SOURCE,
        condition: Expression::get(VarLabel(0)),
        body: Box::new(inner),
    };
    let main = FunctionNode::new(0, vec![param(0, "x")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    let header = graph
        .placed_instrs()
        .find(|(_, _, instr)| matches!(instr.op, Op::CheckStackOverflow { loop_depth: 1 }))
        .map(|(block, _, _)| block)
        .unwrap();
    let ends = terminators_after_calls(&graph, log);
    assert_eq!(ends.len(), 2);
    let continued = ends
        .iter()
        .find_map(|t| match t {
            Terminator::Goto(next) => Some(*next),
            _ => None,
        })
        .unwrap();
    // The label's end leads back to the loop header.
    assert_eq!(graph.block(continued).terminator, Terminator::Goto(header));
    assert!(ends.iter().any(|t| matches!(t, Terminator::Rethrow { .. })), "{ends:?}");
}

#[test]
fn typed_catch_clauses_test_and_rethrow() {
    // main() { try { log(); } catch (int e) {} }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let int = TypeNode::SimpleInterface(builder.core_class("int"));
    let body = Statement::TryCatch {
        body: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
        flags: 0,
        catches: vec![Catch {
            pos: TokenPos::NO_SOURCE,
            guard: int,
            exception: Some(param(1, "e")),
            stack_trace: None,
            body: Statement::block(vec![]),
        }],
    };
    let main = static_function(&mut builder, lib, "main", &FunctionNode::new(0, vec![], body));
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(count(&graph, |op| matches!(op, Op::InstanceOf { .. })), 1);
    assert_eq!(count(&graph, |op| matches!(op, Op::LoadException)), 1);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Rethrow { .. })), 1);
}

#[test]
fn catch_all_clauses_never_rethrow() {
    // main() { try { log(); } catch (e) {} }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let body = Statement::TryCatch {
        body: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
        flags: 0,
        catches: vec![Catch {
            pos: TokenPos::NO_SOURCE,
            guard: TypeNode::Dynamic,
            exception: Some(param(1, "e")),
            stack_trace: None,
            body: Statement::block(vec![]),
        }],
    };
    let main = static_function(&mut builder, lib, "main", &FunctionNode::new(0, vec![], body));
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(count(&graph, |op| matches!(op, Op::InstanceOf { .. })), 0);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Rethrow { .. })), 0);
}

fn switch_on_x(cases: Vec<SwitchCase>) -> Statement {
    Statement::Switch {
        pos: TokenPos::new(5),
        scrutinee: Expression::get(VarLabel(0)),
        cases,
    }
}

fn case(value: i64, body: Statement) -> SwitchCase {
    SwitchCase {
        expressions: vec![(TokenPos::NO_SOURCE, Expression::int(value))],
        is_default: false,
        body,
    }
}

#[test]
fn breaking_cases_join_after_the_switch() {
    // main(x) { L: switch (x) { case 1: break L; case 2: break L; } }
    let (mut builder, lib) = builder();
    let body = Statement::Labeled(Box::new(switch_on_x(vec![
        case(1, Statement::brk(0)),
        case(2, Statement::brk(0)),
    ])));
    let main = FunctionNode::new(0, vec![param(0, "x")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(count(&graph, |op| matches!(op, Op::Equals { .. })), 2);
    let exit = graph
        .blocks
        .iter()
        .find(|block| matches!(block.terminator, Terminator::Return(_)))
        .unwrap();
    assert_eq!(exit.kind, BlockKind::Join);
    // Both case bodies, and the test chain when nothing matches.
    assert_eq!(exit.predecessors.len(), 3);
}

#[test]
fn cases_with_several_values_share_one_body() {
    // main(n) { L: switch (n) { case 1: case 2: body(); break L; default: other(); break L; } }
    let (mut builder, lib) = builder();
    let body_fn = empty_function(&mut builder, lib, 8, "body");
    let other_fn = empty_function(&mut builder, lib, 9, "other");
    let arm = |target: CanonicalRef| {
        Statement::block(vec![
            Statement::expr(Expression::static_call(target, vec![])),
            Statement::brk(0),
        ])
    };
    let shared = SwitchCase {
        expressions: vec![
            (TokenPos::NO_SOURCE, Expression::int(1)),
            (TokenPos::NO_SOURCE, Expression::int(2)),
        ],
        is_default: false,
        body: arm(body_fn),
    };
    let default = SwitchCase {
        expressions: vec![],
        is_default: true,
        body: arm(other_fn),
    };
    let body = Statement::Labeled(Box::new(switch_on_x(vec![shared, default])));
    let main = FunctionNode::new(0, vec![param(0, "n")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(calls_to(&graph, body_fn), 1);
    assert_eq!(calls_to(&graph, other_fn), 1);
    assert_eq!(block_calling(&graph, body_fn).predecessors.len(), 2);
    assert_eq!(block_calling(&graph, other_fn).predecessors.len(), 1);
    assert_eq!(count(&graph, |op| matches!(op, Op::Equals { .. })), 2);
}

#[test]
fn falling_through_a_case_throws() {
    // main(x) { switch (x) { case 1: {} case 2: {} } }
    let (mut builder, lib) = builder();
    let body = switch_on_x(vec![
        case(1, Statement::block(vec![])),
        case(2, Statement::block(vec![])),
    ]);
    let main = FunctionNode::new(0, vec![param(0, "x")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    let fall_through = |op: &Op| {
        matches!(
            op,
            Op::MakeError(SourceError {
                kind: SourceErrorKind::SwitchFallThrough,
                pos,
            }) if *pos == TokenPos::new(5)
        )
    };
    assert_eq!(count(&graph, fall_through), 1);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Throw(_))), 1);
}

#[test]
fn switches_without_cases_fall_through() {
    let (mut builder, lib) = builder();
    let main = FunctionNode::new(0, vec![param(0, "x")], switch_on_x(vec![]));
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Branch { .. })), 0);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Return(_))), 1);
}

#[test]
fn continuing_a_switch_jumps_into_the_case_body() {
    // main(x) { switch (x) { case 1: continue switch case 2; case 2: log(); } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let body = switch_on_x(vec![
        case(
            1,
            Statement::block(vec![Statement::ContinueSwitch {
                pos: TokenPos::NO_SOURCE,
                case: 1,
            }]),
        ),
        case(2, Statement::block(vec![Statement::expr(Expression::static_call(log, vec![]))])),
    ]);
    let main = FunctionNode::new(0, vec![param(0, "x")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    let target = block_calling(&graph, log);
    // Its own test and the first case body.
    assert_eq!(target.predecessors.len(), 2);
    let jumps = count_terminators(&graph, |t| *t == Terminator::Goto(target.id));
    assert_eq!(jumps, 1);
    assert_eq!(count(&graph, |op| matches!(op, Op::MakeError(_))), 0);
}

#[test]
fn generators_dispatch_to_each_continuation() {
    // sync* gen() { yield 1; yield 2; }
    let (mut builder, lib) = builder();
    let yield_int = |value: i64| Statement::Yield {
        pos: TokenPos::NO_SOURCE,
        flags: 0,
        value: Expression::int(value),
    };
    let mut generator = FunctionNode::new(0, vec![], Statement::block(vec![yield_int(1), yield_int(2)]));
    generator.async_marker = AsyncMarker::SyncStar;
    generator.dart_async_marker = AsyncMarker::SyncStar;
    let generator = static_function(&mut builder, lib, "gen", &generator);
    let unit = builder.finish();

    let graph = compile(&unit, generator);
    assert_eq!(graph.continuations.len(), 2);
    assert_ne!(graph.continuations[0].entry, graph.continuations[1].entry);
    // One context restore per resumption.
    assert_eq!(count(&graph, |op| matches!(op, Op::SetContext(_))), 2);
    // Each yield returns, and so does the end of the body.
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Return(_))), 3);
    assert!(matches!(graph.block(graph.entry()).terminator, Terminator::Branch { .. }));
}

#[test]
fn loop_contexts_are_cloned_per_iteration() {
    // main() { for (var i = 0; i < 3; i = i + 1) { var f = () => i; } }
    let (mut builder, lib) = builder();
    let get_i = || Expression::get(VarLabel(1));
    let closure = Expression::FunctionExpression {
        pos: TokenPos::NO_SOURCE,
        function: Box::new(FunctionNode::new(1, vec![], Statement::ret(Some(get_i())))),
    };
    let body = Statement::For {
        pos: TokenPos::NO_SOURCE,
        variables: vec![param(1, "i").with_initializer(Expression::int(0))],
        condition: Some(Expression::method(get_i(), "<", vec![Expression::int(3)])),
        updates: vec![Expression::set(
            VarLabel(1),
            Expression::method(get_i(), "+", vec![Expression::int(1)]),
        )],
        body: Box::new(Statement::block(vec![Statement::VariableDeclaration(
            param(2, "f").with_initializer(closure),
        )])),
    };
    let main = static_function(&mut builder, lib, "main", &FunctionNode::new(0, vec![], body));
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(count(&graph, |op| matches!(op, Op::CloneContext)), 1);
    assert_eq!(count(&graph, |op| matches!(op, Op::EnterContext { level: 1, .. })), 1);
    assert_eq!(count(&graph, |op| matches!(op, Op::AllocateClosure { .. })), 1);
    assert_eq!(instance_calls(&graph), vec!["<", "+"]);
}

#[test]
fn for_in_loops_use_the_iterator_protocol() {
    // main(xs) { for (var x in xs) {} }
    let (mut builder, lib) = builder();
    let body = Statement::ForIn {
        pos: TokenPos::NO_SOURCE,
        body_pos: TokenPos::NO_SOURCE,
        variable: param(1, "x"),
        iterable: Expression::get(VarLabel(0)),
        body: Box::new(Statement::block(vec![])),
    };
    let main = FunctionNode::new(0, vec![param(0, "xs")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();

    let graph = compile(&unit, main);
    assert_eq!(instance_calls(&graph), vec!["get:iterator", "moveNext", "get:current"]);
    // Entry and loop header.
    assert_eq!(count(&graph, |op| matches!(op, Op::CheckStackOverflow { .. })), 2);
}

#[test]
fn asserts_follow_the_options() {
    // main(x) { assert(x); }
    let (mut builder, lib) = builder();
    let body = Statement::Assert {
        condition: Expression::get(VarLabel(0)),
        start: TokenPos::new(1),
        end: TokenPos::new(2),
        message: None,
    };
    let main = FunctionNode::new(0, vec![param(0, "x")], body);
    let main = static_function(&mut builder, lib, "main", &main);
    let unit = builder.finish();
    let target = ScopeTarget::member(&unit, main).unwrap();

    let graph = compile_with(&unit, &target, &FlowOptions::default());
    assert_eq!(count(&graph, |op| matches!(op, Op::AssertionError { .. })), 0);

    let options = FlowOptions {
        enable_asserts: true,
        ..FlowOptions::default()
    };
    let graph = compile_with(&unit, &target, &options);
    assert_eq!(count(&graph, |op| matches!(op, Op::AssertionError { .. })), 1);
    assert_eq!(count_terminators(&graph, |t| matches!(t, Terminator::Throw(_))), 1);
}

fn class_with_method(builder: &mut UnitBuilder, lib: CanonicalRef) -> (CanonicalRef, CanonicalRef) {
    let object = builder.core_class("Object");
    let int = TypeNode::SimpleInterface(builder.core_class("int"));
    let class = builder.program_mut().add_class(lib, "C", object);
    let function = FunctionNode::new(0, vec![param(0, "p").with_type(int)], Statement::block(vec![]));
    let method = builder
        .add_procedure(class, "m", ProcedureKind::Method, ProcedureFlags::empty(), &function)
        .unwrap();
    (class, method)
}

#[test]
fn checked_parameters_are_asserted_on_entry() {
    let (mut builder, lib) = builder();
    let (_, method) = class_with_method(&mut builder, lib);
    let unit = builder.finish();

    let graph = compile(&unit, method);
    let names: Vec<String> = graph
        .placed_instrs()
        .filter_map(|(_, _, instr)| match &instr.op {
            Op::AssertAssignable { name, .. } => Some(name.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["p"]);
}

#[test]
fn no_such_method_forwarders_build_an_invocation() {
    let (mut builder, lib) = builder();
    let (_, method) = class_with_method(&mut builder, lib);
    let unit = builder.finish();

    let target = ScopeTarget::synthetic(&unit, method, FunctionKind::NoSuchMethodForwarder).unwrap();
    let graph = compile_with(&unit, &target, &FlowOptions::default());
    let mirror = graph
        .placed_instrs()
        .find_map(|(_, _, instr)| match &instr.op {
            Op::InvocationMirror {
                name,
                arguments,
                names,
            } => Some((name.to_string(), arguments.len(), names.len())),
            _ => None,
        })
        .unwrap();
    assert_eq!(mirror, ("m".to_owned(), 1, 0));
    assert_eq!(instance_calls(&graph), vec!["noSuchMethod"]);
}

#[test]
fn dynamic_forwarders_call_the_target() {
    let (mut builder, lib) = builder();
    let (_, method) = class_with_method(&mut builder, lib);
    let unit = builder.finish();

    let target =
        ScopeTarget::synthetic(&unit, method, FunctionKind::DynamicInvocationForwarder).unwrap();
    let graph = compile_with(&unit, &target, &FlowOptions::default());
    let args = graph
        .placed_instrs()
        .find_map(|(_, _, instr)| match &instr.op {
            Op::Call(call) if call.callee == Callee::Static(method) => Some(call.args.len()),
            _ => None,
        })
        .unwrap();
    // Receiver and `p`.
    assert_eq!(args, 2);
}

#[test]
fn field_accessors_load_and_store_the_field() {
    let (mut builder, lib) = builder();
    let object = builder.core_class("Object");
    let int = TypeNode::SimpleInterface(builder.core_class("int"));
    let class = builder.program_mut().add_class(lib, "C", object);
    let field = builder
        .add_field(class, "count", FieldFlags::empty(), &int, None)
        .unwrap();
    let unit = builder.finish();

    let getter = compile(&unit, field);
    let loads = count(&getter, |op| matches!(op, Op::LoadField { field: f, .. } if *f == field));
    assert_eq!(loads, 1);

    let target = ScopeTarget::synthetic(&unit, field, FunctionKind::ImplicitSetter).unwrap();
    let setter = compile_with(&unit, &target, &FlowOptions::default());
    let stores = count(&setter, |op| matches!(op, Op::StoreField { field: f, .. } if *f == field));
    assert_eq!(stores, 1);
    assert_eq!(count(&setter, |op| matches!(op, Op::AssertAssignable { .. })), 1);
}

fn generator(builder: &mut UnitBuilder, lib: CanonicalRef, body: Statement) -> CanonicalRef {
    let mut generator = FunctionNode::new(0, vec![], body);
    generator.async_marker = AsyncMarker::SyncStar;
    generator.dart_async_marker = AsyncMarker::SyncStar;
    static_function(builder, lib, "gen", &generator)
}

fn yield_int(flags: u8, value: i64) -> Statement {
    Statement::Yield {
        pos: TokenPos::NO_SOURCE,
        flags,
        value: Expression::int(value),
    }
}

/// The block resumption 1 enters before reaching its continuation.
fn first_resume_arm(graph: &FlowGraph) -> BlockId {
    match graph.block(graph.entry()).terminator {
        Terminator::Branch { then_block, .. } => then_block,
        ref other => panic!("entry ends in {other:?}"),
    }
}

#[test]
fn resuming_inside_a_try_restores_its_handler_context() {
    // sync* gen() { try { yield 1; } catch (e) {} }
    let (mut builder, lib) = builder();
    let body = Statement::TryCatch {
        body: Box::new(yield_int(0, 1)),
        flags: 0,
        catches: vec![Catch {
            pos: TokenPos::NO_SOURCE,
            guard: TypeNode::Dynamic,
            exception: Some(param(1, "e")),
            stack_trace: None,
            body: Statement::block(vec![]),
        }],
    };
    let generator = generator(&mut builder, lib, body);
    let unit = builder.finish();

    let (scopes, graph) = compile_with_scopes(&unit, generator);
    let saved = scopes.synthetic.at_depth(PerDepth::SavedTryContext, 1).unwrap();
    assert!(matches!(scopes.variable(saved).storage, Storage::Stack { .. }));
    assert_eq!(graph.continuations[0].try_index, Some(0));

    // Once entering the try, once on resumption.
    assert_eq!(stores_to(&graph, saved), 2);
    let arm = first_resume_arm(&graph);
    let restored: Vec<&Op> = graph.block_instrs(arm).map(|(_, instr)| &instr.op).collect();
    assert!(restored.iter().any(|op| matches!(op, Op::SetContext(_))), "{restored:?}");
    assert!(
        restored
            .iter()
            .any(|op| matches!(op, Op::StoreLocal { var, .. } if *var == saved)),
        "{restored:?}"
    );
}

#[test]
fn resuming_inside_a_try_finally_restores_its_handler_context() {
    // sync* gen() { try { yield 1; } finally { log(); } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let body = Statement::TryFinally {
        body: Box::new(yield_int(0, 1)),
        finalizer: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
    };
    let generator = generator(&mut builder, lib, body);
    let unit = builder.finish();

    let (scopes, graph) = compile_with_scopes(&unit, generator);
    let saved = scopes.synthetic.at_depth(PerDepth::SavedTryContext, 1).unwrap();
    assert_eq!(stores_to(&graph, saved), 2);
    let arm = first_resume_arm(&graph);
    let stores = graph
        .block_instrs(arm)
        .filter(|(_, instr)| matches!(instr.op, Op::StoreLocal { var, .. } if var == saved))
        .count();
    assert_eq!(stores, 1);
    // The normal path after resumption and the catch-all handler.
    assert_eq!(calls_to(&graph, log), 2);
}

#[test]
fn resuming_inside_a_catch_restores_the_rethrown_exception() {
    // sync* gen() { try { log(); } catch (e) { yield 1; rethrow; } }
    let (mut builder, lib) = builder();
    let log = empty_function(&mut builder, lib, 9, "log");
    let clause = Statement::block(vec![
        yield_int(yield_flags::NATIVE, 1),
        Statement::expr(Expression::Rethrow {
            pos: TokenPos::NO_SOURCE,
        }),
    ]);
    let body = Statement::TryCatch {
        body: Box::new(Statement::expr(Expression::static_call(log, vec![]))),
        flags: 0,
        catches: vec![Catch {
            pos: TokenPos::NO_SOURCE,
            guard: TypeNode::Dynamic,
            exception: Some(param(1, "e")),
            stack_trace: None,
            body: clause,
        }],
    };
    let generator = generator(&mut builder, lib, body);
    let unit = builder.finish();

    let (scopes, graph) = compile_with_scopes(&unit, generator);
    let exception = scopes.synthetic.at_depth(PerDepth::Exception, 1).unwrap();
    let raw = scopes.synthetic.at_depth(PerDepth::RawException, 1).unwrap();
    assert!(matches!(scopes.variable(exception).storage, Storage::Context { .. }));
    assert!(matches!(scopes.variable(raw).storage, Storage::Stack { .. }));
    // Once in the handler, once on resumption from the alias.
    assert_eq!(stores_to(&graph, raw), 2);
    assert_eq!(graph.continuations[0].try_index, None);
}
