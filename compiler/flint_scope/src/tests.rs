#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use std::sync::Arc;

use pretty_assertions::assert_eq;

use flint_const::{ConstOptions, ConstantEvaluator};
use flint_ir::ast::{
    Catch, Expression, FnLabel, FunctionNode, Statement, SwitchCase, TypeNode, VarLabel,
    VariableDeclaration,
};
use flint_ir::program::{ProcedureFlags, ProcedureKind};
use flint_ir::tag::{yield_flags, AsyncMarker};
use flint_ir::{
    CanonicalRef, ConstValue, DefaultTypeTranslator, NodeRef, ProcedureAttributes, ResolvedType,
    SourceUnit, TokenPos, UnitBuilder, VariableFlags,
};

use super::*;

fn builder() -> (UnitBuilder, CanonicalRef) {
    let mut builder = UnitBuilder::new();
    let lib = builder.program_mut().add_library("app");
    (builder, lib)
}

fn build(unit: &SourceUnit, target: &ScopeTarget) -> Result<ScopeResult, ScopeError> {
    let mut evaluator = ConstantEvaluator::new(unit, &ConstOptions::default());
    build_scopes(unit, target, &mut evaluator, &DefaultTypeTranslator)
}

fn build_member(unit: &SourceUnit, member: CanonicalRef) -> ScopeResult {
    build(unit, &ScopeTarget::member(unit, member).unwrap()).unwrap()
}

fn var(label: u32, name: &str) -> Statement {
    Statement::VariableDeclaration(VariableDeclaration::new(label, name))
}

fn var_init(label: u32, name: &str, value: Expression) -> Statement {
    Statement::VariableDeclaration(VariableDeclaration::new(label, name).with_initializer(value))
}

fn closure(label: u32, body: Statement) -> Expression {
    Expression::FunctionExpression {
        pos: TokenPos::NO_SOURCE,
        function: Box::new(FunctionNode::new(label, vec![], body)),
    }
}

fn decl(builder: &UnitBuilder, label: u32) -> NodeRef {
    builder.encoder().var_offset(VarLabel(label)).unwrap()
}

fn function(builder: &UnitBuilder, label: u32) -> NodeRef {
    builder.encoder().function_offset(FnLabel(label)).unwrap()
}

fn storage(result: &ScopeResult, decl: NodeRef) -> Storage {
    result.variable(result.lookup(decl).unwrap()).storage
}

#[test]
fn captured_variables_move_to_the_context() {
    // main(a) { var x = 1; var y = 2; var f = () => x; return y; }
    let (mut builder, lib) = builder();
    let body = Statement::block(vec![
        var_init(1, "x", Expression::int(1)),
        var_init(2, "y", Expression::int(2)),
        var_init(3, "f", closure(1, Statement::ret(Some(Expression::get(VarLabel(1)))))),
        Statement::ret(Some(Expression::get(VarLabel(2)))),
    ]);
    let main = FunctionNode::new(0, vec![VariableDeclaration::new(0, "a")], body);
    let main = builder.add_static_function(lib, "main", &main).unwrap();
    let (a, x, y, f) = (decl(&builder, 0), decl(&builder, 1), decl(&builder, 2), decl(&builder, 3));
    let lambda = function(&builder, 1);
    let unit = builder.finish();

    let result = build_member(&unit, main);
    assert_eq!(storage(&result, a), Storage::Parameter { index: 0 });
    assert_eq!(storage(&result, x), Storage::Context { level: 1, index: 0 });
    assert_eq!(storage(&result, y), Storage::Stack { index: 0 });
    assert_eq!(storage(&result, f), Storage::Stack { index: 1 });
    assert_eq!(result.num_stack_locals, 2);

    let block = result.scope(result.variable(result.lookup(x).unwrap()).scope);
    assert_eq!(block.kind, ScopeKind::Block);
    assert!(block.requires_context);
    assert_eq!((block.context_level, block.context_size), (Some(1), 1));
    assert!(!result.scope(result.tree.root()).requires_context);

    assert_eq!(result.closures().collect::<Vec<_>>(), vec![lambda]);
    assert_eq!(
        result.context_scope_for(lambda).unwrap(),
        ContextScope {
            variables: vec![ContextVariable {
                name: Arc::from("x"),
                decl: Some(x),
                ty: ResolvedType::Dynamic,
                level: 1,
                index: 0,
                is_final: false,
                const_value: None,
            }],
            context_level: 1,
        }
    );
}

#[test]
fn capture_marks_every_scope_between_declaration_and_use() {
    // main() { var x; { var g = () { return () => x; }; } }
    let (mut builder, lib) = builder();
    let inner = closure(2, Statement::ret(Some(Expression::get(VarLabel(1)))));
    let body = Statement::block(vec![
        var(1, "x"),
        Statement::block(vec![var_init(2, "g", closure(1, Statement::ret(Some(inner))))]),
    ]);
    let main = builder
        .add_static_function(lib, "main", &FunctionNode::new(0, vec![], body))
        .unwrap();
    let x = decl(&builder, 1);
    let (outer_fn, inner_fn) = (function(&builder, 1), function(&builder, 2));
    let unit = builder.finish();

    let result = build_member(&unit, main);
    let x_var = result.lookup(x).unwrap();
    assert!(result.variable(x_var).captured);

    let inner_scope = result.scope_at(inner_fn).unwrap();
    let chain: Vec<ScopeId> = result.tree.ancestors(inner_scope).collect();
    // inner closure, outer closure, inner block, declaring block, function root
    assert_eq!(chain.len(), 5);
    for id in &chain[..4] {
        assert!(result.scope(*id).requires_context, "{id} should require a context");
    }
    assert!(!result.scope(chain[4]).requires_context);
    assert_eq!(result.scope(chain[0]).aliases, vec![x_var]);
    assert_eq!(result.scope(chain[1]).aliases, vec![x_var]);
    assert_eq!(result.scope(chain[0]).function_level, 2);

    assert_eq!(result.closures().collect::<Vec<_>>(), vec![outer_fn]);
    assert!(result.context_scope_for(inner_fn).is_none());
}

#[test]
fn sibling_blocks_share_stack_slots() {
    // main() { var c; { var a; } { var b; var d; } }
    let (mut builder, lib) = builder();
    let body = Statement::block(vec![
        var(1, "c"),
        Statement::block(vec![var(2, "a")]),
        Statement::block(vec![var(3, "b"), var(4, "d")]),
    ]);
    let main = builder
        .add_static_function(lib, "main", &FunctionNode::new(0, vec![], body))
        .unwrap();
    let offsets: Vec<NodeRef> = (1..=4).map(|l| decl(&builder, l)).collect();
    let unit = builder.finish();

    let result = build_member(&unit, main);
    let slots: Vec<Storage> = offsets.iter().map(|d| storage(&result, *d)).collect();
    assert_eq!(
        slots,
        vec![
            Storage::Stack { index: 0 },
            Storage::Stack { index: 1 },
            Storage::Stack { index: 1 },
            Storage::Stack { index: 2 },
        ]
    );
    assert_eq!(result.num_stack_locals, 3);
    assert_eq!(result.tree.allocating().count(), 0);
}

#[test]
fn synthetic_variables_follow_nesting_depth() {
    // main(xs) {
    //   for (a in xs) { for (b in xs) {} }
    //   try {} catch (e) { try {} catch (f) {} }
    //   switch (1) { case 1: break; }
    // }
    let (mut builder, lib) = builder();
    let for_in = |label: u32, name: &str, body: Statement| Statement::ForIn {
        pos: TokenPos::NO_SOURCE,
        body_pos: TokenPos::NO_SOURCE,
        variable: VariableDeclaration::new(label, name),
        iterable: Expression::get(VarLabel(0)),
        body: Box::new(body),
    };
    let try_catch = |label: u32, name: &str, handler: Statement| Statement::TryCatch {
        body: Box::new(Statement::block(vec![])),
        flags: 0,
        catches: vec![Catch {
            pos: TokenPos::NO_SOURCE,
            guard: TypeNode::Dynamic,
            exception: Some(VariableDeclaration::new(label, name)),
            stack_trace: None,
            body: handler,
        }],
    };
    let switch = Statement::Labeled(Box::new(Statement::Switch {
        pos: TokenPos::NO_SOURCE,
        scrutinee: Expression::int(1),
        cases: vec![SwitchCase {
            expressions: vec![(TokenPos::NO_SOURCE, Expression::int(1))],
            is_default: false,
            body: Statement::brk(0),
        }],
    }));
    let body = Statement::block(vec![
        for_in(1, "a", for_in(2, "b", Statement::block(vec![]))),
        try_catch(3, "e", try_catch(4, "f", Statement::block(vec![]))),
        switch,
    ]);
    let main = FunctionNode::new(0, vec![VariableDeclaration::new(0, "xs")], body);
    let main = builder.add_static_function(lib, "main", &main).unwrap();
    let unit = builder.finish();

    let result = build_member(&unit, main);
    let synthetic = &result.synthetic;
    let name = |kind: PerDepth, depth: u32| {
        result.variable(synthetic.at_depth(kind, depth).unwrap()).name.to_string()
    };
    assert_eq!(synthetic.depth_count(PerDepth::Iterator), 2);
    assert_eq!(name(PerDepth::Iterator, 1), ":iterator0");
    assert_eq!(name(PerDepth::Iterator, 2), ":iterator1");
    assert_eq!(synthetic.depth_count(PerDepth::Exception), 2);
    assert_eq!(synthetic.depth_count(PerDepth::RawStackTrace), 2);
    assert_eq!(name(PerDepth::RawException, 2), ":raw_exception1");
    assert_eq!(synthetic.depth_count(PerDepth::SavedTryContext), 1);
    assert!(synthetic.at_depth(PerDepth::Iterator, 3).is_none());
    assert!(synthetic.at_depth(PerDepth::Iterator, 0).is_none());

    let raw = result.variable(synthetic.at_depth(PerDepth::RawException, 1).unwrap());
    assert!(raw.forced_stack);
    assert!(!result.variable(synthetic.at_depth(PerDepth::Exception, 1).unwrap()).forced_stack);

    let switch = result.variable(synthetic.switch_variable.unwrap());
    assert_eq!(&*switch.name, names::SWITCH);
    assert_eq!(switch.scope, result.tree.root());
    assert!(synthetic.finally_return.is_none());
    assert!(synthetic.await_jump.is_none());
}

#[test]
fn returns_under_finally_get_a_return_slot() {
    // main() { try { return 1; } finally {} }
    let (mut builder, lib) = builder();
    let body = Statement::TryFinally {
        body: Box::new(Statement::ret(Some(Expression::int(1)))),
        finalizer: Box::new(Statement::block(vec![])),
    };
    let main = builder
        .add_static_function(lib, "main", &FunctionNode::new(0, vec![], body))
        .unwrap();
    let unit = builder.finish();

    let result = build_member(&unit, main);
    let ret = result.variable(result.synthetic.finally_return.unwrap());
    assert_eq!(&*ret.name, names::FINALLY_RETURN);
    assert_eq!(result.synthetic.depth_count(PerDepth::Exception), 1);
    assert_eq!(result.synthetic.depth_count(PerDepth::SavedTryContext), 1);
}

#[test]
fn synthetic_variables_of_closures_are_left_to_their_compilation() {
    // main(xs) { var f = () { for (a in xs) {} }; }
    let (mut builder, lib) = builder();
    let loop_ = Statement::ForIn {
        pos: TokenPos::NO_SOURCE,
        body_pos: TokenPos::NO_SOURCE,
        variable: VariableDeclaration::new(2, "a"),
        iterable: Expression::get(VarLabel(0)),
        body: Box::new(Statement::block(vec![])),
    };
    let body = Statement::block(vec![var_init(1, "f", closure(1, loop_))]);
    let main = FunctionNode::new(0, vec![VariableDeclaration::new(0, "xs")], body);
    let main = builder.add_static_function(lib, "main", &main).unwrap();
    let xs = decl(&builder, 0);
    let unit = builder.finish();

    let result = build_member(&unit, main);
    assert_eq!(result.synthetic.depth_count(PerDepth::Iterator), 0);
    // A captured parameter keeps its calling-convention index for the prologue copy.
    let param = result.variable(result.lookup(xs).unwrap());
    assert_eq!(param.param_index, Some(0));
    assert_eq!(param.storage, Storage::Context { level: 1, index: 0 });
}

#[test]
fn native_yields_promote_live_locals() {
    // sync* gen() { var a; yield a; var b; }
    let (mut builder, lib) = builder();
    let body = Statement::block(vec![
        var(1, "a"),
        Statement::Yield {
            pos: TokenPos::NO_SOURCE,
            flags: yield_flags::NATIVE,
            value: Expression::get(VarLabel(1)),
        },
        var(2, "b"),
    ]);
    let mut generator = FunctionNode::new(0, vec![], body);
    generator.async_marker = AsyncMarker::SyncStar;
    generator.dart_async_marker = AsyncMarker::SyncStar;
    let generator = builder.add_static_function(lib, "gen", &generator).unwrap();
    let (a, b) = (decl(&builder, 1), decl(&builder, 2));
    let unit = builder.finish();

    let result = build_member(&unit, generator);
    let jump = result.variable(result.synthetic.await_jump.unwrap());
    let saved = result.variable(result.synthetic.await_context.unwrap());
    assert_eq!(jump.storage, Storage::Context { level: 1, index: 0 });
    assert_eq!(saved.storage, Storage::Context { level: 1, index: 1 });
    assert_eq!(storage(&result, a), Storage::Context { level: 2, index: 0 });
    assert_eq!(storage(&result, b), Storage::Stack { index: 0 });
    assert_eq!(result.tree.allocating().count(), 2);
}

#[test]
fn closures_compile_against_the_parent_context() {
    // main() { var x = 1; var f = () => x + 1; }
    let (mut builder, lib) = builder();
    let sum = Expression::method(Expression::get(VarLabel(1)), "+", vec![Expression::int(1)]);
    let body = Statement::block(vec![
        var_init(1, "x", Expression::int(1)),
        var_init(2, "f", closure(1, Statement::ret(Some(sum)))),
    ]);
    let main = builder
        .add_static_function(lib, "main", &FunctionNode::new(0, vec![], body))
        .unwrap();
    let x = decl(&builder, 1);
    let lambda = function(&builder, 1);
    let unit = builder.finish();

    let parent = build_member(&unit, main);
    let context = Arc::new(parent.context_scope_for(lambda).unwrap());
    let result = build(&unit, &ScopeTarget::closure(main, lambda, context)).unwrap();

    assert_eq!(result.kind, FunctionKind::Closure);
    assert_eq!(result.policy, TypeCheckPolicy::All);
    assert_eq!(result.outer_context_level, 1);
    let x_var = result.variable(result.lookup(x).unwrap());
    assert_eq!(x_var.kind, VariableKind::Outer);
    assert_eq!(x_var.storage, Storage::Context { level: 1, index: 0 });

    let closure_param = result.variable(result.synthetic.closure.unwrap());
    assert_eq!(closure_param.storage, Storage::Parameter { index: 0 });
    assert_eq!(result.parameters.len(), 1);
    assert_eq!(result.num_stack_locals, 0);
    let names: Vec<String> = result.var_descriptors().iter().map(|d| d.name.to_string()).collect();
    assert_eq!(names, vec![":closure"]);
}

#[test]
fn closures_need_the_context_they_read_from() {
    let (mut builder, lib) = builder();
    let body = Statement::block(vec![
        var(1, "x"),
        var_init(2, "f", closure(1, Statement::ret(Some(Expression::get(VarLabel(1)))))),
    ]);
    let main = builder
        .add_static_function(lib, "main", &FunctionNode::new(0, vec![], body))
        .unwrap();
    let x = decl(&builder, 1);
    let lambda = function(&builder, 1);
    let unit = builder.finish();

    let target = ScopeTarget {
        member: main,
        kind: FunctionKind::Closure,
        function: Some(lambda),
        outer: None,
    };
    assert_eq!(build(&unit, &target).unwrap_err(), ScopeError::UnknownVariable(x));
}

#[test]
fn receivers_are_captured_by_closures() {
    // class C { m() { var f = () => this; } }
    let (mut builder, lib) = builder();
    let object = builder.core_class("Object");
    let class = builder.program_mut().add_class(lib, "C", object);
    let body = Statement::block(vec![var_init(
        1,
        "f",
        closure(1, Statement::ret(Some(Expression::This))),
    )]);
    let method = builder
        .add_procedure(
            class,
            "m",
            ProcedureKind::Method,
            ProcedureFlags::empty(),
            &FunctionNode::new(0, vec![], body),
        )
        .unwrap();
    let lambda = function(&builder, 1);
    let unit = builder.finish();

    let result = build_member(&unit, method);
    let this = result.variable(result.synthetic.this.unwrap());
    assert_eq!(this.ty, ResolvedType::interface(class));
    assert_eq!(this.param_index, Some(0));
    assert_eq!(this.storage, Storage::Context { level: 1, index: 0 });

    let context = Arc::new(result.context_scope_for(lambda).unwrap());
    assert_eq!(context.find_by_name(names::THIS).unwrap().index, 0);
    let inner = build(&unit, &ScopeTarget::closure(method, lambda, context)).unwrap();
    let this = inner.variable(inner.synthetic.this.unwrap());
    assert_eq!(this.kind, VariableKind::Outer);
    assert_eq!(this.storage, Storage::Context { level: 1, index: 0 });
}

#[test]
fn type_check_policy_follows_call_site_attributes() {
    // class C { m(int p, covariant int q, r) {} }
    let (mut builder, lib) = builder();
    let object = builder.core_class("Object");
    let int = TypeNode::SimpleInterface(builder.core_class("int"));
    let class = builder.program_mut().add_class(lib, "C", object);
    let params = |base: u32| {
        vec![
            VariableDeclaration::new(base, "p").with_type(int.clone()),
            VariableDeclaration::new(base + 1, "q")
                .with_type(int.clone())
                .with_flags(VariableFlags::COVARIANT),
            VariableDeclaration::new(base + 2, "r"),
        ]
    };
    let mut method = |name: &str, base: u32| {
        let function = FunctionNode::new(base, params(base), Statement::block(vec![]));
        builder
            .add_procedure(class, name, ProcedureKind::Method, ProcedureFlags::empty(), &function)
            .unwrap()
    };
    let statically_called = method("m", 0);
    let dynamically_called = method("n", 10);
    builder
        .metadata_mut()
        .set_procedure_attributes(statically_called, ProcedureAttributes::empty());
    let unit = builder.finish();

    let checks = |result: &ScopeResult| -> Vec<(String, bool)> {
        result
            .parameters
            .iter()
            .map(|p| {
                let v = result.variable(*p);
                (v.name.to_string(), v.needs_type_check)
            })
            .collect()
    };
    let expect = |p: bool, q: bool| {
        vec![
            ("this".to_owned(), false),
            ("p".to_owned(), p),
            ("q".to_owned(), q),
            ("r".to_owned(), false),
        ]
    };

    let result = build_member(&unit, statically_called);
    assert_eq!(result.policy, TypeCheckPolicy::OnlyCovariant);
    assert_eq!(checks(&result), expect(false, true));

    let result = build_member(&unit, dynamically_called);
    assert_eq!(result.policy, TypeCheckPolicy::All);
    assert_eq!(checks(&result), expect(true, true));

    let target =
        ScopeTarget::synthetic(&unit, statically_called, FunctionKind::NoSuchMethodForwarder)
            .unwrap();
    let result = build(&unit, &target).unwrap();
    assert_eq!(checks(&result), expect(false, false));
    assert_eq!(result.tree.len(), 1);
}

#[test]
fn eager_constants_are_evaluated_while_building() {
    // main([int a = 1 + 2]) { const k = 4 * 2; }
    let (mut builder, lib) = builder();
    let sum = Expression::method(Expression::int(1), "+", vec![Expression::int(2)]);
    let product = Expression::method(Expression::int(4), "*", vec![Expression::int(2)]);
    let k = VariableDeclaration::new(1, "k")
        .with_flags(VariableFlags::CONST)
        .with_initializer(product);
    let mut main = FunctionNode::new(
        0,
        vec![VariableDeclaration::new(0, "a").with_initializer(sum)],
        Statement::block(vec![Statement::VariableDeclaration(k)]),
    );
    main.required_parameter_count = 0;
    let main = builder.add_static_function(lib, "main", &main).unwrap();
    let (a, k) = (decl(&builder, 0), decl(&builder, 1));
    let unit = builder.finish();

    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());
    let target = ScopeTarget::member(&unit, main).unwrap();
    let result = build_scopes(&unit, &target, &mut evaluator, &DefaultTypeTranslator).unwrap();
    let value = |d: NodeRef| evaluator.value(result.variable(result.lookup(d).unwrap()).const_value.unwrap());
    assert_eq!(value(a), Some(ConstValue::Int(3)));
    assert_eq!(value(k), Some(ConstValue::Int(8)));
    assert!(result.variable(result.lookup(k).unwrap()).is_final);
}

#[test]
fn failed_default_values_fail_the_build() {
    let (mut builder, lib) = builder();
    let broken = Expression::Invalid {
        pos: TokenPos::new(3),
        message: "broken".to_owned(),
    };
    let mut main = FunctionNode::new(
        0,
        vec![VariableDeclaration::new(0, "a").with_initializer(broken)],
        Statement::block(vec![]),
    );
    main.required_parameter_count = 0;
    let main = builder.add_static_function(lib, "main", &main).unwrap();
    let unit = builder.finish();

    let error = build(&unit, &ScopeTarget::member(&unit, main).unwrap()).unwrap_err();
    assert!(matches!(error, ScopeError::Const(_)), "{error:?}");
}

#[test]
fn descriptors_report_storage_and_ranges() {
    // main(a) { var b; }, spanning positions 1..30 with the body at 10..20
    let (mut builder, lib) = builder();
    let body = Statement::Block {
        pos: TokenPos::new(10),
        end_pos: TokenPos::new(20),
        statements: vec![var(1, "b")],
    };
    let mut main = FunctionNode::new(0, vec![VariableDeclaration::new(0, "a")], body);
    main.pos = TokenPos::new(1);
    main.end_pos = TokenPos::new(30);
    let main = builder.add_static_function(lib, "main", &main).unwrap();
    let unit = builder.finish();

    let result = build_member(&unit, main);
    assert_eq!(
        result.var_descriptors(),
        vec![
            VarDescriptor {
                name: Arc::from("a"),
                storage: Storage::Parameter { index: 0 },
                begin: TokenPos::new(1),
                end: TokenPos::new(30),
            },
            VarDescriptor {
                name: Arc::from("b"),
                storage: Storage::Stack { index: 0 },
                begin: TokenPos::new(10),
                end: TokenPos::new(20),
            },
        ]
    );
    assert_eq!(result.var_descriptors()[1].level(), 0);
    assert_eq!(result.var_descriptors()[0].index(), Some(0));
}

#[test]
fn field_accessors_have_no_declared_body() {
    let (mut builder, lib) = builder();
    let object = builder.core_class("Object");
    let int = TypeNode::SimpleInterface(builder.core_class("int"));
    let class = builder.program_mut().add_class(lib, "C", object);
    let field = builder
        .add_field(class, "count", flint_ir::program::FieldFlags::empty(), &int, None)
        .unwrap();
    let unit = builder.finish();

    let getter = ScopeTarget::member(&unit, field).unwrap();
    assert_eq!(getter.kind, FunctionKind::ImplicitGetter);
    let result = build(&unit, &getter).unwrap();
    assert_eq!(result.parameters.len(), 1);

    let setter = ScopeTarget::synthetic(&unit, field, FunctionKind::ImplicitSetter).unwrap();
    let result = build(&unit, &setter).unwrap();
    let value = result.variable(result.parameters[1]);
    assert_eq!(&*value.name, "value");
    assert_eq!(value.kind, VariableKind::Parameter);
    assert!(value.needs_type_check);

    assert_eq!(
        ScopeTarget::member(&unit, class).unwrap_err(),
        ScopeError::UnknownMember(class)
    );
}
