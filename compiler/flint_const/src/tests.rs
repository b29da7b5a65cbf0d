#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use flint_ir::ast::{
    Arguments, Expression, FunctionNode, Initializer, Statement, TypeNode, VarLabel,
    VariableDeclaration,
};
use flint_ir::program::{FieldFlags, NameResolver};
use flint_ir::tag::LogicalOp;
use flint_ir::{
    CanonicalRef, ConstValue, ConstantPool, NodeRef, ResolvedType, SourceErrorKind, SourceUnit,
    TokenPos, UnitBuilder, VariableFlags,
};

use super::*;

const STATIC_CONST: FieldFlags = FieldFlags::STATIC.union(FieldFlags::CONST);

fn builder() -> (UnitBuilder, CanonicalRef) {
    let mut builder = UnitBuilder::new();
    let lib = builder.program_mut().add_library("app");
    (builder, lib)
}

fn eval_with(expr: &Expression, options: &ConstOptions) -> Result<ConstValue, ConstError> {
    let (mut builder, _) = builder();
    let node = builder.encoder_mut().write_expression(expr).unwrap();
    let unit = builder.finish();
    let mut evaluator = ConstantEvaluator::new(&unit, options);
    let id = evaluator.evaluate_at(node)?;
    Ok(evaluator.value(id).unwrap())
}

fn eval(expr: &Expression) -> Result<ConstValue, ConstError> {
    eval_with(expr, &ConstOptions::default())
}

fn error_kind(result: Result<ConstValue, ConstError>) -> SourceErrorKind {
    result.unwrap_err().as_source().unwrap().kind.clone()
}

fn op(left: Expression, operator: &str, right: Expression) -> Expression {
    Expression::method(left, operator, vec![right])
}

fn logical(left: Expression, op: LogicalOp, right: Expression) -> Expression {
    Expression::Logical {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn invalid() -> Expression {
    Expression::Invalid {
        pos: TokenPos::new(4),
        message: "broken".to_owned(),
    }
}

fn construct(target: CanonicalRef, arguments: Arguments) -> Expression {
    Expression::ConstructorInvocation {
        pos: TokenPos::new(1),
        target,
        arguments,
        is_const: true,
    }
}

#[test]
fn folds_arithmetic_and_strings() {
    let sum = op(Expression::int(1), "+", op(Expression::int(2), "*", Expression::int(3)));
    assert_eq!(eval(&sum).unwrap(), ConstValue::Int(7));

    let text = Expression::StringConcatenation {
        pos: TokenPos::new(0),
        parts: vec![
            Expression::string("a"),
            Expression::int(1),
            Expression::BoolLiteral(true),
            Expression::NullLiteral,
            Expression::DoubleLiteral(2.0),
        ],
    };
    assert_eq!(eval(&text).unwrap(), ConstValue::string("a1truenull2.0"));
}

#[test]
fn logical_operators_short_circuit() {
    let skipped = logical(
        Expression::BoolLiteral(false),
        LogicalOp::And,
        op(Expression::int(1), "~/", Expression::int(0)),
    );
    assert_eq!(eval(&skipped).unwrap(), ConstValue::Bool(false));

    let taken = logical(Expression::BoolLiteral(true), LogicalOp::Or, invalid());
    assert_eq!(eval(&taken).unwrap(), ConstValue::Bool(true));

    let mistyped = logical(Expression::BoolLiteral(true), LogicalOp::And, Expression::int(1));
    assert_eq!(
        error_kind(eval(&mistyped)),
        SourceErrorKind::UnsupportedOperation {
            operator: "&&".to_owned(),
            receiver: "int".to_owned(),
        }
    );
}

#[test]
fn conditional_evaluates_only_the_chosen_branch() {
    let expr = Expression::Conditional {
        condition: Box::new(Expression::BoolLiteral(false)),
        then: Box::new(invalid()),
        otherwise: Box::new(Expression::int(2)),
        static_type: Some(TypeNode::Dynamic),
    };
    assert_eq!(eval(&expr).unwrap(), ConstValue::Int(2));
}

#[test]
fn integer_errors_are_source_errors() {
    let overflow = op(Expression::int(i64::MAX), "+", Expression::int(1));
    assert_eq!(error_kind(eval(&overflow)), SourceErrorKind::IntegerOverflow);

    let zero = op(Expression::int(1), "~/", Expression::int(0));
    assert_eq!(error_kind(eval(&zero)), SourceErrorKind::DivisionByZero);

    let huge = Expression::BigIntLiteral("99999999999999999999".to_owned());
    assert_eq!(
        error_kind(eval(&huge)),
        SourceErrorKind::IntegerLiteralTooLarge("99999999999999999999".to_owned())
    );
}

#[test]
fn invalid_expression_reports_its_position() {
    let error = eval(&invalid()).unwrap_err();
    let source = error.as_source().unwrap();
    assert_eq!(source.pos, TokenPos::new(4));
    assert_eq!(
        source.kind,
        SourceErrorKind::InvalidExpression("broken".to_owned())
    );
}

#[test]
fn runtime_only_forms_are_not_constant() {
    let list = Expression::ListLiteral {
        pos: TokenPos::new(2),
        element_type: TypeNode::Dynamic,
        elements: vec![Expression::int(1)],
        is_const: false,
    };
    assert_eq!(error_kind(eval(&list)), SourceErrorKind::NotConstant);
    assert_eq!(error_kind(eval(&Expression::This)), SourceErrorKind::NotConstant);
}

#[test]
fn const_collections_intern_their_elements() {
    let (mut builder, _) = builder();
    let list = builder
        .encoder_mut()
        .write_expression(&Expression::ListLiteral {
            pos: TokenPos::new(0),
            element_type: TypeNode::Dynamic,
            elements: vec![Expression::int(1), Expression::int(2)],
            is_const: true,
        })
        .unwrap();
    let map = builder
        .encoder_mut()
        .write_expression(&Expression::MapLiteral {
            pos: TokenPos::new(0),
            key_type: TypeNode::Dynamic,
            value_type: TypeNode::Dynamic,
            entries: vec![
                (Expression::string("k"), Expression::int(1)),
                (Expression::string("k"), Expression::int(2)),
            ],
            is_const: true,
        })
        .unwrap();
    let unit = builder.finish();
    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());

    let id = evaluator.evaluate_at(list).unwrap();
    let one = unit.pool().intern(ConstValue::Int(1));
    let two = unit.pool().intern(ConstValue::Int(2));
    assert_eq!(
        evaluator.value(id).unwrap(),
        ConstValue::List {
            element: ResolvedType::Dynamic,
            elements: vec![one, two],
        }
    );

    let error = evaluator.evaluate_at(map).unwrap_err();
    assert!(matches!(
        error.as_source().map(|e| &e.kind),
        Some(SourceErrorKind::InvalidExpression(_))
    ));
}

#[test]
fn lists_cannot_be_interpolated() {
    let expr = Expression::StringConcatenation {
        pos: TokenPos::new(0),
        parts: vec![
            Expression::string("a"),
            Expression::ListLiteral {
                pos: TokenPos::new(0),
                element_type: TypeNode::Dynamic,
                elements: Vec::new(),
                is_const: true,
            },
        ],
    };
    assert!(matches!(
        error_kind(eval(&expr)),
        SourceErrorKind::InvalidExpression(_)
    ));
}

#[test]
fn casts_and_type_tests() {
    let (builder, _) = builder();
    let string = builder.core_class("String");
    let object = builder.core_class("Object");

    let cast = |operand: Expression, class: CanonicalRef| Expression::As {
        pos: TokenPos::new(3),
        flags: 0,
        operand: Box::new(operand),
        ty: TypeNode::SimpleInterface(class),
    };
    let test = |operand: Expression, class: CanonicalRef| Expression::Is {
        pos: TokenPos::new(3),
        operand: Box::new(operand),
        ty: TypeNode::SimpleInterface(class),
    };

    assert_eq!(
        eval(&cast(Expression::int(1), object)).unwrap(),
        ConstValue::Int(1)
    );
    assert_eq!(
        eval(&cast(Expression::NullLiteral, string)).unwrap(),
        ConstValue::Null
    );
    assert_eq!(
        error_kind(eval(&cast(Expression::int(1), string))),
        SourceErrorKind::FailedCast {
            actual: "dart:core::int".to_owned(),
            expected: "dart:core::String".to_owned(),
        }
    );
    assert_eq!(
        eval(&test(Expression::NullLiteral, string)).unwrap(),
        ConstValue::Bool(false)
    );
    assert_eq!(
        eval(&test(Expression::NullLiteral, object)).unwrap(),
        ConstValue::Bool(true)
    );
    assert_eq!(
        eval(&test(Expression::string("s"), string)).unwrap(),
        ConstValue::Bool(true)
    );
}

#[test]
fn let_binds_for_its_body() {
    let expr = Expression::Let {
        variable: Box::new(VariableDeclaration::new(20, "t").with_initializer(Expression::int(5))),
        body: Box::new(op(
            Expression::get(VarLabel(20)),
            "+",
            Expression::get(VarLabel(20)),
        )),
    };
    assert_eq!(eval(&expr).unwrap(), ConstValue::Int(10));
}

#[test]
fn const_locals_are_read_through_their_declaration() {
    let (mut builder, _) = builder();
    let encoder = builder.encoder_mut();
    encoder
        .write_statement(&Statement::VariableDeclaration(
            VariableDeclaration::new(1, "k")
                .with_flags(VariableFlags::CONST)
                .with_initializer(Expression::int(9)),
        ))
        .unwrap();
    encoder
        .write_statement(&Statement::VariableDeclaration(
            VariableDeclaration::new(2, "v").with_initializer(Expression::int(9)),
        ))
        .unwrap();
    let read_const = encoder.write_expression(&Expression::get(VarLabel(1))).unwrap();
    let read_var = encoder.write_expression(&Expression::get(VarLabel(2))).unwrap();
    let unit = builder.finish();

    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());
    let id = evaluator.evaluate_at(read_const).unwrap();
    assert_eq!(evaluator.value(id).unwrap(), ConstValue::Int(9));
    let error = evaluator.evaluate_at(read_var).unwrap_err();
    assert_eq!(
        error.as_source().map(|e| e.kind.clone()),
        Some(SourceErrorKind::NotConstant)
    );
}

#[test]
fn static_fields_and_tear_offs() {
    let (mut builder, lib) = builder();
    let base = builder
        .add_field(lib, "base", STATIC_CONST, &TypeNode::Dynamic, Some(&Expression::int(2)))
        .unwrap();
    let answer = op(Expression::static_get(base), "*", Expression::int(21));
    let answer = builder
        .add_field(lib, "answer", STATIC_CONST, &TypeNode::Dynamic, Some(&answer))
        .unwrap();
    let mutable = builder
        .add_field(lib, "mutable", FieldFlags::STATIC, &TypeNode::Dynamic, Some(&Expression::int(1)))
        .unwrap();
    let main = builder
        .add_static_function(lib, "main", &FunctionNode::new(0, Vec::new(), Statement::Empty))
        .unwrap();
    let unit = builder.finish();

    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());
    let id = evaluator.evaluate_static_field(answer).unwrap();
    assert_eq!(evaluator.value(id).unwrap(), ConstValue::Int(42));
    let id = evaluator.evaluate_static_field(main).unwrap();
    assert_eq!(evaluator.value(id).unwrap(), ConstValue::TearOff(main));
    let error = evaluator.evaluate_static_field(mutable).unwrap_err();
    assert_eq!(
        error.as_source().map(|e| e.kind.clone()),
        Some(SourceErrorKind::NotConstant)
    );
}

/// `x = 40 + 2`, plus `a = b` and `b = a`.
fn cyclic_unit() -> (SourceUnit, CanonicalRef, CanonicalRef) {
    let (mut builder, lib) = builder();
    let x = builder
        .add_field(
            lib,
            "x",
            STATIC_CONST,
            &TypeNode::Dynamic,
            Some(&op(Expression::int(40), "+", Expression::int(2))),
        )
        .unwrap();
    let a = builder.declare_field(lib, "a", STATIC_CONST, &TypeNode::Dynamic).unwrap();
    let b = builder.declare_field(lib, "b", STATIC_CONST, &TypeNode::Dynamic).unwrap();
    builder.define_field_initializer(a, &Expression::static_get(b)).unwrap();
    builder.define_field_initializer(b, &Expression::static_get(a)).unwrap();
    (builder.finish(), x, a)
}

#[test]
fn cyclic_initialization_is_detected() {
    let (unit, _, a) = cyclic_unit();
    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());
    for _ in 0..2 {
        let error = evaluator.evaluate_static_field(a).unwrap_err();
        assert_eq!(
            error.as_source().map(|e| e.kind.clone()),
            Some(SourceErrorKind::CyclicInitialization {
                field: "app::a".to_owned(),
            })
        );
    }
}

#[test]
fn cache_is_shared_and_survives_a_clear() {
    let (unit, x, a) = cyclic_unit();
    let options = ConstOptions::default();

    let mut first = ConstantEvaluator::new(&unit, &options);
    let value = first.evaluate_static_field(x).unwrap();
    assert_eq!(
        first.stats(),
        EvalStats {
            evaluations: 3,
            cache_hits: 0,
        }
    );
    assert!(!unit.cache().is_empty());

    let mut second = ConstantEvaluator::new(&unit, &options);
    assert_eq!(second.evaluate_static_field(x).unwrap(), value);
    assert_eq!(
        second.stats(),
        EvalStats {
            evaluations: 0,
            cache_hits: 1,
        }
    );

    assert!(second.evaluate_static_field(a).is_err());
    assert!(unit.cache().is_empty());

    // Recomputed from the bytes, to the same interned constant.
    let mut third = ConstantEvaluator::new(&unit, &options);
    assert_eq!(third.evaluate_static_field(x).unwrap(), value);
    assert_eq!(third.stats().evaluations, 3);
}

#[test]
fn cursor_modes() {
    let (mut builder, _) = builder();
    let first = builder
        .encoder_mut()
        .write_expression(&op(Expression::int(1), "+", Expression::int(1)))
        .unwrap();
    let second = builder.encoder_mut().write_expression(&Expression::int(5)).unwrap();
    let unit = builder.finish();
    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());

    let mut cursor = unit.cursor_at(first);
    evaluator.evaluate(&mut cursor).unwrap();
    assert_eq!(cursor.node_ref(), first);
    evaluator.evaluate_and_advance(&mut cursor).unwrap();
    assert_eq!(cursor.node_ref(), second);
}

#[test]
fn evaluate_safe_moves_past_failures() {
    let (mut builder, _) = builder();
    let broken = builder
        .encoder_mut()
        .write_expression(&Expression::ListLiteral {
            pos: TokenPos::new(8),
            element_type: TypeNode::Dynamic,
            elements: vec![Expression::int(1)],
            is_const: false,
        })
        .unwrap();
    let next = builder.encoder_mut().write_expression(&Expression::int(5)).unwrap();
    let unit = builder.finish();
    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());

    let mut cursor = unit.cursor_at(broken);
    let result = evaluator.evaluate_safe(&mut cursor, CursorMode::Reset).unwrap();
    assert!(!result.is_constant());
    assert_eq!(cursor.node_ref(), broken);

    let result = evaluator.evaluate_safe(&mut cursor, CursorMode::Advance).unwrap();
    match result {
        ConstResult::Error(error) => {
            assert_eq!(error.pos, TokenPos::new(8));
            assert_eq!(error.kind, SourceErrorKind::NotConstant);
        }
        ConstResult::Value(_) => panic!("list literal folded"),
    }
    assert_eq!(cursor.node_ref(), next);

    let result = evaluator.evaluate_safe(&mut cursor, CursorMode::Advance).unwrap();
    let id = result.value().unwrap();
    assert_eq!(evaluator.value(id).unwrap(), ConstValue::Int(5));
    assert!(cursor.at_end());
}

#[test]
fn nesting_past_the_limit_fails() {
    let mut expr = Expression::BoolLiteral(true);
    for _ in 0..20 {
        expr = Expression::Not(Box::new(expr));
    }
    let options = ConstOptions {
        max_depth: 8,
        ..ConstOptions::default()
    };
    assert_eq!(error_kind(eval_with(&expr, &options)), SourceErrorKind::TooDeep);
    assert_eq!(eval(&expr).unwrap(), ConstValue::Bool(true));
}

#[test]
fn from_environment_reads_defines() {
    let (mut builder, _) = builder();
    let bool_class = builder.core_class("bool");
    let int_class = builder.core_class("int");
    let bool_env = builder.declare_constructor(bool_class, "fromEnvironment", true);
    let int_env = builder.declare_constructor(int_class, "fromEnvironment", true);
    let debug = builder
        .encoder_mut()
        .write_expression(&construct(
            bool_env,
            Arguments::positional(vec![Expression::string("DEBUG")]),
        ))
        .unwrap();
    let level = builder
        .encoder_mut()
        .write_expression(&construct(
            int_env,
            Arguments {
                positional: vec![Expression::string("LEVEL")],
                named: vec![("defaultValue".to_owned(), Expression::int(5))],
                ..Arguments::default()
            },
        ))
        .unwrap();
    let unit = builder.finish();

    let options = ConstOptions::default().with_define("DEBUG", "true");
    let mut evaluator = ConstantEvaluator::new(&unit, &options);
    let id = evaluator.evaluate_at(debug).unwrap();
    assert_eq!(id, ConstantPool::TRUE);
    let id = evaluator.evaluate_at(level).unwrap();
    assert_eq!(evaluator.value(id).unwrap(), ConstValue::Int(5));
}

struct Shapes {
    builder: UnitBuilder,
    point: CanonicalRef,
    point_ctor: CanonicalRef,
    mutable_ctor: CanonicalRef,
    fields: [CanonicalRef; 4],
}

impl Shapes {
    fn finish(mut self, exprs: &[Expression]) -> (SourceUnit, Vec<NodeRef>, Self) {
        let nodes = exprs
            .iter()
            .map(|e| self.builder.encoder_mut().write_expression(e).unwrap())
            .collect();
        let builder = std::mem::take(&mut self.builder);
        (builder.finish(), nodes, self)
    }

    fn instance(&self, unit: &SourceUnit, values: [ConstValue; 4]) -> ConstValue {
        let pool = unit.pool();
        let mut fields: Vec<_> = self
            .fields
            .iter()
            .copied()
            .zip(values.into_iter().map(|v| pool.intern(v)))
            .collect();
        fields.sort_unstable_by_key(|(field, _)| *field);
        ConstValue::Instance {
            class: self.point,
            type_arguments: Vec::new(),
            fields,
        }
    }
}

/// `Base(this.id)` and
/// `Point(x, {y = 7}) : x = x, twice = y * 2, y = twice, super(x + 1)`
/// with `tag = "pt"` initialized in the class body.
fn shapes() -> Shapes {
    let (mut builder, lib) = builder();
    let object = builder.core_class("Object");
    let program = builder.program_mut();
    let base = program.add_class(lib, "Base", object);
    let point = program.add_class(lib, "Point", base);

    let dynamic = TypeNode::Dynamic;
    let id = builder.add_field(base, "id", FieldFlags::FINAL, &dynamic, None).unwrap();
    let x = builder.add_field(point, "x", FieldFlags::FINAL, &dynamic, None).unwrap();
    let y = builder.add_field(point, "y", FieldFlags::FINAL, &dynamic, None).unwrap();
    let tag = builder
        .add_field(point, "tag", FieldFlags::FINAL, &dynamic, Some(&Expression::string("pt")))
        .unwrap();

    let base_ctor = builder
        .add_constructor(
            base,
            "",
            true,
            &FunctionNode::new(
                1,
                vec![VariableDeclaration::new(1, "id").with_flags(VariableFlags::FIELD_FORMAL)],
                Statement::Empty,
            ),
            &[],
        )
        .unwrap();

    let mut function = FunctionNode::new(2, vec![VariableDeclaration::new(2, "x")], Statement::Empty);
    function.named = vec![VariableDeclaration::new(3, "y").with_initializer(Expression::int(7))];
    let point_ctor = builder
        .add_constructor(
            point,
            "",
            true,
            &function,
            &[
                Initializer::Field {
                    field: x,
                    value: Expression::get(VarLabel(2)),
                },
                Initializer::Local(VariableDeclaration::new(4, "twice").with_initializer(op(
                    Expression::get(VarLabel(3)),
                    "*",
                    Expression::int(2),
                ))),
                Initializer::Field {
                    field: y,
                    value: Expression::get(VarLabel(4)),
                },
                Initializer::Super {
                    pos: TokenPos::new(6),
                    target: base_ctor,
                    arguments: Arguments::positional(vec![op(
                        Expression::get(VarLabel(2)),
                        "+",
                        Expression::int(1),
                    )]),
                },
            ],
        )
        .unwrap();
    let mutable_ctor = builder
        .add_constructor(
            point,
            "mutable",
            false,
            &FunctionNode::new(5, Vec::new(), Statement::Empty),
            &[],
        )
        .unwrap();

    Shapes {
        builder,
        point,
        point_ctor,
        mutable_ctor,
        fields: [id, x, y, tag],
    }
}

#[test]
fn const_constructors_run_their_initializers() {
    let shapes = shapes();
    let positional = construct(
        shapes.point_ctor,
        Arguments::positional(vec![Expression::int(3)]),
    );
    let named = construct(
        shapes.point_ctor,
        Arguments {
            positional: vec![Expression::int(3)],
            named: vec![("y".to_owned(), Expression::int(1))],
            ..Arguments::default()
        },
    );
    let mutable = construct(shapes.mutable_ctor, Arguments::default());
    let (unit, nodes, shapes) = shapes.finish(&[positional.clone(), named, positional, mutable]);
    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());

    let first = evaluator.evaluate_at(nodes[0]).unwrap();
    assert_eq!(
        evaluator.value(first).unwrap(),
        shapes.instance(
            &unit,
            [
                ConstValue::Int(4),
                ConstValue::Int(3),
                ConstValue::Int(14),
                ConstValue::string("pt"),
            ]
        )
    );
    let second = evaluator.evaluate_at(nodes[1]).unwrap();
    assert_eq!(
        evaluator.value(second).unwrap(),
        shapes.instance(
            &unit,
            [
                ConstValue::Int(4),
                ConstValue::Int(3),
                ConstValue::Int(2),
                ConstValue::string("pt"),
            ]
        )
    );
    // Equal constants are one canonical instance.
    assert_eq!(evaluator.evaluate_at(nodes[2]).unwrap(), first);

    let error = evaluator.evaluate_at(nodes[3]).unwrap_err();
    assert_eq!(
        error.as_source().map(|e| e.kind.clone()),
        Some(SourceErrorKind::NotConstant)
    );
}

#[test]
fn parameter_defaults_evaluate_on_demand() {
    let (mut builder, lib) = builder();
    let mut function = FunctionNode::new(0, Vec::new(), Statement::Empty);
    function.named = vec![
        VariableDeclaration::new(0, "a").with_initializer(op(
            Expression::int(6),
            "*",
            Expression::int(7),
        )),
        VariableDeclaration::new(1, "b"),
    ];
    let f = builder.add_static_function(lib, "f", &function).unwrap();
    let unit = builder.finish();

    let node = unit.program().resolve(f).and_then(|s| s.function()).unwrap();
    let layout = unit.cursor().function_layout_at(node).unwrap();
    let mut evaluator = ConstantEvaluator::new(&unit, &ConstOptions::default());
    let a = evaluator.evaluate_parameter_default(layout.named[0]).unwrap();
    assert_eq!(a.and_then(|id| evaluator.value(id)), Some(ConstValue::Int(42)));
    assert_eq!(evaluator.evaluate_parameter_default(layout.named[1]).unwrap(), None);
}
