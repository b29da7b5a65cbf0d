#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use crate::ast::{Expression, FunctionNode, Statement, TypeNode};
use crate::metadata::{DirectCall, ProcedureAttributes};
use crate::program::{core, FieldFlags, NameResolver, SymbolKind};
use crate::{CanonicalRef, ConstValue, IrError, NodeRef};

use super::{SourceUnit, UnitBuilder};

fn sample_unit() -> (SourceUnit, CanonicalRef) {
    let mut builder = UnitBuilder::new();
    let lib = builder.program_mut().add_library("app");
    builder
        .add_field(
            lib,
            "limit",
            FieldFlags::STATIC | FieldFlags::CONST,
            &TypeNode::Dynamic,
            Some(&Expression::int(10)),
        )
        .unwrap();
    let main = builder
        .add_static_function(
            lib,
            "main",
            &FunctionNode::new(0, Vec::new(), Statement::ret(Some(Expression::int(1)))),
        )
        .unwrap();
    builder
        .metadata_mut()
        .set_procedure_attributes(main, ProcedureAttributes::HAS_TEAR_OFF_USES);
    builder.metadata_mut().set_direct_call(
        NodeRef::new(3),
        DirectCall {
            target: main,
            check_receiver_for_null: false,
        },
    );
    (builder.finish(), main)
}

#[test]
fn builder_records_function_offsets() {
    let (unit, main) = sample_unit();
    let functions: Vec<_> = unit.functions().collect();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].0, main);
    let mut cursor = unit.cursor_at(functions[0].1);
    let decoded = cursor.decode_function_node().unwrap();
    assert_eq!(
        decoded.body.as_deref(),
        Some(&Statement::ret(Some(Expression::int(1))))
    );
}

#[test]
fn static_field_initializer_is_addressable() {
    let (unit, _) = sample_unit();
    let field = unit.member("app::limit").unwrap();
    let info = unit.program().resolve(field).unwrap().as_field().unwrap().clone();
    assert!(info.is_static() && info.is_const());
    let mut cursor = unit.cursor_at(info.initializer.unwrap());
    assert_eq!(cursor.decode_expression().unwrap(), Expression::int(10));
}

#[test]
fn container_round_trip_preserves_tables() {
    let (unit, main) = sample_unit();
    let bytes = unit.to_bytes().unwrap();
    assert_eq!(&bytes[..4], b"FLNT");
    let loaded = SourceUnit::from_bytes(&bytes).unwrap();
    assert_eq!(loaded.data(), unit.data());
    assert_eq!(loaded.program(), unit.program());
    assert_eq!(loaded.metadata(), unit.metadata());
    assert_eq!(loaded.member("app::main"), Some(main));
    assert!(loaded.member(core::INT).is_some());
    assert_eq!(
        loaded.metadata().procedure_attributes(main),
        ProcedureAttributes::HAS_TEAR_OFF_USES
    );
}

#[test]
fn container_rejects_bad_magic_and_version() {
    assert!(matches!(
        SourceUnit::from_bytes(b"NOPE\0\0\0\x01\0\0\0\0"),
        Err(IrError::Container(_))
    ));
    let (unit, _) = sample_unit();
    let mut bytes = unit.to_bytes().unwrap();
    bytes[7] = 9;
    assert!(matches!(
        SourceUnit::from_bytes(&bytes),
        Err(IrError::Container(_))
    ));
}

#[test]
fn clones_share_constant_state() {
    let (unit, _) = sample_unit();
    let copy = unit.clone();
    let id = unit.pool().intern(ConstValue::Int(99));
    copy.cache().insert(NodeRef::new(0), id);
    assert_eq!(unit.cache().get(NodeRef::new(0)), Some(id));
    assert_eq!(copy.pool().get(id), Some(ConstValue::Int(99)));
}

#[test]
fn defining_unknown_member_fails() {
    let mut builder = UnitBuilder::new();
    let object = builder.core_class("Object");
    assert!(matches!(
        builder.program().resolve(object).map(|s| &s.kind),
        Some(SymbolKind::Class(_))
    ));
    let result = builder.define_function(
        object,
        &FunctionNode::new(0, Vec::new(), Statement::Empty),
    );
    assert!(matches!(result, Err(IrError::Encode(_))));
}
