#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use super::*;

fn binary(op: &str, left: ConstValue, right: ConstValue) -> Result<Option<ConstValue>, SourceErrorKind> {
    BuiltinInvoker::default().invoke_method(&left, op, &ConstArgs::positional(vec![right]))
}

#[test]
fn integer_arithmetic_is_checked() {
    assert_eq!(
        binary("+", ConstValue::Int(2), ConstValue::Int(3)),
        Ok(Some(ConstValue::Int(5)))
    );
    assert_eq!(
        binary("*", ConstValue::Int(i64::MAX), ConstValue::Int(2)),
        Err(SourceErrorKind::IntegerOverflow)
    );
    assert_eq!(
        binary("~/", ConstValue::Int(7), ConstValue::Int(0)),
        Err(SourceErrorKind::DivisionByZero)
    );
    assert_eq!(
        binary("%", ConstValue::Int(-7), ConstValue::Int(3)),
        Ok(Some(ConstValue::Int(2)))
    );
}

#[test]
fn mixed_numbers_fold_as_doubles() {
    assert_eq!(
        binary("/", ConstValue::Int(1), ConstValue::Int(4)),
        Ok(Some(ConstValue::double(0.25)))
    );
    assert_eq!(
        binary("+", ConstValue::Int(1), ConstValue::double(0.5)),
        Ok(Some(ConstValue::double(1.5)))
    );
    assert_eq!(
        binary("==", ConstValue::Int(1), ConstValue::double(1.0)),
        Ok(Some(ConstValue::Bool(true)))
    );
}

#[test]
fn shifts_saturate_past_width() {
    assert_eq!(
        binary("<<", ConstValue::Int(1), ConstValue::Int(64)),
        Ok(Some(ConstValue::Int(0)))
    );
    assert_eq!(
        binary(">>", ConstValue::Int(-8), ConstValue::Int(1)),
        Ok(Some(ConstValue::Int(-4)))
    );
    assert!(binary("<<", ConstValue::Int(1), ConstValue::Int(-1)).is_err());
}

#[test]
fn non_constant_operations_are_none() {
    assert_eq!(
        binary("+", ConstValue::Int(1), ConstValue::string("a")),
        Ok(None)
    );
    assert_eq!(
        binary("==", ConstValue::Symbol(Arc::from("a")), ConstValue::Null),
        Ok(None)
    );
}

#[test]
fn string_length_counts_utf16_units() {
    let invoker = BuiltinInvoker::default();
    assert_eq!(
        invoker.get_property(&ConstValue::string("h\u{1F600}"), "length"),
        Ok(Some(ConstValue::Int(3)))
    );
}

#[test]
fn from_environment_reads_defines() {
    let mut defines = FxHashMap::default();
    defines.insert("DEBUG".to_owned(), "true".to_owned());
    defines.insert("LEVEL".to_owned(), "0x10".to_owned());
    let invoker = BuiltinInvoker::new(Arc::new(defines));
    let args = |name: &str| ConstArgs::positional(vec![ConstValue::string(name)]);

    assert_eq!(
        invoker.invoke_static(core::BOOL_FROM_ENVIRONMENT, &args("DEBUG")),
        Ok(Some(ConstValue::Bool(true)))
    );
    assert_eq!(
        invoker.invoke_static(core::INT_FROM_ENVIRONMENT, &args("LEVEL")),
        Ok(Some(ConstValue::Int(16)))
    );
    let mut missing = args("MISSING");
    missing
        .named
        .push((Arc::from("defaultValue"), ConstValue::string("fallback")));
    assert_eq!(
        invoker.invoke_static(core::STRING_FROM_ENVIRONMENT, &missing),
        Ok(Some(ConstValue::string("fallback")))
    );
}

#[test]
fn doubles_interpolate_like_the_runtime() {
    assert_eq!(interpolate(&ConstValue::double(1.0)).unwrap(), "1.0");
    assert_eq!(interpolate(&ConstValue::double(0.1)).unwrap(), "0.1");
    assert_eq!(interpolate(&ConstValue::double(f64::NAN)).unwrap(), "NaN");
    assert_eq!(interpolate(&ConstValue::Null).unwrap(), "null");
    assert_eq!(interpolate(&ConstValue::Symbol(Arc::from("s"))), None);
}
