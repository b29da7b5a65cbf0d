//! Operations on constant receivers.
//!
//! The evaluator never interprets user code. Operators on primitives,
//! `identical` and the `fromEnvironment` constructors are the only calls a
//! constant expression may make, and they all go through [`ConstInvoker`].
//! [`BuiltinInvoker`] runs them the way the runtime would: checked integer
//! arithmetic, IEEE doubles, UTF-16 string lengths.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use flint_ir::program::core;
use flint_ir::{ConstValue, SourceErrorKind};

/// Evaluated arguments of a constant call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstArgs {
    pub positional: Vec<ConstValue>,
    pub named: Vec<(Arc<str>, ConstValue)>,
}

impl ConstArgs {
    pub fn positional(values: Vec<ConstValue>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    pub fn named(&self, name: &str) -> Option<&ConstValue> {
        self.named
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v)
    }
}

/// Runs calls on constant values.
///
/// Every method returns `Ok(None)` when the operation is not a constant
/// operation at all, and `Err` when it is one but fails.
pub trait ConstInvoker: Send + Sync {
    /// `receiver.name(args)`, including operators (`+`, `unary-`, ...).
    fn invoke_method(
        &self,
        receiver: &ConstValue,
        name: &str,
        args: &ConstArgs,
    ) -> Result<Option<ConstValue>, SourceErrorKind>;

    /// `receiver.name` for a getter.
    fn get_property(
        &self,
        receiver: &ConstValue,
        name: &str,
    ) -> Result<Option<ConstValue>, SourceErrorKind>;

    /// A static function or factory, by qualified name.
    fn invoke_static(
        &self,
        target: &str,
        args: &ConstArgs,
    ) -> Result<Option<ConstValue>, SourceErrorKind>;
}

/// The core library's constant operations.
#[derive(Clone, Debug, Default)]
pub struct BuiltinInvoker {
    defines: Arc<FxHashMap<String, String>>,
}

impl BuiltinInvoker {
    pub fn new(defines: Arc<FxHashMap<String, String>>) -> Self {
        Self { defines }
    }

    fn from_environment(
        &self,
        target: &str,
        args: &ConstArgs,
    ) -> Result<ConstValue, SourceErrorKind> {
        let Some(ConstValue::String(name)) = args.positional.first() else {
            return Err(SourceErrorKind::InvalidExpression(
                "fromEnvironment expects a String name".to_owned(),
            ));
        };
        let defined = self.defines.get(&**name).map(String::as_str);
        let default = args.named("defaultValue");
        let value = match target {
            core::BOOL_FROM_ENVIRONMENT => match defined {
                Some("true") => ConstValue::Bool(true),
                Some("false") => ConstValue::Bool(false),
                _ => default.cloned().unwrap_or(ConstValue::Bool(false)),
            },
            core::INT_FROM_ENVIRONMENT => match defined.and_then(parse_int) {
                Some(value) => ConstValue::Int(value),
                None => default.cloned().unwrap_or(ConstValue::Int(0)),
            },
            _ => match defined {
                Some(text) => ConstValue::string(text),
                None => default.cloned().unwrap_or_else(|| ConstValue::string("")),
            },
        };
        Ok(value)
    }
}

impl ConstInvoker for BuiltinInvoker {
    fn invoke_method(
        &self,
        receiver: &ConstValue,
        name: &str,
        args: &ConstArgs,
    ) -> Result<Option<ConstValue>, SourceErrorKind> {
        if !args.named.is_empty() {
            return Ok(None);
        }
        match args.positional.as_slice() {
            [] => fold_unary(name, receiver),
            [operand] => fold_binary(name, receiver, operand),
            _ => Ok(None),
        }
    }

    fn get_property(
        &self,
        receiver: &ConstValue,
        name: &str,
    ) -> Result<Option<ConstValue>, SourceErrorKind> {
        let value = match (receiver, name) {
            (ConstValue::String(s), "length") => ConstValue::Int(length(s.encode_utf16().count())?),
            (ConstValue::String(s), "isEmpty") => ConstValue::Bool(s.is_empty()),
            (ConstValue::String(s), "isNotEmpty") => ConstValue::Bool(!s.is_empty()),
            (ConstValue::List { elements, .. }, "length") => ConstValue::Int(length(elements.len())?),
            (ConstValue::Map { entries, .. }, "length") => ConstValue::Int(length(entries.len())?),
            (ConstValue::Int(i), "isEven") => ConstValue::Bool(i % 2 == 0),
            (ConstValue::Int(i), "isOdd") => ConstValue::Bool(i % 2 != 0),
            (ConstValue::Int(i), "isNegative") => ConstValue::Bool(*i < 0),
            (ConstValue::Double(bits), "isNaN") => ConstValue::Bool(f64::from_bits(*bits).is_nan()),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn invoke_static(
        &self,
        target: &str,
        args: &ConstArgs,
    ) -> Result<Option<ConstValue>, SourceErrorKind> {
        match target {
            core::IDENTICAL => match args.positional.as_slice() {
                // Values are interned, so identity is structural equality.
                [a, b] => Ok(Some(ConstValue::Bool(a == b))),
                _ => Ok(None),
            },
            core::BOOL_FROM_ENVIRONMENT
            | core::INT_FROM_ENVIRONMENT
            | core::STRING_FROM_ENVIRONMENT => self.from_environment(target, args).map(Some),
            _ => Ok(None),
        }
    }
}

fn length(len: usize) -> Result<i64, SourceErrorKind> {
    i64::try_from(len).map_err(|_| SourceErrorKind::IntegerOverflow)
}

/// Decimal or `0x` hexadecimal, with an optional leading minus.
fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    if negative {
        magnitude.checked_neg()
    } else {
        Some(magnitude)
    }
}

// Unary operators

fn fold_unary(op: &str, operand: &ConstValue) -> Result<Option<ConstValue>, SourceErrorKind> {
    let value = match (op, operand) {
        ("unary-", ConstValue::Int(a)) => {
            ConstValue::Int(a.checked_neg().ok_or(SourceErrorKind::IntegerOverflow)?)
        }
        ("unary-", ConstValue::Double(bits)) => ConstValue::double(-f64::from_bits(*bits)),
        ("~", ConstValue::Int(a)) => ConstValue::Int(!a),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

// Binary operators

fn checked(value: Option<i64>) -> Result<Option<ConstValue>, SourceErrorKind> {
    value
        .map(|v| Some(ConstValue::Int(v)))
        .ok_or(SourceErrorKind::IntegerOverflow)
}

fn fold_binary(
    op: &str,
    left: &ConstValue,
    right: &ConstValue,
) -> Result<Option<ConstValue>, SourceErrorKind> {
    use ConstValue::{Bool, Int};

    let value = match (op, left, right) {
        // Equality is constant only between primitives.
        ("==", l, r) if l.is_primitive() && r.is_primitive() => Bool(primitive_equals(l, r)),

        // Integer arithmetic (overflow is an error, not a wrap).
        ("+", Int(a), Int(b)) => return checked(a.checked_add(*b)),
        ("-", Int(a), Int(b)) => return checked(a.checked_sub(*b)),
        ("*", Int(a), Int(b)) => return checked(a.checked_mul(*b)),
        ("~/" | "%", Int(_), Int(0)) => return Err(SourceErrorKind::DivisionByZero),
        ("~/", Int(a), Int(b)) => return checked(a.checked_div(*b)),
        ("%", Int(a), Int(b)) => return checked(a.checked_rem_euclid(*b)),
        ("/", Int(a), Int(b)) => ConstValue::double(to_double(*a) / to_double(*b)),

        // Bitwise operators.
        ("&", Int(a), Int(b)) => Int(a & b),
        ("|", Int(a), Int(b)) => Int(a | b),
        ("^", Int(a), Int(b)) => Int(a ^ b),
        ("<<" | ">>", Int(_), Int(b)) if *b < 0 => {
            return Err(SourceErrorKind::InvalidExpression(format!(
                "negative shift count {b}"
            )))
        }
        ("<<", Int(a), Int(b)) => Int(shift_amount(*b).map_or(0, |s| a << s)),
        (">>", Int(a), Int(b)) => Int(shift_amount(*b).map_or(if *a < 0 { -1 } else { 0 }, |s| a >> s)),
        ("&", Bool(a), Bool(b)) => Bool(*a & *b),
        ("|", Bool(a), Bool(b)) => Bool(*a | *b),
        ("^", Bool(a), Bool(b)) => Bool(*a ^ *b),

        // Integer comparisons (exact, no double round trip).
        ("<", Int(a), Int(b)) => Bool(a < b),
        ("<=", Int(a), Int(b)) => Bool(a <= b),
        (">", Int(a), Int(b)) => Bool(a > b),
        (">=", Int(a), Int(b)) => Bool(a >= b),

        // Doubles, and ints mixed with doubles.
        (op, l, r) if is_number(l) && is_number(r) => {
            return fold_double(op, number(l), number(r));
        }

        ("+", ConstValue::String(a), ConstValue::String(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            ConstValue::String(Arc::from(joined))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn fold_double(op: &str, a: f64, b: f64) -> Result<Option<ConstValue>, SourceErrorKind> {
    let value = match op {
        "+" => ConstValue::double(a + b),
        "-" => ConstValue::double(a - b),
        "*" => ConstValue::double(a * b),
        "/" => ConstValue::double(a / b),
        "%" => {
            let r = a % b;
            ConstValue::double(if r < 0.0 { r + b.abs() } else { r })
        }
        "~/" => {
            if b == 0.0 {
                return Err(SourceErrorKind::DivisionByZero);
            }
            return truncate(a / b).map(|i| Some(ConstValue::Int(i)));
        }
        "<" => ConstValue::Bool(a < b),
        "<=" => ConstValue::Bool(a <= b),
        ">" => ConstValue::Bool(a > b),
        ">=" => ConstValue::Bool(a >= b),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn shift_amount(count: i64) -> Option<u32> {
    u32::try_from(count).ok().filter(|s| *s < 64)
}

fn is_number(value: &ConstValue) -> bool {
    matches!(value, ConstValue::Int(_) | ConstValue::Double(_))
}

fn number(value: &ConstValue) -> f64 {
    match value {
        ConstValue::Int(i) => to_double(*i),
        ConstValue::Double(bits) => f64::from_bits(*bits),
        _ => f64::NAN,
    }
}

#[allow(clippy::cast_precision_loss, reason = "int to double follows runtime semantics")]
fn to_double(value: i64) -> f64 {
    value as f64
}

#[allow(clippy::cast_possible_truncation, reason = "range checked before the cast")]
fn truncate(value: f64) -> Result<i64, SourceErrorKind> {
    let t = value.trunc();
    // 2^63 is exactly representable; anything at or past it does not fit.
    if !t.is_finite() || t >= 9_223_372_036_854_775_808.0 || t < -9_223_372_036_854_775_808.0 {
        return Err(SourceErrorKind::IntegerOverflow);
    }
    Ok(t as i64)
}

fn primitive_equals(left: &ConstValue, right: &ConstValue) -> bool {
    match (left, right) {
        (ConstValue::Double(_), _) | (_, ConstValue::Double(_))
            if is_number(left) && is_number(right) =>
        {
            #[allow(clippy::float_cmp, reason = "numeric equality is exact by definition")]
            let equal = number(left) == number(right);
            equal
        }
        _ => left == right,
    }
}

/// Text of a primitive constant inside a string interpolation.
///
/// Returns `None` for values interpolation does not accept.
pub fn interpolate(value: &ConstValue) -> Option<String> {
    match value {
        ConstValue::Null => Some("null".to_owned()),
        ConstValue::Bool(b) => Some(b.to_string()),
        ConstValue::Int(i) => Some(i.to_string()),
        ConstValue::Double(bits) => Some(format_double(f64::from_bits(*bits))),
        ConstValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_owned()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests;
