use std::f64::consts;

use super::{expect_number, native, Eval, Exports};
use crate::{
    ast::BinaryOp,
    diagnostics::Diagnostic,
    operators,
    runtime::Interpreter,
    types::Type,
    value::{NativeFn, Value},
};

pub(crate) fn exports() -> Exports {
    let mut math = Exports::new();
    math.insert("pi", Value::Double(consts::PI));
    math.insert("e", Value::Double(consts::E));
    math.insert("inf", Value::Double(f64::INFINITY));
    math.insert("nan", Value::Double(f64::NAN));

    math.insert("abs", native("abs", math_abs).param("x", Type::Number).into_value());
    for (name, callback) in ROUNDING.iter().chain(UNARY) {
        math.insert(*name, native(*name, *callback).param("x", Type::Number).into_value());
    }
    math.insert(
        "log",
        native("log", math_log)
            .param("x", Type::Number)
            .optional("base", Type::Number)
            .into_value(),
    );
    math.insert(
        "pow",
        native("pow", math_pow)
            .param("base", Type::Number)
            .param("exponent", Type::Number)
            .into_value(),
    );
    math.insert(
        "atan2",
        native("atan2", math_atan2)
            .param("y", Type::Number)
            .param("x", Type::Number)
            .into_value(),
    );
    math.insert(
        "hypot",
        native("hypot", math_hypot)
            .param("x", Type::Number)
            .param("y", Type::Number)
            .into_value(),
    );
    math.insert("is_nan", native("is_nan", math_is_nan).param("x", Type::Number).into_value());
    math.insert(
        "min",
        native("min", math_min).param("x", Type::Number).rest(Type::Number).into_value(),
    );
    math.insert(
        "max",
        native("max", math_max).param("x", Type::Number).rest(Type::Number).into_value(),
    );
    math
}

fn math_abs(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| Diagnostic::value_error(format!("integer overflow in abs({n})"))),
        other => Ok(Value::Double(expect_number(other, "math.abs")?.abs())),
    }
}

/// Rounding functions return an int; ints pass through unchanged.
fn rounded(value: &Value, name: &str, round: fn(f64) -> f64) -> Eval<Value> {
    let x = match value {
        Value::Int(n) => return Ok(Value::Int(*n)),
        other => expect_number(other, name)?,
    };
    let result = round(x);
    if result.is_finite() && result >= i64::MIN as f64 && result < i64::MAX as f64 {
        Ok(Value::Int(result as i64))
    } else {
        Err(Diagnostic::value_error(format!(
            "`{name}` cannot convert {x:?} to int"
        )))
    }
}

macro_rules! math_functions {
    ($table:ident: $($name:ident => $body:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
                $body(&args[0])
            }
        )*

        const $table: &[(&str, NativeFn)] = &[$((stringify!($name), $name as NativeFn)),*];
    };
}

math_functions! { ROUNDING:
    floor => |x: &Value| rounded(x, "math.floor", f64::floor),
    ceil => |x: &Value| rounded(x, "math.ceil", f64::ceil),
    round => |x: &Value| rounded(x, "math.round", f64::round),
    trunc => |x: &Value| rounded(x, "math.trunc", f64::trunc),
}

fn real(value: &Value, name: &str, apply: fn(f64) -> f64) -> Eval<Value> {
    Ok(Value::Double(apply(expect_number(value, name)?)))
}

math_functions! { UNARY:
    sqrt => |x: &Value| real(x, "math.sqrt", f64::sqrt),
    cbrt => |x: &Value| real(x, "math.cbrt", f64::cbrt),
    exp => |x: &Value| real(x, "math.exp", f64::exp),
    log2 => |x: &Value| real(x, "math.log2", f64::log2),
    log10 => |x: &Value| real(x, "math.log10", f64::log10),
    sin => |x: &Value| real(x, "math.sin", f64::sin),
    cos => |x: &Value| real(x, "math.cos", f64::cos),
    tan => |x: &Value| real(x, "math.tan", f64::tan),
    asin => |x: &Value| real(x, "math.asin", f64::asin),
    acos => |x: &Value| real(x, "math.acos", f64::acos),
    atan => |x: &Value| real(x, "math.atan", f64::atan),
}

fn math_log(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let x = expect_number(&args[0], "math.log")?;
    let result = match args.get(1) {
        Some(base) => x.log(expect_number(base, "math.log")?),
        None => x.ln(),
    };
    Ok(Value::Double(result))
}

fn math_pow(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    operators::binary(BinaryOp::Pow, &args[0], &args[1])
}

fn math_atan2(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let y = expect_number(&args[0], "math.atan2")?;
    let x = expect_number(&args[1], "math.atan2")?;
    Ok(Value::Double(y.atan2(x)))
}

fn math_hypot(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let x = expect_number(&args[0], "math.hypot")?;
    let y = expect_number(&args[1], "math.hypot")?;
    Ok(Value::Double(x.hypot(y)))
}

fn math_is_nan(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(expect_number(&args[0], "math.is_nan")?.is_nan()))
}

fn pick(args: &[Value], name: &str, wanted: std::cmp::Ordering) -> Eval<Value> {
    let mut best = args[0].clone();
    for candidate in &args[1..] {
        if candidate.compare(&best) == Some(wanted) {
            best = candidate.clone();
        } else if candidate.compare(&best).is_none() {
            return Err(Diagnostic::value_error(format!("`{name}` got an unordered value")));
        }
    }
    Ok(best)
}

fn math_min(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    pick(args, "math.min", std::cmp::Ordering::Less)
}

fn math_max(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    pick(args, "math.max", std::cmp::Ordering::Greater)
}
