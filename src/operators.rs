use std::{cmp::Ordering, rc::Rc};

use crate::{
    ast::{BinaryOp, UnaryOp},
    diagnostics::{Diagnostic, ErrorKind},
    value::{normalize_index, slice_bounds, Key, List, Range, Value},
};

type Eval<T> = Result<T, Diagnostic>;

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> Diagnostic {
    Diagnostic::type_error(format!(
        "unsupported operand types for `{}`: `{}` and `{}`",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

pub fn unary(op: UnaryOp, operand: &Value) -> Eval<Value> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Negate, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Diagnostic::value_error(format!("integer overflow negating {n}"))),
        (UnaryOp::Negate, Value::Double(n)) => Ok(Value::Double(-n)),
        (UnaryOp::Negate, other) => Err(Diagnostic::type_error(format!(
            "bad operand type for unary `-`: `{}`",
            other.type_name()
        ))),
    }
}

/// Every binary operator except the short-circuiting `&&` and `||`, which
/// the interpreter evaluates itself.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Eval<Value> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(left.try_equals(right)?)),
        BinaryOp::NotEqual => Ok(Value::Bool(!left.try_equals(right)?)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            compare(op, left, right)
        }
        BinaryOp::In => contains(right, left).map(Value::Bool),
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::Add => add(left, right),
        BinaryOp::Mul => multiply(left, right),
        BinaryOp::Sub | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow => numeric(op, left, right),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Eval<Value> {
    let ordering = match left.try_compare(right)? {
        Some(ordering) => ordering,
        None if is_number(left) && is_number(right) => return Ok(Value::Bool(false)),
        None => {
            return Err(Diagnostic::type_error(format!(
                "cannot compare `{}` with `{}`",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    let result = match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEqual => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Double(_))
}

fn as_double(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Double(n) => Some(*n),
        _ => None,
    }
}

fn add(left: &Value, right: &Value) -> Eval<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            let mut text = String::with_capacity(a.len() + b.len());
            text.push_str(a);
            text.push_str(b);
            Ok(Value::str(text))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.snapshot();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        _ => numeric(BinaryOp::Add, left, right),
    }
}

/// Upper bound on the bytes or items a single repetition may produce.
const MAX_REPEAT_LEN: usize = 1 << 30;

/// Negative counts, and empty sequences, repeat zero times.
fn repeat_count(len: usize, count: i64) -> Eval<usize> {
    let times = usize::try_from(count).unwrap_or(0);
    match len.checked_mul(times) {
        Some(0) => Ok(0),
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(Diagnostic::value_error(format!(
            "repeating a sequence of length {len} by {count} is too large"
        ))),
    }
}

fn multiply(left: &Value, right: &Value) -> Eval<Value> {
    match (left, right) {
        (Value::Str(text), Value::Int(count)) | (Value::Int(count), Value::Str(text)) => {
            Ok(Value::str(text.repeat(repeat_count(text.len(), *count)?)))
        }
        (Value::List(list), Value::Int(count)) | (Value::Int(count), Value::List(list)) => {
            let items = list.borrow();
            let times = repeat_count(items.len(), *count)?;
            let mut repeated = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                repeated.extend(items.iter().cloned());
            }
            Ok(Value::list(repeated))
        }
        _ => numeric(BinaryOp::Mul, left, right),
    }
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Eval<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => integer(op, *a, *b),
        _ => match (as_double(left), as_double(right)) {
            (Some(a), Some(b)) => Ok(Value::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => a.powf(b),
            })),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

fn integer(op: BinaryOp, a: i64, b: i64) -> Eval<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => {
            return Err(Diagnostic::value_error("integer division by zero"));
        }
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod => a.checked_rem(b),
        _ if b < 0 => return Ok(Value::Double((a as f64).powf(b as f64))),
        _ => u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)),
    };
    result.map(Value::Int).ok_or_else(|| {
        Diagnostic::value_error(format!("integer overflow in `{a} {} {b}`", op.symbol()))
    })
}

/// Membership test behind the `in` operator.
pub fn contains(container: &Value, item: &Value) -> Eval<bool> {
    match container {
        Value::Str(text) => match item {
            Value::Str(needle) => Ok(text.contains(&**needle)),
            other => Err(Diagnostic::type_error(format!(
                "`in <str>` requires a str operand, not `{}`",
                other.type_name()
            ))),
        },
        Value::List(list) => {
            for candidate in list.borrow().iter() {
                if candidate.try_equals(item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Dict(dict) => Ok(dict.borrow().contains_key(&Key::new(item.clone())?)),
        Value::Set(set) => Ok(set.borrow().contains(&Key::new(item.clone())?)),
        Value::Range(range) => Ok(match item {
            Value::Int(n) => range.contains(*n),
            Value::Double(n) if n.fract() == 0.0 => range.contains(*n as i64),
            _ => false,
        }),
        other => Err(Diagnostic::type_error(format!(
            "value of type `{}` is not a container",
            other.type_name()
        ))),
    }
}

fn int_index(index: &Value, what: &str) -> Eval<i64> {
    match index {
        Value::Int(n) => Ok(*n),
        other => Err(Diagnostic::type_error(format!(
            "{what} indices must be int, not `{}`",
            other.type_name()
        ))),
    }
}

pub fn index(target: &Value, index: &Value) -> Eval<Value> {
    match target {
        Value::List(list) => {
            let items = list.borrow();
            let position = normalize_index(int_index(index, "list")?, items.len())?;
            Ok(items[position].clone())
        }
        Value::Str(text) => {
            let position = int_index(index, "str")?;
            let count = text.chars().count();
            let position = normalize_index(position, count)?;
            let ch = text.chars().nth(position).unwrap_or_default();
            Ok(Value::str(ch.to_string()))
        }
        Value::Range(range) => {
            let position = normalize_index(int_index(index, "range")?, range.len())?;
            Ok(range.get(position).map_or(Value::Null, Value::Int))
        }
        Value::Dict(dict) => {
            let key = Key::new(index.clone())?;
            dict.get(&key).ok_or_else(|| {
                Diagnostic::new(ErrorKind::Key, format!("key {} not found", index.repr()))
            })
        }
        other => Err(Diagnostic::type_error(format!(
            "value of type `{}` is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_index(target: &Value, index: &Value, value: Value) -> Eval<()> {
    match target {
        Value::List(list) => {
            let position = normalize_index(int_index(index, "list")?, list.len())?;
            list.set(position, value)
        }
        Value::Dict(dict) => dict.insert(Key::new(index.clone())?, value),
        other => Err(Diagnostic::type_error(format!(
            "value of type `{}` does not support item assignment",
            other.type_name()
        ))),
    }
}

fn bound(value: Option<&Value>) -> Eval<Option<i64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Int(n)) => Ok(Some(*n)),
        Some(other) => Err(Diagnostic::type_error(format!(
            "slice bounds must be int or null, not `{}`",
            other.type_name()
        ))),
    }
}

pub fn slice(
    target: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    stride: Option<&Value>,
) -> Eval<Value> {
    let (lower, upper, stride) = (bound(lower)?, bound(upper)?, bound(stride)?);
    let positions = |len: usize| -> Eval<Vec<usize>> {
        let (first, step, count) = slice_bounds(len, lower, upper, stride)?;
        let step = i128::from(step);
        Ok((0..count as i128).map(|k| (first + k * step) as usize).collect())
    };
    match target {
        Value::List(list) => {
            let items = list.borrow();
            let selected = positions(items.len())?
                .into_iter()
                .map(|position| items[position].clone())
                .collect();
            Ok(Value::List(Rc::new(List::new(selected))))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let selected: String = positions(chars.len())?
                .into_iter()
                .map(|position| chars[position])
                .collect();
            Ok(Value::str(selected))
        }
        Value::Range(range) => {
            let (first, step, count) = slice_bounds(range.len(), lower, upper, stride)?;
            let start = range.start as i128 + first * range.step as i128;
            let step = range.step as i128 * step as i128;
            let stop = start + count as i128 * step;
            let narrow = |n: i128| {
                i64::try_from(n).map_err(|_| Diagnostic::value_error("range slice out of bounds"))
            };
            Ok(Value::Range(Range::new(narrow(start)?, narrow(stop)?, narrow(step)?)?))
        }
        other => Err(Diagnostic::type_error(format!(
            "value of type `{}` cannot be sliced",
            other.type_name()
        ))),
    }
}
