use std::{
    cmp::Ordering,
    io::{self, Write},
    rc::Rc,
};

use indexmap::{IndexMap, IndexSet};

use super::{
    collect, expect_dict, expect_int, expect_list, expect_str, files, formatting, native,
    os::io_error, Eval,
};
use crate::{
    ast::BinaryOp,
    config::Config,
    diagnostics::{Diagnostic, ErrorKind},
    environment::{Binding, EnvironmentRef},
    operators,
    runtime::Interpreter,
    types::Type,
    value::{Dict, Key, List, NativeFn, NativeFunction, Range, Set, Value, WeakRef},
};

/// Containers nested deeper than this are assumed to be cyclic.
const MAX_FREEZE_DEPTH: usize = 256;

pub fn install(env: &EnvironmentRef, config: &Config) {
    let mut scope = env.borrow_mut();
    for function in functions() {
        let name = function.name;
        scope.insert(
            name,
            Binding {
                value: function.into_value(),
                constant: false,
                declared: None,
            },
        );
    }
    for (name, callback) in ERROR_CONSTRUCTORS {
        let function = native(*name, *callback)
            .param("message", Type::Str)
            .optional("cause", optional_error());
        scope.insert(
            *name,
            Binding {
                value: function.into_value(),
                constant: false,
                declared: None,
            },
        );
    }
    let args = config.args.iter().map(Value::str).collect();
    scope.insert(
        "args",
        Binding {
            value: Value::list(args),
            constant: true,
            declared: None,
        },
    );
}

fn optional_error() -> Type {
    Type::Union(vec![Type::Error, Type::Null])
}

fn iterable() -> Type {
    Type::Union(vec![
        Type::List(Box::new(Type::Any)),
        Type::Dict(Box::new(Type::Any), Box::new(Type::Any)),
        Type::Set(Box::new(Type::Any)),
        Type::Str,
        Type::Range,
    ])
}

fn functions() -> Vec<NativeFunction> {
    vec![
        native("print", io_print).rest(Type::Any),
        native("eprint", io_eprint).rest(Type::Any),
        native("input", io_input).optional("prompt", Type::Str),
        native("open", files::file_open)
            .param("path", Type::Str)
            .optional("mode", Type::Str),
        native("format", text_format)
            .param("template", Type::Str)
            .rest(Type::Any),
        native("len", value_len).param("value", Type::Any),
        native("type_str", value_type_str).param("value", Type::Any),
        native("str", convert_str).param("value", Type::Any),
        native("int", convert_int).param("value", Type::Any),
        native("double", convert_double).param("value", Type::Any),
        native("bool", convert_bool).param("value", Type::Any),
        native("list", make_list).optional("items", iterable()),
        native("dict", make_dict).optional("pairs", Type::List(Box::new(Type::Any))),
        native("set", make_set).optional("items", iterable()),
        native("range", make_range)
            .param("start", Type::Int)
            .optional("stop", Type::Int)
            .optional("step", Type::Int),
        native("append", list_append)
            .param("list", Type::List(Box::new(Type::Any)))
            .param("value", Type::Any),
        native("keys", dict_keys).param("dict", Type::Dict(Box::new(Type::Any), Box::new(Type::Any))),
        native("values", dict_values).param("dict", Type::Dict(Box::new(Type::Any), Box::new(Type::Any))),
        native("items", dict_items).param("dict", Type::Dict(Box::new(Type::Any), Box::new(Type::Any))),
        native("sorted", seq_sorted).param("items", iterable()),
        native("reversed", seq_reversed).param("items", iterable()),
        native("min", seq_min).param("first", Type::Any).rest(Type::Any),
        native("max", seq_max).param("first", Type::Any).rest(Type::Any),
        native("sum", seq_sum)
            .param("items", iterable())
            .optional("start", Type::Number),
        native("clone", value_clone).param("value", Type::Any),
        native("freeze", value_freeze).param("value", Type::Any),
        native("weak", value_weak).param("target", Type::Any),
        native("assert", value_assert)
            .param("condition", Type::Any)
            .optional("message", Type::Str),
        native("error", error_new)
            .param("kind", Type::Str)
            .param("message", Type::Str)
            .optional("cause", optional_error()),
        native("arg", script_arg).param("index", Type::Int),
        native("version", script_version),
    ]
}

fn io_print(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let line: Vec<String> = args.iter().map(Value::display).collect();
    println!("{}", line.join(" "));
    Ok(Value::Null)
}

fn io_eprint(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let line: Vec<String> = args.iter().map(Value::display).collect();
    eprintln!("{}", line.join(" "));
    Ok(Value::Null)
}

fn io_input(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    if let Some(prompt) = args.first() {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt.display())
            .and_then(|_| stdout.flush())
            .map_err(|err| io_error("input", "<stdout>", err))?;
    }
    let mut line = String::new();
    let read = io::stdin()
        .read_line(&mut line)
        .map_err(|err| io_error("input", "<stdin>", err))?;
    if read == 0 {
        return Ok(Value::Null);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(Value::str(trimmed))
}

fn text_format(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let template = expect_str(&args[0], "format")?;
    formatting::format_text(template, &args[1..]).map(Value::str)
}

pub(crate) fn length(value: &Value) -> Eval<usize> {
    Ok(match value {
        Value::Str(text) => text.chars().count(),
        Value::List(list) => list.len(),
        Value::Dict(dict) => dict.len(),
        Value::Set(set) => set.len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(Diagnostic::type_error(format!(
                "value of type `{}` has no length",
                other.type_name()
            )))
        }
    })
}

fn value_len(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Int(length(&args[0])? as i64))
}

fn value_type_str(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::str(args[0].type_name()))
}

fn convert_str(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(match &args[0] {
        Value::Str(_) => args[0].clone(),
        other => Value::str(other.display()),
    })
}

fn convert_int(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Double(n) => {
            let truncated = n.trunc();
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(Diagnostic::value_error(format!("cannot convert {n:?} to int")))
            }
        }
        Value::Str(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Diagnostic::value_error(format!("invalid int literal {:?}", &**text))),
        other => Err(Diagnostic::type_error(format!(
            "cannot convert a value of type `{}` to int",
            other.type_name()
        ))),
    }
}

fn convert_double(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Double(*n as f64)),
        Value::Double(n) => Ok(Value::Double(*n)),
        Value::Bool(b) => Ok(Value::Double(if *b { 1.0 } else { 0.0 })),
        Value::Str(text) => text
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| Diagnostic::value_error(format!("invalid double literal {:?}", &**text))),
        other => Err(Diagnostic::type_error(format!(
            "cannot convert a value of type `{}` to double",
            other.type_name()
        ))),
    }
}

fn convert_bool(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(args[0].is_truthy()))
}

fn make_list(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let items = match args.first() {
        Some(items) => collect(items)?,
        None => Vec::new(),
    };
    Ok(Value::list(items))
}

fn make_dict(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut entries = IndexMap::new();
    if let Some(pairs) = args.first() {
        for pair in expect_list(pairs, "dict")?.snapshot() {
            let items = match &pair {
                Value::List(items) if items.len() == 2 => items.snapshot(),
                other => {
                    return Err(Diagnostic::value_error(format!(
                        "`dict` expects [key, value] pairs, found {}",
                        other.repr()
                    )))
                }
            };
            let mut items = items.into_iter();
            if let (Some(key), Some(value)) = (items.next(), items.next()) {
                entries.insert(Key::new(key)?, value);
            }
        }
    }
    Ok(Value::Dict(Rc::new(Dict::new(entries))))
}

fn make_set(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut items = IndexSet::new();
    if let Some(source) = args.first() {
        for item in collect(source)? {
            items.insert(Key::new(item)?);
        }
    }
    Ok(Value::Set(Rc::new(Set::new(items))))
}

fn make_range(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let first = expect_int(&args[0], "range")?;
    let range = match (args.get(1), args.get(2)) {
        (None, _) => Range::new(0, first, 1)?,
        (Some(stop), None) => Range::new(first, expect_int(stop, "range")?, 1)?,
        (Some(stop), Some(step)) => Range::new(
            first,
            expect_int(stop, "range")?,
            expect_int(step, "range")?,
        )?,
    };
    Ok(Value::Range(range))
}

fn list_append(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    expect_list(&args[0], "append")?.push(args[1].clone())?;
    Ok(args[0].clone())
}

pub(crate) fn keys_of(dict: &Dict) -> Value {
    Value::list(dict.borrow().keys().map(|key| key.value().clone()).collect())
}

pub(crate) fn values_of(dict: &Dict) -> Value {
    Value::list(dict.borrow().values().cloned().collect())
}

pub(crate) fn items_of(dict: &Dict) -> Value {
    Value::list(
        dict.borrow()
            .iter()
            .map(|(key, value)| Value::list(vec![key.value().clone(), value.clone()]))
            .collect(),
    )
}

fn dict_keys(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(keys_of(expect_dict(&args[0], "keys")?))
}

fn dict_values(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(values_of(expect_dict(&args[0], "values")?))
}

fn dict_items(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(items_of(expect_dict(&args[0], "items")?))
}

/// Sorts with the language ordering; incomparable elements are a type error.
pub(crate) fn sort_values(items: &mut [Value]) -> Eval<()> {
    let mut failure = None;
    items.sort_by(|a, b| match a.try_compare(b) {
        Ok(Some(ordering)) => ordering,
        outcome => {
            if failure.is_none() {
                failure = Some(outcome.err().unwrap_or_else(|| {
                    Diagnostic::type_error(format!(
                        "cannot compare `{}` with `{}`",
                        a.type_name(),
                        b.type_name()
                    ))
                }));
            }
            Ordering::Equal
        }
    });
    match failure {
        Some(diag) => Err(diag),
        None => Ok(()),
    }
}

fn seq_sorted(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut items = collect(&args[0])?;
    sort_values(&mut items)?;
    Ok(Value::list(items))
}

fn seq_reversed(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut items = collect(&args[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn extremum(args: &[Value], name: &str, wanted: Ordering) -> Eval<Value> {
    let items = if args.len() == 1 {
        collect(&args[0])?
    } else {
        args.to_vec()
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => match item.try_compare(&current)? {
                Some(ordering) if ordering == wanted => item,
                Some(_) => current,
                None => {
                    return Err(Diagnostic::type_error(format!(
                        "`{name}` cannot compare `{}` with `{}`",
                        item.type_name(),
                        current.type_name()
                    )))
                }
            },
        });
    }
    best.ok_or_else(|| Diagnostic::value_error(format!("`{name}` of an empty sequence")))
}

fn seq_min(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    extremum(args, "min", Ordering::Less)
}

fn seq_max(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    extremum(args, "max", Ordering::Greater)
}

fn seq_sum(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    for item in collect(&args[0])? {
        total = operators::binary(BinaryOp::Add, &total, &item)?;
    }
    Ok(total)
}

/// Shallow copy of a container; the copy is mutable and untyped.
pub(crate) fn shallow_clone(value: &Value) -> Value {
    match value {
        Value::List(list) => Value::list(list.snapshot()),
        Value::Dict(dict) => Value::Dict(Rc::new(Dict::new(dict.borrow().clone()))),
        Value::Set(set) => Value::Set(Rc::new(Set::new(set.borrow().clone()))),
        other => other.clone(),
    }
}

fn value_clone(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(shallow_clone(&args[0]))
}

/// Deep frozen copy. Frozen containers are hashable.
pub(crate) fn freeze(value: &Value, depth: usize) -> Eval<Value> {
    if depth > MAX_FREEZE_DEPTH {
        return Err(Diagnostic::value_error(
            "cannot freeze a structure nested this deeply (is it cyclic?)",
        ));
    }
    Ok(match value {
        Value::List(list) => {
            let items = list
                .borrow()
                .iter()
                .map(|item| freeze(item, depth + 1))
                .collect::<Eval<Vec<_>>>()?;
            Value::List(Rc::new(List::frozen(items)))
        }
        Value::Dict(dict) => {
            let mut entries = IndexMap::new();
            for (key, item) in dict.borrow().iter() {
                entries.insert(
                    Key::new(freeze(key.value(), depth + 1)?)?,
                    freeze(item, depth + 1)?,
                );
            }
            Value::Dict(Rc::new(Dict::frozen(entries)))
        }
        Value::Set(set) => {
            let mut items = IndexSet::new();
            for key in set.borrow().iter() {
                items.insert(Key::new(freeze(key.value(), depth + 1)?)?);
            }
            Value::Set(Rc::new(Set::frozen(items)))
        }
        other => other.clone(),
    })
}

fn value_freeze(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    freeze(&args[0], 0)
}

fn value_weak(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    WeakRef::new(&args[0]).map(Value::Weak).ok_or_else(|| {
        Diagnostic::type_error(format!(
            "cannot create a weak reference to a value of type `{}`",
            args[0].type_name()
        ))
    })
}

fn value_assert(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    if args[0].is_truthy() {
        return Ok(Value::Null);
    }
    let message = match args.get(1) {
        Some(message) => format!("assertion failed: {}", message.display()),
        None => "assertion failed".to_string(),
    };
    Err(Diagnostic::value_error(message))
}

fn make_error(kind: ErrorKind, message: &Value, cause: Option<&Value>) -> Eval<Value> {
    let mut diag = Diagnostic::new(kind, expect_str(message, kind.name())?);
    if let Some(Value::Error(cause)) = cause {
        diag = diag.with_cause((**cause).clone());
    }
    Ok(Value::error(diag))
}

fn error_new(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let name = expect_str(&args[0], "error")?;
    let kind = ErrorKind::from_name(name)
        .ok_or_else(|| Diagnostic::value_error(format!("unknown error kind `{name}`")))?;
    make_error(kind, &args[1], args.get(2))
}

macro_rules! error_constructors {
    ($($name:ident => $kind:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
                make_error($kind, &args[0], args.get(1))
            }
        )*

        const ERROR_CONSTRUCTORS: &[(&str, NativeFn)] = &[$((stringify!($name), $name as NativeFn)),*];
    };
}

error_constructors! {
    undefined_error => ErrorKind::Undefined,
    const_error => ErrorKind::Const,
    identifier_not_found => ErrorKind::IdentifierNotFound,
    identifier_already_exists => ErrorKind::IdentifierAlreadyExists,
    value_error => ErrorKind::Value,
    key_error => ErrorKind::Key,
    index_error => ErrorKind::Index,
    import_error => ErrorKind::Import,
    syntax_error => ErrorKind::Syntax,
    os_error => ErrorKind::Os,
    type_error => ErrorKind::Type,
}

fn script_arg(interpreter: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let index = expect_int(&args[0], "arg")?;
    let value = usize::try_from(index)
        .ok()
        .and_then(|index| interpreter.config().args.get(index))
        .map_or(Value::Null, Value::str);
    Ok(value)
}

fn script_version(_: &mut Interpreter, _: &[Value]) -> Eval<Value> {
    Ok(Value::str(env!("CARGO_PKG_VERSION")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_is_deep_and_hashable() {
        let inner = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![inner]);
        let frozen = freeze(&outer, 0).expect("freeze");
        let Value::List(list) = &frozen else {
            panic!("expected a list");
        };
        assert!(list.is_frozen());
        assert!(matches!(&list.borrow()[0], Value::List(inner) if inner.is_frozen()));
        assert!(Key::new(frozen.clone()).is_ok());
    }
}
