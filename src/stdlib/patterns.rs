//! Script-facing `regex` module.

use std::rc::Rc;

use regex::Regex;

use super::{expect_str, native, Eval, Exports};
use crate::{
    diagnostics::Diagnostic,
    runtime::Interpreter,
    types::Type,
    value::{Handle, NativeFn, Value},
};

pub(crate) fn exports() -> Exports {
    let mut patterns = Exports::new();
    patterns.insert(
        "compile",
        native("compile", regex_compile).param("pattern", Type::Str).into_value(),
    );
    let matchers: [(&'static str, NativeFn); 5] = [
        ("is_match", regex_is_match),
        ("match", regex_match),
        ("search", regex_search),
        ("find_all", regex_find_all),
        ("split", regex_split),
    ];
    for (name, callback) in matchers {
        patterns.insert(
            name,
            native(name, callback)
                .param("re", pattern_type())
                .param("text", Type::Str)
                .into_value(),
        );
    }
    patterns.insert(
        "replace",
        native("replace", regex_replace)
            .param("re", pattern_type())
            .param("text", Type::Str)
            .param("replacement", Type::Str)
            .into_value(),
    );
    patterns
}

fn pattern_type() -> Type {
    Type::Union(vec![Type::Regex, Type::Str])
}

fn compile(pattern: &str) -> Eval<Regex> {
    Regex::new(pattern)
        .map_err(|err| Diagnostic::value_error(format!("invalid regular expression: {err}")))
}

/// Accepts either a compiled handle or a pattern string.
fn regex_arg(value: &Value, name: &str) -> Eval<Rc<Handle>> {
    match value {
        Value::Handle(handle) if matches!(**handle, Handle::Regex(_)) => Ok(Rc::clone(handle)),
        other => Ok(Rc::new(Handle::Regex(compile(expect_str(other, name)?)?))),
    }
}

fn with_regex<T>(value: &Value, name: &str, body: impl FnOnce(&Regex) -> Eval<T>) -> Eval<T> {
    let handle = regex_arg(value, name)?;
    match &*handle {
        Handle::Regex(regex) => body(regex),
        _ => Err(Diagnostic::type_error(format!("`{name}` expected a regex"))),
    }
}

fn groups(captures: &regex::Captures<'_>) -> Value {
    Value::list(
        captures
            .iter()
            .map(|group| group.map_or(Value::Null, |m| Value::str(m.as_str())))
            .collect(),
    )
}

fn regex_compile(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let pattern = expect_str(&args[0], "regex.compile")?;
    Ok(Value::Handle(Rc::new(Handle::Regex(compile(pattern)?))))
}

fn regex_is_match(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "regex.is_match")?;
    with_regex(&args[0], "regex.is_match", |regex| {
        Ok(Value::Bool(regex.is_match(text)))
    })
}

/// Whole-string match: the groups, or `null` when the text does not match.
fn regex_match(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "regex.match")?;
    with_regex(&args[0], "regex.match", |regex| {
        let anchored = compile(&format!("^(?:{})$", regex.as_str()))?;
        Ok(anchored
            .captures(text)
            .map_or(Value::Null, |captures| groups(&captures)))
    })
}

fn regex_search(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "regex.search")?;
    with_regex(&args[0], "regex.search", |regex| {
        Ok(regex
            .captures(text)
            .map_or(Value::Null, |captures| groups(&captures)))
    })
}

fn regex_find_all(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "regex.find_all")?;
    with_regex(&args[0], "regex.find_all", |regex| {
        Ok(Value::list(
            regex
                .find_iter(text)
                .map(|found| Value::str(found.as_str()))
                .collect(),
        ))
    })
}

fn regex_split(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "regex.split")?;
    with_regex(&args[0], "regex.split", |regex| {
        Ok(Value::list(regex.split(text).map(Value::str).collect()))
    })
}

fn regex_replace(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "regex.replace")?;
    let replacement = expect_str(&args[2], "regex.replace")?;
    with_regex(&args[0], "regex.replace", |regex| {
        Ok(Value::str(regex.replace_all(text, replacement)))
    })
}
