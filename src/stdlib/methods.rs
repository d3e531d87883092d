use std::{collections::HashMap, rc::Rc};

use indexmap::IndexSet;

use super::{
    collect, expect_dict, expect_list, expect_set, expect_str, files, native,
    prelude::{items_of, keys_of, length, sort_values, values_of},
    Eval,
};
use crate::{
    diagnostics::{Diagnostic, ErrorKind},
    runtime::Interpreter,
    types::Type,
    value::{normalize_index, Function, Handle, Key, NativeFunction, Set, Value},
};

type Table = HashMap<&'static str, Rc<Function>>;

/// Methods of the built-in value kinds, looked up by member access. Each
/// native receives the receiver as its first argument.
pub struct MethodTables {
    list: Table,
    dict: Table,
    set: Table,
    str: Table,
    weak: Table,
    file: Table,
}

impl Default for MethodTables {
    fn default() -> Self {
        Self::new()
    }
}

fn table(functions: Vec<NativeFunction>) -> Table {
    functions
        .into_iter()
        .map(|function| (function.name, function.into_function()))
        .collect()
}

fn list_type() -> Type {
    Type::List(Box::new(Type::Any))
}

fn dict_type() -> Type {
    Type::Dict(Box::new(Type::Any), Box::new(Type::Any))
}

fn set_type() -> Type {
    Type::Set(Box::new(Type::Any))
}

impl MethodTables {
    pub fn new() -> Self {
        let list = table(vec![
            native("append", list_push).param("self", list_type()).param("value", Type::Any),
            native("push", list_push).param("self", list_type()).param("value", Type::Any),
            native("pop", list_pop).param("self", list_type()).optional("index", Type::Int),
            native("insert", list_insert)
                .param("self", list_type())
                .param("index", Type::Int)
                .param("value", Type::Any),
            native("remove", list_remove).param("self", list_type()).param("value", Type::Any),
            native("clear", container_clear).param("self", list_type()),
            native("len", container_len).param("self", list_type()),
            native("contains", container_contains).param("self", list_type()).param("value", Type::Any),
            native("index_of", list_index_of).param("self", list_type()).param("value", Type::Any),
            native("reverse", list_reverse).param("self", list_type()),
            native("sort", list_sort).param("self", list_type()),
            native("extend", list_extend).param("self", list_type()).param("items", Type::Any),
        ]);
        let dict = table(vec![
            native("get", dict_get)
                .param("self", dict_type())
                .param("key", Type::Any)
                .optional("default", Type::Any),
            native("keys", dict_keys).param("self", dict_type()),
            native("values", dict_values).param("self", dict_type()),
            native("items", dict_items).param("self", dict_type()),
            native("contains", container_contains).param("self", dict_type()).param("key", Type::Any),
            native("remove", dict_remove).param("self", dict_type()).param("key", Type::Any),
            native("len", container_len).param("self", dict_type()),
            native("clear", container_clear).param("self", dict_type()),
        ]);
        let set = table(vec![
            native("add", set_add).param("self", set_type()).param("value", Type::Any),
            native("remove", set_remove).param("self", set_type()).param("value", Type::Any),
            native("contains", container_contains).param("self", set_type()).param("value", Type::Any),
            native("len", container_len).param("self", set_type()),
            native("clear", container_clear).param("self", set_type()),
            native("union", set_union).param("self", set_type()).param("other", set_type()),
            native("intersection", set_intersection)
                .param("self", set_type())
                .param("other", set_type()),
        ]);
        let str = table(vec![
            native("len", container_len).param("self", Type::Str),
            native("upper", str_upper).param("self", Type::Str),
            native("lower", str_lower).param("self", Type::Str),
            native("trim", str_trim).param("self", Type::Str),
            native("split", str_split).param("self", Type::Str).optional("separator", Type::Str),
            native("join", str_join).param("self", Type::Str).param("items", list_type()),
            native("replace", str_replace)
                .param("self", Type::Str)
                .param("from", Type::Str)
                .param("to", Type::Str),
            native("find", str_find).param("self", Type::Str).param("needle", Type::Str),
            native("starts_with", str_starts_with).param("self", Type::Str).param("prefix", Type::Str),
            native("ends_with", str_ends_with).param("self", Type::Str).param("suffix", Type::Str),
            native("contains", container_contains).param("self", Type::Str).param("needle", Type::Str),
            native("chars", str_chars).param("self", Type::Str),
        ]);
        let weak = table(vec![
            native("get", weak_get).param("self", Type::Weak),
            native("alive", weak_alive).param("self", Type::Weak),
        ]);
        Self {
            list,
            dict,
            set,
            str,
            weak,
            file: table(files::methods()),
        }
    }

    pub fn lookup(&self, receiver: &Value, name: &str) -> Option<Rc<Function>> {
        let table = match receiver {
            Value::List(_) => &self.list,
            Value::Dict(_) => &self.dict,
            Value::Set(_) => &self.set,
            Value::Str(_) => &self.str,
            Value::Weak(_) => &self.weak,
            Value::Handle(handle) if matches!(**handle, Handle::File(_)) => &self.file,
            _ => return None,
        };
        table.get(name).cloned()
    }
}

fn container_len(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Int(length(&args[0])? as i64))
}

fn container_contains(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    crate::operators::contains(&args[0], &args[1]).map(Value::Bool)
}

fn container_clear(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    match &args[0] {
        Value::List(list) => list.clear()?,
        Value::Dict(dict) => dict.clear()?,
        Value::Set(set) => set.clear()?,
        other => {
            return Err(Diagnostic::type_error(format!(
                "cannot clear a value of type `{}`",
                other.type_name()
            )))
        }
    }
    Ok(Value::Null)
}

fn list_push(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    expect_list(&args[0], "list.push")?.push(args[1].clone())?;
    Ok(Value::Null)
}

fn list_pop(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.pop")?;
    let index = match args.get(1) {
        Some(Value::Int(index)) => Some(normalize_index(*index, list.len())?),
        _ => None,
    };
    list.pop(index)
}

fn list_insert(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.insert")?;
    let len = list.len() as i64;
    let index = match &args[1] {
        Value::Int(index) if *index < 0 => (index + len).max(0),
        Value::Int(index) => (*index).min(len),
        _ => len,
    };
    list.insert(index as usize, args[2].clone())?;
    Ok(Value::Null)
}

fn position(items: &[Value], needle: &Value) -> Eval<Option<usize>> {
    for (index, item) in items.iter().enumerate() {
        if item.try_equals(needle)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn list_remove(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.remove")?;
    let found = position(&list.borrow(), &args[1])?;
    match found {
        Some(index) => {
            list.pop(Some(index))?;
            Ok(Value::Null)
        }
        None => Err(Diagnostic::value_error(format!(
            "{} is not in the list",
            args[1].repr()
        ))),
    }
}

fn list_index_of(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.index_of")?;
    let found = position(&list.borrow(), &args[1])?;
    Ok(Value::Int(found.map_or(-1, |index| index as i64)))
}

fn list_reverse(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.reverse")?;
    let mut items = list.snapshot();
    items.reverse();
    list.replace(items)?;
    Ok(Value::Null)
}

fn list_sort(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.sort")?;
    let mut items = list.snapshot();
    sort_values(&mut items)?;
    list.replace(items)?;
    Ok(Value::Null)
}

fn list_extend(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let list = expect_list(&args[0], "list.extend")?;
    for item in collect(&args[1])? {
        list.push(item)?;
    }
    Ok(Value::Null)
}

fn dict_get(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let dict = expect_dict(&args[0], "dict.get")?;
    let key = Key::new(args[1].clone())?;
    Ok(dict
        .get(&key)
        .unwrap_or_else(|| args.get(2).cloned().unwrap_or(Value::Null)))
}

fn dict_keys(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(keys_of(expect_dict(&args[0], "dict.keys")?))
}

fn dict_values(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(values_of(expect_dict(&args[0], "dict.values")?))
}

fn dict_items(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(items_of(expect_dict(&args[0], "dict.items")?))
}

fn dict_remove(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let dict = expect_dict(&args[0], "dict.remove")?;
    dict.remove(&Key::new(args[1].clone())?)?.ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::Key,
            format!("key {} not found", args[1].repr()),
        )
    })
}

fn set_add(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    expect_set(&args[0], "set.add")?.add(Key::new(args[1].clone())?)?;
    Ok(Value::Null)
}

fn set_remove(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let set = expect_set(&args[0], "set.remove")?;
    if set.remove(&Key::new(args[1].clone())?)? {
        Ok(Value::Null)
    } else {
        Err(Diagnostic::new(
            ErrorKind::Key,
            format!("{} is not in the set", args[1].repr()),
        ))
    }
}

fn set_union(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let left = expect_set(&args[0], "set.union")?;
    let right = expect_set(&args[1], "set.union")?;
    let mut items: IndexSet<Key> = left.borrow().clone();
    items.extend(right.borrow().iter().cloned());
    Ok(Value::Set(Rc::new(Set::new(items))))
}

fn set_intersection(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let left = expect_set(&args[0], "set.intersection")?;
    let right = expect_set(&args[1], "set.intersection")?;
    let right = right.borrow();
    let items: IndexSet<Key> = left
        .borrow()
        .iter()
        .filter(|key| right.contains(*key))
        .cloned()
        .collect();
    Ok(Value::Set(Rc::new(Set::new(items))))
}

fn str_upper(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::str(expect_str(&args[0], "str.upper")?.to_uppercase()))
}

fn str_lower(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::str(expect_str(&args[0], "str.lower")?.to_lowercase()))
}

fn str_trim(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::str(expect_str(&args[0], "str.trim")?.trim()))
}

fn str_split(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[0], "str.split")?;
    let parts: Vec<Value> = match args.get(1) {
        Some(separator) => {
            let separator = expect_str(separator, "str.split")?;
            if separator.is_empty() {
                return Err(Diagnostic::value_error("empty separator"));
            }
            text.split(separator).map(Value::str).collect()
        }
        None => text.split_whitespace().map(Value::str).collect(),
    };
    Ok(Value::list(parts))
}

fn str_join(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let separator = expect_str(&args[0], "str.join")?;
    let items = expect_list(&args[1], "str.join")?;
    let mut parts = Vec::with_capacity(items.len());
    for item in items.borrow().iter() {
        parts.push(expect_str(item, "str.join")?.to_string());
    }
    Ok(Value::str(parts.join(separator)))
}

fn str_replace(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[0], "str.replace")?;
    let from = expect_str(&args[1], "str.replace")?;
    let to = expect_str(&args[2], "str.replace")?;
    Ok(Value::str(text.replace(from, to)))
}

/// Character index of the first occurrence, or -1.
fn str_find(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[0], "str.find")?;
    let needle = expect_str(&args[1], "str.find")?;
    let index = text
        .find(needle)
        .map_or(-1, |byte| text[..byte].chars().count() as i64);
    Ok(Value::Int(index))
}

fn str_starts_with(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[0], "str.starts_with")?;
    Ok(Value::Bool(text.starts_with(expect_str(&args[1], "str.starts_with")?)))
}

fn str_ends_with(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[0], "str.ends_with")?;
    Ok(Value::Bool(text.ends_with(expect_str(&args[1], "str.ends_with")?)))
}

fn str_chars(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::list(collect(&args[0])?))
}

fn weak_get(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    match &args[0] {
        Value::Weak(weak) => Ok(weak.upgrade().unwrap_or(Value::Null)),
        other => Err(Diagnostic::type_error(format!(
            "expected weak but found {}",
            other.type_name()
        ))),
    }
}

fn weak_alive(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    match &args[0] {
        Value::Weak(weak) => Ok(Value::Bool(weak.upgrade().is_some())),
        other => Err(Diagnostic::type_error(format!(
            "expected weak but found {}",
            other.type_name()
        ))),
    }
}
