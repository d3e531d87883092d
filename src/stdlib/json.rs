use indexmap::IndexMap;
use serde_json::{Map, Number};

use super::{expect_int, expect_str, native, Eval, Exports};
use crate::{
    diagnostics::Diagnostic,
    runtime::Interpreter,
    types::Type,
    value::{Dict, Key, Value},
};

use std::rc::Rc;

const MAX_DEPTH: usize = 256;

pub(crate) fn exports() -> Exports {
    let mut json = Exports::new();
    json.insert(
        "dump",
        native("dump", json_dump)
            .param("value", Type::Any)
            .optional("indent", Type::Int)
            .into_value(),
    );
    json.insert("load", native("load", json_load).param("text", Type::Str).into_value());
    json
}

fn json_dump(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let document = to_json(&args[0], 0)?;
    let text = match args.get(1) {
        None | Some(Value::Null) => document.to_string(),
        Some(indent) => {
            let width = expect_int(indent, "json.dump")?;
            if width < 0 {
                return Err(Diagnostic::value_error("json indent must not be negative"));
            }
            let pretty = serde_json::to_string_pretty(&document)
                .map_err(|err| Diagnostic::value_error(err.to_string()))?;
            reindent(&pretty, width as usize)
        }
    };
    Ok(Value::str(text))
}

fn json_load(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[0], "json.load")?;
    let document: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| Diagnostic::value_error(format!("invalid json: {err}")))?;
    from_json(document)
}

/// `to_string_pretty` indents by two spaces per level; rescale to `width`.
fn reindent(pretty: &str, width: usize) -> String {
    let lines: Vec<String> = pretty
        .lines()
        .map(|line| {
            let body = line.trim_start_matches(' ');
            let level = (line.len() - body.len()) / 2;
            format!("{}{body}", " ".repeat(level * width))
        })
        .collect();
    lines.join("\n")
}

fn to_json(value: &Value, depth: usize) -> Eval<serde_json::Value> {
    if depth > MAX_DEPTH {
        return Err(Diagnostic::value_error("value is nested too deeply for json"));
    }
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Double(n) => match Number::from_f64(*n) {
            Some(number) => serde_json::Value::Number(number),
            None => {
                return Err(Diagnostic::value_error(format!(
                    "{n:?} is not representable in json"
                )))
            }
        },
        Value::Str(text) => serde_json::Value::String(text.to_string()),
        Value::List(list) => serde_json::Value::Array(
            list.snapshot()
                .iter()
                .map(|item| to_json(item, depth + 1))
                .collect::<Eval<_>>()?,
        ),
        Value::Dict(dict) => {
            let entries: Vec<(Key, Value)> = dict
                .borrow()
                .iter()
                .map(|(key, item)| (key.clone(), item.clone()))
                .collect();
            let mut object = Map::new();
            for (key, item) in entries {
                let Value::Str(name) = key.value() else {
                    return Err(Diagnostic::value_error(format!(
                        "json object keys must be str, found {}",
                        key.value().type_name()
                    )));
                };
                object.insert(name.to_string(), to_json(&item, depth + 1)?);
            }
            serde_json::Value::Object(object)
        }
        other => {
            return Err(Diagnostic::value_error(format!(
                "value of type `{}` is not representable in json",
                other.type_name()
            )))
        }
    })
}

fn from_json(document: serde_json::Value) -> Eval<Value> {
    Ok(match document {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(n) => Value::Int(n),
            None => Value::Double(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(text) => Value::str(text),
        serde_json::Value::Array(items) => Value::list(
            items
                .into_iter()
                .map(from_json)
                .collect::<Eval<Vec<_>>>()?,
        ),
        serde_json::Value::Object(object) => {
            let mut entries = IndexMap::with_capacity(object.len());
            for (name, item) in object {
                entries.insert(Key::new(Value::str(name))?, from_json(item)?);
            }
            Value::Dict(Rc::new(Dict::new(entries)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindent_rescales_levels() {
        let pretty = "{\n  \"a\": [\n    1\n  ]\n}";
        assert_eq!(reindent(pretty, 4), "{\n    \"a\": [\n        1\n    ]\n}");
        assert_eq!(reindent(pretty, 0), "{\n\"a\": [\n1\n]\n}");
    }

    #[test]
    fn integers_stay_integers() {
        let document: serde_json::Value = serde_json::from_str("[1, 2.5, -3]").unwrap();
        let value = from_json(document).unwrap();
        assert_eq!(value.repr(), "[1, 2.5, -3]");
    }

    #[test]
    fn nan_is_not_representable() {
        assert!(to_json(&Value::Double(f64::NAN), 0).is_err());
    }
}
