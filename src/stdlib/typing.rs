use super::{expect_str, native, Eval, Exports};
use crate::{
    parser,
    runtime::Interpreter,
    types::{self, Type},
    value::Value,
};

pub(crate) fn exports() -> Exports {
    let mut typing = Exports::new();
    typing.insert(
        "check",
        native("check", typing_check)
            .param("value", Type::Any)
            .param("type_text", Type::Str)
            .into_value(),
    );
    typing.insert(
        "type_of",
        native("type_of", typing_type_of).param("value", Type::Any).into_value(),
    );
    typing.insert(
        "parse",
        native("parse", typing_parse).param("type_text", Type::Str).into_value(),
    );
    typing
}

/// Resolves the annotation in the caller's scope, so custom types are visible.
fn typing_check(interp: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let text = expect_str(&args[1], "typing.check")?;
    let expr = parser::parse_type(text)?;
    let ty = types::resolve(&expr, &interp.env)?;
    Ok(Value::Bool(ty.accepts(&args[0])))
}

fn typing_type_of(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::str(types::infer(&args[0]).to_string()))
}

fn typing_parse(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let expr = parser::parse_type(expect_str(&args[0], "typing.parse")?)?;
    Ok(Value::str(expr.to_string()))
}
