//! Built-in functions, methods of built-in values and the importable
//! built-in modules.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    config::Config,
    diagnostics::Diagnostic,
    environment::{Binding, Environment, EnvironmentRef},
    modules::Module,
    value::{Dict, List, NativeFn, NativeFunction, Set, Value},
};

pub mod errors;
pub mod files;
pub mod formatting;
pub mod json;
pub mod math;
pub mod methods;
pub mod os;
pub mod patterns;
pub mod prelude;
pub mod threading;
pub mod time;
pub mod typing;

pub(crate) type Eval<T> = Result<T, Diagnostic>;

/// Names exported by a built-in module, in declaration order.
pub(crate) type Exports = IndexMap<&'static str, Value>;

pub fn install_prelude(env: &EnvironmentRef, config: &Config) {
    prelude::install(env, config);
}

/// Builds a fresh instance of the built-in module called `name`.
pub fn builtin_module(name: &str) -> Option<Module> {
    let exports = match name {
        "math" => math::exports(),
        "json" => json::exports(),
        "os" => os::exports(),
        "regex" => patterns::exports(),
        "time" => time::exports(),
        "threading" => threading::exports(),
        "typing" => typing::exports(),
        "error_type" => errors::exports(),
        _ => return None,
    };
    Some(module(name, exports))
}

pub(crate) fn module(name: &str, exports: Exports) -> Module {
    let env = Environment::new();
    {
        let mut scope = env.borrow_mut();
        for (export, value) in exports {
            scope.insert(
                export,
                Binding {
                    value,
                    constant: true,
                    declared: None,
                },
            );
        }
    }
    Module::new(name, None, env)
}

pub(crate) fn native(name: &'static str, callback: NativeFn) -> NativeFunction {
    NativeFunction::new(name, callback)
}

pub(crate) fn expect_str<'a>(value: &'a Value, name: &str) -> Eval<&'a str> {
    match value {
        Value::Str(text) => Ok(&**text),
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected str but found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_int(value: &Value, name: &str) -> Eval<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected int but found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_number(value: &Value, name: &str) -> Eval<f64> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Double(n) => Ok(*n),
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected number but found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_list<'a>(value: &'a Value, name: &str) -> Eval<&'a Rc<List>> {
    match value {
        Value::List(list) => Ok(list),
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected list but found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_dict<'a>(value: &'a Value, name: &str) -> Eval<&'a Rc<Dict>> {
    match value {
        Value::Dict(dict) => Ok(dict),
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected dict but found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_set<'a>(value: &'a Value, name: &str) -> Eval<&'a Rc<Set>> {
    match value {
        Value::Set(set) => Ok(set),
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected set but found {}",
            other.type_name()
        ))),
    }
}

/// Collects every element of an iterable value.
pub(crate) fn collect(value: &Value) -> Eval<Vec<Value>> {
    Ok(value.iterate()?.collect())
}

pub(crate) fn sleep_seconds(seconds: f64) -> Eval<Value> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Diagnostic::value_error(
            "sleep duration must be a non-negative number of seconds",
        ));
    }
    std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
    Ok(Value::Null)
}
