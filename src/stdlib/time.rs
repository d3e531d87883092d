use std::time::{SystemTime, UNIX_EPOCH};

use super::{expect_number, native, sleep_seconds, Eval, Exports};
use crate::{diagnostics::Diagnostic, runtime::Interpreter, types::Type, value::Value};

pub(crate) fn exports() -> Exports {
    let mut time = Exports::new();
    time.insert("time", native("time", time_time).into_value());
    time.insert("monotonic", native("monotonic", time_monotonic).into_value());
    time.insert(
        "sleep",
        native("sleep", time_sleep).param("seconds", Type::Number).into_value(),
    );
    time
}

/// Seconds since the Unix epoch.
fn time_time(_: &mut Interpreter, _: &[Value]) -> Eval<Value> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| Diagnostic::value_error(format!("system clock is before the epoch: {err}")))?;
    Ok(Value::Double(elapsed.as_secs_f64()))
}

/// Seconds since the interpreter started; never goes backwards.
fn time_monotonic(interp: &mut Interpreter, _: &[Value]) -> Eval<Value> {
    Ok(Value::Double(interp.started.elapsed().as_secs_f64()))
}

fn time_sleep(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    sleep_seconds(expect_number(&args[0], "time.sleep")?)
}
