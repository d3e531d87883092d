use std::{
    env, fs, io,
    path::{Path, PathBuf, MAIN_SEPARATOR_STR},
    process,
    rc::Rc,
};

use super::{expect_str, module, native, Eval, Exports};
use crate::{
    diagnostics::{Diagnostic, ErrorKind},
    runtime::Interpreter,
    types::Type,
    value::{NativeFn, Value},
};

/// Wraps a host I/O failure as an `os_error` carrying the OS error code.
pub(crate) fn io_error(name: &str, path: &str, err: io::Error) -> Diagnostic {
    let diagnostic = Diagnostic::new(ErrorKind::Os, format!("`{name}` failed for `{path}`: {err}"));
    match err.raw_os_error() {
        Some(code) => diagnostic.with_note(format!("os error code: {code}")),
        None => diagnostic,
    }
}

pub(crate) fn exports() -> Exports {
    let mut os = Exports::new();
    os.insert(
        "getenv",
        native("getenv", os_getenv).param("name", Type::Str).into_value(),
    );
    os.insert("current_dir", native("current_dir", os_current_dir).into_value());
    os.insert(
        "list_dir",
        native("list_dir", os_list_dir).optional("path", Type::Str).into_value(),
    );
    os.insert(
        "read_file",
        native("read_file", os_read_file).param("path", Type::Str).into_value(),
    );
    os.insert(
        "write_file",
        native("write_file", os_write_file)
            .param("path", Type::Str)
            .param("contents", Type::Str)
            .into_value(),
    );
    os.insert("remove", native("remove", os_remove).param("path", Type::Str).into_value());
    os.insert(
        "rename",
        native("rename", os_rename)
            .param("from", Type::Str)
            .param("to", Type::Str)
            .into_value(),
    );
    os.insert(
        "create_dir",
        native("create_dir", os_create_dir).param("path", Type::Str).into_value(),
    );
    os.insert("exists", native("exists", path_exists).param("path", Type::Str).into_value());
    os.insert(
        "system",
        native("system", os_system).param("command", Type::Str).into_value(),
    );
    os.insert("path", Value::Module(Rc::new(module("path", path_exports()))));
    os
}

fn path_exports() -> Exports {
    let mut path = Exports::new();
    path.insert(
        "join",
        native("join", path_join).param("base", Type::Str).rest(Type::Str).into_value(),
    );
    let predicates: [(&'static str, NativeFn); 4] = [
        ("exists", path_exists),
        ("is_file", path_is_file),
        ("is_dir", path_is_dir),
        ("is_absolute", path_is_absolute),
    ];
    for (name, callback) in predicates {
        path.insert(name, native(name, callback).param("path", Type::Str).into_value());
    }
    let components: [(&'static str, NativeFn); 5] = [
        ("extension", path_extension),
        ("file_name", path_file_name),
        ("stem", path_stem),
        ("parent", path_parent),
        ("absolute", path_absolute),
    ];
    for (name, callback) in components {
        path.insert(name, native(name, callback).param("path", Type::Str).into_value());
    }
    path.insert("separator", Value::str(MAIN_SEPARATOR_STR));
    path
}

fn os_getenv(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let name = expect_str(&args[0], "os.getenv")?;
    Ok(env::var(name).map(Value::str).unwrap_or(Value::Null))
}

fn os_current_dir(_: &mut Interpreter, _: &[Value]) -> Eval<Value> {
    let cwd = env::current_dir().map_err(|err| io_error("current_dir", ".", err))?;
    Ok(path_value(&cwd))
}

fn os_list_dir(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let dir = match args.first() {
        Some(value) => expect_str(value, "os.list_dir")?,
        None => ".",
    };
    let entries = fs::read_dir(dir).map_err(|err| io_error("list_dir", dir, err))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| io_error("list_dir", dir, err))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(Value::list(names.into_iter().map(Value::str).collect()))
}

fn os_read_file(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = expect_str(&args[0], "os.read_file")?;
    let contents = fs::read_to_string(path).map_err(|err| io_error("read_file", path, err))?;
    Ok(Value::str(contents))
}

fn os_write_file(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = expect_str(&args[0], "os.write_file")?;
    let contents = expect_str(&args[1], "os.write_file")?;
    fs::write(path, contents).map_err(|err| io_error("write_file", path, err))?;
    Ok(Value::Null)
}

fn os_remove(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = expect_str(&args[0], "os.remove")?;
    let result = if Path::new(path).is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|err| io_error("remove", path, err))?;
    Ok(Value::Null)
}

fn os_rename(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let from = expect_str(&args[0], "os.rename")?;
    let to = expect_str(&args[1], "os.rename")?;
    fs::rename(from, to).map_err(|err| io_error("rename", from, err))?;
    Ok(Value::Null)
}

fn os_create_dir(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = expect_str(&args[0], "os.create_dir")?;
    fs::create_dir_all(path).map_err(|err| io_error("create_dir", path, err))?;
    Ok(Value::Null)
}

/// Runs `command` through the platform shell and returns its exit code
/// (`-1` when it was killed by a signal).
fn os_system(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let command = expect_str(&args[0], "os.system")?;
    let mut shell = if cfg!(windows) {
        let mut shell = process::Command::new("cmd");
        shell.arg("/C");
        shell
    } else {
        let mut shell = process::Command::new("sh");
        shell.arg("-c");
        shell
    };
    let status = shell
        .arg(command)
        .status()
        .map_err(|err| io_error("system", command, err))?;
    Ok(Value::Int(status.code().map_or(-1, i64::from)))
}

fn path_value(path: &Path) -> Value {
    Value::str(path.to_string_lossy())
}

fn optional_component(component: Option<&std::ffi::OsStr>) -> Value {
    component
        .map(|part| Value::str(part.to_string_lossy()))
        .unwrap_or(Value::Null)
}

fn path_join(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut joined = PathBuf::from(expect_str(&args[0], "os.path.join")?);
    for part in &args[1..] {
        joined.push(expect_str(part, "os.path.join")?);
    }
    Ok(path_value(&joined))
}

fn path_exists(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(Path::new(expect_str(&args[0], "exists")?).exists()))
}

fn path_is_file(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(Path::new(expect_str(&args[0], "os.path.is_file")?).is_file()))
}

fn path_is_dir(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(Path::new(expect_str(&args[0], "os.path.is_dir")?).is_dir()))
}

fn path_is_absolute(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(
        Path::new(expect_str(&args[0], "os.path.is_absolute")?).is_absolute(),
    ))
}

fn path_extension(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(optional_component(
        Path::new(expect_str(&args[0], "os.path.extension")?).extension(),
    ))
}

fn path_file_name(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(optional_component(
        Path::new(expect_str(&args[0], "os.path.file_name")?).file_name(),
    ))
}

fn path_stem(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(optional_component(
        Path::new(expect_str(&args[0], "os.path.stem")?).file_stem(),
    ))
}

fn path_parent(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = Path::new(expect_str(&args[0], "os.path.parent")?);
    Ok(path.parent().map(path_value).unwrap_or(Value::Null))
}

fn path_absolute(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = expect_str(&args[0], "os.path.absolute")?;
    if Path::new(path).is_absolute() {
        return Ok(Value::str(path));
    }
    let cwd = env::current_dir().map_err(|err| io_error("absolute", path, err))?;
    Ok(path_value(&cwd.join(path)))
}
