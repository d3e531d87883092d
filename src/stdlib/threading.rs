//! Worker threads. Each worker owns a fresh interpreter; only portable
//! copies of values travel between threads.

use std::{
    cell::RefCell,
    path::PathBuf,
    rc::Rc,
    thread::{self, JoinHandle},
};

use indexmap::IndexMap;

use super::{expect_list, expect_number, expect_str, native, os::io_error, sleep_seconds, Eval, Exports};
use crate::{
    config::Config,
    diagnostics::{Diagnostic, ErrorKind, KestrelError},
    runtime::Interpreter,
    types::Type,
    value::{Dict, Handle, Key, Value},
};

/// Stack size for worker threads; the evaluator recurses on the host stack.
pub const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

const WORKER_FILE: &str = "<thread>";

/// A value detached from any interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Portable {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    List(Vec<Portable>),
    Dict(Vec<(Portable, Portable)>),
}

impl Portable {
    /// Containers are copied deeply; anything else crosses as its display text.
    pub fn from_value(value: &Value) -> Self {
        Self::convert(value, 0)
    }

    fn convert(value: &Value, depth: usize) -> Self {
        if depth > MAX_DEPTH {
            return Portable::Str(value.display());
        }
        match value {
            Value::Null => Portable::Null,
            Value::Bool(b) => Portable::Bool(*b),
            Value::Int(n) => Portable::Int(*n),
            Value::Double(n) => Portable::Double(*n),
            Value::Str(text) => Portable::Str(text.to_string()),
            Value::List(list) => Portable::List(
                list.snapshot()
                    .iter()
                    .map(|item| Self::convert(item, depth + 1))
                    .collect(),
            ),
            Value::Dict(dict) => Portable::Dict(
                dict.borrow()
                    .iter()
                    .map(|(key, item)| {
                        (Self::convert(key.value(), depth + 1), Self::convert(item, depth + 1))
                    })
                    .collect(),
            ),
            other => Portable::Str(other.display()),
        }
    }

    pub fn into_value(self) -> Eval<Value> {
        Ok(match self {
            Portable::Null => Value::Null,
            Portable::Bool(b) => Value::Bool(b),
            Portable::Int(n) => Value::Int(n),
            Portable::Double(n) => Value::Double(n),
            Portable::Str(text) => Value::str(text),
            Portable::List(items) => Value::list(
                items
                    .into_iter()
                    .map(Portable::into_value)
                    .collect::<Eval<Vec<_>>>()?,
            ),
            Portable::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    map.insert(Key::new(key.into_value()?)?, item.into_value()?);
                }
                Value::Dict(Rc::new(Dict::new(map)))
            }
        })
    }
}

const MAX_DEPTH: usize = 256;

/// An error raised inside a worker, stripped down to what can cross threads.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    /// `file:line:column` inside the worker, when known.
    pub origin: Option<String>,
}

impl Failure {
    fn from_error(err: KestrelError) -> Self {
        match err {
            KestrelError::Diagnostic(diag) => Self {
                kind: diag.kind,
                origin: diag.location.as_ref().map(ToString::to_string),
                message: diag.message,
            },
            KestrelError::Io(io) => Self {
                kind: ErrorKind::Os,
                message: io.to_string(),
                origin: None,
            },
        }
    }

    fn into_diagnostic(self) -> Diagnostic {
        let diag = Diagnostic::new(self.kind, self.message);
        match self.origin {
            Some(origin) => diag.with_note(format!("raised in worker thread at {origin}")),
            None => diag.with_note("raised in worker thread"),
        }
    }
}

pub type Outcome = Result<Portable, Failure>;

enum Job {
    File(PathBuf),
    Source(String),
}

/// Join handle of a running worker plus its outcome once joined.
pub struct ThreadHandle {
    handle: RefCell<Option<JoinHandle<Outcome>>>,
    outcome: RefCell<Option<Outcome>>,
}

impl ThreadHandle {
    fn spawn(job: Job, config: Config) -> Eval<Self> {
        let handle = thread::Builder::new()
            .name("kestrel-worker".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || run_worker(job, config))
            .map_err(|err| io_error("threading.spawn", WORKER_FILE, err))?;
        Ok(Self {
            handle: RefCell::new(Some(handle)),
            outcome: RefCell::new(None),
        })
    }

    pub fn is_finished(&self) -> bool {
        match &*self.handle.borrow() {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    /// Waits for the worker. Joining again returns the same outcome.
    pub fn join(&self) -> Outcome {
        if let Some(handle) = self.handle.borrow_mut().take() {
            let outcome = handle.join().unwrap_or_else(|_| {
                Err(Failure {
                    kind: ErrorKind::Undefined,
                    message: "worker thread panicked".to_string(),
                    origin: None,
                })
            });
            *self.outcome.borrow_mut() = Some(outcome);
        }
        self.outcome.borrow().clone().unwrap_or(Ok(Portable::Null))
    }
}

fn run_worker(job: Job, config: Config) -> Outcome {
    let mut interp = Interpreter::with_config(config);
    let result = match job {
        Job::File(path) => interp.run_file(path),
        Job::Source(source) => interp.eval_named(&source, WORKER_FILE),
    };
    let outcome = result
        .map(|value| Portable::from_value(&value))
        .map_err(Failure::from_error);
    let shutdown = interp.shutdown().map_err(Failure::from_error);
    match (outcome, shutdown) {
        (Ok(_), Err(failure)) => Err(failure),
        (outcome, _) => outcome,
    }
}

pub(crate) fn exports() -> Exports {
    let mut threading = Exports::new();
    threading.insert(
        "spawn",
        native("spawn", threading_spawn)
            .param("path", Type::Str)
            .optional("args", Type::List(Box::new(Type::Any)))
            .into_value(),
    );
    threading.insert(
        "run",
        native("run", threading_run).param("source", Type::Str).into_value(),
    );
    threading.insert(
        "join",
        native("join", threading_join).param("thread", Type::Thread).into_value(),
    );
    threading.insert(
        "is_finished",
        native("is_finished", threading_is_finished)
            .param("thread", Type::Thread)
            .into_value(),
    );
    threading.insert(
        "sleep",
        native("sleep", threading_sleep).param("seconds", Type::Number).into_value(),
    );
    threading
}

/// Workers inherit the search paths and tracing flag, never the parent's state.
fn worker_config(interp: &Interpreter, args: Vec<String>) -> Config {
    Config {
        args,
        ..interp.config.clone()
    }
}

fn thread_value(handle: ThreadHandle) -> Value {
    Value::Handle(Rc::new(Handle::Thread(handle)))
}

fn expect_thread<'a>(value: &'a Value, name: &str) -> Eval<&'a ThreadHandle> {
    match value {
        Value::Handle(handle) => match &**handle {
            Handle::Thread(thread) => Ok(thread),
            _ => Err(Diagnostic::type_error(format!("`{name}` expected a thread"))),
        },
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected a thread but found {}",
            other.type_name()
        ))),
    }
}

fn threading_spawn(interp: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let mut path = PathBuf::from(expect_str(&args[0], "threading.spawn")?);
    if path.is_relative() {
        if let Some(directory) = &interp.directory {
            let candidate = directory.join(&path);
            if candidate.is_file() {
                path = candidate;
            }
        }
    }
    let script_args = match args.get(1) {
        Some(Value::Null) | None => Vec::new(),
        Some(list) => expect_list(list, "threading.spawn")?
            .snapshot()
            .iter()
            .map(Value::display)
            .collect(),
    };
    let config = worker_config(interp, script_args);
    Ok(thread_value(ThreadHandle::spawn(Job::File(path), config)?))
}

fn threading_run(interp: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let source = expect_str(&args[0], "threading.run")?.to_string();
    let config = worker_config(interp, Vec::new());
    Ok(thread_value(ThreadHandle::spawn(Job::Source(source), config)?))
}

fn threading_join(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let thread = expect_thread(&args[0], "threading.join")?;
    match thread.join() {
        Ok(portable) => portable.into_value(),
        Err(failure) => Err(failure.into_diagnostic()),
    }
}

fn threading_is_finished(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let thread = expect_thread(&args[0], "threading.is_finished")?;
    Ok(Value::Bool(thread.is_finished()))
}

fn threading_sleep(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    sleep_seconds(expect_number(&args[0], "threading.sleep")?)
}
