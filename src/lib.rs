//! Core library for the Kestrel scripting language: lexing, parsing, a
//! tree-walking evaluator with gradual types and user-defined object types,
//! the module system, the built-in library and the REPL.

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod modules;
pub mod object;
pub mod operators;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod types;
pub mod value;

pub use config::Config;
pub use diagnostics::{Diagnostic, ErrorKind, KestrelError, Location, Result};
pub use repl::Repl;
pub use runtime::{Flow, Interpreter};
pub use value::Value;
