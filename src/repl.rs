use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    config::Config,
    diagnostics::{KestrelError, Result},
    runtime::Interpreter,
};

const PROMPT: &str = ">> ";

pub struct Repl {
    interpreter: Interpreter,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            interpreter: Interpreter::with_config(config),
        }
    }

    /// Reads lines until `:quit`, `:exit`, Ctrl-C or end of input. Errors are
    /// reported and the session continues with its bindings intact.
    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    self.evaluate_line(trimmed);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        self.interpreter.shutdown()
    }

    fn evaluate_line(&mut self, line: &str) {
        match self.interpreter.eval_named(line, "<repl>") {
            Ok(value) if value.is_null() => {}
            Ok(value) => println!("{}", value.repr()),
            Err(err) => eprintln!("{err}"),
        }
    }
}

fn readline_error(err: ReadlineError) -> KestrelError {
    KestrelError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
