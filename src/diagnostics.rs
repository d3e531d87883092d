use std::{fmt, rc::Rc};

use thiserror::Error;

/// Position of a token or node in a source file (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: Rc<str>, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// The closed set of error kinds a script can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Undefined,
    Const,
    IdentifierNotFound,
    IdentifierAlreadyExists,
    Value,
    Key,
    Index,
    Import,
    Syntax,
    Os,
    Type,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Undefined,
        ErrorKind::Const,
        ErrorKind::IdentifierNotFound,
        ErrorKind::IdentifierAlreadyExists,
        ErrorKind::Value,
        ErrorKind::Key,
        ErrorKind::Index,
        ErrorKind::Import,
        ErrorKind::Syntax,
        ErrorKind::Os,
        ErrorKind::Type,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Undefined => "undefined_error",
            ErrorKind::Const => "const_error",
            ErrorKind::IdentifierNotFound => "identifier_not_found",
            ErrorKind::IdentifierAlreadyExists => "identifier_already_exists",
            ErrorKind::Value => "value_error",
            ErrorKind::Key => "key_error",
            ErrorKind::Index => "index_error",
            ErrorKind::Import => "import_error",
            ErrorKind::Syntax => "syntax_error",
            ErrorKind::Os => "os_error",
            ErrorKind::Type => "type_error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error as seen by scripts and hosts alike: raised at runtime, reported
/// by the lexer and parser, and stored inside `error` values.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
    pub cause: Option<Box<Diagnostic>>,
    pub notes: Vec<String>,
    pub secondary: Vec<Diagnostic>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            cause: None,
            notes: Vec::new(),
            secondary: Vec::new(),
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attaches `location` only when the diagnostic has none yet.
    pub fn or_at(mut self, location: &Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_cause(mut self, cause: Diagnostic) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_secondary(mut self, secondary: Diagnostic) -> Self {
        self.secondary.push(secondary);
        self
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn syntax_error(message: impl Into<String>, location: Location) -> Self {
        Self::new(ErrorKind::Syntax, message).at(location)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, "\n{indent}  --> {location}")?;
        }
        for note in &self.notes {
            write!(f, "\n{indent}  note: {note}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n{indent}  caused by: ")?;
            cause.render(f, &format!("{indent}  "))?;
        }
        for secondary in &self.secondary {
            write!(f, "\n{indent}  also raised: ")?;
            secondary.render(f, &format!("{indent}  "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, "")
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Kestrel toolchain.
#[derive(Debug, Error)]
pub enum KestrelError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KestrelError {
    /// Kind of the underlying diagnostic; host I/O failures map to `os_error`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KestrelError::Diagnostic(diag) => diag.kind,
            KestrelError::Io(_) => ErrorKind::Os,
        }
    }
}

pub type Result<T> = std::result::Result<T, KestrelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ErrorKind::from_name("nope"), None);
    }

    #[test]
    fn display_includes_location_and_secondary() {
        let diag = Diagnostic::value_error("bad")
            .at(Location::new("main.ks".into(), 3, 7))
            .with_secondary(Diagnostic::type_error("destructor failed"));
        let text = diag.to_string();
        assert!(text.starts_with("value_error: bad"));
        assert!(text.contains("main.ks:3:7"));
        assert!(text.contains("also raised: type_error: destructor failed"));
    }
}
