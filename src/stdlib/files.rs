//! File objects returned by `open`, and their methods.

use std::{
    cell::RefCell,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    rc::Rc,
};

use super::{expect_int, expect_str, native, os::io_error, Eval};
use crate::{
    diagnostics::Diagnostic,
    runtime::Interpreter,
    types::Type,
    value::{Handle, NativeFunction, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    Append,
}

impl Mode {
    /// `b` modes are accepted for compatibility; text is always UTF-8.
    pub fn parse(text: &str) -> Eval<Self> {
        match text {
            "r" | "rb" => Ok(Mode::Read),
            "w" | "wb" => Ok(Mode::Write),
            "a" => Ok(Mode::Append),
            other => Err(Diagnostic::value_error(format!(
                "open mode must be one of r, rb, w, wb, a; got `{other}`"
            ))),
        }
    }
}

enum Stream {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// An open (or closed) file. Closing drops the stream; writers are flushed
/// first. Dropping the handle closes it too.
pub struct FileHandle {
    path: String,
    stream: RefCell<Option<Stream>>,
}

impl FileHandle {
    pub fn open(path: &str, mode: Mode) -> Eval<Self> {
        let mut options = OpenOptions::new();
        match mode {
            Mode::Read => options.read(true),
            Mode::Write => options.write(true).create(true).truncate(true),
            Mode::Append => options.append(true).create(true),
        };
        let file = options.open(path).map_err(|err| io_error("open", path, err))?;
        let stream = match mode {
            Mode::Read => Stream::Reader(BufReader::new(file)),
            Mode::Write | Mode::Append => Stream::Writer(BufWriter::new(file)),
        };
        Ok(Self {
            path: path.to_string(),
            stream: RefCell::new(Some(stream)),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.stream.borrow().is_some()
    }

    pub fn close(&self) -> Eval<()> {
        if let Some(Stream::Writer(mut writer)) = self.stream.borrow_mut().take() {
            writer.flush().map_err(|err| io_error("close", &self.path, err))?;
        }
        Ok(())
    }

    fn with_stream<T>(
        &self,
        name: &str,
        body: impl FnOnce(&mut Stream) -> io::Result<T>,
    ) -> Eval<T> {
        let mut guard = self.stream.borrow_mut();
        let stream = guard.as_mut().ok_or_else(|| {
            Diagnostic::value_error(format!("`{name}` on closed file `{}`", self.path))
        })?;
        body(stream).map_err(|err| io_error(name, &self.path, err))
    }

    fn reader<T>(
        &self,
        name: &str,
        body: impl FnOnce(&mut BufReader<File>) -> io::Result<T>,
    ) -> Eval<T> {
        self.with_stream(name, |stream| match stream {
            Stream::Reader(reader) => body(reader),
            Stream::Writer(_) => Err(unsupported("file is not open for reading")),
        })
    }

    fn writer<T>(
        &self,
        name: &str,
        body: impl FnOnce(&mut BufWriter<File>) -> io::Result<T>,
    ) -> Eval<T> {
        self.with_stream(name, |stream| match stream {
            Stream::Writer(writer) => body(writer),
            Stream::Reader(_) => Err(unsupported("file is not open for writing")),
        })
    }

    /// Reads up to `limit` bytes, or to the end. Invalid UTF-8 is replaced.
    pub fn read(&self, limit: Option<u64>) -> Eval<String> {
        self.reader("read", |reader| {
            let mut bytes = Vec::new();
            match limit {
                Some(limit) => reader.by_ref().take(limit).read_to_end(&mut bytes)?,
                None => reader.read_to_end(&mut bytes)?,
            };
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }

    /// Next line without its terminator; `None` at end of file.
    pub fn read_line(&self, limit: Option<u64>) -> Eval<Option<String>> {
        self.reader("read_line", |reader| next_line(reader, limit))
    }

    /// Reads lines until end of file or until `hint` bytes were consumed.
    pub fn read_lines(&self, hint: Option<u64>) -> Eval<Vec<String>> {
        self.reader("read_lines", |reader| {
            let mut lines = Vec::new();
            let mut total = 0u64;
            while hint.map_or(true, |hint| total < hint) {
                match next_line(reader, None)? {
                    Some(line) => {
                        total += line.len() as u64 + 1;
                        lines.push(line);
                    }
                    None => break,
                }
            }
            Ok(lines)
        })
    }

    pub fn write(&self, text: &str) -> Eval<()> {
        self.writer("write", |writer| writer.write_all(text.as_bytes()))
    }

    pub fn flush(&self) -> Eval<()> {
        self.with_stream("flush", |stream| match stream {
            Stream::Writer(writer) => writer.flush(),
            Stream::Reader(_) => Ok(()),
        })
    }

    pub fn seek(&self, position: SeekFrom) -> Eval<u64> {
        self.with_stream("seek", |stream| match stream {
            Stream::Reader(reader) => reader.seek(position),
            Stream::Writer(writer) => writer.seek(position),
        })
    }

    pub fn tell(&self) -> Eval<u64> {
        self.with_stream("tell", |stream| match stream {
            Stream::Reader(reader) => reader.stream_position(),
            Stream::Writer(writer) => writer.stream_position(),
        })
    }
}

fn unsupported(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, message)
}

fn next_line(reader: &mut BufReader<File>, limit: Option<u64>) -> io::Result<Option<String>> {
    let mut bytes = Vec::new();
    let read = match limit {
        Some(limit) => reader.by_ref().take(limit).read_until(b'\n', &mut bytes)?,
        None => reader.read_until(b'\n', &mut bytes)?,
    };
    if read == 0 {
        return Ok(None);
    }
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

pub(crate) fn file_open(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let path = expect_str(&args[0], "open")?;
    let mode = match args.get(1) {
        Some(mode) => Mode::parse(expect_str(mode, "open")?)?,
        None => Mode::Read,
    };
    Ok(Value::Handle(Rc::new(Handle::File(FileHandle::open(path, mode)?))))
}

fn expect_file<'a>(value: &'a Value, name: &str) -> Eval<&'a FileHandle> {
    match value {
        Value::Handle(handle) => match &**handle {
            Handle::File(file) => Ok(file),
            _ => Err(Diagnostic::type_error(format!("`{name}` expected a file"))),
        },
        other => Err(Diagnostic::type_error(format!(
            "`{name}` expected a file but found {}",
            other.type_name()
        ))),
    }
}

fn limit_arg(args: &[Value], name: &str) -> Eval<Option<u64>> {
    match args.get(1) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let limit = expect_int(value, name)?;
            u64::try_from(limit)
                .map(Some)
                .map_err(|_| Diagnostic::value_error(format!("`{name}` limit must not be negative")))
        }
    }
}

/// Methods of file objects; the receiver comes first.
pub(crate) fn methods() -> Vec<NativeFunction> {
    let int_or_null = || Type::Union(vec![Type::Int, Type::Null]);
    vec![
        native("is_open", io_is_open).param("self", Type::File),
        native("close", io_close).param("self", Type::File),
        native("read", io_read).param("self", Type::File).optional("limit", int_or_null()),
        native("read_line", io_read_line)
            .param("self", Type::File)
            .optional("limit", int_or_null()),
        native("read_lines", io_read_lines)
            .param("self", Type::File)
            .optional("hint", int_or_null()),
        native("write", io_write).param("self", Type::File).param("text", Type::Str),
        native("flush", io_flush).param("self", Type::File),
        native("seek", io_seek)
            .param("self", Type::File)
            .param("offset", Type::Int)
            .optional("whence", Type::Int),
        native("tell", io_tell).param("self", Type::File),
    ]
}

fn io_is_open(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    Ok(Value::Bool(expect_file(&args[0], "is_open")?.is_open()))
}

fn io_close(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    expect_file(&args[0], "close")?.close()?;
    Ok(Value::Null)
}

fn io_read(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let file = expect_file(&args[0], "read")?;
    Ok(Value::str(file.read(limit_arg(args, "read")?)?))
}

fn io_read_line(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let file = expect_file(&args[0], "read_line")?;
    Ok(file
        .read_line(limit_arg(args, "read_line")?)?
        .map_or(Value::Null, Value::str))
}

fn io_read_lines(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let file = expect_file(&args[0], "read_lines")?;
    let lines = file.read_lines(limit_arg(args, "read_lines")?)?;
    Ok(Value::list(lines.into_iter().map(Value::str).collect()))
}

fn io_write(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let file = expect_file(&args[0], "write")?;
    file.write(expect_str(&args[1], "write")?)?;
    Ok(Value::Null)
}

fn io_flush(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    expect_file(&args[0], "flush")?.flush()?;
    Ok(Value::Null)
}

/// `whence` is 0 (start), 1 (current position) or 2 (end). Returns the new
/// position.
fn io_seek(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    let file = expect_file(&args[0], "seek")?;
    let offset = expect_int(&args[1], "seek")?;
    let whence = match args.get(2) {
        Some(value) => expect_int(value, "seek")?,
        None => 0,
    };
    let position = match whence {
        0 => SeekFrom::Start(u64::try_from(offset).map_err(|_| {
            Diagnostic::value_error("`seek` from the start needs a non-negative offset")
        })?),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        other => {
            return Err(Diagnostic::value_error(format!(
                "`seek` whence must be 0, 1 or 2, not {other}"
            )))
        }
    };
    position_value(file.seek(position)?)
}

fn io_tell(_: &mut Interpreter, args: &[Value]) -> Eval<Value> {
    position_value(expect_file(&args[0], "tell")?.tell()?)
}

fn position_value(position: u64) -> Eval<Value> {
    i64::try_from(position)
        .map(Value::Int)
        .map_err(|_| Diagnostic::value_error("file position does not fit in an int"))
}
