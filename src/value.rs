use std::{
    cell::{Ref, RefCell},
    cmp::Ordering,
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::{write_quoted, FunctionDecl},
    diagnostics::{Diagnostic, ErrorKind},
    environment::EnvironmentRef,
    modules::Module,
    object::{CustomType, Instance},
    runtime::Interpreter,
    stdlib::{files::FileHandle, threading::ThreadHandle},
    types::{self, Type},
};

/// A runtime value. Scalars are copied; everything else is shared through `Rc`
/// so that mutation through one holder is visible to every other holder.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Rc<str>),
    List(Rc<List>),
    Dict(Rc<Dict>),
    Set(Rc<Set>),
    Range(Range),
    Function(Rc<Function>),
    Method(Rc<BoundMethod>),
    Type(Rc<CustomType>),
    Instance(Rc<Instance>),
    Weak(WeakRef),
    Error(Rc<Diagnostic>),
    Module(Rc<Module>),
    Handle(Rc<Handle>),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(List::new(items)))
    }

    pub fn error(diagnostic: Diagnostic) -> Self {
        Value::Error(Rc::new(diagnostic))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Double(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(list) => !list.borrow().is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Set(set) => !set.borrow().is_empty(),
            Value::Range(range) => range.len() > 0,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Range(_) => "range",
            Value::Function(_) | Value::Method(_) => "fn",
            Value::Type(_) => "type",
            Value::Instance(instance) => &instance.ty.name,
            Value::Weak(_) => "weak",
            Value::Error(_) => "error",
            Value::Module(_) => "module",
            Value::Handle(handle) => match **handle {
                Handle::Regex(_) => "regex",
                Handle::Thread(_) => "thread",
                Handle::File(_) => "io",
            },
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Method(_) | Value::Type(_)
        )
    }

    /// Structural equality with int/double promotion. Mismatched tags are
    /// unequal, and so are containers nested too deeply to compare.
    pub fn equals(&self, other: &Value) -> bool {
        self.try_equals(other).unwrap_or(false)
    }

    /// Like `equals`, but reports containers that nest past
    /// `MAX_COMPARE_DEPTH` (a list holding itself, say) as a `value_error`.
    pub fn try_equals(&self, other: &Value) -> Result<bool, Diagnostic> {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> Result<bool, Diagnostic> {
        if depth > MAX_COMPARE_DEPTH {
            return Err(nested_too_deeply());
        }
        let equal = match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                (*a as f64) == *b && b.fract() == 0.0 && *b as i64 == *a
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (l, r) in a.iter().zip(b.iter()) {
                    if !l.equals_at(r, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in a.iter() {
                    match b.get(key) {
                        Some(rhs) if value.equals_at(rhs, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|key| b.contains(key))
            }
            (Value::Range(a), Value::Range(b)) => a.same_elements(b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => {
                Rc::ptr_eq(&a.function, &b.function) && a.receiver.equals_at(&b.receiver, depth + 1)?
            }
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Weak(a), Value::Weak(b)) => a.same_target(b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Handle(a), Value::Handle(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        Ok(equal)
    }

    /// Ordering for numbers, strings and lists; `None` when the pair is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        self.try_compare(other).ok().flatten()
    }

    pub fn try_compare(&self, other: &Value) -> Result<Option<Ordering>, Diagnostic> {
        self.compare_at(other, 0)
    }

    fn compare_at(&self, other: &Value, depth: usize) -> Result<Option<Ordering>, Diagnostic> {
        if depth > MAX_COMPARE_DEPTH {
            return Err(nested_too_deeply());
        }
        let ordering = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(Some(Ordering::Equal));
                }
                let (a, b) = (a.borrow(), b.borrow());
                for (l, r) in a.iter().zip(b.iter()) {
                    match l.compare_at(r, depth + 1)? {
                        Some(Ordering::Equal) => continue,
                        other => return Ok(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        };
        Ok(ordering)
    }

    /// Text used by `print` and `str`: strings are written bare.
    pub fn display(&self) -> String {
        let mut out = String::new();
        let _ = write_value(&mut out, self, false, 0);
        out
    }

    /// Text used inside containers and by the REPL: strings are quoted.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        let _ = write_value(&mut out, self, true, 0);
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, false, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, true, 0)
    }
}

const MAX_DISPLAY_DEPTH: usize = 32;

/// Nesting at which equality, ordering and hashing stop descending. Only
/// containers that contain themselves get there in practice.
pub const MAX_COMPARE_DEPTH: usize = 256;

fn nested_too_deeply() -> Diagnostic {
    Diagnostic::value_error(format!(
        "containers nest more than {MAX_COMPARE_DEPTH} levels deep; cannot compare them"
    ))
}

fn write_value(out: &mut impl fmt::Write, value: &Value, quoted: bool, depth: usize) -> fmt::Result {
    if depth > MAX_DISPLAY_DEPTH {
        return out.write_str("...");
    }
    match value {
        Value::Null => out.write_str("null"),
        Value::Bool(b) => write!(out, "{b}"),
        Value::Int(n) => write!(out, "{n}"),
        Value::Double(n) => write!(out, "{n:?}"),
        Value::Str(s) if quoted => write_quoted(out, s),
        Value::Str(s) => out.write_str(s),
        Value::List(list) => {
            out.write_char('[')?;
            for (i, item) in list.borrow().iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, item, true, depth + 1)?;
            }
            out.write_char(']')
        }
        Value::Dict(dict) => {
            out.write_char('{')?;
            for (i, (key, item)) in dict.borrow().iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, key.value(), true, depth + 1)?;
                out.write_str(": ")?;
                write_value(out, item, true, depth + 1)?;
            }
            out.write_char('}')
        }
        Value::Set(set) => {
            let items = set.borrow();
            if items.is_empty() {
                return out.write_str("set()");
            }
            out.write_char('{')?;
            for (i, key) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, key.value(), true, depth + 1)?;
            }
            out.write_char('}')
        }
        Value::Range(range) => write!(out, "range({}, {}, {})", range.start, range.stop, range.step),
        Value::Function(function) => write!(out, "<fn {}>", function.name()),
        Value::Method(method) => write!(
            out,
            "<method {}.{}>",
            method.receiver.type_name(),
            method.function.name()
        ),
        Value::Type(ty) => write!(out, "<type {}>", ty.name),
        Value::Instance(instance) => write!(out, "<{} instance>", instance.ty.name),
        Value::Weak(weak) => match weak.upgrade() {
            Some(target) => write!(out, "<weak {}>", target.type_name()),
            None => out.write_str("<weak (dead)>"),
        },
        Value::Error(diag) => write!(out, "{}: {}", diag.kind, diag.message),
        Value::Module(module) => write!(out, "<module {}>", module.name),
        Value::Handle(handle) => match &**handle {
            Handle::Regex(regex) => write!(out, "<regex {}>", regex.as_str()),
            Handle::Thread(_) => out.write_str("<thread>"),
            Handle::File(file) => write!(out, "<io {}>", file.path()),
        },
    }
}

fn frozen_error(kind: &str) -> Diagnostic {
    Diagnostic::new(ErrorKind::Const, format!("cannot mutate a frozen {kind}"))
}

/// Declared element types a container must keep satisfying.
#[derive(Default)]
struct Constraints(RefCell<Vec<Type>>);

impl Constraints {
    fn add(&self, ty: Type) {
        let mut constraints = self.0.borrow_mut();
        let text = ty.to_string();
        if !constraints.iter().any(|existing| existing.to_string() == text) {
            constraints.push(ty);
        }
    }

    fn snapshot(&self) -> Vec<Type> {
        self.0.borrow().clone()
    }
}

pub struct List {
    items: RefCell<Vec<Value>>,
    element: Constraints,
    frozen: bool,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RefCell::new(items),
            element: Constraints::default(),
            frozen: false,
        }
    }

    pub fn frozen(items: Vec<Value>) -> Self {
        Self {
            frozen: true,
            ..Self::new(items)
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn constrain(&self, element: Type) {
        self.element.add(element);
    }

    pub fn element_types(&self) -> Vec<Type> {
        self.element.snapshot()
    }

    fn admit(&self, value: &Value) -> Result<(), Diagnostic> {
        if self.frozen {
            return Err(frozen_error("list"));
        }
        for element in self.element.snapshot() {
            types::admit(&element, value, "list")?;
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), Diagnostic> {
        if self.frozen {
            Err(frozen_error("list"))
        } else {
            Ok(())
        }
    }

    pub fn push(&self, value: Value) -> Result<(), Diagnostic> {
        self.admit(&value)?;
        self.items.borrow_mut().push(value);
        Ok(())
    }

    pub fn insert(&self, index: usize, value: Value) -> Result<(), Diagnostic> {
        self.admit(&value)?;
        let mut items = self.items.borrow_mut();
        let index = index.min(items.len());
        items.insert(index, value);
        Ok(())
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), Diagnostic> {
        self.admit(&value)?;
        let old = {
            let mut items = self.items.borrow_mut();
            match items.get_mut(index) {
                Some(slot) => std::mem::replace(slot, value),
                None => return Err(index_error(index as i64, items.len())),
            }
        };
        drop(old);
        Ok(())
    }

    pub fn pop(&self, index: Option<usize>) -> Result<Value, Diagnostic> {
        self.ensure_mutable()?;
        let mut items = self.items.borrow_mut();
        let len = items.len();
        match index {
            None => items
                .pop()
                .ok_or_else(|| Diagnostic::new(ErrorKind::Index, "pop from empty list")),
            Some(i) if i < len => Ok(items.remove(i)),
            Some(i) => Err(index_error(i as i64, len)),
        }
    }

    pub fn clear(&self) -> Result<(), Diagnostic> {
        self.ensure_mutable()?;
        let old = std::mem::take(&mut *self.items.borrow_mut());
        drop(old);
        Ok(())
    }

    /// Replaces the contents wholesale, e.g. after sorting or reversing.
    pub fn replace(&self, items: Vec<Value>) -> Result<(), Diagnostic> {
        self.ensure_mutable()?;
        let old = std::mem::replace(&mut *self.items.borrow_mut(), items);
        drop(old);
        Ok(())
    }
}

pub struct Dict {
    entries: RefCell<IndexMap<Key, Value>>,
    key_type: Constraints,
    value_type: Constraints,
    frozen: bool,
}

impl Dict {
    pub fn new(entries: IndexMap<Key, Value>) -> Self {
        Self {
            entries: RefCell::new(entries),
            key_type: Constraints::default(),
            value_type: Constraints::default(),
            frozen: false,
        }
    }

    pub fn frozen(entries: IndexMap<Key, Value>) -> Self {
        Self {
            frozen: true,
            ..Self::new(entries)
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn borrow(&self) -> Ref<'_, IndexMap<Key, Value>> {
        self.entries.borrow()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn constrain(&self, key: Type, value: Type) {
        self.key_type.add(key);
        self.value_type.add(value);
    }

    pub fn insert(&self, key: Key, value: Value) -> Result<(), Diagnostic> {
        if self.frozen {
            return Err(frozen_error("dict"));
        }
        for ty in self.key_type.snapshot() {
            types::admit(&ty, key.value(), "dict key")?;
        }
        for ty in self.value_type.snapshot() {
            types::admit(&ty, &value, "dict value")?;
        }
        let old = self.entries.borrow_mut().insert(key, value);
        drop(old);
        Ok(())
    }

    pub fn remove(&self, key: &Key) -> Result<Option<Value>, Diagnostic> {
        if self.frozen {
            return Err(frozen_error("dict"));
        }
        let removed = self.entries.borrow_mut().shift_remove(key);
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), Diagnostic> {
        if self.frozen {
            return Err(frozen_error("dict"));
        }
        let old = std::mem::take(&mut *self.entries.borrow_mut());
        drop(old);
        Ok(())
    }
}

pub struct Set {
    items: RefCell<IndexSet<Key>>,
    element: Constraints,
    frozen: bool,
}

impl Set {
    pub fn new(items: IndexSet<Key>) -> Self {
        Self {
            items: RefCell::new(items),
            element: Constraints::default(),
            frozen: false,
        }
    }

    pub fn frozen(items: IndexSet<Key>) -> Self {
        Self {
            frozen: true,
            ..Self::new(items)
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn borrow(&self) -> Ref<'_, IndexSet<Key>> {
        self.items.borrow()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn constrain(&self, element: Type) {
        self.element.add(element);
    }

    pub fn add(&self, key: Key) -> Result<bool, Diagnostic> {
        if self.frozen {
            return Err(frozen_error("set"));
        }
        for ty in self.element.snapshot() {
            types::admit(&ty, key.value(), "set")?;
        }
        Ok(self.items.borrow_mut().insert(key))
    }

    pub fn remove(&self, key: &Key) -> Result<bool, Diagnostic> {
        if self.frozen {
            return Err(frozen_error("set"));
        }
        let removed = self.items.borrow_mut().shift_remove(key);
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), Diagnostic> {
        if self.frozen {
            return Err(frozen_error("set"));
        }
        let old = std::mem::take(&mut *self.items.borrow_mut());
        drop(old);
        Ok(())
    }
}

/// A value admitted as a dict key or set element.
#[derive(Clone)]
pub struct Key(Value);

impl Key {
    pub fn new(value: Value) -> Result<Self, Diagnostic> {
        if is_hashable(&value) {
            Ok(Key(value))
        } else {
            Err(Diagnostic::type_error(format!(
                "unhashable type `{}`",
                value.type_name()
            )))
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn is_hashable(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Double(_) | Value::Str(_) => true,
        Value::Range(_) => true,
        Value::List(list) => list.is_frozen(),
        Value::Dict(dict) => dict.is_frozen(),
        Value::Set(set) => set.is_frozen(),
        _ => false,
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.equals(&other.0)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state, 0);
    }
}

/// Stops at `MAX_COMPARE_DEPTH`; equal values still hash alike because the
/// cut happens at the same structural depth.
fn hash_value<H: Hasher>(value: &Value, state: &mut H, depth: usize) {
    if depth > MAX_COMPARE_DEPTH {
        return 10u8.hash(state);
    }
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Int(n) => {
            2u8.hash(state);
            n.hash(state);
        }
        Value::Double(n) => {
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 {
                2u8.hash(state);
                (*n as i64).hash(state);
            } else {
                3u8.hash(state);
                n.to_bits().hash(state);
            }
        }
        Value::Str(s) => {
            4u8.hash(state);
            s.hash(state);
        }
        Value::Range(range) => {
            5u8.hash(state);
            range.len().hash(state);
            if range.len() > 0 {
                range.start.hash(state);
                range.step.hash(state);
            }
        }
        Value::List(list) => {
            6u8.hash(state);
            for item in list.borrow().iter() {
                hash_value(item, state, depth + 1);
            }
        }
        Value::Dict(dict) => {
            7u8.hash(state);
            dict.len().hash(state);
            let mut combined = 0u64;
            for (key, item) in dict.borrow().iter() {
                let mut entry = DefaultHasher::new();
                hash_value(key.value(), &mut entry, depth + 1);
                if is_hashable(item) {
                    hash_value(item, &mut entry, depth + 1);
                }
                combined = combined.wrapping_add(entry.finish());
            }
            combined.hash(state);
        }
        Value::Set(set) => {
            8u8.hash(state);
            set.len().hash(state);
            let mut combined = 0u64;
            for key in set.borrow().iter() {
                let mut entry = DefaultHasher::new();
                hash_value(key.value(), &mut entry, depth + 1);
                combined = combined.wrapping_add(entry.finish());
            }
            combined.hash(state);
        }
        _ => 9u8.hash(state),
    }
}

/// Half-open integer range `[start, stop)` walked by a non-zero `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self, Diagnostic> {
        if step == 0 {
            return Err(Diagnostic::value_error("range step must not be zero"));
        }
        Ok(Self { start, stop, step })
    }

    /// `max(0, ceil((stop - start) / step))`
    pub fn len(&self) -> usize {
        stepped_len(self.start.into(), self.stop.into(), self.step.into())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index < self.len() {
            Some((self.start as i128 + index as i128 * self.step as i128) as i64)
        } else {
            None
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        let offset = value as i128 - self.start as i128;
        let step = self.step as i128;
        offset % step == 0 && {
            let index = offset / step;
            index >= 0 && (index as u128) < self.len() as u128
        }
    }

    pub fn iter(&self) -> RangeIter {
        RangeIter {
            range: *self,
            index: 0,
        }
    }

    fn same_elements(&self, other: &Range) -> bool {
        let len = self.len();
        len == other.len() && (len == 0 || (self.start == other.start && (len == 1 || self.step == other.step)))
    }
}

pub struct RangeIter {
    range: Range,
    index: usize,
}

impl Iterator for RangeIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let value = self.range.get(self.index)?;
        self.index += 1;
        Some(value)
    }
}

pub type NativeFn = fn(&mut Interpreter, &[Value]) -> Result<Value, Diagnostic>;

#[derive(Clone)]
pub struct NativeParam {
    pub name: &'static str,
    pub ty: Type,
    pub optional: bool,
}

/// A host function exposed to scripts. Parameters are declared so calls go
/// through the same arity and type checks as user functions.
pub struct NativeFunction {
    pub name: &'static str,
    pub params: Vec<NativeParam>,
    pub rest: Option<Type>,
    pub callback: NativeFn,
}

impl NativeFunction {
    pub fn new(name: &'static str, callback: NativeFn) -> Self {
        Self {
            name,
            params: Vec::new(),
            rest: None,
            callback,
        }
    }

    pub fn param(mut self, name: &'static str, ty: Type) -> Self {
        self.params.push(NativeParam {
            name,
            ty,
            optional: false,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, ty: Type) -> Self {
        self.params.push(NativeParam {
            name,
            ty,
            optional: true,
        });
        self
    }

    pub fn rest(mut self, ty: Type) -> Self {
        self.rest = Some(ty);
        self
    }

    pub fn required(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    pub fn into_function(self) -> Rc<Function> {
        Rc::new(Function::Native(self))
    }

    pub fn into_value(self) -> Value {
        Value::Function(self.into_function())
    }
}

/// A closure: the declaration plus the environment it was created in.
pub struct UserFunction {
    pub decl: Rc<FunctionDecl>,
    pub env: EnvironmentRef,
}

pub enum Function {
    User(UserFunction),
    Native(NativeFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::User(user) => user.decl.name.as_deref().unwrap_or("<anonymous>"),
            Function::Native(native) => native.name,
        }
    }

    /// Minimum and maximum accepted argument counts (`None` = unbounded).
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::User(user) => {
                let params = &user.decl.params;
                let required = params.iter().filter(|p| p.default.is_none()).count();
                (required, Some(params.len()))
            }
            Function::Native(native) => {
                let max = native.rest.is_none().then_some(native.params.len());
                (native.required(), max)
            }
        }
    }
}

/// A function paired with the receiver it was looked up on.
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Rc<Function>,
}

/// Non-owning reference to a shared value.
#[derive(Clone)]
pub enum WeakRef {
    Instance(Weak<Instance>),
    List(Weak<List>),
    Dict(Weak<Dict>),
    Set(Weak<Set>),
}

impl WeakRef {
    pub fn new(value: &Value) -> Option<Self> {
        match value {
            Value::Instance(instance) => Some(WeakRef::Instance(Rc::downgrade(instance))),
            Value::List(list) => Some(WeakRef::List(Rc::downgrade(list))),
            Value::Dict(dict) => Some(WeakRef::Dict(Rc::downgrade(dict))),
            Value::Set(set) => Some(WeakRef::Set(Rc::downgrade(set))),
            _ => None,
        }
    }

    pub fn upgrade(&self) -> Option<Value> {
        match self {
            WeakRef::Instance(weak) => weak.upgrade().map(Value::Instance),
            WeakRef::List(weak) => weak.upgrade().map(Value::List),
            WeakRef::Dict(weak) => weak.upgrade().map(Value::Dict),
            WeakRef::Set(weak) => weak.upgrade().map(Value::Set),
        }
    }

    fn same_target(&self, other: &WeakRef) -> bool {
        match (self, other) {
            (WeakRef::Instance(a), WeakRef::Instance(b)) => a.ptr_eq(b),
            (WeakRef::List(a), WeakRef::List(b)) => a.ptr_eq(b),
            (WeakRef::Dict(a), WeakRef::Dict(b)) => a.ptr_eq(b),
            (WeakRef::Set(a), WeakRef::Set(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Opaque host resources handed out by built-in modules.
pub enum Handle {
    Regex(regex::Regex),
    Thread(ThreadHandle),
    File(FileHandle),
}

/// Iteration order of a `for` loop: ranges lazily, containers over a
/// snapshot taken when the loop starts.
pub enum ValueIter {
    Range(RangeIter),
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range(range) => range.next().map(Value::Int),
            ValueIter::Items(items) => items.next(),
        }
    }
}

impl Value {
    pub fn iterate(&self) -> Result<ValueIter, Diagnostic> {
        let items = match self {
            Value::Range(range) => return Ok(ValueIter::Range(range.iter())),
            Value::List(list) => list.snapshot(),
            Value::Dict(dict) => dict.borrow().keys().map(|key| key.value().clone()).collect(),
            Value::Set(set) => set.borrow().iter().map(|key| key.value().clone()).collect(),
            Value::Str(text) => text.chars().map(|ch| Value::str(ch.to_string())).collect(),
            other => {
                return Err(Diagnostic::type_error(format!(
                    "value of type `{}` is not iterable",
                    other.type_name()
                )))
            }
        };
        Ok(ValueIter::Items(items.into_iter()))
    }
}

pub fn index_error(index: i64, len: usize) -> Diagnostic {
    Diagnostic::new(
        ErrorKind::Index,
        format!("index {index} out of range for length {len}"),
    )
}

/// Maps a possibly negative index onto `0..len`. Ranges can be longer than
/// `i64::MAX`, so the arithmetic is done in `i128`.
pub fn normalize_index(index: i64, len: usize) -> Result<usize, Diagnostic> {
    let len_wide = len as i128;
    let resolved = if index < 0 {
        i128::from(index) + len_wide
    } else {
        i128::from(index)
    };
    if resolved < 0 || resolved >= len_wide {
        Err(index_error(index, len))
    } else {
        Ok(resolved as usize)
    }
}

fn stepped_len(start: i128, stop: i128, step: i128) -> usize {
    let span = stop - start;
    if (step > 0 && span <= 0) || (step < 0 && span >= 0) {
        return 0;
    }
    let count = (span + step - step.signum()) / step;
    count.clamp(0, usize::MAX as i128) as usize
}

/// Resolves slice bounds against a sequence length and returns the selected
/// positions as `(first, step, count)`.
pub fn slice_bounds(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    stride: Option<i64>,
) -> Result<(i128, i64, usize), Diagnostic> {
    let len = len as i128;
    let step = stride.unwrap_or(1);
    if step == 0 {
        return Err(Diagnostic::value_error("slice step must not be zero"));
    }
    let clamp = |bound: i64, low: i128, high: i128| {
        let bound = i128::from(bound);
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let (first, last) = if step > 0 {
        (
            lower.map_or(0, |b| clamp(b, 0, len)),
            upper.map_or(len, |b| clamp(b, 0, len)),
        )
    } else {
        (
            lower.map_or(len - 1, |b| clamp(b, -1, len - 1)),
            upper.map_or(-1, |b| clamp(b, -1, len - 1)),
        )
    };
    let count = stepped_len(first, last, step.into());
    Ok((first, step, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_length_matches_ceiling_formula() {
        let cases = [
            (0, 10, 1),
            (0, 10, 3),
            (10, 0, -3),
            (5, 5, 1),
            (0, 10, -1),
            (-7, 8, 4),
            (3, -9, -5),
        ];
        for (start, stop, step) in cases {
            let range = Range::new(start, stop, step).expect("non-zero step");
            let span = (stop - start) as f64 / step as f64;
            let expected = span.ceil().max(0.0) as usize;
            assert_eq!(range.len(), expected, "range({start}, {stop}, {step})");
            assert_eq!(range.iter().count(), expected);
            let first: Vec<_> = range.iter().collect();
            let second: Vec<_> = range.iter().collect();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn range_rejects_zero_step() {
        assert!(Range::new(0, 1, 0).is_err());
    }

    #[test]
    fn range_membership_respects_stride() {
        let range = Range::new(1, 10, 3).expect("range");
        assert!(range.contains(7));
        assert!(!range.contains(8));
        assert!(!range.contains(10));
    }

    #[test]
    fn int_and_double_keys_collide() {
        let mut map = IndexMap::new();
        map.insert(Key::new(Value::Int(1)).expect("hashable"), Value::Null);
        assert!(map.contains_key(&Key::new(Value::Double(1.0)).expect("hashable")));
    }

    #[test]
    fn mutable_containers_are_not_hashable() {
        assert!(Key::new(Value::list(vec![])).is_err());
        let frozen = Value::List(Rc::new(List::frozen(vec![Value::Int(1)])));
        assert!(Key::new(frozen).is_ok());
    }

    #[test]
    fn slice_bounds_follow_defaults() {
        assert_eq!(slice_bounds(5, None, None, None).expect("slice"), (0, 1, 5));
        assert_eq!(slice_bounds(5, Some(-2), None, None).expect("slice"), (3, 1, 2));
        assert_eq!(slice_bounds(5, None, None, Some(-1)).expect("slice"), (4, -1, 5));
        assert_eq!(slice_bounds(5, Some(10), None, None).expect("slice").2, 0);
        assert!(slice_bounds(5, None, None, Some(0)).is_err());
    }

    #[test]
    fn indexes_ranges_longer_than_i64_max() {
        let range = Range::new(i64::MIN, i64::MAX, 1).expect("range");
        let len = range.len();
        assert_eq!(len as u64, u64::MAX);
        let last = normalize_index(-1, len).expect("last index");
        assert_eq!(range.get(last), Some(i64::MAX - 1));
        let fifth = normalize_index(5, len).expect("fifth index");
        assert_eq!(range.get(fifth), Some(i64::MIN + 5));
        assert!(normalize_index(i64::MIN, len).is_ok());
    }
}
