use std::{fmt, rc::Rc};

use crate::{
    ast::TypeExpr,
    diagnostics::Diagnostic,
    environment::{Environment, EnvironmentRef},
    object::CustomType,
    value::{Function, Handle, Value},
};

/// A resolved type annotation.
#[derive(Debug, Clone)]
pub enum Type {
    Any,
    Null,
    Bool,
    Int,
    Double,
    Number,
    Str,
    Range,
    Error,
    Module,
    TypeValue,
    Weak,
    Regex,
    Thread,
    File,
    Function {
        params: Option<Vec<Type>>,
        ret: Option<Box<Type>>,
    },
    List(Box<Type>),
    Dict(Box<Type>, Box<Type>),
    Set(Box<Type>),
    Custom(Rc<CustomType>),
    Union(Vec<Type>),
}

fn arity_error(name: &str, expected: usize) -> Diagnostic {
    let plural = if expected == 1 { "" } else { "s" };
    Diagnostic::type_error(format!(
        "`{name}` expects {expected} type argument{plural}"
    ))
}

/// Resolves an annotation against the scope it appears in. Custom type names
/// are looked up lazily, so forward references work once the type exists.
pub fn resolve(expr: &TypeExpr, env: &EnvironmentRef) -> Result<Type, Diagnostic> {
    match expr {
        TypeExpr::Null => Ok(Type::Null),
        TypeExpr::Union(members) => Ok(Type::Union(
            members
                .iter()
                .map(|member| resolve(member, env))
                .collect::<Result<_, _>>()?,
        )),
        TypeExpr::Function { params, ret } => {
            let params = match params {
                Some(params) => Some(
                    params
                        .iter()
                        .map(|param| resolve(param, env))
                        .collect::<Result<_, _>>()?,
                ),
                None => None,
            };
            let ret = match ret {
                Some(ret) => Some(Box::new(resolve(ret, env)?)),
                None => None,
            };
            Ok(Type::Function { params, ret })
        }
        TypeExpr::Named { name, args } => {
            let mut args = args
                .iter()
                .map(|arg| resolve(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            let bare = args.is_empty();
            let simple = move |ty: Type| {
                if bare {
                    Ok(ty)
                } else {
                    Err(arity_error(name, 0))
                }
            };
            match name.as_str() {
                "any" => simple(Type::Any),
                "null" => simple(Type::Null),
                "bool" => simple(Type::Bool),
                "int" => simple(Type::Int),
                "double" => simple(Type::Double),
                "number" => simple(Type::Number),
                "str" => simple(Type::Str),
                "range" => simple(Type::Range),
                "error" => simple(Type::Error),
                "module" => simple(Type::Module),
                "type" => simple(Type::TypeValue),
                "weak" => simple(Type::Weak),
                "regex" => simple(Type::Regex),
                "thread" => simple(Type::Thread),
                "io" => simple(Type::File),
                "fn" => simple(Type::Function {
                    params: None,
                    ret: None,
                }),
                "list" | "set" => {
                    let element = match args.len() {
                        0 => Type::Any,
                        1 => args.remove(0),
                        _ => return Err(arity_error(name, 1)),
                    };
                    Ok(if name == "list" {
                        Type::List(Box::new(element))
                    } else {
                        Type::Set(Box::new(element))
                    })
                }
                "dict" => match args.len() {
                    0 => Ok(Type::Dict(Box::new(Type::Any), Box::new(Type::Any))),
                    2 => {
                        let value = args.remove(1);
                        let key = args.remove(0);
                        Ok(Type::Dict(Box::new(key), Box::new(value)))
                    }
                    _ => Err(arity_error(name, 2)),
                },
                _ => {
                    let found = Environment::get(env, name)
                        .map_err(|_| Diagnostic::type_error(format!("unknown type `{name}`")))?;
                    match found {
                        Value::Type(custom) => simple(Type::Custom(custom)),
                        other => Err(Diagnostic::type_error(format!(
                            "`{name}` is a {}, not a type",
                            other.type_name()
                        ))),
                    }
                }
            }
        }
    }
}

impl Type {
    /// Structural compatibility check of a value against this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Any, _) => true,
            (Type::Null, Value::Null) => true,
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int, Value::Int(_)) => true,
            (Type::Double, Value::Double(_)) => true,
            (Type::Number, Value::Int(_) | Value::Double(_)) => true,
            (Type::Str, Value::Str(_)) => true,
            (Type::Range, Value::Range(_)) => true,
            (Type::Error, Value::Error(_)) => true,
            (Type::Module, Value::Module(_)) => true,
            (Type::TypeValue, Value::Type(_)) => true,
            (Type::Weak, Value::Weak(_)) => true,
            (Type::Regex, Value::Handle(handle)) => matches!(**handle, Handle::Regex(_)),
            (Type::Thread, Value::Handle(handle)) => matches!(**handle, Handle::Thread(_)),
            (Type::File, Value::Handle(handle)) => matches!(**handle, Handle::File(_)),
            (Type::Function { params, .. }, value) => {
                let (min, max) = match value {
                    Value::Function(function) => function.arity(),
                    Value::Method(method) => {
                        let (min, max) = method.function.arity();
                        match &*method.function {
                            Function::Native(_) => {
                                (min.saturating_sub(1), max.map(|m| m.saturating_sub(1)))
                            }
                            Function::User(_) => (min, max),
                        }
                    }
                    Value::Type(custom) => match &custom.constructor {
                        Some(ctor) => ctor.arity(),
                        None => (0, Some(0)),
                    },
                    _ => return false,
                };
                match params {
                    None => true,
                    Some(params) => min <= params.len() && max.map_or(true, |max| params.len() <= max),
                }
            }
            (Type::List(element), Value::List(list)) => {
                element.is_any() || list.borrow().iter().all(|item| element.accepts(item))
            }
            (Type::Set(element), Value::Set(set)) => {
                element.is_any() || set.borrow().iter().all(|key| element.accepts(key.value()))
            }
            (Type::Dict(key_type, value_type), Value::Dict(dict)) => {
                (key_type.is_any() && value_type.is_any())
                    || dict.borrow().iter().all(|(key, item)| {
                        key_type.accepts(key.value()) && value_type.accepts(item)
                    })
            }
            (Type::Custom(custom), Value::Instance(instance)) => Rc::ptr_eq(custom, &instance.ty),
            (Type::Union(members), value) => members.iter().any(|member| member.accepts(value)),
            _ => false,
        }
    }

    fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }
}

/// Checks `value` against `ty` and, on success, attaches the element types
/// to every typed container reachable through it.
pub fn bind(ty: &Type, value: &Value) -> Result<(), Diagnostic> {
    if !ty.accepts(value) {
        return Err(mismatch(ty, value));
    }
    constrain(ty, value);
    Ok(())
}

/// Used by containers on every mutation: the incoming value must satisfy the
/// element type, and nested containers inherit the constraint.
pub fn admit(ty: &Type, value: &Value, what: &str) -> Result<(), Diagnostic> {
    if !ty.accepts(value) {
        return Err(Diagnostic::type_error(format!(
            "{what} of {ty} cannot hold a value of type {}",
            describe(value)
        )));
    }
    constrain(ty, value);
    Ok(())
}

pub fn mismatch(ty: &Type, value: &Value) -> Diagnostic {
    Diagnostic::type_error(format!("expected {ty} but got {}", describe(value)))
}

fn constrain(ty: &Type, value: &Value) {
    match (ty, value) {
        (Type::List(element), Value::List(list)) if !element.is_any() => {
            list.constrain((**element).clone());
            for item in list.snapshot() {
                constrain(element, &item);
            }
        }
        (Type::Set(element), Value::Set(set)) if !element.is_any() => {
            set.constrain((**element).clone());
        }
        (Type::Dict(key, item_type), Value::Dict(dict)) if !key.is_any() || !item_type.is_any() => {
            dict.constrain((**key).clone(), (**item_type).clone());
            let items: Vec<Value> = dict.borrow().values().cloned().collect();
            for item in items {
                constrain(item_type, &item);
            }
        }
        (Type::Union(members), value) => {
            if let Some(member) = members.iter().find(|member| member.accepts(value)) {
                constrain(member, value);
            }
        }
        _ => {}
    }
}

/// Most specific type describing `value`; containers report the union of
/// their element types.
pub fn infer(value: &Value) -> Type {
    match value {
        Value::Null => Type::Null,
        Value::Bool(_) => Type::Bool,
        Value::Int(_) => Type::Int,
        Value::Double(_) => Type::Double,
        Value::Str(_) => Type::Str,
        Value::Range(_) => Type::Range,
        Value::Error(_) => Type::Error,
        Value::Module(_) => Type::Module,
        Value::Type(_) => Type::TypeValue,
        Value::Weak(_) => Type::Weak,
        Value::Function(_) | Value::Method(_) => Type::Function {
            params: None,
            ret: None,
        },
        Value::Handle(handle) => match **handle {
            Handle::Regex(_) => Type::Regex,
            Handle::Thread(_) => Type::Thread,
            Handle::File(_) => Type::File,
        },
        Value::Instance(instance) => Type::Custom(Rc::clone(&instance.ty)),
        Value::List(list) => Type::List(Box::new(unify(list.borrow().iter()))),
        Value::Set(set) => Type::Set(Box::new(unify(set.borrow().iter().map(|key| key.value())))),
        Value::Dict(dict) => {
            let entries = dict.borrow();
            Type::Dict(
                Box::new(unify(entries.keys().map(|key| key.value()))),
                Box::new(unify(entries.values())),
            )
        }
    }
}

fn unify<'a>(values: impl Iterator<Item = &'a Value>) -> Type {
    let mut members: Vec<Type> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        let ty = infer(value);
        let text = ty.to_string();
        if !seen.contains(&text) {
            seen.push(text);
            members.push(ty);
        }
    }
    match members.len() {
        0 => Type::Any,
        1 => members.remove(0),
        _ => Type::Union(members),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::List(_) | Value::Dict(_) | Value::Set(_) => infer(value).to_string(),
        other => other.type_name().to_string(),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Null => f.write_str("null"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Double => f.write_str("double"),
            Type::Number => f.write_str("number"),
            Type::Str => f.write_str("str"),
            Type::Range => f.write_str("range"),
            Type::Error => f.write_str("error"),
            Type::Module => f.write_str("module"),
            Type::TypeValue => f.write_str("type"),
            Type::Weak => f.write_str("weak"),
            Type::Regex => f.write_str("regex"),
            Type::Thread => f.write_str("thread"),
            Type::File => f.write_str("io"),
            Type::Function { params, ret } => {
                f.write_str("fn")?;
                if let Some(params) = params {
                    f.write_str("(")?;
                    for (i, param) in params.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{param}")?;
                    }
                    f.write_str(")")?;
                }
                if let Some(ret) = ret {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
            Type::List(element) => write!(f, "list<{element}>"),
            Type::Set(element) => write!(f, "set<{element}>"),
            Type::Dict(key, value) => write!(f, "dict<{key}, {value}>"),
            Type::Custom(custom) => f.write_str(&custom.name),
            Type::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_type;

    fn resolve_text(text: &str) -> Type {
        let expr = parse_type(text).expect("type parses");
        resolve(&expr, &Environment::new()).expect("type resolves")
    }

    #[test]
    fn renders_canonical_text() {
        assert_eq!(resolve_text("list<int>").to_string(), "list<int>");
        assert_eq!(resolve_text("dict<str,list<int | null>>").to_string(), "dict<str, list<int | null>>");
        assert_eq!(resolve_text("list").to_string(), "list<any>");
    }

    #[test]
    fn checks_containers_structurally() {
        let ty = resolve_text("list<int>");
        assert!(ty.accepts(&Value::list(vec![Value::Int(1), Value::Int(2)])));
        assert!(!ty.accepts(&Value::list(vec![Value::Int(1), Value::str("x")])));
        assert!(resolve_text("number").accepts(&Value::Double(1.5)));
        assert!(!resolve_text("int").accepts(&Value::Double(1.5)));
    }

    #[test]
    fn typed_lists_reject_later_mismatches() {
        let list = Value::list(vec![Value::Int(1)]);
        bind(&resolve_text("list<int>"), &list).expect("bind");
        let Value::List(inner) = &list else {
            panic!("expected a list");
        };
        assert!(inner.push(Value::Int(2)).is_ok());
        let err = inner.push(Value::str("three")).expect_err("mismatch");
        assert_eq!(err.kind, crate::diagnostics::ErrorKind::Type);
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn unknown_names_are_type_errors() {
        let expr = parse_type("Widget").expect("parses");
        let err = resolve(&expr, &Environment::new()).expect_err("unknown");
        assert_eq!(err.kind, crate::diagnostics::ErrorKind::Type);
    }

    #[test]
    fn infers_element_unions() {
        let value = Value::list(vec![Value::Int(1), Value::str("a"), Value::Int(2)]);
        assert_eq!(infer(&value).to_string(), "list<int | str>");
    }
}
