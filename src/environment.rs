use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, ErrorKind},
    types::{self, Type},
    value::Value,
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Binding>,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub constant: bool,
    pub declared: Option<Type>,
}

fn not_found(name: &str) -> Diagnostic {
    Diagnostic::new(
        ErrorKind::IdentifierNotFound,
        format!("identifier `{name}` not found"),
    )
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    pub fn parent(&self) -> Option<EnvironmentRef> {
        self.parent.clone()
    }

    /// Introduces `name` in this scope. The value must satisfy `declared`;
    /// typed containers pick up the declared element types.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        value: Value,
        constant: bool,
        declared: Option<Type>,
    ) -> Result<(), Diagnostic> {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            return Err(Diagnostic::new(
                ErrorKind::IdentifierAlreadyExists,
                format!("identifier `{name}` already exists in this scope"),
            ));
        }
        if let Some(ty) = &declared {
            types::bind(ty, &value).map_err(|err| {
                Diagnostic::type_error(format!("cannot bind `{name}`: {}", err.message))
            })?;
        }
        self.bindings.insert(
            name,
            Binding {
                value,
                constant,
                declared,
            },
        );
        Ok(())
    }

    /// Binds a parameter whose argument the caller already checked. The
    /// declared type guards later assignments to the name, but the argument
    /// itself is not constrained: it still belongs to the caller.
    pub fn define_parameter(
        &mut self,
        name: impl Into<String>,
        value: Value,
        declared: Option<Type>,
    ) -> Result<(), Diagnostic> {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            return Err(Diagnostic::new(
                ErrorKind::IdentifierAlreadyExists,
                format!("identifier `{name}` already exists in this scope"),
            ));
        }
        self.bindings.insert(
            name,
            Binding {
                value,
                constant: false,
                declared,
            },
        );
        Ok(())
    }

    /// Inserts or replaces a binding without any checks. Used when installing
    /// built-ins and pre-binding instance fields.
    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).map(|binding| binding.value.clone())
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Makes an existing local binding constant.
    pub fn seal(&mut self, name: &str) {
        if let Some(binding) = self.bindings.get_mut(name) {
            binding.constant = true;
        }
    }

    /// Removes the most recently declared binding.
    pub fn pop(&mut self) -> Option<Binding> {
        self.bindings.pop().map(|(_, binding)| binding)
    }

    /// Empties this scope, returning the removed bindings so the caller
    /// decides when their values are released.
    pub fn clear(&mut self) -> Vec<Binding> {
        self.bindings.drain(..).map(|(_, binding)| binding).collect()
    }

    /// Rebinds the nearest `name` in the scope chain.
    pub fn assign(env: &EnvironmentRef, name: &str, value: Value) -> Result<(), Diagnostic> {
        let mut scope = Rc::clone(env);
        loop {
            let parent = {
                let current = scope.borrow();
                match current.bindings.get(name) {
                    Some(binding) => {
                        if binding.constant {
                            return Err(Diagnostic::new(
                                ErrorKind::Const,
                                format!("cannot assign to constant `{name}`"),
                            ));
                        }
                        if let Some(ty) = &binding.declared {
                            types::bind(ty, &value).map_err(|err| {
                                Diagnostic::type_error(format!(
                                    "cannot assign to `{name}`: {}",
                                    err.message
                                ))
                            })?;
                        }
                        None
                    }
                    None => Some(current.parent.clone().ok_or_else(|| not_found(name))?),
                }
            };
            match parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        let old = {
            let mut current = scope.borrow_mut();
            match current.bindings.get_mut(name) {
                Some(binding) => std::mem::replace(&mut binding.value, value),
                None => return Err(not_found(name)),
            }
        };
        // released after the borrow so a destructor may touch this scope
        drop(old);
        Ok(())
    }

    pub fn get(env: &EnvironmentRef, name: &str) -> Result<Value, Diagnostic> {
        let mut scope = Rc::clone(env);
        loop {
            let parent = {
                let current = scope.borrow();
                if let Some(binding) = current.bindings.get(name) {
                    return Ok(binding.value.clone());
                }
                current.parent.clone()
            };
            match parent {
                Some(parent) => scope = parent,
                None => return Err(not_found(name)),
            }
        }
    }
}
