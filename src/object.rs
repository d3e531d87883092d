use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    ast::TypeDecl,
    environment::EnvironmentRef,
    value::Function,
};

/// A user-declared type. Methods close over the environment the type was
/// declared in; `construct` and `destruct` are kept apart from ordinary methods.
pub struct CustomType {
    pub name: String,
    pub decl: Rc<TypeDecl>,
    pub env: EnvironmentRef,
    pub methods: IndexMap<String, Rc<Function>>,
    pub constructor: Option<Rc<Function>>,
    pub destructor: Option<Rc<Function>>,
    pub reaper: Reaper,
}

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomType({})", self.name)
    }
}

pub struct Instance {
    pub ty: Rc<CustomType>,
    /// Field bindings. Its parent is the type's declaring environment so that
    /// method bodies see fields first, then the enclosing scope.
    pub fields: EnvironmentRef,
    armed: Cell<bool>,
}

impl Instance {
    pub fn new(ty: Rc<CustomType>, fields: EnvironmentRef) -> Self {
        Self {
            ty,
            fields,
            armed: Cell::new(false),
        }
    }

    /// Rebuilds a receiver from the state of a dropped instance so its
    /// destructor can run. The ghost itself never schedules a destructor.
    pub fn ghost(doomed: Doomed) -> Self {
        Self::new(doomed.ty, doomed.fields)
    }

    /// Schedules the destructor for when the last strong reference goes away.
    /// Only called once construction has succeeded.
    pub fn arm(&self) {
        if self.ty.destructor.is_some() {
            self.armed.set(true);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.armed.replace(false) {
            self.ty.reaper.defer(Doomed {
                ty: Rc::clone(&self.ty),
                fields: Rc::clone(&self.fields),
            });
        }
    }
}

/// What is left of an instance whose destructor is still pending.
pub struct Doomed {
    pub ty: Rc<CustomType>,
    pub fields: EnvironmentRef,
}

/// Queue of pending destructor runs, drained by the interpreter at statement
/// boundaries and after calls.
#[derive(Clone, Default)]
pub struct Reaper(Rc<RefCell<VecDeque<Doomed>>>);

impl Reaper {
    pub fn defer(&self, doomed: Doomed) {
        self.0.borrow_mut().push_back(doomed);
    }

    pub fn next(&self) -> Option<Doomed> {
        self.0.borrow_mut().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Drops every pending entry without running destructors. Dropping an
    /// entry may release further instances, so this loops until settled.
    pub fn clear(&self) {
        loop {
            let pending = std::mem::take(&mut *self.0.borrow_mut());
            if pending.is_empty() {
                break;
            }
            drop(pending);
        }
    }
}
