use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::Instant,
};

use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::{
        AssignOp, BinaryOp, CatchClause, Expr, ExprKind, FunctionBody, FunctionDecl, Literal,
        Program, Stmt, StmtKind, TypeDecl,
    },
    config::Config,
    diagnostics::{Diagnostic, ErrorKind, Result},
    environment::{Binding, Environment, EnvironmentRef},
    modules::ModuleCache,
    object::{CustomType, Instance, Reaper},
    operators, parser,
    stdlib::{self, methods::MethodTables},
    types::{self, Type},
    value::{BoundMethod, Dict, Function, Key, NativeFunction, Set, UserFunction, Value},
};

/// File label used for sources that do not come from disk.
pub const EVAL_FILE: &str = "<eval>";

pub(crate) type Eval<T> = std::result::Result<T, Diagnostic>;

/// Outcome of executing a statement.
#[derive(Debug)]
pub enum Flow {
    Next,
    NextValue(Value),
    Return(Value),
    Break,
    Continue,
    Raised(Diagnostic),
}

pub struct Interpreter {
    pub(crate) globals: EnvironmentRef,
    pub(crate) env: EnvironmentRef,
    pub(crate) modules: ModuleCache,
    pub(crate) config: Config,
    pub(crate) reaper: Reaper,
    /// Directory of the file being executed; imports resolve against it first.
    pub(crate) directory: Option<PathBuf>,
    pub(crate) methods: MethodTables,
    pub(crate) started: Instant,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let globals = Environment::new();
        stdlib::install_prelude(&globals, &config);
        let env = Environment::with_parent(Rc::clone(&globals));
        Self {
            globals,
            env,
            modules: ModuleCache::new(),
            config,
            reaper: Reaper::default(),
            directory: None,
            methods: MethodTables::new(),
            started: Instant::now(),
            depth: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn globals(&self) -> &EnvironmentRef {
        &self.globals
    }

    /// Binds a host value in the root environment, replacing any previous one.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(
            name,
            Binding {
                value,
                constant: false,
                declared: None,
            },
        );
    }

    /// Looks `name` up from the top-level scope.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        Environment::get(&self.env, name).ok()
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        self.eval_named(source, EVAL_FILE)
    }

    pub fn eval_named(&mut self, source: &str, file: &str) -> Result<Value> {
        let program = parser::parse_program(source, file)?;
        self.execute_program(&program)
    }

    /// Runs a script file. The file counts as loading for the duration so
    /// that a module importing it back is reported as a cycle.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let program = parser::parse_program(&source, path.display().to_string())?;
        let key = fs::canonicalize(path)?;
        let directory = key.parent().map(Path::to_path_buf);
        let previous = std::mem::replace(&mut self.directory, directory);
        self.modules.begin(key.clone());
        let result = self.execute_program(&program);
        self.modules.abandon(&key);
        self.directory = previous;
        result
    }

    pub fn execute_program(&mut self, program: &Program) -> Result<Value> {
        match self.run_sequence(&program.statements) {
            Flow::Raised(diag) => Err(diag.into()),
            Flow::NextValue(value) | Flow::Return(value) => Ok(value),
            Flow::Next | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    /// Releases top-level bindings newest first, then those of loaded modules,
    /// running destructors as they become due. Earlier bindings stay
    /// visible to those destructors.
    pub fn shutdown(&mut self) -> Result<()> {
        let top = Rc::clone(&self.env);
        let mut failure = self.release(&top);
        // Module functions keep their own scope alive, so module bindings
        // are released one by one as well.
        for scope in self.modules.scopes() {
            let next = self.release(&scope);
            failure = merge_failure(failure, next);
        }
        self.modules.clear();
        failure = merge_failure(failure, self.reap());
        match failure {
            Some(diag) => Err(diag.into()),
            None => Ok(()),
        }
    }

    fn release(&mut self, scope: &EnvironmentRef) -> Option<Diagnostic> {
        let mut failure = None;
        loop {
            let binding = scope.borrow_mut().pop();
            let Some(binding) = binding else {
                break;
            };
            drop(binding);
            failure = merge_failure(failure, self.reap());
        }
        failure
    }

    /// Calls any callable value with already evaluated arguments.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Eval<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, None, args),
            Value::Method(method) => {
                self.call_function(&method.function, Some(method.receiver.clone()), args)
            }
            Value::Type(ty) => self.construct(ty, args),
            other => Err(Diagnostic::type_error(format!(
                "value of type `{}` is not callable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn run_sequence(&mut self, statements: &[Stmt]) -> Flow {
        let mut last = Flow::Next;
        for stmt in statements {
            let flow = self.execute(stmt);
            match self.settle(flow) {
                flow @ (Flow::Next | Flow::NextValue(_)) => last = flow,
                other => return other,
            }
        }
        last
    }

    fn execute_block(&mut self, statements: &[Stmt], scope: EnvironmentRef) -> Flow {
        let previous = std::mem::replace(&mut self.env, scope);
        let flow = self.run_sequence(statements);
        let scope = std::mem::replace(&mut self.env, previous);
        drop(scope);
        self.settle(flow)
    }

    fn child_scope(&self) -> EnvironmentRef {
        Environment::with_parent(Rc::clone(&self.env))
    }

    fn execute(&mut self, stmt: &Stmt) -> Flow {
        match self.execute_statement(stmt) {
            Ok(flow) => flow,
            Err(diag) => Flow::Raised(diag.or_at(&stmt.location)),
        }
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Eval<Flow> {
        match &stmt.kind {
            StmtKind::Let {
                name,
                constant,
                annotation,
                value,
            } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                let declared = match annotation {
                    Some(annotation) => Some(types::resolve(annotation, &self.env)?),
                    None => None,
                };
                self.env
                    .borrow_mut()
                    .define(name.as_str(), value, *constant, declared)?;
                Ok(Flow::Next)
            }
            StmtKind::Function(decl) => {
                let name = decl.name.clone().unwrap_or_default();
                let function = self.closure(decl);
                self.env.borrow_mut().define(name, function, false, None)?;
                Ok(Flow::Next)
            }
            StmtKind::Type(decl) => {
                let ty = self.declare_type(decl);
                self.env
                    .borrow_mut()
                    .define(decl.name.as_str(), Value::Type(ty), true, None)?;
                Ok(Flow::Next)
            }
            StmtKind::Expr(expr) => Ok(Flow::NextValue(self.evaluate(expr)?)),
            StmtKind::Block(statements) => {
                let scope = self.child_scope();
                Ok(self.execute_block(statements, scope))
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if self.evaluate(condition)?.is_truthy() {
                    Some(then_branch)
                } else {
                    else_branch.as_ref()
                };
                match branch {
                    Some(statements) => {
                        let scope = self.child_scope();
                        Ok(self.execute_block(statements, scope))
                    }
                    None => Ok(Flow::Next),
                }
            }
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    let scope = self.child_scope();
                    match self.execute_block(body, scope) {
                        Flow::Break => break,
                        flow @ (Flow::Return(_) | Flow::Raised(_)) => return Ok(flow),
                        _ => {}
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::For {
                binding,
                annotation,
                iterable,
                body,
            } => {
                let iterable = self.evaluate(iterable)?;
                let declared = match annotation {
                    Some(annotation) => Some(types::resolve(annotation, &self.env)?),
                    None => None,
                };
                for item in iterable.iterate()? {
                    let scope = self.child_scope();
                    scope
                        .borrow_mut()
                        .define(binding.as_str(), item, false, declared.clone())?;
                    match self.execute_block(body, scope) {
                        Flow::Break => break,
                        flow @ (Flow::Return(_) | Flow::Raised(_)) => return Ok(flow),
                        _ => {}
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Try { body, handlers } => {
                let scope = self.child_scope();
                match self.execute_block(body, scope) {
                    Flow::Raised(diag) => self.handle(diag, handlers),
                    flow => Ok(flow),
                }
            }
            StmtKind::Throw(expr) => {
                let diag = match self.evaluate(expr)? {
                    Value::Error(err) => Rc::try_unwrap(err).unwrap_or_else(|rc| (*rc).clone()),
                    Value::Str(message) => Diagnostic::new(ErrorKind::Undefined, &*message),
                    other => Diagnostic::new(ErrorKind::Undefined, other.display()),
                };
                Ok(Flow::Raised(diag.or_at(&stmt.location)))
            }
            StmtKind::Import { path, alias } => {
                self.import(path, alias.as_deref())?;
                Ok(Flow::Next)
            }
        }
    }

    /// Runs the first handler whose kind list matches; an empty list catches
    /// everything. Unmatched errors keep propagating.
    fn handle(&mut self, diag: Diagnostic, handlers: &[CatchClause]) -> Eval<Flow> {
        for handler in handlers {
            let mut matched = handler.kinds.is_empty();
            for name in &handler.kinds {
                match ErrorKind::from_name(name) {
                    Some(kind) => matched |= kind == diag.kind,
                    None => {
                        return Err(Diagnostic::type_error(format!("unknown error kind `{name}`"))
                            .with_cause(diag))
                    }
                }
            }
            if matched {
                let scope = self.child_scope();
                scope
                    .borrow_mut()
                    .define(handler.binding.as_str(), Value::error(diag), false, None)?;
                return Ok(self.execute_block(&handler.body, scope));
            }
        }
        Ok(Flow::Raised(diag))
    }

    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Eval<Value> {
        self.eval_expr(expr).map_err(|diag| diag.or_at(&expr.location))
    }

    fn evaluate_in(&mut self, expr: &Expr, scope: EnvironmentRef) -> Eval<Value> {
        let previous = std::mem::replace(&mut self.env, scope);
        let result = self.evaluate(expr);
        self.env = previous;
        result
    }

    fn eval_expr(&mut self, expr: &Expr) -> Eval<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Int(n) => Value::Int(*n),
                Literal::Double(n) => Value::Double(*n),
                Literal::Str(text) => Value::str(text),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            ExprKind::Variable(name) => Environment::get(&self.env, name),
            ExprKind::Unary { op, operand } => {
                let operand = self.evaluate(operand)?;
                operators::unary(*op, &operand)
            }
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let result = self.evaluate(left)?.is_truthy() && self.evaluate(right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let result = self.evaluate(left)?.is_truthy() || self.evaluate(right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                operators::binary(*op, &left, &right)
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }
            ExprKind::Assign { op, target, value } => self.assign(*op, target, value),
            ExprKind::Call { callee, args } => {
                let callee = self.evaluate(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                self.call(&callee, values)
            }
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                operators::index(&target, &index)
            }
            ExprKind::Slice {
                target,
                lower,
                upper,
                stride,
            } => {
                let target = self.evaluate(target)?;
                let lower = self.evaluate_optional(lower.as_deref())?;
                let upper = self.evaluate_optional(upper.as_deref())?;
                let stride = self.evaluate_optional(stride.as_deref())?;
                operators::slice(&target, lower.as_ref(), upper.as_ref(), stride.as_ref())
            }
            ExprKind::Member { target, name } => {
                let target = self.evaluate(target)?;
                self.member(&target, name)
            }
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = Key::new(self.evaluate(key)?)?;
                    let value = self.evaluate(value)?;
                    map.insert(key, value);
                }
                Ok(Value::Dict(Rc::new(Dict::new(map))))
            }
            ExprKind::Set(items) => {
                let mut set = IndexSet::with_capacity(items.len());
                for item in items {
                    set.insert(Key::new(self.evaluate(item)?)?);
                }
                Ok(Value::Set(Rc::new(Set::new(set))))
            }
            ExprKind::Function(decl) => Ok(self.closure(decl)),
        }
    }

    fn evaluate_optional(&mut self, expr: Option<&Expr>) -> Eval<Option<Value>> {
        match expr {
            Some(expr) => self.evaluate(expr).map(Some),
            None => Ok(None),
        }
    }

    fn closure(&self, decl: &Rc<FunctionDecl>) -> Value {
        Value::Function(Rc::new(Function::User(UserFunction {
            decl: Rc::clone(decl),
            env: Rc::clone(&self.env),
        })))
    }

    fn declare_type(&self, decl: &Rc<TypeDecl>) -> Rc<CustomType> {
        let mut methods = IndexMap::new();
        let mut constructor = None;
        let mut destructor = None;
        for method in &decl.methods {
            let function = Rc::new(Function::User(UserFunction {
                decl: Rc::clone(method),
                env: Rc::clone(&self.env),
            }));
            match method.name.as_deref() {
                Some("construct") => constructor = Some(function),
                Some("destruct") => destructor = Some(function),
                Some(name) => {
                    methods.insert(name.to_string(), function);
                }
                None => {}
            }
        }
        Rc::new(CustomType {
            name: decl.name.clone(),
            decl: Rc::clone(decl),
            env: Rc::clone(&self.env),
            methods,
            constructor,
            destructor,
            reaper: self.reaper.clone(),
        })
    }

    fn assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> Eval<Value> {
        match &target.kind {
            ExprKind::Variable(name) => {
                let rhs = self.evaluate(value)?;
                let updated = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Update(op) => {
                        let current = Environment::get(&self.env, name)?;
                        operators::binary(op, &current, &rhs)?
                    }
                };
                Environment::assign(&self.env, name, updated.clone())?;
                Ok(updated)
            }
            ExprKind::Index { target, index } => {
                let object = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                let rhs = self.evaluate(value)?;
                let updated = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Update(op) => {
                        let current = operators::index(&object, &index)?;
                        operators::binary(op, &current, &rhs)?
                    }
                };
                operators::set_index(&object, &index, updated.clone())?;
                Ok(updated)
            }
            ExprKind::Member { target, name } => {
                let object = self.evaluate(target)?;
                let rhs = self.evaluate(value)?;
                let updated = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Update(op) => {
                        let current = self.member(&object, name)?;
                        operators::binary(op, &current, &rhs)?
                    }
                };
                self.set_member(&object, name, updated.clone())?;
                Ok(updated)
            }
            _ => Err(Diagnostic::syntax_error(
                "invalid assignment target",
                target.location.clone(),
            )),
        }
    }

    /// Member lookup: instances resolve methods before fields; built-in
    /// values expose their method tables.
    pub(crate) fn member(&mut self, target: &Value, name: &str) -> Eval<Value> {
        match target {
            Value::Instance(instance) => {
                if let Some(method) = instance.ty.methods.get(name) {
                    return Ok(bind_method(target, method));
                }
                if let Some(value) = instance.fields.borrow().get_local(name) {
                    return Ok(value);
                }
                return Err(Diagnostic::new(
                    ErrorKind::IdentifierNotFound,
                    format!("`{}` has no member `{name}`", instance.ty.name),
                ));
            }
            Value::Module(module) => {
                return module.env.borrow().get_local(name).ok_or_else(|| {
                    Diagnostic::new(
                        ErrorKind::IdentifierNotFound,
                        format!("module `{}` has no member `{name}`", module.name),
                    )
                });
            }
            Value::Error(diag) => {
                if let Some(value) = error_field(diag, name) {
                    return Ok(value);
                }
            }
            Value::Range(range) => match name {
                "start" => return Ok(Value::Int(range.start)),
                "stop" => return Ok(Value::Int(range.stop)),
                "step" => return Ok(Value::Int(range.step)),
                _ => {}
            },
            Value::Type(ty) if name == "name" => return Ok(Value::str(&ty.name)),
            _ => {}
        }
        match self.methods.lookup(target, name) {
            Some(function) => Ok(bind_method(target, &function)),
            None => Err(Diagnostic::new(
                ErrorKind::IdentifierNotFound,
                format!(
                    "value of type `{}` has no member `{name}`",
                    target.type_name()
                ),
            )),
        }
    }

    fn set_member(&mut self, target: &Value, name: &str, value: Value) -> Eval<()> {
        match target {
            Value::Instance(instance) => {
                if !instance.fields.borrow().contains_local(name) {
                    if instance.ty.methods.contains_key(name) {
                        return Err(Diagnostic::new(
                            ErrorKind::Const,
                            format!("cannot assign to method `{name}` of `{}`", instance.ty.name),
                        ));
                    }
                    return Err(Diagnostic::new(
                        ErrorKind::IdentifierNotFound,
                        format!("`{}` has no field `{name}`", instance.ty.name),
                    ));
                }
                Environment::assign(&instance.fields, name, value)
            }
            Value::Module(module) => Err(Diagnostic::new(
                ErrorKind::Const,
                format!("cannot assign to member `{name}` of module `{}`", module.name),
            )),
            other => Err(Diagnostic::type_error(format!(
                "cannot assign to member `{name}` of a value of type `{}`",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Eval<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(Diagnostic::new(
                ErrorKind::Undefined,
                format!(
                    "maximum call depth of {} exceeded",
                    self.config.max_call_depth
                ),
            ));
        }
        self.depth += 1;
        let result = match &**function {
            Function::Native(native) => self.call_native(native, receiver, args),
            Function::User(user) => self.call_user(user, receiver, args),
        };
        self.depth -= 1;
        self.settle_result(result)
    }

    fn call_native(
        &mut self,
        native: &NativeFunction,
        receiver: Option<Value>,
        mut args: Vec<Value>,
    ) -> Eval<Value> {
        if let Some(receiver) = receiver {
            args.insert(0, receiver);
        }
        let max = native.rest.is_none().then_some(native.params.len());
        check_arity(native.name, native.required(), max, args.len())?;
        for (position, arg) in args.iter().enumerate() {
            let (name, ty) = match native.params.get(position) {
                Some(param) => (param.name, &param.ty),
                None => match &native.rest {
                    Some(ty) => ("...", ty),
                    None => break,
                },
            };
            check_argument(native.name, position, name, ty, arg)?;
        }
        (native.callback)(self, &args)
    }

    fn call_user(
        &mut self,
        user: &UserFunction,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Eval<Value> {
        let decl = &user.decl;
        let name = decl.name.as_deref().unwrap_or("<anonymous>");
        let required = decl.params.iter().filter(|p| p.default.is_none()).count();
        check_arity(name, required, Some(decl.params.len()), args.len())?;
        let parent = match &receiver {
            Some(Value::Instance(instance)) => Rc::clone(&instance.fields),
            _ => Rc::clone(&user.env),
        };
        let scope = Environment::with_parent(parent);
        if let Some(receiver) = receiver {
            scope.borrow_mut().define("this", receiver, true, None)?;
        }
        let previous = std::mem::replace(&mut self.env, scope);
        let result = self.invoke(user, name, args);
        let scope = std::mem::replace(&mut self.env, previous);
        drop(scope);
        result
    }

    fn invoke(&mut self, user: &UserFunction, name: &str, args: Vec<Value>) -> Eval<Value> {
        let decl = &user.decl;
        let mut args = args.into_iter();
        for (position, param) in decl.params.iter().enumerate() {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.evaluate(default)?,
                (None, None) => Value::Null,
            };
            let declared = match &param.annotation {
                Some(annotation) => {
                    let ty = types::resolve(annotation, &user.env)?;
                    check_argument(name, position, &param.name, &ty, &value)?;
                    Some(ty)
                }
                None => None,
            };
            self.env
                .borrow_mut()
                .define_parameter(param.name.as_str(), value, declared)?;
        }
        let result = match &decl.body {
            FunctionBody::Expr(expr) => self.evaluate(expr)?,
            FunctionBody::Block(statements) => match self.run_sequence(statements) {
                Flow::Return(value) | Flow::NextValue(value) => value,
                Flow::Raised(diag) => return Err(diag),
                Flow::Next | Flow::Break | Flow::Continue => Value::Null,
            },
        };
        if let Some(ret) = &decl.ret {
            let ty = types::resolve(ret, &user.env)?;
            if !ty.accepts(&result) {
                return Err(Diagnostic::type_error(format!(
                    "`{name}` declared to return {ty}: {}",
                    types::mismatch(&ty, &result).message
                )));
            }
        }
        Ok(result)
    }

    /// Creates an instance: fields are pre-bound to their defaults, then the
    /// constructor runs. The destructor is armed only once that succeeds.
    fn construct(&mut self, ty: &Rc<CustomType>, args: Vec<Value>) -> Eval<Value> {
        let fields = Environment::with_parent(Rc::clone(&ty.env));
        for field in &ty.decl.fields {
            let declared = match &field.annotation {
                Some(annotation) => Some(types::resolve(annotation, &ty.env)?),
                None => None,
            };
            let value = match &field.default {
                Some(default) => {
                    let value = self.evaluate_in(default, Rc::clone(&ty.env))?;
                    if let Some(declared) = &declared {
                        types::bind(declared, &value).map_err(|err| {
                            Diagnostic::type_error(format!(
                                "field `{}` of `{}`: {}",
                                field.name, ty.name, err.message
                            ))
                        })?;
                    }
                    value
                }
                None => Value::Null,
            };
            fields.borrow_mut().insert(
                field.name.as_str(),
                Binding {
                    value,
                    constant: false,
                    declared,
                },
            );
        }
        let instance = Rc::new(Instance::new(Rc::clone(ty), Rc::clone(&fields)));
        match &ty.constructor {
            Some(constructor) => {
                self.call_function(
                    constructor,
                    Some(Value::Instance(Rc::clone(&instance))),
                    args,
                )?;
            }
            None if !args.is_empty() => {
                return Err(Diagnostic::type_error(format!(
                    "`{}` takes no constructor arguments but got {}",
                    ty.name,
                    args.len()
                )));
            }
            None => {}
        }
        {
            let mut fields = fields.borrow_mut();
            for field in ty.decl.fields.iter().filter(|field| field.constant) {
                fields.seal(&field.name);
            }
        }
        instance.arm();
        Ok(Value::Instance(instance))
    }

    /// Runs destructors of instances released since the last call, returning
    /// the first failure with any later ones attached as secondaries.
    fn reap(&mut self) -> Option<Diagnostic> {
        let mut failure: Option<Diagnostic> = None;
        while let Some(doomed) = self.reaper.next() {
            let ghost = Rc::new(Instance::ghost(doomed));
            let Some(destructor) = ghost.ty.destructor.clone() else {
                continue;
            };
            if let Err(diag) = self.call_function(&destructor, Some(Value::Instance(ghost)), Vec::new()) {
                failure = Some(match failure {
                    Some(first) => first.with_secondary(diag),
                    None => diag,
                });
            }
        }
        failure
    }

    fn settle(&mut self, flow: Flow) -> Flow {
        if self.reaper.is_empty() {
            return flow;
        }
        match (self.reap(), flow) {
            (None, flow) => flow,
            (Some(failure), Flow::Raised(diag)) => Flow::Raised(diag.with_secondary(failure)),
            (Some(failure), _) => Flow::Raised(failure),
        }
    }

    fn settle_result(&mut self, result: Eval<Value>) -> Eval<Value> {
        if self.reaper.is_empty() {
            return result;
        }
        match (self.reap(), result) {
            (None, result) => result,
            (Some(failure), Err(diag)) => Err(diag.with_secondary(failure)),
            (Some(failure), Ok(_)) => Err(failure),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        let bindings = self.env.borrow_mut().clear();
        drop(bindings);
        self.modules.clear();
        self.reaper.clear();
    }
}

fn merge_failure(first: Option<Diagnostic>, next: Option<Diagnostic>) -> Option<Diagnostic> {
    match (first, next) {
        (Some(first), Some(next)) => Some(first.with_secondary(next)),
        (first, next) => first.or(next),
    }
}

fn bind_method(receiver: &Value, function: &Rc<Function>) -> Value {
    Value::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        function: Rc::clone(function),
    }))
}

fn error_field(diag: &Diagnostic, name: &str) -> Option<Value> {
    let location = diag.location.as_ref();
    Some(match name {
        "kind" => Value::str(diag.kind.name()),
        "message" => Value::str(&diag.message),
        "file" => location.map_or(Value::Null, |loc| Value::str(&*loc.file)),
        "line" => location.map_or(Value::Null, |loc| Value::Int(loc.line as i64)),
        "column" => location.map_or(Value::Null, |loc| Value::Int(loc.column as i64)),
        "cause" => diag
            .cause
            .as_ref()
            .map_or(Value::Null, |cause| Value::error((**cause).clone())),
        "notes" => Value::list(diag.notes.iter().map(Value::str).collect()),
        _ => return None,
    })
}

fn check_arity(name: &str, min: usize, max: Option<usize>, got: usize) -> Eval<()> {
    let (expected, count) = match max {
        Some(max) if got > max => {
            if min == max {
                (format!("{max}"), max)
            } else {
                (format!("at most {max}"), max)
            }
        }
        _ if got < min => {
            if max == Some(min) {
                (format!("{min}"), min)
            } else {
                (format!("at least {min}"), min)
            }
        }
        _ => return Ok(()),
    };
    let plural = if count == 1 { "" } else { "s" };
    Err(Diagnostic::type_error(format!(
        "`{name}` expects {expected} argument{plural} but got {got}"
    )))
}

fn check_argument(function: &str, position: usize, name: &str, ty: &Type, value: &Value) -> Eval<()> {
    if ty.accepts(value) {
        return Ok(());
    }
    let mismatch = types::mismatch(ty, value);
    Err(Diagnostic::type_error(format!(
        "incompatible type for argument {} (`{name}`) of `{function}`: {}",
        position + 1,
        mismatch.message
    )))
}
