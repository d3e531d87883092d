use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    ast::ImportPath,
    diagnostics::{Diagnostic, ErrorKind},
    environment::{Environment, EnvironmentRef},
    parser,
    runtime::{Flow, Interpreter},
    stdlib,
    value::Value,
};

/// Source file extension for script modules.
pub const EXTENSION: &str = "ks";

/// A loaded module: its own top-level scope, enclosed by the root environment.
pub struct Module {
    pub name: String,
    pub path: Option<PathBuf>,
    pub env: EnvironmentRef,
}

impl Module {
    pub fn new(name: impl Into<String>, path: Option<PathBuf>, env: EnvironmentRef) -> Self {
        Self {
            name: name.into(),
            path,
            env,
        }
    }
}

pub enum ModuleState {
    Loading,
    Loaded(Rc<Module>),
}

/// File modules keyed by canonical path in load order, plus lazily built
/// built-in modules.
#[derive(Default)]
pub struct ModuleCache {
    files: IndexMap<PathBuf, ModuleState>,
    builtins: HashMap<String, Rc<Module>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, path: &Path) -> Option<&ModuleState> {
        self.files.get(path)
    }

    pub fn begin(&mut self, path: PathBuf) {
        self.files.insert(path, ModuleState::Loading);
    }

    pub fn finish(&mut self, path: PathBuf, module: Rc<Module>) {
        self.files.insert(path, ModuleState::Loaded(module));
    }

    pub fn abandon(&mut self, path: &Path) {
        self.files.shift_remove(path);
    }

    /// Top-level scopes of loaded file modules, most recently loaded first.
    pub fn scopes(&self) -> Vec<EnvironmentRef> {
        self.files
            .values()
            .rev()
            .filter_map(|state| match state {
                ModuleState::Loaded(module) => Some(Rc::clone(&module.env)),
                ModuleState::Loading => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        let files = std::mem::take(&mut self.files);
        let builtins = std::mem::take(&mut self.builtins);
        drop(files);
        drop(builtins);
    }
}

fn import_error(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(ErrorKind::Import, message)
}

impl Interpreter {
    /// Executes an `import` statement and binds the resulting module.
    pub(crate) fn import(&mut self, path: &ImportPath, alias: Option<&str>) -> Result<(), Diagnostic> {
        let (module, default_name) = match path {
            ImportPath::Module(segments) => match self.builtin_module(segments)? {
                // Without an alias the root is bound, so `import os::path`
                // makes `os.path` reachable.
                Some((root, module)) => match alias {
                    Some(_) => (module, segments[0].clone()),
                    None => (root, segments[0].clone()),
                },
                None => {
                    let relative: PathBuf = segments.iter().collect();
                    let stem = segments.last().cloned().unwrap_or_default();
                    (self.load_file(&relative.with_extension(EXTENSION))?, stem)
                }
            },
            ImportPath::File(text) => {
                let mut relative = PathBuf::from(text);
                if relative.extension().is_none() {
                    relative.set_extension(EXTENSION);
                }
                let stem = relative
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (self.load_file(&relative)?, stem)
            }
        };
        let name = alias.map(str::to_string).unwrap_or(default_name);
        let existing = self.env.borrow().get_local(&name);
        if let Some(Value::Module(bound)) = &existing {
            if Rc::ptr_eq(bound, &module) {
                return Ok(());
            }
        }
        self.env
            .borrow_mut()
            .define(name, Value::Module(module), false, None)
    }

    /// `a::b::c` resolves against the built-in module `a` when one exists;
    /// the remaining segments walk its sub-modules. Returns the root and the
    /// module the full path names.
    fn builtin_module(
        &mut self,
        segments: &[String],
    ) -> Result<Option<(Rc<Module>, Rc<Module>)>, Diagnostic> {
        let Some(root) = segments.first() else {
            return Ok(None);
        };
        let module = match self.modules.builtins.get(root) {
            Some(module) => Rc::clone(module),
            None => match stdlib::builtin_module(root) {
                Some(module) => {
                    self.trace(format_args!("built-in module `{root}`"));
                    let module = Rc::new(module);
                    self.modules.builtins.insert(root.clone(), Rc::clone(&module));
                    module
                }
                None => return Ok(None),
            },
        };
        let mut current = Rc::clone(&module);
        for segment in &segments[1..] {
            let next = current.env.borrow().get_local(segment);
            current = match next {
                Some(Value::Module(sub)) => sub,
                _ => {
                    return Err(import_error(format!(
                        "module `{}` has no sub-module `{segment}`",
                        current.name
                    )))
                }
            };
        }
        Ok(Some((module, current)))
    }

    fn trace(&self, message: std::fmt::Arguments<'_>) {
        if self.config.trace_imports {
            eprintln!("[import] {message}");
        }
    }

    /// Directories searched for a relative module path, in priority order.
    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(directory) = &self.directory {
            dirs.push(directory.clone());
        }
        dirs.extend(self.config.search_paths.iter().cloned());
        if let Ok(cwd) = env::current_dir() {
            dirs.push(cwd);
        }
        dirs
    }

    fn resolve(&self, relative: &Path) -> Result<PathBuf, Diagnostic> {
        if relative.is_absolute() {
            return fs::canonicalize(relative).map_err(|err| {
                import_error(format!("cannot find module `{}`", relative.display()))
                    .with_note(err.to_string())
            });
        }
        let dirs = self.search_dirs();
        for dir in &dirs {
            let candidate = dir.join(relative);
            self.trace(format_args!("trying {}", candidate.display()));
            if candidate.is_file() {
                return fs::canonicalize(&candidate).map_err(|err| {
                    import_error(format!("cannot open module `{}`", candidate.display()))
                        .with_note(err.to_string())
                });
            }
        }
        let searched: Vec<String> = dirs.iter().map(|dir| dir.display().to_string()).collect();
        Err(import_error(format!("cannot find module `{}`", relative.display()))
            .with_note(format!("searched: {}", searched.join(", "))))
    }

    fn load_file(&mut self, relative: &Path) -> Result<Rc<Module>, Diagnostic> {
        let key = self.resolve(relative)?;
        match self.modules.state(&key) {
            Some(ModuleState::Loaded(module)) => {
                self.trace(format_args!("cached {}", key.display()));
                return Ok(Rc::clone(module));
            }
            Some(ModuleState::Loading) => {
                return Err(import_error(format!(
                    "circular import of `{}`",
                    key.display()
                )));
            }
            None => {}
        }
        self.trace(format_args!("loading {}", key.display()));
        self.modules.begin(key.clone());
        match self.execute_module(&key) {
            Ok(module) => {
                self.modules.finish(key, Rc::clone(&module));
                Ok(module)
            }
            Err(diag) => {
                self.modules.abandon(&key);
                Err(diag)
            }
        }
    }

    fn execute_module(&mut self, key: &Path) -> Result<Rc<Module>, Diagnostic> {
        let source = fs::read_to_string(key).map_err(|err| {
            import_error(format!("cannot read module `{}`", key.display())).with_cause(
                stdlib::os::io_error("import", &key.display().to_string(), err),
            )
        })?;
        let program = parser::parse_program(&source, key.display().to_string())?;
        let scope = Environment::with_parent(Rc::clone(&self.globals));
        let previous_env = std::mem::replace(&mut self.env, Rc::clone(&scope));
        let previous_dir = std::mem::replace(
            &mut self.directory,
            key.parent().map(Path::to_path_buf),
        );
        let flow = self.run_sequence(&program.statements);
        self.env = previous_env;
        self.directory = previous_dir;
        if let Flow::Raised(diag) = flow {
            return Err(diag);
        }
        let name = key
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Rc::new(Module::new(name, Some(key.to_path_buf()), scope)))
    }
}
