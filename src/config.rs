use std::{env, path::PathBuf};

/// Environment variable holding extra module directories, separated like `PATH`.
pub const PATH_VARIABLE: &str = "KESTREL_PATH";

pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Host-side settings for one interpreter.
#[derive(Debug, Clone)]
pub struct Config {
    /// Extra directories searched for imported files, after the importing
    /// file's own directory.
    pub search_paths: Vec<PathBuf>,
    /// Arguments exposed to scripts through `args` and `arg`.
    pub args: Vec<String>,
    /// Print module resolution steps to stderr.
    pub trace_imports: bool,
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            args: Vec::new(),
            trace_imports: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    /// Default settings plus any directories listed in `KESTREL_PATH`.
    pub fn from_env() -> Self {
        let search_paths = env::var_os(PATH_VARIABLE)
            .map(|paths| {
                env::split_paths(&paths)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            search_paths,
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_trace_imports(mut self, trace: bool) -> Self {
        self.trace_imports = trace;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
