use std::{fs, path::Path};

use kestrel::{Config, ErrorKind, Interpreter, Value};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, source: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create module directory");
    }
    fs::write(path, source).expect("write module");
}

fn interpreter_for(dir: &Path) -> Interpreter {
    Interpreter::with_config(Config::default().with_search_path(dir))
}

#[test]
fn file_modules_bind_under_their_stem() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "geometry.ks", "let sides = 4\nfn area(w, h) { w * h }\n");
    let mut interpreter = interpreter_for(dir.path());
    let value = interpreter
        .eval_source("import geometry\n[geometry.sides, geometry::area(2, 3)]")
        .unwrap();
    assert_eq!(value.repr(), "[4, 6]");
}

#[test]
fn nested_module_paths_map_to_directories() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "shapes/square.ks", "fn area(s) { s * s }\n");
    let mut interpreter = interpreter_for(dir.path());
    let value = interpreter
        .eval_source("import shapes::square\nsquare.area(5)")
        .unwrap();
    assert_eq!(value.repr(), "25");
}

#[test]
fn string_paths_and_aliases() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "lib/helpers.ks", "fn twice(x) { x * 2 }\n");
    let absolute = dir.path().join("lib/helpers");
    let source = format!(
        "import \"{}\" as h\nh.twice(21)",
        absolute.display().to_string().replace('\\', "/")
    );
    let mut interpreter = Interpreter::new();
    assert_eq!(interpreter.eval_source(&source).unwrap().repr(), "42");
}

#[test]
fn modules_execute_once_per_interpreter() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "counter.ks", "events.append(\"loaded\")\nlet state = []\n");
    let mut interpreter = interpreter_for(dir.path());
    let events = Value::list(Vec::new());
    interpreter.define_global("events", events.clone());
    let value = interpreter
        .eval_source(
            r#"
            import counter
            import counter as again
            counter.state.append(1)
            [counter == again, again.state]
            "#,
        )
        .unwrap();
    assert_eq!(value.repr(), "[true, [1]]");
    assert_eq!(events.repr(), r#"["loaded"]"#);
}

#[test]
fn module_scope_is_isolated_from_the_importer() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "peek.ks", "fn reveal() { secret }\n");
    let mut interpreter = interpreter_for(dir.path());
    let err = interpreter
        .eval_source("let secret = 1\nimport peek\npeek.reveal()")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentifierNotFound);
}

#[test]
fn missing_members_are_not_found() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "small.ks", "let a = 1\n");
    let mut interpreter = interpreter_for(dir.path());
    let err = interpreter.eval_source("import small\nsmall.b").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentifierNotFound);
    assert!(err.to_string().contains("module `small` has no member `b`"));
}

#[test]
fn module_members_are_read_only() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "fixed.ks", "let a = 1\n");
    let mut interpreter = interpreter_for(dir.path());
    let err = interpreter.eval_source("import fixed\nfixed.a = 2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Const);
}

#[test]
fn circular_imports_are_reported() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "ping.ks", "import pong\nlet name = \"ping\"\n");
    write(dir.path(), "pong.ks", "import ping\nlet name = \"pong\"\n");
    let mut interpreter = interpreter_for(dir.path());
    let err = interpreter.eval_source("import ping").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import);
    assert!(err.to_string().contains("circular import"));
}

#[test]
fn a_script_importing_itself_is_a_cycle() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "main.ks", "import main\n");
    let mut interpreter = Interpreter::new();
    let err = interpreter.run_file(dir.path().join("main.ks")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import);
}

#[test]
fn failed_modules_are_not_cached() {
    let dir = tempdir().expect("temp dir");
    write(
        dir.path(),
        "broken.ks",
        "events.append(\"attempt\")\nthrow value_error(\"bad module\")\n",
    );
    let mut interpreter = interpreter_for(dir.path());
    let events = Value::list(Vec::new());
    interpreter.define_global("events", events.clone());
    for _ in 0..2 {
        let err = interpreter.eval_source("import broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }
    assert_eq!(events.repr(), r#"["attempt", "attempt"]"#);
}

#[test]
fn syntax_errors_in_modules_name_the_module_file() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "typo.ks", "let = 3\n");
    let mut interpreter = interpreter_for(dir.path());
    let err = interpreter.eval_source("import typo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.to_string().contains("typo.ks:1"));
}

#[test]
fn missing_modules_are_import_errors() {
    let mut interpreter = Interpreter::new();
    let err = interpreter.eval_source("import nowhere_to_be_found").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import);
    assert!(err.to_string().contains("cannot find module"));
}

#[test]
fn imports_resolve_next_to_the_importing_file_first() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "app/main.ks", "import util\nutil.origin\n");
    write(dir.path(), "app/util.ks", "let origin = \"local\"\n");
    write(dir.path(), "shared/util.ks", "let origin = \"shared\"\n");
    let mut interpreter =
        Interpreter::with_config(Config::default().with_search_path(dir.path().join("shared")));
    let value = interpreter.run_file(dir.path().join("app/main.ks")).unwrap();
    assert_eq!(value.repr(), "\"local\"");
}

#[test]
fn modules_import_their_own_neighbours() {
    let dir = tempdir().expect("temp dir");
    write(dir.path(), "pkg/outer.ks", "import inner\nlet value = inner.value + 1\n");
    write(dir.path(), "pkg/inner.ks", "let value = 41\n");
    let mut interpreter = interpreter_for(&dir.path().join("pkg"));
    let value = interpreter.eval_source("import outer\nouter.value").unwrap();
    assert_eq!(value.repr(), "42");
}

#[test]
fn builtin_modules_bind_under_their_name() {
    let mut interpreter = Interpreter::new();
    let value = interpreter
        .eval_source("import math\nimport math as m\n[math.floor(2.7), m == math]")
        .unwrap();
    assert_eq!(value.repr(), "[2, true]");
}

#[test]
fn builtin_sub_modules_bind_the_root_unless_aliased() {
    let mut interpreter = Interpreter::new();
    let value = interpreter
        .eval_source(
            r#"
            import os::path
            import os::path as p
            [os::path::join("a", "b") == p.join("a", "b"), p.file_name("x/y.txt")]
            "#,
        )
        .unwrap();
    assert_eq!(value.repr(), r#"[true, "y.txt"]"#);
}

#[test]
fn unknown_builtin_sub_modules_are_import_errors() {
    let mut interpreter = Interpreter::new();
    let err = interpreter.eval_source("import math::vectors").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import);
    assert!(err.to_string().contains("has no sub-module `vectors`"));
}

#[test]
fn module_destructors_run_at_shutdown() {
    let dir = tempdir().expect("temp dir");
    write(
        dir.path(),
        "guarded.ks",
        "type Guard { fn destruct() { events.append(\"released\") } }\nlet g = Guard()\n",
    );
    let mut interpreter = interpreter_for(dir.path());
    let events = Value::list(Vec::new());
    interpreter.define_global("events", events.clone());
    interpreter.eval_source("import guarded").unwrap();
    assert_eq!(events.repr(), "[]");
    interpreter.shutdown().unwrap();
    assert_eq!(events.repr(), r#"["released"]"#);
}
