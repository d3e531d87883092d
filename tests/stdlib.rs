use std::fs;

use kestrel::{ErrorKind, Interpreter, KestrelError, Value};
use tempfile::tempdir;

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn render(source: &str) -> String {
    eval(source).repr()
}

fn error_kind(source: &str) -> ErrorKind {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value:?}"),
        Err(err) => err.kind(),
    }
}

#[test]
fn conversions() {
    assert_eq!(render("[int(\"42\"), int(3.9), int(-3.9), int(true)]"), "[42, 3, -3, 1]");
    assert_eq!(render("[double(2), double(\"1.5\"), str(12), str(\"s\")]"), r#"[2.0, 1.5, "12", "s"]"#);
    assert_eq!(render("[bool(0), bool(\"\"), bool([0]), bool(null)]"), "[false, false, true, false]");
    assert_eq!(error_kind("int(\"4x\")"), ErrorKind::Value);
    assert_eq!(error_kind("int([1])"), ErrorKind::Type);
}

#[test]
fn format_substitutes_in_order() {
    assert_eq!(render("format(\"{} + {} = {}\", 1, 2.5, \"x\")"), r#""1 + 2.5 = x""#);
    assert_eq!(render("format(\"{{literal}}\")"), r#""{literal}""#);
    assert_eq!(error_kind("format(\"{} {}\", 1)"), ErrorKind::Value);
}

#[test]
fn format_specs_control_width_and_notation() {
    assert_eq!(render(r#"format("[{:>6.2f}]", 3.14159)"#), r#""[  3.14]""#);
    assert_eq!(render(r#"format("{:#x} {:08b}", 255, 5)"#), r#""0xff 00000101""#);
    assert_eq!(render(r#"format("{1}-{0}", "a", "b")"#), r#""b-a""#);
    assert_eq!(render(r#"format("{:*^7}|{:?}", "mid", "q")"#), r#""**mid**|\"q\"""#);
    assert_eq!(render(r#"format("{:+.1e}", 12345.0)"#), r#""+1.2e+04""#);
    assert_eq!(error_kind(r#"format("{:d}", "text")"#), ErrorKind::Type);
    assert_eq!(error_kind(r#"format("{5}", 1)"#), ErrorKind::Index);
    assert_eq!(error_kind(r#"format("{}", 1, 2)"#), ErrorKind::Value);
    assert_eq!(error_kind(r#"format("{:z}", 1)"#), ErrorKind::Value);
}

#[test]
fn open_returns_file_objects() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("log.txt");
    let path = path.display().to_string().replace('\\', "/");
    let source = format!(
        r#"
        let out = open("{path}", "w")
        out.write("first\nsecond\n")
        out.close()
        let more = open("{path}", "a")
        more.write("third\n")
        more.close()
        let f = open("{path}")
        let head = f.read_line()
        let rest = f.read_lines()
        let end = f.read_line()
        f.seek(0)
        let prefix = f.read(5)
        let at = f.tell()
        f.close()
        [type_str(f), head, rest, end, prefix, at, f.is_open()]
        "#
    );
    assert_eq!(
        render(&source),
        r#"["io", "first", ["second", "third"], null, "first", 5, false]"#
    );
    assert_eq!(fs::read_to_string(dir.path().join("log.txt")).expect("read"), "first\nsecond\nthird\n");
}

#[test]
fn file_object_failures() {
    let dir = tempdir().expect("temp dir");
    let missing = dir.path().join("missing.txt").display().to_string().replace('\\', "/");
    assert_eq!(error_kind(&format!(r#"open("{missing}")"#)), ErrorKind::Os);
    assert_eq!(error_kind(&format!(r#"open("{missing}", "rw+")"#)), ErrorKind::Value);
    let path = dir.path().join("closed.txt").display().to_string().replace('\\', "/");
    let source = format!("let f = open(\"{path}\", \"w\")\nf.close()\nf.write(\"late\")");
    assert_eq!(error_kind(&source), ErrorKind::Value);
}

#[test]
fn collection_builders() {
    assert_eq!(render("list(range(3))"), "[0, 1, 2]");
    assert_eq!(render("list(\"ab\")"), r#"["a", "b"]"#);
    assert_eq!(render("dict([[\"a\", 1], [\"b\", 2]])"), r#"{"a": 1, "b": 2}"#);
    assert_eq!(render("len(set([1, 2, 2, 3]))"), "3");
    assert_eq!(render("list(range(10, 0, -3))"), "[10, 7, 4, 1]");
    assert_eq!(error_kind("range(0, 5, 0)"), ErrorKind::Value);
    assert_eq!(error_kind("dict([[1, 2, 3]])"), ErrorKind::Value);
}

#[test]
fn sequence_helpers() {
    assert_eq!(render("sorted([3, 1, 2])"), "[1, 2, 3]");
    assert_eq!(render("reversed(\"abc\")"), r#"["c", "b", "a"]"#);
    assert_eq!(render("[min(4, 2, 8), max([4, 2, 8]), min(\"b\", \"a\")]"), r#"[2, 8, "a"]"#);
    assert_eq!(render("[sum([1, 2, 3]), sum([0.5, 0.25], 1)]"), "[6, 1.75]");
    assert_eq!(error_kind("sorted([1, \"a\"])"), ErrorKind::Type);
    assert_eq!(error_kind("max([])"), ErrorKind::Value);
}

#[test]
fn dict_helpers_preserve_insertion_order() {
    let value = render(
        r#"
        let d = {"z": 1, "a": 2}
        d["m"] = 3
        [keys(d), values(d), items(d)[0]]
        "#,
    );
    assert_eq!(value, r#"[["z", "a", "m"], [1, 2, 3], ["z", 1]]"#);
}

#[test]
fn assert_raises_value_error() {
    assert_eq!(render("assert(1 < 2)"), "null");
    let mut interpreter = Interpreter::new();
    let err = interpreter
        .eval_source("assert(false, \"numbers are broken\")")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(err.to_string().contains("assertion failed: numbers are broken"));
}

#[test]
fn error_constructors_build_catchable_values() {
    let value = render(
        r#"
        let e = error("key_error", "gone")
        let wrapped = os_error("disk", e)
        [e.kind, wrapped.cause.message, type_str(e)]
        "#,
    );
    assert_eq!(value, r#"["key_error", "gone", "error"]"#);
    assert_eq!(error_kind("error(\"nonsense\", \"x\")"), ErrorKind::Value);
}

#[test]
fn version_matches_the_package() {
    assert_eq!(eval("version()").display(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn list_methods() {
    let value = render(
        r#"
        let xs = [3, 1]
        xs.push(2)
        xs.insert(0, 9)
        xs.remove(9)
        xs.sort()
        let last = xs.pop()
        xs.extend([7, 8])
        xs.reverse()
        [xs, last, xs.index_of(7), xs.index_of(42), xs.contains(1), xs.len()]
        "#,
    );
    assert_eq!(value, "[[8, 7, 2, 1], 3, 1, -1, true, 4]");
    assert_eq!(error_kind("[1].remove(2)"), ErrorKind::Value);
    assert_eq!(error_kind("[].pop()"), ErrorKind::Index);
    assert_eq!(error_kind("[1].pop(5)"), ErrorKind::Index);
}

#[test]
fn dict_methods() {
    let value = render(
        r#"
        let d = {"a": 1}
        let missing = d.get("b", 0)
        let removed = d.remove("a")
        [missing, removed, d.len(), d.contains("a"), d.get("a")]
        "#,
    );
    assert_eq!(value, "[0, 1, 0, false, null]");
    assert_eq!(error_kind("let d = {}\nd.remove(\"a\")"), ErrorKind::Key);
    assert_eq!(error_kind("let d = {}\nd[\"a\"]"), ErrorKind::Key);
}

#[test]
fn set_methods() {
    let value = render(
        r#"
        let a = {1, 2, 3}
        let b = {2, 3, 4}
        a.add(5)
        a.remove(1)
        [len(a.union(b)), a.intersection(b).contains(3), a.contains(1)]
        "#,
    );
    assert_eq!(value, "[4, true, false]");
    assert_eq!(error_kind("let s = {1}\ns.remove(2)"), ErrorKind::Key);
}

#[test]
fn string_methods() {
    let value = render(
        r#"
        let s = "  Hello, World  ".trim()
        [s.upper(), s.lower(), s.split(", "), "a b  c".split(), "-".join(["x", "y"]),
         s.replace("World", "There"), s.find("World"), s.starts_with("He"),
         s.ends_with("!"), s.contains("lo"), "héllo".len(), "ab".chars()]
        "#,
    );
    assert_eq!(
        value,
        r#"["HELLO, WORLD", "hello, world", ["Hello", "World"], ["a", "b", "c"], "x-y", "Hello, There", 7, true, false, true, 5, ["a", "b"]]"#
    );
    assert_eq!(error_kind("\"abc\".split(\"\")"), ErrorKind::Value);
    assert_eq!(error_kind("\",\".join([1, 2])"), ErrorKind::Type);
}

#[test]
fn unknown_methods_are_not_found() {
    assert_eq!(error_kind("[1].shuffle()"), ErrorKind::IdentifierNotFound);
    assert_eq!(error_kind("(5).len()"), ErrorKind::IdentifierNotFound);
}

#[test]
fn math_module() {
    let value = render(
        r#"
        import math
        [math.floor(2.7), math.ceil(2.1), math.round(2.5), math.trunc(-2.7),
         math.abs(-3), math.sqrt(16), math.pow(2, 10), math.min(3, 1), math.max(3, 1),
         math.log(8, 2), math.is_nan(math.nan), math.floor(7)]
        "#,
    );
    assert_eq!(value, "[2, 3, 3, -2, 3, 4.0, 1024, 1, 3, 3.0, true, 7]");
    assert_eq!(render("import math\nmath.pi > 3.14 && math.pi < 3.15"), "true");
    assert_eq!(error_kind("import math\nmath.floor(\"x\")"), ErrorKind::Type);
    assert_eq!(error_kind("import math\nmath.floor(math.inf)"), ErrorKind::Value);
}

#[test]
fn json_round_trip_keeps_types_and_order() {
    let value = render(
        r#"
        import json
        let doc = json.load("{\"b\": [1, 2.5, true, null], \"a\": \"x\"}")
        [keys(doc), doc["b"], json.dump(doc)]
        "#,
    );
    assert_eq!(
        value,
        r#"[["b", "a"], [1, 2.5, true, null], "{\"b\":[1,2.5,true,null],\"a\":\"x\"}"]"#
    );
}

#[test]
fn json_indentation() {
    let value = eval("import json\njson.dump({\"k\": [1]}, 4)");
    assert_eq!(value.display(), "{\n    \"k\": [\n        1\n    ]\n}");
}

#[test]
fn json_rejects_what_it_cannot_represent() {
    assert_eq!(error_kind("import json\njson.load(\"{oops\")"), ErrorKind::Value);
    assert_eq!(error_kind("import json\njson.dump({1: 2})"), ErrorKind::Value);
    assert_eq!(error_kind("import json\njson.dump(1.0 / 0)"), ErrorKind::Value);
    assert_eq!(error_kind("import json\njson.dump(1, -1)"), ErrorKind::Value);
}

#[test]
fn regex_module() {
    let value = render(
        r#"
        import regex
        let date = regex.compile("(\\d+)-(\\d+)")
        [regex.is_match(date, "on 2024-05"), regex.match(date, "2024-05"),
         regex.match(date, "on 2024-05"), regex.search("o(n)", "on it"),
         regex.find_all("\\d", "a1b2"), regex.split(",\\s*", "a, b,c"),
         regex.replace("\\s+", "a  b   c", " ")]
        "#,
    );
    assert_eq!(
        value,
        r#"[true, ["2024-05", "2024", "05"], null, ["on", "n"], ["1", "2"], ["a", "b", "c"], "a b c"]"#
    );
    assert_eq!(error_kind("import regex\nregex.compile(\"(\")"), ErrorKind::Value);
    assert_eq!(error_kind("import regex\nregex.is_match(3, \"x\")"), ErrorKind::Type);
}

#[test]
fn time_module() {
    let value = render(
        r#"
        import time
        let start = time.monotonic()
        time.sleep(0.01)
        [time.monotonic() >= start + 0.01, time.time() > 1000000000.0]
        "#,
    );
    assert_eq!(value, "[true, true]");
    assert_eq!(error_kind("import time\ntime.sleep(-1)"), ErrorKind::Value);
}

#[test]
fn typing_module() {
    let value = render(
        r#"
        import typing
        type Point { }
        [typing.type_of([1, 2]), typing.type_of({"a": 1.5}), typing.type_of(Point()),
         typing.check(3, "int | str"), typing.check([1, "a"], "list<int>"),
         typing.check(Point(), "Point"), typing.parse("dict< str,list<int> >")]
        "#,
    );
    assert_eq!(
        value,
        r#"["list<int>", "dict<str, double>", "Point", true, false, true, "dict<str, list<int>>"]"#
    );
    assert_eq!(error_kind("import typing\ntyping.parse(\"list<\")"), ErrorKind::Syntax);
}

#[test]
fn error_type_constants_match_caught_errors() {
    let value = render(
        r#"
        import error_type
        let caught = null
        try { [1][4] } catch (e) { caught = e.kind == error_type.index_error }
        [caught, len(error_type.all), error_type.os_error]
        "#,
    );
    assert_eq!(value, r#"[true, 11, "os_error"]"#);
}

#[test]
fn os_module_manipulates_files() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path().display().to_string().replace('\\', "/");
    let source = format!(
        r#"
        import os
        let base = "{root}"
        let nested = os.path.join(base, "data", "inner")
        os.create_dir(nested)
        let file = os.path.join(nested, "notes.txt")
        os.write_file(file, "hello")
        let moved = os.path.join(base, "data", "moved.txt")
        os.rename(file, moved)
        let listing = os.list_dir(os.path.join(base, "data"))
        let text = os.read_file(moved)
        os.remove(os.path.join(base, "data"))
        [listing, text, os.exists(moved), os.path.is_dir(base),
         os.path.extension(moved), os.path.stem(moved), os.path.is_absolute(base)]
        "#
    );
    assert_eq!(
        render(&source),
        r#"[["inner", "moved.txt"], "hello", false, true, "txt", "moved", true]"#
    );
    assert!(!dir.path().join("data").exists());
}

#[test]
fn os_failures_are_os_errors_with_codes() {
    let dir = tempdir().expect("temp dir");
    let missing = dir.path().join("missing.txt");
    let source = format!(
        "import os\nos.read_file(\"{}\")",
        missing.display().to_string().replace('\\', "/")
    );
    let mut interpreter = Interpreter::new();
    let err = interpreter.eval_source(&source).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Os);
    let KestrelError::Diagnostic(diag) = err else {
        panic!("expected a diagnostic");
    };
    assert!(diag.notes.iter().any(|note| note.starts_with("os error code:")));
}

#[test]
fn os_reads_files_written_by_the_host() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("input.txt");
    fs::write(&path, "line one\nline two\n").expect("write input");
    let source = format!(
        "import os\nos.read_file(\"{}\").trim().split(\"\\n\")",
        path.display().to_string().replace('\\', "/")
    );
    assert_eq!(render(&source), r#"["line one", "line two"]"#);
}

#[test]
fn os_path_helpers() {
    let value = render(
        r#"
        import os::path
        [os.path.file_name("a/b/c.tar.gz"), os.path.extension("a/b/c.tar.gz"),
         os.path.parent("a/b/c"), os.path.parent("/"), os.getenv("KESTREL_SURELY_UNSET_VARIABLE")]
        "#,
    );
    assert_eq!(value, r#"["c.tar.gz", "gz", "a/b", null, null]"#);
}

#[test]
fn threads_run_in_isolated_interpreters() {
    let value = render(
        r#"
        import threading
        let t = threading.run("let xs = [1, 2]\nxs.append(3)\nxs")
        let result = threading.join(t)
        [result, threading.join(t) == result, threading.is_finished(t)]
        "#,
    );
    assert_eq!(value, "[[1, 2, 3], true, true]");
}

#[test]
fn thread_failures_keep_their_kind() {
    let mut interpreter = Interpreter::new();
    let err = interpreter
        .eval_source(
            r#"
            import threading
            let t = threading.run("throw key_error(\"lost\")")
            threading.join(t)
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Key);
    assert!(err.to_string().contains("raised in worker thread"));
}

#[test]
fn spawned_scripts_receive_arguments() {
    let dir = tempdir().expect("temp dir");
    let script = dir.path().join("worker.ks");
    fs::write(&script, "[arg(0), arg(1), len(args)]\n").expect("write worker");
    let source = format!(
        r#"
        import threading
        threading.join(threading.spawn("{}", ["alpha", 2]))
        "#,
        script.display().to_string().replace('\\', "/")
    );
    assert_eq!(render(&source), r#"["alpha", "2", 2]"#);
}
