use kestrel::{ErrorKind, Interpreter, KestrelError, Value};

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> KestrelError {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value:?}"),
        Err(err) => err,
    }
}

fn render(source: &str) -> String {
    eval(source).repr()
}

const RESOURCE: &str = r#"
let log = []
type Resource {
    name = "";
    fn construct(name) { this.name = name }
    fn destruct() { log.append("drop " + name) }
}
"#;

fn with_resource(body: &str) -> String {
    render(&format!("{RESOURCE}\n{body}"))
}

#[test]
fn methods_and_fields_resolve_on_instances() {
    let value = render(
        r#"
        type Counter {
            count: int = 0;
            fn increment(by = 1) { count += by; this }
            fn value() { this.count }
        }
        let c = Counter()
        c.increment().increment(5)
        [c.value(), c.count, type_str(c), Counter.name]
        "#,
    );
    assert_eq!(value, r#"[6, 6, "Counter", "Counter"]"#);
}

#[test]
fn constructor_receives_arguments() {
    let value = render(
        r#"
        type Point {
            x = 0;
            y = 0;
            fn construct(x, y) { this.x = x; this.y = y }
            fn sum() { x + y }
        }
        Point(3, 4).sum()
        "#,
    );
    assert_eq!(value, "7");
}

#[test]
fn arguments_without_a_constructor_are_rejected() {
    let err = eval_error("type Empty { }\nEmpty(1)");
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn field_defaults_are_evaluated_per_instance() {
    let value = render(
        r#"
        type Bag {
            items = [];
            fn add(v) { items.append(v) }
        }
        let a = Bag()
        let b = Bag()
        a.add(1)
        [len(a.items), len(b.items)]
        "#,
    );
    assert_eq!(value, "[1, 0]");
}

#[test]
fn field_writes_are_type_checked() {
    let err = eval_error(
        r#"
        type Account { balance: int = 0; }
        let a = Account()
        a.balance = "lots"
        "#,
    );
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn const_fields_are_writable_only_during_construction() {
    let source = r#"
        type Id {
            const value = 0;
            fn construct(v) { this.value = v }
        }
        let id = Id(7)
    "#;
    assert_eq!(render(&format!("{source}\nid.value")), "7");
    let err = eval_error(&format!("{source}\nid.value = 8"));
    assert_eq!(err.kind(), ErrorKind::Const);
}

#[test]
fn undeclared_members_are_not_found() {
    let source = "type Thing { a = 1; }\nlet t = Thing()\n";
    assert_eq!(
        eval_error(&format!("{source}t.b")).kind(),
        ErrorKind::IdentifierNotFound
    );
    assert_eq!(
        eval_error(&format!("{source}t.b = 2")).kind(),
        ErrorKind::IdentifierNotFound
    );
}

#[test]
fn instances_compare_by_identity_and_are_not_hashable() {
    let value = render(
        r#"
        type P { }
        let a = P()
        let b = P()
        [a == a, a == b]
        "#,
    );
    assert_eq!(value, "[true, false]");
    assert_eq!(
        eval_error("type P { }\nlet d = {}\nd[P()] = 1").kind(),
        ErrorKind::Type
    );
}

#[test]
fn annotations_may_name_types_declared_later() {
    let value = render(
        r#"
        fn make() -> Later { Later() }
        type Later { }
        type_str(make())
        "#,
    );
    assert_eq!(value, "\"Later\"");
}

#[test]
fn destructor_runs_when_last_reference_is_dropped() {
    let value = with_resource(
        r#"
        let r = Resource("a")
        let alias = r
        r = null
        log.append("still alive")
        alias = null
        log
        "#,
    );
    assert_eq!(value, r#"["still alive", "drop a"]"#);
}

#[test]
fn destructor_runs_when_a_scope_exits() {
    let value = with_resource(
        r#"
        fn work() {
            let r = Resource("tmp")
            log.append("working")
        }
        work()
        log.append("after")
        log
        "#,
    );
    assert_eq!(value, r#"["working", "drop tmp", "after"]"#);
}

#[test]
fn destructor_runs_exactly_once() {
    let value = with_resource(
        r#"
        let holder = [Resource("x")]
        holder.clear()
        holder = null
        log
        "#,
    );
    assert_eq!(value, r#"["drop x"]"#);
}

#[test]
fn destructor_is_not_armed_when_construction_fails() {
    let value = render(
        r#"
        let log = []
        type Fragile {
            fn construct() { throw value_error("nope") }
            fn destruct() { log.append("destructed") }
        }
        try { Fragile() } catch (e) { log.append(e.kind) }
        log
        "#,
    );
    assert_eq!(value, r#"["value_error"]"#);
}

#[test]
fn failing_destructor_raises_through_the_normal_channel() {
    let err = eval_error(
        r#"
        type Loud { fn destruct() { throw os_error("close failed") } }
        let x = Loud()
        x = null
        "#,
    );
    assert_eq!(err.kind(), ErrorKind::Os);
}

#[test]
fn destructor_failure_during_unwind_is_secondary() {
    let err = eval_error(
        r#"
        type Loud { fn destruct() { throw os_error("close failed") } }
        fn f() {
            let x = Loud()
            throw value_error("primary")
        }
        f()
        "#,
    );
    let KestrelError::Diagnostic(diag) = err else {
        panic!("expected a diagnostic");
    };
    assert_eq!(diag.kind, ErrorKind::Value);
    assert_eq!(diag.message, "primary");
    assert_eq!(diag.secondary.len(), 1);
    assert_eq!(diag.secondary[0].kind, ErrorKind::Os);
    assert!(diag.to_string().contains("also raised: os_error: close failed"));
}

#[test]
fn destructors_run_at_shutdown() {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(
            r#"
            let sink = []
            type Guard { fn destruct() { sink.append(1) } }
            let g = Guard()
            "#,
        )
        .unwrap();
    let sink = interpreter.lookup("sink").expect("bound");
    interpreter.shutdown().unwrap();
    assert_eq!(sink.repr(), "[1]");
}

#[test]
fn weak_handles_do_not_keep_targets_alive() {
    let value = render(
        r#"
        type Node { next = null; }
        let a = Node()
        let w = weak(a)
        let before = [w.alive(), w.get() == a]
        a = null
        [before, w.alive(), w.get()]
        "#,
    );
    assert_eq!(value, "[[true, true], false, null]");
}

#[test]
fn weak_back_references_break_cycles() {
    let value = with_resource(
        r#"
        type Parent { child = null; tag = null; }
        type Child { parent = null; }
        fn build() {
            let p = Parent()
            let c = Child()
            p.child = c
            p.tag = Resource("parent")
            c.parent = weak(p)
            null
        }
        build()
        log
        "#,
    );
    assert_eq!(value, r#"["drop parent"]"#);
}

#[test]
fn aliased_containers_observe_each_other() {
    assert_eq!(render("let a = [1]\nlet b = a\nb.append(2)\na"), "[1, 2]");
    assert_eq!(
        render("let a = {\"k\": 1}\nlet b = a\nb[\"j\"] = 2\nlen(a)"),
        "2"
    );
}

#[test]
fn typed_lists_check_every_mutation() {
    assert_eq!(
        eval_error("let xs: list<int> = [1, \"a\"]").kind(),
        ErrorKind::Type
    );
    assert_eq!(
        eval_error("let xs: list<int> = [1]\nxs.append(\"three\")").kind(),
        ErrorKind::Type
    );
    assert_eq!(
        eval_error("let xs: list<int> = [1]\nlet alias = xs\nalias[0] = 2.5").kind(),
        ErrorKind::Type
    );
    assert_eq!(
        render("let xs: list<int> = [1]\nxs.append(2)\nxs.insert(0, 0)\nxs"),
        "[0, 1, 2]"
    );
}

#[test]
fn typed_dicts_check_keys_and_values() {
    assert_eq!(
        eval_error("let d: dict<str, int> = {}\nd[\"a\"] = \"b\"").kind(),
        ErrorKind::Type
    );
    assert_eq!(
        eval_error("let d: dict<str, int> = {}\nd[1] = 1").kind(),
        ErrorKind::Type
    );
    assert_eq!(
        render("let d: dict<str, list<int>> = {\"a\": [1]}\nd[\"a\"].append(2)\nd"),
        r#"{"a": [1, 2]}"#
    );
    assert_eq!(
        eval_error("let d: dict<str, list<int>> = {\"a\": [1]}\nd[\"a\"].append(\"x\")").kind(),
        ErrorKind::Type
    );
}

#[test]
fn declared_variable_types_guard_reassignment() {
    assert_eq!(render("let n: number = 1\nn = 2.5\nn"), "2.5");
    assert_eq!(
        eval_error("let n: int = 1\nn = \"one\"").kind(),
        ErrorKind::Type
    );
    assert_eq!(
        eval_error("let n: double = 1").kind(),
        ErrorKind::Type
    );
    assert_eq!(render("let maybe: int | null = null\nmaybe = 3\nmaybe"), "3");
}

#[test]
fn typed_method_parameters_check_without_constraining() {
    let sizer = "type Sizer {\n    fn size(xs: list<int>) { len(xs) };\n};\nlet s = Sizer()\n";
    let value = render(&format!(
        "{sizer}let a = [1]\ns.size(a)\na.append(\"s\")\n[a, s.size([2, 3])]"
    ));
    assert_eq!(value, r#"[[1, "s"], 2]"#);
    assert_eq!(
        eval_error(&format!("{sizer}s.size([\"x\"])")).kind(),
        ErrorKind::Type
    );
}

#[test]
fn unknown_annotation_types_fail_when_checked() {
    let err = eval_error("let x: Nope = 1");
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.to_string().contains("unknown type `Nope`"));
}

#[test]
fn frozen_containers_reject_mutation_and_become_keys() {
    assert_eq!(
        eval_error("let f = freeze([1, [2]])\nf.append(3)").kind(),
        ErrorKind::Const
    );
    assert_eq!(
        eval_error("let f = freeze([1, [2]])\nf[1].append(3)").kind(),
        ErrorKind::Const
    );
    assert_eq!(
        render("let d = {}\nd[freeze([1, 2])] = \"x\"\nd[freeze([1, 2])]"),
        "\"x\""
    );
    assert_eq!(eval_error("let d = {}\nd[[1]] = 1").kind(), ErrorKind::Type);
}

#[test]
fn integral_doubles_and_ints_share_keys() {
    assert_eq!(render("let d = {1: \"one\"}\nd[1.0]"), "\"one\"");
    assert_eq!(render("len({1, 1.0, 2})"), "2");
}

#[test]
fn clone_is_shallow_and_unfrozen() {
    let value = render(
        r#"
        let inner = [1]
        let original = freeze([inner])
        let copy = clone([inner])
        copy.append(2)
        inner.append(9)
        [copy, len(clone(original))]
        "#,
    );
    assert_eq!(value, "[[[1, 9], 2], 1]");
}
