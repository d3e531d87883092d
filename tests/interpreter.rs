use kestrel::{Config, ErrorKind, Interpreter, KestrelError, Value};

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

fn error_kind(source: &str) -> ErrorKind {
    eval_error(source).kind()
}

#[test]
fn evaluates_basic_arithmetic() {
    assert_eq!(render("2 + 3 * 4"), "14");
    assert_eq!(render("(2 + 3) * 4"), "20");
    assert_eq!(render("7 / 2"), "3");
    assert_eq!(render("-7 % 3"), "-1");
    assert_eq!(render("1 + 2.5"), "3.5");
    assert_eq!(render("2 ** 10"), "1024");
}

#[test]
fn power_is_right_associative_and_binds_tighter_than_negation() {
    assert_eq!(render("-2 ** 2"), "-4");
    assert_eq!(render("2 ** 3 ** 2"), "512");
}

#[test]
fn integer_overflow_and_division_by_zero_are_value_errors() {
    assert_eq!(error_kind("9223372036854775807 + 1"), ErrorKind::Value);
    assert_eq!(error_kind("1 / 0"), ErrorKind::Value);
    assert_eq!(error_kind("1 % 0"), ErrorKind::Value);
    assert_eq!(render("1.0 / 0"), "inf");
}

#[test]
fn mixing_incompatible_operands_is_a_type_error() {
    let err = eval_error(r#""a" + 1"#);
    assert_eq!(err.kind(), ErrorKind::Type);
    let message = err.to_string();
    assert!(message.contains("str"), "{message}");
    assert!(message.contains("int"), "{message}");
}

#[test]
fn int_and_double_compare_equal_by_value() {
    assert_eq!(render("1 == 1.0"), "true");
    assert_eq!(render("1 == 1.5"), "false");
    assert_eq!(render(r#"1 == "1""#), "false");
    assert_eq!(render("null == false"), "false");
}

#[test]
fn ordering_covers_numbers_strings_and_lists() {
    assert_eq!(render(r#""apple" < "banana""#), "true");
    assert_eq!(render("[1, 2] < [1, 3]"), "true");
    assert_eq!(render("[1, 2] < [1, 2, 0]"), "true");
    assert_eq!(error_kind(r#"1 < "2""#), ErrorKind::Type);
}

#[test]
fn returns_last_expression_from_script() {
    let value = eval(
        r#"
        let x = 40
        x + 2
        "#,
    );
    assert!(matches!(value, Value::Int(42)));
}

#[test]
fn truthiness_follows_emptiness() {
    assert_eq!(
        render(r#"[bool(0), bool(""), bool([]), bool({}), bool(0.0), bool(null)]"#),
        "[false, false, false, false, false, false]"
    );
    assert_eq!(render(r#"[bool(1), bool("x"), bool([0])]"#), "[true, true, true]");
}

#[test]
fn logical_operators_short_circuit() {
    let value = render(
        r#"
        let calls = 0
        fn touch() { calls += 1; true }
        let a = false && touch()
        let b = true || touch()
        [a, b, calls]
        "#,
    );
    assert_eq!(value, "[false, true, 0]");
}

#[test]
fn conditional_expression_picks_a_branch() {
    assert_eq!(render("let n = 5; n > 3 ? \"big\" : \"small\""), "\"big\"");
    assert_eq!(render("let n = 1; n > 3 ? \"big\" : n > 0 ? \"some\" : \"none\""), "\"some\"");
}

#[test]
fn redeclaring_in_the_same_scope_fails() {
    assert_eq!(
        error_kind("let x = 1; let x = 2;"),
        ErrorKind::IdentifierAlreadyExists
    );
}

#[test]
fn shadowing_in_an_inner_scope_leaves_the_outer_binding() {
    let value = render(
        r#"
        let x = 1
        {
            let x = 2
            x = 3
        }
        x
        "#,
    );
    assert_eq!(value, "1");
}

#[test]
fn unknown_identifiers_are_reported() {
    let err = eval_error("missing + 1");
    assert_eq!(err.kind(), ErrorKind::IdentifierNotFound);
    assert!(err.to_string().contains("missing"));
}

#[test]
fn constants_reject_assignment() {
    assert_eq!(error_kind("const limit = 3; limit = 4;"), ErrorKind::Const);
    assert_eq!(error_kind("let const limit = 3; limit += 1;"), ErrorKind::Const);
}

#[test]
fn closures_capture_by_reference() {
    let value = render(
        r#"
        let x = 1
        let f = fn() { x }
        x = 2
        f()
        "#,
    );
    assert_eq!(value, "2");
}

#[test]
fn closures_keep_their_scope_alive() {
    let value = render(
        r#"
        fn counter() {
            let count = 0
            return fn() => count += 1
        }
        let next = counter()
        next()
        next()
        next()
        "#,
    );
    assert_eq!(value, "3");
}

#[test]
fn recursion_binds_the_function_name() {
    let value = render(
        r#"
        fn fact(n) {
            if n <= 1 { return 1 }
            n * fact(n - 1)
        }
        fact(10)
        "#,
    );
    assert_eq!(value, "3628800");
}

#[test]
fn function_values_are_distinct_objects() {
    let value = render(
        r#"
        fn make() { fn() => 1 }
        let a = make()
        let b = make()
        [a == a, a == b]
        "#,
    );
    assert_eq!(value, "[true, false]");
}

#[test]
fn default_arguments_fill_missing_parameters() {
    let value = render(
        r#"
        fn greet(name, greeting = "hello") { greeting + ", " + name }
        [greet("ada"), greet("ada", "hi")]
        "#,
    );
    assert_eq!(value, r#"["hello, ada", "hi, ada"]"#);
}

#[test]
fn arity_is_checked_before_the_body_runs() {
    let err = eval_error("fn pair(a, b) { [a, b] }\npair(1)");
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.to_string().contains("expects 2 arguments but got 1"));

    let err = eval_error("fn one(a) { a }\none(1, 2)");
    assert!(err.to_string().contains("expects 1 argument but got 2"));
}

#[test]
fn declared_parameter_types_are_checked() {
    let err = eval_error(
        r#"
        fn double_it(n: int) { n * 2 }
        double_it("two")
        "#,
    );
    assert_eq!(err.kind(), ErrorKind::Type);
    let message = err.to_string();
    assert!(message.contains("argument 1 (`n`)"), "{message}");
    assert!(message.contains("expected int but got str"), "{message}");
}

#[test]
fn declared_return_types_are_checked() {
    assert_eq!(render("fn f() -> int { 1 }\nf()"), "1");
    assert_eq!(error_kind("fn f() -> int { \"no\" }\nf()"), ErrorKind::Type);
    assert_eq!(render("fn f() -> int | null { }\nf()"), "null");
}

#[test]
fn while_loops_honour_break_and_continue() {
    let value = render(
        r#"
        let i = 0
        let seen = []
        while true {
            i += 1
            if i % 2 == 0 { continue }
            if i > 7 { break }
            seen.append(i)
        }
        seen
        "#,
    );
    assert_eq!(value, "[1, 3, 5, 7]");
}

#[test]
fn for_loops_walk_ranges_and_containers() {
    let value = render(
        r#"
        let total = 0
        for i in range(1, 5) { total += i }
        let keys = []
        let d = {"a": 1, "b": 2}
        for k in d { keys.append(k) }
        let letters = []
        for ch in "hey" { letters.append(ch) }
        [total, keys, letters]
        "#,
    );
    assert_eq!(value, r#"[10, ["a", "b"], ["h", "e", "y"]]"#);
}

#[test]
fn loop_variables_can_be_typed() {
    assert_eq!(error_kind("for x: int in [1, \"a\"] { }"), ErrorKind::Type);
}

#[test]
fn empty_and_negative_ranges_iterate_correctly() {
    assert_eq!(render("list(range(3, 3))"), "[]");
    assert_eq!(render("list(range(5, 0, 1))"), "[]");
    assert_eq!(render("list(range(5, 0, -2))"), "[5, 3, 1]");
    assert_eq!(error_kind("range(0, 5, 0)"), ErrorKind::Value);
}

#[test]
fn return_inside_a_loop_leaves_the_function() {
    let value = render(
        r#"
        fn first_even(items) {
            for item in items {
                if item % 2 == 0 { return item }
            }
            null
        }
        [first_even([1, 3, 4, 6]), first_even([1])]
        "#,
    );
    assert_eq!(value, "[4, null]");
}

#[test]
fn try_catch_binds_the_error() {
    let value = render(r#"try { throw value_error("bad") } catch (e) { e.message }"#);
    assert_eq!(value, "\"bad\"");
}

#[test]
fn catch_clauses_filter_by_kind() {
    let value = render(
        r#"
        fn classify(f) {
            try {
                f()
            } catch (e: key_error | index_error) {
                "lookup"
            } catch (e: value_error) {
                "value"
            }
        }
        [classify(fn() => [1][5]), classify(fn() => {"a": 1}["b"]), classify(fn() => 1 / 0)]
        "#,
    );
    assert_eq!(value, r#"["lookup", "lookup", "value"]"#);
}

#[test]
fn unmatched_errors_keep_propagating() {
    let err = eval_error(
        r#"
        try {
            throw os_error("disk")
        } catch (e: value_error) {
            "nope"
        }
        "#,
    );
    assert_eq!(err.kind(), ErrorKind::Os);
}

#[test]
fn errors_propagate_through_nested_calls() {
    let err = eval_error(
        r#"
        fn inner() { throw key_error("deep") }
        fn middle() { inner(); "unreachable" }
        fn outer() { middle() }
        outer()
        "#,
    );
    assert_eq!(err.kind(), ErrorKind::Key);
    assert!(err.to_string().contains("deep"));
}

#[test]
fn error_objects_expose_their_fields() {
    let value = render(
        r#"
        let caught = null
        try {
            let x = [1, 2]
            x[10]
        } catch (e) {
            caught = e
        }
        [caught.kind, caught.line, type_str(caught)]
        "#,
    );
    assert_eq!(value, r#"["index_error", 5, "error"]"#);
}

#[test]
fn error_causes_are_preserved() {
    let value = render(
        r#"
        try {
            try {
                throw key_error("inner")
            } catch (e) {
                throw value_error("outer", e)
            }
        } catch (e) {
            [e.message, e.cause.kind, e.cause.message]
        }
        "#,
    );
    assert_eq!(value, r#"["outer", "key_error", "inner"]"#);
}

#[test]
fn throwing_a_string_raises_undefined_error() {
    assert_eq!(error_kind(r#"throw "plain""#), ErrorKind::Undefined);
}

#[test]
fn catching_an_unknown_kind_is_a_type_error() {
    assert_eq!(
        error_kind(r#"try { throw value_error("x") } catch (e: no_such_kind) { 1 }"#),
        ErrorKind::Type
    );
}

#[test]
fn runtime_errors_carry_their_position() {
    let err = eval_error("let a = 1\nlet b = a + \"x\"");
    let KestrelError::Diagnostic(diag) = err else {
        panic!("expected a diagnostic");
    };
    let location = diag.location.expect("location");
    assert_eq!(location.line, 2);
    assert_eq!(&*location.file, "<eval>");
}

#[test]
fn runaway_recursion_hits_the_call_depth_limit() {
    let mut interpreter = Interpreter::with_config(Config::default().with_max_call_depth(32));
    let err = interpreter
        .eval_source("fn down(n) { down(n + 1) }\ndown(0)")
        .expect_err("should exceed the depth limit");
    assert_eq!(err.kind(), ErrorKind::Undefined);
    assert!(err.to_string().contains("maximum call depth of 32"));
}

#[test]
fn interpreter_state_persists_between_evaluations() {
    let mut interpreter = Interpreter::new();
    interpreter.eval_source("let total = 1").unwrap();
    interpreter.eval_source("total += 41").unwrap();
    let value = interpreter.lookup("total").expect("bound");
    assert!(matches!(value, Value::Int(42)));
}

#[test]
fn host_values_can_be_injected() {
    let mut interpreter = Interpreter::new();
    interpreter.define_global("answer", Value::Int(42));
    let value = interpreter.eval_source("answer * 2").unwrap();
    assert!(matches!(value, Value::Int(84)));
}

#[test]
fn host_can_call_script_functions() {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source("fn add(a, b) { a + b }")
        .unwrap();
    let add = interpreter.lookup("add").expect("bound");
    let sum = interpreter
        .call(&add, vec![Value::Int(2), Value::Int(3)])
        .unwrap();
    assert!(matches!(sum, Value::Int(5)));
}

#[test]
fn slices_may_omit_the_upper_bound_before_a_stride() {
    assert_eq!(render("[1, 2, 3, 4][::-1]"), "[4, 3, 2, 1]");
    assert_eq!(render("[1, 2, 3, 4][1::2]"), "[2, 4]");
    assert_eq!(render(r#""abcd"[::2]"#), r#""ac""#);
    assert_eq!(render(r#""abcd"[::-1]"#), r#""dcba""#);
    assert_eq!(render(r#""abcd"[1::2]"#), r#""bd""#);
    assert_eq!(render("list(range(10)[::-3])"), "[9, 6, 3, 0]");
    assert_eq!(render("list(range(10)[1::2])"), "[1, 3, 5, 7, 9]");
    assert_eq!(render("let n = 1\nlet k = 2\n[0, 1, 2, 3, 4][n::k]"), "[1, 3]");
}

#[test]
fn oversized_repetition_is_a_value_error() {
    assert_eq!(error_kind(r#""ab" * 9223372036854775807"#), ErrorKind::Value);
    assert_eq!(error_kind("[1, 2] * 9223372036854775807"), ErrorKind::Value);
    assert_eq!(error_kind("9223372036854775807 * [0]"), ErrorKind::Value);
    assert_eq!(render(r#""ab" * 3"#), r#""ababab""#);
    assert_eq!(render("[0] * -1"), "[]");
    assert_eq!(render("[] * 9223372036854775807"), "[]");
}

#[test]
fn self_referential_containers_compare_without_crashing() {
    let setup = "let a = []\na.append(a)\nlet b = []\nb.append(b)\n";
    assert_eq!(error_kind(&format!("{setup}a == b")), ErrorKind::Value);
    assert_eq!(error_kind(&format!("{setup}a < b")), ErrorKind::Value);
    assert_eq!(error_kind(&format!("{setup}a in [b]")), ErrorKind::Value);
    assert_eq!(render(&format!("{setup}[a == a, [a] == [a], a in [a]]")), "[true, true, true]");
    let caught = render(&format!(
        "{setup}try {{ a != b }} catch (e: value_error) {{ \"caught\" }}"
    ));
    assert_eq!(caught, r#""caught""#);
}

#[test]
fn indexing_ranges_longer_than_the_int_range() {
    let huge = "range(-9223372036854775807 - 1, 9223372036854775807)";
    assert_eq!(render(&format!("{huge}[-1]")), "9223372036854775806");
    assert_eq!(render(&format!("{huge}[5]")), "-9223372036854775803");
}

#[test]
fn typed_parameters_leave_the_callers_value_untyped() {
    let value = render(
        r#"
        fn count(xs: list<int>) { len(xs) }
        let a = [1]
        count(a)
        a.append("s")
        a
        "#,
    );
    assert_eq!(value, r#"[1, "s"]"#);
    let value = render(
        r#"
        fn same(xs) -> list<int> { xs }
        let b = [1]
        same(b)
        b.append("s")
        len(b)
        "#,
    );
    assert_eq!(value, "2");
    assert_eq!(
        error_kind("fn reset(xs: list<int>) { xs = [\"no\"] }\nreset([1])"),
        ErrorKind::Type
    );
}
