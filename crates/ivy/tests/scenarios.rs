//! End-to-end scenarios, one `#[test]` per behavior, asserting on captured
//! stdout the way `sandbox_tests.rs` asserts on `Sandbox::run`.

use ivy::{Config, Engine, InterpretResult};
use pretty_assertions::assert_eq;

fn run(source: &str) -> (InterpretResult, String) {
    let mut engine = Engine::new(Config::new());
    let result = engine.interpret(source);
    let output = engine.take_output();
    (result, output)
}

#[test]
fn arithmetic_and_precedence() {
    let (result, output) = run("print 1 + 2 * 3;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "7\n");
}

#[test]
fn closures_share_mutable_state() {
    let source = r#"
        fun makeCounter() {
            var n = 0;
            fun inc() { n = n + 1; return n; }
            return inc;
        }
        var c = makeCounter();
        print c(); print c(); print c();
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "1\n2\n3\n");
}

#[test]
fn two_closures_over_the_same_local_observe_each_others_writes() {
    let source = r#"
        fun test() {
            var n = 0;
            fun inc() { n = n + 1; }
            fun get() { return n; }
            inc();
            inc();
            return get();
        }
        print test();
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "2\n");
}

#[test]
fn string_interning_and_equality() {
    let (result, output) = run(r#"print "ab" + "c" == "abc";"#);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "true\n");
}

#[test]
fn class_with_initializer_and_method() {
    let source = r#"
        class Point { init(x, y) { this.x = x; this.y = y; } sum() { return this.x + this.y; } }
        print Point(3, 4).sum();
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "7\n");
}

#[test]
fn inheritance_and_super_call() {
    let source = r#"
        class A { hi() { print "A"; } }
        class B extends A { hi() { super.hi(); print "B"; } }
        B().hi();
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "A\nB\n");
}

#[test]
fn runtime_type_error_exits_seventy() {
    let (result, _) = run(r#"print 1 + "x";"#);
    assert_eq!(result.exit_code(), 70);
    match result {
        InterpretResult::RuntimeError(message) => {
            assert!(message.starts_with("Operands must be two numbers or two strings."));
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn too_many_constants_is_rejected() {
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("var v{i} = {i};\n"));
    }
    let (result, _) = run(&source);
    match result {
        InterpretResult::CompileError(diagnostics) => {
            assert!(diagnostics.iter().any(|d| d.contains("Too many constants in one chunk.")));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn stack_overflow_from_unbounded_recursion() {
    let source = r#"
        fun recurse() { return recurse(); }
        print recurse();
    "#;
    let (result, _) = run(source);
    assert_eq!(result.exit_code(), 70);
    match result {
        InterpretResult::RuntimeError(message) => assert!(message.starts_with("Stack overflow.")),
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn top_level_return_is_rejected() {
    let (result, _) = run("return 1;");
    match result {
        InterpretResult::CompileError(diagnostics) => {
            assert!(diagnostics.iter().any(|d| d.contains("Can't return from top-level code.")));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn returning_a_value_from_an_initializer_is_rejected() {
    let source = r#"
        class Foo { init() { return 1; } }
    "#;
    let (result, _) = run(source);
    match result {
        InterpretResult::CompileError(diagnostics) => {
            assert!(diagnostics.iter().any(|d| d.contains("Can't return a value from an initializer.")));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn a_class_cannot_extend_itself() {
    let (result, _) = run("class Oops extends Oops {}");
    match result {
        InterpretResult::CompileError(diagnostics) => {
            assert!(diagnostics.iter().any(|d| d.contains("A class can't inherit from itself.")));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn self_initialization_is_rejected() {
    let source = "var a = 1; { var a = a; }";
    let (result, _) = run(source);
    match result {
        InterpretResult::CompileError(diagnostics) => {
            assert!(diagnostics
                .iter()
                .any(|d| d.contains("Can't read local variable in its own initializer.")));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn undefined_global_read_is_a_runtime_error() {
    let (result, _) = run("print undefinedThing;");
    assert_eq!(result.exit_code(), 70);
}

#[test]
fn calling_a_non_callable_is_a_runtime_error() {
    let (result, _) = run("var x = 1; x();");
    assert_eq!(result.exit_code(), 70);
}

#[test]
fn wrong_arity_closure_call_is_a_runtime_error() {
    let source = r#"
        fun needsTwo(a, b) { return a + b; }
        needsTwo(1);
    "#;
    let (result, _) = run(source);
    assert_eq!(result.exit_code(), 70);
}

#[test]
fn repl_session_keeps_globals_between_interpret_calls() {
    let mut engine = Engine::new(Config::new());
    assert_eq!(engine.interpret("var x = 10;"), InterpretResult::Ok);
    let _ = engine.take_output();
    assert_eq!(engine.interpret("print x + 5;"), InterpretResult::Ok);
    assert_eq!(engine.take_output(), "15\n");
}

#[test]
fn a_runtime_error_does_not_poison_later_repl_lines() {
    let mut engine = Engine::new(Config::new());
    let first = engine.interpret(r#"print 1 + "x";"#);
    assert_eq!(first.exit_code(), 70);
    let _ = engine.take_output();

    let second = engine.interpret("print 1 + 1;");
    assert_eq!(second, InterpretResult::Ok);
    assert_eq!(engine.take_output(), "2\n");
}

#[test]
fn gc_stress_mode_does_not_change_observable_output() {
    let source = r#"
        class Node { init(value) { this.value = value; this.next = nil; } }
        fun buildList(n) {
            var head = nil;
            var i = 0;
            while (i < n) {
                var node = Node(i);
                node.next = head;
                head = node;
                i = i + 1;
            }
            return head;
        }
        var list = buildList(50);
        var total = 0;
        while (list != nil) {
            total = total + list.value;
            list = list.next;
        }
        print total;
    "#;

    let mut plain = Engine::new(Config::new());
    let plain_result = plain.interpret(source);
    let plain_output = plain.take_output();

    let mut stressed = Engine::new(Config::new().with_stress_gc(true));
    let stressed_result = stressed.interpret(source);
    let stressed_output = stressed.take_output();

    assert_eq!(plain_result, stressed_result);
    assert_eq!(plain_output, stressed_output);
}

#[test]
fn bound_methods_can_be_stored_and_called_later() {
    let source = r#"
        class Greeter {
            init(name) { this.name = name; }
            greet() { print "hi " + this.name; }
        }
        var g = Greeter("Ada");
        var bound = g.greet;
        bound();
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "hi Ada\n");
}

#[test]
fn native_clock_is_callable_and_numeric() {
    let (result, output) = run("print clock() >= 0;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "true\n");
}

#[test]
fn print_formats_every_value_kind() {
    let source = r#"
        print nil;
        print true;
        print false;
        print 3;
        print 3.5;
        class Foo {}
        print Foo;
        print Foo();
        fun f() {}
        print f;
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        vec!["nil", "true", "false", "3", "3.5", "Foo", "Foo instance", "<fn f>"]
    );
}
