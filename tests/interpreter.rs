#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use treelox as lox;

    use lox::ast::{Expr, LiteralValue};
    use lox::error::{LoxError, RuntimeError, RuntimeErrorKind};
    use lox::interpreter::{Interpreter, MAX_CALL_DEPTH};
    use lox::parser::Parser;
    use lox::scanner::scan;
    use lox::token::{Token, TokenType};
    use lox::Lox;

    /// In-memory session; `take()` drains what has been printed so far.
    struct Harness {
        out: Rc<RefCell<Vec<u8>>>,
        session: Lox,
    }

    impl Harness {
        fn new() -> Self {
            let out = Rc::new(RefCell::new(Vec::new()));
            let session = Lox::with_output(out.clone());
            Harness { out, session }
        }

        fn take(&self) -> String {
            let bytes = std::mem::take(&mut *self.out.borrow_mut());
            String::from_utf8(bytes).unwrap()
        }
    }

    fn run(source: &str) -> (String, Result<(), LoxError>) {
        let mut harness = Harness::new();
        let result = harness.session.run(source);
        (harness.take(), result)
    }

    fn run_ok(source: &str) -> String {
        let (output, result) = run(source);
        if let Err(e) = result {
            panic!("program failed:\n{}\noutput so far:\n{}", e, output);
        }
        output
    }

    fn runtime_error(source: &str) -> RuntimeError {
        match run(source).1 {
            Err(LoxError::Runtime(e)) => e,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic_and_stringification() {
        let output = run_ok(
            "print 1 + 2;\n\
             print 7 / 2;\n\
             print 2 * 3 - 1;\n\
             print 1.5;\n\
             print 0;\n\
             print nil;\n\
             print !0;\n\
             print !nil;\n\
             print 3 == 3.0;\n\
             print \"a\" != \"a\";",
        );

        assert_eq!(output, "3\n3.5\n5\n1.5\n0\nnil\nfalse\ntrue\ntrue\nfalse\n");
    }

    #[test]
    fn test_string_concatenation_stringifies_other_side() {
        let output = run_ok(
            "print \"a\" + \"b\";\n\
             print \"n=\" + 1;\n\
             print 2.5 + \"!\";\n\
             print \"is \" + nil;\n\
             print \"\" + true;",
        );

        assert_eq!(output, "ab\nn=1\n2.5!\nis nil\ntrue\n");
    }

    #[test]
    fn test_callable_and_instance_stringification() {
        let output = run_ok(
            "fun f() {}\n\
             class K {}\n\
             print f;\n\
             print clock;\n\
             print K;\n\
             print K();\n\
             print fun () {};",
        );

        assert_eq!(output, "<fn f>\n<native fn>\nK\n<K instance>\n<anonymous fn>\n");
    }

    #[test]
    fn test_equality_never_fails() {
        let output = run_ok(
            "class A {}\n\
             var a = A();\n\
             var b = A();\n\
             print a == a;\n\
             print a == b;\n\
             print nil == nil;\n\
             print nil == false;\n\
             print 1 == \"1\";\n\
             print A == A;",
        );

        assert_eq!(output, "true\nfalse\ntrue\nfalse\nfalse\ntrue\n");
    }

    #[test]
    fn test_logical_returns_operand_and_ternary_evaluates_one_branch() {
        let output = run_ok(
            "print nil or \"x\";\n\
             print 1 and 2;\n\
             print false and missing;\n\
             print true ? 1 : missing;\n\
             print false ? missing : 2;",
        );

        assert_eq!(output, "x\n2\nfalse\n1\n2\n");
    }

    #[test]
    fn test_closure_counter() {
        let output = run_ok(
            "fun makeCounter() {\n\
               var i = 0;\n\
               fun count() { i = i + 1; return i; }\n\
               return count;\n\
             }\n\
             var a = makeCounter();\n\
             var b = makeCounter();\n\
             print a();\n\
             print a();\n\
             print b();",
        );

        assert_eq!(output, "1\n2\n1\n");
    }

    #[test]
    fn test_closures_bind_lexically() {
        let output = run_ok(
            "var a = \"global\";\n\
             {\n\
               fun show() { print a; }\n\
               show();\n\
               var a = \"local\";\n\
               show();\n\
               print a;\n\
             }",
        );

        assert_eq!(output, "global\nglobal\nlocal\n");
    }

    #[test]
    fn test_anonymous_functions_capture_scope() {
        let output = run_ok(
            "fun adder(n) { return fun (x) { return x + n; }; }\n\
             var add2 = adder(2);\n\
             print add2(40);",
        );

        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_recursion_and_mutual_recursion_between_globals() {
        let output = run_ok(
            "fun isEven(n) { if (n == 0) return true; return isOdd(n - 1); }\n\
             fun isOdd(n) { if (n == 0) return false; return isEven(n - 1); }\n\
             fun fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }\n\
             print isEven(10);\n\
             print fib(15);",
        );

        assert_eq!(output, "true\n610\n");
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        let output = run_ok(
            "fun f() {}\n\
             fun g() { while (true) { return 5; } }\n\
             print f();\n\
             print g();",
        );

        assert_eq!(output, "nil\n5\n");
    }

    #[test]
    fn test_break_exits_innermost_loop_only() {
        let output = run_ok(
            "for (var i = 0; i < 3; i = i + 1) {\n\
               for (var j = 0; j < 3; j = j + 1) {\n\
                 if (j == 1) { break; }\n\
                 print i * 10 + j;\n\
               }\n\
             }\n\
             var k = 0;\n\
             while (true) { k = k + 1; if (k > 4) break; }\n\
             print k;",
        );

        assert_eq!(output, "0\n10\n20\n5\n");
    }

    #[test]
    fn test_initializer_always_returns_instance() {
        let output = run_ok(
            "class P {\n\
               init(x) { this.x = x; return; }\n\
             }\n\
             var p = P(1);\n\
             print p.x;\n\
             print p.init(2) == p;\n\
             print p.x;",
        );

        assert_eq!(output, "1\ntrue\n2\n");
    }

    #[test]
    fn test_methods_bind_this() {
        let output = run_ok(
            "class A {\n\
               init() { this.v = 7; }\n\
               get() { return this.v; }\n\
             }\n\
             var g = A().get;\n\
             print g();",
        );

        assert_eq!(output, "7\n");
    }

    #[test]
    fn test_fields_shadow_methods() {
        let output = run_ok(
            "class A { f() { return 1; } }\n\
             var a = A();\n\
             print a.f();\n\
             a.f = 2;\n\
             print a.f;",
        );

        assert_eq!(output, "1\n2\n");
    }

    #[test]
    fn test_super_dispatch_through_several_levels() {
        let output = run_ok(
            "class A {\n\
               method() { print \"A method\"; }\n\
               describe() { print \"I am \" + this.who(); }\n\
               who() { return \"A\"; }\n\
             }\n\
             class B < A {\n\
               method() { print \"B method\"; }\n\
               test() { super.method(); }\n\
               describe() { super.describe(); }\n\
               who() { return \"B\"; }\n\
             }\n\
             class C < B {\n\
               who() { return \"C\"; }\n\
             }\n\
             C().test();\n\
             C().describe();\n\
             C().method();",
        );

        assert_eq!(output, "A method\nI am C\nB method\n");
    }

    #[test]
    fn test_inherited_initializer() {
        let output = run_ok(
            "class A { init(n) { this.n = n; } }\n\
             class B < A { init(n) { super.init(n * 2); } }\n\
             print B(21).n;",
        );

        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_static_methods_and_class_fields() {
        let output = run_ok(
            "class Math {\n\
               class square(n) { return n * n; }\n\
               class make() { return this(); }\n\
             }\n\
             class More < Math {\n\
               class square(n) { return \"more \" + super.square(n); }\n\
             }\n\
             print Math.square(3);\n\
             print More.square(4);\n\
             print More.make();\n\
             Math.pi = 3;\n\
             print Math.pi;",
        );

        assert_eq!(output, "9\nmore 16\n<More instance>\n3\n");
    }

    #[test]
    fn test_class_arity_follows_initializer() {
        let e = runtime_error("class A { init(x) { this.x = x; } }\nA();");
        assert_eq!(
            e.kind,
            RuntimeErrorKind::ArityMismatch {
                expected: 1,
                got: 0
            }
        );
        assert_eq!(e.line, 2);

        let e = runtime_error("class A {}\nA(1);");
        assert_eq!(e.to_string(), "Expected 0 arguments, but got 1.\n[line 2]");
    }

    #[test]
    fn test_function_arity_mismatch() {
        let e = runtime_error("fun f(a, b) { return a + b; }\nprint f(1);");
        assert_eq!(e.to_string(), "Expected 2 arguments, but got 1.\n[line 2]");
    }

    #[test]
    fn test_division_by_zero_aborts_the_batch() {
        let (output, result) = run("print 1;\nprint 1 / 0;\nprint 2;");

        assert_eq!(output, "1\n");
        let e = result.unwrap_err();
        assert_eq!(e.to_string(), "Division by zero.\n[line 2]");
        assert_eq!(e.exit_code(), 70);
    }

    #[test]
    fn test_operand_errors_name_the_side() {
        assert_eq!(
            runtime_error("print -\"a\";").kind,
            RuntimeErrorKind::OperandNotNumber
        );
        assert_eq!(
            runtime_error("print \"a\" - 1;").kind,
            RuntimeErrorKind::LeftOperandNotNumber
        );
        assert_eq!(
            runtime_error("print 1 < nil;").kind,
            RuntimeErrorKind::RightOperandNotNumber
        );
        assert_eq!(
            runtime_error("print true + nil;").kind,
            RuntimeErrorKind::InvalidAddition
        );
    }

    #[test]
    fn test_uninitialized_is_not_undefined() {
        assert_eq!(
            runtime_error("var x;\nprint x;").kind,
            RuntimeErrorKind::UninitializedVariable("x".to_string())
        );
        assert_eq!(
            runtime_error("print y;").kind,
            RuntimeErrorKind::UndefinedVariable("y".to_string())
        );
        assert_eq!(
            runtime_error("y = 1;").kind,
            RuntimeErrorKind::UndefinedVariable("y".to_string())
        );

        assert_eq!(run_ok("var x;\nx = 3;\nprint x;"), "3\n");
    }

    #[test]
    fn test_uninitialized_local() {
        let e = runtime_error("{\n  var x;\n  print x;\n}");
        assert_eq!(e.to_string(), "Variable 'x' is not initialized.\n[line 3]");
    }

    #[test]
    fn test_property_errors() {
        assert_eq!(
            runtime_error("var x = 1;\nprint x.y;").kind,
            RuntimeErrorKind::PropertyOnNonInstance
        );
        assert_eq!(
            runtime_error("var x = 1;\nx.y = 2;").kind,
            RuntimeErrorKind::FieldOnNonInstance
        );
        assert_eq!(
            runtime_error("class A {}\nprint A().nope;").kind,
            RuntimeErrorKind::UndefinedProperty("nope".to_string())
        );
        assert_eq!(
            runtime_error("class A {}\nprint A.nope;").kind,
            RuntimeErrorKind::UndefinedProperty("nope".to_string())
        );
    }

    #[test]
    fn test_call_errors() {
        assert_eq!(
            runtime_error("\"str\"();").kind,
            RuntimeErrorKind::NotCallable
        );
        assert_eq!(
            runtime_error("var X = 1;\nclass A < X {}").kind,
            RuntimeErrorKind::SuperclassNotClass
        );
    }

    #[test]
    fn test_static_errors_prevent_execution() {
        let (output, result) = run("print 1;\nreturn 2;");

        assert_eq!(output, "");
        match result {
            Err(LoxError::Rejected(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(
                    errors[0].to_string(),
                    "[line 2] Error at 'return': Can't return from top-level code."
                );
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_lex_and_parse_errors_reported_together_in_line_order() {
        let (output, result) = run("print $;\nvar = 1;");

        assert_eq!(output, "");
        let e = result.unwrap_err();
        assert_eq!(e.exit_code(), 65);
        assert_eq!(
            e.to_string(),
            "[line 1] Error: Unexpected character: $\n\
             [line 1] Error at ';': Expect expression.\n\
             [line 2] Error at '=': Expect variable name."
        );
    }

    #[test]
    fn test_repl_prints_trailing_expression_and_keeps_state() {
        let mut harness = Harness::new();

        harness.session.run_interactive("var a = 1;").unwrap();
        harness.session.run_interactive("a + 1").unwrap();
        assert_eq!(harness.take(), "2\n");

        harness
            .session
            .run_interactive("fun add(x) { return x + a; }")
            .unwrap();
        harness.session.run_interactive("add(2)").unwrap();
        assert_eq!(harness.take(), "3\n");

        // Statements ending in ';' are not echoed.
        harness.session.run_interactive("a + 1;").unwrap();
        assert_eq!(harness.take(), "");
    }

    #[test]
    fn test_state_survives_runtime_error() {
        let mut harness = Harness::new();

        assert!(harness.session.run("var a = 1;\nprint a / 0;").is_err());
        harness.session.run("print a;").unwrap();

        assert_eq!(harness.take(), "1\n");
    }

    #[test]
    fn test_clock_returns_seconds() {
        assert_eq!(run_ok("print clock() > 1000000000;"), "true\n");
    }

    #[test]
    fn test_runaway_recursion_is_a_runtime_error() {
        let mut harness = Harness::new();

        let result = harness
            .session
            .run("fun f(n) { return f(n + 1); }\nf(0);");
        match result {
            Err(LoxError::Runtime(e)) => {
                assert_eq!(e.kind, RuntimeErrorKind::StackOverflow);
                assert_eq!(e.line, 1);
            }
            other => panic!("expected a stack overflow, got {:?}", other),
        }

        // The session is still usable and the call depth was unwound.
        harness
            .session
            .run("fun g(n) { if (n == 0) return 0; return g(n - 1) + 1; } print g(100);")
            .unwrap();
        assert_eq!(harness.take(), "100\n");
    }

    #[test]
    fn test_deep_recursion_below_the_limit() {
        let depth = MAX_CALL_DEPTH - 100;
        let output = run_ok(&format!(
            "fun f(n) {{ if (n == 0) return 0; return f(n - 1) + 1; }} print f({});",
            depth
        ));
        assert_eq!(output, format!("{}\n", depth));
    }

    #[test]
    fn test_recursive_initializers_hit_the_limit() {
        let e = runtime_error("class A { init() { A(); } }\nA();");
        assert_eq!(e.kind, RuntimeErrorKind::StackOverflow);
    }

    /// Runs `source` straight through an interpreter, without the resolver.
    fn run_unresolved(source: &str) -> String {
        let (tokens, lex_errors) = scan(source);
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);

        let mut parser = Parser::new(tokens);
        let statements = parser.parse();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());

        let out = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut interpreter = Interpreter::with_output(out.clone());
        interpreter.interpret(&statements).unwrap();

        let bytes = std::mem::take(&mut *out.borrow_mut());
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_unresolved_locals_match_resolved_behaviour() {
        let programs = [
            "{ var a = 1; print a; a = 2; print a; }",
            "fun make() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }\n\
             var c = make(); print c(); print c();",
            "class A { m() { return \"A\"; } }\n\
             class B < A { m() { return super.m() + \"B\"; } }\n\
             print B().m();",
        ];

        for source in programs {
            assert_eq!(run_unresolved(source), run_ok(source), "{}", source);
        }
    }

    #[test]
    fn test_negative_zero_and_non_finite_numbers() {
        assert_eq!(run_ok("print -0;"), "-0\n");
        assert_eq!(run_ok("print 0 * -1;"), "-0\n");
        assert_eq!(run_ok("print -0 == 0;"), "true\n");

        let output = run_ok(
            "var x = 10; var i = 0;\n\
             while (i < 400) { x = x * 10; i = i + 1; }\n\
             print x; print -x; print x - x;",
        );
        assert_eq!(output, "Infinity\n-Infinity\nNaN\n");
    }

    #[test]
    fn test_operators_outside_the_grammar_are_runtime_errors() {
        let out = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut interpreter = Interpreter::with_output(out);

        let number = || Box::new(Expr::Literal(LiteralValue::Number(1.0)));

        let unary = Expr::Unary {
            operator: Token::new(TokenType::PLUS, "+", None, 3),
            right: number(),
        };
        let e = interpreter.evaluate(&unary).unwrap_err();
        assert_eq!(e.kind, RuntimeErrorKind::InvalidOperator("+".to_string()));
        assert_eq!(e.line, 3);

        let binary = Expr::Binary {
            left: number(),
            operator: Token::new(TokenType::DOT, ".", None, 4),
            right: number(),
        };
        let e = interpreter.evaluate(&binary).unwrap_err();
        assert_eq!(e.kind, RuntimeErrorKind::InvalidOperator(".".to_string()));
        assert_eq!(e.to_string(), "Invalid operator '.'.\n[line 4]");
    }

    #[test]
    fn test_missing_script_is_an_io_error() {
        let mut session = Lox::new();

        let e = session
            .run_file("/nonexistent/treelox/script.lox")
            .unwrap_err();
        assert!(matches!(e, LoxError::Io(_)), "{:?}", e);
        assert_eq!(e.exit_code(), 74);

        let e = lox::read_source("/nonexistent/treelox/script.lox").unwrap_err();
        assert!(matches!(e, LoxError::Io(_)), "{:?}", e);
    }

    #[test]
    fn test_exit_codes_per_error_category() {
        let (_, result) = run("print 1 +;");
        assert_eq!(result.unwrap_err().exit_code(), 65);

        let (_, result) = run("{ var a = a; }");
        assert_eq!(result.unwrap_err().exit_code(), 65);

        let (_, result) = run("print -\"x\";");
        assert_eq!(result.unwrap_err().exit_code(), 70);

        let utf8: LoxError = String::from_utf8(vec![0xff]).unwrap_err().into();
        assert_eq!(utf8.exit_code(), 74);
    }
}
