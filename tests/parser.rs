#[cfg(test)]
mod parser_tests {
    use treelox as lox;

    use lox::ast::{Expr, Stmt};
    use lox::ast_printer::AstPrinter;
    use lox::parser::Parser;
    use lox::scanner::scan;

    fn parse(source: &str) -> (Vec<Stmt>, Vec<String>) {
        let (tokens, lex_errors) = scan(source);
        assert!(lex_errors.is_empty(), "unexpected lexical errors: {:?}", lex_errors);

        let mut parser = Parser::new(tokens);
        let statements = parser.parse();
        let errors = parser.errors().iter().map(|e| e.to_string()).collect();

        (statements, errors)
    }

    /// Parses a single expression statement and prints it in prefix form.
    fn print_expr(source: &str) -> String {
        let (statements, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
        assert_eq!(statements.len(), 1);

        match &statements[0] {
            Stmt::Expression(expr) => AstPrinter.print(expr),
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(print_expr("1 + 2 * 3;"), "(+ 1.0 (* 2.0 3.0))");
        assert_eq!(print_expr("-123 * (45.67);"), "(* (- 123.0) (group 45.67))");
        assert_eq!(print_expr("!true == false;"), "(== (! true) false)");
        assert_eq!(print_expr("1 < 2 and 3 or nil;"), "(or (and (< 1.0 2.0) 3.0) nil)");
    }

    #[test]
    fn test_ternary_is_right_associative() {
        assert_eq!(print_expr("a ? b : c ? d : e;"), "(?: a b (?: c d e))");
        assert_eq!(print_expr("x = a ? 1 : 2;"), "(= x (?: a 1.0 2.0))");
    }

    #[test]
    fn test_assignment_targets() {
        assert_eq!(print_expr("a = b = 1;"), "(= a (= b 1.0))");
        assert_eq!(print_expr("a.b.c = 3;"), "(= .c (. b a) 3.0)");

        let (statements, errors) = parse("1 = 2;");
        assert_eq!(statements.len(), 1);
        assert_eq!(errors, vec!["[line 1] Error at '=': Invalid assignment target."]);
    }

    #[test]
    fn test_calls_and_properties() {
        assert_eq!(print_expr("f(1)(2, x);"), "(call (call f 1.0) 2.0 x)");
        assert_eq!(print_expr("this.name;"), "(. name this)");
        assert_eq!(print_expr("super.greet();"), "(call (super greet))");
    }

    #[test]
    fn test_anonymous_function_expression() {
        assert_eq!(print_expr("fun (a, b) { return a; };"), "(fun (a b) ...)");

        let (statements, errors) = parse("var f = fun () {};");
        assert!(errors.is_empty());
        match &statements[0] {
            Stmt::Var {
                initializer: Some(Expr::Function(decl)),
                ..
            } => assert!(decl.params.is_empty()),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_for_desugars_to_while() {
        let (statements, errors) = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(errors.is_empty());
        assert_eq!(statements.len(), 1);

        let Stmt::Block(outer) = &statements[0] else {
            panic!("expected block, got {:?}", statements[0]);
        };
        assert_eq!(outer.len(), 2);
        assert!(matches!(outer[0], Stmt::Var { .. }));

        let Stmt::While { condition, body } = &outer[1] else {
            panic!("expected while, got {:?}", outer[1]);
        };
        assert_eq!(AstPrinter.print(condition), "(< i 3.0)");

        let Stmt::Block(inner) = body.as_ref() else {
            panic!("expected block body, got {:?}", body);
        };
        assert!(matches!(inner[0], Stmt::Print(_)));
        assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
    }

    #[test]
    fn test_for_without_clauses_loops_forever() {
        let (statements, errors) = parse("for (;;) break;");
        assert!(errors.is_empty());

        match &statements[0] {
            Stmt::While { condition, body } => {
                assert_eq!(AstPrinter.print(condition), "true");
                assert!(matches!(body.as_ref(), Stmt::Break(_)));
            }
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn test_class_with_static_method_and_superclass() {
        let (statements, errors) =
            parse("class B < A { init(x) { this.x = x; } class make() { return B(1); } }");
        assert!(errors.is_empty(), "{:?}", errors);

        let Stmt::Class {
            name,
            superclass,
            methods,
        } = &statements[0]
        else {
            panic!("expected class, got {:?}", statements[0]);
        };

        assert_eq!(name.lexeme, "B");
        assert!(matches!(superclass, Some(Expr::Variable { name, .. }) if name.lexeme == "A"));
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name.lexeme, "init");
        assert!(!methods[0].is_class_method);
        assert_eq!(methods[0].function.params.len(), 1);
        assert_eq!(methods[1].name.lexeme, "make");
        assert!(methods[1].is_class_method);
    }

    #[test]
    fn test_errors_are_collected_after_synchronizing() {
        let (statements, errors) = parse("var = 1;\nprint 2;\nprint (3;\nprint 4");

        assert_eq!(statements.len(), 1);
        assert_eq!(
            errors,
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 3] Error at ';': Expect ')' after expression.",
                "[line 4] Error at end: Expect ';' after value.",
            ]
        );
    }

    #[test]
    fn test_missing_left_operand_is_reported_and_parsing_continues() {
        let (statements, errors) = parse("+1;\n== 2;\n* 3;");

        assert_eq!(statements.len(), 3);
        assert_eq!(
            errors,
            vec![
                "[line 1] Error at '+': Lox does not support unary '+'.",
                "[line 2] Error at '==': Binary operator is missing its left operand.",
                "[line 3] Error at '*': Binary operator is missing its left operand.",
            ]
        );
    }

    #[test]
    fn test_too_many_arguments() {
        let args = vec!["0"; 256].join(", ");
        let (statements, errors) = parse(&format!("f({});", args));

        assert_eq!(statements.len(), 1);
        assert_eq!(errors, vec!["[line 1] Error at '0': Can't have more than 255 arguments."]);
    }

    #[test]
    fn test_interactive_trailing_expression_becomes_print() {
        let (tokens, _) = scan("var a = 1; a + 2");

        let mut parser = Parser::new(tokens.clone()).interactive(true);
        let statements = parser.parse();
        assert!(parser.errors().is_empty());
        assert!(matches!(statements[1], Stmt::Print(_)));

        let mut parser = Parser::new(tokens);
        parser.parse();
        assert_eq!(
            parser.errors()[0].to_string(),
            "[line 1] Error at end: Expect ';' after expression."
        );
    }

    #[test]
    fn test_ast_serializes_to_json() {
        let (statements, _) = parse("print 1;");
        let json = serde_json::to_value(&statements).unwrap();

        assert_eq!(json[0]["Print"]["Literal"]["Number"], 1.0);
    }
}
