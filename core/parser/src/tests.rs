//! FILENAME: core/parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the parser crate.

use bigdecimal::BigDecimal;
use std::str::FromStr;

use crate::ast::{BinaryOperator, Expression, Identifier, UnaryOperator, Value};
use crate::lexer::Lexer;
use crate::parser::parse;
use crate::token::{IdentToken, Token};

fn num(text: &str) -> Expression {
    Expression::Literal(Value::Number(BigDecimal::from_str(text).unwrap()))
}

fn ident(name: &str) -> Expression {
    Expression::Identifier(Identifier::new(None, name))
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn unary(op: UnaryOperator, operand: Expression) -> Expression {
    Expression::UnaryOp {
        op,
        operand: Box::new(operand),
    }
}

fn grouped(inner: Expression) -> Expression {
    Expression::Grouped(Box::new(inner))
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn lexer_tokenizes_simple_math() {
    let mut lexer = Lexer::new("1 + 2");
    assert_eq!(lexer.next_token(), Token::Number("1".to_string()));
    assert_eq!(lexer.next_token(), Token::Plus);
    assert_eq!(lexer.next_token(), Token::Number("2".to_string()));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_tracks_position_and_spacing() {
    let mut lexer = Lexer::new("a  +b");
    let a = lexer.next_spanned();
    let plus = lexer.next_spanned();
    let b = lexer.next_spanned();
    assert_eq!((a.position, a.spaced), (0, false));
    assert_eq!((plus.position, plus.spaced), (3, true));
    assert_eq!((b.position, b.spaced), (4, false));
}

#[test]
fn lexer_reads_scientific_numbers() {
    for (input, expected) in [
        ("1e5", "1e5"),
        ("1E-5", "1e-5"),
        ("1.235e+5", "1.235e5"),
        (".1234e-5", "0.1234e-5"),
        (".5", "0.5"),
    ] {
        let mut lexer = Lexer::new(input);
        assert_eq!(lexer.next_token(), Token::Number(expected.to_string()), "{}", input);
        assert_eq!(lexer.next_token(), Token::EOF);
    }
}

#[test]
fn lexer_stops_number_at_bare_e() {
    let mut lexer = Lexer::new("2e - 1");
    assert_eq!(lexer.next_token(), Token::Number("2".to_string()));
    assert!(matches!(lexer.next_token(), Token::Identifier(ref i) if i.name == "e"));
    assert_eq!(lexer.next_token(), Token::Minus);
    assert_eq!(lexer.next_token(), Token::Number("1".to_string()));
}

#[test]
fn lexer_reads_strings_with_doubled_quotes() {
    let mut lexer = Lexer::new("'apple''xx' \"app\"\"le\"");
    assert_eq!(lexer.next_token(), Token::String("apple'xx".to_string()));
    assert_eq!(lexer.next_token(), Token::String("app\"le".to_string()));
}

#[test]
fn lexer_reports_unterminated_string() {
    let mut lexer = Lexer::new("'apple");
    assert_eq!(lexer.next_token(), Token::Malformed("unterminated string"));
}

#[test]
fn lexer_reads_qualified_identifiers() {
    let mut lexer = Lexer::new("a.b .c 'q w'.'x y' \"m\".x");
    assert_eq!(
        lexer.next_token(),
        Token::Identifier(IdentToken {
            domain: Some("a".to_string()),
            domain_quoted: false,
            name: "b".to_string(),
            name_quoted: false,
            dot_prefixed: false,
        })
    );
    assert_eq!(
        lexer.next_token(),
        Token::Identifier(IdentToken {
            domain: None,
            domain_quoted: false,
            name: "c".to_string(),
            name_quoted: false,
            dot_prefixed: true,
        })
    );
    assert_eq!(
        lexer.next_token(),
        Token::Identifier(IdentToken {
            domain: Some("q w".to_string()),
            domain_quoted: true,
            name: "x y".to_string(),
            name_quoted: true,
            dot_prefixed: false,
        })
    );
    match lexer.next_token() {
        Token::Identifier(ident) => {
            assert_eq!(ident.domain.as_deref(), Some("m"));
            assert!(ident.domain_quoted);
        }
        other => panic!("Expected identifier, got {:?}", other),
    }
}

#[test]
fn lexer_rejects_empty_quoted_identifier() {
    let mut lexer = Lexer::new(".''");
    assert_eq!(lexer.next_token(), Token::Malformed("empty identifier"));
    let mut lexer = Lexer::new(".\"\"");
    assert_eq!(lexer.next_token(), Token::Malformed("empty identifier"));
}

#[test]
fn lexer_treats_boolean_words_as_weak_keywords() {
    let mut lexer = Lexer::new("yes No .true true.yes");
    assert_eq!(lexer.next_token(), Token::Boolean(true));
    assert_eq!(lexer.next_token(), Token::Boolean(false));
    assert!(matches!(lexer.next_token(), Token::Identifier(ref i) if i.name == "true" && i.dot_prefixed));
    assert!(matches!(
        lexer.next_token(),
        Token::Identifier(ref i) if i.domain.as_deref() == Some("true") && i.name == "yes"
    ));
}

#[test]
fn lexer_reads_multi_char_operators() {
    let mut lexer = Lexer::new("++ -- == != <> <= >= << >> && || !");
    let expected = [
        Token::PlusPlus,
        Token::MinusMinus,
        Token::Equals,
        Token::NotEqual,
        Token::NotEqual,
        Token::LessEqual,
        Token::GreaterEqual,
        Token::ShiftLeft,
        Token::ShiftRight,
        Token::AmpAmp,
        Token::PipePipe,
        Token::Exclamation,
    ];
    for token in expected {
        assert_eq!(lexer.next_token(), token);
    }
}

#[test]
fn lexer_accepts_unicode_identifiers() {
    let mut lexer = Lexer::new("árvíztűrő");
    assert!(matches!(lexer.next_token(), Token::Identifier(ref i) if i.name == "árvíztűrő"));
}

// ========================================
// LITERAL TESTS
// ========================================

#[test]
fn parser_parses_number_literal() {
    assert_eq!(parse("42").unwrap(), num("42"));
    assert_eq!(parse("1.235e-5").unwrap(), num("0.00001235"));
}

#[test]
fn parser_concatenates_adjacent_strings() {
    let result = parse("\"app'le\" 'b\"b' \"cc\"").unwrap();
    assert_eq!(result, Expression::Literal(Value::String("app'leb\"bcc".to_string())));

    let result = parse("'apple'\n\n'_hul'").unwrap();
    assert_eq!(result, Expression::Literal(Value::String("apple_hul".to_string())));
}

#[test]
fn parser_parses_booleans() {
    assert_eq!(parse("true").unwrap(), Expression::Literal(Value::Boolean(true)));
    assert_eq!(parse("no").unwrap(), Expression::Literal(Value::Boolean(false)));
}

// ========================================
// OPERATOR TESTS
// ========================================

#[test]
fn parser_respects_precedence() {
    let result = parse("1 + 2 * 3").unwrap();
    assert_eq!(
        result,
        binary(num("1"), BinaryOperator::Add, binary(num("2"), BinaryOperator::Multiply, num("3")))
    );
}

#[test]
fn parser_associates_left() {
    let result = parse("6/3/2").unwrap();
    assert_eq!(
        result,
        binary(binary(num("6"), BinaryOperator::Divide, num("3")), BinaryOperator::Divide, num("2"))
    );
}

#[test]
fn parser_keeps_parentheses() {
    let result = parse("6/(3/2)").unwrap();
    assert_eq!(
        result,
        binary(
            num("6"),
            BinaryOperator::Divide,
            grouped(binary(num("3"), BinaryOperator::Divide, num("2")))
        )
    );
}

#[test]
fn parser_parses_ternary() {
    let result = parse("a > 1 ? 'big' : 'small'").unwrap();
    match result {
        Expression::Ternary { condition, .. } => {
            assert_eq!(*condition, binary(ident("a"), BinaryOperator::GreaterThan, num("1")));
        }
        other => panic!("Expected ternary, got {:?}", other),
    }
}

#[test]
fn parser_parses_keyword_logic() {
    let result = parse("a and not b or c").unwrap();
    assert_eq!(
        result,
        binary(
            binary(ident("a"), BinaryOperator::LogicalAnd, unary(UnaryOperator::Not, ident("b"))),
            BinaryOperator::LogicalOr,
            ident("c")
        )
    );
}

#[test]
fn parser_parses_factorial_and_not() {
    let result = parse("!3!").unwrap();
    assert_eq!(
        result,
        unary(UnaryOperator::Not, unary(UnaryOperator::Factorial, num("3")))
    );
}

#[test]
fn parser_parses_increment_forms() {
    assert_eq!(
        parse("1+ ++2").unwrap(),
        binary(num("1"), BinaryOperator::Add, unary(UnaryOperator::PreIncrement, num("2")))
    );
    assert_eq!(
        parse("1++ + ++2").unwrap(),
        binary(
            unary(UnaryOperator::PostIncrement, num("1")),
            BinaryOperator::Add,
            unary(UnaryOperator::PreIncrement, num("2"))
        )
    );
    assert!(parse("1++2").is_err());
}

#[test]
fn parser_binds_power_tighter_than_negation() {
    assert_eq!(
        parse("-2^2").unwrap(),
        unary(UnaryOperator::Negate, binary(num("2"), BinaryOperator::Power, num("2")))
    );
    assert_eq!(
        parse("2^-1").unwrap(),
        binary(num("2"), BinaryOperator::Power, unary(UnaryOperator::Negate, num("1")))
    );
}

#[test]
fn parser_parses_bitwise_and_shift() {
    assert_eq!(
        parse("1 << 2 | 3 & 4").unwrap(),
        binary(
            binary(num("1"), BinaryOperator::ShiftLeft, num("2")),
            BinaryOperator::BitOr,
            binary(num("3"), BinaryOperator::BitAnd, num("4"))
        )
    );
}

// ========================================
// IMPLICIT MULTIPLICATION TESTS
// ========================================

#[test]
fn parser_multiplies_number_and_group() {
    assert_eq!(
        parse("8/2(2+2)").unwrap(),
        binary(
            num("8"),
            BinaryOperator::Divide,
            binary(
                num("2"),
                BinaryOperator::Multiply,
                grouped(binary(num("2"), BinaryOperator::Add, num("2")))
            )
        )
    );
}

#[test]
fn parser_multiplies_adjacent_groups() {
    let result = parse("1/(1+1)(2+2)").unwrap();
    match result {
        Expression::BinaryOp { op: BinaryOperator::Divide, right, .. } => {
            assert!(matches!(*right, Expression::BinaryOp { op: BinaryOperator::Multiply, .. }));
        }
        other => panic!("Expected division, got {:?}", other),
    }
}

#[test]
fn parser_rejects_spaced_adjacent_groups() {
    let err = parse("1 / ( 1 + 1 ) ( 2 + 2 )").unwrap_err();
    assert_eq!(err.position, 14);
}

#[test]
fn parser_multiplies_number_and_identifier() {
    assert_eq!(
        parse("1/2x").unwrap(),
        binary(num("1"), BinaryOperator::Divide, binary(num("2"), BinaryOperator::Multiply, ident("x")))
    );
    assert_eq!(parse("2e").unwrap(), binary(num("2"), BinaryOperator::Multiply, ident("e")));
    assert_eq!(parse("2e-1").unwrap(), num("0.2"));
    assert_eq!(
        parse("2e - 1").unwrap(),
        binary(binary(num("2"), BinaryOperator::Multiply, ident("e")), BinaryOperator::Subtract, num("1"))
    );
}

#[test]
fn parser_multiplies_group_and_following_operand() {
    let sum = grouped(binary(num("2"), BinaryOperator::Add, num("2")));
    assert_eq!(
        parse("(2+2).2").unwrap(),
        binary(sum.clone(), BinaryOperator::Multiply, num("0.2"))
    );
    assert_eq!(
        parse("(2+2)a").unwrap(),
        binary(sum.clone(), BinaryOperator::Multiply, ident("a"))
    );
    let dotted = Expression::Identifier(Identifier {
        domain: None,
        domain_quoted: false,
        name: "a".to_string(),
        dot_prefixed: true,
    });
    assert_eq!(parse("(2+2).a").unwrap(), binary(sum, BinaryOperator::Multiply, dotted));
}

#[test]
fn parser_rejects_spaced_operands() {
    assert!(parse("2 3").is_err());
    assert!(parse("a b").is_err());
}

// ========================================
// FUNCTION CALL TESTS
// ========================================

#[test]
fn parser_parses_function_call() {
    let result = parse("IIF(a, 1, 2)").unwrap();
    match result {
        Expression::FunctionCall { name, args } => {
            assert_eq!(name, "iif");
            assert_eq!(args.len(), 3);
        }
        other => panic!("Expected function call, got {:?}", other),
    }
}

#[test]
fn parser_parses_empty_function_call() {
    assert_eq!(
        parse("now()").unwrap(),
        Expression::FunctionCall {
            name: "now".to_string(),
            args: vec![],
        }
    );
}

#[test]
fn parser_does_not_call_qualified_identifier() {
    // A domain-qualified name followed by a group is implicit multiplication.
    let result = parse("q.a(2)").unwrap();
    assert!(matches!(result, Expression::BinaryOp { op: BinaryOperator::Multiply, .. }));
}

// ========================================
// ERROR TESTS
// ========================================

#[test]
fn parser_reports_error_position() {
    let err = parse("1 + * 2").unwrap_err();
    assert_eq!(err.position, 4);
    assert!(err.to_string().contains("position 4"));
}

#[test]
fn parser_rejects_empty_input() {
    assert!(parse("   ").is_err());
}

#[test]
fn parser_rejects_unbalanced_parentheses() {
    assert!(parse("(1 + 2").is_err());
    assert!(parse("1 + 2)").is_err());
}

#[test]
fn parser_rejects_illegal_character() {
    let err = parse("1 # 2").unwrap_err();
    assert_eq!(err.message, "illegal character '#'");
    assert_eq!(err.position, 2);

    let err = parse("abs(1 # 2)").unwrap_err();
    assert_eq!(err.message, "illegal character '#'");
}

#[test]
fn parser_accepts_numbers_beyond_machine_decimals() {
    assert_eq!(parse("1e30").unwrap(), num("1000000000000000000000000000000"));
    assert_eq!(
        parse("123456789012345678901234567890.5").unwrap(),
        num("123456789012345678901234567890.5")
    );
    let err = parse("1e99999").unwrap_err();
    assert!(err.message.contains("out of range"));
}

// ========================================
// ABSOLUTE VALUE AND EVAL TESTS
// ========================================

fn abs(inner: Expression) -> Expression {
    Expression::FunctionCall {
        name: "abs".to_string(),
        args: vec![inner],
    }
}

#[test]
fn parser_reads_absolute_value_bars() {
    assert_eq!(parse("|1|").unwrap(), abs(num("1")));
    assert_eq!(
        parse("|a - 3| * 2").unwrap(),
        binary(
            abs(binary(ident("a"), BinaryOperator::Subtract, num("3"))),
            BinaryOperator::Multiply,
            num("2")
        )
    );
    assert_eq!(parse("|-2|").unwrap(), abs(unary(UnaryOperator::Negate, num("2"))));
}

#[test]
fn bars_inside_parentheses_are_bitwise_or() {
    assert_eq!(
        parse("|(a | b)|").unwrap(),
        abs(grouped(binary(ident("a"), BinaryOperator::BitOr, ident("b"))))
    );
    assert_eq!(parse("1 | 2").unwrap(), binary(num("1"), BinaryOperator::BitOr, num("2")));
    assert!(parse("|1").is_err());
}

#[test]
fn eval_of_constant_text_is_spliced() {
    let sum = grouped(binary(num("1"), BinaryOperator::Add, num("2")));
    assert_eq!(parse("eval('1+2')").unwrap(), sum.clone());
    assert_eq!(
        parse("eval ('1+2') * 3").unwrap(),
        binary(sum, BinaryOperator::Multiply, num("3"))
    );
    assert_eq!(parse("eval('identifier')").unwrap(), grouped(ident("identifier")));
}

#[test]
fn eval_reports_errors_of_the_embedded_text() {
    let err = parse("eval('1 1')").unwrap_err();
    assert!(err.message.starts_with("in eval():"), "{}", err.message);
    assert!(parse("eval(a)").is_err());
    assert!(parse("eval('1', '2')").is_err());
}

// ========================================
// PRINTING TESTS
// ========================================

#[test]
fn printed_form_parses_back_to_same_tree() {
    for input in [
        "1 + 2 * 3",
        "6/(3/2)",
        "-a ^ 2",
        "!3!",
        "a ? 'x''y' : \"z\"",
        "iif(v.total > 10, .'unit price', 'q'.x)",
        "1++ + ++2",
        ".yes and r.self",
        "mid('árvíz', -2, 1)",
    ] {
        let first = parse(input).unwrap();
        let printed = first.to_string();
        let second = parse(&printed).unwrap_or_else(|e| panic!("{} -> {}: {}", input, printed, e));
        assert_eq!(second.to_string(), printed, "{}", input);
    }
}
