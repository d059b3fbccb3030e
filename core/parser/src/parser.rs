//! FILENAME: core/parser/src/parser.rs
//! PURPOSE: Recursive descent parser that converts a stream of Tokens into an AST.
//! CONTEXT: This is the second stage of the parsing pipeline. It takes tokens
//! from the Lexer and builds an Expression tree that the engine compiles.
//!
//! GRAMMAR (lowest precedence first, binary chains associate left-to-right):
//!   expression     --> ternary
//!   ternary        --> logical_or ( "?" ternary ":" ternary )?
//!   logical_or     --> logical_and ( ("||" | "or") logical_and )*
//!   logical_and    --> bit_or ( ("&&" | "and") bit_or )*
//!   bit_or         --> bit_and ( "|" bit_and )*   (not inside |...|)
//!   bit_and        --> equality ( "&" equality )*
//!   equality       --> relational ( ("=" | "==" | "!=" | "<>") relational )*
//!   relational     --> shift ( ("<" | "<=" | ">" | ">=") shift )*
//!   shift          --> additive ( ("<<" | ">>") additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/" | "%") unary )*
//!   unary          --> ("-" | "+" | "!" | "not" | "~" | "++" | "--") unary | power
//!   power          --> implicit ( "^" signed )*
//!   signed         --> ("-" | "+") signed | implicit
//!   implicit       --> postfix ( <adjacent> postfix )*
//!   postfix        --> primary ( "++" | "--" | "!" )*
//!   primary        --> NUMBER | STRING+ | BOOLEAN | IDENTIFIER | function_call
//!                    | "(" expression ")" | "|" expression "|"
//!   function_call  --> IDENTIFIER "(" arguments? ")"
//!   arguments      --> expression ("," expression)*
//!
//! `|x|` is parsed as `abs(x)`. Between the bars a `|` closes the absolute
//! value instead of meaning bitwise or, unless it sits inside parentheses.
//! `eval('text')` with a constant string argument parses the text and splices
//! the resulting tree in place of the call, as if it had been parenthesized.
//!
//! IMPLICIT MULTIPLICATION:
//!   `2x`, `2(a)`, `(a)(b)`, `(a)2` multiply when the left operand ended with a
//!   number, identifier or `)` and the right operand starts with no whitespace
//!   in between. `1 / (1 + 1) (2 + 2)` is a syntax error while
//!   `1/(1+1)(2+2)` divides 1 by the product.

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::ast::{BinaryOperator, Expression, Identifier, UnaryOperator, Value};
use crate::lexer::Lexer;
use crate::token::{SpannedToken, Token};

/// Parser errors with descriptive messages and the character position they occurred at.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error at position {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Literals whose exponent reaches past this many digits are out of range.
const MAX_LITERAL_EXPONENT: i64 = 10_000;

/// The Parser struct holds the lexer, the current token and the last consumed one.
pub struct Parser {
    lexer: Lexer,
    current: SpannedToken,
    previous: Token,
    /// Open `|...|` bars at the current parenthesis level.
    abs_depth: usize,
}

impl Parser {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_spanned();
        Parser {
            lexer,
            current,
            previous: Token::EOF,
            abs_depth: 0,
        }
    }

    /// Parses the entire input and returns the AST.
    pub fn parse(&mut self) -> ParseResult<Expression> {
        if self.current.token == Token::EOF {
            return Err(self.error("empty expression"));
        }

        let expr = self.parse_expression()?;

        if self.current.token != Token::EOF {
            return Err(self.unexpected());
        }

        Ok(expr)
    }

    fn advance(&mut self) {
        let next = self.lexer.next_spanned();
        let consumed = std::mem::replace(&mut self.current, next);
        self.previous = consumed.token;
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current.position)
    }

    /// Describes the current token as the point where parsing stopped.
    fn unexpected(&self) -> ParseError {
        match &self.current.token {
            Token::EOF => self.error("unexpected end of expression"),
            Token::Malformed(msg) => self.error(*msg),
            Token::Illegal(c) => self.error(format!("illegal character '{}'", c)),
            other => self.error(format!("unexpected '{}'", other)),
        }
    }

    /// Checks if the current token matches the expected token.
    /// If it matches, advances and returns Ok. Otherwise returns an error.
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current.token == expected {
            self.advance();
            Ok(())
        } else if matches!(self.current.token, Token::Illegal(_) | Token::Malformed(_)) {
            Err(self.unexpected())
        } else {
            Err(self.error(format!(
                "expected '{}', found '{}'",
                expected, self.current.token
            )))
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> ParseResult<Expression> {
        let condition = self.parse_logical_or()?;

        if self.current.token != Token::Question {
            return Ok(condition);
        }

        self.advance();
        let then_branch = self.parse_ternary()?;
        self.expect(Token::Colon)?;
        let else_branch = self.parse_ternary()?;

        Ok(Expression::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// Shared loop for one left-associative binary precedence level.
    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult<Expression>,
        operator_for: fn(&Token) -> Option<BinaryOperator>,
    ) -> ParseResult<Expression> {
        let mut left = next(self)?;

        while let Some(op) = operator_for(&self.current.token) {
            self.advance();
            let right = next(self)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_logical_and, |token| match token {
            Token::PipePipe | Token::Or => Some(BinaryOperator::LogicalOr),
            _ => None,
        })
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_bit_or, |token| match token {
            Token::AmpAmp | Token::And => Some(BinaryOperator::LogicalAnd),
            _ => None,
        })
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_bit_and()?;

        while self.current.token == Token::Pipe && self.abs_depth == 0 {
            self.advance();
            let right = self.parse_bit_and()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::BitOr,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses with `|` meaning bitwise or again, as inside parentheses.
    fn parse_nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let saved = std::mem::replace(&mut self.abs_depth, 0);
        let result = f(self);
        self.abs_depth = saved;
        result
    }

    fn parse_bit_and(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_equality, |token| match token {
            Token::Ampersand => Some(BinaryOperator::BitAnd),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_relational, |token| match token {
            Token::Equals => Some(BinaryOperator::Equal),
            Token::NotEqual => Some(BinaryOperator::NotEqual),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_shift, |token| match token {
            Token::LessThan => Some(BinaryOperator::LessThan),
            Token::LessEqual => Some(BinaryOperator::LessEqual),
            Token::GreaterThan => Some(BinaryOperator::GreaterThan),
            Token::GreaterEqual => Some(BinaryOperator::GreaterEqual),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_additive, |token| match token {
            Token::ShiftLeft => Some(BinaryOperator::ShiftLeft),
            Token::ShiftRight => Some(BinaryOperator::ShiftRight),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_multiplicative, |token| match token {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_unary, |token| match token {
            Token::Asterisk => Some(BinaryOperator::Multiply),
            Token::Slash => Some(BinaryOperator::Divide),
            Token::Percent => Some(BinaryOperator::Modulo),
            _ => None,
        })
    }

    /// Parses prefix operators.
    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let op = match self.current.token {
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            Token::Exclamation | Token::Not => UnaryOperator::Not,
            Token::Tilde => UnaryOperator::BitNot,
            Token::PlusPlus => UnaryOperator::PreIncrement,
            Token::MinusMinus => UnaryOperator::PreDecrement,
            _ => return self.parse_power(),
        };

        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parses exponentiation. The right operand may carry a sign: 2^-1.
    fn parse_power(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_implicit()?;

        while self.current.token == Token::Caret {
            self.advance();
            let right = self.parse_signed()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Power,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_signed(&mut self) -> ParseResult<Expression> {
        let op = match self.current.token {
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            _ => return self.parse_implicit(),
        };

        self.advance();
        let operand = self.parse_signed()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parses implicit multiplication between adjacent operands.
    fn parse_implicit(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_postfix()?;

        while self.multiplies_implicitly() {
            let right = self.parse_postfix()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Multiply,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn multiplies_implicitly(&self) -> bool {
        let left_ok = matches!(
            self.previous,
            Token::Number(_) | Token::Identifier(_) | Token::RParen
        );
        let right_ok = matches!(
            self.current.token,
            Token::Number(_) | Token::Identifier(_) | Token::LParen
        );
        left_ok && right_ok && !self.current.spaced
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            let op = match self.current.token {
                Token::PlusPlus => UnaryOperator::PostIncrement,
                Token::MinusMinus => UnaryOperator::PostDecrement,
                Token::Exclamation => UnaryOperator::Factorial,
                _ => break,
            };
            self.advance();
            expr = Expression::UnaryOp {
                op,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current.token.clone() {
            Token::Number(text) => {
                let value = parse_decimal(&text)
                    .ok_or_else(|| self.error(format!("number out of range: {}", text)))?;
                self.advance();
                Ok(Expression::Literal(Value::Number(value)))
            }

            Token::String(first) => {
                self.advance();
                let mut text = first;
                // Adjacent string literals concatenate.
                while let Token::String(next) = &self.current.token {
                    text.push_str(next);
                    self.advance();
                }
                Ok(Expression::Literal(Value::String(text)))
            }

            Token::Boolean(b) => {
                self.advance();
                Ok(Expression::Literal(Value::Boolean(b)))
            }

            Token::Identifier(ident) => {
                self.advance();
                if ident.is_plain() && self.current.token == Token::LParen {
                    return self.parse_nested(|p| p.parse_function_call(ident.name));
                }
                Ok(Expression::Identifier(Identifier {
                    domain: ident.domain,
                    domain_quoted: ident.domain_quoted,
                    name: ident.name,
                    dot_prefixed: ident.dot_prefixed,
                }))
            }

            Token::LParen => {
                self.advance();
                let inner = self.parse_nested(|p| {
                    let inner = p.parse_expression()?;
                    p.expect(Token::RParen)?;
                    Ok(inner)
                })?;
                Ok(Expression::Grouped(Box::new(inner)))
            }

            Token::Pipe => {
                self.advance();
                self.abs_depth += 1;
                let inner = self.parse_expression();
                self.abs_depth -= 1;
                let inner = inner?;
                self.expect(Token::Pipe)?;
                Ok(Expression::FunctionCall {
                    name: "abs".to_string(),
                    args: vec![inner],
                })
            }

            _ => Err(self.unexpected()),
        }
    }

    fn parse_function_call(&mut self, name: String) -> ParseResult<Expression> {
        let position = self.current.position;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.current.token != Token::RParen {
            args.push(self.parse_expression()?);
            while self.current.token == Token::Comma {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(Token::RParen)?;
        let name = name.to_lowercase();
        if name == "eval" {
            return splice_eval(&args, position);
        }
        Ok(Expression::FunctionCall { name, args })
    }
}

/// Parses the constant text of `eval('...')` into a grouped subtree.
fn splice_eval(args: &[Expression], position: usize) -> ParseResult<Expression> {
    let [Expression::Literal(Value::String(text))] = args else {
        return Err(ParseError::new("eval() expects one constant string", position));
    };
    let inner = parse(text)
        .map_err(|e| ParseError::new(format!("in eval(): {}", e.message), position))?;
    Ok(Expression::Grouped(Box::new(inner)))
}

/// Converts normalized lexer output (`12`, `0.5`, `1.2e-5`) into a decimal.
fn parse_decimal(text: &str) -> Option<BigDecimal> {
    let value = BigDecimal::from_str(text).ok()?;
    let (_, scale) = value.as_bigint_and_exponent();
    (scale.abs() <= MAX_LITERAL_EXPONENT).then_some(value)
}

/// Convenience function to parse a formula string into an AST.
pub fn parse(input: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(input);
    parser.parse()
}
