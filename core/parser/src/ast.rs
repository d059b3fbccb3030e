//! FILENAME: core/parser/src/ast.rs
//! PURPOSE: Defines the Abstract Syntax Tree (AST) for report formulas.
//! CONTEXT: After the Lexer tokenizes a formula string, the Parser converts
//! those tokens into this tree structure. The engine crate then compiles the
//! tree into function-call nodes, resolves identifiers and evaluates it.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: decimal numbers, strings, booleans
//! - Identifiers: name, .name, domain.name, quoted variants
//! - Prefix operators: - + ! ~ ++ --
//! - Postfix operators: ++ -- ! (factorial)
//! - Binary operators: arithmetic, comparison, shifts, bitwise, logical
//! - Ternary: cond ? a : b
//! - Function calls: abs(x), iif(c, a, b); `|x|` is sugar for abs(x)
//! - eval("...") with a constant string is parsed and spliced in place
//! - Parenthesized groups (kept explicit, grouping matters to the optimizer)

use bigdecimal::BigDecimal;

/// Represents a parsed formula expression.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A literal value: number, string, or boolean.
    Literal(Value),

    /// A possibly domain-qualified identifier.
    Identifier(Identifier),

    /// A prefix or postfix operation.
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// A binary operation: left op right.
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// cond ? then_branch : else_branch
    Ternary {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },

    /// A function call like abs(x) or printf('%d', 1).
    FunctionCall { name: String, args: Vec<Expression> },

    /// An explicitly parenthesized subexpression.
    Grouped(Box<Expression>),
}

/// Literal values that can appear in formulas.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Number(BigDecimal),
    String(String),
    Boolean(bool),
}

/// An identifier as written, e.g. `v.total` or `.'unit price'`.
#[derive(Debug, PartialEq, Clone)]
pub struct Identifier {
    pub domain: Option<String>,
    /// A quoted domain never selects one of the special domains.
    pub domain_quoted: bool,
    pub name: String,
    pub dot_prefixed: bool,
}

impl Identifier {
    pub fn new(domain: Option<&str>, name: &str) -> Self {
        Identifier {
            domain: domain.map(str::to_string),
            domain_quoted: false,
            name: name.to_string(),
            dot_prefixed: false,
        }
    }
}

/// Binary operators, from lowest to highest precedence group.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    LogicalOr,  // || or
    LogicalAnd, // && and
    BitOr,      // |
    BitAnd,     // &

    Equal,        // = ==
    NotEqual,     // != <>
    LessThan,     // <
    LessEqual,    // <=
    GreaterThan,  // >
    GreaterEqual, // >=

    ShiftLeft,  // <<
    ShiftRight, // >>

    Add,      // +
    Subtract, // -
    Multiply, // * and implicit multiplication
    Divide,   // /
    Modulo,   // %
    Power,    // ^
}

impl BinaryOperator {
    /// The registry function implementing this operator.
    pub fn function_name(&self) -> &'static str {
        match self {
            BinaryOperator::LogicalOr => "lor",
            BinaryOperator::LogicalAnd => "land",
            BinaryOperator::BitOr => "or",
            BinaryOperator::BitAnd => "and",
            BinaryOperator::Equal => "eq",
            BinaryOperator::NotEqual => "ne",
            BinaryOperator::LessThan => "lt",
            BinaryOperator::LessEqual => "le",
            BinaryOperator::GreaterThan => "gt",
            BinaryOperator::GreaterEqual => "ge",
            BinaryOperator::ShiftLeft => "shl",
            BinaryOperator::ShiftRight => "shr",
            BinaryOperator::Add => "add",
            BinaryOperator::Subtract => "sub",
            BinaryOperator::Multiply => "mul",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "mod",
            BinaryOperator::Power => "pow",
        }
    }
}

/// Prefix and postfix operators.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Negate,        // -x
    Plus,          // +x
    Not,           // !x, not x
    BitNot,        // ~x
    PreIncrement,  // ++x
    PreDecrement,  // --x
    PostIncrement, // x++
    PostDecrement, // x--
    Factorial,     // x!
}

impl UnaryOperator {
    /// The registry function implementing this operator.
    pub fn function_name(&self) -> &'static str {
        match self {
            UnaryOperator::Negate => "uminus",
            UnaryOperator::Plus => "uplus",
            UnaryOperator::Not => "lnot",
            UnaryOperator::BitNot => "not",
            UnaryOperator::PreIncrement | UnaryOperator::PostIncrement => "inc",
            UnaryOperator::PreDecrement | UnaryOperator::PostDecrement => "dec",
            UnaryOperator::Factorial => "factorial",
        }
    }

    pub fn is_postfix(&self) -> bool {
        matches!(
            self,
            UnaryOperator::PostIncrement | UnaryOperator::PostDecrement | UnaryOperator::Factorial
        )
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOperator::LogicalOr => "||",
            BinaryOperator::LogicalAnd => "&&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
        };
        write!(f, "{}", symbol)
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Not | UnaryOperator::Factorial => "!",
            UnaryOperator::BitNot => "~",
            UnaryOperator::PreIncrement | UnaryOperator::PostIncrement => "++",
            UnaryOperator::PreDecrement | UnaryOperator::PostDecrement => "--",
        };
        write!(f, "{}", symbol)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Writes a name part, quoting it when it is not a plain word.
fn write_name_part(f: &mut std::fmt::Formatter<'_>, part: &str, force_quote: bool) -> std::fmt::Result {
    let plain = part
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && part.chars().all(|c| c.is_alphanumeric() || c == '_');
    if force_quote || !plain {
        write!(f, "'{}'", part.replace('\'', "''"))
    } else {
        write!(f, "{}", part)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.domain {
            Some(domain) => {
                write_name_part(f, domain, self.domain_quoted)?;
                write!(f, ".")?;
            }
            None if self.dot_prefixed => write!(f, ".")?,
            None => {
                // A bare keyword-like name needs the dot to stay an identifier.
                let lower = self.name.to_lowercase();
                if matches!(
                    lower.as_str(),
                    "true" | "false" | "yes" | "no" | "and" | "or" | "not"
                ) {
                    write!(f, ".")?;
                }
            }
        }
        write_name_part(f, &self.name, false)
    }
}

/// Prints a fully parenthesized form that parses back to an equivalent tree.
impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Identifier(ident) => write!(f, "{}", ident),
            Expression::UnaryOp { op, operand } => {
                // A prefix operand is wrapped so `-(-x)` never prints as `--x`.
                let wrap = matches!(operand.as_ref(), Expression::UnaryOp { op, .. } if !op.is_postfix());
                match (op.is_postfix(), wrap) {
                    (true, true) => write!(f, "({}){}", operand, op),
                    (true, false) => write!(f, "{}{}", operand, op),
                    (false, true) => write!(f, "{}({})", op, operand),
                    (false, false) => write!(f, "{}{}", op, operand),
                }
            }
            Expression::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expression::Ternary {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "({} ? {} : {})", condition, then_branch, else_branch),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Grouped(inner) => match inner.as_ref() {
                Expression::BinaryOp { .. } | Expression::Ternary { .. } => write!(f, "{}", inner),
                other => write!(f, "({})", other),
            },
        }
    }
}
