//! FILENAME: core/parser/src/token.rs
//! PURPOSE: Token definitions for the report formula lexer.
//! CONTEXT: Tokens are the atomic units produced by the lexer and consumed by the parser.
//! Every token is wrapped in a `SpannedToken` that remembers where it started and
//! whether whitespace preceded it; the parser needs the latter to tell implicit
//! multiplication (`2x`, `(a)(b)`) apart from a syntax error (`2 x`).

/// An identifier as written in the source, before resolution.
/// `domain` is the part before the dot in `a.b`; `dot_prefixed` marks `.b`.
#[derive(Debug, PartialEq, Clone)]
pub struct IdentToken {
    pub domain: Option<String>,
    pub domain_quoted: bool,
    pub name: String,
    pub name_quoted: bool,
    pub dot_prefixed: bool,
}

impl IdentToken {
    /// A bare word like `abs` or `price`: the only shape that may name a function.
    pub fn is_plain(&self) -> bool {
        self.domain.is_none() && !self.dot_prefixed && !self.name_quoted
    }
}

/// Tokens recognized by the formula lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // Literals
    /// Normalized numeric text (`0.5`, `1.2e-5`); converted to a decimal by the parser.
    Number(String),
    String(String),
    Boolean(bool),
    Identifier(IdentToken),

    // Keyword operators
    And,
    Or,
    Not,

    // Arithmetic
    Plus,
    Minus,
    PlusPlus,
    MinusMinus,
    Asterisk,
    Slash,
    Percent,
    Caret,

    // Comparison
    Equals,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Bitwise and logical symbols
    ShiftLeft,
    ShiftRight,
    Ampersand,
    AmpAmp,
    Pipe,
    PipePipe,
    Tilde,
    /// Prefix logical not, or postfix factorial.
    Exclamation,

    // Delimiters
    Question,
    Colon,
    LParen,
    RParen,
    Comma,

    // Special
    EOF,
    Illegal(char),
    /// A lexically invalid construct, e.g. an unterminated string.
    Malformed(&'static str),
}

/// A token together with its source position (in characters) and a flag
/// telling whether any whitespace separated it from the previous token.
#[derive(Debug, PartialEq, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
    pub spaced: bool,
}

impl std::fmt::Display for IdentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(domain) = &self.domain {
            if self.domain_quoted {
                write!(f, "'{}'", domain)?;
            } else {
                write!(f, "{}", domain)?;
            }
        }
        if self.domain.is_some() || self.dot_prefixed {
            write!(f, ".")?;
        }
        if self.name_quoted {
            write!(f, "'{}'", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Boolean(b) => write!(f, "{}", b),
            Token::Identifier(ident) => write!(f, "{}", ident),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::PlusPlus => write!(f, "++"),
            Token::MinusMinus => write!(f, "--"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Equals => write!(f, "="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::GreaterThan => write!(f, ">"),
            Token::LessEqual => write!(f, "<="),
            Token::GreaterEqual => write!(f, ">="),
            Token::ShiftLeft => write!(f, "<<"),
            Token::ShiftRight => write!(f, ">>"),
            Token::Ampersand => write!(f, "&"),
            Token::AmpAmp => write!(f, "&&"),
            Token::Pipe => write!(f, "|"),
            Token::PipePipe => write!(f, "||"),
            Token::Tilde => write!(f, "~"),
            Token::Exclamation => write!(f, "!"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::EOF => write!(f, "end of input"),
            Token::Illegal(c) => write!(f, "ILLEGAL({})", c),
            Token::Malformed(msg) => write!(f, "MALFORMED({})", msg),
        }
    }
}
