//! FILENAME: core/parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. It handles
//! whitespace tracking, number parsing (including scientific notation),
//! single- and double-quoted strings, domain-qualified identifiers, weak
//! keywords and multi-character operators like <=, <<, && and ++.
//!
//! SUPPORTED OPERATORS:
//! - Single char: + - * / % ^ & | ~ ! ? : ( ) , = < >
//! - Multi char: ++ -- == != <> <= >= << >> && ||
//! - Keywords: and, or, not (bare words only)
//!
//! IDENTIFIERS:
//! - `name`, `.name`, `domain.name`
//! - Any part may be quoted: `.'a b'`, `'query'.'col'`, `"m".x`
//! - A quoted text is a string literal unless a `.` and a name follow it directly.
//! - `true`/`false`/`yes`/`no` are booleans only as bare words.

use crate::token::{IdentToken, SpannedToken, Token};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    /// Advances the lexer and returns the next token without position data.
    pub fn next_token(&mut self) -> Token {
        self.next_spanned().token
    }

    /// Advances the lexer and returns the next token with its position.
    pub fn next_spanned(&mut self) -> SpannedToken {
        let spaced = self.skip_whitespace();
        let position = self.pos;
        let token = self.read_token();
        SpannedToken {
            token,
            position,
            spaced,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    /// Consumes `next` if it is the upcoming character.
    fn eat(&mut self, next: char) -> bool {
        if self.peek() == Some(next) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
        self.pos > start
    }

    fn read_token(&mut self) -> Token {
        let Some(ch) = self.bump() else {
            return Token::EOF;
        };

        match ch {
            '+' => {
                if self.eat('+') {
                    Token::PlusPlus
                } else {
                    Token::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    Token::MinusMinus
                } else {
                    Token::Minus
                }
            }
            '*' => Token::Asterisk,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '~' => Token::Tilde,
            '?' => Token::Question,
            ':' => Token::Colon,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '=' => {
                self.eat('=');
                Token::Equals
            }
            '!' => {
                if self.eat('=') {
                    Token::NotEqual
                } else {
                    Token::Exclamation
                }
            }
            '<' => self.read_less_than_operator(),
            '>' => self.read_greater_than_operator(),
            '&' => {
                if self.eat('&') {
                    Token::AmpAmp
                } else {
                    Token::Ampersand
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::PipePipe
                } else {
                    Token::Pipe
                }
            }
            '\'' | '"' => self.read_quoted(ch),
            '.' => self.read_dot(),
            ch if ch.is_ascii_digit() => self.read_number(ch),
            ch if is_word_start(ch) => self.read_word(ch),
            ch => Token::Illegal(ch),
        }
    }

    /// Handles operators starting with '<': <, <=, <>, <<
    fn read_less_than_operator(&mut self) -> Token {
        match self.peek() {
            Some('=') => {
                self.pos += 1;
                Token::LessEqual
            }
            Some('>') => {
                self.pos += 1;
                Token::NotEqual
            }
            Some('<') => {
                self.pos += 1;
                Token::ShiftLeft
            }
            _ => Token::LessThan,
        }
    }

    /// Handles operators starting with '>': >, >=, >>
    fn read_greater_than_operator(&mut self) -> Token {
        match self.peek() {
            Some('=') => {
                self.pos += 1;
                Token::GreaterEqual
            }
            Some('>') => {
                self.pos += 1;
                Token::ShiftRight
            }
            _ => Token::GreaterThan,
        }
    }

    /// A leading dot starts either a fraction (`.5`) or a dot-prefixed identifier (`.name`).
    fn read_dot(&mut self) -> Token {
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() => self.read_number('.'),
            Some(_) => match self.read_name_part() {
                Ok((name, name_quoted)) => Token::Identifier(IdentToken {
                    domain: None,
                    domain_quoted: false,
                    name,
                    name_quoted,
                    dot_prefixed: true,
                }),
                Err(token) => token,
            },
            None => Token::Illegal('.'),
        }
    }

    /// Reads the quoted body after the opening quote. A doubled quote is an
    /// escaped quote character.
    fn read_quoted_body(&mut self, quote: char) -> Option<String> {
        let mut result = String::new();
        while let Some(ch) = self.bump() {
            if ch == quote {
                if self.eat(quote) {
                    result.push(quote);
                } else {
                    return Some(result);
                }
            } else {
                result.push(ch);
            }
        }
        None
    }

    fn read_quoted(&mut self, quote: char) -> Token {
        let Some(text) = self.read_quoted_body(quote) else {
            return Token::Malformed("unterminated string");
        };

        if self.qualifier_follows() {
            self.pos += 1;
            if text.is_empty() {
                return Token::Malformed("empty identifier");
            }
            return match self.read_name_part() {
                Ok((name, name_quoted)) => Token::Identifier(IdentToken {
                    domain: Some(text),
                    domain_quoted: true,
                    name,
                    name_quoted,
                    dot_prefixed: false,
                }),
                Err(token) => token,
            };
        }

        Token::String(text)
    }

    /// True if the next characters are `.` followed by something that can start a name.
    fn qualifier_follows(&self) -> bool {
        self.peek() == Some('.')
            && matches!(self.peek_at(1), Some(c) if is_word_start(c) || c == '\'' || c == '"')
    }

    /// Reads the name part of an identifier, either a bare word or a quoted text.
    fn read_name_part(&mut self) -> Result<(String, bool), Token> {
        match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                match self.read_quoted_body(q) {
                    Some(name) if name.is_empty() => Err(Token::Malformed("empty identifier")),
                    Some(name) => Ok((name, true)),
                    None => Err(Token::Malformed("unterminated identifier")),
                }
            }
            Some(ch) if is_word_start(ch) => {
                self.pos += 1;
                Ok((self.read_word_text(ch), false))
            }
            Some(ch) => Err(Token::Illegal(ch)),
            None => Err(Token::Illegal('.')),
        }
    }

    fn read_word_text(&mut self, first_char: char) -> String {
        let mut word = String::from(first_char);
        while let Some(ch) = self.peek() {
            if is_word_continue(ch) {
                word.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        word
    }

    fn read_word(&mut self, first_char: char) -> Token {
        let word = self.read_word_text(first_char);

        if self.qualifier_follows() {
            self.pos += 1;
            return match self.read_name_part() {
                Ok((name, name_quoted)) => Token::Identifier(IdentToken {
                    domain: Some(word),
                    domain_quoted: false,
                    name,
                    name_quoted,
                    dot_prefixed: false,
                }),
                Err(token) => token,
            };
        }

        match word.to_lowercase().as_str() {
            "true" | "yes" => Token::Boolean(true),
            "false" | "no" => Token::Boolean(false),
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Identifier(IdentToken {
                domain: None,
                domain_quoted: false,
                name: word,
                name_quoted: false,
                dot_prefixed: false,
            }),
        }
    }

    /// Reads a decimal number with optional fraction and exponent.
    /// An `e` only belongs to the number when a digit (optionally signed) follows it,
    /// so `2e` lexes as `2` followed by the identifier `e`.
    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::new();
        if first_char == '.' {
            number_str.push('0');
        }
        number_str.push(first_char);
        let mut has_dot = first_char == '.';

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.pos += 1;
            } else if ch == '.' && !has_dot && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                has_dot = true;
                number_str.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if matches!(self.peek_at(digit_at), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
                number_str.push('e');
                if signed {
                    if self.bump() == Some('-') {
                        number_str.push('-');
                    }
                }
                while let Some(ch) = self.peek() {
                    if !ch.is_ascii_digit() {
                        break;
                    }
                    number_str.push(ch);
                    self.pos += 1;
                }
            }
        }

        Token::Number(number_str)
    }
}

/// Returns true if `ch` can start an identifier: any Unicode letter or underscore.
fn is_word_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_word_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
