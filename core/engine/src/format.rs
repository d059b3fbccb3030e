//! FILENAME: core/engine/src/format.rs
//! PURPOSE: printf-style rendering behind the `format()` and `printf()` functions.
//! CONTEXT: A format string mixes literal text with placeholders. Each operand
//! consumes the next placeholder; text between placeholders is copied as is.
//!
//! PLACEHOLDERS:
//! - Legacy, one per operand: `%d`, `%.2d`, `%$d` (grouped), `%s`, `%%` for a
//!   literal percent sign. A datetime operand treats the rest of the string as
//!   strftime directives.
//! - Bracketed, repeatable: `!#{%...}` number, `!&{%s}` string,
//!   `!@{...}` strftime, `!${%n}` money (grouped, two decimals).
//!
//! A null operand renders as empty text. An Error operand is the result. A
//! placeholder that does not fit its operand, or an operand without a
//! placeholder, makes the whole result `Error("format error")`. So does a
//! width or precision above `MAX_FIELD`.

use bigdecimal::BigDecimal;

use crate::number::{self, Rounding};
use crate::value::{Data, ResultValue};

const FORMAT_ERROR: &str = "format error";

/// Largest width or precision a conversion may ask for.
pub const MAX_FIELD: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormatError;

/// Flags, width and precision of a `%...` conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Spec {
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    grouping: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

#[derive(Debug, Clone, PartialEq)]
enum Placeholder {
    Number(Spec),
    Money(Spec),
    Text(Spec),
    Datetime(String),
    /// A bare `%` conversion, typed by the operand it meets.
    Legacy,
}

// ============================================================================
// SCANNER
// ============================================================================

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn new(fmt: &str) -> Self {
        Scanner {
            chars: fmt.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Copies literal text into `out` up to the next placeholder.
    fn next_placeholder(&mut self, out: &mut String) -> Result<Option<Placeholder>, FormatError> {
        while let Some(c) = self.peek(0) {
            match c {
                '%' => match self.peek(1) {
                    Some('%') | None => {
                        out.push('%');
                        self.pos += if self.peek(1).is_some() { 2 } else { 1 };
                    }
                    Some(_) => return Ok(Some(Placeholder::Legacy)),
                },
                '!' => match self.peek(1) {
                    Some(kind @ ('#' | '&' | '$' | '@')) => {
                        self.pos += 2;
                        return self.new_style(kind).map(Some);
                    }
                    _ => {
                        out.push('!');
                        self.pos += 1;
                    }
                },
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(None)
    }

    /// Parses the body of a `!x{...}` or `!x%...` placeholder.
    fn new_style(&mut self, kind: char) -> Result<Placeholder, FormatError> {
        let body = if self.peek(0) == Some('{') {
            let close = self.chars[self.pos..]
                .iter()
                .position(|&c| c == '}')
                .ok_or(FormatError)?;
            let body: String = self.chars[self.pos + 1..self.pos + close].iter().collect();
            self.pos += close + 1;
            body
        } else if kind == '@' {
            // Unbracketed datetime format runs to the end of the string.
            let body: String = self.chars[self.pos..].iter().collect();
            self.pos = self.chars.len();
            body
        } else {
            let start = self.pos;
            self.parse_spec()?;
            self.chars[start..self.pos].iter().collect()
        };

        if kind == '@' {
            return Ok(Placeholder::Datetime(body));
        }
        let mut spec_scanner = Scanner::new(&body);
        let spec = spec_scanner.parse_spec()?;
        if spec_scanner.pos != spec_scanner.chars.len() {
            return Err(FormatError);
        }
        match (kind, spec.conversion) {
            ('#', 'd' | 'i' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G') => Ok(Placeholder::Number(spec)),
            ('&', 's') => Ok(Placeholder::Text(spec)),
            ('$', 'n' | 'i') => Ok(Placeholder::Money(spec)),
            _ => Err(FormatError),
        }
    }

    /// Parses `%[$][flags][width][.precision]conversion` at the cursor.
    fn parse_spec(&mut self) -> Result<Spec, FormatError> {
        if self.peek(0) != Some('%') {
            return Err(FormatError);
        }
        self.pos += 1;
        let mut spec = Spec::default();
        if self.peek(0) == Some('$') {
            spec.grouping = true;
            self.pos += 1;
        }
        while let Some(c) = self.peek(0) {
            match c {
                '-' => spec.left_align = true,
                '0' => spec.zero_pad = true,
                '+' => spec.plus_sign = true,
                '\'' => spec.grouping = true,
                ' ' | '#' => {}
                _ => break,
            }
            self.pos += 1;
        }
        spec.width = self.digits()?;
        if self.peek(0) == Some('.') {
            self.pos += 1;
            spec.precision = Some(self.digits()?.unwrap_or(0));
        }
        let conversion = self.peek(0).ok_or(FormatError)?;
        if !conversion.is_ascii_alphabetic() {
            return Err(FormatError);
        }
        spec.conversion = conversion;
        self.pos += 1;
        Ok(spec)
    }

    /// A width or precision field; Err when it exceeds `MAX_FIELD`.
    fn digits(&mut self) -> Result<Option<usize>, FormatError> {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.parse::<usize>() {
            Ok(n) if n <= MAX_FIELD => Ok(Some(n)),
            _ => Err(FormatError),
        }
    }

    /// Types a legacy `%` conversion by the operand it meets.
    fn legacy(&mut self, value: &ResultValue) -> Result<Placeholder, FormatError> {
        if matches!(value.data, Data::Datetime(_)) {
            let body: String = self.chars[self.pos..].iter().collect();
            self.pos = self.chars.len();
            return Ok(Placeholder::Datetime(body));
        }
        let spec = self.parse_spec()?;
        match spec.conversion {
            's' => Ok(Placeholder::Text(spec)),
            'd' | 'i' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' => Ok(Placeholder::Number(spec)),
            _ => Err(FormatError),
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// Adds thousands separators to the integer part of a plain number string.
fn add_thousands_separator(s: &str) -> String {
    let (integer_part, decimal_part) = match s.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (s, None),
    };
    let negative = integer_part.starts_with('-');
    let digits: Vec<char> = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut result = String::new();
    if negative {
        result.push('-');
    }
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    if let Some(dec) = decimal_part {
        result.push('.');
        result.push_str(dec);
    }
    result
}

fn render_number(value: &BigDecimal, spec: &Spec, default_places: usize) -> Result<String, FormatError> {
    let mut body = match spec.conversion {
        'e' | 'E' => {
            let f = number::to_f64(value).ok_or(FormatError)?;
            let s = format!("{:.*e}", spec.precision.unwrap_or(6), f);
            if spec.conversion == 'E' {
                s.to_uppercase()
            } else {
                s
            }
        }
        'g' | 'G' => match spec.precision {
            Some(p) => number::to_plain(&number::round(value, p as i64, Rounding::HalfEven)),
            None => number::to_plain(value),
        },
        _ => number::to_fixed(value, spec.precision.unwrap_or(default_places)),
    };
    if spec.grouping {
        body = add_thousands_separator(&body);
    }
    if spec.plus_sign && !body.starts_with('-') {
        body.insert(0, '+');
    }
    Ok(pad(body, spec, true))
}

fn pad(body: String, spec: &Spec, numeric: bool) -> String {
    let Some(width) = spec.width else {
        return body;
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if spec.left_align {
        format!("{}{}", body, " ".repeat(fill))
    } else if spec.zero_pad && numeric {
        let sign_len = usize::from(body.starts_with(['-', '+']));
        let (sign, digits) = body.split_at(sign_len);
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}

fn render_text(text: &str, spec: &Spec) -> String {
    let body: String = match spec.precision {
        Some(p) => text.chars().take(p).collect(),
        None => text.to_string(),
    };
    pad(body, spec, false)
}

fn render(placeholder: &Placeholder, value: &ResultValue, out: &mut String) -> Result<(), FormatError> {
    match (placeholder, &value.data) {
        (Placeholder::Number(spec), Data::Number(n)) => {
            if !value.is_null() {
                let default_places = if matches!(spec.conversion, 'f' | 'F') { 6 } else { 0 };
                out.push_str(&render_number(n, spec, default_places)?);
            }
        }
        (Placeholder::Money(spec), Data::Number(n)) => {
            if !value.is_null() {
                let money = Spec {
                    grouping: true,
                    conversion: 'f',
                    ..*spec
                };
                out.push_str(&render_number(n, &money, 2)?);
            }
        }
        (Placeholder::Text(spec), Data::String(s)) => {
            if !value.is_null() {
                out.push_str(&render_text(s, spec));
            }
        }
        (Placeholder::Text(spec), Data::Interval(iv)) => {
            if !value.is_null() {
                out.push_str(&render_text(&iv.to_string(), spec));
            }
        }
        (Placeholder::Datetime(fmt), Data::Datetime(dt)) => {
            if !value.is_null() {
                out.push_str(&dt.format(fmt).ok_or(FormatError)?);
            }
        }
        _ => return Err(FormatError),
    }
    Ok(())
}

fn printf_inner(fmt: &str, args: &[ResultValue]) -> Result<String, FormatError> {
    let mut scanner = Scanner::new(fmt);
    let mut out = String::new();
    for arg in args {
        let placeholder = match scanner.next_placeholder(&mut out)? {
            Some(Placeholder::Legacy) => scanner.legacy(arg)?,
            Some(p) => p,
            None => return Err(FormatError),
        };
        render(&placeholder, arg, &mut out)?;
    }
    // Remaining placeholders have no operand.
    if scanner.next_placeholder(&mut out)?.is_some() {
        return Err(FormatError);
    }
    Ok(out)
}

/// Renders `args` into `fmt`, one placeholder per operand.
pub fn printf(fmt: &str, args: &[ResultValue]) -> ResultValue {
    if let Some(err) = args.iter().find(|a| a.is_error()) {
        return err.clone();
    }
    match printf_inner(fmt, args) {
        Ok(s) => ResultValue::string(s),
        Err(FormatError) => ResultValue::error(FORMAT_ERROR),
    }
}

/// Renders a single value. An empty format gives the value's plain text.
pub fn format_value(value: &ResultValue, fmt: &str) -> ResultValue {
    if value.is_error() {
        return value.clone();
    }
    if fmt.is_empty() {
        return ResultValue::string(value.display_value());
    }
    printf(fmt, std::slice::from_ref(value))
}

/// Fixed-point rendering right-aligned to `width`, used by `str()`. None when
/// either field exceeds `MAX_FIELD`.
pub fn fixed_width(value: &BigDecimal, width: usize, places: usize) -> Option<String> {
    if width > MAX_FIELD || places > MAX_FIELD {
        return None;
    }
    let spec = Spec {
        width: Some(width),
        precision: Some(places),
        conversion: 'f',
        ..Spec::default()
    };
    Some(pad(number::to_fixed(value, places), &spec, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::Datetime;
    use crate::value::ValueKind;
    use std::str::FromStr;

    fn num(s: &str) -> ResultValue {
        ResultValue::number(BigDecimal::from_str(s).unwrap())
    }

    fn text(v: ResultValue) -> String {
        v.as_str().unwrap().to_string()
    }

    #[test]
    fn legacy_number_with_precision() {
        assert_eq!(text(format_value(&num("3.14159"), "%.2d")), "3.14");
        assert_eq!(text(format_value(&num("42"), "Total: %d items")), "Total: 42 items");
    }

    #[test]
    fn legacy_grouping() {
        assert_eq!(text(format_value(&num("1234567.891"), "%$.2d")), "1,234,567.89");
    }

    #[test]
    fn percent_escapes() {
        assert_eq!(text(format_value(&num("50"), "%d%%")), "50%");
        assert_eq!(text(printf("100%% sure", &[])), "100% sure");
    }

    #[test]
    fn legacy_string_and_datetime() {
        assert_eq!(text(format_value(&ResultValue::string("abc"), "[%s]")), "[abc]");
        let d = ResultValue::datetime(Datetime::date(2021, 3, 4).unwrap());
        assert_eq!(text(format_value(&d, "%Y/%m/%d")), "2021/03/04");
    }

    #[test]
    fn bracketed_placeholders_repeat() {
        let out = printf(
            "!&{%s} owes !${%n} since !@{%d.%m.%Y}",
            &[
                ResultValue::string("Bob"),
                num("1234.5"),
                ResultValue::datetime(Datetime::date(2020, 1, 2).unwrap()),
            ],
        );
        assert_eq!(text(out), "Bob owes 1,234.50 since 02.01.2020");
    }

    #[test]
    fn null_renders_empty_and_keeps_literals() {
        let out = printf("a!#{%d}b", &[ResultValue::null(ValueKind::Number)]);
        assert_eq!(text(out), "ab");
    }

    #[test]
    fn mismatches_are_format_errors() {
        let out = printf("!#{%d}", &[ResultValue::string("x")]);
        assert_eq!(out.error_message(), Some("format error"));
        let missing = printf("%d and %d", &[num("1")]);
        assert_eq!(missing.error_message(), Some("format error"));
        let extra = printf("plain", &[num("1")]);
        assert!(extra.is_error());
    }

    #[test]
    fn error_operand_propagates() {
        let out = printf("%d", &[ResultValue::error("bad")]);
        assert_eq!(out.error_message(), Some("bad"));
    }

    #[test]
    fn width_and_alignment() {
        assert_eq!(text(format_value(&num("7"), "%05d")), "00007");
        assert_eq!(text(format_value(&ResultValue::string("ab"), "%-4s|")), "ab  |");
        assert_eq!(text(format_value(&ResultValue::string("abcdef"), "%.3s")), "abc");
    }

    #[test]
    fn str_helper_pads() {
        let pi = BigDecimal::from_str("3.14159").unwrap();
        assert_eq!(fixed_width(&pi, 8, 2).unwrap(), "    3.14");
        assert_eq!(fixed_width(&pi, MAX_FIELD + 1, 2), None);
        assert_eq!(fixed_width(&pi, 2, MAX_FIELD + 1), None);
    }

    #[test]
    fn oversized_fields_are_format_errors() {
        let out = format_value(&num("1"), "%999999999d");
        assert_eq!(out.error_message(), Some("format error"));
        let out = format_value(&num("1"), "%.99999999999999999999999d");
        assert_eq!(out.error_message(), Some("format error"));
        let out = printf("!&{%2000s}", &[ResultValue::string("x")]);
        assert_eq!(out.error_message(), Some("format error"));
        assert_eq!(text(format_value(&num("1"), "%1000d")).len(), MAX_FIELD);
    }

    #[test]
    fn large_numbers_render_in_full() {
        let big = num("123456789012345678901234567890.125");
        assert_eq!(text(format_value(&big, "%.2d")), "123456789012345678901234567890.13");
        assert_eq!(text(format_value(&big, "%'.0f")), "123,456,789,012,345,678,901,234,567,890");
    }
}
