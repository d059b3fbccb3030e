//! FILENAME: core/engine/src/value.rs
//! PURPOSE: Defines the tagged, independently nullable value produced by evaluation.
//! CONTEXT: Every expression node, cursor column and report variable holds a
//! `ResultValue`. The type tag and the null flag are orthogonal: a null number is
//! still a number, so functions can check types before deciding null semantics.
//! Numbers are unbounded exact decimals so running totals over many rows do
//! not drift and large values do not overflow.

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::datetime::{Datetime, Interval};

/// The type tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Number,
    String,
    Datetime,
    Interval,
    Error,
}

/// Payload of a value. Null values keep a default payload of their kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Data {
    Number(BigDecimal),
    String(String),
    Datetime(Datetime),
    Interval(Interval),
    /// In-band runtime error with its message.
    Error(String),
}

/// The value of an expression, column or variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultValue {
    pub data: Data,
    pub is_null: bool,
}

impl ResultValue {
    pub fn number(n: BigDecimal) -> Self {
        ResultValue {
            data: Data::Number(n),
            is_null: false,
        }
    }

    pub fn from_i64(n: i64) -> Self {
        Self::number(BigDecimal::from(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::from_i64(if b { 1 } else { 0 })
    }

    pub fn string(s: impl Into<String>) -> Self {
        ResultValue {
            data: Data::String(s.into()),
            is_null: false,
        }
    }

    pub fn datetime(dt: Datetime) -> Self {
        ResultValue {
            data: Data::Datetime(dt),
            is_null: false,
        }
    }

    pub fn interval(iv: Interval) -> Self {
        ResultValue {
            data: Data::Interval(iv),
            is_null: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResultValue {
            data: Data::Error(message.into()),
            is_null: false,
        }
    }

    /// A typed null.
    pub fn null(kind: ValueKind) -> Self {
        let data = match kind {
            ValueKind::Number => Data::Number(BigDecimal::zero()),
            ValueKind::String => Data::String(String::new()),
            ValueKind::Datetime => Data::Datetime(Datetime::default()),
            ValueKind::Interval => Data::Interval(Interval::default()),
            ValueKind::Error => Data::Error(String::new()),
        };
        ResultValue {
            data,
            is_null: true,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self.data {
            Data::Number(_) => ValueKind::Number,
            Data::String(_) => ValueKind::String,
            Data::Datetime(_) => ValueKind::Datetime,
            Data::Interval(_) => ValueKind::Interval,
            Data::Error(_) => ValueKind::Error,
        }
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn is_error(&self) -> bool {
        matches!(self.data, Data::Error(_))
    }

    /// The error message, if this is an error value.
    pub fn error_message(&self) -> Option<&str> {
        match &self.data {
            Data::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// The number, unless the value is null or of another type.
    pub fn as_number(&self) -> Option<&BigDecimal> {
        match &self.data {
            Data::Number(n) if !self.is_null => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::String(s) if !self.is_null => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&Datetime> {
        match &self.data {
            Data::Datetime(dt) if !self.is_null => Some(dt),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<&Interval> {
        match &self.data {
            Data::Interval(iv) if !self.is_null => Some(iv),
            _ => None,
        }
    }

    /// Truthiness used by logical operators and conditions: a non-null, nonzero number.
    pub fn is_truthy(&self) -> bool {
        self.as_number().is_some_and(|n| !n.is_zero())
    }

    /// Orders two values of the same type; None across types.
    pub fn compare(&self, other: &ResultValue) -> Option<std::cmp::Ordering> {
        crate::functions::compare(self, other)
    }

    /// Text rendering used by `str()`, concatenation of mixed values and diagnostics.
    pub fn display_value(&self) -> String {
        if self.is_null {
            return String::new();
        }
        match &self.data {
            Data::Number(n) => crate::number::to_plain(n),
            Data::String(s) => s.clone(),
            Data::Datetime(dt) => dt.to_string(),
            Data::Interval(iv) => iv.to_string(),
            Data::Error(msg) => msg.clone(),
        }
    }
}

impl Default for ResultValue {
    /// A null number, the value of anything not evaluated yet.
    fn default() -> Self {
        ResultValue::null(ValueKind::Number)
    }
}

impl From<BigDecimal> for ResultValue {
    fn from(n: BigDecimal) -> Self {
        ResultValue::number(n)
    }
}

impl From<&str> for ResultValue {
    fn from(s: &str) -> Self {
        ResultValue::string(s)
    }
}

impl std::fmt::Display for ResultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null {
            return write!(f, "NULL");
        }
        match &self.data {
            Data::Error(msg) => write!(f, "(ERROR) {}", msg),
            _ => write!(f, "{}", self.display_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn typed_null_keeps_kind() {
        let v = ResultValue::null(ValueKind::String);
        assert!(v.is_null());
        assert_eq!(v.kind(), ValueKind::String);
        assert_eq!(v.as_str(), None);
    }

    #[test]
    fn truthiness_follows_nonzero_numbers() {
        assert!(ResultValue::number(dec("2.5")).is_truthy());
        assert!(!ResultValue::number(dec("0")).is_truthy());
        assert!(!ResultValue::string("yes").is_truthy());
        assert!(!ResultValue::null(ValueKind::Number).is_truthy());
    }

    #[test]
    fn display_normalizes_trailing_zeros() {
        assert_eq!(ResultValue::number(dec("20.000")).display_value(), "20");
        assert_eq!(ResultValue::number(dec("0.50")).display_value(), "0.5");
    }

    #[test]
    fn display_is_positional_for_large_numbers() {
        let big = ResultValue::number(dec("1e30"));
        assert_eq!(big.display_value(), format!("1{}", "0".repeat(30)));
    }

    #[test]
    fn error_value_displays_message() {
        let v = ResultValue::error("division by zero");
        assert!(v.is_error());
        assert_eq!(v.to_string(), "(ERROR) division by zero");
    }

    #[test]
    fn serializes_with_serde() {
        let n = ResultValue::number(dec("123456789012345678901234567890.25"));
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(serde_json::from_str::<ResultValue>(&json).unwrap(), n);

        let v = ResultValue::string("abc");
        let json = serde_json::to_string(&v).unwrap();
        let back: ResultValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
