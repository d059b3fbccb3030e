//! FILENAME: core/engine/src/functions/logic.rs
//! PURPOSE: Comparison, logical, bitwise, null and error built-ins.
//! CONTEXT: Comparisons are typed: numbers compare numerically, strings by
//! code point, datetimes chronologically. Comparing across types is an Error.
//! Logical results are the numbers 1 and 0.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use super::{checked, invalid, numbers, overflow, Arity, FunctionDef, FunctionRegistry};
use crate::datetime::Interval;
use crate::number;
use crate::value::{Data, ResultValue, ValueKind};

const VARIADIC: Arity = Arity::Variadic { min: 1 };

pub(super) fn register(registry: &mut FunctionRegistry) {
    let defs = [
        FunctionDef::pure("eq", Arity::Exact(2), fn_eq),
        FunctionDef::pure("ne", Arity::Exact(2), fn_ne),
        FunctionDef::pure("lt", Arity::Exact(2), fn_lt),
        FunctionDef::pure("le", Arity::Exact(2), fn_le),
        FunctionDef::pure("gt", Arity::Exact(2), fn_gt),
        FunctionDef::pure("ge", Arity::Exact(2), fn_ge),
        FunctionDef::pure("land", VARIADIC, fn_land).commutative_associative(),
        FunctionDef::pure("lor", VARIADIC, fn_lor).commutative_associative(),
        FunctionDef::pure("lnot", Arity::Exact(1), fn_lnot),
        FunctionDef::pure("and", VARIADIC, fn_and).commutative_associative(),
        FunctionDef::pure("or", VARIADIC, fn_or).commutative_associative(),
        FunctionDef::pure("xor", VARIADIC, fn_xor).commutative_associative(),
        FunctionDef::pure("not", Arity::Exact(1), fn_not),
        FunctionDef::pure("shl", Arity::Exact(2), fn_shl),
        FunctionDef::pure("shr", Arity::Exact(2), fn_shr),
        FunctionDef::pure("isnull", Arity::Exact(1), fn_isnull)
            .handles_nulls()
            .handles_errors(),
        FunctionDef::pure("null", Arity::Exact(1), fn_null).handles_nulls(),
        FunctionDef::pure("nulln", Arity::Exact(0), |_| ResultValue::null(ValueKind::Number)),
        FunctionDef::pure("nulls", Arity::Exact(0), |_| ResultValue::null(ValueKind::String)),
        FunctionDef::pure("nulldt", Arity::Exact(0), |_| ResultValue::null(ValueKind::Datetime)),
        FunctionDef::pure("error", Arity::Exact(1), fn_error)
            .handles_nulls()
            .handles_errors(),
    ];
    for def in defs {
        registry.register(def);
    }
}

// ==================== Comparison ====================

fn interval_key(iv: &Interval) -> (i64, i64, i64) {
    (
        i64::from(iv.years) * 12 + i64::from(iv.months),
        i64::from(iv.days),
        i64::from(iv.hours) * 3600 + i64::from(iv.minutes) * 60 + i64::from(iv.seconds),
    )
}

/// Orders two non-null values of the same type.
pub(crate) fn compare(a: &ResultValue, b: &ResultValue) -> Option<Ordering> {
    match (&a.data, &b.data) {
        (Data::Number(x), Data::Number(y)) => Some(x.cmp(y)),
        (Data::String(x), Data::String(y)) => Some(x.cmp(y)),
        (Data::Datetime(x), Data::Datetime(y)) => x.partial_cmp(y),
        (Data::Interval(x), Data::Interval(y)) => Some(interval_key(x).cmp(&interval_key(y))),
        _ => None,
    }
}

fn comparison(args: &[ResultValue], test: fn(Ordering) -> bool) -> ResultValue {
    match compare(&args[0], &args[1]) {
        Some(ord) => ResultValue::boolean(test(ord)),
        None => invalid(),
    }
}

fn fn_eq(args: &[ResultValue]) -> ResultValue {
    comparison(args, Ordering::is_eq)
}

fn fn_ne(args: &[ResultValue]) -> ResultValue {
    comparison(args, Ordering::is_ne)
}

fn fn_lt(args: &[ResultValue]) -> ResultValue {
    comparison(args, Ordering::is_lt)
}

fn fn_le(args: &[ResultValue]) -> ResultValue {
    comparison(args, Ordering::is_le)
}

fn fn_gt(args: &[ResultValue]) -> ResultValue {
    comparison(args, Ordering::is_gt)
}

fn fn_ge(args: &[ResultValue]) -> ResultValue {
    comparison(args, Ordering::is_ge)
}

// ==================== Logical ====================

fn fn_land(args: &[ResultValue]) -> ResultValue {
    match numbers(args) {
        Some(ns) => ResultValue::boolean(ns.iter().all(|n| !n.is_zero())),
        None => invalid(),
    }
}

fn fn_lor(args: &[ResultValue]) -> ResultValue {
    match numbers(args) {
        Some(ns) => ResultValue::boolean(ns.iter().any(|n| !n.is_zero())),
        None => invalid(),
    }
}

fn fn_lnot(args: &[ResultValue]) -> ResultValue {
    match args[0].as_number() {
        Some(n) => ResultValue::boolean(n.is_zero()),
        None => invalid(),
    }
}

// ==================== Bitwise ====================

/// Widest shift that can still land inside the number window.
const MAX_SHIFT: usize = 33_220;

/// Integral operands as big integers; fractions are truncated.
fn integers(args: &[ResultValue]) -> Option<Vec<BigInt>> {
    Some(numbers(args)?.into_iter().map(number::to_bigint).collect())
}

fn from_bigint(n: BigInt) -> ResultValue {
    checked(number::fit(BigDecimal::new(n, 0)))
}

fn bitwise(args: &[ResultValue], op: fn(BigInt, &BigInt) -> BigInt) -> ResultValue {
    match integers(args) {
        Some(ns) => match ns.into_iter().reduce(|a, b| op(a, &b)) {
            Some(v) => from_bigint(v),
            None => invalid(),
        },
        None => invalid(),
    }
}

fn fn_and(args: &[ResultValue]) -> ResultValue {
    bitwise(args, |a, b| a & b)
}

fn fn_or(args: &[ResultValue]) -> ResultValue {
    bitwise(args, |a, b| a | b)
}

fn fn_xor(args: &[ResultValue]) -> ResultValue {
    bitwise(args, |a, b| a ^ b)
}

fn fn_not(args: &[ResultValue]) -> ResultValue {
    match integers(args) {
        Some(ns) => from_bigint(!&ns[0]),
        None => invalid(),
    }
}

fn shift(args: &[ResultValue], left: bool) -> ResultValue {
    let Some(ns) = integers(args) else {
        return invalid();
    };
    let Some(amount) = ns[1].to_usize() else {
        return invalid();
    };
    if amount > MAX_SHIFT {
        return if left { overflow() } else { from_bigint(&ns[0] >> MAX_SHIFT) };
    }
    if left {
        from_bigint(&ns[0] << amount)
    } else {
        from_bigint(&ns[0] >> amount)
    }
}

fn fn_shl(args: &[ResultValue]) -> ResultValue {
    shift(args, true)
}

fn fn_shr(args: &[ResultValue]) -> ResultValue {
    shift(args, false)
}

// ==================== Nulls and Errors ====================

fn fn_isnull(args: &[ResultValue]) -> ResultValue {
    ResultValue::boolean(args[0].is_null())
}

/// A null of the operand's type.
fn fn_null(args: &[ResultValue]) -> ResultValue {
    ResultValue::null(args[0].kind())
}

fn fn_error(args: &[ResultValue]) -> ResultValue {
    match &args[0].data {
        Data::Error(msg) => ResultValue::error(msg.as_str()),
        _ => ResultValue::error(args[0].display_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::Datetime;

    fn n(v: i64) -> ResultValue {
        ResultValue::from_i64(v)
    }

    #[test]
    fn comparisons_are_typed() {
        assert_eq!(fn_lt(&[n(1), n(2)]), n(1));
        assert_eq!(fn_ge(&[ResultValue::string("b"), ResultValue::string("a")]), n(1));
        assert!(fn_eq(&[n(1), ResultValue::string("1")]).is_error());

        let early = ResultValue::datetime(Datetime::date(2000, 1, 1).unwrap());
        let late = ResultValue::datetime(Datetime::date(2000, 1, 2).unwrap());
        assert_eq!(fn_lt(&[early, late]), n(1));
    }

    #[test]
    fn logical_results_are_numbers() {
        assert_eq!(fn_land(&[n(1), n(2), n(3)]), n(1));
        assert_eq!(fn_land(&[n(1), n(0)]), n(0));
        assert_eq!(fn_lor(&[n(0), n(0), n(5)]), n(1));
        assert_eq!(fn_lnot(&[n(0)]), n(1));
    }

    #[test]
    fn bit_operations() {
        assert_eq!(fn_and(&[n(12), n(10)]), n(8));
        assert_eq!(fn_or(&[n(12), n(10)]), n(14));
        assert_eq!(fn_xor(&[n(12), n(10)]), n(6));
        assert_eq!(fn_not(&[n(0)]), n(-1));
        assert_eq!(fn_shl(&[n(1), n(4)]), n(16));
        assert_eq!(fn_shr(&[n(16), n(2)]), n(4));
        assert!(fn_shl(&[n(1), n(-1)]).is_error());
        assert_eq!(fn_shr(&[n(-16), n(2)]), n(-4));
    }

    #[test]
    fn bit_operations_are_not_limited_to_64_bits() {
        let wide = fn_shl(&[n(1), n(100)]);
        assert_eq!(wide.display_value(), "1267650600228229401496703205376");
        assert_eq!(fn_shr(&[wide.clone(), n(99)]), n(2));
        assert_eq!(fn_and(&[wide.clone(), n(1)]), n(0));
        assert!(fn_shl(&[n(1), n(1_000_000)]).is_error());
    }

    #[test]
    fn null_helpers() {
        assert_eq!(fn_isnull(&[ResultValue::null(ValueKind::String)]), n(1));
        assert_eq!(fn_isnull(&[ResultValue::error("x")]), n(0));
        let null = fn_null(&[ResultValue::string("a")]);
        assert!(null.is_null());
        assert_eq!(null.kind(), ValueKind::String);
    }

    #[test]
    fn error_builds_error_values() {
        let e = fn_error(&[ResultValue::string("bad row")]);
        assert_eq!(e.error_message(), Some("bad row"));
    }
}
