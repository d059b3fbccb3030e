//! FILENAME: core/engine/src/functions/math.rs
//! PURPOSE: Arithmetic, rounding and transcendental built-ins.
//! CONTEXT: `add` and `sub` are typed: they also concatenate strings and do
//! calendar arithmetic on datetimes and intervals. Everything else works on
//! unbounded decimal numbers only. Sums, products, integer powers and
//! factorials are exact, square roots keep 100 significant digits. Logarithms,
//! exponentials and trigonometry go through binary floating point and come back
//! as the shortest equivalent decimal.
//! Domain errors (sqrt(-1), division by zero) become Error values rather than
//! panics.

use bigdecimal::BigDecimal;
use num_traits::{One, Signed, ToPrimitive, Zero};

use super::{checked, invalid, numbers, overflow, unary_number, Arity, FunctionDef, FunctionRegistry};
use crate::number::{self, Rounding};
use crate::value::{Data, ResultValue};

const VARIADIC: Arity = Arity::Variadic { min: 1 };

pub(super) fn register(registry: &mut FunctionRegistry) {
    let defs = [
        FunctionDef::pure("add", VARIADIC, fn_add).commutative_associative(),
        FunctionDef::pure("sub", VARIADIC, fn_sub),
        FunctionDef::pure("mul", VARIADIC, fn_mul).commutative_associative(),
        FunctionDef::pure("div", VARIADIC, fn_div),
        FunctionDef::pure("mod", Arity::Exact(2), fn_remainder),
        FunctionDef::pure("remainder", Arity::Exact(2), fn_remainder),
        FunctionDef::pure("fmod", Arity::Exact(2), fn_fmod),
        FunctionDef::pure("uminus", Arity::Exact(1), fn_uminus),
        FunctionDef::pure("uplus", Arity::Exact(1), fn_uplus),
        FunctionDef::pure("inc", Arity::Exact(1), fn_inc),
        FunctionDef::pure("dec", Arity::Exact(1), fn_dec),
        FunctionDef::pure("factorial", Arity::Exact(1), fn_factorial),
        FunctionDef::pure("pow", Arity::Exact(2), fn_pow),
        FunctionDef::pure("abs", Arity::Exact(1), fn_abs),
        FunctionDef::pure("sqr", Arity::Exact(1), fn_sqr),
        FunctionDef::pure("sqrt", Arity::Exact(1), fn_sqrt),
        FunctionDef::pure("exp", Arity::Exact(1), fn_exp),
        FunctionDef::pure("exp2", Arity::Exact(1), fn_exp2),
        FunctionDef::pure("exp10", Arity::Exact(1), fn_exp10),
        FunctionDef::pure("ln", Arity::Exact(1), fn_ln),
        FunctionDef::pure("log", Arity::Exact(1), fn_ln),
        FunctionDef::pure("log2", Arity::Exact(1), fn_log2),
        FunctionDef::pure("log10", Arity::Exact(1), fn_log10),
        FunctionDef::pure("floor", Arity::Exact(1), fn_floor),
        FunctionDef::pure("ceil", Arity::Exact(1), fn_ceil),
        FunctionDef::pure("round", Arity::Range(1, 2), fn_round),
        FunctionDef::pure("rint", Arity::Exact(1), fn_rint),
        FunctionDef::pure("trunc", Arity::Exact(1), fn_trunc),
        FunctionDef::pure("sin", Arity::Exact(1), fn_sin),
        FunctionDef::pure("cos", Arity::Exact(1), fn_cos),
        FunctionDef::pure("tan", Arity::Exact(1), fn_tan),
        FunctionDef::pure("cot", Arity::Exact(1), fn_cot),
        FunctionDef::pure("sec", Arity::Exact(1), fn_sec),
        FunctionDef::pure("csc", Arity::Exact(1), fn_csc),
        FunctionDef::pure("asin", Arity::Exact(1), fn_asin),
        FunctionDef::pure("acos", Arity::Exact(1), fn_acos),
        FunctionDef::pure("atan", Arity::Exact(1), fn_atan),
    ];
    for def in defs {
        registry.register(def);
    }
}

// ==================== Typed Addition / Subtraction ====================

fn add_pair(a: &ResultValue, b: &ResultValue) -> ResultValue {
    match (&a.data, &b.data) {
        (Data::Number(x), Data::Number(y)) => checked(number::add(x, y)),
        (Data::String(x), Data::String(y)) => ResultValue::string(format!("{}{}", x, y)),
        (Data::Datetime(dt), Data::Number(n)) | (Data::Number(n), Data::Datetime(dt)) => {
            dt.add_number(n).map(ResultValue::datetime).unwrap_or_else(overflow)
        }
        (Data::Datetime(dt), Data::Interval(iv)) | (Data::Interval(iv), Data::Datetime(dt)) => {
            dt.add_interval(iv).map(ResultValue::datetime).unwrap_or_else(overflow)
        }
        (Data::Interval(x), Data::Interval(y)) => ResultValue::interval(x.plus(y)),
        _ => invalid(),
    }
}

fn sub_pair(a: &ResultValue, b: &ResultValue) -> ResultValue {
    match (&a.data, &b.data) {
        (Data::Number(x), Data::Number(y)) => checked(number::sub(x, y)),
        (Data::Datetime(dt), Data::Number(n)) => {
            dt.add_number(&-n).map(ResultValue::datetime).unwrap_or_else(overflow)
        }
        (Data::Datetime(dt), Data::Interval(iv)) => {
            dt.sub_interval(iv).map(ResultValue::datetime).unwrap_or_else(overflow)
        }
        (Data::Datetime(x), Data::Datetime(y)) => {
            x.interval_since(y).map(ResultValue::interval).unwrap_or_else(overflow)
        }
        (Data::Interval(x), Data::Interval(y)) => ResultValue::interval(x.minus(y)),
        _ => invalid(),
    }
}

/// Folds operands left to right, stopping at the first error.
fn fold(args: &[ResultValue], pair: fn(&ResultValue, &ResultValue) -> ResultValue) -> ResultValue {
    let Some((first, rest)) = args.split_first() else {
        return invalid();
    };
    let mut acc = first.clone();
    for arg in rest {
        acc = pair(&acc, arg);
        if acc.is_error() {
            break;
        }
    }
    acc
}

fn fn_add(args: &[ResultValue]) -> ResultValue {
    fold(args, add_pair)
}

fn fn_sub(args: &[ResultValue]) -> ResultValue {
    fold(args, sub_pair)
}

// ==================== Numeric Arithmetic ====================

fn fn_mul(args: &[ResultValue]) -> ResultValue {
    let Some(ns) = numbers(args) else {
        return invalid();
    };
    let Some((first, rest)) = ns.split_first() else {
        return invalid();
    };
    let mut acc = (*first).clone();
    for n in rest {
        match number::mul(&acc, n) {
            Some(v) => acc = v,
            None => return overflow(),
        }
    }
    ResultValue::number(acc)
}

fn fn_div(args: &[ResultValue]) -> ResultValue {
    let Some(ns) = numbers(args) else {
        return invalid();
    };
    let Some((first, rest)) = ns.split_first() else {
        return invalid();
    };
    let mut acc = (*first).clone();
    for n in rest {
        if n.is_zero() {
            return ResultValue::error("division by zero");
        }
        match number::div(&acc, n) {
            Some(v) => acc = v,
            None => return overflow(),
        }
    }
    ResultValue::number(acc)
}

fn two_numbers(args: &[ResultValue]) -> Option<(&BigDecimal, &BigDecimal)> {
    Some((args.first()?.as_number()?, args.get(1)?.as_number()?))
}

/// Remainder of the division rounded to the nearest integer (IEEE remainder).
fn fn_remainder(args: &[ResultValue]) -> ResultValue {
    let Some((x, y)) = two_numbers(args) else {
        return invalid();
    };
    if y.is_zero() {
        return ResultValue::error("division by zero");
    }
    let Some(q) = number::div(x, y) else {
        return overflow();
    };
    let n = number::round(&q, 0, Rounding::HalfEven);
    checked(number::mul(&n, y).and_then(|p| number::sub(x, &p)))
}

/// Remainder with the sign of the dividend.
fn fn_fmod(args: &[ResultValue]) -> ResultValue {
    let Some((x, y)) = two_numbers(args) else {
        return invalid();
    };
    if y.is_zero() {
        return ResultValue::error("division by zero");
    }
    checked(number::rem(x, y))
}

fn fn_uminus(args: &[ResultValue]) -> ResultValue {
    match &args[0].data {
        Data::Number(n) => ResultValue::number(-n),
        Data::Interval(iv) => ResultValue::interval(iv.negated()),
        _ => invalid(),
    }
}

fn fn_uplus(args: &[ResultValue]) -> ResultValue {
    args[0].clone()
}

fn fn_inc(args: &[ResultValue]) -> ResultValue {
    add_pair(&args[0], &ResultValue::number(BigDecimal::one()))
}

fn fn_dec(args: &[ResultValue]) -> ResultValue {
    sub_pair(&args[0], &ResultValue::number(BigDecimal::one()))
}

fn fn_factorial(args: &[ResultValue]) -> ResultValue {
    let Some(n) = args.first().and_then(ResultValue::as_number) else {
        return invalid();
    };
    if n.is_negative() || !number::is_integer(n) {
        return invalid();
    }
    match n.to_u32() {
        Some(n) => checked(number::factorial(n)),
        None => overflow(),
    }
}

fn fn_pow(args: &[ResultValue]) -> ResultValue {
    let Some((base, exponent)) = two_numbers(args) else {
        return invalid();
    };
    if number::is_integer(exponent) {
        let Some(e) = exponent.to_i64() else {
            return overflow();
        };
        if base.is_zero() && e < 0 {
            return ResultValue::error("division by zero");
        }
        return checked(number::powi(base, e));
    }
    if base.is_negative() {
        return invalid();
    }
    checked(binary_via_f64(base, exponent, f64::powf))
}

fn fn_abs(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| Some(n.abs()))
}

fn fn_sqr(args: &[ResultValue]) -> ResultValue {
    match args[0].as_number() {
        Some(n) => checked(number::mul(n, n)),
        None => invalid(),
    }
}

fn fn_sqrt(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| n.sqrt())
}

fn fn_exp(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::exp))
}

/// `base` raised to the operand: exact for integral exponents.
fn exp_base(args: &[ResultValue], base: i64) -> ResultValue {
    let Some(n) = args.first().and_then(ResultValue::as_number) else {
        return invalid();
    };
    let base = BigDecimal::from(base);
    if number::is_integer(n) {
        return match n.to_i64() {
            Some(e) => checked(number::powi(&base, e)),
            None => overflow(),
        };
    }
    checked(binary_via_f64(&base, n, f64::powf))
}

fn fn_exp2(args: &[ResultValue]) -> ResultValue {
    exp_base(args, 2)
}

fn fn_exp10(args: &[ResultValue]) -> ResultValue {
    exp_base(args, 10)
}

fn positive_via_f64(n: &BigDecimal, f: fn(f64) -> f64) -> Option<BigDecimal> {
    if !n.is_positive() {
        return None;
    }
    via_f64(n, f)
}

fn fn_ln(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| positive_via_f64(n, f64::ln))
}

fn fn_log2(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| positive_via_f64(n, f64::log2))
}

fn fn_log10(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| positive_via_f64(n, f64::log10))
}

// ==================== Rounding ====================

fn fn_floor(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| Some(number::floor(n)))
}

fn fn_ceil(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| Some(number::ceil(n)))
}

/// Rounds half away from zero, optionally to a number of decimal places.
fn fn_round(args: &[ResultValue]) -> ResultValue {
    let Some(ns) = numbers(args) else {
        return invalid();
    };
    let places = match ns.get(1) {
        Some(p) => match p.to_u32().filter(|p| i64::from(*p) <= number::MAX_SCALE) {
            Some(p) => i64::from(p),
            None => return invalid(),
        },
        None => 0,
    };
    ResultValue::number(number::round(ns[0], places, Rounding::HalfUp))
}

/// Rounds half to even.
fn fn_rint(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| Some(number::round(n, 0, Rounding::HalfEven)))
}

fn fn_trunc(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| Some(number::trunc(n)))
}

// ==================== Trigonometry ====================

/// Transcendental functions go through f64; the result is the shortest decimal
/// that reads back as the same float.
fn via_f64(n: &BigDecimal, f: fn(f64) -> f64) -> Option<BigDecimal> {
    number::from_f64(f(number::to_f64(n)?))
}

fn binary_via_f64(a: &BigDecimal, b: &BigDecimal, f: fn(f64, f64) -> f64) -> Option<BigDecimal> {
    number::from_f64(f(number::to_f64(a)?, number::to_f64(b)?))
}

fn reciprocal(n: f64) -> f64 {
    1.0 / n
}

fn fn_sin(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::sin))
}

fn fn_cos(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::cos))
}

fn fn_tan(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::tan))
}

fn fn_cot(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, |x| reciprocal(x.tan())))
}

fn fn_sec(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, |x| reciprocal(x.cos())))
}

fn fn_csc(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, |x| reciprocal(x.sin())))
}

fn fn_asin(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::asin))
}

fn fn_acos(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::acos))
}

fn fn_atan(args: &[ResultValue]) -> ResultValue {
    unary_number(args, |n| via_f64(n, f64::atan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::{Datetime, Interval};
    use std::str::FromStr;

    fn num(s: &str) -> ResultValue {
        ResultValue::number(BigDecimal::from_str(s).unwrap())
    }

    #[test]
    fn strings_concatenate_but_do_not_subtract() {
        let out = fn_add(&[ResultValue::string("ab"), ResultValue::string("cd")]);
        assert_eq!(out, ResultValue::string("abcd"));
        assert!(fn_sub(&[ResultValue::string("ab"), ResultValue::string("b")]).is_error());
    }

    #[test]
    fn division_is_left_to_right_and_checks_zero() {
        assert_eq!(fn_div(&[num("6"), num("3"), num("2")]), num("1"));
        let err = fn_div(&[num("1"), num("0")]);
        assert_eq!(err.error_message(), Some("division by zero"));
    }

    #[test]
    fn datetime_arithmetic() {
        let d = ResultValue::datetime(Datetime::date(1980, 2, 29).unwrap());
        let next = fn_add(&[d.clone(), num("1")]);
        assert_eq!(next, ResultValue::datetime(Datetime::date(1980, 3, 1).unwrap()));

        let jan31 = ResultValue::datetime(Datetime::date(1980, 1, 31).unwrap());
        let feb = fn_add(&[jan31, ResultValue::interval(Interval::months(1))]);
        assert_eq!(feb, ResultValue::datetime(Datetime::date(1980, 2, 29).unwrap()));

        let diff = fn_sub(&[next, d]);
        assert_eq!(diff, ResultValue::interval(Interval::days(1)));

        let both = fn_add(&[feb.clone(), feb]);
        assert!(both.is_error());
    }

    #[test]
    fn number_minus_datetime_is_error() {
        let d = ResultValue::datetime(Datetime::date(2000, 1, 1).unwrap());
        assert!(fn_sub(&[num("1"), d]).is_error());
    }

    #[test]
    fn remainder_variants() {
        assert_eq!(fn_fmod(&[num("7"), num("3")]), num("1"));
        assert_eq!(fn_fmod(&[num("-7"), num("3")]), num("-1"));
        assert_eq!(fn_remainder(&[num("7"), num("4")]), num("-1"));
    }

    #[test]
    fn power_and_roots() {
        assert_eq!(fn_pow(&[num("2"), num("10")]), num("1024"));
        assert_eq!(fn_pow(&[num("2"), num("-1")]), num("0.5"));
        assert!(fn_sqrt(&[num("-4")]).is_error());
        assert_eq!(fn_sqrt(&[num("16")]), num("4"));
        assert!(fn_pow(&[num("-8"), num("0.5")]).is_error());
    }

    #[test]
    fn results_are_not_limited_to_machine_decimals() {
        let p = fn_pow(&[num("2"), num("100")]);
        assert_eq!(p.display_value(), "1267650600228229401496703205376");
        let f = fn_factorial(&[num("30")]);
        assert_eq!(f.display_value(), "265252859812191058636308480000000");
        let big = num("79000000000000000000000000000");
        assert_eq!(fn_mul(&[big.clone(), big.clone()]).display_value(), format!("6241{}", "0".repeat(54)));
        assert_eq!(fn_exp10(&[num("40")]).display_value(), format!("1{}", "0".repeat(40)));
    }

    #[test]
    fn results_past_the_number_window_are_overflow() {
        let err = fn_pow(&[num("10"), num("100000")]);
        assert_eq!(err.error_message(), Some("numeric overflow"));
        assert_eq!(fn_factorial(&[num("100000")]).error_message(), Some("numeric overflow"));
        assert!(fn_exp(&[num("1e9")]).is_error());
    }

    #[test]
    fn transcendental_functions_round_trip_through_floats() {
        assert_eq!(fn_sin(&[num("0")]), num("0"));
        assert_eq!(fn_ln(&[num("1")]), num("0"));
        assert_eq!(fn_log10(&[num("1000")]), num("3"));
        assert!(fn_ln(&[num("0")]).is_error());
        assert_eq!(fn_exp2(&[num("-1")]), num("0.5"));
    }

    #[test]
    fn factorial_of_integers_only() {
        assert_eq!(fn_factorial(&[num("5")]), num("120"));
        assert_eq!(fn_factorial(&[num("0")]), num("1"));
        assert!(fn_factorial(&[num("2.5")]).is_error());
        assert!(fn_factorial(&[num("-1")]).is_error());
    }

    #[test]
    fn rounding_modes() {
        assert_eq!(fn_round(&[num("2.5")]), num("3"));
        assert_eq!(fn_rint(&[num("2.5")]), num("2"));
        assert_eq!(fn_round(&[num("1.2345"), num("2")]), num("1.23"));
        assert_eq!(fn_trunc(&[num("-1.7")]), num("-1"));
        assert_eq!(fn_floor(&[num("-1.2")]), num("-2"));
    }

    #[test]
    fn increments_work_on_dates() {
        let d = ResultValue::datetime(Datetime::date(1979, 2, 28).unwrap());
        assert_eq!(fn_inc(&[d]), ResultValue::datetime(Datetime::date(1979, 3, 1).unwrap()));
        assert_eq!(fn_dec(&[num("1")]), num("0"));
    }
}
