//! FILENAME: core/engine/src/number.rs
//! PURPOSE: Arithmetic, rounding and text conversion for unbounded decimal numbers.
//! CONTEXT: Every number is a `BigDecimal`. Sums, products and integer powers
//! are exact; division keeps the library's default precision (100 significant
//! digits). Values are kept inside a generous magnitude window so that a single
//! expression cannot allocate without bound: results with more than
//! `MAX_INTEGER_DIGITS` integer digits are an overflow, and fractions longer
//! than `MAX_SCALE` digits are rounded half to even.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Largest number of digits before the decimal point.
pub const MAX_INTEGER_DIGITS: i64 = 10_000;

/// Largest number of digits after the decimal point.
pub const MAX_SCALE: i64 = 10_000;

/// Upper bound on the digits an integer power may produce before rounding.
const POW_DIGIT_LIMIT: u128 = 4 * MAX_INTEGER_DIGITS as u128;

/// Largest argument `factorial` computes; the result already exceeds the window.
const FACTORIAL_LIMIT: u32 = 5_000;

/// How `round` treats the discarded digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    Floor,
    Ceiling,
    /// Half away from zero.
    HalfUp,
    HalfEven,
}

// ============================================================================
// RANGE
// ============================================================================

fn scale_of(n: &BigDecimal) -> i64 {
    n.as_bigint_and_exponent().1
}

/// Digits before the decimal point (zero or negative for pure fractions).
pub fn integer_digits(n: &BigDecimal) -> i64 {
    if n.is_zero() {
        return 0;
    }
    n.digits() as i64 - scale_of(n)
}

/// True if `n` lies inside the magnitude window without rounding.
pub fn in_range(n: &BigDecimal) -> bool {
    scale_of(n) <= MAX_SCALE && integer_digits(n) <= MAX_INTEGER_DIGITS
}

/// Brings a computed value into the window, or None when it is too large.
pub fn fit(n: BigDecimal) -> Option<BigDecimal> {
    let n = if scale_of(&n) > MAX_SCALE {
        round(&n, MAX_SCALE, Rounding::HalfEven)
    } else {
        n
    };
    (integer_digits(&n) <= MAX_INTEGER_DIGITS).then_some(n)
}

// ============================================================================
// ARITHMETIC
// ============================================================================

pub fn add(a: &BigDecimal, b: &BigDecimal) -> Option<BigDecimal> {
    fit(a + b)
}

pub fn sub(a: &BigDecimal, b: &BigDecimal) -> Option<BigDecimal> {
    fit(a - b)
}

pub fn mul(a: &BigDecimal, b: &BigDecimal) -> Option<BigDecimal> {
    fit(a * b)
}

/// None for a zero divisor; callers report that separately.
pub fn div(a: &BigDecimal, b: &BigDecimal) -> Option<BigDecimal> {
    if b.is_zero() {
        return None;
    }
    fit(a / b)
}

/// Remainder with the sign of the dividend.
pub fn rem(a: &BigDecimal, b: &BigDecimal) -> Option<BigDecimal> {
    if b.is_zero() {
        return None;
    }
    fit(a.clone() % b.clone())
}

/// Exact integer power; negative exponents divide one by the positive power.
pub fn powi(base: &BigDecimal, exponent: i64) -> Option<BigDecimal> {
    if exponent == 0 {
        return Some(BigDecimal::one());
    }
    if base.is_zero() {
        return (exponent > 0).then(BigDecimal::zero);
    }
    let magnitude = exponent.unsigned_abs();
    if u128::from(base.digits()) * u128::from(magnitude) > POW_DIGIT_LIMIT {
        return None;
    }
    let k = u32::try_from(magnitude).ok()?;
    let (int, scale) = base.as_bigint_and_exponent();
    let power = BigDecimal::new(int.pow(k), scale.checked_mul(i64::from(k))?);
    if exponent < 0 {
        div(&BigDecimal::one(), &power)
    } else {
        fit(power)
    }
}

pub fn factorial(n: u32) -> Option<BigDecimal> {
    if n > FACTORIAL_LIMIT {
        return None;
    }
    let product = (2..=n).fold(BigInt::one(), |acc, i| acc * i);
    fit(BigDecimal::new(product, 0))
}

// ============================================================================
// ROUNDING
// ============================================================================

/// Rounds to `places` digits after the decimal point (negative: before it).
pub fn round(n: &BigDecimal, places: i64, mode: Rounding) -> BigDecimal {
    let (int, scale) = n.as_bigint_and_exponent();
    if scale <= places {
        return n.clone();
    }
    let Ok(shift) = u32::try_from(scale - places) else {
        return BigDecimal::new(BigInt::zero(), places);
    };
    let divisor = BigInt::from(10u8).pow(shift);
    let quotient = &int / &divisor;
    let remainder = &int % &divisor;
    let away = match mode {
        Rounding::Down => false,
        Rounding::Floor => remainder.is_negative(),
        Rounding::Ceiling => remainder.is_positive(),
        Rounding::HalfUp => remainder.abs() * 2u8 >= divisor,
        Rounding::HalfEven => {
            let twice = remainder.abs() * 2u8;
            twice > divisor || (twice == divisor && !(&quotient % 2u8).is_zero())
        }
    };
    let quotient = match (away, remainder.is_negative()) {
        (false, _) => quotient,
        (true, true) => quotient - 1u8,
        (true, false) => quotient + 1u8,
    };
    BigDecimal::new(quotient, places)
}

pub fn trunc(n: &BigDecimal) -> BigDecimal {
    round(n, 0, Rounding::Down)
}

pub fn floor(n: &BigDecimal) -> BigDecimal {
    round(n, 0, Rounding::Floor)
}

pub fn ceil(n: &BigDecimal) -> BigDecimal {
    round(n, 0, Rounding::Ceiling)
}

pub fn is_integer(n: &BigDecimal) -> bool {
    trunc(n) == *n
}

/// The integer part as an i64, if it fits.
pub fn to_i64(n: &BigDecimal) -> Option<i64> {
    trunc(n).to_i64()
}

/// The integer part as a big integer.
pub fn to_bigint(n: &BigDecimal) -> BigInt {
    let (int, scale) = trunc(n).as_bigint_and_exponent();
    match u32::try_from(-scale) {
        Ok(zeros) if zeros > 0 => int * BigInt::from(10u8).pow(zeros),
        _ => int,
    }
}

// ============================================================================
// CONVERSION
// ============================================================================

/// Parses decimal or scientific text; out-of-window values are rejected.
pub fn parse(text: &str) -> Option<BigDecimal> {
    let n = BigDecimal::from_str(text.trim()).ok()?;
    in_range(&n).then_some(n)
}

pub fn to_f64(n: &BigDecimal) -> Option<f64> {
    to_plain(n).parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Shortest decimal text that reads back as the same float.
pub fn from_f64(x: f64) -> Option<BigDecimal> {
    if !x.is_finite() {
        return None;
    }
    fit(BigDecimal::from_str(&x.to_string()).ok()?)
}

/// Places the decimal point into a digit string that carries `scale` fraction digits.
fn place_point(mut digits: String, scale: i64) -> String {
    if scale <= 0 {
        digits.extend(std::iter::repeat('0').take(scale.unsigned_abs() as usize));
        return digits;
    }
    let scale = scale as usize;
    if digits.len() > scale {
        digits.insert(digits.len() - scale, '.');
        digits
    } else {
        format!("0.{}{}", "0".repeat(scale - digits.len()), digits)
    }
}

/// Plain positional text without exponent or trailing fraction zeros.
pub fn to_plain(n: &BigDecimal) -> String {
    let (int, mut scale) = n.as_bigint_and_exponent();
    if int.is_zero() {
        return "0".to_string();
    }
    let mut digits = int.magnitude().to_string();
    while scale > 0 && digits.ends_with('0') {
        digits.pop();
        scale -= 1;
    }
    let body = place_point(digits, scale);
    if int.is_negative() {
        format!("-{}", body)
    } else {
        body
    }
}

/// Rounds half away from zero and prints exactly `places` fraction digits.
pub fn to_fixed(n: &BigDecimal, places: usize) -> String {
    let places = places as i64;
    let (int, scale) = round(n, places, Rounding::HalfUp).as_bigint_and_exponent();
    let mut digits = int.magnitude().to_string();
    digits.extend(std::iter::repeat('0').take((places - scale).max(0) as usize));
    let body = place_point(digits, places);
    if int.is_negative() {
        format!("-{}", body)
    } else {
        body
    }
}
