//! FILENAME: core/engine/src/functions/string.rs
//! PURPOSE: String, conversion and formatting built-ins.
//! CONTEXT: Lengths and offsets count Unicode code points, never bytes.
//! No message catalog is loaded, so `translate` returns its text unchanged and
//! `translate2` picks the singular or plural text the way an untranslated
//! ngettext lookup does.

use bigdecimal::BigDecimal;
use num_traits::{Signed, ToPrimitive};

use super::{invalid, Arity, FunctionDef, FunctionRegistry};
use crate::datetime::Datetime;
use crate::format;
use crate::number;
use crate::value::{Data, ResultValue, ValueKind};

pub(super) fn register(registry: &mut FunctionRegistry) {
    let defs = [
        FunctionDef::pure("concat", Arity::Variadic { min: 1 }, fn_concat).handles_nulls(),
        FunctionDef::pure("left", Arity::Exact(2), fn_left),
        FunctionDef::pure("right", Arity::Exact(2), fn_right),
        FunctionDef::pure("mid", Arity::Range(2, 3), fn_mid),
        FunctionDef::pure("upper", Arity::Exact(1), fn_upper),
        FunctionDef::pure("lower", Arity::Exact(1), fn_lower),
        FunctionDef::pure("proper", Arity::Exact(1), fn_proper),
        FunctionDef::pure("strlen", Arity::Exact(1), fn_strlen),
        FunctionDef::pure("str", Arity::Exact(3), fn_str),
        FunctionDef::pure("val", Arity::Exact(1), fn_val).handles_nulls(),
        FunctionDef::pure("fxpval", Arity::Exact(2), fn_fxpval),
        FunctionDef::pure("stod", Arity::Exact(1), fn_stodt).handles_nulls(),
        FunctionDef::pure("stodt", Arity::Exact(1), fn_stodt).handles_nulls(),
        FunctionDef::pure("stodtsql", Arity::Exact(1), fn_stodt).handles_nulls(),
        FunctionDef::pure("tstod", Arity::Exact(1), fn_stodt).handles_nulls(),
        FunctionDef::pure("translate", Arity::Exact(1), fn_translate).handles_nulls(),
        FunctionDef::pure("translate2", Arity::Exact(3), fn_translate2).handles_nulls(),
        FunctionDef::pure("dtos", Arity::Exact(1), fn_dtos).handles_nulls(),
        FunctionDef::pure("dtosf", Arity::Exact(2), fn_dtosf).handles_nulls(),
        FunctionDef::pure("format", Arity::Exact(2), fn_format).handles_nulls(),
        FunctionDef::pure("printf", Arity::Variadic { min: 1 }, fn_printf).handles_nulls(),
    ];
    for def in defs {
        registry.register(def);
    }
}

fn string_and_count(args: &[ResultValue]) -> Option<(&str, usize)> {
    let s = args.first()?.as_str()?;
    let n = args.get(1)?.as_number()?;
    if n.is_negative() {
        return Some((s, 0));
    }
    Some((s, number::trunc(n).to_usize()?))
}

/// Concatenates strings; null operands are skipped.
fn fn_concat(args: &[ResultValue]) -> ResultValue {
    let mut out = String::new();
    for arg in args {
        match &arg.data {
            Data::String(s) => {
                if !arg.is_null() {
                    out.push_str(s);
                }
            }
            _ => return invalid(),
        }
    }
    ResultValue::string(out)
}

fn fn_left(args: &[ResultValue]) -> ResultValue {
    match string_and_count(args) {
        Some((s, n)) => ResultValue::string(s.chars().take(n).collect::<String>()),
        None => invalid(),
    }
}

fn fn_right(args: &[ResultValue]) -> ResultValue {
    match string_and_count(args) {
        Some((s, n)) => {
            let len = s.chars().count();
            ResultValue::string(s.chars().skip(len.saturating_sub(n)).collect::<String>())
        }
        None => invalid(),
    }
}

/// `mid(s, start[, len])` with a 1-based start; 0 acts as 1, negative counts from the end.
fn fn_mid(args: &[ResultValue]) -> ResultValue {
    let (Some(s), Some(start)) = (args[0].as_str(), args[1].as_number().and_then(number::to_i64))
    else {
        return invalid();
    };
    let len = s.chars().count();
    let skip = match start {
        0 => 0,
        n if n > 0 => usize::try_from(n - 1).unwrap_or(usize::MAX),
        n => len.saturating_sub(usize::try_from(-n).unwrap_or(usize::MAX)),
    };
    let take = match args.get(2) {
        Some(count) => match count.as_number().and_then(number::to_i64) {
            Some(n) if n >= 0 => usize::try_from(n).unwrap_or(usize::MAX),
            Some(_) => 0,
            None => return invalid(),
        },
        None => usize::MAX,
    };
    ResultValue::string(s.chars().skip(skip).take(take).collect::<String>())
}

fn fn_upper(args: &[ResultValue]) -> ResultValue {
    args[0].as_str().map_or_else(invalid, |s| ResultValue::string(s.to_uppercase()))
}

fn fn_lower(args: &[ResultValue]) -> ResultValue {
    args[0].as_str().map_or_else(invalid, |s| ResultValue::string(s.to_lowercase()))
}

/// First character upper case, the rest lower case.
fn fn_proper(args: &[ResultValue]) -> ResultValue {
    let Some(s) = args[0].as_str() else {
        return invalid();
    };
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    ResultValue::string(out)
}

fn fn_strlen(args: &[ResultValue]) -> ResultValue {
    args[0]
        .as_str()
        .map_or_else(invalid, |s| ResultValue::from_i64(s.chars().count() as i64))
}

/// `str(number, width, decimals)`
fn fn_str(args: &[ResultValue]) -> ResultValue {
    let n = args[0].as_number();
    let width = args[1].as_number().and_then(|w| w.to_usize());
    let places = args[2].as_number().and_then(|p| p.to_usize());
    match (n, width, places) {
        (Some(n), Some(width), Some(places)) => format::fixed_width(n, width, places)
            .map_or_else(|| ResultValue::error("format error"), ResultValue::string),
        _ => invalid(),
    }
}

fn fn_val(args: &[ResultValue]) -> ResultValue {
    let arg = &args[0];
    match &arg.data {
        Data::Number(_) => arg.clone(),
        Data::String(_) if arg.is_null() => ResultValue::null(ValueKind::Number),
        Data::String(s) => number::parse(s).map_or_else(invalid, ResultValue::number),
        _ => invalid(),
    }
}

/// `fxpval(value, places)`: a fixed-point integer (number or text) scaled down
/// by `places` decimal digits, e.g. fxpval('123456', 2) is 1234.56.
fn fn_fxpval(args: &[ResultValue]) -> ResultValue {
    let value = match &args[0].data {
        Data::Number(n) => n.clone(),
        Data::String(s) => match number::parse(s) {
            Some(n) => n,
            None => return invalid(),
        },
        _ => return invalid(),
    };
    let Some(places) = args[1].as_number().and_then(number::to_i64) else {
        return invalid();
    };
    let scale = number::powi(&BigDecimal::from(10), places);
    match scale.and_then(|scale| number::div(&value, &scale)) {
        Some(n) => ResultValue::number(n),
        None => ResultValue::error("numeric overflow"),
    }
}

fn fn_translate(args: &[ResultValue]) -> ResultValue {
    args[0].as_str().map_or_else(invalid, ResultValue::string)
}

/// `translate2(singular, plural, count)`
fn fn_translate2(args: &[ResultValue]) -> ResultValue {
    let (Some(singular), Some(plural), Some(count)) =
        (args[0].as_str(), args[1].as_str(), args[2].as_number())
    else {
        return invalid();
    };
    let one = number::to_i64(count) == Some(1);
    ResultValue::string(if one { singular } else { plural })
}

fn fn_stodt(args: &[ResultValue]) -> ResultValue {
    let arg = &args[0];
    match &arg.data {
        Data::Datetime(_) => arg.clone(),
        Data::String(_) if arg.is_null() => ResultValue::null(ValueKind::Datetime),
        Data::String(s) => Datetime::parse(s).map_or_else(invalid, ResultValue::datetime),
        _ => invalid(),
    }
}

fn fn_dtos(args: &[ResultValue]) -> ResultValue {
    let arg = &args[0];
    match &arg.data {
        Data::Datetime(dt) if !arg.is_null() && dt.has_date => {
            ResultValue::string(dt.value.format("%Y-%m-%d").to_string())
        }
        Data::Datetime(_) => ResultValue::null(ValueKind::String),
        _ => invalid(),
    }
}

fn fn_dtosf(args: &[ResultValue]) -> ResultValue {
    match (&args[0].data, &args[1].data) {
        (Data::Datetime(dt), Data::String(fmt)) => {
            if args[0].is_null() || args[1].is_null() {
                return ResultValue::null(ValueKind::String);
            }
            dt.format(fmt)
                .map_or_else(|| ResultValue::error("format error"), ResultValue::string)
        }
        _ => invalid(),
    }
}

/// `format(value, fmt)`
fn fn_format(args: &[ResultValue]) -> ResultValue {
    match &args[1].data {
        Data::String(fmt) => format::format_value(&args[0], if args[1].is_null() { "" } else { fmt }),
        _ => invalid(),
    }
}

/// `printf(fmt, values...)`
fn fn_printf(args: &[ResultValue]) -> ResultValue {
    match args[0].as_str() {
        Some(fmt) => format::printf(fmt, &args[1..]),
        None if args[0].is_error() => args[0].clone(),
        None => invalid(),
    }
}
