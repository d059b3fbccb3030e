//! FILENAME: core/engine/src/functions/datetime.rs
//! PURPOSE: Datetime construction, field access and week-number built-ins.

use num_traits::ToPrimitive;

use super::{invalid, numbers, Arity, FunctionDef, FunctionRegistry};
use crate::datetime::{days_in_month, Datetime, Interval};
use crate::number;
use crate::value::{Data, ResultValue, ValueKind};

pub(super) fn register(registry: &mut FunctionRegistry) {
    let defs = [
        FunctionDef::pure("date", Arity::Exact(0), |_| ResultValue::datetime(Datetime::today()))
            .dont_optimize(),
        FunctionDef::pure("now", Arity::Exact(0), |_| ResultValue::datetime(Datetime::now()))
            .dont_optimize(),
        FunctionDef::pure("year", Arity::Exact(1), fn_year).handles_nulls(),
        FunctionDef::pure("month", Arity::Exact(1), fn_month).handles_nulls(),
        FunctionDef::pure("day", Arity::Exact(1), fn_day).handles_nulls(),
        FunctionDef::pure("dim", Arity::Exact(1), fn_dim).handles_nulls(),
        FunctionDef::pure("dateof", Arity::Exact(1), fn_dateof),
        FunctionDef::pure("timeof", Arity::Exact(1), fn_timeof),
        FunctionDef::pure("chgdateof", Arity::Exact(2), fn_chgdateof),
        FunctionDef::pure("chgtimeof", Arity::Exact(2), fn_chgtimeof),
        FunctionDef::pure("gettimeinsecs", Arity::Exact(1), fn_gettimeinsecs).handles_nulls(),
        FunctionDef::pure("settimeinsecs", Arity::Exact(2), fn_settimeinsecs),
        FunctionDef::pure("interval", Arity::Range(1, 6), fn_interval),
        FunctionDef::pure("wiy", Arity::Exact(1), |a| week_number(a, "%U")).handles_nulls(),
        FunctionDef::pure("wiy1", Arity::Exact(1), |a| week_number(a, "%W")).handles_nulls(),
        FunctionDef::pure("stdwiy", Arity::Exact(1), |a| week_number(a, "%V")).handles_nulls(),
        FunctionDef::pure("wiyo", Arity::Exact(2), fn_wiyo).handles_nulls(),
    ];
    for def in defs {
        registry.register(def);
    }
}

/// The datetime operand with a date part, Ok(None) for a null or date-less
/// value, Err for anything that is not a datetime.
fn dated(arg: &ResultValue) -> Result<Option<&Datetime>, ResultValue> {
    match &arg.data {
        Data::Datetime(dt) if arg.is_null() || !dt.has_date => Ok(None),
        Data::Datetime(dt) => Ok(Some(dt)),
        _ => Err(invalid()),
    }
}

fn date_field(args: &[ResultValue], field: fn(&Datetime) -> i64) -> ResultValue {
    match dated(&args[0]) {
        Ok(Some(dt)) => ResultValue::from_i64(field(dt)),
        Ok(None) => ResultValue::null(ValueKind::Number),
        Err(e) => e,
    }
}

fn fn_year(args: &[ResultValue]) -> ResultValue {
    date_field(args, |dt| i64::from(dt.year()))
}

fn fn_month(args: &[ResultValue]) -> ResultValue {
    date_field(args, |dt| i64::from(dt.month()))
}

fn fn_day(args: &[ResultValue]) -> ResultValue {
    date_field(args, |dt| i64::from(dt.day()))
}

/// Days in the month of the operand's date.
fn fn_dim(args: &[ResultValue]) -> ResultValue {
    date_field(args, |dt| i64::from(days_in_month(dt.year(), dt.month())))
}

fn fn_dateof(args: &[ResultValue]) -> ResultValue {
    args[0].as_datetime().map_or_else(invalid, |dt| ResultValue::datetime(dt.date_part()))
}

fn fn_timeof(args: &[ResultValue]) -> ResultValue {
    args[0].as_datetime().map_or_else(invalid, |dt| ResultValue::datetime(dt.time_part()))
}

/// `chgdateof(value, source)`: `value` with the date of `source`.
fn fn_chgdateof(args: &[ResultValue]) -> ResultValue {
    match (args[0].as_datetime(), args[1].as_datetime()) {
        (Some(dt), Some(src)) => ResultValue::datetime(dt.with_date_of(src)),
        _ => invalid(),
    }
}

/// `chgtimeof(value, source)`: `value` with the time of `source`.
fn fn_chgtimeof(args: &[ResultValue]) -> ResultValue {
    match (args[0].as_datetime(), args[1].as_datetime()) {
        (Some(dt), Some(src)) => ResultValue::datetime(dt.with_time_of(src)),
        _ => invalid(),
    }
}

fn fn_gettimeinsecs(args: &[ResultValue]) -> ResultValue {
    match &args[0].data {
        Data::Datetime(dt) if !args[0].is_null() && dt.has_time => {
            ResultValue::from_i64(i64::from(dt.seconds_of_day()))
        }
        Data::Datetime(_) => ResultValue::null(ValueKind::Number),
        _ => invalid(),
    }
}

fn fn_settimeinsecs(args: &[ResultValue]) -> ResultValue {
    let (Some(dt), Some(secs)) = (args[0].as_datetime(), args[1].as_number()) else {
        return invalid();
    };
    match number::trunc(secs).to_u32().filter(|s| *s < 86_400) {
        Some(secs) => dt.with_seconds_of_day(secs).map_or_else(invalid, ResultValue::datetime),
        None => invalid(),
    }
}

/// `interval('1 year 2 months')` or `interval(years, months, days, hours, minutes, seconds)`
/// with trailing components optional.
fn fn_interval(args: &[ResultValue]) -> ResultValue {
    if let [single] = args {
        match &single.data {
            Data::String(s) => return Interval::parse(s).map_or_else(invalid, ResultValue::interval),
            Data::Interval(_) => return single.clone(),
            _ => {}
        }
    }
    let Some(parts) = numbers(args) else {
        return invalid();
    };
    let mut fields = [0i32; 6];
    for (slot, n) in fields.iter_mut().zip(parts) {
        match number::trunc(n).to_i32() {
            Some(v) => *slot = v,
            None => return invalid(),
        }
    }
    let [years, months, days, hours, minutes, seconds] = fields;
    ResultValue::interval(Interval::new(years, months, days, hours, minutes, seconds))
}

fn week_of(dt: &Datetime, directive: &str) -> Option<i64> {
    dt.value.format(directive).to_string().parse().ok()
}

/// Week of the year by a strftime week directive.
fn week_number(args: &[ResultValue], directive: &str) -> ResultValue {
    match dated(&args[0]) {
        Ok(Some(dt)) => week_of(dt, directive).map_or_else(invalid, ResultValue::from_i64),
        Ok(None) => ResultValue::null(ValueKind::Number),
        Err(e) => e,
    }
}

/// Sunday-based week of the year with the week start shifted by `offset` days.
fn fn_wiyo(args: &[ResultValue]) -> ResultValue {
    if !matches!(args[1].data, Data::Number(_)) {
        return invalid();
    }
    let dt = match dated(&args[0]) {
        Ok(Some(dt)) => dt,
        Ok(None) => return ResultValue::null(ValueKind::Number),
        Err(e) => return e,
    };
    let Some(offset) = args[1].as_number().and_then(number::to_i64) else {
        return ResultValue::null(ValueKind::Number);
    };
    let offset = offset.rem_euclid(7);

    let (Some(week), Some(shifted)) = (week_of(dt, "%U"), dt.date_part().add_days(-offset)) else {
        return invalid();
    };
    let Some(shifted_week) = week_of(&shifted, "%U") else {
        return invalid();
    };
    // Shifting back across the new year restarts the count.
    let result = if shifted_week > week { 0 } else { shifted_week };
    ResultValue::from_i64(result)
}
