//! FILENAME: core/engine/src/datetime.rs
//! PURPOSE: Calendar-aware datetime and interval values and their arithmetic.
//! CONTEXT: Datetime values carry a calendar date and/or a time of day plus an
//! optional UTC offset. Intervals are signed component bags (years, months,
//! days, hours, minutes, seconds) rather than fixed durations, so adding one
//! month to January 31 lands on the last day of February.
//!
//! ARITHMETIC:
//! - datetime +/- interval: months first (clamped to month end), then days, then time
//! - datetime +/- n: n days (seconds for time-only values)
//! - datetime - datetime: componentwise interval with borrowing, sign-correct
//! - interval +/- interval: componentwise
//!
//! A month shift remembers the day-of-month it had to clamp away from, so
//! (Jan 31 + 1 month) + 1 month is Mar 31, the same as Jan 31 + 2 months.

use chrono::format::{Item, StrftimeItems};
use chrono::{
    Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};
use bigdecimal::BigDecimal;
use num_traits::Zero;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::number::{self, Rounding};

const SECONDS_PER_DAY: i64 = 86_400;

// ============================================================================
// CALENDAR HELPERS
// ============================================================================

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Number of days in the given month (1-based), leap-year aware.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

// ============================================================================
// INTERVAL
// ============================================================================

/// A signed calendar interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub years: i32,
    pub months: i32,
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
}

static INTERVAL_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-]?\d+)\s*([A-Za-z]+)").expect("interval pattern"));

impl Interval {
    pub fn new(years: i32, months: i32, days: i32, hours: i32, minutes: i32, seconds: i32) -> Self {
        Interval {
            years,
            months,
            days,
            hours,
            minutes,
            seconds,
        }
    }

    pub fn days(days: i32) -> Self {
        Interval {
            days,
            ..Default::default()
        }
    }

    pub fn months(months: i32) -> Self {
        Interval {
            months,
            ..Default::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Interval::default()
    }

    pub fn negated(&self) -> Self {
        Interval {
            years: -self.years,
            months: -self.months,
            days: -self.days,
            hours: -self.hours,
            minutes: -self.minutes,
            seconds: -self.seconds,
        }
    }

    /// Componentwise sum.
    pub fn plus(&self, other: &Interval) -> Self {
        Interval {
            years: self.years.saturating_add(other.years),
            months: self.months.saturating_add(other.months),
            days: self.days.saturating_add(other.days),
            hours: self.hours.saturating_add(other.hours),
            minutes: self.minutes.saturating_add(other.minutes),
            seconds: self.seconds.saturating_add(other.seconds),
        }
    }

    pub fn minus(&self, other: &Interval) -> Self {
        self.plus(&other.negated())
    }

    /// Parses text like `1 year 2 months`, `3d 4h` or `-90 mins`.
    pub fn parse(text: &str) -> Option<Interval> {
        let mut result = Interval::default();
        let mut last_end = 0;
        let mut matched_any = false;

        for caps in INTERVAL_PART.captures_iter(text) {
            let whole = caps.get(0)?;
            if !text[last_end..whole.start()].trim().is_empty() {
                return None;
            }
            last_end = whole.end();
            matched_any = true;

            let amount: i32 = caps.get(1)?.as_str().parse().ok()?;
            let unit = caps.get(2)?.as_str().to_lowercase();
            let slot = match unit.as_str() {
                "y" | "yr" | "yrs" | "year" | "years" => &mut result.years,
                "mo" | "mon" | "mons" | "month" | "months" => &mut result.months,
                "d" | "day" | "days" => &mut result.days,
                "h" | "hr" | "hrs" | "hour" | "hours" => &mut result.hours,
                "m" | "min" | "mins" | "minute" | "minutes" => &mut result.minutes,
                "s" | "sec" | "secs" | "second" | "seconds" => &mut result.seconds,
                _ => return None,
            };
            *slot = slot.saturating_add(amount);
        }

        if !matched_any || !text[last_end..].trim().is_empty() {
            return None;
        }
        Some(result)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [
            (self.years, "year"),
            (self.months, "month"),
            (self.days, "day"),
            (self.hours, "hour"),
            (self.minutes, "minute"),
            (self.seconds, "second"),
        ];
        let mut first = true;
        for (amount, unit) in parts {
            if amount == 0 {
                continue;
            }
            if !first {
                write!(f, " ")?;
            }
            first = false;
            let plural = if amount.abs() == 1 { "" } else { "s" };
            write!(f, "{} {}{}", amount, unit, plural)?;
        }
        if first {
            write!(f, "0 seconds")?;
        }
        Ok(())
    }
}

// ============================================================================
// DATETIME
// ============================================================================

/// A calendar date and/or time of day, optionally with a UTC offset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Datetime {
    pub value: NaiveDateTime,
    /// Offset east of UTC in seconds.
    pub offset_seconds: Option<i32>,
    pub has_date: bool,
    pub has_time: bool,
    /// Day-of-month lost to month-end clamping, 0 if none.
    #[serde(default)]
    day_carry: u32,
}

static DATETIME_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^\s*
        (?:(?P<iso>\d{4})-(?P<isom>\d{1,2})-(?P<isod>\d{1,2})
          |(?P<eud>\d{1,2})/(?P<eum>\d{1,2})/(?P<euy>\d{4}))?
        (?:(?:\s+|T)?(?P<h>\d{1,2}):(?P<mi>\d{2})(?::(?P<s>\d{2}))?)?
        \s*(?P<zone>Z|[+-]\d{2}(?::?\d{2})?)?
        \s*$",
    )
    .expect("datetime pattern")
});

impl Default for Datetime {
    fn default() -> Self {
        Datetime {
            value: NaiveDateTime::default(),
            offset_seconds: None,
            has_date: true,
            has_time: false,
            day_carry: 0,
        }
    }
}

impl Datetime {
    fn build(value: NaiveDateTime, has_date: bool, has_time: bool) -> Self {
        Datetime {
            value,
            offset_seconds: None,
            has_date,
            has_time,
            day_carry: 0,
        }
    }

    /// A date without time of day.
    pub fn date(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self::build(date.and_time(NaiveTime::MIN), true, false))
    }

    /// A time of day without date.
    pub fn time(hour: u32, minute: u32, second: u32) -> Option<Self> {
        let time = NaiveTime::from_hms_opt(hour, minute, second)?;
        Some(Self::build(NaiveDate::default().and_time(time), false, true))
    }

    pub fn datetime(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_opt(hour, minute, second)?;
        Some(Self::build(date.and_time(time), true, true))
    }

    pub fn with_offset(mut self, offset_seconds: i32) -> Self {
        self.offset_seconds = Some(offset_seconds);
        self
    }

    /// The current local date and time.
    pub fn now() -> Self {
        let now = Local::now();
        let offset = now.offset().local_minus_utc();
        let mut value = now.naive_local();
        value = value.with_nanosecond(0).unwrap_or(value);
        Self::build(value, true, true).with_offset(offset)
    }

    /// Parses `YYYY-MM-DD`, `DD/MM/YYYY`, `HH:MM[:SS]` and their combinations,
    /// joined by a space or `T`, with an optional `Z` or `+HH[:MM]` zone.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = DATETIME_TEXT.captures(text)?;
        let num = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());

        let date = if let Some(year) = caps.name("iso") {
            let year: i32 = year.as_str().parse().ok()?;
            Some(NaiveDate::from_ymd_opt(year, num("isom")?, num("isod")?)?)
        } else if let Some(year) = caps.name("euy") {
            let year: i32 = year.as_str().parse().ok()?;
            Some(NaiveDate::from_ymd_opt(year, num("eum")?, num("eud")?)?)
        } else {
            None
        };

        let time = match num("h") {
            Some(hour) => Some(NaiveTime::from_hms_opt(hour, num("mi")?, num("s").unwrap_or(0))?),
            None => None,
        };

        if date.is_none() && time.is_none() {
            return None;
        }

        let mut result = Self::build(
            date.unwrap_or_default().and_time(time.unwrap_or(NaiveTime::MIN)),
            date.is_some(),
            time.is_some(),
        );

        if let Some(zone) = caps.name("zone") {
            result.offset_seconds = Some(parse_zone(zone.as_str())?);
        }
        Some(result)
    }

    pub fn year(&self) -> i32 {
        self.value.year()
    }

    pub fn month(&self) -> u32 {
        self.value.month()
    }

    pub fn day(&self) -> u32 {
        self.value.day()
    }

    /// Seconds since midnight.
    pub fn seconds_of_day(&self) -> u32 {
        self.value.num_seconds_from_midnight()
    }

    /// Today's date without time of day.
    pub fn today() -> Self {
        Self::build(Local::now().date_naive().and_time(NaiveTime::MIN), true, false)
    }

    /// The date part only.
    pub fn date_part(&self) -> Self {
        Datetime {
            value: self.value.date().and_time(NaiveTime::MIN),
            has_time: false,
            day_carry: 0,
            ..*self
        }
    }

    /// The time part only.
    pub fn time_part(&self) -> Self {
        Datetime {
            value: NaiveDate::default().and_time(self.value.time()),
            has_date: false,
            day_carry: 0,
            ..*self
        }
    }

    /// This value with its date replaced by the date of `other`.
    pub fn with_date_of(&self, other: &Datetime) -> Self {
        Datetime {
            value: other.value.date().and_time(self.value.time()),
            has_date: other.has_date,
            day_carry: 0,
            ..*self
        }
    }

    /// This value with its time replaced by the time of `other`.
    pub fn with_time_of(&self, other: &Datetime) -> Self {
        Datetime {
            value: self.value.date().and_time(other.value.time()),
            has_time: other.has_time,
            day_carry: 0,
            ..*self
        }
    }

    /// Sets the time of day from seconds since midnight.
    pub fn with_seconds_of_day(&self, seconds: u32) -> Option<Self> {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)?;
        Some(Datetime {
            value: self.value.date().and_time(time),
            has_time: true,
            day_carry: 0,
            ..*self
        })
    }

    /// The instant on a common UTC timeline, used for ordering. None when the
    /// offset pushes the value past the representable range.
    fn utc_key(&self) -> Option<NaiveDateTime> {
        let offset = i64::from(self.offset_seconds.unwrap_or(0));
        self.value.checked_sub_signed(Duration::try_seconds(offset)?)
    }

    /// Moves the value by a whole number of days.
    pub fn add_days(&self, days: i64) -> Option<Self> {
        let value = self.value.checked_add_signed(Duration::try_days(days)?)?;
        Some(Datetime {
            value,
            day_carry: 0,
            ..*self
        })
    }

    pub fn add_seconds(&self, seconds: i64) -> Option<Self> {
        let value = self.value.checked_add_signed(Duration::try_seconds(seconds)?)?;
        Some(Datetime {
            value,
            day_carry: 0,
            ..*self
        })
    }

    /// Adds a (possibly fractional) number, interpreted as days for values with a date.
    pub fn add_number(&self, amount: &BigDecimal) -> Option<Self> {
        if !self.has_date {
            return self.add_seconds(number::to_i64(amount)?);
        }
        let whole_days = number::trunc(amount);
        let shifted = self.add_days(number::to_i64(&whole_days)?)?;
        let fraction = amount - &whole_days;
        if fraction.is_zero() || !self.has_time {
            return Some(shifted);
        }
        let seconds = number::round(&(fraction * BigDecimal::from(SECONDS_PER_DAY)), 0, Rounding::HalfUp);
        shifted.add_seconds(number::to_i64(&seconds)?)
    }

    /// Shifts by whole months, clamping to the last day of the target month.
    pub fn add_months(&self, months: i64) -> Option<Self> {
        let date = self.value.date();
        let wanted_day = if self.day_carry != 0 {
            self.day_carry
        } else {
            date.day()
        };

        let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + months;
        let year = i32::try_from(total.div_euclid(12)).ok()?;
        let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
        let day = wanted_day.min(days_in_month(year, month));

        let new_date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Datetime {
            value: new_date.and_time(self.value.time()),
            day_carry: if day < wanted_day { wanted_day } else { 0 },
            ..*self
        })
    }

    /// Applies an interval: months first, then days, then the time components.
    pub fn add_interval(&self, interval: &Interval) -> Option<Self> {
        let mut result = *self;
        let months = i64::from(interval.years) * 12 + i64::from(interval.months);
        if months != 0 {
            result = result.add_months(months)?;
        }
        if interval.days != 0 {
            result = result.add_days(i64::from(interval.days))?;
        }
        let seconds = i64::from(interval.hours) * 3600
            + i64::from(interval.minutes) * 60
            + i64::from(interval.seconds);
        if seconds != 0 {
            result = result.add_seconds(seconds)?;
            result.has_time = true;
        }
        Some(result)
    }

    pub fn sub_interval(&self, interval: &Interval) -> Option<Self> {
        self.add_interval(&interval.negated())
    }

    /// The calendar interval from `other` to `self`, negative if `self` is earlier.
    pub fn interval_since(&self, other: &Datetime) -> Option<Interval> {
        let later = self.utc_key()?;
        let earlier = other.utc_key()?;
        if later < earlier {
            return Some(calendar_difference(earlier, later).negated());
        }
        Some(calendar_difference(later, earlier))
    }

    /// Renders with strftime directives. Returns None for an invalid format.
    pub fn format(&self, fmt: &str) -> Option<String> {
        if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
            return None;
        }
        let offset = FixedOffset::east_opt(self.offset_seconds.unwrap_or(0))?;
        let zoned = offset.from_local_datetime(&self.value).single()?;
        Some(zoned.format(fmt).to_string())
    }
}

/// Componentwise difference of two instants, `later >= earlier`.
fn calendar_difference(later: NaiveDateTime, earlier: NaiveDateTime) -> Interval {
    let mut years = later.year() - earlier.year();
    let mut months = later.month() as i32 - earlier.month() as i32;
    let mut days = later.day() as i32 - earlier.day() as i32;
    let mut seconds =
        later.num_seconds_from_midnight() as i32 - earlier.num_seconds_from_midnight() as i32;

    if seconds < 0 {
        seconds += SECONDS_PER_DAY as i32;
        days -= 1;
    }
    if days < 0 {
        let (year, month) = if later.month() == 1 {
            (later.year() - 1, 12)
        } else {
            (later.year(), later.month() - 1)
        };
        days += days_in_month(year, month) as i32;
        months -= 1;
    }
    if months < 0 {
        months += 12;
        years -= 1;
    }

    Interval {
        years,
        months,
        days,
        hours: seconds / 3600,
        minutes: seconds % 3600 / 60,
        seconds: seconds % 60,
    }
}

fn parse_zone(zone: &str) -> Option<i32> {
    if zone == "Z" {
        return Some(0);
    }
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = match digits.get(2..4) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    Some(sign * (hours * 3600 + minutes * 60))
}

impl PartialEq for Datetime {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.offset_seconds == other.offset_seconds
            && self.has_date == other.has_date
            && self.has_time == other.has_time
    }
}

impl PartialOrd for Datetime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.utc_key()?.cmp(&other.utc_key()?))
    }
}

impl std::fmt::Display for Datetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.has_date, self.has_time) {
            (true, false) => write!(f, "{}", self.value.format("%Y-%m-%d"))?,
            (false, true) => write!(f, "{}", self.value.format("%H:%M:%S"))?,
            _ => write!(f, "{}", self.value.format("%Y-%m-%d %H:%M:%S"))?,
        }
        if let Some(offset) = self.offset_seconds {
            let sign = if offset < 0 { '-' } else { '+' };
            let abs = offset.abs();
            write!(f, "{}{:02}:{:02}", sign, abs / 3600, abs % 3600 / 60)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ResultValue;

    fn date(y: i32, m: u32, d: u32) -> Datetime {
        Datetime::date(y, m, d).unwrap()
    }

    #[test]
    fn adding_one_day_crosses_leap_day() {
        assert_eq!(date(1980, 2, 29).add_days(1).unwrap(), date(1980, 3, 1));
        assert_eq!(date(1979, 2, 28).add_days(1).unwrap(), date(1979, 3, 1));
        assert_eq!(date(1980, 2, 28).add_days(1).unwrap(), date(1980, 2, 29));
    }

    #[test]
    fn adding_month_clamps_to_month_end() {
        assert_eq!(date(1980, 1, 31).add_months(1).unwrap(), date(1980, 2, 29));
        assert_eq!(date(1981, 1, 31).add_months(1).unwrap(), date(1981, 2, 28));
        assert_eq!(date(1980, 3, 31).add_months(-1).unwrap(), date(1980, 2, 29));
    }

    #[test]
    fn month_shift_remembers_clamped_day() {
        let one = Interval::months(1);
        let twice = date(1980, 1, 31)
            .add_interval(&one)
            .unwrap()
            .add_interval(&one)
            .unwrap();
        let direct = date(1980, 1, 31).add_interval(&Interval::months(2)).unwrap();
        assert_eq!(twice, direct);
        assert_eq!(twice, date(1980, 3, 31));
    }

    #[test]
    fn difference_is_sign_correct() {
        let a = date(1980, 3, 1);
        let b = date(1980, 2, 29);
        assert_eq!(a.interval_since(&b), Some(Interval::days(1)));
        assert_eq!(b.interval_since(&a), Some(Interval::days(-1)));

        let c = Datetime::datetime(2021, 1, 15, 10, 0, 0).unwrap();
        let d = Datetime::datetime(2020, 12, 20, 12, 30, 0).unwrap();
        assert_eq!(c.interval_since(&d), Some(Interval::new(0, 0, 25, 21, 30, 0)));
    }

    #[test]
    fn parses_common_datetime_shapes() {
        assert_eq!(Datetime::parse("2021-03-04").unwrap(), date(2021, 3, 4));
        assert_eq!(Datetime::parse("04/03/2021").unwrap(), date(2021, 3, 4));

        let full = Datetime::parse("2021-03-04T10:20:30").unwrap();
        assert_eq!(full, Datetime::datetime(2021, 3, 4, 10, 20, 30).unwrap());

        let zoned = Datetime::parse("2021-03-04 10:20 +02:00").unwrap();
        assert_eq!(zoned.offset_seconds, Some(7200));

        let time = Datetime::parse("10:20").unwrap();
        assert!(time.has_time && !time.has_date);

        assert!(Datetime::parse("2021-02-30").is_none());
        assert!(Datetime::parse("yesterday").is_none());
    }

    #[test]
    fn parses_interval_units() {
        assert_eq!(
            Interval::parse("1 year 2 months 3 days").unwrap(),
            Interval::new(1, 2, 3, 0, 0, 0)
        );
        assert_eq!(Interval::parse("4h 5mins 6 s").unwrap(), Interval::new(0, 0, 0, 4, 5, 6));
        assert_eq!(Interval::parse("-2 mo").unwrap(), Interval::months(-2));
        assert!(Interval::parse("3 fortnights").is_none());
        assert!(Interval::parse("").is_none());
    }

    #[test]
    fn interval_display_parses_back() {
        let iv = Interval::new(1, 0, -3, 0, 15, 0);
        assert_eq!(iv.to_string(), "1 year -3 days 15 minutes");
        assert_eq!(Interval::parse(&iv.to_string()).unwrap(), iv);
    }

    #[test]
    fn ordering_respects_offsets() {
        let a = Datetime::datetime(2021, 1, 1, 12, 0, 0).unwrap().with_offset(3600);
        let b = Datetime::datetime(2021, 1, 1, 11, 30, 0).unwrap().with_offset(0);
        assert!(a < b);
    }

    #[test]
    fn offsets_at_the_calendar_limits_do_not_order() {
        let last = Datetime::build(NaiveDateTime::MAX, true, true).with_offset(-3600);
        let first = Datetime::build(NaiveDateTime::MIN, true, true).with_offset(3600);
        let plain = date(2021, 3, 4);
        assert_eq!(last.partial_cmp(&plain), None);
        assert_eq!(plain.partial_cmp(&first), None);
        assert_eq!(plain.partial_cmp(&plain), Some(std::cmp::Ordering::Equal));

        let lt = crate::FunctionRegistry::with_builtins().get("lt").unwrap();
        let args = [ResultValue::datetime(last), ResultValue::datetime(plain)];
        let out = lt.apply(&args).unwrap();
        assert!(out.is_error());
    }

    #[test]
    fn fractional_days_move_the_time() {
        let noon = Datetime::datetime(2021, 3, 4, 12, 0, 0).unwrap();
        let later = noon.add_number(&"1.25".parse::<BigDecimal>().unwrap()).unwrap();
        assert_eq!(later, Datetime::datetime(2021, 3, 5, 18, 0, 0).unwrap());
        let huge: BigDecimal = "1e30".parse().unwrap();
        assert_eq!(noon.add_number(&huge), None);
    }

    #[test]
    fn strftime_rendering_rejects_bad_format() {
        let d = date(2021, 3, 4);
        assert_eq!(d.format("%Y/%m/%d").unwrap(), "2021/03/04");
        assert!(d.format("%Q").is_none());
    }
}
