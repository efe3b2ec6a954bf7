//! Five-field schedule expressions: parsing, formatting and description.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ParseError;

/// Number of fields in a schedule expression.
pub const FIELD_COUNT: usize = 5;

const WILDCARD: &str = "*";

/// Weekday names indexed by field value. 0 and 7 both mean Sunday.
const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// A minute / hour / day-of-month / month / day-of-week schedule.
///
/// Fields are kept verbatim as opaque tokens (`*`, `*/N`, `a-b`, lists,
/// literals); they are not validated or expanded. Equality is field-by-field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleExpression {
    minute: String,
    hour: String,
    day_of_month: String,
    month: String,
    day_of_week: String,
}

impl ScheduleExpression {
    /// Parse a bare expression. Exactly five whitespace-separated fields are
    /// accepted; trailing tokens are rejected.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        match fields.as_slice() {
            [minute, hour, day_of_month, month, day_of_week] => Ok(Self {
                minute: minute.to_string(),
                hour: hour.to_string(),
                day_of_month: day_of_month.to_string(),
                month: month.to_string(),
                day_of_week: day_of_week.to_string(),
            }),
            _ => Err(ParseError::InvalidFormat(format!(
                "expected {FIELD_COUNT} fields, found {}",
                fields.len()
            ))),
        }
    }

    pub fn minute(&self) -> &str {
        &self.minute
    }

    pub fn hour(&self) -> &str {
        &self.hour
    }

    pub fn day_of_month(&self) -> &str {
        &self.day_of_month
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn day_of_week(&self) -> &str {
        &self.day_of_week
    }

    /// Short English description, e.g. "Every day at 09:00".
    ///
    /// Falls back to the formatted expression when no rule matches.
    pub fn humanize(&self) -> String {
        let every_day = is_wildcard(&self.day_of_month)
            && is_wildcard(&self.month)
            && is_wildcard(&self.day_of_week);

        if every_day && is_wildcard(&self.minute) && is_wildcard(&self.hour) {
            return "Every minute".to_string();
        }

        if every_day && is_wildcard(&self.hour) {
            if let Some(step) = minute_step(&self.minute) {
                return format!("Every {step} minutes");
            }
            if !is_wildcard(&self.minute) {
                return "Every hour".to_string();
            }
        }

        if let (Some(minute), Some(hour)) = (literal(&self.minute), literal(&self.hour)) {
            let time = format!("{hour:02}:{minute:02}");

            if !is_wildcard(&self.day_of_month)
                && is_wildcard(&self.month)
                && is_wildcard(&self.day_of_week)
            {
                return format!("Day {} at {time}", self.day_of_month);
            }
            if !is_wildcard(&self.day_of_week)
                && is_wildcard(&self.day_of_month)
                && is_wildcard(&self.month)
            {
                return format!("{} at {time}", describe_weekday(&self.day_of_week));
            }
            if every_day {
                return format!("Every day at {time}");
            }
        }

        self.to_string()
    }

    /// Next time this schedule fires strictly after `after`, in UTC.
    ///
    /// Only schedules with a literal minute and hour are supported. The
    /// day-of-month, month and day-of-week fields are ignored, so the result is
    /// wrong for any expression that constrains them; callers must only treat
    /// it as exact for "every day at HH:MM" schedules. Returns `None` when the
    /// minute or hour is not a literal time.
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let minute = literal(&self.minute)?;
        let hour = literal(&self.hour)?;
        let candidate = after.date_naive().and_hms_opt(hour, minute, 0)?.and_utc();
        if candidate > after {
            Some(candidate)
        } else {
            Some(candidate + TimeDelta::days(1))
        }
    }
}

impl fmt::Display for ScheduleExpression {
    /// Fields joined by single spaces. Original spacing is not preserved.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

impl FromStr for ScheduleExpression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_wildcard(field: &str) -> bool {
    field == WILDCARD
}

/// A plain non-negative integer field.
fn literal(field: &str) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// `N` from a `*/N` field.
fn minute_step(field: &str) -> Option<&str> {
    field
        .strip_prefix("*/")
        .filter(|step| literal(step).is_some())
}

fn weekday_name(field: &str) -> Option<&'static str> {
    let index = usize::try_from(literal(field)?).ok()?;
    WEEKDAY_NAMES.get(index).copied()
}

/// A single weekday or a `a-b` weekday range by name; anything else verbatim.
fn describe_weekday(field: &str) -> String {
    if let Some(name) = weekday_name(field) {
        return name.to_string();
    }
    if let Some((start, end)) = field.split_once('-') {
        if let (Some(start), Some(end)) = (weekday_name(start), weekday_name(end)) {
            return format!("{start}-{end}");
        }
    }
    field.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn humanize(raw: &str) -> String {
        ScheduleExpression::parse(raw).unwrap().humanize()
    }

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let expr = ScheduleExpression::parse("  */5\t9  1-15 * 1,3 ").unwrap();
        assert_eq!(expr.minute(), "*/5");
        assert_eq!(expr.hour(), "9");
        assert_eq!(expr.day_of_month(), "1-15");
        assert_eq!(expr.month(), "*");
        assert_eq!(expr.day_of_week(), "1,3");
        assert_eq!(expr.to_string(), "*/5 9 1-15 * 1,3");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ScheduleExpression::parse(""), Err(ParseError::EmptyInput));
        assert_eq!(ScheduleExpression::parse("   \t"), Err(ParseError::EmptyInput));
        assert!(matches!(
            ScheduleExpression::parse("0 9 * *"),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            ScheduleExpression::parse("0 9 * * * /bin/true"),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_format_is_stable_under_reparse() {
        for raw in [
            "0 9 * * *",
            "*/15   *  * * *",
            "\t30 4 1,15 * 1-5",
            "5 0 * 8 *",
            "0 22 * * 1-5 ",
        ] {
            let parsed: ScheduleExpression = raw.parse().unwrap();
            let reparsed = ScheduleExpression::parse(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "{raw}");
        }
    }

    #[test]
    fn test_humanize_rules() {
        assert_eq!(humanize("* * * * *"), "Every minute");
        assert_eq!(humanize("*/5 * * * *"), "Every 5 minutes");
        assert_eq!(humanize("0 * * * *"), "Every hour");
        assert_eq!(humanize("0,30 * * * *"), "Every hour");
        assert_eq!(humanize("15-45 * * * *"), "Every hour");
        assert_eq!(humanize("0 9 * * *"), "Every day at 09:00");
        assert_eq!(humanize("0 9 15 * *"), "Day 15 at 09:00");
        assert_eq!(humanize("0 9 * * 1"), "Mon at 09:00");
        assert_eq!(humanize("50 8 * * 1-7"), "Mon-Sun at 08:50");
    }

    #[test]
    fn test_humanize_weekdays() {
        assert_eq!(humanize("0 9 * * 0"), "Sun at 09:00");
        assert_eq!(humanize("0 9 * * 7"), "Sun at 09:00");
        assert_eq!(humanize("0 9 * * 1-5"), "Mon-Fri at 09:00");
        assert_eq!(humanize("0 9 * * 1,3,5"), "1,3,5 at 09:00");
        assert_eq!(humanize("0 9 * * */2"), "*/2 at 09:00");
        assert_eq!(humanize("0 9 * * 8"), "8 at 09:00");
        assert_eq!(humanize("0 9 * * MON"), "MON at 09:00");
    }

    #[test]
    fn test_humanize_fallback() {
        assert_eq!(humanize("0 9 1 6 *"), "0 9 1 6 *");
        assert_eq!(humanize("*/10 9 * * *"), "*/10 9 * * *");
        assert_eq!(humanize("* 9 * * *"), "* 9 * * *");
        assert_eq!(humanize("*/5 * * * 1"), "*/5 * * * 1");
    }

    #[test]
    fn test_next_run_same_day() {
        let expr = ScheduleExpression::parse("0 9 * * *").unwrap();
        assert_eq!(expr.next_run(utc(17, 8, 0)), Some(utc(17, 9, 0)));
    }

    #[test]
    fn test_next_run_rolls_to_next_day() {
        let expr = ScheduleExpression::parse("0 9 * * *").unwrap();
        assert_eq!(expr.next_run(utc(17, 10, 0)), Some(utc(18, 9, 0)));
        // Exactly at the scheduled time is not "after".
        assert_eq!(expr.next_run(utc(17, 9, 0)), Some(utc(18, 9, 0)));
    }

    #[test]
    fn test_next_run_month_boundary() {
        let expr = ScheduleExpression::parse("30 23 * * *").unwrap();
        let reference = Utc.with_ymd_and_hms(2026, 2, 28, 23, 45, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(expr.next_run(reference), Some(expected));
    }

    #[test]
    fn test_next_run_unsupported() {
        let reference = utc(17, 8, 0);
        for raw in ["* * * * *", "*/5 * * * *", "0 * * * *", "0 9-17 * * *", "0 25 * * *"] {
            let expr = ScheduleExpression::parse(raw).unwrap();
            assert_eq!(expr.next_run(reference), None, "{raw}");
        }
    }
}
