// ==============================================================================
// CRON SCHEDULES
// ==============================================================================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::error::SchedulerError;

/// How far ahead `next_after` searches; covers leap-day schedules.
const SEARCH_HORIZON_DAYS: i64 = 366 * 4 + 1;

/// A five-field cron expression (`minute hour day-of-month month day-of-week`),
/// evaluated in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        };

        let mut days_of_week = parse_field(day_of_week, 0, 7).map_err(&invalid)?;
        // 7 is another name for Sunday
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes: parse_field(minute, 0, 59).map_err(&invalid)?,
            hours: parse_field(hour, 0, 23).map_err(&invalid)?,
            days_of_month: parse_field(day_of_month, 1, 31).map_err(&invalid)?,
            months: parse_field(month, 1, 12).map_err(&invalid)?,
            days_of_week,
            day_of_month_restricted: !day_of_month.starts_with('*'),
            day_of_week_restricted: !day_of_week.starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        contains(self.minutes, at.minute())
            && contains(self.hours, at.hour())
            && contains(self.months, at.month())
            && self.matches_day(at)
    }

    fn matches_day(&self, at: DateTime<Utc>) -> bool {
        let day_of_month = contains(self.days_of_month, at.day());
        let day_of_week = contains(self.days_of_week, at.weekday().num_days_from_sunday());

        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            (true, true) => day_of_month || day_of_week,
            (true, false) => day_of_month,
            (false, true) => day_of_week,
            (false, false) => true,
        }
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = after + Duration::days(SEARCH_HORIZON_DAYS);
        let mut candidate = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .map(|t| t + Duration::minutes(1))?;

        while candidate <= horizon {
            if !contains(self.months, candidate.month()) {
                candidate = start_of_next_month(candidate)?;
            } else if !self.matches_day(candidate) {
                candidate = start_of_next_day(candidate)?;
            } else if !contains(self.hours, candidate.hour()) {
                candidate = start_of_next_hour(candidate)?;
            } else if !contains(self.minutes, candidate.minute()) {
                candidate += Duration::minutes(1);
            } else {
                return Some(candidate);
            }
        }

        None
    }
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn contains(set: u64, value: u32) -> bool {
    set & (1 << value) != 0
}

fn parse_number(raw: &str, min: u32, max: u32) -> Result<u32, String> {
    let value: u32 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if value < min || value > max {
        return Err(format!("{} is outside {}-{}", value, min, max));
    }
    Ok(value)
}

/// Parses one field into a bit set of allowed values.
fn parse_field(field: &str, min: u32, max: u32) -> Result<u64, String> {
    let mut set = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("'{}' is not a valid step", step))?;
                if step == 0 {
                    return Err("step must be positive".to_string());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((start, end)) = range.split_once('-') {
            (parse_number(start, min, max)?, parse_number(end, min, max)?)
        } else {
            let start = parse_number(range, min, max)?;
            // `a/n` runs from a to the end of the range
            (start, if step.is_some() { max } else { start })
        };

        if start > end {
            return Err(format!("range {}-{} is reversed", start, end));
        }

        let step = step.unwrap_or(1) as usize;
        for value in (start..=end).step_by(step) {
            set |= 1 << value;
        }
    }

    Ok(set)
}

fn start_of_next_month(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

fn start_of_next_day(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = at.date_naive().succ_opt()?;
    Some(next.and_hms_opt(0, 0, 0)?.and_utc())
}

fn start_of_next_hour(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.with_minute(0).map(|t| t + Duration::hours(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_five_minutes() {
        let schedule = Schedule::parse("*/5 * * * *").unwrap();
        assert_eq!(schedule.next_after(at(2026, 6, 15, 12, 0)), Some(at(2026, 6, 15, 12, 5)));
        assert_eq!(schedule.next_after(at(2026, 6, 15, 12, 3)), Some(at(2026, 6, 15, 12, 5)));
        assert_eq!(schedule.next_after(at(2026, 6, 15, 23, 58)), Some(at(2026, 6, 16, 0, 0)));
    }

    #[test]
    fn hourly_and_daily_defaults() {
        let hourly = Schedule::parse("0 * * * *").unwrap();
        assert_eq!(hourly.next_after(at(2026, 6, 15, 12, 0)), Some(at(2026, 6, 15, 13, 0)));

        let daily = Schedule::parse("0 9 * * *").unwrap();
        assert_eq!(daily.next_after(at(2026, 6, 15, 9, 0)), Some(at(2026, 6, 16, 9, 0)));
        assert_eq!(daily.next_after(at(2026, 6, 15, 8, 59)), Some(at(2026, 6, 15, 9, 0)));

        let nightly = Schedule::parse("0 3 * * *").unwrap();
        assert_eq!(nightly.next_after(at(2026, 12, 31, 4, 0)), Some(at(2027, 1, 1, 3, 0)));
    }

    #[test]
    fn seconds_are_ignored_when_searching() {
        let schedule = Schedule::parse("* * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 42).unwrap();
        assert_eq!(schedule.next_after(after), Some(at(2026, 6, 15, 12, 1)));
    }

    #[test]
    fn ranges_lists_and_stepped_ranges() {
        let schedule = Schedule::parse("0,30 9-17/4 * * 1-5").unwrap();
        // 2026-06-13 is a Saturday
        assert_eq!(schedule.next_after(at(2026, 6, 13, 10, 0)), Some(at(2026, 6, 15, 9, 0)));
        assert_eq!(schedule.next_after(at(2026, 6, 15, 9, 0)), Some(at(2026, 6, 15, 9, 30)));
        assert_eq!(schedule.next_after(at(2026, 6, 15, 9, 30)), Some(at(2026, 6, 15, 13, 0)));
        assert_eq!(schedule.next_after(at(2026, 6, 15, 17, 0)), Some(at(2026, 6, 15, 17, 30)));
        assert_eq!(schedule.next_after(at(2026, 6, 15, 17, 30)), Some(at(2026, 6, 16, 9, 0)));
    }

    #[test]
    fn restricted_day_fields_are_ored() {
        // the 1st of the month or any Monday
        let schedule = Schedule::parse("0 0 1 * 1").unwrap();
        assert_eq!(schedule.next_after(at(2026, 6, 1, 0, 0)), Some(at(2026, 6, 8, 0, 0)));
        assert_eq!(schedule.next_after(at(2026, 6, 29, 0, 0)), Some(at(2026, 7, 1, 0, 0)));
    }

    #[test]
    fn sunday_is_zero_or_seven() {
        let zero = Schedule::parse("0 12 * * 0").unwrap();
        let seven = Schedule::parse("0 12 * * 7").unwrap();
        // 2026-06-21 is a Sunday
        assert_eq!(zero.next_after(at(2026, 6, 15, 0, 0)), Some(at(2026, 6, 21, 12, 0)));
        assert_eq!(zero.next_after(at(2026, 6, 15, 0, 0)), seven.next_after(at(2026, 6, 15, 0, 0)));
    }

    #[test]
    fn leap_day_schedules_are_found() {
        let schedule = Schedule::parse("0 0 29 2 *").unwrap();
        assert_eq!(schedule.next_after(at(2026, 6, 15, 0, 0)), Some(at(2028, 2, 29, 0, 0)));
    }

    #[test]
    fn impossible_dates_never_fire() {
        let schedule = Schedule::parse("0 0 31 2 *").unwrap();
        assert_eq!(schedule.next_after(at(2026, 6, 15, 0, 0)), None);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expression in ["", "* * * *", "* * * * * *", "60 * * * *", "* 24 * * *", "*/0 * * * *", "5-1 * * * *", "a * * * *", "* * 0 * *"] {
            assert_matches!(
                Schedule::parse(expression),
                Err(SchedulerError::InvalidSchedule { .. }),
                "expected '{}' to be rejected",
                expression
            );
        }
    }

    #[test]
    fn matches_checks_every_field() {
        let schedule: Schedule = "30 2 * 6 *".parse().unwrap();
        assert!(schedule.matches(at(2026, 6, 15, 2, 30)));
        assert!(!schedule.matches(at(2026, 7, 15, 2, 30)));
        assert_eq!(schedule.to_string(), "30 2 * 6 *");
    }
}
