//! Calendar helpers for allocation, comparison and forecast windows

use crate::models::{ComparisonKind, Period};
use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, Utc};

/// Midnight UTC on the first day of `ts`'s month
pub fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let date = ts.date_naive();
    let first = date.with_day(1).unwrap_or(date);
    first.and_time(NaiveTime::MIN).and_utc()
}

/// Shift a month start by `delta` calendar months
pub fn shift_months(start: DateTime<Utc>, delta: i32) -> DateTime<Utc> {
    let shifted = if delta >= 0 {
        start.checked_add_months(Months::new(delta as u32))
    } else {
        start.checked_sub_months(Months::new(delta.unsigned_abs()))
    };
    shifted.unwrap_or(start)
}

/// The calendar month containing `ts`
pub fn calendar_month(ts: DateTime<Utc>) -> Period {
    let start = month_start(ts);
    Period::new(start, shift_months(start, 1))
}

/// `YYYY-MM` label for the month containing `ts`
pub fn month_label(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

/// `count` consecutive calendar months ending before the month of `reference`,
/// oldest first
pub fn trailing_months(reference: DateTime<Utc>, count: usize) -> Vec<Period> {
    let anchor = month_start(reference);
    (1..=count as i32)
        .rev()
        .map(|back| {
            let start = shift_months(anchor, -back);
            Period::new(start, shift_months(start, 1))
        })
        .collect()
}

/// Current and previous windows for a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonWindows {
    pub current: Period,
    pub previous: Period,
}

/// Derive comparison windows for `kind` relative to `reference`
///
/// Month-over-month compares the last complete calendar month with the one
/// before it. Week-over-week compares the rolling seven days ending at
/// `reference` with the seven days before them.
pub fn comparison_windows(kind: ComparisonKind, reference: DateTime<Utc>) -> ComparisonWindows {
    match kind {
        ComparisonKind::MonthOverMonth => {
            let current_end = month_start(reference);
            let current_start = shift_months(current_end, -1);
            let previous_start = shift_months(current_start, -1);
            ComparisonWindows {
                current: Period::new(current_start, current_end),
                previous: Period::new(previous_start, current_start),
            }
        }
        ComparisonKind::WeekOverWeek => {
            let week = Duration::days(7);
            let current_start = reference - week;
            ComparisonWindows {
                current: Period::new(current_start, reference),
                previous: Period::new(current_start - week, current_start),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_month_start_truncates() {
        assert_eq!(month_start(utc(2024, 3, 17, 13)), utc(2024, 3, 1, 0));
    }

    #[test]
    fn test_calendar_month_handles_february() {
        let feb = calendar_month(utc(2024, 2, 10, 0));
        assert_eq!(feb.start, utc(2024, 2, 1, 0));
        assert_eq!(feb.end, utc(2024, 3, 1, 0));
        assert_eq!(feb.hours(), 29.0 * 24.0);
    }

    #[test]
    fn test_month_over_month_windows() {
        let windows = comparison_windows(ComparisonKind::MonthOverMonth, utc(2024, 3, 15, 8));
        assert_eq!(windows.current.start, utc(2024, 2, 1, 0));
        assert_eq!(windows.current.end, utc(2024, 3, 1, 0));
        assert_eq!(windows.previous.start, utc(2024, 1, 1, 0));
        assert_eq!(windows.previous.end, utc(2024, 2, 1, 0));
    }

    #[test]
    fn test_month_over_month_crosses_year() {
        let windows = comparison_windows(ComparisonKind::MonthOverMonth, utc(2024, 1, 5, 0));
        assert_eq!(windows.current.start, utc(2023, 12, 1, 0));
        assert_eq!(windows.previous.start, utc(2023, 11, 1, 0));
    }

    #[test]
    fn test_week_over_week_is_rolling() {
        let reference = utc(2024, 3, 15, 8);
        let windows = comparison_windows(ComparisonKind::WeekOverWeek, reference);
        assert_eq!(windows.current.end, reference);
        assert_eq!(windows.current.start, utc(2024, 3, 8, 8));
        assert_eq!(windows.previous.start, utc(2024, 3, 1, 8));
        assert_eq!(windows.previous.end, windows.current.start);
    }

    #[test]
    fn test_trailing_months_oldest_first() {
        let months = trailing_months(utc(2024, 3, 15, 0), 3);
        assert_eq!(months.len(), 3);
        assert_eq!(month_label(months[0].start), "2023-12");
        assert_eq!(month_label(months[2].start), "2024-02");
        assert_eq!(months[2].end, utc(2024, 3, 1, 0));
    }
}
