//! Calendar arithmetic: month ranges, Sun–Sat weeks, and the
//! weekend / holiday / holiday-adjacent classification of a date.

use crate::{
    error::{RotaError, RotaResult},
    types::Dimension,
};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;

/// First and last day of a calendar month.
pub fn month_range(year: i32, month: u32) -> RotaResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(RotaError::InvalidMonth { year, month })?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(RotaError::InvalidMonth { year, month })?;
    Ok((start, next - Duration::days(1)))
}

/// Every date in `start..=end`, ascending. Empty when `end < start`.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The Sunday that opens the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// A Sun–Sat week, clipped to the range it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Number of calendar days kept after clipping (1..=7).
    pub days: u32,
}

impl Week {
    pub fn is_clipped(&self) -> bool {
        self.days < 7
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        dates_between(self.start, self.end)
    }
}

/// All Sun–Sat weeks intersecting `start..=end`, clipped to it.
pub fn weeks_intersecting(start: NaiveDate, end: NaiveDate) -> Vec<Week> {
    let mut weeks = Vec::new();
    let mut cursor = week_start(start);
    while cursor <= end {
        let week_end = cursor + Duration::days(6);
        let clipped_start = cursor.max(start);
        let clipped_end = week_end.min(end);
        weeks.push(Week {
            start: clipped_start,
            end: clipped_end,
            days: (clipped_end - clipped_start).num_days() as u32 + 1,
        });
        cursor += Duration::days(7);
    }
    weeks
}

/// Registered holidays for one clinic.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    dates: BTreeMap<NaiveDate, String>,
}

impl HolidayCalendar {
    pub fn new<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, String)>,
    {
        Self {
            dates: holidays.into_iter().collect(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains_key(&date)
    }

    /// A non-holiday day whose previous or next day is a holiday.
    ///
    /// Inside a run of consecutive holidays every day is a holiday, so only
    /// the two days bordering the run qualify.
    pub fn is_holiday_adjacent(&self, date: NaiveDate) -> bool {
        if self.is_holiday(date) {
            return false;
        }
        let before = date.pred_opt().map_or(false, |d| self.is_holiday(d));
        let after = date.succ_opt().map_or(false, |d| self.is_holiday(d));
        before || after
    }

    /// Holidays inside `start..=end`, ascending.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, &str)> {
        self.dates
            .range(start..=end)
            .map(|(d, n)| (*d, n.as_str()))
            .collect()
    }
}

/// How a single date is classified for fairness purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayClass {
    pub weekend: bool,
    pub night: bool,
    pub holiday: bool,
    pub holiday_adjacent: bool,
}

impl DayClass {
    pub fn classify(date: NaiveDate, has_night: bool, holidays: &HolidayCalendar) -> Self {
        Self {
            weekend: is_weekend(date),
            night: has_night,
            holiday: holidays.is_holiday(date),
            holiday_adjacent: holidays.is_holiday_adjacent(date),
        }
    }

    /// Whether this date counts toward `dimension`.
    pub fn triggers(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Total => true,
            Dimension::Night => self.night,
            Dimension::Weekend => self.weekend,
            Dimension::Holiday => self.holiday,
            Dimension::HolidayAdjacent => self.holiday_adjacent,
        }
    }

    /// Every dimension this date triggers, TOTAL first.
    pub fn dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .iter()
            .copied()
            .filter(|d| self.triggers(*d))
            .collect()
    }

    /// The dimension a worked slot on this day is weighed against in Phase 1.
    pub fn slot_dimension(&self) -> Dimension {
        if self.night {
            Dimension::Night
        } else if self.weekend {
            Dimension::Weekend
        } else {
            Dimension::Total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_range_handles_december_and_leap_years() {
        assert_eq!(month_range(2024, 2).unwrap(), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(month_range(2025, 12).unwrap(), (d(2025, 12, 1), d(2025, 12, 31)));
        assert!(month_range(2025, 13).is_err());
    }

    #[test]
    fn weeks_are_sunday_based_and_clipped() {
        // March 2025 starts on a Saturday.
        let (start, end) = month_range(2025, 3).unwrap();
        let weeks = weeks_intersecting(start, end);
        assert_eq!(weeks.first().unwrap().start, d(2025, 3, 1));
        assert_eq!(weeks.first().unwrap().days, 1);
        assert_eq!(weeks[1].start, d(2025, 3, 2));
        assert_eq!(weeks[1].end, d(2025, 3, 8));
        assert!(!weeks[1].is_clipped());
        let total: u32 = weeks.iter().map(|w| w.days).sum();
        assert_eq!(total, 31);
    }

    #[test]
    fn holiday_adjacency_only_borders_the_run() {
        let cal = HolidayCalendar::new(vec![
            (d(2025, 5, 5), "Children's Day".to_string()),
            (d(2025, 5, 6), "Substitute".to_string()),
        ]);
        assert!(cal.is_holiday_adjacent(d(2025, 5, 4)));
        assert!(!cal.is_holiday_adjacent(d(2025, 5, 5)));
        assert!(!cal.is_holiday_adjacent(d(2025, 5, 6)));
        assert!(cal.is_holiday_adjacent(d(2025, 5, 7)));
        assert!(!cal.is_holiday_adjacent(d(2025, 5, 8)));
    }

    #[test]
    fn saturday_night_triggers_three_dimensions() {
        let cal = HolidayCalendar::default();
        let class = DayClass::classify(d(2025, 3, 1), true, &cal);
        assert_eq!(
            class.dimensions(),
            vec![Dimension::Total, Dimension::Night, Dimension::Weekend]
        );
        assert_eq!(class.slot_dimension(), Dimension::Night);
    }
}
