use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::Serialize;

/// Monday-to-Sunday calendar week, the unit the timetable and weekly stats use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekRange {
    pub fn containing(date: NaiveDate) -> Self {
        let start = week_start(date);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn current() -> Self {
        Self::containing(today())
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..7).map(|offset| self.start + Duration::days(offset)).collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn label(&self) -> String {
        week_label(self.start)
    }

    pub fn previous(&self) -> Self {
        Self::containing(self.start - Duration::weeks(1))
    }

    pub fn next(&self) -> Self {
        Self::containing(self.start + Duration::weeks(1))
    }

    /// Whether a plan valid from `from` to `until` (open ends allowed)
    /// applies to any day of this week.
    pub fn overlaps(&self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> bool {
        from.is_none_or(|from| from <= self.end) && until.is_none_or(|until| until >= self.start)
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// 0 = Monday .. 6 = Sunday, the backend's `dayOfWeek`.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

pub fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
