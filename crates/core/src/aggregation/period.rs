//! Calendar periods used to key aggregations
//!
//! Every named period resolves to a half-open UTC interval. Seasons are
//! meteorological and contiguous: Winter of year Y runs from 1 December Y-1
//! to the end of February Y, so a year's four seasons tile it without gaps.

use crate::core_types::TimeWindow;
use crate::error::InvalidRangeError;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Meteorological season
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Fall];

    /// Season containing a calendar month (1-12) and the season year it
    /// belongs to. December rolls into the following year's winter.
    #[must_use]
    pub fn of_month(year: i32, month: u32) -> (i32, Season) {
        match month {
            12 => (year + 1, Season::Winter),
            1 | 2 => (year, Season::Winter),
            3..=5 => (year, Season::Spring),
            6..=8 => (year, Season::Summer),
            _ => (year, Season::Fall),
        }
    }

    /// First calendar month, with the year offset relative to the season year
    fn first_month(self) -> (i32, u32) {
        match self {
            Season::Winter => (-1, 12),
            Season::Spring => (0, 3),
            Season::Summer => (0, 6),
            Season::Fall => (0, 9),
        }
    }

    fn next(self) -> Option<Season> {
        match self {
            Season::Winter => Some(Season::Spring),
            Season::Spring => Some(Season::Summer),
            Season::Summer => Some(Season::Fall),
            Season::Fall => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

/// Step size for [`PeriodSpec::containing`] and aggregation series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    Yearly,
    Seasonal,
    Monthly,
    Weekly,
}

/// A period an aggregation is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSpec {
    Year(i32),
    Season { year: i32, season: Season },
    Month { year: i32, month: u32 },
    /// ISO 8601 week, Monday start
    Week { iso_year: i32, week: u32 },
    Custom(TimeWindow),
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>, InvalidRangeError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(midnight)
        .ok_or_else(|| InvalidRangeError::InvalidPeriod(format!("{year}-{month:02}")))
}

/// `(year, month)` advanced by `months`; `None` past the last `i32` year
fn add_months(year: i32, month: u32, months: u32) -> Option<(i32, u32)> {
    let zero_based = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(months);
    let year = i32::try_from(zero_based.div_euclid(12)).ok()?;
    Some((year, zero_based.rem_euclid(12) as u32 + 1))
}

impl PeriodSpec {
    /// Closed window covering the period
    ///
    /// # Errors
    ///
    /// `InvalidRangeError::InvalidPeriod` for a month or week that does not
    /// exist, `TimeOverflow` at the edges of chrono's range.
    pub fn window(&self) -> Result<TimeWindow, InvalidRangeError> {
        let invalid = || InvalidRangeError::InvalidPeriod(self.to_string());
        match *self {
            PeriodSpec::Year(year) => {
                let next = year.checked_add(1).ok_or_else(invalid)?;
                TimeWindow::half_open(month_start(year, 1)?, month_start(next, 1)?)
            }
            PeriodSpec::Month { year, month } => {
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                let (ny, nm) = add_months(year, month, 1).ok_or_else(invalid)?;
                TimeWindow::half_open(month_start(year, month)?, month_start(ny, nm)?)
            }
            PeriodSpec::Season { year, season } => {
                let (offset, month) = season.first_month();
                let start_year = year.checked_add(offset).ok_or_else(invalid)?;
                let (ny, nm) = add_months(start_year, month, 3).ok_or_else(invalid)?;
                TimeWindow::half_open(month_start(start_year, month)?, month_start(ny, nm)?)
            }
            PeriodSpec::Week { iso_year, week } => {
                let monday =
                    NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Mon).ok_or_else(invalid)?;
                let next = monday.checked_add_days(chrono::Days::new(7)).ok_or_else(invalid)?;
                TimeWindow::half_open(midnight(monday), midnight(next))
            }
            PeriodSpec::Custom(window) => TimeWindow::new(window.start, window.end),
        }
    }

    /// Period of the given granularity that contains `t`
    #[must_use]
    pub fn containing(t: DateTime<Utc>, granularity: PeriodGranularity) -> PeriodSpec {
        match granularity {
            PeriodGranularity::Yearly => PeriodSpec::Year(t.year()),
            PeriodGranularity::Seasonal => {
                let (year, season) = Season::of_month(t.year(), t.month());
                PeriodSpec::Season { year, season }
            }
            PeriodGranularity::Monthly => PeriodSpec::Month {
                year: t.year(),
                month: t.month(),
            },
            PeriodGranularity::Weekly => {
                let week = t.iso_week();
                PeriodSpec::Week {
                    iso_year: week.year(),
                    week: week.week(),
                }
            }
        }
    }

    /// Following period of the same granularity; `None` for custom windows
    /// and at the end of the calendar.
    #[must_use]
    pub fn next(&self) -> Option<PeriodSpec> {
        match *self {
            PeriodSpec::Year(year) => year.checked_add(1).map(PeriodSpec::Year),
            PeriodSpec::Season { year, season } => Some(match season.next() {
                Some(season) => PeriodSpec::Season { year, season },
                None => PeriodSpec::Season {
                    year: year.checked_add(1)?,
                    season: Season::Winter,
                },
            }),
            PeriodSpec::Month { year, month } => {
                let (year, month) = add_months(year, month, 1)?;
                Some(PeriodSpec::Month { year, month })
            }
            PeriodSpec::Week { .. } => {
                let next = self
                    .window()
                    .ok()?
                    .end
                    .checked_add_signed(chrono::TimeDelta::days(1))?;
                Some(PeriodSpec::containing(next, PeriodGranularity::Weekly))
            }
            PeriodSpec::Custom(_) => None,
        }
    }
}

impl fmt::Display for PeriodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodSpec::Year(year) => write!(f, "{year}"),
            PeriodSpec::Season { year, season } => write!(f, "{year}-{}", season.name()),
            PeriodSpec::Month { year, month } => write!(f, "{year}-{month:02}"),
            PeriodSpec::Week { iso_year, week } => write!(f, "{iso_year}-W{week:02}"),
            PeriodSpec::Custom(window) => write!(f, "{}..{}", window.start, window.end),
        }
    }
}
