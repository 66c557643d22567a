use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::datekey::DateKey;
use crate::state::AppState;
use crate::task::Status;

/// Week-start convention. The day board starts weeks on Monday, the
/// slot board on Saturday; the two are deliberately not unified, so the
/// policy is an explicit parameter on every grid call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    Monday,
    Saturday,
}

impl WeekStart {
    pub fn first_weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Saturday => Weekday::Sat,
        }
    }
}

impl FromStr for WeekStart {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(Self::Monday),
            "saturday" | "sat" => Ok(Self::Saturday),
            other => Err(anyhow!("unknown week start: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekDay {
    pub key: DateKey,
    pub short_label: String,
    pub long_label: String,
    pub day_number: u32,
    /// UTC-noon anchor, for DST-safe calendar math.
    pub anchor: DateTime<Utc>,
    /// Civil-day bounds in the ambient timezone; start inclusive, end
    /// exclusive.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_today: bool,
}

impl WeekDay {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// The 7-day week containing `reference`, under the given start
/// convention. Days are contiguous and `is_today` is determined by
/// range containment of `now`, never by an implicit clock read.
pub fn week_days(
    reference: DateKey,
    week_start: WeekStart,
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<WeekDay> {
    let back = days_since_week_start(reference.weekday(), week_start);
    let first = reference.shift(-i64::from(back));

    (0..7)
        .map(|offset| {
            let key = first.shift(offset);
            let (start, end) = key.civil_bounds(tz);
            WeekDay {
                key,
                short_label: key.naive().format("%a").to_string(),
                long_label: key.naive().format("%A").to_string(),
                day_number: key.day_number(),
                anchor: key.to_utc_noon(),
                start,
                end,
                is_today: start <= now && now < end,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthCell {
    pub key: DateKey,
    pub day_number: u32,
    pub in_current_month: bool,
    pub is_today: bool,
    /// Tasks scheduled on this day, excluding done ones.
    pub scheduled_count: usize,
    pub completed_count: usize,
    pub protocol_done_count: usize,
    /// Recurring activities defined for this weekday.
    pub weekly_activity_count: usize,
}

/// Full 6x7 month grid for the month `month_offset` months away from
/// `anchor`, including leading and trailing days of adjacent months.
pub fn month_grid(
    anchor: DateKey,
    month_offset: i32,
    week_start: WeekStart,
    now: DateTime<Utc>,
    tz: Tz,
    state: &AppState,
) -> Vec<MonthCell> {
    let (year, month) = shift_month(anchor.year(), anchor.month(), month_offset);
    let first = chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .map(DateKey::new)
        .unwrap_or(anchor);

    let lead = days_since_week_start(first.weekday(), week_start);
    let grid_first = first.shift(-i64::from(lead));
    let today = DateKey::today(now, tz);

    (0..42)
        .map(|offset| {
            let key = grid_first.shift(offset);

            let mut scheduled_count = 0;
            let mut completed_count = 0;
            for task in &state.tasks {
                let Some(ts) = task.scheduled_time else {
                    continue;
                };
                if DateKey::from_instant(ts, tz) != key {
                    continue;
                }
                if task.status == Status::Done {
                    completed_count += 1;
                } else {
                    scheduled_count += 1;
                }
            }

            let protocol_done_count = state
                .daily_protocol
                .get(&key)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|(id, done)| **done && !id.starts_with("weekly_"))
                        .count()
                })
                .unwrap_or(0);

            let weekly_activity_count = state
                .weekly_activities
                .get(weekday_short_key(key.weekday()))
                .map(Vec::len)
                .unwrap_or(0);

            MonthCell {
                key,
                day_number: key.day_number(),
                in_current_month: key.year() == year && key.month() == month,
                is_today: key == today,
                scheduled_count,
                completed_count,
                protocol_done_count,
                weekly_activity_count,
            }
        })
        .collect()
}

/// Short key used by the weekly-activities map, `sun`..`sat`.
pub fn weekday_short_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "sun",
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
    }
}

fn days_since_week_start(weekday: Weekday, week_start: WeekStart) -> u32 {
    let first = week_start.first_weekday().num_days_from_monday();
    (7 + weekday.num_days_from_monday() - first) % 7
}

fn shift_month(year: i32, month: u32, offset: i32) -> (i32, u32) {
    let linear = year * 12 + month as i32 - 1 + offset;
    (linear.div_euclid(12), linear.rem_euclid(12) as u32 + 1)
}
