use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel wall-clock time meaning "scheduled on this day, no specific
/// hour chosen". Tasks landing exactly here render in the day inbox.
pub const INBOX_SENTINEL: NaiveTime = match NaiveTime::from_hms_opt(12, 0, 0) {
    Some(t) => t,
    None => NaiveTime::MIN,
};

const UTC_NOON: NaiveTime = match NaiveTime::from_hms_opt(12, 0, 0) {
    Some(t) => t,
    None => NaiveTime::MIN,
};

/// Canonical `YYYY-MM-DD` identifier for one civil day in some timezone.
/// All day-scoped maps in the state blob are keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Strict parse of a `YYYY-MM-DD` key. The original product let
    /// malformed keys propagate as NaN garbage; here they are an error.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("malformed date key: {raw:?}"))?;
        Ok(Self(date))
    }

    /// Civil day containing `instant` in `tz`.
    pub fn from_instant(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self(instant.with_timezone(&tz).date_naive())
    }

    pub fn today(now: DateTime<Utc>, tz: Tz) -> Self {
        Self::from_instant(now, tz)
    }

    pub fn naive(self) -> NaiveDate {
        self.0
    }

    pub fn weekday(self) -> Weekday {
        self.0.weekday()
    }

    pub fn day_number(self) -> u32 {
        self.0.day()
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// UTC-noon anchor for calendar math. Anchoring at noon keeps a
    /// date-key stable across DST shifts when only the calendar date
    /// matters: noon UTC lands inside the same civil day for any zone
    /// within UTC-11..UTC+11.
    pub fn to_utc_noon(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_time(UTC_NOON))
    }

    /// Day arithmetic; rolls over month and year boundaries.
    pub fn shift(self, days: i64) -> Self {
        Self(
            self.0
                .checked_add_signed(Duration::days(days))
                .unwrap_or(self.0),
        )
    }

    /// Inclusive start and exclusive end of this civil day in `tz`.
    pub fn civil_bounds(self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            local_midnight_utc(self.0, tz),
            local_midnight_utc(self.shift(1).0, tz),
        )
    }

    pub fn contains(self, instant: DateTime<Utc>, tz: Tz) -> bool {
        let (start, end) = self.civil_bounds(tz);
        start <= instant && instant < end
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Resolve a local wall-clock time on `key`'s day to a UTC instant.
pub fn local_instant(key: DateKey, time: NaiveTime, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    let naive = key.naive().and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            tracing::warn!(
                key = %key,
                first = %first,
                second = %second,
                "ambiguous local time; using earliest"
            );
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local time {time} does not exist on {key} in {tz}"
        )),
    }
}

fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, second) => {
            let chosen = if first <= second { first } else { second };
            chosen.with_timezone(&Utc)
        }
        // Spring-forward gap swallowed midnight; the day starts at the
        // first instant after the jump.
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(UTC_NOON))),
    }
}
