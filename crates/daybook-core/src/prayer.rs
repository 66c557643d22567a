use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::datekey::{DateKey, local_instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrayerName {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    pub const ALL: [PrayerName; 5] = [
        PrayerName::Fajr,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Fajr => "Fajr",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
        }
    }
}

/// The five canonical instants of one civil day, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrayerDay {
    pub times: [(PrayerName, DateTime<Utc>); 5],
}

/// Oracle for daily prayer times. The day view consumes this read-only
/// to label prayer-aligned blocks; the engine never depends on a call
/// succeeding. An astronomical calculation library plugs in behind this
/// trait without touching anything else.
pub trait PrayerTimeSource {
    fn times_for(&self, coords: Coordinates, date: DateKey) -> anyhow::Result<PrayerDay>;
}

/// Fixed wall-clock schedule read from configuration. Coordinates are
/// accepted for interface parity and ignored.
#[derive(Debug, Clone)]
pub struct ConfigScheduleSource {
    schedule: [(PrayerName, NaiveTime); 5],
    tz: Tz,
}

impl ConfigScheduleSource {
    pub fn new(schedule: [(PrayerName, NaiveTime); 5], tz: Tz) -> Self {
        Self { schedule, tz }
    }
}

impl PrayerTimeSource for ConfigScheduleSource {
    fn times_for(&self, _coords: Coordinates, date: DateKey) -> anyhow::Result<PrayerDay> {
        let mut times = [(PrayerName::Fajr, date.to_utc_noon()); 5];
        for (idx, (name, wall)) in self.schedule.iter().enumerate() {
            times[idx] = (*name, local_instant(date, *wall, self.tz)?);
        }
        Ok(PrayerDay { times })
    }
}
