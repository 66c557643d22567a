use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info};

use crate::grid::WeekStart;
use crate::prayer::{ConfigScheduleSource, Coordinates, PrayerName};

const CONFIG_ENV_VAR: &str = "DAYBOOK_CONFIG";
const CONFIG_FILE_NAME: &str = "daybook.toml";
/// Ambient zone used when nothing is configured.
const DEFAULT_TIMEZONE: &str = "Africa/Cairo";
const DEFAULT_ASSISTANT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    timezone: Option<String>,
    data_dir: Option<String>,
    color: Option<bool>,
    week: RawWeek,
    location: Option<RawLocation>,
    prayer: Option<RawPrayer>,
    assistant: RawAssistant,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWeek {
    /// Week-start for the day board; the original product used Monday.
    day_board_start: Option<String>,
    /// Week-start for the slot board and month view; Saturday there.
    slot_board_start: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct RawPrayer {
    fajr: String,
    dhuhr: String,
    asr: String,
    maghrib: String,
    isha: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAssistant {
    endpoint: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub model: String,
}

/// Resolved configuration threaded through every command. The timezone
/// is the ambient zone for all date-key computation.
#[derive(Debug, Clone)]
pub struct Config {
    pub timezone: Tz,
    pub data_dir: Option<PathBuf>,
    pub color: bool,
    pub day_board_week_start: WeekStart,
    pub slot_board_week_start: WeekStart,
    pub coordinates: Option<Coordinates>,
    pub prayer_schedule: Option<[(PrayerName, NaiveTime); 5]>,
    pub assistant: AssistantConfig,
    pub loaded_file: Option<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(override_path))]
    pub fn load(override_path: Option<&Path>) -> anyhow::Result<Self> {
        let (raw, loaded_file) = match config_path(override_path) {
            Some(path) if path.exists() => {
                info!(file = %path.display(), "loading config");
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let raw: RawConfig = toml::from_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                (raw, Some(path))
            }
            Some(path) if override_path.is_some() => {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            _ => {
                debug!("no config file; using defaults");
                (RawConfig::default(), None)
            }
        };

        Ok(Self {
            timezone: resolve_timezone(raw.timezone.as_deref())?,
            data_dir: raw.data_dir.map(|d| expand_tilde(Path::new(&d))),
            color: raw.color.unwrap_or(true),
            day_board_week_start: resolve_week_start(
                raw.week.day_board_start.as_deref(),
                WeekStart::Monday,
            )?,
            slot_board_week_start: resolve_week_start(
                raw.week.slot_board_start.as_deref(),
                WeekStart::Saturday,
            )?,
            coordinates: raw.location.map(|l| Coordinates {
                latitude: l.latitude,
                longitude: l.longitude,
            }),
            prayer_schedule: raw.prayer.map(|p| parse_prayer_schedule(&p)).transpose()?,
            assistant: AssistantConfig {
                endpoint: raw
                    .assistant
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_ASSISTANT_ENDPOINT.to_string()),
                model: raw
                    .assistant
                    .model
                    .unwrap_or_else(|| DEFAULT_ASSISTANT_MODEL.to_string()),
            },
            loaded_file,
        })
    }

    pub fn override_timezone(&mut self, raw: &str) -> anyhow::Result<()> {
        self.timezone = raw
            .trim()
            .parse::<Tz>()
            .map_err(|err| anyhow!("invalid timezone {raw:?}: {err}"))?;
        Ok(())
    }

    /// Prayer source backed by the configured wall times, if any.
    pub fn prayer_source(&self) -> Option<ConfigScheduleSource> {
        self.prayer_schedule
            .map(|schedule| ConfigScheduleSource::new(schedule, self.timezone))
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(path) = &cfg.data_dir {
        path.clone()
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

fn config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(raw) = std::env::var(CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    dirs::config_dir().map(|dir| dir.join("daybook").join(CONFIG_FILE_NAME))
}

fn resolve_timezone(raw: Option<&str>) -> anyhow::Result<Tz> {
    let source = raw.unwrap_or(DEFAULT_TIMEZONE);
    source
        .trim()
        .parse::<Tz>()
        .map_err(|err| anyhow!("invalid timezone {source:?}: {err}"))
}

fn resolve_week_start(raw: Option<&str>, default: WeekStart) -> anyhow::Result<WeekStart> {
    match raw {
        Some(value) => value.parse(),
        None => Ok(default),
    }
}

fn parse_prayer_schedule(raw: &RawPrayer) -> anyhow::Result<[(PrayerName, NaiveTime); 5]> {
    Ok([
        (PrayerName::Fajr, parse_wall_time(&raw.fajr)?),
        (PrayerName::Dhuhr, parse_wall_time(&raw.dhuhr)?),
        (PrayerName::Asr, parse_wall_time(&raw.asr)?),
        (PrayerName::Maghrib, parse_wall_time(&raw.maghrib)?),
        (PrayerName::Isha, parse_wall_time(&raw.isha)?),
    ])
}

fn parse_wall_time(raw: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("invalid wall time {raw:?}, expected HH:MM"))
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".daybook"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}
