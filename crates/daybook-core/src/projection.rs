use std::collections::BTreeMap;

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::datekey::{DateKey, INBOX_SENTINEL};
use crate::task::{DockSection, Status, Task};

/// Read-only split of one civil day's scheduled tasks. Pure: derived
/// from scratch on every call, nothing is cached or written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayProjection {
    /// Scheduled on this day at exactly the sentinel hour ("no specific
    /// time chosen"), ordered by creation.
    pub inbox: Vec<Task>,
    /// Scheduled at a concrete hour, ascending by scheduled time.
    pub timed: Vec<Task>,
}

pub fn project_day(tasks: &[Task], date_key: DateKey, tz: Tz) -> DayProjection {
    let mut projection = DayProjection::default();

    for task in tasks {
        let Some(ts) = task.scheduled_time else {
            continue;
        };
        if DateKey::from_instant(ts, tz) != date_key {
            continue;
        }
        if ts.with_timezone(&tz).time() == INBOX_SENTINEL {
            projection.inbox.push(task.clone());
        } else {
            projection.timed.push(task.clone());
        }
    }

    projection.inbox.sort_by_key(|t| t.created_at);
    projection
        .timed
        .sort_by_key(|t| (t.scheduled_time, t.created_at));
    projection
}

/// Tasks scheduled on a civil day strictly before today and not done,
/// most recently missed first. A task without a scheduled time is never
/// missed.
pub fn missed_tasks(tasks: &[Task], now: DateTime<Utc>, tz: Tz) -> Vec<Task> {
    let today = DateKey::today(now, tz);

    let mut missed: Vec<Task> = tasks
        .iter()
        .filter(|t| t.status != Status::Done)
        .filter(|t| {
            t.scheduled_time
                .is_some_and(|ts| DateKey::from_instant(ts, tz) < today)
        })
        .cloned()
        .collect();

    missed.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
    missed
}

/// The backlog pool: tasks with no absolute schedule at all.
pub fn unscheduled(tasks: &[Task]) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.scheduled_time.is_none())
        .cloned()
        .collect()
}

/// Dock view: unscheduled definitions grouped by section. Items with no
/// section land under `Todo`.
pub fn dock_sections(tasks: &[Task]) -> BTreeMap<DockSection, Vec<Task>> {
    let mut sections: BTreeMap<DockSection, Vec<Task>> = BTreeMap::new();
    for task in unscheduled(tasks) {
        let section = task.dock_section.unwrap_or(DockSection::Todo);
        sections.entry(section).or_default().push(task);
    }
    for bucket in sections.values_mut() {
        bucket.sort_by_key(|t| t.created_at);
    }
    sections
}

/// Occupants of one (weekday, hour-label) cell on the slot board.
pub fn slot_tasks(tasks: &[Task], weekday: Weekday, hour_label: &str) -> Vec<Task> {
    let mut hits: Vec<Task> = tasks
        .iter()
        .filter(|t| {
            t.slot
                .as_ref()
                .is_some_and(|s| s.weekday == weekday && s.hour_label == hour_label)
        })
        .cloned()
        .collect();
    hits.sort_by_key(|t| t.created_at);
    hits
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use chrono::Weekday;

    use super::{missed_tasks, project_day, slot_tasks, unscheduled};
    use crate::datekey::DateKey;
    use crate::task::{Category, Impact, Slot, Status, Task};

    const CAIRO: Tz = chrono_tz::Africa::Cairo;

    fn task_at(title: &str, local_hms: (u32, u32, u32), now: chrono::DateTime<Utc>) -> Task {
        // February: Cairo is UTC+2, no DST in effect.
        let (h, m, s) = local_hms;
        let mut task = Task::new(title.to_string(), Category::Work, Impact::Med, now);
        task.scheduled_time = Some(
            CAIRO
                .with_ymd_and_hms(2026, 2, 18, h, m, s)
                .single()
                .expect("valid local time")
                .with_timezone(&Utc),
        );
        task
    }

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 8, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn noon_sentinel_lands_in_inbox_not_timed() {
        let now = fixed_now();
        let tasks = vec![
            task_at("inbox item", (12, 0, 0), now),
            task_at("timed item", (12, 30, 0), now),
        ];

        let day = DateKey::parse("2026-02-18").expect("valid key");
        let projection = project_day(&tasks, day, CAIRO);

        assert_eq!(projection.inbox.len(), 1);
        assert_eq!(projection.inbox[0].title, "inbox item");
        assert_eq!(projection.timed.len(), 1);
        assert_eq!(projection.timed[0].title, "timed item");
    }

    #[test]
    fn timed_tasks_sort_by_time_then_creation() {
        let now = fixed_now();
        let earlier_created = now - chrono::Duration::hours(2);

        let a = task_at("nine", (9, 0, 0), now);
        let mut b = task_at("nine but older", (9, 0, 0), earlier_created);
        b.created_at = earlier_created;
        let c = task_at("eight", (8, 0, 0), now);

        let day = DateKey::parse("2026-02-18").expect("valid key");
        let projection = project_day(&[a, b, c], day, CAIRO);

        let titles: Vec<&str> = projection.timed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["eight", "nine but older", "nine"]);
    }

    #[test]
    fn other_days_and_unscheduled_are_excluded() {
        let now = fixed_now();
        let mut other_day = task_at("tomorrow", (9, 0, 0), now);
        other_day.scheduled_time = other_day.scheduled_time.map(|ts| ts + chrono::Duration::days(1));
        let floating = Task::new("floating".to_string(), Category::Personal, Impact::Low, now);

        let day = DateKey::parse("2026-02-18").expect("valid key");
        let projection = project_day(&[other_day, floating.clone()], day, CAIRO);

        assert!(projection.inbox.is_empty());
        assert!(projection.timed.is_empty());
        assert_eq!(unscheduled(&[floating]).len(), 1);
    }

    #[test]
    fn slot_lookup_matches_weekday_and_label() {
        let now = fixed_now();
        let mut slotted = Task::new("gym".to_string(), Category::Health, Impact::Low, now);
        slotted.slot = Some(Slot {
            weekday: Weekday::Wed,
            hour_label: "morning".to_string(),
        });
        let floating = Task::new("floating".to_string(), Category::Work, Impact::Med, now);

        let hits = slot_tasks(&[slotted.clone(), floating], Weekday::Wed, "morning");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "gym");

        assert!(slot_tasks(&[slotted.clone()], Weekday::Thu, "morning").is_empty());
        assert!(slot_tasks(&[slotted], Weekday::Wed, "evening").is_empty());
    }

    #[test]
    fn missed_requires_past_day_and_not_done() {
        let now = fixed_now();
        let mut yesterday = task_at("yesterday", (10, 0, 0), now);
        yesterday.scheduled_time = yesterday
            .scheduled_time
            .map(|ts| ts - chrono::Duration::days(1));
        let mut long_ago = yesterday.clone();
        long_ago.title = "long ago".to_string();
        long_ago.scheduled_time = long_ago
            .scheduled_time
            .map(|ts| ts - chrono::Duration::days(5));
        let today = task_at("today", (10, 0, 0), now);
        let floating = Task::new("floating".to_string(), Category::Work, Impact::Med, now);

        let missed = missed_tasks(
            &[yesterday.clone(), long_ago, today, floating],
            now,
            CAIRO,
        );
        let titles: Vec<&str> = missed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["yesterday", "long ago"]);

        let mut finished = yesterday;
        finished.status = Status::Done;
        assert!(missed_tasks(&[finished], now, CAIRO).is_empty());
    }
}
