use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::datekey::{DateKey, INBOX_SENTINEL, local_instant};
use crate::task::{DockSection, Status, Task};

/// Outcome of placing a dock item onto a day. One closed dispatch
/// replaces the per-section conditionals the original product scattered
/// across its views.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Reschedule the task itself (plain todos and "later" items).
    Move { scheduled_time: DateTime<Utc> },
    /// Leave the dock definition alone and emit a scheduled copy
    /// (routines recur; the definition is the recurrence source).
    Clone { copy: Task },
    /// Emit a working-session child pointing back at the project.
    SpawnSession { child: Task },
    /// Expand a template into one task per step.
    Expand { tasks: Vec<Task> },
    /// Habits are not scheduled; flip the day in the tracking map.
    TrackHabit { date_key: DateKey },
}

/// Resolve where `hour` lands on `date_key`: a concrete hour if given,
/// otherwise the inbox sentinel ("this day, no specific time").
pub fn scheduled_instant(
    date_key: DateKey,
    hour: Option<u32>,
    tz: Tz,
) -> anyhow::Result<DateTime<Utc>> {
    let time = match hour {
        Some(h) => NaiveTime::from_hms_opt(h, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("hour out of range: {h}"))?,
        None => INBOX_SENTINEL,
    };
    local_instant(date_key, time, tz)
}

pub fn place_on_day(
    task: &Task,
    date_key: DateKey,
    hour: Option<u32>,
    now: DateTime<Utc>,
    tz: Tz,
) -> anyhow::Result<Placement> {
    let section = task.dock_section.unwrap_or(DockSection::Todo);

    match section {
        DockSection::Todo | DockSection::Later => Ok(Placement::Move {
            scheduled_time: scheduled_instant(date_key, hour, tz)?,
        }),
        DockSection::Routine => {
            let mut copy = Task::new(task.title.clone(), task.category, task.impact, now);
            copy.scheduled_time = Some(scheduled_instant(date_key, hour, tz)?);
            copy.duration_minutes = task.duration_minutes;
            copy.notes = task.notes.clone();
            Ok(Placement::Clone { copy })
        }
        DockSection::Project => {
            let mut child = Task::new(
                format!("{} session", task.title),
                task.category,
                task.impact,
                now,
            );
            child.scheduled_time = Some(scheduled_instant(date_key, hour, tz)?);
            child.parent_project = Some(task.id);
            Ok(Placement::SpawnSession { child })
        }
        DockSection::Template => {
            let scheduled_time = scheduled_instant(date_key, hour, tz)?;
            let tasks = task
                .template_steps
                .iter()
                .map(|step| {
                    let mut t = Task::new(step.clone(), task.category, task.impact, now);
                    t.scheduled_time = Some(scheduled_time);
                    t.parent_project = Some(task.id);
                    t
                })
                .collect();
            Ok(Placement::Expand { tasks })
        }
        DockSection::Habit => Ok(Placement::TrackHabit { date_key }),
    }
}

/// Apply a placement to the task list. `task_id` is the placed item.
pub fn apply_placement(tasks: &mut Vec<Task>, task_id: Uuid, placement: Placement) {
    match placement {
        Placement::Move { scheduled_time } => {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                task.scheduled_time = Some(scheduled_time);
                if task.status == Status::Backlog {
                    task.status = Status::Todo;
                }
            }
        }
        Placement::Clone { copy } => tasks.push(copy),
        Placement::SpawnSession { child } => tasks.push(child),
        Placement::Expand { tasks: expanded } => tasks.extend(expanded),
        Placement::TrackHabit { date_key } => {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                let marked = task.habit_tracking.get(&date_key).copied().unwrap_or(false);
                task.habit_tracking.insert(date_key, !marked);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{Placement, apply_placement, place_on_day};
    use crate::datekey::DateKey;
    use crate::task::{Category, DockSection, Impact, Task};

    const CAIRO: Tz = chrono_tz::Africa::Cairo;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    fn dock_item(section: DockSection) -> Task {
        let mut task = Task::new(
            "Deep work".to_string(),
            Category::Work,
            Impact::High,
            fixed_now(),
        );
        task.dock_section = Some(section);
        task
    }

    #[test]
    fn todo_moves_in_place() {
        let now = fixed_now();
        let task = dock_item(DockSection::Todo);
        let day = DateKey::parse("2026-02-19").expect("valid key");

        let placement = place_on_day(&task, day, Some(9), now, CAIRO).expect("placement");
        let mut tasks = vec![task.clone()];
        apply_placement(&mut tasks, task.id, placement);

        assert_eq!(tasks.len(), 1);
        let ts = tasks[0].scheduled_time.expect("scheduled");
        assert_eq!(DateKey::from_instant(ts, CAIRO), day);
        assert_eq!(ts.with_timezone(&CAIRO).time().to_string(), "09:00:00");
    }

    #[test]
    fn routine_clones_and_keeps_definition() {
        let now = fixed_now();
        let task = dock_item(DockSection::Routine);
        let day = DateKey::parse("2026-02-19").expect("valid key");

        let placement = place_on_day(&task, day, None, now, CAIRO).expect("placement");
        let mut tasks = vec![task.clone()];
        apply_placement(&mut tasks, task.id, placement);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].scheduled_time, None, "definition stays docked");
        assert!(tasks[1].scheduled_time.is_some());
        assert_eq!(tasks[1].title, task.title);
        assert_ne!(tasks[1].id, task.id);
    }

    #[test]
    fn project_spawns_session_child() {
        let now = fixed_now();
        let task = dock_item(DockSection::Project);
        let day = DateKey::parse("2026-02-19").expect("valid key");

        let placement = place_on_day(&task, day, Some(14), now, CAIRO).expect("placement");
        let Placement::SpawnSession { child } = &placement else {
            panic!("expected session child, got {placement:?}");
        };
        assert_eq!(child.title, "Deep work session");
        assert_eq!(child.parent_project, Some(task.id));
    }

    #[test]
    fn template_expands_per_step() {
        let now = fixed_now();
        let mut task = dock_item(DockSection::Template);
        task.template_steps = vec!["warmup".to_string(), "main set".to_string()];
        let day = DateKey::parse("2026-02-19").expect("valid key");

        let placement = place_on_day(&task, day, None, now, CAIRO).expect("placement");
        let mut tasks = vec![task.clone()];
        apply_placement(&mut tasks, task.id, placement);

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1].title, "warmup");
        assert_eq!(tasks[2].title, "main set");
        assert!(tasks[1..].iter().all(|t| t.parent_project == Some(task.id)));
    }

    #[test]
    fn habit_marks_tracking_map_only() {
        let now = fixed_now();
        let task = dock_item(DockSection::Habit);
        let day = DateKey::parse("2026-02-19").expect("valid key");

        let placement = place_on_day(&task, day, Some(7), now, CAIRO).expect("placement");
        let mut tasks = vec![task.clone()];
        apply_placement(&mut tasks, task.id, placement);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].scheduled_time, None);
        assert_eq!(tasks[0].habit_tracking.get(&day), Some(&true));
    }

    #[test]
    fn habit_placement_toggles_on_repeat() {
        let now = fixed_now();
        let task = dock_item(DockSection::Habit);
        let day = DateKey::parse("2026-02-19").expect("valid key");
        let mut tasks = vec![task.clone()];

        let placement = place_on_day(&task, day, None, now, CAIRO).expect("placement");
        apply_placement(&mut tasks, task.id, placement.clone());
        assert_eq!(tasks[0].habit_tracking.get(&day), Some(&true));

        // Placing the same habit on the same day again unmarks it.
        apply_placement(&mut tasks, task.id, placement);
        assert_eq!(tasks[0].habit_tracking.get(&day), Some(&false));
    }

    #[test]
    fn out_of_range_hour_is_an_error() {
        let now = fixed_now();
        let task = dock_item(DockSection::Todo);
        let day = DateKey::parse("2026-02-19").expect("valid key");
        assert!(place_on_day(&task, day, Some(24), now, CAIRO).is_err());
    }
}
