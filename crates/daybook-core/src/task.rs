use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datekey::DateKey;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Backlog,
    Todo,
    InProgress,
    Done,
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backlog" => Ok(Self::Backlog),
            "todo" => Ok(Self::Todo),
            "in_progress" | "in-progress" | "doing" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Work,
    Personal,
    Health,
    Learning,
    Errands,
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "personal" => Ok(Self::Personal),
            "health" => Ok(Self::Health),
            "learning" => Ok(Self::Learning),
            "errands" | "errand" => Ok(Self::Errands),
            other => Err(anyhow!("unknown category: {other}")),
        }
    }
}

/// Severity of a task. Quick-add `!` markers raise this to `High`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Med,
    High,
}

impl FromStr for Impact {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "med" | "medium" => Ok(Self::Med),
            "high" => Ok(Self::High),
            other => Err(anyhow!("unknown impact: {other}")),
        }
    }
}

/// How a dock item behaves when placed onto a day. See
/// `placement::place_on_day` for the dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DockSection {
    Todo,
    Routine,
    Project,
    Habit,
    Later,
    Template,
}

impl FromStr for DockSection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "routine" => Ok(Self::Routine),
            "project" => Ok(Self::Project),
            "habit" => Ok(Self::Habit),
            "later" => Ok(Self::Later),
            "template" => Ok(Self::Template),
            other => Err(anyhow!("unknown dock section: {other}")),
        }
    }
}

/// Placement target on the alternate weekly board: a weekday plus an
/// hour label, distinct from an absolute `scheduled_time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub weekday: Weekday,
    pub hour_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    pub status: Status,

    pub category: Category,

    pub created_at: DateTime<Utc>,

    /// Absolute instant placing the task in a specific hour of a
    /// specific day. Exactly `INBOX_SENTINEL` local time means "this
    /// day, no specific hour".
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,

    /// Used by the weekly backlog board; independent of `scheduled_time`.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default)]
    pub slot: Option<Slot>,

    #[serde(default)]
    pub dock_section: Option<DockSection>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    /// Per-day completion map, meaningful when `dock_section == Habit`.
    #[serde(default)]
    pub habit_tracking: BTreeMap<DateKey, bool>,

    #[serde(default)]
    pub urgent: bool,

    pub impact: Impact,

    #[serde(default)]
    pub duration_minutes: Option<u32>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub parent_project: Option<Uuid>,

    /// Expansion list for `DockSection::Template` items.
    #[serde(default)]
    pub template_steps: Vec<String>,
}

impl Task {
    pub fn new(title: String, category: Category, impact: Impact, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            status: Status::Todo,
            category,
            created_at: now,
            scheduled_time: None,
            deadline: None,
            slot: None,
            dock_section: None,
            subtasks: vec![],
            habit_tracking: BTreeMap::new(),
            urgent: false,
            impact,
            duration_minutes: None,
            notes: None,
            parent_project: None,
            template_steps: vec![],
        }
    }
}

/// Partial-field update applied by `Command::UpdateTask`. Double-Option
/// fields distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub impact: Option<Impact>,
    pub urgent: Option<bool>,
    pub scheduled_time: Option<Option<DateTime<Utc>>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub slot: Option<Option<Slot>>,
    pub dock_section: Option<Option<DockSection>>,
    pub duration_minutes: Option<Option<u32>>,
    pub notes: Option<Option<String>>,
    pub subtasks: Option<Vec<Subtask>>,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(impact) = self.impact {
            task.impact = impact;
        }
        if let Some(urgent) = self.urgent {
            task.urgent = urgent;
        }
        if let Some(scheduled_time) = self.scheduled_time {
            task.scheduled_time = scheduled_time;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(slot) = &self.slot {
            task.slot = slot.clone();
        }
        if let Some(dock_section) = self.dock_section {
            task.dock_section = dock_section;
        }
        if let Some(duration_minutes) = self.duration_minutes {
            task.duration_minutes = duration_minutes;
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(subtasks) = &self.subtasks {
            task.subtasks = subtasks.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Category, Impact, Status, Task, TaskPatch};

    #[test]
    fn patch_only_touches_set_fields() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 16, 9, 0, 0)
            .single()
            .expect("valid now");
        let mut task = Task::new("Review plan".to_string(), Category::Work, Impact::Med, now);
        task.scheduled_time = Some(now);

        let patch = TaskPatch {
            status: Some(Status::Done),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.status, Status::Done);
        assert_eq!(task.scheduled_time, Some(now));
        assert_eq!(task.title, "Review plan");
    }

    #[test]
    fn patch_can_clear_placement() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 16, 9, 0, 0)
            .single()
            .expect("valid now");
        let mut task = Task::new("Gym".to_string(), Category::Health, Impact::Low, now);
        task.scheduled_time = Some(now);

        let patch = TaskPatch {
            scheduled_time: Some(None),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.scheduled_time, None);
    }
}
