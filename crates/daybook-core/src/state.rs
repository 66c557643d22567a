use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::datekey::DateKey;
use crate::placement::{apply_placement, place_on_day};
use crate::task::{Category, DockSection, Impact, Slot, Task, TaskPatch};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub label: String,
    #[serde(default)]
    pub done: bool,
}

/// Day-scoped metadata, created lazily on first write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayMeta {
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub rituals: BTreeMap<String, bool>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayMetaPatch {
    pub focus: Option<String>,
    pub rituals: Option<BTreeMap<String, bool>>,
    pub checklist: Option<Vec<ChecklistItem>>,
}

/// Time-ranged day annotation used by the timeline layouts; not a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlock {
    pub id: Uuid,
    pub label: String,
    pub start_minute: u16,
    pub end_minute: u16,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolItem {
    pub id: Uuid,
    pub label: String,
}

/// A named group of recurring every-day checklist items, e.g. "Morning".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolContext {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub items: Vec<ProtocolItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyActivity {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeDayStatus {
    Pending,
    Success,
    Failed,
    Frozen,
}

impl std::str::FromStr for ChallengeDayStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "frozen" => Ok(Self::Frozen),
            other => Err(anyhow::anyhow!("unknown challenge day status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeDayRecord {
    pub date: DateKey,
    pub status: ChallengeDayStatus,
    #[serde(default)]
    pub completed_rules: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeRule {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Failed,
}

/// A fixed-duration challenge. The chain view derives per-day display
/// status from `history`; only explicit user action mutates `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Challenge {
    pub start_date: DateTime<Utc>,
    pub duration_days: u32,
    #[serde(default)]
    pub rules: Vec<ChallengeRule>,
    pub status: ChallengeStatus,
    #[serde(default)]
    pub history: BTreeMap<DateKey, ChallengeDayRecord>,
}

/// The whole application snapshot: one process-wide object, persisted
/// as an opaque blob, mutated only through `apply`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub day_meta: BTreeMap<DateKey, DayMeta>,
    #[serde(default)]
    pub sticky_notes: BTreeMap<DateKey, String>,
    #[serde(default)]
    pub time_blocks: BTreeMap<DateKey, Vec<TimeBlock>>,
    #[serde(default)]
    pub protocols: Vec<ProtocolContext>,
    /// date-key -> item-id -> done. Weekly-activity completions share
    /// this map under a `weekly_` id prefix.
    #[serde(default)]
    pub daily_protocol: BTreeMap<DateKey, BTreeMap<String, bool>>,
    /// `sun`..`sat` -> recurring activities for that weekday.
    #[serde(default)]
    pub weekly_activities: BTreeMap<String, Vec<WeeklyActivity>>,
    #[serde(default)]
    pub challenge: Option<Challenge>,
}

impl AppState {
    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Optional placement fields carried by `Command::AddTask`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddOptions {
    pub scheduled_time: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub slot: Option<Slot>,
    pub dock_section: Option<DockSection>,
    pub urgent: bool,
    pub duration_minutes: Option<u32>,
    pub notes: Option<String>,
    pub parent_project: Option<Uuid>,
    pub template_steps: Vec<String>,
}

/// The closed set of mutation intents. Every write in the system is one
/// of these, applied as a pure snapshot transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddTask {
        title: String,
        category: Category,
        impact: Impact,
        options: AddOptions,
    },
    UpdateTask {
        id: Uuid,
        patch: TaskPatch,
    },
    DeleteTask {
        id: Uuid,
    },
    UpdateDayMeta {
        date_key: DateKey,
        patch: DayMetaPatch,
    },
    UpdateStickyNote {
        date_key: DateKey,
        text: String,
    },
    AddProtocolItem {
        context_name: String,
        label: String,
    },
    ToggleProtocolItem {
        date_key: DateKey,
        item_id: String,
    },
    AddWeeklyActivity {
        weekday_key: String,
        text: String,
    },
    ToggleWeeklyActivity {
        date_key: DateKey,
        activity_id: String,
    },
    PlaceDockItem {
        id: Uuid,
        date_key: DateKey,
        hour: Option<u32>,
    },
    ClearDay {
        date_key: DateKey,
    },
    AddTimeBlock {
        date_key: DateKey,
        block: TimeBlock,
    },
    RemoveTimeBlock {
        date_key: DateKey,
        block_id: Uuid,
    },
    SetChallenge {
        start_date: DateTime<Utc>,
        duration_days: u32,
        rules: Vec<String>,
    },
    RecordChallengeDay {
        date_key: DateKey,
        status: ChallengeDayStatus,
        completed_rules: Vec<Uuid>,
    },
    AcceptChallengeFailure,
}

/// Pure reducer: same snapshot, command, and `now` always produce the
/// same next snapshot. Commands aimed at missing entities are warn-level
/// no-ops, matching the original product's permissive updates.
pub fn apply(state: &AppState, command: Command, now: DateTime<Utc>, tz: Tz) -> AppState {
    let mut next = state.clone();

    match command {
        Command::AddTask {
            title,
            category,
            impact,
            options,
        } => {
            let mut task = Task::new(title, category, impact, now);
            task.scheduled_time = options.scheduled_time;
            task.deadline = options.deadline;
            task.slot = options.slot;
            task.dock_section = options.dock_section;
            task.urgent = options.urgent;
            task.duration_minutes = options.duration_minutes;
            task.notes = options.notes;
            task.parent_project = options.parent_project;
            task.template_steps = options.template_steps;
            debug!(id = %task.id, title = %task.title, "adding task");
            next.tasks.push(task);
        }
        Command::UpdateTask { id, patch } => match next.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => patch.apply_to(task),
            None => warn!(%id, "update for unknown task ignored"),
        },
        Command::DeleteTask { id } => {
            let before = next.tasks.len();
            next.tasks.retain(|t| t.id != id);
            if next.tasks.len() == before {
                warn!(%id, "delete for unknown task ignored");
            }
        }
        Command::UpdateDayMeta { date_key, patch } => {
            let meta = next.day_meta.entry(date_key).or_default();
            if let Some(focus) = patch.focus {
                meta.focus = focus;
            }
            if let Some(rituals) = patch.rituals {
                meta.rituals = rituals;
            }
            if let Some(checklist) = patch.checklist {
                meta.checklist = checklist;
            }
        }
        Command::UpdateStickyNote { date_key, text } => {
            if text.is_empty() {
                next.sticky_notes.remove(&date_key);
            } else {
                next.sticky_notes.insert(date_key, text);
            }
        }
        Command::AddProtocolItem {
            context_name,
            label,
        } => {
            // Contexts are created on first use, matched by name
            // case-insensitively.
            let idx = match next
                .protocols
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(&context_name))
            {
                Some(idx) => idx,
                None => {
                    next.protocols.push(ProtocolContext {
                        id: Uuid::new_v4(),
                        name: context_name,
                        icon: "*".to_string(),
                        items: vec![],
                    });
                    next.protocols.len() - 1
                }
            };
            if let Some(context) = next.protocols.get_mut(idx) {
                context.items.push(ProtocolItem {
                    id: Uuid::new_v4(),
                    label,
                });
            }
        }
        Command::ToggleProtocolItem { date_key, item_id } => {
            toggle_completion(&mut next, date_key, item_id);
        }
        Command::AddWeeklyActivity { weekday_key, text } => {
            next.weekly_activities
                .entry(weekday_key)
                .or_default()
                .push(WeeklyActivity {
                    id: Uuid::new_v4(),
                    text,
                });
        }
        Command::ToggleWeeklyActivity {
            date_key,
            activity_id,
        } => {
            // Weekly activities share the protocol completion map under
            // a namespaced key so the two item spaces cannot collide.
            toggle_completion(&mut next, date_key, format!("weekly_{activity_id}"));
        }
        Command::PlaceDockItem { id, date_key, hour } => {
            let Some(task) = next.task(id).cloned() else {
                warn!(%id, "placement of unknown task ignored");
                return next;
            };
            match place_on_day(&task, date_key, hour, now, tz) {
                Ok(placement) => apply_placement(&mut next.tasks, id, placement),
                Err(err) => warn!(%id, %date_key, error = %err, "placement rejected"),
            }
        }
        Command::ClearDay { date_key } => {
            next.day_meta.remove(&date_key);
            next.sticky_notes.remove(&date_key);
            next.time_blocks.remove(&date_key);
            next.daily_protocol.remove(&date_key);
        }
        Command::AddTimeBlock { date_key, block } => {
            let blocks = next.time_blocks.entry(date_key).or_default();
            blocks.push(block);
            blocks.sort_by_key(|b| b.start_minute);
        }
        Command::RemoveTimeBlock { date_key, block_id } => {
            if let Some(blocks) = next.time_blocks.get_mut(&date_key) {
                blocks.retain(|b| b.id != block_id);
                if blocks.is_empty() {
                    next.time_blocks.remove(&date_key);
                }
            }
        }
        Command::SetChallenge {
            start_date,
            duration_days,
            rules,
        } => {
            next.challenge = Some(Challenge {
                start_date,
                duration_days,
                rules: rules
                    .into_iter()
                    .map(|text| ChallengeRule {
                        id: Uuid::new_v4(),
                        text,
                    })
                    .collect(),
                status: ChallengeStatus::Active,
                history: BTreeMap::new(),
            });
        }
        Command::RecordChallengeDay {
            date_key,
            status,
            completed_rules,
        } => match next.challenge.as_mut() {
            Some(challenge) => {
                challenge.history.insert(
                    date_key,
                    ChallengeDayRecord {
                        date: date_key,
                        status,
                        completed_rules,
                    },
                );
            }
            None => warn!(%date_key, "challenge day record without an active challenge"),
        },
        Command::AcceptChallengeFailure => match next.challenge.as_mut() {
            Some(challenge) => challenge.status = ChallengeStatus::Failed,
            None => warn!("accept-failure without an active challenge"),
        },
    }

    next
}

fn toggle_completion(state: &mut AppState, date_key: DateKey, key: String) {
    let entries = state.daily_protocol.entry(date_key).or_default();
    let current = entries.get(&key).copied().unwrap_or(false);
    entries.insert(key, !current);
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;
    use uuid::Uuid;

    use super::{AddOptions, AppState, Command, DayMetaPatch, TimeBlock, apply};
    use crate::datekey::DateKey;
    use crate::task::{Category, Impact, Status, TaskPatch};

    const CAIRO: Tz = chrono_tz::Africa::Cairo;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    fn add_command(title: &str) -> Command {
        Command::AddTask {
            title: title.to_string(),
            category: Category::Work,
            impact: Impact::Med,
            options: AddOptions::default(),
        }
    }

    #[test]
    fn add_update_delete_round_trip() {
        let now = fixed_now();
        let state = AppState::default();

        let state = apply(&state, add_command("Write brief"), now, CAIRO);
        assert_eq!(state.tasks.len(), 1);
        let id = state.tasks[0].id;

        let patch = TaskPatch {
            status: Some(Status::Done),
            ..TaskPatch::default()
        };
        let state = apply(&state, Command::UpdateTask { id, patch }, now, CAIRO);
        assert_eq!(state.tasks[0].status, Status::Done);

        let state = apply(&state, Command::DeleteTask { id }, now, CAIRO);
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn reducer_never_mutates_its_input() {
        let now = fixed_now();
        let state = AppState::default();
        let snapshot = state.clone();

        let _ = apply(&state, add_command("ephemeral"), now, CAIRO);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn unknown_id_update_is_a_no_op() {
        let now = fixed_now();
        let state = apply(&AppState::default(), add_command("keep me"), now, CAIRO);

        let next = apply(
            &state,
            Command::UpdateTask {
                id: Uuid::new_v4(),
                patch: TaskPatch {
                    title: Some("hijack".to_string()),
                    ..TaskPatch::default()
                },
            },
            now,
            CAIRO,
        );
        assert_eq!(next, state);
    }

    #[test]
    fn weekly_toggle_is_namespaced_away_from_protocol_items() {
        let now = fixed_now();
        let day = DateKey::parse("2026-02-18").expect("valid key");
        let state = AppState::default();

        let state = apply(
            &state,
            Command::ToggleProtocolItem {
                date_key: day,
                item_id: "stretch".to_string(),
            },
            now,
            CAIRO,
        );
        let state = apply(
            &state,
            Command::ToggleWeeklyActivity {
                date_key: day,
                activity_id: "stretch".to_string(),
            },
            now,
            CAIRO,
        );

        let entries = state.daily_protocol.get(&day).expect("day entries");
        assert_eq!(entries.get("stretch"), Some(&true));
        assert_eq!(entries.get("weekly_stretch"), Some(&true));

        // Toggling again flips only the weekly entry.
        let state = apply(
            &state,
            Command::ToggleWeeklyActivity {
                date_key: day,
                activity_id: "stretch".to_string(),
            },
            now,
            CAIRO,
        );
        let entries = state.daily_protocol.get(&day).expect("day entries");
        assert_eq!(entries.get("stretch"), Some(&true));
        assert_eq!(entries.get("weekly_stretch"), Some(&false));
    }

    #[test]
    fn clear_day_resets_all_day_scoped_maps() {
        let now = fixed_now();
        let day = DateKey::parse("2026-02-18").expect("valid key");
        let state = AppState::default();

        let state = apply(
            &state,
            Command::UpdateDayMeta {
                date_key: day,
                patch: DayMetaPatch {
                    focus: Some("Ship it".to_string()),
                    ..DayMetaPatch::default()
                },
            },
            now,
            CAIRO,
        );
        let state = apply(
            &state,
            Command::UpdateStickyNote {
                date_key: day,
                text: "remember water".to_string(),
            },
            now,
            CAIRO,
        );
        assert!(state.day_meta.contains_key(&day));
        assert!(state.sticky_notes.contains_key(&day));

        let state = apply(&state, Command::ClearDay { date_key: day }, now, CAIRO);
        assert!(!state.day_meta.contains_key(&day));
        assert!(!state.sticky_notes.contains_key(&day));
    }

    #[test]
    fn protocol_items_and_activities_append_via_reducer() {
        let now = fixed_now();
        let state = AppState::default();

        let state = apply(
            &state,
            Command::AddProtocolItem {
                context_name: "Morning".to_string(),
                label: "stretch".to_string(),
            },
            now,
            CAIRO,
        );
        // Same context matched case-insensitively, no duplicate created.
        let state = apply(
            &state,
            Command::AddProtocolItem {
                context_name: "morning".to_string(),
                label: "hydrate".to_string(),
            },
            now,
            CAIRO,
        );
        assert_eq!(state.protocols.len(), 1);
        assert_eq!(state.protocols[0].items.len(), 2);
        assert_eq!(state.protocols[0].items[1].label, "hydrate");

        let state = apply(
            &state,
            Command::AddWeeklyActivity {
                weekday_key: "wed".to_string(),
                text: "swim".to_string(),
            },
            now,
            CAIRO,
        );
        let activities = state.weekly_activities.get("wed").expect("wed entries");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].text, "swim");
    }

    #[test]
    fn time_blocks_sort_on_add_and_remove_cleanly() {
        let now = fixed_now();
        let day = DateKey::parse("2026-02-18").expect("valid key");
        let block = |label: &str, start: u16| TimeBlock {
            id: Uuid::new_v4(),
            label: label.to_string(),
            start_minute: start,
            end_minute: start + 60,
            color: None,
        };

        let late = block("afternoon", 14 * 60);
        let early = block("morning", 9 * 60);
        let state = apply(
            &AppState::default(),
            Command::AddTimeBlock {
                date_key: day,
                block: late.clone(),
            },
            now,
            CAIRO,
        );
        let state = apply(
            &state,
            Command::AddTimeBlock {
                date_key: day,
                block: early.clone(),
            },
            now,
            CAIRO,
        );

        let blocks = state.time_blocks.get(&day).expect("day blocks");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label, "morning");
        assert_eq!(blocks[1].label, "afternoon");

        let state = apply(
            &state,
            Command::RemoveTimeBlock {
                date_key: day,
                block_id: early.id,
            },
            now,
            CAIRO,
        );
        assert_eq!(state.time_blocks.get(&day).map(Vec::len), Some(1));

        // Removing the last block drops the day entry entirely.
        let state = apply(
            &state,
            Command::RemoveTimeBlock {
                date_key: day,
                block_id: late.id,
            },
            now,
            CAIRO,
        );
        assert!(!state.time_blocks.contains_key(&day));
    }

    #[test]
    fn accept_failure_flips_challenge_status() {
        let now = fixed_now();
        let state = apply(
            &AppState::default(),
            Command::SetChallenge {
                start_date: now,
                duration_days: 30,
                rules: vec!["no sugar".to_string()],
            },
            now,
            CAIRO,
        );
        let state = apply(&state, Command::AcceptChallengeFailure, now, CAIRO);
        let challenge = state.challenge.expect("challenge");
        assert_eq!(challenge.status, super::ChallengeStatus::Failed);
        assert_eq!(challenge.rules.len(), 1);
    }
}
