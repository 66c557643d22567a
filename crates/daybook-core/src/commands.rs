use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assistant::{self, ChatMessage};
use crate::chain::{chain_stats, derive_chain};
use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datekey::{DateKey, local_instant};
use crate::grid::{WeekStart, month_grid, week_days, weekday_short_key};
use crate::placement::scheduled_instant;
use crate::prayer::{Coordinates, PrayerTimeSource};
use crate::projection::{dock_sections, missed_tasks, project_day, slot_tasks};
use crate::quickadd::parse_quick_add;
use crate::render::{Renderer, short_id};
use crate::state::{
    AddOptions, AppState, ChallengeDayStatus, Command, DayMetaPatch, TimeBlock, WeeklyActivity,
    apply,
};
use crate::task::{Category, DockSection, Slot, Status, Task, TaskPatch};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "day",
        "week",
        "month",
        "slots",
        "dock",
        "place",
        "done",
        "delete",
        "update",
        "focus",
        "note",
        "block",
        "protocol",
        "activity",
        "chain",
        "challenge",
        "clear-day",
        "assist",
        "config",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    // The single wall-clock read; everything downstream takes `now`
    // explicitly so derivations stay pure.
    let now = Utc::now();
    let command = inv.command.as_str();

    debug!(command, args = ?inv.args, "dispatching command");

    match command {
        "add" => cmd_add(store, cfg, &inv.args, now),
        "list" => cmd_list(store, cfg, renderer),
        "day" => cmd_day(store, cfg, renderer, &inv.args, now),
        "week" => cmd_week(store, cfg, renderer, &inv.args, now),
        "month" => cmd_month(store, cfg, renderer, &inv.args, now),
        "slots" => cmd_slots(store, cfg, renderer, &inv.args),
        "dock" => cmd_dock(store, renderer),
        "place" => cmd_place(store, cfg, &inv.args, now),
        "done" => cmd_done(store, cfg, &inv.args, now),
        "delete" => cmd_delete(store, cfg, &inv.args, now),
        "update" => cmd_update(store, cfg, &inv.args, now),
        "focus" => cmd_focus(store, cfg, &inv.args, now),
        "note" => cmd_note(store, cfg, &inv.args, now),
        "block" => cmd_block(store, cfg, &inv.args, now),
        "protocol" => cmd_protocol(store, cfg, renderer, &inv.args, now),
        "activity" => cmd_activity(store, cfg, &inv.args, now),
        "chain" => cmd_chain(store, cfg, renderer, now),
        "challenge" => cmd_challenge(store, cfg, &inv.args, now),
        "clear-day" => cmd_clear_day(store, cfg, &inv.args, now),
        "assist" => cmd_assist(cfg, &inv.args),
        "config" => cmd_config(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!(
            "unknown command: {other} (known: {})",
            known_command_names().join(", ")
        )),
    }
}

fn mutate(
    store: &DataStore,
    cfg: &Config,
    state: &AppState,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<AppState> {
    let next = apply(state, command, now, cfg.timezone);
    store.save(&next)?;
    Ok(next)
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_add(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let mut category = Category::Personal;
    let mut dock_section: Option<DockSection> = None;
    let mut free_text: Vec<&str> = Vec::new();

    for arg in args {
        if let Some(value) = arg.strip_prefix("cat:") {
            category = value.parse()?;
        } else if let Some(value) = arg.strip_prefix("dock:") {
            dock_section = Some(value.parse()?);
        } else {
            free_text.push(arg);
        }
    }

    let today = DateKey::today(now, cfg.timezone);
    let week = week_days(today, cfg.day_board_week_start, now, cfg.timezone);
    let parsed = parse_quick_add(&free_text.join(" "), &week);

    if parsed.text.is_empty() {
        return Err(anyhow!("add requires task text"));
    }

    let scheduled_time = parsed
        .day_index
        .and_then(|idx| week.get(idx))
        .map(|day| scheduled_instant(day.key, None, cfg.timezone))
        .transpose()?;

    let state = store.load()?;
    let next = mutate(
        store,
        cfg,
        &state,
        Command::AddTask {
            title: parsed.text.clone(),
            category,
            impact: parsed.impact,
            options: AddOptions {
                scheduled_time,
                dock_section,
                ..AddOptions::default()
            },
        },
        now,
    )?;

    let created = next
        .tasks
        .last()
        .ok_or_else(|| anyhow!("task list empty after add"))?;
    println!("Created task {}.", short_id(created));
    Ok(())
}

#[instrument(skip(store, cfg, renderer))]
fn cmd_list(store: &DataStore, cfg: &Config, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command list");

    let state = store.load()?;
    let mut rows: Vec<Task> = state
        .tasks
        .iter()
        .filter(|t| t.status != Status::Done)
        .cloned()
        .collect();
    rows.sort_by_key(|t| (t.scheduled_time.is_none(), t.scheduled_time, t.created_at));

    renderer.print_task_table(&rows, cfg.timezone)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_day(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command day");

    let state = store.load()?;
    let tz = cfg.timezone;
    let day = parse_day_arg(args.first(), now, tz)?;
    let today = DateKey::today(now, tz);

    let projection = project_day(&state.tasks, day, tz);
    let missed = if day == today {
        missed_tasks(&state.tasks, now, tz)
    } else {
        vec![]
    };

    let prayer_day = cfg.prayer_source().and_then(|source| {
        let coords = cfg.coordinates.unwrap_or(Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        });
        match source.times_for(coords, day) {
            Ok(times) => Some(times),
            Err(err) => {
                warn!(error = %err, "prayer source failed; omitting times");
                None
            }
        }
    });

    renderer.print_day(
        day,
        &projection,
        &missed,
        state.day_meta.get(&day),
        state.sticky_notes.get(&day).map(String::as_str),
        state.time_blocks.get(&day).map(Vec::as_slice).unwrap_or(&[]),
        prayer_day.as_ref(),
        tz,
    )?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_week(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command week");

    let tz = cfg.timezone;
    let (week_start, reference) = parse_week_args(args, cfg.day_board_week_start, now, tz)?;

    let state = store.load()?;
    let week = week_days(reference, week_start, now, tz);
    renderer.print_week(&week, &state.tasks, tz)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_month(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command month");

    let offset: i32 = match args.first() {
        Some(raw) => raw.parse().context("month offset must be an integer")?,
        None => 0,
    };

    let state = store.load()?;
    let anchor = DateKey::today(now, cfg.timezone);
    let grid = month_grid(
        anchor,
        offset,
        cfg.slot_board_week_start,
        now,
        cfg.timezone,
        &state,
    );
    renderer.print_month(&grid)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_slots(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command slots");

    let [day_raw, label] = args else {
        return Err(anyhow!("usage: slots <weekday> <hour label>"));
    };
    let weekday = parse_weekday(day_raw)?;

    let state = store.load()?;
    let hits = slot_tasks(&state.tasks, weekday, label);
    if hits.is_empty() {
        println!("No tasks in that slot.");
        return Ok(());
    }
    renderer.print_task_table(&hits, cfg.timezone)?;
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_dock(store: &DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command dock");

    let state = store.load()?;
    let sections = dock_sections(&state.tasks);
    if sections.is_empty() {
        println!("Dock is empty.");
        return Ok(());
    }
    renderer.print_dock(&sections)?;
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_place(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command place");

    let [id_raw, date_raw, rest @ ..] = args else {
        return Err(anyhow!("usage: place <id> <date> [hour]"));
    };
    let hour = rest
        .first()
        .map(|raw| raw.parse::<u32>().context("hour must be 0-23"))
        .transpose()?;

    let state = store.load()?;
    let id = resolve_task_id(&state, id_raw)?;
    let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;

    mutate(
        store,
        cfg,
        &state,
        Command::PlaceDockItem { id, date_key, hour },
        now,
    )?;
    println!("Placed {} on {date_key}.", &id_raw);
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_done(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command done");

    let id_raw = args.first().ok_or_else(|| anyhow!("usage: done <id>"))?;
    let state = store.load()?;
    let id = resolve_task_id(&state, id_raw)?;

    mutate(
        store,
        cfg,
        &state,
        Command::UpdateTask {
            id,
            patch: TaskPatch {
                status: Some(Status::Done),
                ..TaskPatch::default()
            },
        },
        now,
    )?;
    println!("Completed task {id_raw}.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_delete(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command delete");

    let id_raw = args.first().ok_or_else(|| anyhow!("usage: delete <id>"))?;
    let state = store.load()?;
    let id = resolve_task_id(&state, id_raw)?;

    mutate(store, cfg, &state, Command::DeleteTask { id }, now)?;
    println!("Deleted task {id_raw}.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_update(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command update");

    let [id_raw, mods @ ..] = args else {
        return Err(anyhow!("usage: update <id> key:value..."));
    };
    if mods.is_empty() {
        return Err(anyhow!("update requires at least one key:value modifier"));
    }

    let state = store.load()?;
    let id = resolve_task_id(&state, id_raw)?;
    let patch = parse_task_mods(mods, now, cfg.timezone)?;

    mutate(store, cfg, &state, Command::UpdateTask { id, patch }, now)?;
    println!("Updated task {id_raw}.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_focus(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command focus");

    let [date_raw, text @ ..] = args else {
        return Err(anyhow!("usage: focus <date> <text>"));
    };
    let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;

    let state = store.load()?;
    mutate(
        store,
        cfg,
        &state,
        Command::UpdateDayMeta {
            date_key,
            patch: DayMetaPatch {
                focus: Some(text.join(" ")),
                ..DayMetaPatch::default()
            },
        },
        now,
    )?;
    println!("Focus set for {date_key}.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_note(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command note");

    let [date_raw, text @ ..] = args else {
        return Err(anyhow!("usage: note <date> <text>"));
    };
    let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;

    let state = store.load()?;
    mutate(
        store,
        cfg,
        &state,
        Command::UpdateStickyNote {
            date_key,
            text: text.join(" "),
        },
        now,
    )?;
    println!("Note saved for {date_key}.");
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_block(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command block");

    let state = store.load()?;

    match args.split_first() {
        Some((sub, [date_raw, start_raw, end_raw, label @ ..]))
            if sub == "add" && !label.is_empty() =>
        {
            let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;
            let start_minute = parse_day_minute(start_raw)?;
            let end_minute = parse_day_minute(end_raw)?;
            if end_minute <= start_minute {
                return Err(anyhow!("block must end after it starts"));
            }

            mutate(
                store,
                cfg,
                &state,
                Command::AddTimeBlock {
                    date_key,
                    block: TimeBlock {
                        id: Uuid::new_v4(),
                        label: label.join(" "),
                        start_minute,
                        end_minute,
                        color: None,
                    },
                },
                now,
            )?;
            println!("Block added to {date_key}.");
            Ok(())
        }
        Some((sub, [date_raw, block_raw])) if sub == "remove" => {
            let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;
            let block_id = resolve_time_block(&state, date_key, block_raw)?;

            mutate(
                store,
                cfg,
                &state,
                Command::RemoveTimeBlock { date_key, block_id },
                now,
            )?;
            println!("Block removed from {date_key}.");
            Ok(())
        }
        _ => Err(anyhow!(
            "usage: block add <date> <start HH:MM> <end HH:MM> <label> | block remove <date> <block>"
        )),
    }
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_protocol(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command protocol");

    let state = store.load()?;
    let tz = cfg.timezone;

    match args.split_first() {
        Some((sub, rest)) if sub == "add" => {
            let [context_name, label @ ..] = rest else {
                return Err(anyhow!("usage: protocol add <context> <item label>"));
            };
            if label.is_empty() {
                return Err(anyhow!("protocol add requires an item label"));
            }

            mutate(
                store,
                cfg,
                &state,
                Command::AddProtocolItem {
                    context_name: context_name.clone(),
                    label: label.join(" "),
                },
                now,
            )?;
            println!("Added protocol item to {context_name}.");
            Ok(())
        }
        Some((sub, rest)) if sub == "toggle" => {
            let [date_raw, item_raw] = rest else {
                return Err(anyhow!("usage: protocol toggle <date> <item>"));
            };
            let date_key = parse_day_arg(Some(date_raw), now, tz)?;
            let item_id = resolve_protocol_item(&state, item_raw)?;

            mutate(
                store,
                cfg,
                &state,
                Command::ToggleProtocolItem { date_key, item_id },
                now,
            )?;
            println!("Toggled protocol item for {date_key}.");
            Ok(())
        }
        Some((date_raw, [])) => {
            let date_key = parse_day_arg(Some(date_raw), now, tz)?;
            print_protocol_for(renderer, &state, date_key)
        }
        None => {
            let date_key = DateKey::today(now, tz);
            print_protocol_for(renderer, &state, date_key)
        }
        Some(_) => Err(anyhow!(
            "usage: protocol [date] | protocol add <context> <label> | protocol toggle <date> <item>"
        )),
    }
}

fn print_protocol_for(
    renderer: &mut Renderer,
    state: &AppState,
    date_key: DateKey,
) -> anyhow::Result<()> {
    let empty: Vec<WeeklyActivity> = vec![];
    let activities = state
        .weekly_activities
        .get(weekday_short_key(date_key.weekday()))
        .unwrap_or(&empty);
    renderer.print_protocol(
        date_key,
        &state.protocols,
        activities,
        state.daily_protocol.get(&date_key),
    )
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_activity(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command activity");

    match args.split_first() {
        Some((sub, [day_raw, text @ ..])) if sub == "add" && !text.is_empty() => {
            let short_key = weekday_short_key(parse_weekday(day_raw)?);
            let state = store.load()?;

            mutate(
                store,
                cfg,
                &state,
                Command::AddWeeklyActivity {
                    weekday_key: short_key.to_string(),
                    text: text.join(" "),
                },
                now,
            )?;
            println!("Added weekly activity on {short_key}.");
            Ok(())
        }
        Some((sub, [date_raw, activity_raw])) if sub == "toggle" => {
            let state = store.load()?;
            let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;
            let activity_id = resolve_activity(&state, date_key, activity_raw)?;

            mutate(
                store,
                cfg,
                &state,
                Command::ToggleWeeklyActivity {
                    date_key,
                    activity_id,
                },
                now,
            )?;
            println!("Toggled weekly activity for {date_key}.");
            Ok(())
        }
        _ => Err(anyhow!(
            "usage: activity add <sun..sat> <text> | activity toggle <date> <activity>"
        )),
    }
}

#[instrument(skip(store, cfg, renderer, now))]
fn cmd_chain(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command chain");

    let state = store.load()?;
    let challenge = state
        .challenge
        .as_ref()
        .ok_or_else(|| anyhow!("no active challenge; run: challenge start <days>"))?;

    let chain = derive_chain(challenge, now, cfg.timezone);
    let stats = chain_stats(challenge, &chain);
    renderer.print_chain(&chain, &stats, challenge)?;
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_challenge(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command challenge");

    let state = store.load()?;

    match args.split_first() {
        Some((sub, rest)) if sub == "start" => {
            let duration_days: u32 = rest
                .first()
                .ok_or_else(|| anyhow!("usage: challenge start <days> [rules...]"))?
                .parse()
                .context("duration must be a positive integer")?;
            let rules: Vec<String> = rest[1..].to_vec();

            mutate(
                store,
                cfg,
                &state,
                Command::SetChallenge {
                    start_date: now,
                    duration_days,
                    rules,
                },
                now,
            )?;
            println!("Challenge started: {duration_days} days.");
            Ok(())
        }
        Some((sub, [date_raw, status_raw])) if sub == "record" => {
            if state.challenge.is_none() {
                return Err(anyhow!("no active challenge"));
            }
            let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;
            let status: ChallengeDayStatus = status_raw.parse()?;

            mutate(
                store,
                cfg,
                &state,
                Command::RecordChallengeDay {
                    date_key,
                    status,
                    completed_rules: vec![],
                },
                now,
            )?;
            println!("Recorded {date_key}.");
            Ok(())
        }
        Some((sub, [])) if sub == "accept-failure" => {
            if state.challenge.is_none() {
                return Err(anyhow!("no active challenge"));
            }
            mutate(store, cfg, &state, Command::AcceptChallengeFailure, now)?;
            println!("Challenge marked failed.");
            Ok(())
        }
        _ => Err(anyhow!(
            "usage: challenge start <days> [rules...] | challenge record <date> <status> | challenge accept-failure"
        )),
    }
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_clear_day(
    store: &DataStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command clear-day");

    let date_raw = args
        .first()
        .ok_or_else(|| anyhow!("usage: clear-day <date>"))?;
    let date_key = parse_day_arg(Some(date_raw), now, cfg.timezone)?;

    let state = store.load()?;
    mutate(store, cfg, &state, Command::ClearDay { date_key }, now)?;
    println!("Cleared day data for {date_key}.");
    Ok(())
}

#[instrument(skip(cfg, args))]
fn cmd_assist(cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    info!("command assist");

    if args.is_empty() {
        return Err(anyhow!("usage: assist <prompt>"));
    }
    let reply = assistant::complete(cfg, vec![ChatMessage::user(args.join(" "))])?;
    println!("{reply}");
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    println!("timezone          {}", cfg.timezone);
    println!(
        "config file       {}",
        cfg.loaded_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string())
    );
    println!("day board weeks   {:?}", cfg.day_board_week_start);
    println!("slot board weeks  {:?}", cfg.slot_board_week_start);
    println!(
        "prayer schedule   {}",
        if cfg.prayer_schedule.is_some() {
            "configured"
        } else {
            "-"
        }
    );
    println!("assistant model   {}", cfg.assistant.model);
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("daybook commands:");
    println!("  add <text>                quick-add (@day targets, ! raises impact)");
    println!("  list                      open tasks");
    println!("  day [date]                day view (inbox, scheduled, missed)");
    println!("  week [date] [start:...]   week board");
    println!("  month [offset]            month grid");
    println!("  slots <weekday> <label>   slot-board cell occupants");
    println!("  dock                      unscheduled pool by section");
    println!("  place <id> <date> [hour]  place a dock item onto a day");
    println!("  done|delete <id>");
    println!("  update <id> key:value...  title/status/impact/cat/when/slot/notes/urgent");
    println!("  focus <date> <text>       set the day's focus line");
    println!("  note <date> <text>        sticky note");
    println!("  block add|remove ...      timeline blocks for a day");
    println!("  protocol [...]            show/add/toggle protocol checklists");
    println!("  activity [...]            weekly activities");
    println!("  chain | challenge ...     challenge tracker");
    println!("  clear-day <date>          reset a day's metadata");
    println!("  assist <prompt>           ask the assistant");
    Ok(())
}

/// `today`, `tomorrow`, `yesterday`, or a `YYYY-MM-DD` key.
fn parse_day_arg(
    raw: Option<&String>,
    now: DateTime<Utc>,
    tz: Tz,
) -> anyhow::Result<DateKey> {
    let today = DateKey::today(now, tz);
    match raw.map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(today),
        Some(token) => match token.as_str() {
            "today" => Ok(today),
            "tomorrow" => Ok(today.shift(1)),
            "yesterday" => Ok(today.shift(-1)),
            _ => DateKey::parse(&token),
        },
    }
}

/// Week view arguments: an optional date (keywords accepted, same as
/// every other date argument) and an optional `start:` override.
fn parse_week_args(
    args: &[String],
    default_start: WeekStart,
    now: DateTime<Utc>,
    tz: Tz,
) -> anyhow::Result<(WeekStart, DateKey)> {
    let mut week_start = default_start;
    let mut reference = DateKey::today(now, tz);

    for arg in args {
        if let Some(value) = arg.strip_prefix("start:") {
            week_start = value.parse::<WeekStart>()?;
        } else {
            reference = parse_day_arg(Some(arg), now, tz)?;
        }
    }

    Ok((week_start, reference))
}

fn parse_task_mods(
    mods: &[String],
    now: DateTime<Utc>,
    tz: Tz,
) -> anyhow::Result<TaskPatch> {
    let mut patch = TaskPatch::default();

    for raw in mods {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("expected key:value, got {raw:?}"))?;
        match key {
            "title" => patch.title = Some(value.to_string()),
            "status" => patch.status = Some(value.parse()?),
            "impact" => patch.impact = Some(value.parse()?),
            "cat" | "category" => patch.category = Some(value.parse()?),
            "notes" => {
                patch.notes = Some(if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                });
            }
            "urgent" => {
                patch.urgent = Some(matches!(value, "1" | "true" | "yes" | "on"));
            }
            "dock" => {
                patch.dock_section = Some(if value == "none" {
                    None
                } else {
                    Some(value.parse()?)
                });
            }
            "slot" => {
                patch.slot = Some(if value == "none" {
                    None
                } else {
                    Some(parse_slot(value)?)
                });
            }
            "duration" => {
                patch.duration_minutes = Some(if value == "none" {
                    None
                } else {
                    Some(value.parse().context("duration must be minutes")?)
                });
            }
            "when" => patch.scheduled_time = Some(parse_when(value, now, tz)?),
            "deadline" => patch.deadline = Some(parse_when(value, now, tz)?),
            other => return Err(anyhow!("unknown modifier: {other}")),
        }
    }

    Ok(patch)
}

/// `none` clears; `<date>` schedules at the inbox sentinel; `<date>@H`
/// or `<date>@H:MM` schedules at a concrete local time.
fn parse_when(
    value: &str,
    now: DateTime<Utc>,
    tz: Tz,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    if value == "none" {
        return Ok(None);
    }

    let (date_part, time_part) = match value.split_once('@') {
        Some((d, t)) => (d, Some(t)),
        None => (value, None),
    };
    let date_key = parse_day_arg(Some(&date_part.to_string()), now, tz)?;

    let instant = match time_part {
        None => scheduled_instant(date_key, None, tz)?,
        Some(raw) => {
            let time = if raw.contains(':') {
                NaiveTime::parse_from_str(raw, "%H:%M")
                    .with_context(|| format!("invalid time {raw:?}, expected H:MM"))?
            } else {
                let hour: u32 = raw.parse().context("invalid hour")?;
                NaiveTime::from_hms_opt(hour, 0, 0)
                    .ok_or_else(|| anyhow!("hour out of range: {hour}"))?
            };
            local_instant(date_key, time, tz)?
        }
    };
    Ok(Some(instant))
}

/// Resolve a task by unique id prefix.
fn resolve_task_id(state: &AppState, raw: &str) -> anyhow::Result<Uuid> {
    let needle = raw.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Err(anyhow!("empty task id"));
    }

    let mut hits = state
        .tasks
        .iter()
        .filter(|t| t.id.to_string().starts_with(&needle));
    let first = hits
        .next()
        .ok_or_else(|| anyhow!("no task matching id {raw:?}"))?;
    if hits.next().is_some() {
        return Err(anyhow!("ambiguous task id {raw:?}"));
    }
    Ok(first.id)
}

/// Resolve a protocol item by id prefix or exact label.
fn resolve_protocol_item(state: &AppState, raw: &str) -> anyhow::Result<String> {
    let needle = raw.trim().to_ascii_lowercase();
    let mut hits = state
        .protocols
        .iter()
        .flat_map(|p| p.items.iter())
        .filter(|item| {
            item.id.to_string().starts_with(&needle)
                || item.label.eq_ignore_ascii_case(raw.trim())
        });

    let first = hits
        .next()
        .ok_or_else(|| anyhow!("no protocol item matching {raw:?}"))?;
    if hits.next().is_some() {
        return Err(anyhow!("ambiguous protocol item {raw:?}"));
    }
    Ok(first.id.to_string())
}

/// Resolve a weekly activity on the date's weekday by id prefix or text.
fn resolve_activity(state: &AppState, date_key: DateKey, raw: &str) -> anyhow::Result<String> {
    let needle = raw.trim().to_ascii_lowercase();
    let short_key = weekday_short_key(date_key.weekday());
    let empty: Vec<WeeklyActivity> = vec![];
    let activities = state.weekly_activities.get(short_key).unwrap_or(&empty);

    let mut hits = activities.iter().filter(|a| {
        a.id.to_string().starts_with(&needle) || a.text.eq_ignore_ascii_case(raw.trim())
    });
    let first = hits
        .next()
        .ok_or_else(|| anyhow!("no weekly activity matching {raw:?} on {short_key}"))?;
    if hits.next().is_some() {
        return Err(anyhow!("ambiguous weekly activity {raw:?}"));
    }
    Ok(first.id.to_string())
}

fn parse_weekday(raw: &str) -> anyhow::Result<Weekday> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sun" | "sunday" => Ok(Weekday::Sun),
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        other => Err(anyhow!("unknown weekday: {other}")),
    }
}

/// `<weekday>@<hour label>` as used by the `slot:` modifier,
/// e.g. `wed@morning`.
fn parse_slot(value: &str) -> anyhow::Result<Slot> {
    let (day_raw, label) = value
        .split_once('@')
        .ok_or_else(|| anyhow!("expected weekday@label, got {value:?}"))?;
    if label.is_empty() {
        return Err(anyhow!("slot label must not be empty"));
    }
    Ok(Slot {
        weekday: parse_weekday(day_raw)?,
        hour_label: label.to_string(),
    })
}

/// Wall `HH:MM` to minutes since local midnight.
fn parse_day_minute(raw: &str) -> anyhow::Result<u16> {
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("invalid time {raw:?}, expected HH:MM"))?;
    Ok((time.hour() * 60 + time.minute()) as u16)
}

/// Resolve a time block on `date_key` by id prefix or exact label.
fn resolve_time_block(state: &AppState, date_key: DateKey, raw: &str) -> anyhow::Result<Uuid> {
    let needle = raw.trim().to_ascii_lowercase();
    let empty: Vec<TimeBlock> = vec![];
    let blocks = state.time_blocks.get(&date_key).unwrap_or(&empty);

    let mut hits = blocks.iter().filter(|b| {
        b.id.to_string().starts_with(&needle) || b.label.eq_ignore_ascii_case(raw.trim())
    });
    let first = hits
        .next()
        .ok_or_else(|| anyhow!("no time block matching {raw:?} on {date_key}"))?;
    if hits.next().is_some() {
        return Err(anyhow!("ambiguous time block {raw:?}"));
    }
    Ok(first.id)
}

#[cfg(test)]
mod tests {
    use super::{
        expand_command_abbrev, known_command_names, parse_day_arg, parse_day_minute,
        parse_task_mods, parse_week_args,
    };
    use crate::grid::WeekStart;
    use chrono::{TimeZone, Utc, Weekday};
    use chrono_tz::Tz;

    const CAIRO: Tz = chrono_tz::Africa::Cairo;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn abbreviations_expand_when_unambiguous() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("mo", &known), Some("month"));
        assert_eq!(expand_command_abbrev("li", &known), Some("list"));
        // "d" matches day/dock/done/delete.
        assert_eq!(expand_command_abbrev("d", &known), None);
    }

    #[test]
    fn day_arg_keywords_and_keys() {
        let now = fixed_now();
        assert_eq!(
            parse_day_arg(None, now, CAIRO).expect("today").to_string(),
            "2026-02-18"
        );
        assert_eq!(
            parse_day_arg(Some(&"tomorrow".to_string()), now, CAIRO)
                .expect("tomorrow")
                .to_string(),
            "2026-02-19"
        );
        assert!(parse_day_arg(Some(&"not-a-date".to_string()), now, CAIRO).is_err());
    }

    #[test]
    fn when_modifier_round_trips_through_local_time() {
        let now = fixed_now();
        let patch = parse_task_mods(&["when:2026-02-20@14:30".to_string()], now, CAIRO)
            .expect("parse mods");
        let ts = patch
            .scheduled_time
            .expect("set")
            .expect("not cleared");
        assert_eq!(
            ts.with_timezone(&CAIRO).format("%Y-%m-%d %H:%M").to_string(),
            "2026-02-20 14:30"
        );

        let patch =
            parse_task_mods(&["when:none".to_string()], now, CAIRO).expect("parse mods");
        assert_eq!(patch.scheduled_time, Some(None));
    }

    #[test]
    fn unknown_modifier_is_rejected() {
        let now = fixed_now();
        assert!(parse_task_mods(&["sparkle:yes".to_string()], now, CAIRO).is_err());
    }

    #[test]
    fn week_args_accept_keywords_and_start_override() {
        let now = fixed_now();

        let (start, reference) = parse_week_args(
            &["tomorrow".to_string(), "start:saturday".to_string()],
            WeekStart::Monday,
            now,
            CAIRO,
        )
        .expect("parse week args");
        assert_eq!(start, WeekStart::Saturday);
        assert_eq!(reference.to_string(), "2026-02-19");

        let (start, reference) =
            parse_week_args(&[], WeekStart::Monday, now, CAIRO).expect("parse week args");
        assert_eq!(start, WeekStart::Monday);
        assert_eq!(reference.to_string(), "2026-02-18");
    }

    #[test]
    fn slot_modifier_sets_and_clears() {
        let now = fixed_now();

        let patch = parse_task_mods(&["slot:wed@morning".to_string()], now, CAIRO)
            .expect("parse mods");
        let slot = patch.slot.expect("set").expect("not cleared");
        assert_eq!(slot.weekday, Weekday::Wed);
        assert_eq!(slot.hour_label, "morning");

        let patch =
            parse_task_mods(&["slot:none".to_string()], now, CAIRO).expect("parse mods");
        assert_eq!(patch.slot, Some(None));

        assert!(parse_task_mods(&["slot:wed".to_string()], now, CAIRO).is_err());
    }

    #[test]
    fn block_times_parse_to_day_minutes() {
        assert_eq!(parse_day_minute("09:30").expect("parse"), 570);
        assert_eq!(parse_day_minute("00:00").expect("parse"), 0);
        assert!(parse_day_minute("25:00").is_err());
        assert!(parse_day_minute("soonish").is_err());
    }
}
