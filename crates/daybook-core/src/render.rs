use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use chrono::Timelike;
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::chain::{ChainDay, ChainStats, ChainStatus};
use crate::config::Config;
use crate::datekey::DateKey;
use crate::grid::{MonthCell, WeekDay};
use crate::prayer::PrayerDay;
use crate::projection::DayProjection;
use crate::state::{Challenge, DayMeta, ProtocolContext, TimeBlock, WeeklyActivity};
use crate::task::{DockSection, Impact, Status, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color }
    }

    #[tracing::instrument(skip(self, tasks, tz))]
    pub fn print_task_table(&mut self, tasks: &[Task], tz: Tz) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Impact".to_string(),
            "Scheduled".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&short_id(task), "33");
            let scheduled = task
                .scheduled_time
                .map(|ts| {
                    ts.with_timezone(&tz)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                })
                .unwrap_or_default();
            let impact = impact_label(task.impact).to_string();
            let impact = if task.impact == Impact::High {
                self.paint(&impact, "31")
            } else {
                impact
            };

            rows.push(vec![
                id,
                status_label(task.status).to_string(),
                impact,
                scheduled,
                task.title.clone(),
            ]);
        }

        write_table(&mut out, &headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(day = %day))]
    #[allow(clippy::too_many_arguments)]
    pub fn print_day(
        &mut self,
        day: DateKey,
        projection: &DayProjection,
        missed: &[Task],
        meta: Option<&DayMeta>,
        sticky: Option<&str>,
        blocks: &[TimeBlock],
        prayer: Option<&PrayerDay>,
        tz: Tz,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(
            out,
            "{}",
            self.paint(&format!("{} ({})", day, day.naive().format("%A")), "1")
        )?;

        if let Some(meta) = meta
            && !meta.focus.is_empty()
        {
            writeln!(out, "focus: {}", meta.focus)?;
        }
        if let Some(text) = sticky {
            writeln!(out, "note:  {text}")?;
        }

        if let Some(prayer) = prayer {
            let line = prayer
                .times
                .iter()
                .map(|(name, ts)| {
                    format!("{} {}", name.label(), ts.with_timezone(&tz).format("%H:%M"))
                })
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(out, "{}", self.paint(&line, "36"))?;
        }

        for block in blocks {
            writeln!(
                out,
                "[{:02}:{:02}-{:02}:{:02}] {}",
                block.start_minute / 60,
                block.start_minute % 60,
                block.end_minute / 60,
                block.end_minute % 60,
                block.label
            )?;
        }

        if !projection.inbox.is_empty() {
            writeln!(out, "\ninbox:")?;
            for task in &projection.inbox {
                writeln!(out, "  {} {}", self.checkbox(task.status), task.title)?;
            }
        }

        if !projection.timed.is_empty() {
            writeln!(out, "\nscheduled:")?;
            for task in &projection.timed {
                let hour = task
                    .scheduled_time
                    .map(|ts| {
                        let local = ts.with_timezone(&tz);
                        format!("{:02}:{:02}", local.hour(), local.minute())
                    })
                    .unwrap_or_default();
                writeln!(
                    out,
                    "  {hour} {} {}",
                    self.checkbox(task.status),
                    task.title
                )?;
            }
        }

        if let Some(meta) = meta
            && !meta.checklist.is_empty()
        {
            writeln!(out, "\nchecklist:")?;
            for item in &meta.checklist {
                let mark = if item.done { "x" } else { " " };
                writeln!(out, "  [{mark}] {}", item.label)?;
            }
        }

        if !missed.is_empty() {
            writeln!(out, "\n{}", self.paint("missed:", "31"))?;
            for task in missed {
                let when = task
                    .scheduled_time
                    .map(|ts| ts.with_timezone(&tz).format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                writeln!(out, "  {when} {}", task.title)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, week, tasks, tz))]
    pub fn print_week(&mut self, week: &[WeekDay], tasks: &[Task], tz: Tz) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for day in week {
            let mut scheduled: Vec<&Task> = tasks
                .iter()
                .filter(|t| {
                    t.scheduled_time
                        .is_some_and(|ts| DateKey::from_instant(ts, tz) == day.key)
                })
                .collect();
            scheduled.sort_by_key(|t| (t.scheduled_time, t.created_at));

            let header = format!("{} {} {}", day.short_label, day.day_number, day.key);
            let header = if day.is_today {
                self.paint(&header, "1;33")
            } else {
                self.paint(&header, "1")
            };
            writeln!(out, "{header}")?;

            if scheduled.is_empty() {
                writeln!(out, "  -")?;
            }
            for task in scheduled {
                writeln!(out, "  {} {}", self.checkbox(task.status), task.title)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn print_month(&mut self, cells: &[MonthCell]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for row in cells.chunks(7) {
            let mut line = String::new();
            for cell in row {
                let mut label = format!("{:>2}", cell.day_number);
                if !cell.in_current_month {
                    label = self.paint(&label, "90");
                } else if cell.is_today {
                    label = self.paint(&label, "1;33");
                }

                let marks = format!(
                    "{}{}{}",
                    if cell.scheduled_count > 0 { "*" } else { " " },
                    if cell.completed_count > 0 { "+" } else { " " },
                    if cell.protocol_done_count > 0 { "." } else { " " },
                );
                line.push_str(&format!("{label}{marks} "));
            }
            writeln!(out, "{line}")?;
        }
        writeln!(out, "(* scheduled, + completed, . protocol)")?;

        Ok(())
    }

    #[tracing::instrument(skip(self, chain, stats, challenge))]
    pub fn print_chain(
        &mut self,
        chain: &[ChainDay],
        stats: &ChainStats,
        challenge: &Challenge,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let mut line = String::new();
        for day in chain {
            let glyph = match day.status {
                ChainStatus::Success => self.paint("#", "32"),
                ChainStatus::Failed { implicit: false } => self.paint("x", "31"),
                ChainStatus::Failed { implicit: true } => self.paint("x", "90"),
                ChainStatus::Frozen => self.paint("~", "36"),
                ChainStatus::Pending => self.paint("?", "33"),
                ChainStatus::Future => ".".to_string(),
            };
            line.push_str(&glyph);
        }
        writeln!(out, "{line}")?;

        writeln!(
            out,
            "day {}/{}  success {}  failed {} recorded / {} shown",
            chain.iter().filter(|d| d.status != ChainStatus::Future).count(),
            challenge.duration_days,
            stats.recorded_success_days,
            stats.recorded_failed_days,
            stats.recorded_failed_days + stats.derived_failed_days,
        )?;
        if stats.is_perfect {
            writeln!(out, "{}", self.paint("perfect streak", "32"))?;
        }
        for rule in &challenge.rules {
            writeln!(out, "  - {}", rule.text)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, sections))]
    pub fn print_dock(
        &mut self,
        sections: &BTreeMap<DockSection, Vec<Task>>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for (section, tasks) in sections {
            writeln!(out, "{}", self.paint(section_label(*section), "1"))?;
            for task in tasks {
                writeln!(out, "  {} {}", self.paint(&short_id(task), "33"), task.title)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(day = %day))]
    pub fn print_protocol(
        &mut self,
        day: DateKey,
        protocols: &[ProtocolContext],
        activities: &[WeeklyActivity],
        completion: Option<&BTreeMap<String, bool>>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let done = |key: &str| completion.and_then(|c| c.get(key)).copied().unwrap_or(false);

        for protocol in protocols {
            writeln!(out, "{} {}", protocol.icon, self.paint(&protocol.name, "1"))?;
            for item in &protocol.items {
                let mark = if done(&item.id.to_string()) { "x" } else { " " };
                writeln!(out, "  [{mark}] {}", item.label)?;
            }
        }

        if !activities.is_empty() {
            writeln!(out, "{}", self.paint("weekly", "1"))?;
            for activity in activities {
                let mark = if done(&format!("weekly_{}", activity.id)) {
                    "x"
                } else {
                    " "
                };
                writeln!(out, "  [{mark}] {}", activity.text)?;
            }
        }

        Ok(())
    }

    fn checkbox(&self, status: Status) -> String {
        match status {
            Status::Done => self.paint("[x]", "32"),
            Status::InProgress => self.paint("[>]", "33"),
            _ => "[ ]".to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(task: &Task) -> String {
    task.id.to_string().chars().take(8).collect()
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Backlog => "backlog",
        Status::Todo => "todo",
        Status::InProgress => "doing",
        Status::Done => "done",
    }
}

fn impact_label(impact: Impact) -> &'static str {
    match impact {
        Impact::Low => "low",
        Impact::Med => "med",
        Impact::High => "high",
    }
}

fn section_label(section: DockSection) -> &'static str {
    match section {
        DockSection::Todo => "todo",
        DockSection::Routine => "routines",
        DockSection::Project => "projects",
        DockSection::Habit => "habits",
        DockSection::Later => "later",
        DockSection::Template => "templates",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[String],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;
    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }
        if ch == '\x1b' {
            escaped = true;
            continue;
        }
        out.push(ch);
    }

    out
}
