use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::grid::WeekDay;
use crate::task::Impact;

/// Parsed quick-add line. `day_index` points into the week slice the
/// input was resolved against; `None` means no day reference was given
/// (or none resolved). Callers must not submit an empty `text`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickAdd {
    pub text: String,
    pub impact: Impact,
    pub day_index: Option<usize>,
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("literal regex compiles")
    })
}

/// Parse one free-text line into title, impact, and an optional target
/// day within `week`.
///
/// Tokens starting with `@` are day references, resolved in order as
/// the `today`/`tomorrow` keywords, an ISO `YYYY-MM-DD` key, or a
/// case-insensitive 3-letter weekday abbreviation. Unresolved `@`
/// tokens are dropped from the output text; this is defined stripping
/// policy, not an error. Any `!` anywhere raises impact to high and all
/// `!` characters are stripped.
pub fn parse_quick_add(input: &str, week: &[WeekDay]) -> QuickAdd {
    let impact = if input.contains('!') {
        Impact::High
    } else {
        Impact::Med
    };

    let mut day_index: Option<usize> = None;
    let mut kept: Vec<String> = Vec::new();

    for raw in input.split_whitespace() {
        let token: String = raw.chars().filter(|c| *c != '!').collect();
        if token.is_empty() {
            continue;
        }

        if let Some(reference) = token.strip_prefix('@') {
            match resolve_day_reference(reference, week) {
                Some(idx) => day_index = Some(idx),
                None => debug!(token = %raw, "dropping unresolved day reference"),
            }
            continue;
        }

        kept.push(token);
    }

    QuickAdd {
        text: kept.join(" ").trim().to_string(),
        impact,
        day_index,
    }
}

fn resolve_day_reference(reference: &str, week: &[WeekDay]) -> Option<usize> {
    let lower = reference.to_ascii_lowercase();

    match lower.as_str() {
        "today" => return week.iter().position(|d| d.is_today),
        "tomorrow" => {
            let today = week.iter().position(|d| d.is_today)?;
            return if today + 1 < week.len() {
                Some(today + 1)
            } else {
                None
            };
        }
        _ => {}
    }

    if iso_date_re().is_match(&lower) {
        return week
            .iter()
            .position(|d| d.key.to_string() == lower);
    }

    if let Some(abbrev) = lower.get(..3) {
        return week
            .iter()
            .position(|d| d.short_label.to_ascii_lowercase().starts_with(abbrev));
    }

    None
}
