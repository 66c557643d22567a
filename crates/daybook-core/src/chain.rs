use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::datekey::DateKey;
use crate::state::{Challenge, ChallengeDayStatus};

/// Display status of one chain day. `Failed { implicit: true }` marks a
/// past day with no history record; it is derived at render time and
/// never written back into the challenge history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Pending,
    Success,
    Failed { implicit: bool },
    Frozen,
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDay {
    /// 1-based day number as displayed.
    pub index: u32,
    pub key: DateKey,
    pub status: ChainStatus,
}

/// Stats over the chain. The `recorded_*` counters reflect stored
/// history only; implicit fails shown by the chain are counted apart so
/// the two can never be conflated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainStats {
    pub recorded_success_days: usize,
    pub recorded_failed_days: usize,
    pub derived_failed_days: usize,
    pub is_perfect: bool,
}

/// Day-by-day chain from the challenge start date. Resolution order per
/// day: explicit history record, implicit fail for an unrecorded past
/// day, pending for an unrecorded today, future otherwise. A
/// zero-duration challenge yields an empty chain.
pub fn derive_chain(challenge: &Challenge, now: DateTime<Utc>, tz: Tz) -> Vec<ChainDay> {
    let start = DateKey::from_instant(challenge.start_date, tz);
    let today = DateKey::today(now, tz);

    (0..challenge.duration_days)
        .map(|offset| {
            let key = start.shift(i64::from(offset));
            let status = match challenge.history.get(&key) {
                Some(record) => match record.status {
                    ChallengeDayStatus::Pending => ChainStatus::Pending,
                    ChallengeDayStatus::Success => ChainStatus::Success,
                    ChallengeDayStatus::Failed => ChainStatus::Failed { implicit: false },
                    ChallengeDayStatus::Frozen => ChainStatus::Frozen,
                },
                None if key < today => ChainStatus::Failed { implicit: true },
                None if key == today => ChainStatus::Pending,
                None => ChainStatus::Future,
            };
            ChainDay {
                index: offset + 1,
                key,
                status,
            }
        })
        .collect()
}

pub fn chain_stats(challenge: &Challenge, chain: &[ChainDay]) -> ChainStats {
    let recorded_success_days = challenge
        .history
        .values()
        .filter(|r| r.status == ChallengeDayStatus::Success)
        .count();
    let recorded_failed_days = challenge
        .history
        .values()
        .filter(|r| r.status == ChallengeDayStatus::Failed)
        .count();
    let derived_failed_days = chain
        .iter()
        .filter(|d| matches!(d.status, ChainStatus::Failed { implicit: true }))
        .count();

    ChainStats {
        recorded_success_days,
        recorded_failed_days,
        derived_failed_days,
        is_perfect: recorded_failed_days == 0,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{ChainStatus, chain_stats, derive_chain};
    use crate::datekey::DateKey;
    use crate::state::{Challenge, ChallengeDayRecord, ChallengeDayStatus, ChallengeStatus};

    const CAIRO: Tz = chrono_tz::Africa::Cairo;

    fn challenge_of(duration_days: u32) -> Challenge {
        Challenge {
            start_date: Utc
                .with_ymd_and_hms(2026, 2, 10, 6, 0, 0)
                .single()
                .expect("valid start"),
            duration_days,
            rules: vec![],
            status: ChallengeStatus::Active,
            history: BTreeMap::new(),
        }
    }

    fn record(key: DateKey, status: ChallengeDayStatus) -> ChallengeDayRecord {
        ChallengeDayRecord {
            date: key,
            status,
            completed_rules: vec![],
        }
    }

    #[test]
    fn gap_days_fail_implicitly_without_touching_history() {
        // start = day 0 (Feb 10), today = day 3 (Feb 13).
        let now = Utc
            .with_ymd_and_hms(2026, 2, 13, 8, 0, 0)
            .single()
            .expect("valid now");
        let mut challenge = challenge_of(5);
        let day1 = DateKey::parse("2026-02-11").expect("valid key");
        challenge
            .history
            .insert(day1, record(day1, ChallengeDayStatus::Success));

        let chain = derive_chain(&challenge, now, CAIRO);
        let statuses: Vec<ChainStatus> = chain.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                ChainStatus::Failed { implicit: true },
                ChainStatus::Success,
                ChainStatus::Failed { implicit: true },
                ChainStatus::Pending,
                ChainStatus::Future,
            ]
        );
        assert_eq!(chain[0].index, 1);
        assert_eq!(chain[4].index, 5);
        assert_eq!(challenge.history.len(), 1, "derivation must not write back");
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 13, 8, 0, 0)
            .single()
            .expect("valid now");
        let mut challenge = challenge_of(7);
        let day0 = DateKey::parse("2026-02-10").expect("valid key");
        challenge
            .history
            .insert(day0, record(day0, ChallengeDayStatus::Frozen));

        assert_eq!(
            derive_chain(&challenge, now, CAIRO),
            derive_chain(&challenge, now, CAIRO)
        );
    }

    #[test]
    fn zero_duration_yields_empty_chain() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 13, 8, 0, 0)
            .single()
            .expect("valid now");
        let challenge = challenge_of(0);
        assert!(derive_chain(&challenge, now, CAIRO).is_empty());
    }

    #[test]
    fn recorded_today_wins_over_pending_fallback() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 13, 8, 0, 0)
            .single()
            .expect("valid now");
        let mut challenge = challenge_of(5);
        let today = DateKey::parse("2026-02-13").expect("valid key");
        challenge
            .history
            .insert(today, record(today, ChallengeDayStatus::Success));

        let chain = derive_chain(&challenge, now, CAIRO);
        assert_eq!(chain[3].status, ChainStatus::Success);
    }

    #[test]
    fn stats_count_recorded_and_derived_separately() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 13, 8, 0, 0)
            .single()
            .expect("valid now");
        let mut challenge = challenge_of(5);
        let day1 = DateKey::parse("2026-02-11").expect("valid key");
        challenge
            .history
            .insert(day1, record(day1, ChallengeDayStatus::Success));

        let chain = derive_chain(&challenge, now, CAIRO);
        let stats = chain_stats(&challenge, &chain);

        assert_eq!(stats.recorded_success_days, 1);
        assert_eq!(stats.recorded_failed_days, 0);
        assert_eq!(stats.derived_failed_days, 2);
        // Perfect streak badge keys off recorded fails only.
        assert!(stats.is_perfect);
    }
}
