//! Week bucketing and challenge-local time helpers.
//!
//! Weeks start on Sunday. All hour arithmetic happens in the challenge's
//! fixed UTC offset, never in server time.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use super::domain::Slot;
use super::policy::PolicyConfig;

pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

pub fn week_days(week_start: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    (0..7).map(move |offset| week_start + Duration::days(offset))
}

/// Position of `day` in the Sunday-first week beginning at `week_start`.
pub fn day_index(week_start: NaiveDate, day: NaiveDate) -> Option<usize> {
    let delta = (day - week_start).num_days();
    (0..7).contains(&delta).then_some(delta as usize)
}

pub fn local_datetime(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    instant.with_timezone(&offset).naive_local()
}

pub fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, Utc)
}

pub fn local_midnight_utc(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    to_utc(day.and_time(NaiveTime::MIN), offset)
}

/// UTC range of raw check-ins that can land in the given week: the local
/// week plus the following day, whose early hours may still count for
/// Saturday's daily slot.
pub fn check_in_window(
    week_start: NaiveDate,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        local_midnight_utc(week_start, offset),
        local_midnight_utc(week_start + Duration::days(8), offset),
    )
}

fn at_hour(day: NaiveDate, hour: u8) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour.min(23)))
}

/// Local instant after which no further check-in can fill the slot for `day`.
pub fn slot_closes_at(policy: &PolicyConfig, slot: Slot, day: NaiveDate) -> NaiveDateTime {
    let normal = policy.normal_window(slot);
    let late = policy.late_window(slot);
    let last_hour = if late.is_empty() { normal.end } else { late.end };

    if last_hour <= normal.start {
        at_hour(day + Duration::days(1), last_hour)
    } else {
        at_hour(day, last_hour)
    }
}

/// Local instant after which a week may be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekCutover {
    pub weekday: Weekday,
    pub hour: u8,
}

impl Default for WeekCutover {
    fn default() -> Self {
        Self {
            weekday: Weekday::Mon,
            hour: 4,
        }
    }
}

impl WeekCutover {
    /// First configured weekday/hour on or after the Sunday following the week.
    pub fn closes_at(&self, week_start: NaiveDate) -> NaiveDateTime {
        let mut day = week_start + Duration::days(7);
        while day.weekday() != self.weekday {
            day = day + Duration::days(1);
        }
        at_hour(day, self.hour)
    }

    /// Cutover for one challenge. Never earlier than the close of Saturday's
    /// last slot, so late check-ins can still reach the week.
    pub fn closes_at_for(&self, policy: &PolicyConfig, week_start: NaiveDate) -> NaiveDateTime {
        let saturday = week_end(week_start);
        Slot::ALL
            .iter()
            .map(|slot| slot_closes_at(policy, *slot, saturday))
            .fold(self.closes_at(week_start), NaiveDateTime::max)
    }

    pub fn is_closed(
        &self,
        policy: &PolicyConfig,
        week_start: NaiveDate,
        now_local: NaiveDateTime,
    ) -> bool {
        now_local >= self.closes_at_for(policy, week_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn week_start_rolls_back_to_sunday() {
        // 2025-10-15 is a Wednesday.
        assert_eq!(week_start(date(2025, 10, 15)), date(2025, 10, 12));
        assert_eq!(week_start(date(2025, 10, 12)), date(2025, 10, 12));
        assert_eq!(week_start(date(2025, 10, 18)), date(2025, 10, 12));
    }

    #[test]
    fn day_index_is_bounded_to_the_week() {
        let start = date(2025, 10, 12);
        assert_eq!(day_index(start, start), Some(0));
        assert_eq!(day_index(start, date(2025, 10, 18)), Some(6));
        assert_eq!(day_index(start, date(2025, 10, 19)), None);
        assert_eq!(day_index(start, date(2025, 10, 11)), None);
    }

    fn policy() -> PolicyConfig {
        PolicyConfig::standard(super::super::domain::ChallengeId("c".to_string()))
    }

    #[test]
    fn monday_cutover_closes_eight_days_after_week_start() {
        let cutover = WeekCutover::default();
        let start = date(2025, 10, 12);
        assert_eq!(cutover.closes_at(start), at_hour(date(2025, 10, 20), 4));
        assert!(!cutover.is_closed(&policy(), start, at_hour(date(2025, 10, 20), 3)));
        assert!(cutover.is_closed(&policy(), start, at_hour(date(2025, 10, 20), 4)));
    }

    #[test]
    fn early_cutover_waits_for_saturday_late_window() {
        let cutover = WeekCutover {
            weekday: Weekday::Sun,
            hour: 0,
        };
        let start = date(2025, 10, 12);
        assert_eq!(cutover.closes_at(start), at_hour(date(2025, 10, 19), 0));
        assert_eq!(
            cutover.closes_at_for(&policy(), start),
            at_hour(date(2025, 10, 19), 1)
        );
        assert!(!cutover.is_closed(&policy(), start, at_hour(date(2025, 10, 19), 0)));
    }

    #[test]
    fn local_midnight_converts_through_offset() {
        let kst = FixedOffset::east_opt(9 * 3600).expect("valid offset");
        let utc = local_midnight_utc(date(2025, 10, 12), kst);
        assert_eq!(utc.to_rfc3339(), "2025-10-11T15:00:00+00:00");
        assert_eq!(local_datetime(utc, kst), at_hour(date(2025, 10, 12), 0));
    }

    #[test]
    fn daily_slot_closes_on_the_following_day_when_late_window_wraps() {
        let policy = policy();
        let day = date(2025, 10, 14);
        assert_eq!(
            slot_closes_at(&policy, Slot::Daily, day),
            at_hour(date(2025, 10, 15), 1)
        );
        assert_eq!(slot_closes_at(&policy, Slot::Morning, day), at_hour(day, 11));
    }
}
