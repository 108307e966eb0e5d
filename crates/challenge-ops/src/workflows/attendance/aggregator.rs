use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::calendar;
use super::domain::{ClassifiedVerification, DayMark, ParticipantId, Slot, WeekGrid};

/// Day grid and per-slot counts for one participant and week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTally {
    pub week_start: NaiveDate,
    pub grid: WeekGrid,
    pub morning_count: u8,
    pub daily_count: u8,
}

impl WeeklyTally {
    pub fn empty(week_start: NaiveDate) -> Self {
        Self {
            week_start,
            grid: WeekGrid::default(),
            morning_count: 0,
            daily_count: 0,
        }
    }

    pub fn total(&self) -> u8 {
        self.morning_count + self.daily_count
    }
}

/// Folds classified verifications into a Sunday-start weekly grid.
///
/// Repeated check-ins in one slot on one day count once, rejected ones never
/// count, and anything bucketed into another week is ignored, so folding the
/// same input twice yields the same tally.
pub struct WeeklyAggregator {
    week_start: NaiveDate,
}

impl WeeklyAggregator {
    pub fn new(any_day_of_week: NaiveDate) -> Self {
        Self {
            week_start: calendar::week_start(any_day_of_week),
        }
    }

    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }

    pub fn aggregate<'v, I>(&self, verifications: I) -> WeeklyTally
    where
        I: IntoIterator<Item = &'v ClassifiedVerification>,
    {
        let mut grid = WeekGrid::default();

        for verification in verifications {
            if verification.week_start != self.week_start {
                continue;
            }
            let Some(slot) = verification.slot() else {
                continue;
            };
            let Some(index) = calendar::day_index(self.week_start, verification.service_day) else {
                continue;
            };
            grid.mark(index, slot, DayMark::from_outcome(verification.outcome()));
        }

        WeeklyTally {
            week_start: self.week_start,
            grid,
            morning_count: grid.count(Slot::Morning),
            daily_count: grid.count(Slot::Daily),
        }
    }

    /// Group a mixed stream by participant and fold each group.
    pub fn aggregate_by_participant<'v, I>(
        &self,
        verifications: I,
    ) -> BTreeMap<ParticipantId, WeeklyTally>
    where
        I: IntoIterator<Item = &'v ClassifiedVerification>,
    {
        let mut grouped: BTreeMap<ParticipantId, Vec<&ClassifiedVerification>> = BTreeMap::new();
        for verification in verifications {
            grouped
                .entry(verification.participant_id.clone())
                .or_default()
                .push(verification);
        }

        grouped
            .into_iter()
            .map(|(participant, items)| (participant, self.aggregate(items)))
            .collect()
    }
}
