use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Challenge identifier as stored in the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeId(pub String);

/// Participant identifier (the chat-platform user bound to the challenge).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckInId(pub String);

impl CheckInId {
    /// Id for a check-in that arrived without one. Built from its author and
    /// instant, so the same check-in always maps to the same id.
    pub fn derived(
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self(format!(
            "{}-{}-{}",
            challenge_id.0,
            participant_id.0,
            timestamp.format("%Y%m%dT%H%M%S%.3fZ")
        ))
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CheckInId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw check-in signal as produced by the chat integration. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInEvent {
    pub id: CheckInId,
    pub participant_id: ParticipantId,
    pub challenge_id: ChallengeId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub raw_tag: String,
}

/// Verification window a check-in can land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Morning,
    Daily,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Morning, Slot::Daily];

    pub fn label(self) -> &'static str {
        match self {
            Slot::Morning => "morning",
            Slot::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Normal,
    Late,
    Rejected,
}

/// Result of running a check-in through the verification windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    MorningNormal,
    MorningLate,
    DailyNormal,
    DailyLate,
    Rejected,
}

impl Classification {
    pub fn slot(self) -> Option<Slot> {
        match self {
            Classification::MorningNormal | Classification::MorningLate => Some(Slot::Morning),
            Classification::DailyNormal | Classification::DailyLate => Some(Slot::Daily),
            Classification::Rejected => None,
        }
    }

    pub fn outcome(self) -> Outcome {
        match self {
            Classification::MorningNormal | Classification::DailyNormal => Outcome::Normal,
            Classification::MorningLate | Classification::DailyLate => Outcome::Late,
            Classification::Rejected => Outcome::Rejected,
        }
    }

    pub fn counts(self) -> bool {
        self.outcome() != Outcome::Rejected
    }

    pub fn label(self) -> &'static str {
        match self {
            Classification::MorningNormal => "morning-normal",
            Classification::MorningLate => "morning-late",
            Classification::DailyNormal => "daily-normal",
            Classification::DailyLate => "daily-late",
            Classification::Rejected => "rejected",
        }
    }
}

/// Derived view of a check-in; recomputed from the raw event on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedVerification {
    pub check_in_id: CheckInId,
    pub participant_id: ParticipantId,
    pub classification: Classification,
    /// Calendar day the check-in counts for. After-midnight daily check-ins
    /// belong to the previous day.
    pub service_day: NaiveDate,
    pub week_start: NaiveDate,
}

impl ClassifiedVerification {
    pub fn slot(&self) -> Option<Slot> {
        self.classification.slot()
    }

    pub fn outcome(&self) -> Outcome {
        self.classification.outcome()
    }
}

/// Cell value of the weekly grid. Ordered so that merging keeps the best mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayMark {
    #[default]
    Missing,
    Late,
    Normal,
}

impl DayMark {
    pub fn is_marked(self) -> bool {
        self != DayMark::Missing
    }

    pub(crate) fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Normal => DayMark::Normal,
            Outcome::Late => DayMark::Late,
            Outcome::Rejected => DayMark::Missing,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCells {
    pub morning: DayMark,
    pub daily: DayMark,
}

impl DayCells {
    pub fn get(&self, slot: Slot) -> DayMark {
        match slot {
            Slot::Morning => self.morning,
            Slot::Daily => self.daily,
        }
    }

    pub fn any(&self) -> bool {
        self.morning.is_marked() || self.daily.is_marked()
    }
}

/// Sunday-first 7×{morning, daily} grid for one participant and week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekGrid {
    pub days: [DayCells; 7],
}

impl WeekGrid {
    /// Merge a mark into a cell, keeping the stronger of the two.
    pub fn mark(&mut self, day_index: usize, slot: Slot, mark: DayMark) {
        if let Some(cells) = self.days.get_mut(day_index) {
            let cell = match slot {
                Slot::Morning => &mut cells.morning,
                Slot::Daily => &mut cells.daily,
            };
            *cell = (*cell).max(mark);
        }
    }

    pub fn count(&self, slot: Slot) -> u8 {
        self.days
            .iter()
            .filter(|cells| cells.get(slot).is_marked())
            .count() as u8
    }
}

/// Participant state within a challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    #[default]
    Active,
    RevivalPending,
    Rest,
}

impl ParticipantState {
    pub fn label(self) -> &'static str {
        match self {
            ParticipantState::Active => "active",
            ParticipantState::RevivalPending => "revival_pending",
            ParticipantState::Rest => "rest",
        }
    }
}

/// Persisted weekly roll-up, upserted by (participant_id, week_start).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantWeeklyStatus {
    pub challenge_id: ChallengeId,
    pub participant_id: ParticipantId,
    pub week_start: NaiveDate,
    pub grid: WeekGrid,
    pub weekly_morning_count: u8,
    pub weekly_daily_count: u8,
    pub streak_days: u32,
    pub state_before: ParticipantState,
    pub state: ParticipantState,
}

impl ParticipantWeeklyStatus {
    pub fn weekly_total(&self) -> u8 {
        self.weekly_morning_count + self.weekly_daily_count
    }

    /// Share of the fourteen weekly slots that were verified.
    pub fn weekly_rate(&self) -> f32 {
        f32::from(self.weekly_total()) / 14.0
    }
}

/// Current standing of a participant; the idempotence key for weekly transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStanding {
    pub challenge_id: ChallengeId,
    pub participant_id: ParticipantId,
    pub state: ParticipantState,
    pub revival_started_on: Option<NaiveDate>,
    pub rest_since: Option<NaiveDate>,
    pub rest_until: Option<NaiveDate>,
    pub last_evaluated_week: Option<NaiveDate>,
}

impl ParticipantStanding {
    pub fn new(challenge_id: ChallengeId, participant_id: ParticipantId) -> Self {
        Self {
            challenge_id,
            participant_id,
            state: ParticipantState::Active,
            revival_started_on: None,
            rest_since: None,
            rest_until: None,
            last_evaluated_week: None,
        }
    }

    pub fn evaluated(&self, week_start: NaiveDate) -> bool {
        self.last_evaluated_week
            .map(|last| last >= week_start)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub participant_id: ParticipantId,
    pub from: ParticipantState,
    pub to: ParticipantState,
}

/// Ledger entry marking a (challenge, week) batch as fully applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyBatchRecord {
    pub challenge_id: ChallengeId,
    pub week_start: NaiveDate,
    pub evaluated_at: DateTime<Utc>,
    pub participants: usize,
    pub transitions: Vec<StateTransition>,
}
