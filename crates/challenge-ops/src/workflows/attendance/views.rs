use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{
    ClassifiedVerification, DayMark, ParticipantId, ParticipantState, ParticipantWeeklyStatus,
    WeekGrid,
};
use super::streak::{Badge, StreakCalculator};

/// Dashboard row for the weekly tab.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyStatusView {
    pub participant_id: ParticipantId,
    pub week_start: NaiveDate,
    pub grid: WeekGrid,
    pub weekly_morning_count: u8,
    pub weekly_daily_count: u8,
    pub weekly_rate: f32,
    pub streak_days: u32,
    pub badges: Vec<Badge>,
    pub state_before: &'static str,
    pub state: &'static str,
}

impl From<ParticipantWeeklyStatus> for WeeklyStatusView {
    fn from(status: ParticipantWeeklyStatus) -> Self {
        Self {
            weekly_rate: status.weekly_rate(),
            badges: StreakCalculator::badges(status.streak_days),
            state_before: status.state_before.label(),
            state: status.state.label(),
            participant_id: status.participant_id,
            week_start: status.week_start,
            grid: status.grid,
            weekly_morning_count: status.weekly_morning_count,
            weekly_daily_count: status.weekly_daily_count,
            streak_days: status.streak_days,
        }
    }
}

/// Per-slot status shown on the "today" tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Done,
    Late,
    /// Window has not closed yet.
    Waiting,
    Missed,
}

impl SlotStatus {
    pub(crate) fn resolve(mark: DayMark, window_open: bool) -> Self {
        match mark {
            DayMark::Normal => SlotStatus::Done,
            DayMark::Late => SlotStatus::Late,
            DayMark::Missing if window_open => SlotStatus::Waiting,
            DayMark::Missing => SlotStatus::Missed,
        }
    }

    pub fn verified(self) -> bool {
        matches!(self, SlotStatus::Done | SlotStatus::Late)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyAttendanceRow {
    pub participant_id: ParticipantId,
    pub state: ParticipantState,
    pub morning: SlotStatus,
    pub daily: SlotStatus,
    pub weekly_morning_count: u8,
    pub weekly_daily_count: u8,
    pub streak_days: u32,
    pub longest_streak_days: u32,
    pub badges: Vec<Badge>,
    pub last_check_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyOverview {
    pub day: NaiveDate,
    pub rows: Vec<DailyAttendanceRow>,
    pub morning_rate: f32,
    pub daily_rate: f32,
    pub overall_rate: f32,
}

impl DailyOverview {
    pub(crate) fn new(day: NaiveDate, rows: Vec<DailyAttendanceRow>) -> Self {
        let participants = rows.len();
        let rate = |count: usize, slots: usize| {
            if slots == 0 {
                0.0
            } else {
                count as f32 / slots as f32
            }
        };
        let morning = rows.iter().filter(|row| row.morning.verified()).count();
        let daily = rows.iter().filter(|row| row.daily.verified()).count();

        Self {
            day,
            morning_rate: rate(morning, participants),
            daily_rate: rate(daily, participants),
            overall_rate: rate(morning + daily, participants * 2),
            rows,
        }
    }
}

/// Response to a single recorded or previewed check-in.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationView {
    pub check_in_id: String,
    pub participant_id: ParticipantId,
    pub classification: &'static str,
    pub slot: Option<&'static str>,
    pub service_day: NaiveDate,
    pub week_start: NaiveDate,
}

impl From<&ClassifiedVerification> for ClassificationView {
    fn from(verification: &ClassifiedVerification) -> Self {
        Self {
            check_in_id: verification.check_in_id.0.clone(),
            participant_id: verification.participant_id.clone(),
            classification: verification.classification.label(),
            slot: verification.slot().map(|slot| slot.label()),
            service_day: verification.service_day,
            week_start: verification.week_start,
        }
    }
}
