use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{ChallengeId, Slot};

const MAX_SLOT_THRESHOLD: u8 = 7;
const MAX_TOTAL_THRESHOLD: u8 = 14;
const MAX_OFFSET_MINUTES: i32 = 14 * 60;
const KST_OFFSET_MINUTES: i32 = 9 * 60;

/// Half-open `[start, end)` range of hours that may wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u8,
    pub end: u8,
}

impl HourWindow {
    pub fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, hour: u8) -> bool {
        if self.is_empty() {
            false
        } else if self.wraps() {
            hour >= self.start || hour < self.end
        } else {
            self.start <= hour && hour < self.end
        }
    }
}

/// How weekly totals decide a demotion to the revival room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionMode {
    /// Morning plus daily count below `min_weekly_total`.
    #[default]
    Combined,
    /// Either slot below its own weekly minimum.
    Separate,
}

fn default_offset_minutes() -> i32 {
    KST_OFFSET_MINUTES
}

fn default_required_tag() -> Option<String> {
    Some("#인증".to_string())
}

fn default_active() -> bool {
    true
}

/// Time-window and threshold parameters owned by one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub challenge_id: ChallengeId,
    pub morning_start_hour: u8,
    pub morning_end_hour: u8,
    /// Equal to `morning_end_hour` when the morning slot has no late window.
    pub morning_late_hour: u8,
    pub daily_start_hour: u8,
    pub daily_end_hour: u8,
    /// May be numerically smaller than `daily_end_hour` (next day).
    pub daily_late_hour: u8,
    pub min_weekly_morning: u8,
    pub min_weekly_daily: u8,
    pub min_weekly_total: u8,
    /// Reset-room toggle. When off, weekly shortfalls never demote anyone.
    #[serde(default)]
    pub demotion_enabled: bool,
    #[serde(default)]
    pub demotion_mode: DemotionMode,
    pub revival_deadline_days: u16,
    pub rest_transition_days: u16,
    #[serde(default = "default_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_required_tag")]
    pub required_tag: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl PolicyConfig {
    /// Defaults offered by the admin form when a challenge is created.
    pub fn standard(challenge_id: ChallengeId) -> Self {
        Self {
            challenge_id,
            morning_start_hour: 5,
            morning_end_hour: 10,
            morning_late_hour: 11,
            daily_start_hour: 17,
            daily_end_hour: 23,
            daily_late_hour: 1,
            min_weekly_morning: 3,
            min_weekly_daily: 3,
            min_weekly_total: 4,
            demotion_enabled: false,
            demotion_mode: DemotionMode::Combined,
            revival_deadline_days: 14,
            rest_transition_days: 14,
            utc_offset_minutes: KST_OFFSET_MINUTES,
            required_tag: default_required_tag(),
            is_active: true,
        }
    }

    pub fn normal_window(&self, slot: Slot) -> HourWindow {
        match slot {
            Slot::Morning => HourWindow::new(self.morning_start_hour, self.morning_end_hour),
            Slot::Daily => HourWindow::new(self.daily_start_hour, self.daily_end_hour),
        }
    }

    pub fn late_window(&self, slot: Slot) -> HourWindow {
        match slot {
            Slot::Morning => HourWindow::new(self.morning_end_hour, self.morning_late_hour),
            Slot::Daily => HourWindow::new(self.daily_end_hour, self.daily_late_hour),
        }
    }

    /// Challenge-local timezone. Falls back to UTC for offsets validation would reject.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Whether a weekly tally falls short. Always false while the reset room is off.
    pub fn demotes(&self, morning: u8, daily: u8) -> bool {
        if !self.demotion_enabled {
            return false;
        }
        match self.demotion_mode {
            DemotionMode::Combined => {
                u16::from(morning) + u16::from(daily) < u16::from(self.min_weekly_total)
            }
            DemotionMode::Separate => {
                morning < self.min_weekly_morning || daily < self.min_weekly_daily
            }
        }
    }

    pub fn revives(&self, morning: u8, daily: u8) -> bool {
        morning >= self.min_weekly_morning && daily >= self.min_weekly_daily
    }

    pub fn accepts_tag(&self, raw_tag: &str) -> bool {
        match &self.required_tag {
            Some(tag) => raw_tag.contains(tag.as_str()),
            None => true,
        }
    }

    /// Admin-input checks applied before a policy is stored.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut violations = Vec::new();

        if self.challenge_id.0.trim().is_empty() {
            violations.push(FieldError::new("challenge_id", "must not be blank"));
        }

        for (field, hour) in [
            ("morning_start_hour", self.morning_start_hour),
            ("morning_end_hour", self.morning_end_hour),
            ("morning_late_hour", self.morning_late_hour),
            ("daily_start_hour", self.daily_start_hour),
            ("daily_end_hour", self.daily_end_hour),
            ("daily_late_hour", self.daily_late_hour),
        ] {
            if hour > 23 {
                violations.push(FieldError::new(field, "must be an hour between 0 and 23"));
            }
        }

        for (slot, end_field, late_field) in [
            (Slot::Morning, "morning_end_hour", "morning_late_hour"),
            (Slot::Daily, "daily_end_hour", "daily_late_hour"),
        ] {
            let normal = self.normal_window(slot);
            if normal.is_empty() {
                violations.push(FieldError::new(
                    end_field,
                    format!("must differ from the {} start hour", slot.label()),
                ));
                continue;
            }
            if self.late_window(slot).contains(normal.start) {
                violations.push(FieldError::new(
                    late_field,
                    format!("late window overlaps the {} normal window", slot.label()),
                ));
            }
        }

        for (field, value) in [
            ("min_weekly_morning", self.min_weekly_morning),
            ("min_weekly_daily", self.min_weekly_daily),
        ] {
            if value > MAX_SLOT_THRESHOLD {
                violations.push(FieldError::new(field, "must be between 0 and 7"));
            }
        }
        if self.min_weekly_total > MAX_TOTAL_THRESHOLD {
            violations.push(FieldError::new("min_weekly_total", "must be between 0 and 14"));
        }

        if self.revival_deadline_days == 0 {
            violations.push(FieldError::new(
                "revival_deadline_days",
                "must be at least one day",
            ));
        }
        if self.rest_transition_days == 0 {
            violations.push(FieldError::new(
                "rest_transition_days",
                "must be at least one day",
            ));
        }

        if self.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            violations.push(FieldError::new(
                "utc_offset_minutes",
                "must be within 14 hours of UTC",
            ));
        }

        if matches!(&self.required_tag, Some(tag) if tag.trim().is_empty()) {
            violations.push(FieldError::new(
                "required_tag",
                "must not be blank when present",
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Invalid(PolicyViolations(violations)))
        }
    }
}

/// Structured validation failure for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PolicyViolations(pub Vec<FieldError>);

impl PolicyViolations {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|error| error.field.as_str())
    }
}

impl fmt::Display for PolicyViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.field, error.reason))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid challenge policy: {0}")]
    Invalid(PolicyViolations),
}

impl PolicyError {
    pub fn violations(&self) -> &[FieldError] {
        match self {
            PolicyError::Invalid(violations) => &violations.0,
        }
    }
}
