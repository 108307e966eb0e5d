use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use super::calendar;
use super::domain::{CheckInEvent, Classification, ClassifiedVerification, Slot};
use super::policy::PolicyConfig;

/// Pure mapping from a local check-in time to a verification outcome.
pub struct VerificationClassifier<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> VerificationClassifier<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    /// Windows are checked morning first, so a misconfigured overlap resolves
    /// to the morning slot. Hours outside 0..24 never match.
    pub fn classify_hour(&self, hour: u8) -> Classification {
        if self.policy.normal_window(Slot::Morning).contains(hour) {
            Classification::MorningNormal
        } else if self.policy.late_window(Slot::Morning).contains(hour) {
            Classification::MorningLate
        } else if self.policy.normal_window(Slot::Daily).contains(hour) {
            Classification::DailyNormal
        } else if self.policy.late_window(Slot::Daily).contains(hour) {
            Classification::DailyLate
        } else {
            Classification::Rejected
        }
    }

    pub fn classify_local(&self, local: NaiveDateTime) -> Classification {
        self.classify_hour(local.hour() as u8)
    }

    /// Classify a raw event, rejecting it outright when the challenge is
    /// inactive or the message lacks the required tag.
    pub fn classify_event(&self, event: &CheckInEvent) -> ClassifiedVerification {
        let local = calendar::local_datetime(event.timestamp, self.policy.offset());

        let classification = if !self.policy.is_active || !self.policy.accepts_tag(&event.raw_tag)
        {
            Classification::Rejected
        } else {
            self.classify_local(local)
        };

        let service_day = self.service_day(local, classification);

        ClassifiedVerification {
            check_in_id: event.id.clone(),
            participant_id: event.participant_id.clone(),
            classification,
            service_day,
            week_start: calendar::week_start(service_day),
        }
    }

    /// Any daily-slot check-in earlier than `daily_start_hour` has wrapped past
    /// midnight, whether it hit the normal or the late window, and counts for
    /// the previous day.
    fn service_day(&self, local: NaiveDateTime, classification: Classification) -> NaiveDate {
        let day = local.date();
        if classification.slot() == Some(Slot::Daily)
            && (local.hour() as u8) < self.policy.daily_start_hour
        {
            day - Duration::days(1)
        } else {
            day
        }
    }
}
