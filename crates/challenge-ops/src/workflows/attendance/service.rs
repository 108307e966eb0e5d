use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AttendanceSettings;

use super::aggregator::{WeeklyAggregator, WeeklyTally};
use super::calendar;
use super::channels::{ChannelDirectory, ChannelSync, ChannelSyncError, ChatPlatform};
use super::classifier::VerificationClassifier;
use super::domain::{
    ChallengeId, CheckInEvent, CheckInId, ClassifiedVerification, ParticipantId,
    ParticipantStanding, ParticipantState, ParticipantWeeklyStatus, Slot, StateTransition,
    WeeklyBatchRecord,
};
use super::policy::{PolicyConfig, PolicyError};
use super::repository::{AttendanceStore, Page, PageRequest, StoreError};
use super::streak::StreakCalculator;
use super::transition::StatusTransitionEvaluator;
use super::views::{DailyAttendanceRow, DailyOverview, SlotStatus, WeeklyStatusView};

/// Check-in as submitted by the chat integration or an admin.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckInSubmission {
    #[serde(default)]
    pub id: Option<String>,
    pub participant_id: ParticipantId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub raw_tag: String,
}

/// Outcome of a bulk check-in import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Events whose id was already stored.
    pub duplicates: usize,
}

/// Service composing the record store, the chat platform and the policy engine.
pub struct AttendanceService<S, P> {
    store: Arc<S>,
    channels: ChannelSync<P, S>,
    settings: AttendanceSettings,
}

impl<S, P> AttendanceService<S, P>
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    pub fn new(store: Arc<S>, platform: Arc<P>, settings: AttendanceSettings) -> Self {
        let channels = ChannelSync::new(platform, store.clone());
        Self {
            store,
            channels,
            settings,
        }
    }

    pub fn settings(&self) -> &AttendanceSettings {
        &self.settings
    }

    pub fn channels(&self) -> &ChannelSync<P, S> {
        &self.channels
    }

    /// Validate and store a policy. Invalid input never reaches the classifier.
    pub fn save_policy(
        &self,
        policy: PolicyConfig,
    ) -> Result<PolicyConfig, AttendanceServiceError> {
        if let Err(err) = policy.validate() {
            let fields: Vec<&str> = err
                .violations()
                .iter()
                .map(|violation| violation.field.as_str())
                .collect();
            warn!(challenge_id = %policy.challenge_id, ?fields, "policy rejected");
            return Err(err.into());
        }
        let stored = self.store.save_policy(policy)?;
        info!(challenge_id = %stored.challenge_id, mode = ?stored.demotion_mode, "policy saved");
        Ok(stored)
    }

    pub fn policy(
        &self,
        challenge_id: &ChallengeId,
    ) -> Result<PolicyConfig, AttendanceServiceError> {
        let policy = self
            .store
            .fetch_policy(challenge_id)?
            .ok_or(StoreError::NotFound)?;
        Ok(policy)
    }

    pub fn enroll(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<(), AttendanceServiceError> {
        self.policy(challenge_id)?;
        self.store.enroll(challenge_id, participant_id)?;
        Ok(())
    }

    /// Preview the classification of a check-in without storing it.
    pub fn classify(
        &self,
        challenge_id: &ChallengeId,
        event: &CheckInEvent,
    ) -> Result<ClassifiedVerification, AttendanceServiceError> {
        let policy = self.policy(challenge_id)?;
        Ok(VerificationClassifier::new(&policy).classify_event(event))
    }

    /// Store a check-in and enroll its author; returns the derived classification.
    pub fn record_check_in(
        &self,
        challenge_id: &ChallengeId,
        submission: CheckInSubmission,
    ) -> Result<ClassifiedVerification, AttendanceServiceError> {
        let policy = self.policy(challenge_id)?;
        let id = submission.id.map(CheckInId).unwrap_or_else(|| {
            CheckInId::derived(challenge_id, &submission.participant_id, submission.timestamp)
        });
        let event = CheckInEvent {
            id,
            participant_id: submission.participant_id,
            challenge_id: challenge_id.clone(),
            timestamp: submission.timestamp,
            raw_tag: submission.raw_tag,
        };

        let event = self.store.insert_check_in(event)?;
        self.store.enroll(challenge_id, &event.participant_id)?;

        let verification = VerificationClassifier::new(&policy).classify_event(&event);
        debug!(
            challenge_id = %challenge_id,
            participant_id = %event.participant_id,
            classification = verification.classification.label(),
            "check-in recorded"
        );
        Ok(verification)
    }

    /// Bulk-load exported check-ins. Ids already on record are skipped, so
    /// replaying an export is harmless.
    pub fn import_check_ins(
        &self,
        challenge_id: &ChallengeId,
        events: Vec<CheckInEvent>,
    ) -> Result<ImportSummary, AttendanceServiceError> {
        self.policy(challenge_id)?;
        let mut summary = ImportSummary::default();

        for mut event in events {
            event.challenge_id = challenge_id.clone();
            let participant_id = event.participant_id.clone();
            match self.store.insert_check_in(event) {
                Ok(_) => summary.imported += 1,
                Err(StoreError::Conflict) => summary.duplicates += 1,
                Err(err) => return Err(err.into()),
            }
            self.store.enroll(challenge_id, &participant_id)?;
        }

        info!(
            challenge_id = %challenge_id,
            imported = summary.imported,
            duplicates = summary.duplicates,
            "check-ins imported"
        );
        Ok(summary)
    }

    /// Evaluate one closed week for every participant of the challenge.
    ///
    /// Safe to re-run: a recorded ledger entry is returned as is, statuses are
    /// upserted, and standings already evaluated for the week are not moved
    /// again. The ledger entry is written last, so an interrupted run is
    /// simply repeated.
    pub fn run_weekly_batch(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WeeklyBatchRecord, AttendanceServiceError> {
        let week_start = calendar::week_start(week_start);
        match self.evaluate_week(challenge_id, week_start, now) {
            Ok(batch) => Ok(batch),
            Err(err) => {
                warn!(
                    challenge_id = %challenge_id,
                    week_start = %week_start,
                    retryable = err.is_retryable(),
                    error = %err,
                    "weekly batch failed"
                );
                Err(err)
            }
        }
    }

    fn evaluate_week(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WeeklyBatchRecord, AttendanceServiceError> {
        if let Some(existing) = self.store.fetch_batch(challenge_id, week_start)? {
            info!(
                challenge_id = %challenge_id,
                week_start = %week_start,
                "week already evaluated"
            );
            return Ok(existing);
        }

        let policy = self.policy(challenge_id)?;
        let offset = policy.offset();
        let now_local = calendar::local_datetime(now, offset);
        if !self.settings.cutover.is_closed(&policy, week_start, now_local) {
            return Err(AttendanceServiceError::WeekStillOpen {
                week_start,
                closes_at: self.settings.cutover.closes_at_for(&policy, week_start),
            });
        }

        let week_end = calendar::week_end(week_start);
        let lookback_start = self.lookback_start(week_end);
        let classified = self.classified_between(&policy, lookback_start, week_end)?;

        let tallies = WeeklyAggregator::new(week_start).aggregate_by_participant(&classified);
        let verified_days = verified_days_by_participant(&classified);

        let mut participants: BTreeSet<ParticipantId> =
            self.store.participants(challenge_id)?.into_iter().collect();
        participants.extend(tallies.keys().cloned());

        // A later week already applied would swallow this week's transitions.
        let mut standings = Vec::with_capacity(participants.len());
        for participant_id in &participants {
            let standing = self
                .store
                .fetch_standing(challenge_id, participant_id)?
                .unwrap_or_else(|| {
                    ParticipantStanding::new(challenge_id.clone(), participant_id.clone())
                });
            if let Some(evaluated_through) = standing
                .last_evaluated_week
                .filter(|last| *last > week_start)
            {
                return Err(AttendanceServiceError::WeekOutOfOrder {
                    week_start,
                    evaluated_through,
                });
            }
            standings.push(standing);
        }

        let evaluator = StatusTransitionEvaluator::new(&policy);
        let no_days = BTreeSet::new();
        let mut transitions = Vec::new();

        for standing in &standings {
            let participant_id = &standing.participant_id;
            let tally = tallies
                .get(participant_id)
                .copied()
                .unwrap_or_else(|| WeeklyTally::empty(week_start));
            let history = StreakCalculator::daily_history(
                lookback_start,
                week_end,
                verified_days.get(participant_id).unwrap_or(&no_days),
            );

            let already_evaluated = standing.evaluated(week_start);

            let state_before = if already_evaluated {
                self.store
                    .fetch_weekly_status(challenge_id, participant_id, week_start)?
                    .map(|status| status.state_before)
                    .unwrap_or(standing.state)
            } else {
                standing.state
            };

            let next = evaluator.evaluate(
                standing,
                week_start,
                tally.morning_count,
                tally.daily_count,
            );

            self.store.upsert_weekly_status(ParticipantWeeklyStatus {
                challenge_id: challenge_id.clone(),
                participant_id: participant_id.clone(),
                week_start,
                grid: tally.grid,
                weekly_morning_count: tally.morning_count,
                weekly_daily_count: tally.daily_count,
                streak_days: StreakCalculator::current(&history),
                state_before,
                state: next.state,
            })?;

            if !already_evaluated {
                self.store.upsert_standing(next.clone())?;
            }

            if state_before != next.state {
                info!(
                    challenge_id = %challenge_id,
                    participant_id = %participant_id,
                    from = state_before.label(),
                    to = next.state.label(),
                    "participant state changed"
                );
                transitions.push(StateTransition {
                    participant_id: participant_id.clone(),
                    from: state_before,
                    to: next.state,
                });
            }
        }

        let batch = WeeklyBatchRecord {
            challenge_id: challenge_id.clone(),
            week_start,
            evaluated_at: now,
            participants: participants.len(),
            transitions,
        };
        self.store.record_batch(batch.clone())?;

        info!(
            challenge_id = %challenge_id,
            week_start = %week_start,
            participants = batch.participants,
            transitions = batch.transitions.len(),
            "weekly batch recorded"
        );
        Ok(batch)
    }

    pub fn weekly_statuses(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
        page: PageRequest,
    ) -> Result<Page<WeeklyStatusView>, AttendanceServiceError> {
        let week_start = calendar::week_start(week_start);
        let page = self.store.weekly_statuses(challenge_id, week_start, page)?;
        Ok(page.map(WeeklyStatusView::from))
    }

    /// Today's per-participant marks, computed on read from raw check-ins.
    ///
    /// An unverified `day` does not break the streak while one of its windows
    /// is still open.
    pub fn daily_overview(
        &self,
        challenge_id: &ChallengeId,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DailyOverview, AttendanceServiceError> {
        let policy = self.policy(challenge_id)?;
        let now_local = calendar::local_datetime(now, policy.offset());
        let lookback_start = self.lookback_start(day);
        let classified = self.classified_between(&policy, lookback_start, day)?;

        let week_start = calendar::week_start(day);
        let tallies = WeeklyAggregator::new(week_start).aggregate_by_participant(&classified);
        let verified_days = verified_days_by_participant(&classified);
        let last_check_ins = self.last_check_ins(challenge_id, &policy, lookback_start, day)?;
        let day_index = calendar::day_index(week_start, day).unwrap_or(0);

        let mut participants: BTreeSet<ParticipantId> =
            self.store.participants(challenge_id)?.into_iter().collect();
        participants.extend(tallies.keys().cloned());

        let no_days = BTreeSet::new();
        let mut rows = Vec::with_capacity(participants.len());
        for participant_id in participants {
            let tally = tallies
                .get(&participant_id)
                .copied()
                .unwrap_or_else(|| WeeklyTally::empty(week_start));
            let cells = tally.grid.days[day_index];
            let morning = SlotStatus::resolve(
                cells.morning,
                now_local < calendar::slot_closes_at(&policy, Slot::Morning, day),
            );
            let daily = SlotStatus::resolve(
                cells.daily,
                now_local < calendar::slot_closes_at(&policy, Slot::Daily, day),
            );

            let verified = verified_days.get(&participant_id).unwrap_or(&no_days);
            let pending_today = !verified.contains(&day)
                && (morning == SlotStatus::Waiting || daily == SlotStatus::Waiting);
            let streak_end = if pending_today {
                day - Duration::days(1)
            } else {
                day
            };
            let history = StreakCalculator::daily_history(lookback_start, streak_end, verified);
            let streak_days = StreakCalculator::current(&history);

            let state = self
                .store
                .fetch_standing(challenge_id, &participant_id)?
                .map(|standing| standing.state)
                .unwrap_or_default();

            rows.push(DailyAttendanceRow {
                state,
                morning,
                daily,
                weekly_morning_count: tally.morning_count,
                weekly_daily_count: tally.daily_count,
                streak_days,
                longest_streak_days: StreakCalculator::longest(&history),
                badges: StreakCalculator::badges(streak_days),
                last_check_in: last_check_ins.get(&participant_id).copied(),
                participant_id,
            });
        }

        Ok(DailyOverview::new(day, rows))
    }

    /// Manual exit from rest (or revival) back to active.
    pub fn reset_participant(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<ParticipantStanding, AttendanceServiceError> {
        self.policy(challenge_id)?;
        let mut standing = self
            .store
            .fetch_standing(challenge_id, participant_id)?
            .ok_or(StoreError::NotFound)?;

        let previous = standing.state;
        standing.state = ParticipantState::Active;
        standing.revival_started_on = None;
        standing.rest_since = None;
        standing.rest_until = None;
        self.store.upsert_standing(standing.clone())?;

        info!(
            challenge_id = %challenge_id,
            participant_id = %participant_id,
            from = previous.label(),
            "participant reset to active"
        );
        Ok(standing)
    }

    /// Cascade delete. Chat-platform cleanup is attempted but never blocks.
    pub fn delete_challenge(
        &self,
        challenge_id: &ChallengeId,
    ) -> Result<(), AttendanceServiceError> {
        if let Err(err) = self.channels.teardown(challenge_id) {
            warn!(
                challenge_id = %challenge_id,
                error = %err,
                "channel teardown failed; dropping the channel record anyway"
            );
        }
        self.store.remove_channel(challenge_id)?;
        self.store.delete_challenge(challenge_id)?;
        info!(challenge_id = %challenge_id, "challenge deleted");
        Ok(())
    }

    /// First service day read for a report ending on `until`. Covers the
    /// streak lookback and never starts after the Sunday of `until`'s week.
    fn lookback_start(&self, until: NaiveDate) -> NaiveDate {
        let streak_start = until - Duration::days(i64::from(self.settings.streak_lookback_days) - 1);
        streak_start.min(calendar::week_start(until))
    }

    /// Classified check-ins whose service day falls in `from..=to`.
    fn classified_between(
        &self,
        policy: &PolicyConfig,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ClassifiedVerification>, AttendanceServiceError> {
        let events = self.events_between(&policy.challenge_id, policy, from, to)?;
        let classifier = VerificationClassifier::new(policy);
        Ok(events
            .iter()
            .map(|event| classifier.classify_event(event))
            .filter(|verification| (from..=to).contains(&verification.service_day))
            .collect())
    }

    fn events_between(
        &self,
        challenge_id: &ChallengeId,
        policy: &PolicyConfig,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CheckInEvent>, StoreError> {
        let offset = policy.offset();
        // The day after `to` may hold after-midnight daily check-ins.
        let start = calendar::local_midnight_utc(from, offset);
        let end = calendar::local_midnight_utc(to + Duration::days(2), offset);
        self.store.check_ins_between(challenge_id, start, end)
    }

    fn last_check_ins(
        &self,
        challenge_id: &ChallengeId,
        policy: &PolicyConfig,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<ParticipantId, DateTime<Utc>>, StoreError> {
        let cutoff = calendar::local_midnight_utc(to + Duration::days(1), policy.offset());
        let mut latest = BTreeMap::new();
        for event in self.events_between(challenge_id, policy, from, to)? {
            if event.timestamp < cutoff {
                latest.insert(event.participant_id, event.timestamp);
            }
        }
        Ok(latest)
    }
}

fn verified_days_by_participant(
    classified: &[ClassifiedVerification],
) -> BTreeMap<ParticipantId, BTreeSet<NaiveDate>> {
    let mut days: BTreeMap<ParticipantId, BTreeSet<NaiveDate>> = BTreeMap::new();
    for verification in classified.iter().filter(|v| v.classification.counts()) {
        days.entry(verification.participant_id.clone())
            .or_default()
            .insert(verification.service_day);
    }
    days
}

/// Error raised by the attendance service.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceServiceError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Channel(#[from] ChannelSyncError),
    #[error("week starting {week_start} is still open until {closes_at}")]
    WeekStillOpen {
        week_start: NaiveDate,
        closes_at: NaiveDateTime,
    },
    #[error("week starting {week_start} comes before already evaluated week {evaluated_through}")]
    WeekOutOfOrder {
        week_start: NaiveDate,
        evaluated_through: NaiveDate,
    },
}

impl AttendanceServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttendanceServiceError::Store(err) => err.is_retryable(),
            AttendanceServiceError::Channel(ChannelSyncError::Directory(err)) => err.is_retryable(),
            _ => false,
        }
    }
}
