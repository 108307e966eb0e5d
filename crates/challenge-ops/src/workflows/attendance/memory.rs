use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::channels::{ChannelDirectory, ChannelRecord};
use super::domain::{
    ChallengeId, CheckInEvent, CheckInId, ParticipantId, ParticipantStanding,
    ParticipantWeeklyStatus, WeeklyBatchRecord,
};
use super::policy::PolicyConfig;
use super::repository::{AttendanceStore, Page, PageRequest, StoreError};

#[derive(Default)]
struct Collections {
    policies: HashMap<ChallengeId, PolicyConfig>,
    participants: HashMap<ChallengeId, BTreeSet<ParticipantId>>,
    check_ins: HashMap<CheckInId, CheckInEvent>,
    weekly_statuses: BTreeMap<(ChallengeId, NaiveDate, ParticipantId), ParticipantWeeklyStatus>,
    standings: HashMap<(ChallengeId, ParticipantId), ParticipantStanding>,
    batches: HashMap<(ChallengeId, NaiveDate), WeeklyBatchRecord>,
    channels: HashMap<ChallengeId, ChannelRecord>,
}

/// Process-local record store used by the API binary, the CLI, and tests.
#[derive(Default, Clone)]
pub struct InMemoryAttendanceStore {
    collections: Arc<Mutex<Collections>>,
}

impl InMemoryAttendanceStore {
    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl AttendanceStore for InMemoryAttendanceStore {
    fn save_policy(&self, policy: PolicyConfig) -> Result<PolicyConfig, StoreError> {
        let mut guard = self.lock()?;
        guard
            .policies
            .insert(policy.challenge_id.clone(), policy.clone());
        Ok(policy)
    }

    fn fetch_policy(
        &self,
        challenge_id: &ChallengeId,
    ) -> Result<Option<PolicyConfig>, StoreError> {
        Ok(self.lock()?.policies.get(challenge_id).cloned())
    }

    fn enroll(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<(), StoreError> {
        self.lock()?
            .participants
            .entry(challenge_id.clone())
            .or_default()
            .insert(participant_id.clone());
        Ok(())
    }

    fn participants(&self, challenge_id: &ChallengeId) -> Result<Vec<ParticipantId>, StoreError> {
        Ok(self
            .lock()?
            .participants
            .get(challenge_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_check_in(&self, event: CheckInEvent) -> Result<CheckInEvent, StoreError> {
        let mut guard = self.lock()?;
        if guard.check_ins.contains_key(&event.id) {
            return Err(StoreError::Conflict);
        }
        guard.check_ins.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    fn check_ins_between(
        &self,
        challenge_id: &ChallengeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckInEvent>, StoreError> {
        let guard = self.lock()?;
        let mut events: Vec<CheckInEvent> = guard
            .check_ins
            .values()
            .filter(|event| &event.challenge_id == challenge_id)
            .filter(|event| event.timestamp >= from && event.timestamp < to)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn upsert_weekly_status(&self, status: ParticipantWeeklyStatus) -> Result<(), StoreError> {
        let key = (
            status.challenge_id.clone(),
            status.week_start,
            status.participant_id.clone(),
        );
        self.lock()?.weekly_statuses.insert(key, status);
        Ok(())
    }

    fn fetch_weekly_status(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
        week_start: NaiveDate,
    ) -> Result<Option<ParticipantWeeklyStatus>, StoreError> {
        let key = (challenge_id.clone(), week_start, participant_id.clone());
        Ok(self.lock()?.weekly_statuses.get(&key).cloned())
    }

    fn weekly_statuses(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
        page: PageRequest,
    ) -> Result<Page<ParticipantWeeklyStatus>, StoreError> {
        let guard = self.lock()?;
        let all: Vec<ParticipantWeeklyStatus> = guard
            .weekly_statuses
            .iter()
            .filter(|((challenge, week, _), _)| challenge == challenge_id && *week == week_start)
            .map(|(_, status)| status.clone())
            .collect();
        Ok(Page::from_sorted(all, page))
    }

    fn fetch_standing(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<Option<ParticipantStanding>, StoreError> {
        let key = (challenge_id.clone(), participant_id.clone());
        Ok(self.lock()?.standings.get(&key).cloned())
    }

    fn upsert_standing(&self, standing: ParticipantStanding) -> Result<(), StoreError> {
        let key = (
            standing.challenge_id.clone(),
            standing.participant_id.clone(),
        );
        self.lock()?.standings.insert(key, standing);
        Ok(())
    }

    fn fetch_batch(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyBatchRecord>, StoreError> {
        Ok(self
            .lock()?
            .batches
            .get(&(challenge_id.clone(), week_start))
            .cloned())
    }

    fn record_batch(&self, batch: WeeklyBatchRecord) -> Result<(), StoreError> {
        let key = (batch.challenge_id.clone(), batch.week_start);
        self.lock()?.batches.insert(key, batch);
        Ok(())
    }

    fn delete_challenge(&self, challenge_id: &ChallengeId) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.policies.remove(challenge_id);
        guard.participants.remove(challenge_id);
        guard
            .check_ins
            .retain(|_, event| &event.challenge_id != challenge_id);
        guard
            .weekly_statuses
            .retain(|(challenge, _, _), _| challenge != challenge_id);
        guard
            .standings
            .retain(|(challenge, _), _| challenge != challenge_id);
        guard
            .batches
            .retain(|(challenge, _), _| challenge != challenge_id);
        guard.channels.remove(challenge_id);
        Ok(())
    }
}

impl ChannelDirectory for InMemoryAttendanceStore {
    fn channel_for(&self, challenge_id: &ChallengeId) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(self.lock()?.channels.get(challenge_id).cloned())
    }

    fn save_channel(&self, record: ChannelRecord) -> Result<(), StoreError> {
        self.lock()?
            .channels
            .insert(record.challenge_id.clone(), record);
        Ok(())
    }

    fn remove_channel(
        &self,
        challenge_id: &ChallengeId,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(self.lock()?.channels.remove(challenge_id))
    }
}
