use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::config::AttendanceSettings;
use crate::workflows::attendance::calendar;
use crate::workflows::attendance::channels::{
    ChannelDirectory, ChannelRecord, ChannelRequest, ChatError, ChatPlatform, GuildCategory,
    GuildMember,
};
use crate::workflows::attendance::domain::{
    ChallengeId, CheckInEvent, CheckInId, ParticipantId, ParticipantStanding,
    ParticipantWeeklyStatus, WeeklyBatchRecord,
};
use crate::workflows::attendance::memory::InMemoryAttendanceStore;
use crate::workflows::attendance::policy::PolicyConfig;
use crate::workflows::attendance::repository::{AttendanceStore, Page, PageRequest, StoreError};
use crate::workflows::attendance::service::{AttendanceService, CheckInSubmission};

pub(super) const TAG: &str = "#인증";

pub(super) fn challenge() -> ChallengeId {
    ChallengeId("morning-club".to_string())
}

pub(super) fn participant(name: &str) -> ParticipantId {
    ParticipantId(name.to_string())
}

/// Standard windows with the reset room switched on.
pub(super) fn policy() -> PolicyConfig {
    PolicyConfig {
        demotion_enabled: true,
        ..PolicyConfig::standard(challenge())
    }
}

pub(super) fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid offset")
}

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Sunday 2025-10-12; the week runs through Saturday 2025-10-18.
pub(super) fn week() -> NaiveDate {
    date(2025, 10, 12)
}

pub(super) fn local(day: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    day.and_hms_opt(hour, minute, 0).expect("valid time")
}

/// UTC instant for a KST wall-clock time.
pub(super) fn kst_at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    calendar::to_utc(local(day, hour, minute), kst())
}

/// Monday 05:00 KST after the test week, past the default cutover.
pub(super) fn after_cutover() -> DateTime<Utc> {
    kst_at(date(2025, 10, 20), 5, 0)
}

pub(super) fn event(id: &str, who: &str, day: NaiveDate, hour: u32, minute: u32) -> CheckInEvent {
    CheckInEvent {
        id: CheckInId(id.to_string()),
        participant_id: participant(who),
        challenge_id: challenge(),
        timestamp: kst_at(day, hour, minute),
        raw_tag: format!("{TAG} done"),
    }
}

pub(super) fn submission(who: &str, day: NaiveDate, hour: u32, minute: u32) -> CheckInSubmission {
    CheckInSubmission {
        id: None,
        participant_id: participant(who),
        timestamp: kst_at(day, hour, minute),
        raw_tag: TAG.to_string(),
    }
}

pub(super) type MemoryService = AttendanceService<InMemoryAttendanceStore, RecordingChat>;

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryAttendanceStore>,
    Arc<RecordingChat>,
) {
    let store = Arc::new(InMemoryAttendanceStore::default());
    let chat = Arc::new(RecordingChat::default());
    let service = AttendanceService::new(store.clone(), chat.clone(), AttendanceSettings::default());
    service.save_policy(policy()).expect("standard policy is valid");
    (service, store, chat)
}

/// Alice verifies every morning and three evenings; Bob shows up once per slot.
pub(super) fn record_sample_week(service: &MemoryService) {
    let challenge = challenge();
    for day in calendar::week_days(week()) {
        service
            .record_check_in(&challenge, submission("alice", day, 7, 15))
            .expect("morning check-in stored");
    }
    for offset in 0..3 {
        let day = week() + chrono::Duration::days(offset);
        service
            .record_check_in(&challenge, submission("alice", day, 21, 0))
            .expect("daily check-in stored");
    }
    service
        .record_check_in(&challenge, submission("bob", date(2025, 10, 13), 9, 0))
        .expect("bob morning stored");
    service
        .record_check_in(&challenge, submission("bob", date(2025, 10, 13), 18, 0))
        .expect("bob daily stored");
}

#[derive(Default)]
pub(super) struct RecordingChat {
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    added: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<(String, String)>>,
    failing_member: Mutex<Option<String>>,
    fail_deletes: AtomicBool,
}

impl RecordingChat {
    pub(super) fn fail_on_member(&self, member: &str) {
        *self.failing_member.lock().expect("lock") = Some(member.to_string());
    }

    pub(super) fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub(super) fn created(&self) -> Vec<String> {
        self.created.lock().expect("lock").clone()
    }

    pub(super) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("lock").clone()
    }

    pub(super) fn added(&self) -> Vec<(String, String)> {
        self.added.lock().expect("lock").clone()
    }

    pub(super) fn removed(&self) -> Vec<(String, String)> {
        self.removed.lock().expect("lock").clone()
    }

    fn check_member(&self, member_id: &str) -> Result<(), ChatError> {
        match self.failing_member.lock().expect("lock").as_deref() {
            Some(failing) if failing == member_id => Err(ChatError::Rejected {
                code: "50013".to_string(),
                message: "missing permissions".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl ChatPlatform for RecordingChat {
    fn create_channel(&self, request: &ChannelRequest) -> Result<String, ChatError> {
        let mut created = self.created.lock().expect("lock");
        created.push(request.name.clone());
        Ok(format!("chan-{}", created.len()))
    }

    fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("gateway timeout".to_string()));
        }
        self.deleted.lock().expect("lock").push(channel_id.to_string());
        Ok(())
    }

    fn add_member(&self, channel_id: &str, member_id: &str) -> Result<(), ChatError> {
        self.check_member(member_id)?;
        self.added
            .lock()
            .expect("lock")
            .push((channel_id.to_string(), member_id.to_string()));
        Ok(())
    }

    fn remove_member(&self, channel_id: &str, member_id: &str) -> Result<(), ChatError> {
        self.check_member(member_id)?;
        self.removed
            .lock()
            .expect("lock")
            .push((channel_id.to_string(), member_id.to_string()));
        Ok(())
    }

    fn list_categories(&self, _guild_id: &str) -> Result<Vec<GuildCategory>, ChatError> {
        Ok(vec![GuildCategory {
            id: "cat-1".to_string(),
            name: "Challenges".to_string(),
        }])
    }

    fn list_members(&self, _guild_id: &str) -> Result<Vec<GuildMember>, ChatError> {
        Ok(vec![GuildMember {
            id: "alice".to_string(),
            display_name: "Alice".to_string(),
        }])
    }
}

pub(super) fn channel_request() -> ChannelRequest {
    ChannelRequest {
        name: "morning-club".to_string(),
        guild_id: "guild-1".to_string(),
        category_id: Some("cat-1".to_string()),
        kind: Default::default(),
        is_private: false,
    }
}

/// Delegates to the in-memory store but can be switched offline, or made to
/// fail only when the batch ledger entry is written.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryAttendanceStore,
    offline: AtomicBool,
    fail_batch_writes: AtomicBool,
}

impl FlakyStore {
    pub(super) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(super) fn set_fail_batch_writes(&self, fail: bool) {
        self.fail_batch_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AttendanceStore for FlakyStore {
    fn save_policy(&self, policy: PolicyConfig) -> Result<PolicyConfig, StoreError> {
        self.check()?;
        self.inner.save_policy(policy)
    }

    fn fetch_policy(&self, challenge_id: &ChallengeId) -> Result<Option<PolicyConfig>, StoreError> {
        self.check()?;
        self.inner.fetch_policy(challenge_id)
    }

    fn enroll(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.enroll(challenge_id, participant_id)
    }

    fn participants(&self, challenge_id: &ChallengeId) -> Result<Vec<ParticipantId>, StoreError> {
        self.check()?;
        self.inner.participants(challenge_id)
    }

    fn insert_check_in(&self, event: CheckInEvent) -> Result<CheckInEvent, StoreError> {
        self.check()?;
        self.inner.insert_check_in(event)
    }

    fn check_ins_between(
        &self,
        challenge_id: &ChallengeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckInEvent>, StoreError> {
        self.check()?;
        self.inner.check_ins_between(challenge_id, from, to)
    }

    fn upsert_weekly_status(&self, status: ParticipantWeeklyStatus) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_weekly_status(status)
    }

    fn fetch_weekly_status(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
        week_start: NaiveDate,
    ) -> Result<Option<ParticipantWeeklyStatus>, StoreError> {
        self.check()?;
        self.inner
            .fetch_weekly_status(challenge_id, participant_id, week_start)
    }

    fn weekly_statuses(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
        page: PageRequest,
    ) -> Result<Page<ParticipantWeeklyStatus>, StoreError> {
        self.check()?;
        self.inner.weekly_statuses(challenge_id, week_start, page)
    }

    fn fetch_standing(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<Option<ParticipantStanding>, StoreError> {
        self.check()?;
        self.inner.fetch_standing(challenge_id, participant_id)
    }

    fn upsert_standing(&self, standing: ParticipantStanding) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_standing(standing)
    }

    fn fetch_batch(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyBatchRecord>, StoreError> {
        self.check()?;
        self.inner.fetch_batch(challenge_id, week_start)
    }

    fn record_batch(&self, batch: WeeklyBatchRecord) -> Result<(), StoreError> {
        self.check()?;
        if self.fail_batch_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".to_string()));
        }
        self.inner.record_batch(batch)
    }

    fn delete_challenge(&self, challenge_id: &ChallengeId) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete_challenge(challenge_id)
    }
}

impl ChannelDirectory for FlakyStore {
    fn channel_for(&self, challenge_id: &ChallengeId) -> Result<Option<ChannelRecord>, StoreError> {
        self.check()?;
        self.inner.channel_for(challenge_id)
    }

    fn save_channel(&self, record: ChannelRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_channel(record)
    }

    fn remove_channel(
        &self,
        challenge_id: &ChallengeId,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        self.check()?;
        self.inner.remove_channel(challenge_id)
    }
}

pub(super) fn members(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
