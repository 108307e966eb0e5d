use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ChallengeId, CheckInEvent, ParticipantId, ParticipantStanding, ParticipantWeeklyStatus,
    WeeklyBatchRecord,
};
use super::policy::{FieldError, PolicyConfig};

/// Record-store seam for the attendance engine. Writes are upserts keyed the
/// way a retried weekly batch expects.
pub trait AttendanceStore: Send + Sync {
    fn save_policy(&self, policy: PolicyConfig) -> Result<PolicyConfig, StoreError>;
    fn fetch_policy(&self, challenge_id: &ChallengeId)
        -> Result<Option<PolicyConfig>, StoreError>;

    /// Idempotent: enrolling twice is not an error.
    fn enroll(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<(), StoreError>;
    fn participants(&self, challenge_id: &ChallengeId) -> Result<Vec<ParticipantId>, StoreError>;

    fn insert_check_in(&self, event: CheckInEvent) -> Result<CheckInEvent, StoreError>;
    /// Check-ins with `from <= timestamp < to`, oldest first.
    fn check_ins_between(
        &self,
        challenge_id: &ChallengeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckInEvent>, StoreError>;

    /// Keyed by (participant_id, week_start) within the challenge.
    fn upsert_weekly_status(&self, status: ParticipantWeeklyStatus) -> Result<(), StoreError>;
    fn fetch_weekly_status(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
        week_start: NaiveDate,
    ) -> Result<Option<ParticipantWeeklyStatus>, StoreError>;
    /// Sorted by participant id.
    fn weekly_statuses(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
        page: PageRequest,
    ) -> Result<Page<ParticipantWeeklyStatus>, StoreError>;

    fn fetch_standing(
        &self,
        challenge_id: &ChallengeId,
        participant_id: &ParticipantId,
    ) -> Result<Option<ParticipantStanding>, StoreError>;
    fn upsert_standing(&self, standing: ParticipantStanding) -> Result<(), StoreError>;

    fn fetch_batch(
        &self,
        challenge_id: &ChallengeId,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyBatchRecord>, StoreError>;
    fn record_batch(&self, batch: WeeklyBatchRecord) -> Result<(), StoreError>;

    /// Cascade removal of everything owned by the challenge.
    fn delete_challenge(&self, challenge_id: &ChallengeId) -> Result<(), StoreError>;
}

/// Error enumeration for record-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record rejected by the store ({} field error(s))", .0.len())]
    Validation(Vec<FieldError>),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient failures where re-running the whole batch is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// 1-based pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const MAX_PER_PAGE: u32 = 200;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 50)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: usize,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slice an already sorted collection.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total_items = all.len();
        let per_page = request.per_page.max(1) as usize;
        let total_pages = total_items.div_ceil(per_page) as u32;
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(per_page)
            .collect();

        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total_items,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}
