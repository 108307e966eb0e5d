//! Attendance policy engine for habit challenges.
//!
//! Raw check-ins are classified against a per-challenge [`PolicyConfig`],
//! folded into Sunday-start weekly grids, and evaluated once per closed week
//! to move participants between `active`, `revival_pending` and `rest`.
//! Classifications and grids are always derived from the raw events; only
//! the weekly roll-up and the participant standing are persisted.

pub mod aggregator;
pub mod calendar;
pub mod channels;
pub mod classifier;
pub mod domain;
pub mod import;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod streak;
pub mod transition;
pub mod views;

#[cfg(test)]
mod tests;

pub use aggregator::{WeeklyAggregator, WeeklyTally};
pub use calendar::WeekCutover;
pub use channels::{
    ChannelDirectory, ChannelKind, ChannelRecord, ChannelRequest, ChannelSync, ChannelSyncError,
    ChatError, ChatPlatform, GuildCategory, GuildMember, MembershipChange,
};
pub use classifier::VerificationClassifier;
pub use domain::{
    ChallengeId, CheckInEvent, CheckInId, Classification, ClassifiedVerification, DayCells,
    DayMark, Outcome, ParticipantId, ParticipantStanding, ParticipantState,
    ParticipantWeeklyStatus, Slot, StateTransition, WeekGrid, WeeklyBatchRecord,
};
pub use import::{CheckInImportError, CheckInImporter};
pub use memory::InMemoryAttendanceStore;
pub use policy::{DemotionMode, FieldError, HourWindow, PolicyConfig, PolicyError};
pub use repository::{AttendanceStore, Page, PageRequest, StoreError};
pub use router::attendance_router;
pub use service::{AttendanceService, AttendanceServiceError, CheckInSubmission, ImportSummary};
pub use streak::{Badge, StreakCalculator, BADGE_CATALOG};
pub use transition::StatusTransitionEvaluator;
pub use views::{
    ClassificationView, DailyAttendanceRow, DailyOverview, SlotStatus, WeeklyStatusView,
};
