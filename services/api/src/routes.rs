use crate::infra::{deserialize_date, AppState};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use challenge_ops::error::AppError;
use challenge_ops::workflows::attendance::{
    attendance_router, calendar, AttendanceService, AttendanceServiceError, AttendanceStore,
    ChannelDirectory, ChatPlatform, CheckInImporter, ParticipantId, PolicyConfig,
    VerificationClassifier, WeekGrid, WeeklyAggregator,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

/// Dry run of one week against a draft policy, without touching stored data.
#[derive(Debug, Deserialize)]
pub(crate) struct WeekPreviewRequest {
    pub(crate) policy: PolicyConfig,
    #[serde(deserialize_with = "deserialize_date")]
    pub(crate) week_start: NaiveDate,
    /// Export in the `participant_id,timestamp,raw_tag[,id]` layout.
    pub(crate) check_ins_csv: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct WeekPreviewResponse {
    pub(crate) week_start: NaiveDate,
    pub(crate) check_ins: usize,
    pub(crate) rejected: usize,
    pub(crate) participants: Vec<WeekPreviewRow>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WeekPreviewRow {
    pub(crate) participant_id: ParticipantId,
    pub(crate) grid: WeekGrid,
    pub(crate) weekly_morning_count: u8,
    pub(crate) weekly_daily_count: u8,
    pub(crate) would_demote: bool,
}

pub(crate) fn with_attendance_routes<S, P>(service: Arc<AttendanceService<S, P>>) -> axum::Router
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    attendance_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/attendance/preview",
            axum::routing::post(week_preview_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn week_preview_endpoint(
    Json(payload): Json<WeekPreviewRequest>,
) -> Result<Json<WeekPreviewResponse>, AppError> {
    let WeekPreviewRequest {
        policy,
        week_start,
        check_ins_csv,
    } = payload;

    policy.validate().map_err(AttendanceServiceError::from)?;

    let reader = Cursor::new(check_ins_csv.into_bytes());
    let events = CheckInImporter::from_reader(reader, &policy.challenge_id)?;
    let classifier = VerificationClassifier::new(&policy);
    let classified: Vec<_> = events
        .iter()
        .map(|event| classifier.classify_event(event))
        .collect();
    let rejected = classified
        .iter()
        .filter(|verification| !verification.classification.counts())
        .count();

    let week_start = calendar::week_start(week_start);
    let participants = WeeklyAggregator::new(week_start)
        .aggregate_by_participant(&classified)
        .into_iter()
        .map(|(participant_id, tally)| WeekPreviewRow {
            participant_id,
            grid: tally.grid,
            weekly_morning_count: tally.morning_count,
            weekly_daily_count: tally.daily_count,
            would_demote: policy.demotes(tally.morning_count, tally.daily_count),
        })
        .collect();

    Ok(Json(WeekPreviewResponse {
        week_start,
        check_ins: events.len(),
        rejected,
        participants,
    }))
}
