use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::channels::{ChannelDirectory, ChatPlatform};
use super::domain::{ChallengeId, ParticipantId};
use super::policy::{PolicyConfig, PolicyError};
use super::repository::{AttendanceStore, PageRequest, StoreError};
use super::service::{AttendanceService, AttendanceServiceError, CheckInSubmission};
use super::views::ClassificationView;

type SharedService<S, P> = Arc<AttendanceService<S, P>>;

/// Router builder exposing policy, check-in and weekly evaluation endpoints.
pub fn attendance_router<S, P>(service: SharedService<S, P>) -> Router
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    Router::new()
        .route(
            "/api/v1/challenges/:challenge_id/policy",
            get(get_policy_handler::<S, P>).put(put_policy_handler::<S, P>),
        )
        .route(
            "/api/v1/challenges/:challenge_id/check-ins",
            post(check_in_handler::<S, P>),
        )
        .route(
            "/api/v1/challenges/:challenge_id/weeks/:week_start/evaluate",
            post(evaluate_week_handler::<S, P>),
        )
        .route(
            "/api/v1/challenges/:challenge_id/weeks/:week_start/statuses",
            get(weekly_statuses_handler::<S, P>),
        )
        .route(
            "/api/v1/challenges/:challenge_id/days/:day",
            get(daily_overview_handler::<S, P>),
        )
        .route(
            "/api/v1/challenges/:challenge_id/participants/:participant_id/reset",
            post(reset_participant_handler::<S, P>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

impl PageQuery {
    fn request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.per_page.unwrap_or(defaults.per_page),
        )
    }
}

pub(crate) async fn put_policy_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path(challenge_id): Path<String>,
    axum::Json(mut policy): axum::Json<PolicyConfig>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    policy.challenge_id = ChallengeId(challenge_id);
    match service.save_policy(policy) {
        Ok(stored) => (StatusCode::OK, axum::Json(stored)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_policy_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path(challenge_id): Path<String>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    match service.policy(&ChallengeId(challenge_id)) {
        Ok(policy) => (StatusCode::OK, axum::Json(policy)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn check_in_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path(challenge_id): Path<String>,
    axum::Json(submission): axum::Json<CheckInSubmission>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    match service.record_check_in(&ChallengeId(challenge_id), submission) {
        Ok(verification) => (
            StatusCode::CREATED,
            axum::Json(ClassificationView::from(&verification)),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn evaluate_week_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path((challenge_id, week_start)): Path<(String, String)>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    let week_start = match parse_day(&week_start) {
        Ok(day) => day,
        Err(response) => return response,
    };

    match service.run_weekly_batch(&ChallengeId(challenge_id), week_start, Utc::now()) {
        Ok(batch) => (StatusCode::OK, axum::Json(batch)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn weekly_statuses_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path((challenge_id, week_start)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    let week_start = match parse_day(&week_start) {
        Ok(day) => day,
        Err(response) => return response,
    };

    match service.weekly_statuses(&ChallengeId(challenge_id), week_start, query.request()) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn daily_overview_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path((challenge_id, day)): Path<(String, String)>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    let day = match parse_day(&day) {
        Ok(day) => day,
        Err(response) => return response,
    };

    match service.daily_overview(&ChallengeId(challenge_id), day, Utc::now()) {
        Ok(overview) => (StatusCode::OK, axum::Json(overview)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reset_participant_handler<S, P>(
    State(service): State<SharedService<S, P>>,
    Path((challenge_id, participant_id)): Path<(String, String)>,
) -> Response
where
    S: AttendanceStore + ChannelDirectory + 'static,
    P: ChatPlatform + 'static,
{
    match service.reset_participant(
        &ChallengeId(challenge_id),
        &ParticipantId(participant_id),
    ) {
        Ok(standing) => (StatusCode::OK, axum::Json(standing)).into_response(),
        Err(err) => error_response(err),
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate, Response> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        let payload = json!({
            "error": format!("'{raw}' is not a YYYY-MM-DD date"),
        });
        (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
    })
}

fn error_response(err: AttendanceServiceError) -> Response {
    match err {
        AttendanceServiceError::Policy(PolicyError::Invalid(violations)) => {
            let payload = json!({
                "error": "invalid challenge policy",
                "fields": violations,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        AttendanceServiceError::Store(StoreError::NotFound) => {
            let payload = json!({ "error": "not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        AttendanceServiceError::Store(StoreError::Conflict) => {
            let payload = json!({ "error": "record already exists" });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        AttendanceServiceError::WeekStillOpen { .. }
        | AttendanceServiceError::WeekOutOfOrder { .. } => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        other if other.is_retryable() => {
            let payload = json!({
                "error": other.to_string(),
                "retryable": true,
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
