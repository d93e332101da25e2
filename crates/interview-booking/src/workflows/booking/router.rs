use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{Actor, ActorRole, BookingId, SlotId, SlotInput};
use super::engine::BookingRequestInput;
use super::error::BookingError;
use super::service::BookingService;

/// Header carrying the verified actor id, set by the upstream auth middleware.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the verified actor role (`candidate` or `interviewer`).
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Deserialize)]
pub(crate) struct AddAvailabilityBody {
    #[serde(default)]
    dates: Vec<SlotInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteAvailabilityBody {
    #[serde(default)]
    slot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateInterviewRequestBody {
    #[serde(default)]
    interview_request_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Router builder exposing the availability and booking endpoints.
pub fn booking_router(service: Arc<BookingService>) -> Router {
    Router::new()
        .route("/interviewer/addAvailability", post(add_availability_handler))
        .route(
            "/interviewer/deleteAvailability",
            delete(delete_availability_handler),
        )
        .route("/interviewer/getAvailability", get(get_availability_handler))
        .route(
            "/interviewer/getInterviewRequests",
            get(interview_requests_handler),
        )
        .route(
            "/interviewer/updateInterviewRequest",
            put(update_interview_request_handler),
        )
        .route(
            "/interviewer/resendConfirmation",
            post(resend_confirmation_handler),
        )
        .route("/candidate/interviewers", get(interviewers_handler))
        .route("/candidate/schedule", post(schedule_handler))
        .route("/candidate/myInterviews", get(my_interviews_handler))
        .with_state(service)
}

pub(crate) async fn add_availability_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
    Json(body): Json<AddAvailabilityBody>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.add_availability(&actor, body.dates).await {
        Ok(availability) => (
            StatusCode::OK,
            Json(json!({ "success": true, "availability": availability })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_availability_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
    Json(body): Json<DeleteAvailabilityBody>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Some(slot_id) = body.slot_id.filter(|id| !id.trim().is_empty()) else {
        return error_response(BookingError::Validation("slotId is required".to_string()));
    };
    match service
        .delete_availability(&actor, &SlotId(slot_id))
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Availability deleted successfully" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_availability_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.availability(&actor).await {
        Ok(availability) => (
            StatusCode::OK,
            Json(json!({ "success": true, "availability": availability })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn interviewers_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.interviewers(&actor).await {
        Ok(interviewers) => (
            StatusCode::OK,
            Json(json!({ "success": true, "interviewers": interviewers })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn schedule_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
    Json(body): Json<BookingRequestInput>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.schedule(&actor, body).await {
        Ok(interviews) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "interviews": interviews })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn my_interviews_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.my_interviews(&actor).await {
        Ok(interviews) => (
            StatusCode::OK,
            Json(json!({ "success": true, "interviews": interviews })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn interview_requests_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.interview_requests(&actor).await {
        Ok(requests) => (
            StatusCode::OK,
            Json(json!({ "success": true, "interviewRequests": requests })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_interview_request_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
    Json(body): Json<UpdateInterviewRequestBody>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let (Some(id), Some(status)) = (body.interview_request_id, body.status) else {
        return error_response(BookingError::Validation(
            "interviewRequestId and status are required".to_string(),
        ));
    };
    match service
        .update_interview_request(&actor, &BookingId(id), &status)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "booking": outcome.booking,
                "notice": outcome.notice,
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn resend_confirmation_handler(
    State(service): State<Arc<BookingService>>,
    headers: HeaderMap,
    Json(body): Json<UpdateInterviewRequestBody>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Some(id) = body.interview_request_id else {
        return error_response(BookingError::Validation(
            "interviewRequestId is required".to_string(),
        ));
    };
    match service.resend_confirmation(&actor, &BookingId(id)).await {
        Ok(notice) => (
            StatusCode::OK,
            Json(json!({ "success": true, "notice": notice })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// Reads the identity forwarded by the auth middleware.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(ActorRole::parse);

    match (id, role) {
        (Some(id), Some(role)) => Ok(Actor {
            id: id.to_string(),
            role,
        }),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "missing or invalid actor identity" })),
        )
            .into_response()),
    }
}

pub(crate) fn status_for(err: &BookingError) -> StatusCode {
    match err {
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Conflict(_) => StatusCode::CONFLICT,
        BookingError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        BookingError::Consistency { .. } | BookingError::Store(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub(crate) fn error_response(err: BookingError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "booking request failed");
    }
    let payload = json!({
        "success": false,
        "error": err.to_string(),
        "retryable": err.is_retryable(),
    });
    (status, Json(payload)).into_response()
}
