use crate::lock::LockManager;
use crate::{Error, LockId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: LockManager,
    /// When set, every request must carry this token or it is turned away
    /// with 401 before anything else happens.
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireRequest {
    key: Option<String>,
    // `concurrentKeys` is the legacy name for the same field.
    #[serde(alias = "concurrentKeys")]
    maximum_locks: Option<u64>,
    ttl_seconds: Option<f64>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAcquireRequest {
    keys: Option<Vec<String>>,
    maximum_locks: Option<u64>,
    ttl_seconds: Option<f64>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseRequest {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountParams {
    key: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcquireResponse {
    lock_id: LockId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchAcquireResponse {
    lock_ids: HashMap<String, LockId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CountResponse {
    held_locks: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lock", post(acquire_lock).get(count_locks))
        .route("/lock/:lock_id", delete(release_lock))
        .route("/locks", post(acquire_locks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn token_ok(expected: Option<&str>, provided: Option<&str>) -> bool {
    match expected {
        Some(expected) => provided == Some(expected),
        None => true,
    }
}

/// TTLs must be positive, finite and representable; anything else is the
/// caller's mistake, not a refusal.
fn parse_ttl(ttl_seconds: Option<f64>) -> Option<Duration> {
    ttl_seconds
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn store_failure(err: &Error) -> Response {
    error!("lease store failure: {err}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn acquire_lock(
    State(state): State<AppState>,
    body: Option<Json<AcquireRequest>>,
) -> Response {
    // A missing or unparsable body reads as an empty request so the token
    // check still runs first.
    let request = body.map(|Json(request)| request).unwrap_or_default();
    if !token_ok(state.token.as_deref(), request.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (Some(key), Some(maximum_locks), Some(ttl)) = (
        request.key,
        request.maximum_locks,
        parse_ttl(request.ttl_seconds),
    ) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state.manager.acquire(&key, maximum_locks, ttl).await {
        Ok(Some(lock_id)) => {
            (StatusCode::CREATED, Json(AcquireResponse { lock_id })).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_failure(&err),
    }
}

async fn acquire_locks(
    State(state): State<AppState>,
    body: Option<Json<BatchAcquireRequest>>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    if !token_ok(state.token.as_deref(), request.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (Some(keys), Some(maximum_locks), Some(ttl)) = (
        request.keys,
        request.maximum_locks,
        parse_ttl(request.ttl_seconds),
    ) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state.manager.acquire_many(&keys, maximum_locks, ttl).await {
        Ok(Some(lock_ids)) => {
            (StatusCode::CREATED, Json(BatchAcquireResponse { lock_ids })).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_failure(&err),
    }
}

async fn release_lock(
    State(state): State<AppState>,
    Path(lock_id): Path<String>,
    body: Option<Json<ReleaseRequest>>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    if !token_ok(state.token.as_deref(), request.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Idempotent: releasing an unknown or expired id is still a 204.
    match state.manager.release(&lock_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_failure(&err),
    }
}

async fn count_locks(
    State(state): State<AppState>,
    Query(params): Query<CountParams>,
) -> Response {
    if !token_ok(state.token.as_deref(), params.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(key) = params.key else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    // Advisory head count; it may be stale by the time the caller sees it.
    match state.manager.count(&key).await {
        Ok(held_locks) => (StatusCode::OK, Json(CountResponse { held_locks })).into_response(),
        Err(err) => store_failure(&err),
    }
}
