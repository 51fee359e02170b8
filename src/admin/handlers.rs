use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::error::TrackerError;
use crate::health::{CheckStats, CurrentEndpoints};
use crate::tracker::{FallbackTracker, TrackingStatus};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub trackers: Vec<TrackerSummary>,
}

#[derive(Serialize)]
pub struct TrackerSummary {
    pub key: String,
    pub status: TrackingStatus,
    pub primary: Option<String>,
    pub eligible: usize,
    pub endpoints: usize,
}

impl TrackerSummary {
    fn of<S: CheckStats>(tracker: &FallbackTracker<S>) -> Self {
        let snapshot = tracker.peek();
        Self {
            key: tracker.tracker_key().to_string(),
            status: tracker.status(),
            primary: snapshot.primary.clone(),
            eligible: snapshot.endpoint_stats.iter().filter(|s| !s.is_banned()).count(),
            endpoints: snapshot.endpoint_stats.len(),
        }
    }
}

/// Admin error body.
pub struct ApiError(TrackerError);

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TrackerError::UnknownTracker(_) | TrackerError::UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
            TrackerError::NoEligibleEndpoint { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub async fn get_status<S: CheckStats>(State(state): State<AdminState<S>>) -> Json<SystemStatus> {
    let trackers = state
        .registry
        .trackers()
        .iter()
        .map(TrackerSummary::of)
        .collect();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        trackers,
    })
}

/// Every group's latest snapshot. Does not count as use.
pub async fn list_endpoints<S: CheckStats>(
    State(state): State<AdminState<S>>,
) -> Json<Vec<CurrentEndpoints<S>>> {
    let snapshots = state
        .registry
        .trackers()
        .iter()
        .map(|t| CurrentEndpoints::clone(&t.peek()))
        .collect();
    Json(snapshots)
}

/// One group's latest snapshot. Does not count as use.
pub async fn get_endpoints<S: CheckStats>(
    State(state): State<AdminState<S>>,
    Path(key): Path<String>,
) -> Result<Json<CurrentEndpoints<S>>, ApiError> {
    let tracker = state.registry.try_get(&key)?;
    Ok(Json(CurrentEndpoints::clone(&tracker.peek())))
}

/// Consumer access over HTTP: marks the group as used and starts tracking.
pub async fn get_current<S: CheckStats>(
    State(state): State<AdminState<S>>,
    Path(key): Path<String>,
) -> Result<Json<CurrentEndpoints<S>>, ApiError> {
    let tracker = state.registry.try_get(&key)?;
    Ok(Json(CurrentEndpoints::clone(&tracker.current_endpoints())))
}
