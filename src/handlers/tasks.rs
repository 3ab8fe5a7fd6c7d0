//! # Task Handlers
//!
//! Endpoints invoked by App Engine task queues and cron. Mounted behind
//! [`crate::environment::task_only`].

use axum::{extract::State, response::Json};

use crate::error::ApiError;
use crate::models::ClearSessionsResponse;
use crate::server::AppState;

pub const CLEAR_SESSIONS_PATH: &str = "/tasks/clearsessions";

/// Purge expired sessions
///
/// Accepts GET as well as POST since App Engine cron issues GET requests.
#[utoipa::path(
    post,
    path = "/tasks/clearsessions",
    responses(
        (status = 200, description = "Expired sessions removed", body = ClearSessionsResponse),
        (status = 403, description = "Not invoked from a task queue or cron", body = ApiError),
        (status = 500, description = "Session storage unavailable", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn clear_sessions(
    State(state): State<AppState>,
) -> Result<Json<ClearSessionsResponse>, ApiError> {
    let removed = state.sessions.store().clear_expired().await?;

    tracing::info!(removed, "Cleared expired sessions");
    Ok(Json(ClearSessionsResponse { removed }))
}
