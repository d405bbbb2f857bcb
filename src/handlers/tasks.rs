//! `GET /tasks/{id}` (§6): read-only view onto the task tracker.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::models::TaskResponse;
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    responses(
        (status = 200, description = "Task status", body = TaskResponse),
        (status = 404, description = "Task not found"),
    ),
    tag = "Tasks"
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<TaskResponse>> {
    let task = state.tasks.get(&id).await?.ok_or_else(|| ApiError::TaskNotFound(id.clone()))?;
    Ok(Json(TaskResponse::from(&task)))
}
