//! LLM provider CRUD plus activation and connection testing (§6): thin
//! wrappers over `LlmService`, mirroring the shape of the domain CRUD
//! handlers but delegating every DB touch to the service instead of raw SQL.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::models::{CreateProviderRequest, LlmProviderInfo, LlmUsageStats, TestConnectionResponse, UpdateProviderRequest};
use crate::services::LlmService;
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    get,
    path = "/llm/providers",
    responses((status = 200, description = "Configured LLM providers", body = [LlmProviderInfo])),
    tag = "LlmProviders"
)]
pub async fn list_providers(State(state): State<AppState>) -> ApiResult<Json<Vec<LlmProviderInfo>>> {
    Ok(Json(state.llm_service.list_providers().await?))
}

#[utoipa::path(
    get,
    path = "/llm/providers/{id}",
    responses(
        (status = 200, description = "Provider found", body = LlmProviderInfo),
        (status = 404, description = "Provider not found"),
    ),
    tag = "LlmProviders"
)]
pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LlmProviderInfo>> {
    let provider = state.llm_service.get_provider(id).await?.ok_or_else(|| ApiError::NotFound(format!("LLM provider {id}")))?;
    Ok(Json(provider))
}

#[utoipa::path(
    post,
    path = "/llm/providers",
    request_body = CreateProviderRequest,
    responses((status = 200, description = "Provider created", body = LlmProviderInfo)),
    tag = "LlmProviders"
)]
pub async fn create_provider(
    State(state): State<AppState>,
    Json(req): Json<CreateProviderRequest>,
) -> ApiResult<Json<LlmProviderInfo>> {
    let provider = state.llm_service.create_provider(req).await?;
    Ok(Json(LlmProviderInfo::from(&provider)))
}

#[utoipa::path(
    patch,
    path = "/llm/providers/{id}",
    request_body = UpdateProviderRequest,
    responses(
        (status = 200, description = "Provider updated", body = LlmProviderInfo),
        (status = 404, description = "Provider not found"),
    ),
    tag = "LlmProviders"
)]
pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProviderRequest>,
) -> ApiResult<Json<LlmProviderInfo>> {
    let provider = state.llm_service.update_provider(id, req).await?;
    Ok(Json(LlmProviderInfo::from(&provider)))
}

#[utoipa::path(
    delete,
    path = "/llm/providers/{id}",
    responses((status = 204, description = "Provider deleted")),
    tag = "LlmProviders"
)]
pub async fn delete_provider(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.llm_service.delete_provider(id).await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/llm/providers/{id}/activate",
    responses((status = 204, description = "Provider activated, all others deactivated")),
    tag = "LlmProviders"
)]
pub async fn activate_provider(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.llm_service.activate_provider(id).await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/llm/providers/{id}/deactivate",
    responses((status = 204, description = "Provider deactivated")),
    tag = "LlmProviders"
)]
pub async fn deactivate_provider(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.llm_service.deactivate_provider(id).await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/llm/providers/{id}/test",
    responses((status = 200, description = "Connection test result", body = TestConnectionResponse)),
    tag = "LlmProviders"
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TestConnectionResponse>> {
    Ok(Json(state.llm_service.test_connection(id).await?))
}

#[utoipa::path(
    get,
    path = "/llm/providers/{id}/usage",
    responses((status = 200, description = "Recent token usage for this provider", body = [LlmUsageStats])),
    tag = "LlmProviders"
)]
pub async fn usage_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<LlmUsageStats>>> {
    Ok(Json(state.llm_service.get_usage_stats(id).await?))
}
