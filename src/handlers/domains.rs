//! Domain CRUD and the three enqueue endpoints (§6): refresh, refresh-gsc,
//! ai-analyze. Each enqueue handler creates a `Task` row and hands the real
//! work to a spawned background future; the HTTP response only ever carries
//! the task id, the caller polls `GET /tasks/{id}` for progress.

use axum::Json;
use axum::extract::{Path, State};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::AppState;
use crate::models::{CreateDomainRequest, Domain, DomainResponse, Task, TaskType, UpdateGitConfigRequest};
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    post,
    path = "/domains",
    request_body = CreateDomainRequest,
    responses((status = 200, description = "Domain registered", body = DomainResponse)),
    tag = "Domains"
)]
pub async fn create_domain(
    State(state): State<AppState>,
    Json(req): Json<CreateDomainRequest>,
) -> ApiResult<Json<DomainResponse>> {
    let domain: Domain = sqlx::query_as(
        "INSERT INTO domains (hostname, scheme, owner_id) VALUES (?, ?, ?) RETURNING *",
    )
    .bind(&req.hostname)
    .bind(&req.scheme)
    .bind(&req.owner_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DomainResponse::from(&domain)))
}

#[utoipa::path(
    get,
    path = "/domains",
    responses((status = 200, description = "All registered domains", body = Vec<DomainResponse>)),
    tag = "Domains"
)]
pub async fn list_domains(State(state): State<AppState>) -> ApiResult<Json<Vec<DomainResponse>>> {
    let domains: Vec<Domain> = sqlx::query_as("SELECT * FROM domains ORDER BY id").fetch_all(&state.db).await?;
    Ok(Json(domains.iter().map(DomainResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/domains/{id}",
    responses(
        (status = 200, description = "Domain detail", body = DomainResponse),
        (status = 404, description = "Domain not found"),
    ),
    tag = "Domains"
)]
pub async fn get_domain(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<DomainResponse>> {
    let domain = load_domain(&state, id).await?;
    Ok(Json(DomainResponse::from(&domain)))
}

#[utoipa::path(
    put,
    path = "/domains/{id}/git-config",
    request_body = UpdateGitConfigRequest,
    responses((status = 200, description = "Git config updated", body = DomainResponse)),
    tag = "Domains"
)]
pub async fn update_git_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateGitConfigRequest>,
) -> ApiResult<Json<DomainResponse>> {
    load_domain(&state, id).await?;

    let domain: Domain = sqlx::query_as(
        r#"
        UPDATE domains SET
            git_repo_url = COALESCE(?, git_repo_url),
            git_branch = COALESCE(?, git_branch),
            git_target_path = COALESCE(?, git_target_path),
            git_credential = COALESCE(?, git_credential),
            git_framework_hint = COALESCE(?, git_framework_hint),
            updated_at = datetime('now')
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&req.repo_url)
    .bind(&req.branch)
    .bind(&req.target_path)
    .bind(&req.credential)
    .bind(&req.framework_hint)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DomainResponse::from(&domain)))
}

#[utoipa::path(
    post,
    path = "/domains/{id}/refresh",
    responses((status = 200, description = "Full refresh enqueued", body = Task)),
    tag = "Domains"
)]
pub async fn trigger_refresh(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Task>> {
    load_domain(&state, id).await?;
    let task = state.tasks.create(TaskType::Refresh, Some(id)).await?;

    let tasks = Arc::clone(&state.tasks);
    let orchestrator = Arc::clone(&state.refresh_orchestrator);
    let task_id = task.id.clone();
    tokio::spawn(async move {
        let _ = tasks.mark_running(&task_id).await;
        let progress = tasks.progress_callback(task_id.clone());
        let result = orchestrator.run_full_refresh(id, Arc::new(AtomicBool::new(false)), progress).await;
        match result {
            Ok(failures) => {
                let _ = tasks.append_failures(&task_id, &failures).await;
                let _ = tasks.mark_completed(&task_id, None).await;
            },
            Err(e) => {
                let _ = tasks.mark_failed(&task_id, e.to_string()).await;
            },
        }
    });

    Ok(Json(task))
}

#[utoipa::path(
    post,
    path = "/domains/{id}/refresh-gsc",
    responses((status = 200, description = "Search Console refresh enqueued", body = Task)),
    tag = "Domains"
)]
pub async fn trigger_refresh_gsc(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Task>> {
    load_domain(&state, id).await?;
    let task = state.tasks.create(TaskType::Refresh, Some(id)).await?;

    let tasks = Arc::clone(&state.tasks);
    let orchestrator = Arc::clone(&state.refresh_orchestrator);
    let task_id = task.id.clone();
    tokio::spawn(async move {
        let _ = tasks.mark_running(&task_id).await;
        match orchestrator.run_gsc_refresh(id).await {
            Ok(()) => {
                let _ = tasks.mark_completed(&task_id, None).await;
            },
            Err(e) => {
                let _ = tasks.mark_failed(&task_id, e.to_string()).await;
            },
        }
    });

    Ok(Json(task))
}

#[utoipa::path(
    post,
    path = "/domains/{id}/ai-analyze",
    responses((status = 200, description = "AI analysis enqueued", body = Task)),
    tag = "Domains"
)]
pub async fn trigger_ai_analyze(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Task>> {
    let domain = load_domain(&state, id).await?;
    let task = state.tasks.create(TaskType::AiAnalysis, Some(id)).await?;

    let tasks = Arc::clone(&state.tasks);
    let engine = Arc::clone(&state.ai_analysis);
    let task_id = task.id.clone();
    tokio::spawn(async move {
        let _ = tasks.mark_running(&task_id).await;
        let progress = tasks.progress_callback(task_id.clone());
        match engine.analyze_domain(&domain, false, &progress).await {
            Ok(outcome) => {
                let result = serde_json::json!({
                    "strategy_summary": outcome.strategy_summary,
                    "suggestion_count": outcome.suggestions.len(),
                    "from_cache": outcome.from_cache,
                })
                .to_string();
                let _ = tasks.mark_completed(&task_id, Some(result)).await;
            },
            Err(e) => {
                let _ = tasks.mark_failed(&task_id, e.to_string()).await;
            },
        }
    });

    Ok(Json(task))
}

async fn load_domain(state: &AppState, id: i64) -> ApiResult<Domain> {
    sqlx::query_as("SELECT * FROM domains WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::DomainNotFound(id.to_string()))
}
