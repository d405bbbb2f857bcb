//! `GET /pages/{id}/analyze` and `?verify=1` (§6): fetches the page's live
//! HTML and runs it through the Issue Detector (C5), either persisting a
//! fresh report or re-verifying previously deployed issues.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::AppState;
use crate::models::{IssueResponse, Page, UpdatePageFieldsRequest};
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    verify: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub health_score: f64,
    pub potential_score_gain: f64,
    pub estimated_fix_minutes: f64,
    pub issues: Vec<IssueResponse>,
}

#[utoipa::path(
    get,
    path = "/pages/{id}/analyze",
    params(("verify" = Option<bool>, Query, description = "re-verify deployed issues instead of persisting a fresh report")),
    responses(
        (status = 200, description = "Analysis report", body = AnalyzeResponse),
        (status = 404, description = "Page not found"),
        (status = 502, description = "Page fetch failed"),
    ),
    tag = "Pages"
)]
pub async fn analyze_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<AnalyzeQuery>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let page: Page = sqlx::query_as("SELECT * FROM pages WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::PageNotFound(id.to_string()))?;

    let base_host: String = sqlx::query_scalar("SELECT hostname FROM domains WHERE id = ?")
        .bind(page.domain_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::PageNotFound(id.to_string()))?;
    let base_host = base_host.strip_prefix("www.").unwrap_or(&base_host).to_string();

    let (lcp_ms, cls): (Option<f64>, Option<f64>) = sqlx::query_as(
        "SELECT lcp, cls FROM seo_metrics_snapshots WHERE page_id = ? ORDER BY taken_at DESC LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .unwrap_or((None, None));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .map_err(|e| ApiError::PageAnalysisError(e.to_string()))?;
    let response = client
        .get(&page.url)
        .send()
        .await
        .map_err(|e| ApiError::ApiConnectionError("page_fetch".to_string(), e.to_string()))?;
    if !response.status().is_success() {
        return Err(ApiError::PageNotAccessible(response.status().as_u16()));
    }
    let html = response.text().await.map_err(|e| ApiError::PageAnalysisError(e.to_string()))?;

    if query.verify {
        state.issue_detector.verify(id, &html, &base_host, lcp_ms, cls).await?;
        let issues: Vec<crate::models::SeoIssue> =
            sqlx::query_as("SELECT * FROM seo_issues WHERE page_id = ?").bind(id).fetch_all(&state.db).await?;
        let report = state.issue_detector.analyze(&html, &base_host, lcp_ms, cls);
        return Ok(Json(AnalyzeResponse {
            health_score: report.health_score,
            potential_score_gain: report.potential_score_gain,
            estimated_fix_minutes: report.estimated_fix_minutes,
            issues: issues.iter().map(IssueResponse::from).collect(),
        }));
    }

    let report = state.issue_detector.detect_and_persist(id, &html, &base_host, lcp_ms, cls).await?;
    for issue in &report.issues {
        state.ai_fixer.mark_recurrence(id, issue.issue_type).await?;
    }
    let persisted: Vec<crate::models::SeoIssue> =
        sqlx::query_as("SELECT * FROM seo_issues WHERE page_id = ? AND status = 'open'")
            .bind(id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(AnalyzeResponse {
        health_score: report.health_score,
        potential_score_gain: report.potential_score_gain,
        estimated_fix_minutes: report.estimated_fix_minutes,
        issues: persisted.iter().map(IssueResponse::from).collect(),
    }))
}

/// Manually overrides a page's title/description (§3's Page entity). These
/// fields aren't covered by the manual-edit marker's refresh-preservation
/// guarantee (§4.4 persisting step only freezes `parent`/`depth_level`/
/// `use_manual_position`) — a subsequent full refresh will overwrite them
/// again from the live page the next time it's crawled.
#[utoipa::path(
    patch,
    path = "/pages/{id}",
    request_body = UpdatePageFieldsRequest,
    responses(
        (status = 200, description = "Page updated", body = Page),
        (status = 404, description = "Page not found"),
    ),
    tag = "Pages"
)]
pub async fn update_page_fields(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePageFieldsRequest>,
) -> ApiResult<Json<Page>> {
    let existing: Page = sqlx::query_as("SELECT * FROM pages WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::PageNotFound(id.to_string()))?;

    let title = req.title.or(existing.title);
    let description = req.description.or(existing.description);

    let updated: Page = sqlx::query_as(
        "UPDATE pages SET title = ?, description = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(title)
    .bind(description)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(updated))
}
