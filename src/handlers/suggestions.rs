//! `POST /suggestions/{id}/apply?deploy_to_git=bool` (§6): applies an AI
//! suggestion and, optionally, pushes the resulting page edit through the
//! Deployment Pipeline (C10) before handing the suggestion to the
//! Effectiveness Tracker (C11) for its tracking window.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::models::{AiSuggestion, ApplySuggestionRequest, Domain, MetadataField, Page};
use crate::services::deployment::MetadataFix;
use crate::utils::{ApiError, ApiResult};

const DEFAULT_TRACKING_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct ApplyQuery {
    #[serde(default)]
    deploy_to_git: bool,
}

#[utoipa::path(
    post,
    path = "/suggestions/{id}/apply",
    params(("deploy_to_git" = Option<bool>, Query, description = "push the resulting page edit to the domain's git repository before tracking")),
    request_body = ApplySuggestionRequest,
    responses(
        (status = 200, description = "Suggestion applied", body = AiSuggestion),
        (status = 404, description = "Suggestion not found"),
        (status = 409, description = "Suggestion cannot be applied from its current state"),
    ),
    tag = "Suggestions"
)]
pub async fn apply_suggestion(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ApplyQuery>,
    Json(req): Json<ApplySuggestionRequest>,
) -> ApiResult<Json<AiSuggestion>> {
    let tracking_days = req.tracking_days.unwrap_or(DEFAULT_TRACKING_DAYS);
    let applied = state.ai_fixer.apply_suggestion(id, tracking_days).await?;

    if query.deploy_to_git {
        if let Some(fix) = metadata_fix_for(&state, &applied).await? {
            let domain: Domain = sqlx::query_as("SELECT * FROM domains WHERE id = ?")
                .bind(applied.domain_id)
                .fetch_optional(&state.db)
                .await?
                .ok_or_else(|| ApiError::DomainNotFound(applied.domain_id.to_string()))?;
            state.deployment.deploy_fixes(&domain, vec![fix]).await?;
        }
    }

    let tracking = state.effectiveness.start_tracking(id).await?;
    Ok(Json(tracking))
}

/// Title/description suggestions have a single concrete page field to push;
/// everything else (structural, keyword, internal-link, sitemap-change) has
/// no file-level target for the Deployment Pipeline.
async fn metadata_fix_for(state: &AppState, suggestion: &AiSuggestion) -> ApiResult<Option<MetadataFix>> {
    let Some(page_id) = suggestion.page_id else { return Ok(None) };
    let field = match suggestion.suggestion_type.as_str() {
        "title" => MetadataField::Title,
        "description" => MetadataField::Description,
        _ => return Ok(None),
    };

    let page: Page = sqlx::query_as("SELECT * FROM pages WHERE id = ?")
        .bind(page_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::PageNotFound(page_id.to_string()))?;

    let new_value = match field {
        MetadataField::Title => page.title.clone(),
        MetadataField::Description => page.description.clone(),
    };
    let Some(new_value) = new_value else { return Ok(None) };

    Ok(Some(MetadataFix { page_id, page_url: page.url, field, new_value, issue_id: None }))
}
