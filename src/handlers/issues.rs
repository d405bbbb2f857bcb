//! `POST /issues/{id}/auto-fix` (§6): generates and applies a fix for one
//! issue via the AI Fixer (C9).

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::models::{AiFixHistory, SeoIssue};
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    post,
    path = "/issues/{id}/auto-fix",
    responses(
        (status = 200, description = "Fix generated and applied", body = AiFixHistory),
        (status = 404, description = "Issue not found"),
        (status = 422, description = "Issue is not auto-fixable"),
    ),
    tag = "Issues"
)]
pub async fn auto_fix_issue(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<AiFixHistory>> {
    let issue: SeoIssue = sqlx::query_as("SELECT * FROM seo_issues WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("issue {id}")))?;

    let issue_type = issue
        .issue_type()
        .ok_or_else(|| ApiError::IssueNotFixable(format!("unrecognized issue type: {}", issue.issue_type)))?;
    if !issue_type.is_auto_fixable() {
        return Err(ApiError::IssueNotFixable(issue.issue_type.clone()));
    }

    let fix = state.ai_fixer.generate_fix(issue.page_id, issue_type).await?;
    let history = state.ai_fixer.apply_fix(issue.page_id, &issue, fix, None).await?;

    Ok(Json(history))
}
