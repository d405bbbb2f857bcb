//! AI Fixer (C9): generates concrete replacement values for individual SEO
//! issues and applies AI suggestions, using the same `LlmService::analyze`
//! call site as the AI Analysis Engine (§4.9).

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{AiFixHistory, AiSuggestion, Effectiveness, GeneratedFix, IssueType, LlmError, LlmScenario, Page, SeoIssue};
use crate::services::llm::{LlmAnalysisRequestTrait, LlmAnalysisResponseTrait, LlmService, LlmServiceImpl};

#[derive(Debug, thiserror::Error)]
pub enum AiFixerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("page {0} not found")]
    PageNotFound(i64),
    #[error("issue {0} not found")]
    IssueNotFound(i64),
    #[error("suggestion {0} not found")]
    SuggestionNotFound(i64),
    #[error("suggestion {0} is not applicable")]
    NotApplicable(i64),
}

/// A single field generator request — one of title/meta-description/H1/
/// content/alt-text/batch (§4.9). All share the same response shape.
#[derive(Debug, Clone, Serialize)]
struct FixGenerationRequest {
    #[serde(skip)]
    domain_id: i64,
    #[serde(skip)]
    context_hash: String,
    issue_type: &'static str,
    page_url: String,
    current_value: Option<String>,
    page_title: Option<String>,
    page_description: Option<String>,
    surrounding_context: String,
}

impl LlmAnalysisRequestTrait for FixGenerationRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::IssueFixGeneration
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an SEO copywriter. Generate a replacement value for a single `{}` issue. \
             Respond with a JSON object: {{\"fixed_value\": string, \"explanation\": string, \"confidence\": number 0-1}}. \
             The fixed_value must be usable as-is, with no placeholders or brackets.",
            self.issue_type
        )
    }

    fn domain_id(&self) -> i64 {
        self.domain_id
    }

    fn context_hash(&self) -> String {
        self.context_hash.clone()
    }
}

impl LlmAnalysisResponseTrait for GeneratedFix {
    fn summary(&self) -> &str {
        &self.explanation
    }

    fn confidence(&self) -> Option<f64> {
        Some(self.confidence)
    }
}

pub struct AiFixer {
    pool: SqlitePool,
    llm: Arc<LlmServiceImpl>,
}

impl AiFixer {
    pub fn new(pool: SqlitePool, llm: Arc<LlmServiceImpl>) -> Self {
        Self { pool, llm }
    }

    async fn page(&self, page_id: i64) -> Result<Page, AiFixerError> {
        sqlx::query_as("SELECT * FROM pages WHERE id = ?")
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AiFixerError::PageNotFound(page_id))
    }

    /// Runs the generator for `issue_type` against `page`'s current state and
    /// returns a not-yet-applied `GeneratedFix` (§4.9's per-issue generators).
    pub async fn generate_fix(&self, page_id: i64, issue_type: IssueType) -> Result<GeneratedFix, AiFixerError> {
        let page = self.page(page_id).await?;
        let current_value = current_value_for(&page, issue_type);

        let request = FixGenerationRequest {
            domain_id: page.domain_id,
            context_hash: format!("{page_id}:{}:{}", issue_type.as_str(), current_value.as_deref().unwrap_or("")),
            issue_type: issue_type.as_str(),
            page_url: page.url.clone(),
            current_value,
            page_title: page.title.clone(),
            page_description: page.description.clone(),
            surrounding_context: format!("page depth {}, path {}", page.depth_level, page.path),
        };

        let result = self.llm.analyze::<FixGenerationRequest, GeneratedFix>(&request, false).await?;
        Ok(result.response)
    }

    /// Batch variant: one generator call per page sharing `issue_type`,
    /// skipping pages it has no generator support for (§4.9).
    pub async fn generate_batch(
        &self,
        page_ids: &[i64],
        issue_type: IssueType,
    ) -> Vec<(i64, Result<GeneratedFix, AiFixerError>)> {
        let mut results = Vec::with_capacity(page_ids.len());
        for &page_id in page_ids {
            results.push((page_id, self.generate_fix(page_id, issue_type).await));
        }
        results
    }

    /// Applies a generated fix to one issue (§5): supersede any prior
    /// applied/deployed fix for the same (page, issue_type), snapshot
    /// context/pre-fix metrics, record the new fix, mark the issue
    /// `auto_fixed`. All in one transaction.
    pub async fn apply_fix(
        &self,
        page_id: i64,
        issue: &SeoIssue,
        fix: GeneratedFix,
        model_id: Option<&str>,
    ) -> Result<AiFixHistory, AiFixerError> {
        let pre_fix_metrics = self.snapshot_metrics(page_id).await?;
        let mut tx = self.pool.begin().await?;

        let history =
            Self::record_fix_tx(&mut tx, page_id, &issue.issue_type, issue.current_value.as_deref(), &fix, model_id, &pre_fix_metrics)
                .await?;

        sqlx::query(
            "UPDATE seo_issues SET status = 'auto_fixed', suggested_value = ?, fixed_at = datetime('now') WHERE id = ?",
        )
        .bind(&fix.fixed_value)
        .bind(issue.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(history)
    }

    /// Shared core of `apply_fix`/`apply_bulk_fix`: supersede any prior
    /// applied/deployed fix for (page, issue_type), insert the new history row.
    async fn record_fix_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        page_id: i64,
        issue_type: &str,
        original_value: Option<&str>,
        fix: &GeneratedFix,
        model_id: Option<&str>,
        pre_fix_metrics: &Option<String>,
    ) -> Result<AiFixHistory, AiFixerError> {
        sqlx::query(
            r#"UPDATE ai_fix_history SET fix_status = 'superseded'
               WHERE page_id = ? AND issue_type = ? AND fix_status IN ('applied', 'deployed')"#,
        )
        .bind(page_id)
        .bind(issue_type)
        .execute(&mut **tx)
        .await?;

        let history: AiFixHistory = sqlx::query_as(
            r#"
            INSERT INTO ai_fix_history
                (page_id, issue_type, original_value, fixed_value, llm_explanation,
                 llm_confidence, model_id, pre_fix_metrics, fix_status, effectiveness)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'applied', 'unknown')
            RETURNING *
            "#,
        )
        .bind(page_id)
        .bind(issue_type)
        .bind(original_value)
        .bind(&fix.fixed_value)
        .bind(&fix.explanation)
        .bind(fix.confidence)
        .bind(model_id)
        .bind(pre_fix_metrics)
        .fetch_one(&mut **tx)
        .await?;

        Ok(history)
    }

    async fn snapshot_metrics(&self, page_id: i64) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
            r#"SELECT lighthouse_seo, lcp, cls FROM seo_metrics_snapshots
               WHERE page_id = ? ORDER BY taken_at DESC LIMIT 1"#,
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(seo, lcp, cls)| {
            serde_json::json!({"lighthouse_seo": seo, "lcp": lcp, "cls": cls}).to_string()
        }))
    }

    /// Taxonomy dispatch for applying an `AiSuggestion` (§4.9, §4.11): moves
    /// the suggestion into `applied` and, for page-scoped field suggestions,
    /// writes the new value straight onto the page row. Site-wide / bulk /
    /// priority-action suggestions have no single target row to patch — they
    /// apply through the Deployment Pipeline (C10) once tracking begins, so
    /// this only records the lifecycle transition and tracking window for
    /// those.
    pub async fn apply_suggestion(
        &self,
        suggestion_id: i64,
        tracking_days: i64,
    ) -> Result<AiSuggestion, AiFixerError> {
        let suggestion: AiSuggestion = sqlx::query_as("SELECT * FROM ai_suggestions WHERE id = ?")
            .bind(suggestion_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AiFixerError::SuggestionNotFound(suggestion_id))?;

        if !suggestion.status().can_transition_to(crate::models::SuggestionStatus::Applied) {
            return Err(AiFixerError::NotApplicable(suggestion_id));
        }

        let baseline_metrics = match suggestion.page_id {
            Some(page_id) => self.snapshot_metrics(page_id).await?,
            None => None,
        };

        match (suggestion.page_id, &suggestion.action_data) {
            (Some(page_id), Some(action_data)) => {
                self.apply_field_patch(page_id, &suggestion.suggestion_type, action_data).await?;
            },
            (None, Some(action_data)) if suggestion.suggestion_type.starts_with("bulk_fix_") => {
                self.apply_bulk_fix(suggestion.domain_id, &suggestion.suggestion_type, action_data).await;
            },
            _ => {},
        }

        let tracking_ends_at = Utc::now() + chrono::Duration::days(tracking_days);

        let updated: AiSuggestion = sqlx::query_as(
            r#"
            UPDATE ai_suggestions SET
                status = 'applied',
                baseline_metrics = ?,
                tracking_started_at = datetime('now'),
                tracking_ends_at = ?,
                tracking_days = ?,
                updated_at = datetime('now')
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&baseline_metrics)
        .bind(tracking_ends_at)
        .bind(tracking_days)
        .bind(suggestion_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    /// Writes a concrete field value from a suggestion's `action_data` onto
    /// its page (title/description subtypes only — structural/keyword/
    /// internal-link/quick-win suggestions carry no single-field target).
    async fn apply_field_patch(&self, page_id: i64, suggestion_type: &str, action_data: &str) -> Result<(), sqlx::Error> {
        let Ok(data) = serde_json::from_str::<serde_json::Value>(action_data) else { return Ok(()) };

        match suggestion_type {
            "title" => {
                if let Some(new_title) = data.get("new_title").and_then(|v| v.as_str()) {
                    sqlx::query("UPDATE pages SET title = ?, is_manually_edited = 0 WHERE id = ?")
                        .bind(new_title)
                        .bind(page_id)
                        .execute(&self.pool)
                        .await?;
                }
            },
            "description" => {
                if let Some(new_description) = data.get("new_description").and_then(|v| v.as_str()) {
                    sqlx::query("UPDATE pages SET description = ?, is_manually_edited = 0 WHERE id = ?")
                        .bind(new_description)
                        .bind(page_id)
                        .execute(&self.pool)
                        .await?;
                }
            },
            // structure / keyword / internal_link / quick_win / priority_action /
            // bulk_fix_* have no single-page single-field target.
            _ => {},
        }
        Ok(())
    }

    /// Applies a `bulk_fix_*` suggestion (§4.8's quick-win bulkification,
    /// §5's apply-suggestion dispatch): resolves `action_data.affected_pages`
    /// (page URLs) to page ids, generates a fix per page via `generate_batch`,
    /// and writes each one straight onto the page's field. A per-page failure
    /// is logged and skipped rather than failing the whole suggestion.
    async fn apply_bulk_fix(&self, domain_id: i64, suggestion_type: &str, action_data: &str) {
        let Some(field) = suggestion_type.strip_prefix("bulk_fix_") else { return };
        let issue_type = match field {
            "title" => IssueType::TitleMissing,
            "description" => IssueType::MetaDescriptionMissing,
            _ => return,
        };

        let Ok(data) = serde_json::from_str::<serde_json::Value>(action_data) else { return };
        let Some(urls) = data.get("affected_pages").and_then(|v| v.as_array()) else { return };

        let mut page_ids = Vec::with_capacity(urls.len());
        for url in urls.iter().filter_map(|v| v.as_str()) {
            let page_id: Result<Option<i64>, sqlx::Error> = sqlx::query_scalar("SELECT id FROM pages WHERE domain_id = ? AND url = ?")
                .bind(domain_id)
                .bind(url)
                .fetch_optional(&self.pool)
                .await;
            match page_id {
                Ok(Some(id)) => page_ids.push(id),
                Ok(None) => tracing::warn!(url, "bulk fix: affected page not found"),
                Err(e) => tracing::warn!(url, "bulk fix: page lookup failed: {e}"),
            }
        }

        for (page_id, result) in self.generate_batch(&page_ids, issue_type).await {
            let fix = match result {
                Ok(fix) => fix,
                Err(e) => {
                    tracing::warn!(page_id, field, "bulk fix generation failed: {e}");
                    continue;
                },
            };

            let update = format!("UPDATE pages SET {field} = ?, is_manually_edited = 0 WHERE id = ?");
            if let Err(e) = sqlx::query(&update).bind(&fix.fixed_value).bind(page_id).execute(&self.pool).await {
                tracing::warn!(page_id, field, "bulk fix page update failed: {e}");
                continue;
            }

            let pre_fix_metrics = self.snapshot_metrics(page_id).await.unwrap_or(None);
            let mut tx = match self.pool.begin().await {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::warn!(page_id, field, "bulk fix history transaction failed: {e}");
                    continue;
                },
            };
            if let Err(e) =
                Self::record_fix_tx(&mut tx, page_id, issue_type.as_str(), None, &fix, None, &pre_fix_metrics).await
            {
                tracing::warn!(page_id, field, "bulk fix history insert failed: {e}");
                continue;
            }
            if let Err(e) = tx.commit().await {
                tracing::warn!(page_id, field, "bulk fix history commit failed: {e}");
            }
        }
    }

    /// Recurrence detection (§4.9, §4.11): a previously `deployed`/`verified`
    /// fix whose issue has resurfaced is marked recurred exactly once —
    /// `issue_recurred` only flips from false to true, subsequent
    /// re-detections just bump the counter.
    pub async fn mark_recurrence(&self, page_id: i64, issue_type: IssueType) -> Result<(), sqlx::Error> {
        let candidate: Option<(i64, bool, i64)> = sqlx::query_as(
            r#"
            SELECT id, issue_recurred, recurrence_count FROM ai_fix_history
            WHERE page_id = ? AND issue_type = ? AND fix_status IN ('deployed', 'verified')
            ORDER BY applied_at DESC LIMIT 1
            "#,
        )
        .bind(page_id)
        .bind(issue_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, issue_recurred, recurrence_count)) = candidate else { return Ok(()) };

        sqlx::query(
            "UPDATE ai_fix_history SET fix_status = 'recurred', issue_recurred = 1, recurrence_count = ? WHERE id = ?",
        )
        .bind(recurrence_count + 1)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if !issue_recurred {
            tracing::debug!(page_id, issue_type = issue_type.as_str(), "issue recurred after deployment");
        }
        Ok(())
    }

    /// Classifies an `Effectiveness` from before/after metrics once a fix has
    /// had time to be measured post-deployment (§4.11's LLM-assisted path
    /// falls back to this rule-based comparison when the score moved clearly
    /// enough not to need a judgment call).
    pub fn classify_effectiveness(before: Option<f64>, after: Option<f64>) -> Effectiveness {
        match (before, after) {
            (Some(before), Some(after)) => {
                let delta = after - before;
                if delta >= 5.0 {
                    Effectiveness::Effective
                } else if delta >= 1.0 {
                    Effectiveness::Partial
                } else if delta <= -5.0 {
                    Effectiveness::Negative
                } else if delta < 0.0 {
                    Effectiveness::Ineffective
                } else {
                    Effectiveness::Unknown
                }
            },
            _ => Effectiveness::Unknown,
        }
    }
}

fn current_value_for(page: &Page, issue_type: IssueType) -> Option<String> {
    match issue_type {
        IssueType::TitleMissing | IssueType::TitleTooShort | IssueType::TitleTooLong => page.title.clone(),
        IssueType::MetaDescriptionMissing
        | IssueType::MetaDescriptionTooShort
        | IssueType::MetaDescriptionTooLong => page.description.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effectiveness_clearly_positive_delta_is_effective() {
        assert_eq!(AiFixer::classify_effectiveness(Some(70.0), Some(80.0)), Effectiveness::Effective);
    }

    #[test]
    fn effectiveness_small_positive_delta_is_partial() {
        assert_eq!(AiFixer::classify_effectiveness(Some(70.0), Some(72.0)), Effectiveness::Partial);
    }

    #[test]
    fn effectiveness_negative_delta_is_ineffective_or_negative() {
        assert_eq!(AiFixer::classify_effectiveness(Some(80.0), Some(78.0)), Effectiveness::Ineffective);
        assert_eq!(AiFixer::classify_effectiveness(Some(80.0), Some(70.0)), Effectiveness::Negative);
    }

    #[test]
    fn effectiveness_missing_data_is_unknown() {
        assert_eq!(AiFixer::classify_effectiveness(None, Some(80.0)), Effectiveness::Unknown);
    }
}
