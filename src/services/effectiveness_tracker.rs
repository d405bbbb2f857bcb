//! Effectiveness Tracker (C11): drives `AiSuggestion`'s `applied -> tracking
//! -> tracked` lifecycle (§4.11), accumulating post-deploy metrics over the
//! suggestion's tracking window and classifying the outcome once the window
//! closes — via the LLM when available, falling back to the Ai Fixer's
//! rule-based delta classifier.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{AiSuggestion, Domain, Effectiveness, LlmError, LlmScenario, SuggestionStatus};
use crate::services::ai_fixer::AiFixer;
use crate::services::llm::{LlmAnalysisRequestTrait, LlmAnalysisResponseTrait, LlmService, LlmServiceImpl};
use crate::services::vector_store::VectorStore;

/// Default tracking window (days) when a suggestion carries none (§4.11).
const DEFAULT_TRACKING_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum EffectivenessTrackerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("suggestion {0} not found")]
    SuggestionNotFound(i64),
    #[error("suggestion {0} cannot transition from its current state")]
    NotTrackable(i64),
}

#[derive(Debug, Clone, Serialize)]
struct EffectivenessClassificationRequest {
    #[serde(skip)]
    domain_id: i64,
    #[serde(skip)]
    context_hash: String,
    suggestion_title: String,
    suggestion_description: String,
    baseline_metrics: String,
    final_metrics: String,
}

impl LlmAnalysisRequestTrait for EffectivenessClassificationRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::EffectivenessClassification
    }

    fn system_prompt(&self) -> String {
        "You are grading the outcome of an SEO suggestion after its tracking window closed. \
         Compare baseline_metrics against final_metrics and classify the result. Respond with a JSON \
         object: {\"classification\": \"effective\"|\"partial\"|\"ineffective\"|\"negative\", \
         \"score\": number (signed delta, same units as the metrics), \"explanation\": string}."
            .to_string()
    }

    fn domain_id(&self) -> i64 {
        self.domain_id
    }

    fn context_hash(&self) -> String {
        self.context_hash.clone()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct EffectivenessClassificationResponse {
    classification: String,
    score: f64,
    explanation: String,
}

impl LlmAnalysisResponseTrait for EffectivenessClassificationResponse {
    fn summary(&self) -> &str {
        &self.explanation
    }

    fn confidence(&self) -> Option<f64> {
        None
    }
}

pub struct EffectivenessTracker {
    pool: SqlitePool,
    vector_store: Arc<VectorStore>,
    llm: Arc<LlmServiceImpl>,
}

impl EffectivenessTracker {
    pub fn new(pool: SqlitePool, vector_store: Arc<VectorStore>, llm: Arc<LlmServiceImpl>) -> Self {
        Self { pool, vector_store, llm }
    }

    /// Moves a suggestion from `applied` to `tracking` once its fix has been
    /// deployed (§4.11). The tracking window itself (`tracking_started_at`/
    /// `tracking_ends_at`) was already recorded by `AiFixer::apply_suggestion`
    /// at apply time; this only flips the status and backfills the window if
    /// it was somehow never set.
    pub async fn start_tracking(&self, suggestion_id: i64) -> Result<AiSuggestion, EffectivenessTrackerError> {
        let suggestion = self.load(suggestion_id).await?;

        if !suggestion.status().can_transition_to(SuggestionStatus::Tracking) {
            return Err(EffectivenessTrackerError::NotTrackable(suggestion_id));
        }

        let tracking_ends_at =
            suggestion.tracking_ends_at.unwrap_or_else(|| Utc::now() + chrono::Duration::days(DEFAULT_TRACKING_DAYS));

        let updated: AiSuggestion = sqlx::query_as(
            r#"
            UPDATE ai_suggestions SET
                status = 'tracking',
                tracking_started_at = COALESCE(tracking_started_at, datetime('now')),
                tracking_ends_at = ?,
                updated_at = datetime('now')
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(tracking_ends_at)
        .bind(suggestion_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    /// Suggestions whose tracking window has closed and are ready to be
    /// classified (§4.11) — the scheduler bridge's `evaluate_fix_effectiveness`
    /// trigger drives this for every active domain.
    pub async fn due_for_finalization(&self, domain_id: i64) -> Result<Vec<AiSuggestion>, EffectivenessTrackerError> {
        let rows: Vec<AiSuggestion> = sqlx::query_as(
            "SELECT * FROM ai_suggestions WHERE domain_id = ? AND status = 'tracking' AND tracking_ends_at <= datetime('now')",
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Classifies and closes out every suggestion due for finalization under
    /// `domain` (§4.11, §4.12 `evaluate_fix_effectiveness`).
    pub async fn run_due(&self, domain: &Domain) -> Result<Vec<AiSuggestion>, EffectivenessTrackerError> {
        let due = self.due_for_finalization(domain.id).await?;
        let mut finalized = Vec::with_capacity(due.len());
        for suggestion in due {
            match self.finalize(domain, &suggestion).await {
                Ok(updated) => finalized.push(updated),
                Err(e) => tracing::warn!(suggestion_id = suggestion.id, error = %e, "failed to finalize suggestion"),
            }
        }
        Ok(finalized)
    }

    /// Snapshots final metrics, classifies the outcome, and transitions
    /// `tracking -> tracked` (§4.11). Tries the LLM-assisted classifier first,
    /// falling back to `AiFixer::classify_effectiveness`'s rule-based delta
    /// comparison when the LLM is unavailable or its answer fails to parse.
    pub async fn finalize(
        &self,
        domain: &Domain,
        suggestion: &AiSuggestion,
    ) -> Result<AiSuggestion, EffectivenessTrackerError> {
        if !suggestion.status().can_transition_to(SuggestionStatus::Tracked) {
            return Err(EffectivenessTrackerError::NotTrackable(suggestion.id));
        }

        let final_metrics = self.snapshot_metrics(domain.id, suggestion.page_id).await?;
        let baseline_score = extract_score(suggestion.baseline_metrics.as_deref());
        let final_score = extract_score(final_metrics.as_deref());

        let (classification, score, explanation) =
            self.classify(domain.id, suggestion, &final_metrics, baseline_score, final_score).await;

        let updated: AiSuggestion = sqlx::query_as(
            r#"
            UPDATE ai_suggestions SET
                status = 'tracked',
                final_metrics = ?,
                effectiveness_score = ?,
                impact_analysis = ?,
                updated_at = datetime('now')
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&final_metrics)
        .bind(score)
        .bind(&explanation)
        .bind(suggestion.id)
        .fetch_one(&self.pool)
        .await?;

        if let Some(page_id) = suggestion.page_id {
            self.stamp_fix_history(page_id, classification).await?;
        }
        self.update_learning_state(domain.id, classification).await?;
        self.vector_store.sync_domain(domain).await;

        Ok(updated)
    }

    async fn classify(
        &self,
        domain_id: i64,
        suggestion: &AiSuggestion,
        final_metrics: &Option<String>,
        baseline_score: Option<f64>,
        final_score: Option<f64>,
    ) -> (Effectiveness, f64, String) {
        if self.llm.is_available() {
            let request = EffectivenessClassificationRequest {
                domain_id,
                context_hash: format!(
                    "{}:{}",
                    suggestion.id,
                    final_metrics.as_deref().unwrap_or("")
                ),
                suggestion_title: suggestion.title.clone(),
                suggestion_description: suggestion.description.clone(),
                baseline_metrics: suggestion.baseline_metrics.clone().unwrap_or_else(|| "(none)".to_string()),
                final_metrics: final_metrics.clone().unwrap_or_else(|| "(none)".to_string()),
            };

            match self
                .llm
                .analyze::<EffectivenessClassificationRequest, EffectivenessClassificationResponse>(&request, false)
                .await
            {
                Ok(result) => {
                    let classification = classification_from_str(&result.response.classification)
                        .unwrap_or_else(|| AiFixer::classify_effectiveness(baseline_score, final_score));
                    return (classification, result.response.score, result.response.explanation);
                },
                Err(e) => {
                    tracing::debug!(suggestion_id = suggestion.id, error = %e, "LLM effectiveness classification failed, falling back to rule-based");
                },
            }
        }

        let classification = AiFixer::classify_effectiveness(baseline_score, final_score);
        let score = final_score.zip(baseline_score).map(|(f, b)| f - b).unwrap_or(0.0);
        let explanation = format!(
            "rule-based classification: baseline {:?} -> final {:?}",
            baseline_score, final_score
        );
        (classification, score, explanation)
    }

    /// Updates the most recently deployed fix on the suggestion's page with
    /// the classified outcome (§4.9, §4.11) — best-effort, since a suggestion
    /// doesn't carry a direct foreign key into `ai_fix_history`.
    async fn stamp_fix_history(&self, page_id: i64, classification: Effectiveness) -> Result<(), EffectivenessTrackerError> {
        sqlx::query(
            r#"
            UPDATE ai_fix_history SET effectiveness = ?, verified_at = datetime('now')
            WHERE id = (
                SELECT id FROM ai_fix_history
                WHERE page_id = ? AND fix_status = 'deployed'
                ORDER BY applied_at DESC LIMIT 1
            )
            "#,
        )
        .bind(classification.as_str())
        .bind(page_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bumps the domain's learning-state counters (§4.7's quality signal):
    /// every finalized suggestion counts toward `total_fixes`, effective ones
    /// toward `effective_fixes`, and `quality_score` is recomputed from the ratio.
    async fn update_learning_state(&self, domain_id: i64, classification: Effectiveness) -> Result<(), EffectivenessTrackerError> {
        let is_effective = matches!(classification, Effectiveness::Effective | Effectiveness::Partial);

        sqlx::query(
            r#"
            INSERT INTO ai_learning_state (domain_id, total_fixes, effective_fixes, quality_score)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(domain_id) DO UPDATE SET
                total_fixes = total_fixes + 1,
                effective_fixes = effective_fixes + excluded.effective_fixes,
                quality_score = CAST(effective_fixes + excluded.effective_fixes AS REAL) / (total_fixes + 1) * 100.0
            "#,
        )
        .bind(domain_id)
        .bind(if is_effective { 1 } else { 0 })
        .bind(if is_effective { 100.0 } else { 0.0 })
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, suggestion_id: i64) -> Result<AiSuggestion, EffectivenessTrackerError> {
        sqlx::query_as("SELECT * FROM ai_suggestions WHERE id = ?")
            .bind(suggestion_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EffectivenessTrackerError::SuggestionNotFound(suggestion_id))
    }

    /// Page-scoped suggestions snapshot the page's latest Lighthouse/GSC
    /// reading; site-wide suggestions snapshot the domain's cached scores.
    async fn snapshot_metrics(&self, domain_id: i64, page_id: Option<i64>) -> Result<Option<String>, EffectivenessTrackerError> {
        if let Some(page_id) = page_id {
            let row: Option<(Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
                r#"SELECT lighthouse_seo, lcp, cls FROM seo_metrics_snapshots
                   WHERE page_id = ? ORDER BY taken_at DESC LIMIT 1"#,
            )
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?;

            return Ok(row.map(|(seo, lcp, cls)| {
                serde_json::json!({"lighthouse_seo": seo, "lcp": lcp, "cls": cls}).to_string()
            }));
        }

        let row: Option<(Option<f64>, Option<f64>)> =
            sqlx::query_as("SELECT seo_score, performance_score FROM domains WHERE id = ?")
                .bind(domain_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(seo, performance)| {
            serde_json::json!({"seo_score": seo, "performance_score": performance}).to_string()
        }))
    }
}

fn classification_from_str(s: &str) -> Option<Effectiveness> {
    Some(match s {
        "effective" => Effectiveness::Effective,
        "partial" => Effectiveness::Partial,
        "ineffective" => Effectiveness::Ineffective,
        "negative" => Effectiveness::Negative,
        "unknown" => Effectiveness::Unknown,
        _ => return None,
    })
}

fn extract_score(metrics_json: Option<&str>) -> Option<f64> {
    let value: serde_json::Value = serde_json::from_str(metrics_json?).ok()?;
    value
        .get("lighthouse_seo")
        .or_else(|| value.get("seo_score"))
        .and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_score_prefers_lighthouse_seo() {
        let json = r#"{"lighthouse_seo": 82.5, "lcp": 1200.0}"#;
        assert_eq!(extract_score(Some(json)), Some(82.5));
    }

    #[test]
    fn extract_score_falls_back_to_domain_seo_score() {
        let json = r#"{"seo_score": 77.0}"#;
        assert_eq!(extract_score(Some(json)), Some(77.0));
    }

    #[test]
    fn extract_score_handles_missing_data() {
        assert_eq!(extract_score(None), None);
    }

    #[test]
    fn classification_from_str_round_trips_known_values() {
        assert_eq!(classification_from_str("effective"), Some(Effectiveness::Effective));
        assert_eq!(classification_from_str("bogus"), None);
    }
}
