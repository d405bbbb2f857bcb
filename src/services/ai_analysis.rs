//! AI Analysis Engine (C8): the full-domain analysis workflow (§4.8) —
//! build context, retrieve RAG knowledge, call the LLM once with a
//! taxonomy-enforcing prompt, then post-process the response into persisted
//! `AiSuggestion` rows. Progress is reported through the same callback
//! contract as the Refresh Orchestrator (§4.4).

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::sync::LazyLock;
use tracing::warn;

use crate::models::{AiSuggestion, Domain, Effectiveness, LlmError, LlmScenario};
use crate::services::knowledge_builder::{DomainContext, KnowledgeBuilder};
use crate::services::llm::{LlmAnalysisRequestTrait, LlmAnalysisResponseTrait, LlmService, LlmServiceImpl};
use crate::services::refresh_orchestrator::ProgressCallback;
use crate::services::vector_store::{VectorStore, VectorStoreError};

/// Five of the seven collections retrieved for full-domain analysis (§4.8
/// step 2) — `analysis_cache` is this engine's own output, and
/// `suggestion_tracking` feeds the Effectiveness Tracker's classification
/// prompts (§4.11) rather than this one.
const RETRIEVAL_COLLECTIONS: [&str; 5] =
    ["domain_knowledge", "page_context", "fix_history", "site_structure", "sitemap_entries"];
const RETRIEVAL_N: u64 = 10;
const MAX_PAGE_URLS: usize = 50;
const LEARNED_PATTERNS_LIMIT: i64 = 10;
const RECURRENCE_WINDOW_DAYS: i64 = 30;

static VAGUE_SUGGESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*개의\s*이슈").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum AiAnalysisError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// One suggestion as the LLM emits it, before taxonomy post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSuggestion {
    pub suggestion_type: String,
    pub title: String,
    pub description: String,
    /// A full page URL when this is (or should be) page-scoped.
    pub affected_page: Option<String>,
    /// Sub-kind within `suggestion_type`, e.g. `title`/`description`/`quick_win` subtype.
    pub field_type: Option<String>,
    pub expected_impact: Option<String>,
    pub action_data: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisResponse {
    pub strategy_summary: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub top_priorities: Vec<RawSuggestion>,
    #[serde(default)]
    pub quick_wins: Vec<RawSuggestion>,
    #[serde(default)]
    pub page_suggestions: Vec<RawSuggestion>,
}

impl AiAnalysisResponse {
    fn fallback(reason: &str) -> Self {
        Self {
            strategy_summary: format!(
                "automated analysis could not parse a structured response ({reason}); falling back to an empty plan"
            ),
            confidence: None,
            top_priorities: Vec::new(),
            quick_wins: Vec::new(),
            page_suggestions: Vec::new(),
        }
    }
}

impl LlmAnalysisResponseTrait for AiAnalysisResponse {
    fn summary(&self) -> &str {
        &self.strategy_summary
    }

    fn confidence(&self) -> Option<f64> {
        self.confidence
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullDomainAnalysisRequest {
    #[serde(skip)]
    pub domain_id: i64,
    #[serde(skip)]
    pub context_hash: String,
    pub domain_context: String,
    pub retrieved_knowledge: String,
    pub learned_patterns: String,
    pub live_page_urls: Vec<String>,
    pub google_search_console_connected: bool,
}

impl LlmAnalysisRequestTrait for FullDomainAnalysisRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::DomainAnalysis
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are an SEO strategist producing a structured JSON improvement plan. \
             Respond with a single JSON object: {\"strategy_summary\": string, \"confidence\": number 0-1, \
             \"top_priorities\": [...], \"quick_wins\": [...], \"page_suggestions\": [...]}. \
             Each suggestion object has: suggestion_type, title, description, affected_page (a full URL \
             or null), field_type, expected_impact, action_data, priority (urgent|high|medium|low). \
             `top_priorities` and `quick_wins` are SITE-WIDE only — never describe a single page there. \
             Any suggestion about one specific page belongs in `page_suggestions` with `affected_page` \
             set to that page's exact URL. Never propose a vague suggestion like \"3 issues found\" \
             without naming the specific issue type or keyword involved.",
        );
        if self.google_search_console_connected {
            prompt.push_str(" Google Search Console is already connected for this domain — never suggest connecting it.");
        }
        prompt
    }

    fn domain_id(&self) -> i64 {
        self.domain_id
    }

    fn context_hash(&self) -> String {
        self.context_hash.clone()
    }
}

pub struct AiAnalysisOutcome {
    pub strategy_summary: String,
    pub suggestions: Vec<AiSuggestion>,
    pub from_cache: bool,
}

pub struct AiAnalysisEngine {
    pool: SqlitePool,
    vector_store: Arc<VectorStore>,
    llm: Arc<LlmServiceImpl>,
}

impl AiAnalysisEngine {
    pub fn new(pool: SqlitePool, vector_store: Arc<VectorStore>, llm: Arc<LlmServiceImpl>) -> Self {
        Self { pool, vector_store, llm }
    }

    pub async fn analyze_domain(
        &self,
        domain: &Domain,
        force_refresh: bool,
        progress: &ProgressCallback,
    ) -> Result<AiAnalysisOutcome, AiAnalysisError> {
        progress(0, 100, "building domain context");
        let context = KnowledgeBuilder::build(&self.pool, domain).await?;
        let context_text = context.to_prompt_text();

        progress(20, 100, "retrieving related knowledge");
        let retrieval_query = Self::retrieval_query(domain, &context);
        let retrieved = self
            .vector_store
            .query(&retrieval_query, domain.id, Some(RETRIEVAL_COLLECTIONS.as_slice()), RETRIEVAL_N)
            .await?;
        let retrieved_knowledge = Self::format_retrieval(&retrieved);

        progress(40, 100, "loading learned patterns");
        let learned_patterns = self.load_learned_patterns(domain.id).await?;

        progress(50, 100, "loading live pages");
        let page_urls = self.load_live_page_urls(domain.id).await?;

        let request = FullDomainAnalysisRequest {
            domain_id: domain.id,
            context_hash: format!("{:x}", md5_like_hash(&context_text)),
            domain_context: context_text,
            retrieved_knowledge,
            learned_patterns,
            live_page_urls: page_urls.clone(),
            google_search_console_connected: context.domain_overview.google_connected,
        };

        progress(60, 100, "calling LLM");
        let (response, from_cache) =
            match self.llm.analyze::<FullDomainAnalysisRequest, AiAnalysisResponse>(&request, force_refresh).await {
                Ok(result) => (result.response, result.from_cache),
                Err(LlmError::ParseError(reason)) => (AiAnalysisResponse::fallback(&reason), false),
                Err(e) => return Err(e.into()),
            };

        progress(80, 100, "post-processing suggestions");
        let suggestions = self.post_process(domain, &response).await?;

        progress(95, 100, "caching analysis");
        self.cache_analysis(domain, &response).await;

        progress(100, 100, "done");
        Ok(AiAnalysisOutcome { strategy_summary: response.strategy_summary, suggestions, from_cache })
    }

    fn retrieval_query(domain: &Domain, context: &DomainContext) -> String {
        let top_issues: Vec<&str> =
            context.seo_health.issue_patterns.iter().take(5).map(|(issue_type, _, _)| issue_type.as_str()).collect();
        format!(
            "domain {}, health score {:.1}, top issues: {}",
            domain.hostname,
            context.domain_overview.health_score,
            if top_issues.is_empty() { "none".to_string() } else { top_issues.join(", ") },
        )
    }

    fn format_retrieval(retrieved: &std::collections::HashMap<String, Vec<crate::services::vector_store::RetrievedPoint>>) -> String {
        let mut sections = Vec::new();
        for collection in RETRIEVAL_COLLECTIONS {
            let Some(points) = retrieved.get(collection) else { continue };
            if points.is_empty() {
                continue;
            }
            let mut section = format!("=== {collection} ===\n");
            for point in points {
                section.push_str("- ");
                section.push_str(&point.document);
                section.push('\n');
            }
            sections.push(section);
        }
        sections.join("\n")
    }

    /// Last 10 *effective* fixes for the domain (§4.8 step 3) — patterns the
    /// LLM should imitate, not merely anything it tried before.
    async fn load_learned_patterns(&self, domain_id: i64) -> Result<String, sqlx::Error> {
        let rows: Vec<(String, String, Option<String>, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT h.issue_type, h.fixed_value, h.llm_explanation, h.llm_confidence
            FROM ai_fix_history h
            JOIN pages p ON p.id = h.page_id
            WHERE p.domain_id = ? AND h.effectiveness = 'effective'
            ORDER BY h.applied_at DESC
            LIMIT ?
            "#,
        )
        .bind(domain_id)
        .bind(LEARNED_PATTERNS_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok("no prior effective fixes recorded yet".to_string());
        }

        Ok(rows
            .into_iter()
            .map(|(issue_type, fixed_value, explanation, confidence)| {
                format!(
                    "- {issue_type}: \"{fixed_value}\"{}{}",
                    explanation.map(|e| format!(" ({e})")).unwrap_or_default(),
                    confidence.map(|c| format!(" [confidence {c:.2}]")).unwrap_or_default(),
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn load_live_page_urls(&self, domain_id: i64) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT url FROM pages WHERE domain_id = ? AND is_active = 1 ORDER BY depth_level, id LIMIT ?",
        )
        .bind(domain_id)
        .bind(MAX_PAGE_URLS as i64)
        .fetch_all(&self.pool)
        .await
    }

    /// §4.8 step 7: re-route, filter, rewrite, and persist suggestions.
    async fn post_process(
        &self,
        domain: &Domain,
        response: &AiAnalysisResponse,
    ) -> Result<Vec<AiSuggestion>, AiAnalysisError> {
        let mut candidates: Vec<(RawSuggestion, &'static str)> = Vec::new();

        for raw in &response.top_priorities {
            if Self::looks_page_scoped(raw) {
                candidates.push((raw.clone(), "page_suggestion"));
            } else {
                candidates.push((raw.clone(), "top_priority"));
            }
        }
        for raw in &response.quick_wins {
            candidates.push((raw.clone(), "quick_win"));
        }
        for raw in &response.page_suggestions {
            candidates.push((raw.clone(), "page_suggestion"));
        }

        let mut persisted = Vec::new();
        for (mut raw, origin) in candidates {
            if Self::is_vague(&raw) {
                continue;
            }

            let page_id = match &raw.affected_page {
                Some(url) => self.resolve_page_id(domain.id, url).await?,
                None => None,
            };

            if let (Some(page_id), Some(field_type)) = (page_id, &raw.field_type) {
                if self.recently_suppressed(page_id, field_type).await? {
                    continue;
                }
            }

            if origin == "quick_win" {
                raw = self.maybe_bulkify(domain.id, raw).await?;
            }

            let is_auto_applicable = Self::is_auto_applicable(&raw);
            let priority = priority_rank(raw.priority.as_deref());
            let action_data = raw.action_data.as_ref().map(|v| v.to_string());

            let inserted: AiSuggestion = sqlx::query_as(
                r#"
                INSERT INTO ai_suggestions
                    (domain_id, page_id, suggestion_type, priority, title, description,
                     expected_impact, action_data, is_auto_applicable, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
                RETURNING *
                "#,
            )
            .bind(domain.id)
            .bind(page_id)
            .bind(&raw.suggestion_type)
            .bind(priority)
            .bind(&raw.title)
            .bind(&raw.description)
            .bind(&raw.expected_impact)
            .bind(action_data)
            .bind(is_auto_applicable)
            .fetch_one(&self.pool)
            .await?;

            persisted.push(inserted);
        }

        Ok(persisted)
    }

    fn looks_page_scoped(raw: &RawSuggestion) -> bool {
        raw.affected_page.as_ref().is_some_and(|url| url.contains("://"))
    }

    fn is_vague(raw: &RawSuggestion) -> bool {
        raw.field_type.is_none() && (VAGUE_SUGGESTION.is_match(&raw.title) || VAGUE_SUGGESTION.is_match(&raw.description))
    }

    async fn resolve_page_id(&self, domain_id: i64, url: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM pages WHERE domain_id = ? AND url = ?")
            .bind(domain_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
    }

    /// §4.8 step 7, third bullet: skip if a recent fix already covers this
    /// (page, field) and isn't known to have failed.
    async fn recently_suppressed(&self, page_id: i64, field_type: &str) -> Result<bool, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT effectiveness FROM ai_fix_history
            WHERE page_id = ? AND issue_type = ?
              AND applied_at > datetime('now', '-' || ? || ' days')
            "#,
        )
        .bind(page_id)
        .bind(field_type)
        .bind(RECURRENCE_WINDOW_DAYS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().any(|(effectiveness,)| Effectiveness::from_str(effectiveness).suppresses_resuggestion()))
    }

    /// Rewrites a quick-win that targets a title/description improvement
    /// into its bulk auto-applicable form, attaching every live page missing
    /// that field (§4.8 step 7, fourth bullet).
    async fn maybe_bulkify(&self, domain_id: i64, mut raw: RawSuggestion) -> Result<RawSuggestion, AiAnalysisError> {
        let field = match raw.field_type.as_deref() {
            Some("title") => "title",
            Some("description") => "description",
            _ => return Ok(raw),
        };

        let column = field;
        let query = format!("SELECT url FROM pages WHERE domain_id = ? AND is_active = 1 AND ({column} IS NULL OR {column} = '')");
        let affected: Vec<String> =
            sqlx::query_scalar(&query).bind(domain_id).fetch_all(&self.pool).await.unwrap_or_default();

        if affected.is_empty() {
            return Ok(raw);
        }

        raw.suggestion_type = format!("bulk_fix_{field}");
        let mut action_data = raw.action_data.take().unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = action_data.as_object_mut() {
            obj.insert("affected_pages".to_string(), serde_json::json!(affected));
        }
        raw.action_data = Some(action_data);
        Ok(raw)
    }

    /// Payload-completeness check (§4.8 step 7, fifth bullet): a suggestion
    /// is only auto-applicable once its action data carries enough to act on
    /// without a human filling in a blank.
    fn is_auto_applicable(raw: &RawSuggestion) -> bool {
        let Some(data) = &raw.action_data else { return false };
        match raw.field_type.as_deref() {
            Some("title") => data.get("new_title").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()),
            Some("description") => data.get("new_description").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()),
            Some("internal_link") => {
                data.get("links").and_then(|v| v.as_array()).is_some_and(|a| !a.is_empty())
            },
            _ => raw.suggestion_type.starts_with("bulk_fix_"),
        }
    }

    async fn cache_analysis(&self, domain: &Domain, response: &AiAnalysisResponse) {
        let document = format!(
            "Domain {} analysis: {}. {} top priorities, {} quick wins, {} page suggestions.",
            domain.hostname,
            response.strategy_summary,
            response.top_priorities.len(),
            response.quick_wins.len(),
            response.page_suggestions.len(),
        );
        if let Err(e) = self
            .vector_store
            .upsert_analysis_cache(domain.id, &format!("analysis_{}", domain.id), &document)
            .await
        {
            warn!("failed to cache analysis for domain {}: {}", domain.id, e);
        }
    }
}

fn priority_rank(priority: Option<&str>) -> i64 {
    match priority {
        Some("urgent") => 0,
        Some("high") => 1,
        Some("low") => 3,
        _ => 2,
    }
}

/// A small deterministic content hash for cache-key purposes — not
/// cryptographic, just stable across identical inputs (FNV-1a 64-bit).
fn md5_like_hash(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vague_suggestion_without_field_type_is_skipped() {
        let raw = RawSuggestion {
            suggestion_type: "technical_improvement".to_string(),
            title: "3개의 이슈가 발견되었습니다".to_string(),
            description: "fix them".to_string(),
            affected_page: None,
            field_type: None,
            expected_impact: None,
            action_data: None,
            priority: None,
        };
        assert!(AiAnalysisEngine::is_vague(&raw));
    }

    #[test]
    fn specific_suggestion_with_field_type_is_not_vague() {
        let raw = RawSuggestion {
            suggestion_type: "technical_improvement".to_string(),
            title: "3개의 이슈가 발견되었습니다".to_string(),
            description: "fix them".to_string(),
            affected_page: None,
            field_type: Some("title".to_string()),
            action_data: None,
            expected_impact: None,
            priority: None,
        };
        assert!(!AiAnalysisEngine::is_vague(&raw));
    }

    #[test]
    fn page_scoped_detection_requires_a_full_url() {
        let mut raw = RawSuggestion {
            suggestion_type: "content_gap".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            affected_page: Some("https://example.com/blog/post".to_string()),
            field_type: None,
            expected_impact: None,
            action_data: None,
            priority: None,
        };
        assert!(AiAnalysisEngine::looks_page_scoped(&raw));
        raw.affected_page = Some("the whole site".to_string());
        assert!(!AiAnalysisEngine::looks_page_scoped(&raw));
    }

    #[test]
    fn auto_applicable_requires_concrete_payload() {
        let mut raw = RawSuggestion {
            suggestion_type: "title".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            affected_page: None,
            field_type: Some("title".to_string()),
            expected_impact: None,
            action_data: None,
            priority: None,
        };
        assert!(!AiAnalysisEngine::is_auto_applicable(&raw));
        raw.action_data = Some(serde_json::json!({"new_title": "Better Title"}));
        assert!(AiAnalysisEngine::is_auto_applicable(&raw));
    }
}
