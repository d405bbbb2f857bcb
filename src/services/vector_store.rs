//! Vector Store (C6): seven domain-scoped collections backing retrieval for
//! the AI Analysis Engine and the Effectiveness Tracker's feedback loop
//! (§4.6). The DB remains the source of truth; this is a derived, upsert-only
//! cache (§5 shared-resource policy) — every write is idempotent by
//! deterministic point id, so `sync_domain` can be re-run freely.

use crate::models::{AiFixHistory, AiSuggestion, Domain, LearningSyncStatus, Page, SeoIssue, SitemapEntry};
use crate::services::embeddings::{Embeddings, EMBEDDING_DIM};
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, vectors_config::Config as VectorsConfigEnum,
    Condition, CreateCollectionBuilder, Distance, FieldCondition, Filter, Match, PointId,
    PointStruct, QueryPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
    VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// The seven named collections (§4.6), verbatim.
pub const COLLECTIONS: [&str; 7] = [
    "domain_knowledge",
    "page_context",
    "fix_history",
    "analysis_cache",
    "site_structure",
    "sitemap_entries",
    "suggestion_tracking",
];

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("qdrant error: {0}")]
    Qdrant(#[from] qdrant_client::QdrantError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One retrieved hit from `query` (§4.6 retrieval contract).
#[derive(Debug, Clone)]
pub struct RetrievedPoint {
    pub document: String,
    pub metadata: HashMap<String, String>,
    pub distance: f32,
}

/// Per-collection write counters plus any non-fatal per-item errors,
/// returned by `sync_domain` (§4.6).
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub counts: HashMap<&'static str, usize>,
    pub errors: Vec<String>,
}

pub struct VectorStore {
    client: Qdrant,
    embeddings: Arc<dyn Embeddings>,
    pool: SqlitePool,
    enabled: bool,
}

impl VectorStore {
    pub fn new(url: &str, embeddings: Arc<dyn Embeddings>, pool: SqlitePool, enabled: bool) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self { client, embeddings, pool, enabled })
    }

    /// Creates any of the seven collections that don't already exist, all
    /// dimensioned for `EMBEDDING_DIM` with cosine distance (§4.6).
    pub async fn ensure_collections(&self) -> Result<(), VectorStoreError> {
        if !self.enabled {
            return Ok(());
        }
        for name in COLLECTIONS {
            if self.client.collection_exists(name).await? {
                continue;
            }
            let vectors_config = VectorsConfig {
                config: Some(VectorsConfigEnum::Params(
                    VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine).build(),
                )),
            };
            self.client
                .create_collection(CreateCollectionBuilder::new(name).vectors_config(vectors_config))
                .await?;
        }
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        point_id: &str,
        document: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), VectorStoreError> {
        if !self.enabled {
            return Ok(());
        }
        let vector = self.embeddings.embed(document);
        let mut payload = Payload::new();
        payload.insert("document", document.to_string());
        for (key, value) in metadata {
            payload.insert(key.as_str(), value.clone());
        }

        let point = PointStruct { id: Some(PointId::from(point_id)), vectors: Some(vector.into()), payload: payload.into() };
        self.client.upsert_points(UpsertPointsBuilder::new(collection, vec![point])).await?;
        Ok(())
    }

    /// Retrieval contract (§4.6): `query(text, domain_id, collections?, n)`
    /// returns per-collection `{document, metadata, distance}` lists.
    pub async fn query(
        &self,
        text: &str,
        domain_id: i64,
        collections: Option<&[&str]>,
        n: u64,
    ) -> Result<HashMap<String, Vec<RetrievedPoint>>, VectorStoreError> {
        let mut results = HashMap::new();
        if !self.enabled {
            return Ok(results);
        }
        let vector = self.embeddings.embed(text);
        let targets: &[&str] = collections.unwrap_or(&COLLECTIONS);

        for &collection in targets {
            let filter = domain_filter(domain_id);
            let response = self
                .client
                .query(
                    QueryPointsBuilder::new(collection)
                        .query(vector.clone())
                        .limit(n)
                        .filter(filter)
                        .with_payload(true)
                        .with_vectors(false),
                )
                .await?;

            let points = response
                .result
                .into_iter()
                .map(|scored| {
                    let mut metadata: HashMap<String, String> = HashMap::new();
                    let mut document = String::new();
                    for (key, value) in scored.payload {
                        let text = qdrant_value_to_string(&value);
                        if key == "document" {
                            document = text;
                        } else {
                            metadata.insert(key, text);
                        }
                    }
                    RetrievedPoint { document, metadata, distance: scored.score }
                })
                .collect();
            results.insert(collection.to_string(), points);
        }
        Ok(results)
    }

    /// Iterates every DB source for a domain and upserts into its collection
    /// (§4.6). Best-effort: one source's failure is recorded in the error
    /// list, not propagated.
    pub async fn sync_domain(&self, domain: &Domain) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        if !self.enabled {
            return outcome;
        }

        self.sync_domain_knowledge(domain, &mut outcome).await;
        self.sync_pages(domain, &mut outcome).await;
        self.sync_fix_history(domain, &mut outcome).await;
        self.sync_sitemap_entries(domain, &mut outcome).await;
        self.sync_suggestion_tracking(domain, &mut outcome).await;
        self.sync_site_structure(domain, &mut outcome).await;
        self.record_learning_sync(domain.id, &outcome).await;

        outcome
    }

    /// Records this sync run's result into `ai_learning_state` (§3's
    /// AILearningState entity) — `pages_synced` is the `page_context`
    /// collection's write count, `embeddings_updated` the total across every
    /// collection, `status` reflecting whether any source failed.
    async fn record_learning_sync(&self, domain_id: i64, outcome: &SyncOutcome) {
        let pages_synced = *outcome.counts.get("page_context").unwrap_or(&0) as i64;
        let embeddings_updated: i64 = outcome.counts.values().sum::<usize>() as i64;
        let status = if outcome.errors.is_empty() { LearningSyncStatus::Idle } else { LearningSyncStatus::Failed };

        let result = sqlx::query(
            r#"
            INSERT INTO ai_learning_state (domain_id, last_sync_at, pages_synced, embeddings_updated, status)
            VALUES (?, datetime('now'), ?, ?, ?)
            ON CONFLICT(domain_id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                pages_synced = excluded.pages_synced,
                embeddings_updated = excluded.embeddings_updated,
                status = excluded.status
            "#,
        )
        .bind(domain_id)
        .bind(pages_synced)
        .bind(embeddings_updated)
        .bind(status.as_str())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!("failed to record learning sync state for domain {}: {}", domain_id, e);
        }
    }

    async fn sync_domain_knowledge(&self, domain: &Domain, outcome: &mut SyncOutcome) {
        let document = format!(
            "Domain {} ({}): SEO score {:.1}, performance {:.1}, accessibility {:.1}. Deployment status: {}.",
            domain.hostname,
            domain.scheme,
            domain.seo_score.unwrap_or(0.0),
            domain.performance_score.unwrap_or(0.0),
            domain.accessibility_score.unwrap_or(0.0),
            domain.deployment_status,
        );
        let metadata = HashMap::from([("domain_id".to_string(), domain.id.to_string())]);
        self.try_upsert("domain_knowledge", &format!("domain_{}", domain.id), &document, &metadata, outcome)
            .await;
    }

    async fn sync_pages(&self, domain: &Domain, outcome: &mut SyncOutcome) {
        let pages: Vec<Page> = match sqlx::query_as("SELECT * FROM pages WHERE domain_id = ? AND is_active = 1")
            .bind(domain.id)
            .fetch_all(&self.pool)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                outcome.errors.push(format!("page_context: failed to load pages: {e}"));
                return;
            },
        };

        for page in pages {
            let open_issues: Vec<SeoIssue> = sqlx::query_as(
                "SELECT * FROM seo_issues WHERE page_id = ? AND status = 'open' ORDER BY severity LIMIT 15",
            )
            .bind(page.id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default();

            let latest: Option<crate::models::SeoMetricsSnapshot> = sqlx::query_as(
                "SELECT * FROM seo_metrics_snapshots WHERE page_id = ? ORDER BY taken_at DESC LIMIT 1",
            )
            .bind(page.id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or(None);

            let issue_summary =
                open_issues.iter().map(|i| format!("{} ({})", i.title, i.severity)).collect::<Vec<_>>().join("; ");
            let metrics_summary = latest
                .as_ref()
                .map(|m| {
                    format!(
                        "lighthouse seo {:.0} performance {:.0} accessibility {:.0}, LCP {:.0}ms CLS {:.2}, GSC impressions {} clicks {}",
                        m.lighthouse_seo.unwrap_or(0.0),
                        m.lighthouse_performance.unwrap_or(0.0),
                        m.lighthouse_accessibility.unwrap_or(0.0),
                        m.lcp.unwrap_or(0.0),
                        m.cls.unwrap_or(0.0),
                        m.gsc_impressions.unwrap_or(0),
                        m.gsc_clicks.unwrap_or(0),
                    )
                })
                .unwrap_or_else(|| "no metrics collected yet".to_string());

            let document = format!(
                "{} — title: {} — description: {} — depth {} — parent {} — {} — open issues: {}",
                page.url,
                page.title.as_deref().unwrap_or("(none)"),
                page.description.as_deref().unwrap_or("(none)"),
                page.depth_level,
                page.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string()),
                metrics_summary,
                if issue_summary.is_empty() { "none".to_string() } else { issue_summary },
            );
            let metadata = HashMap::from([
                ("domain_id".to_string(), domain.id.to_string()),
                ("page_id".to_string(), page.id.to_string()),
                ("url".to_string(), page.url.clone()),
            ]);
            self.try_upsert("page_context", &format!("page_{}", page.id), &document, &metadata, outcome).await;
        }
    }

    async fn sync_fix_history(&self, domain: &Domain, outcome: &mut SyncOutcome) {
        let rows: Vec<AiFixHistory> = match sqlx::query_as(
            r#"
            SELECT h.* FROM ai_fix_history h
            JOIN pages p ON p.id = h.page_id
            WHERE p.domain_id = ?
            ORDER BY h.applied_at DESC
            LIMIT 200
            "#,
        )
        .bind(domain.id)
        .fetch_all(&self.pool)
        .await
        {
            Ok(r) => r,
            Err(e) => {
                outcome.errors.push(format!("fix_history: failed to load rows: {e}"));
                return;
            },
        };

        for row in rows {
            let document = format!(
                "Fix for page {} ({}): {} -> {}. Status {}, effectiveness {}.{}",
                row.page_id,
                row.issue_type,
                row.original_value.as_deref().unwrap_or("(empty)"),
                row.fixed_value,
                row.fix_status,
                row.effectiveness,
                row.llm_explanation.as_deref().map(|e| format!(" Rationale: {e}")).unwrap_or_default(),
            );
            let metadata = HashMap::from([
                ("domain_id".to_string(), domain.id.to_string()),
                ("page_id".to_string(), row.page_id.to_string()),
                ("issue_type".to_string(), row.issue_type.clone()),
            ]);
            self.try_upsert("fix_history", &format!("fix_{}", row.id), &document, &metadata, outcome).await;
        }
    }

    async fn sync_sitemap_entries(&self, domain: &Domain, outcome: &mut SyncOutcome) {
        let rows: Vec<SitemapEntry> = match sqlx::query_as("SELECT * FROM sitemap_entries WHERE domain_id = ?")
            .bind(domain.id)
            .fetch_all(&self.pool)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                outcome.errors.push(format!("sitemap_entries: failed to load rows: {e}"));
                return;
            },
        };

        for row in rows {
            let document = format!(
                "{} — status {}, priority {}, changefreq {}",
                row.location_url,
                row.status,
                row.priority.map(|p| p.to_string()).unwrap_or_else(|| "unset".to_string()),
                row.changefreq.as_deref().unwrap_or("unset"),
            );
            let metadata = HashMap::from([
                ("domain_id".to_string(), domain.id.to_string()),
                ("location_url".to_string(), row.location_url.clone()),
            ]);
            self.try_upsert("sitemap_entries", &format!("sitemap_{}", row.id), &document, &metadata, outcome)
                .await;
        }
    }

    /// Suggestions in `tracking`/`tracked` state only (§4.6) — this is the
    /// feedback loop the Effectiveness Tracker feeds back to the LLM.
    async fn sync_suggestion_tracking(&self, domain: &Domain, outcome: &mut SyncOutcome) {
        let rows: Vec<AiSuggestion> = match sqlx::query_as(
            "SELECT * FROM ai_suggestions WHERE domain_id = ? AND status IN ('tracking', 'tracked')",
        )
        .bind(domain.id)
        .fetch_all(&self.pool)
        .await
        {
            Ok(r) => r,
            Err(e) => {
                outcome.errors.push(format!("suggestion_tracking: failed to load rows: {e}"));
                return;
            },
        };

        for row in rows {
            let document = format!(
                "{}: {}. Baseline {}. Final {}. Impact: {}",
                row.title,
                row.description,
                row.baseline_metrics.as_deref().unwrap_or("(none)"),
                row.final_metrics.as_deref().unwrap_or("(pending)"),
                row.impact_analysis.as_deref().unwrap_or("(pending)"),
            );
            let metadata = HashMap::from([
                ("domain_id".to_string(), domain.id.to_string()),
                ("suggestion_type".to_string(), row.suggestion_type.clone()),
                ("status".to_string(), row.status.clone()),
            ]);
            self.try_upsert("suggestion_tracking", &format!("suggestion_{}", row.id), &document, &metadata, outcome)
                .await;
        }
    }

    /// Computed tree statistics: depth distribution, orphan count, hub pages
    /// (pages with the most children) (§4.6, §4.7).
    async fn sync_site_structure(&self, domain: &Domain, outcome: &mut SyncOutcome) {
        let pages: Vec<Page> = match sqlx::query_as("SELECT * FROM pages WHERE domain_id = ? AND is_active = 1")
            .bind(domain.id)
            .fetch_all(&self.pool)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                outcome.errors.push(format!("site_structure: failed to load pages: {e}"));
                return;
            },
        };
        if pages.is_empty() {
            return;
        }

        let mut depth_histogram: HashMap<i64, usize> = HashMap::new();
        let mut child_counts: HashMap<i64, usize> = HashMap::new();
        let mut orphans = 0usize;
        for page in &pages {
            *depth_histogram.entry(page.depth_level).or_insert(0) += 1;
            match page.parent_id {
                Some(parent) => *child_counts.entry(parent).or_insert(0) += 1,
                None if page.depth_level > 0 => orphans += 1,
                None => {},
            }
        }
        let mut hubs: Vec<(i64, usize)> = child_counts.into_iter().collect();
        hubs.sort_by(|a, b| b.1.cmp(&a.1));
        hubs.truncate(5);

        let mut depths: Vec<(i64, usize)> = depth_histogram.into_iter().collect();
        depths.sort_by_key(|(depth, _)| *depth);
        let depth_summary =
            depths.iter().map(|(d, c)| format!("depth {d}: {c} pages")).collect::<Vec<_>>().join(", ");
        let hub_summary = hubs.iter().map(|(id, c)| format!("page {id} ({c} children)")).collect::<Vec<_>>().join(", ");

        let document = format!(
            "{} pages total. {}. Orphan pages: {}. Hub pages: {}.",
            pages.len(),
            depth_summary,
            orphans,
            if hub_summary.is_empty() { "none".to_string() } else { hub_summary },
        );
        let metadata = HashMap::from([("domain_id".to_string(), domain.id.to_string())]);
        self.try_upsert("site_structure", &format!("structure_{}", domain.id), &document, &metadata, outcome)
            .await;
    }

    /// Writes a single document into the `analysis_cache` collection — the
    /// only collection this store doesn't populate itself via `sync_domain`,
    /// since its content (a completed analysis) belongs to the AI Analysis
    /// Engine (§4.8 step 8).
    pub async fn upsert_analysis_cache(
        &self,
        domain_id: i64,
        point_id: &str,
        document: &str,
    ) -> Result<(), VectorStoreError> {
        let metadata = HashMap::from([("domain_id".to_string(), domain_id.to_string())]);
        self.upsert("analysis_cache", point_id, document, &metadata).await
    }

    async fn try_upsert(
        &self,
        collection: &'static str,
        id: &str,
        document: &str,
        metadata: &HashMap<String, String>,
        outcome: &mut SyncOutcome,
    ) {
        match self.upsert(collection, id, document, metadata).await {
            Ok(()) => *outcome.counts.entry(collection).or_insert(0) += 1,
            Err(e) => {
                warn!("vector store upsert failed for {}/{}: {}", collection, id, e);
                outcome.errors.push(format!("{collection}: {e}"));
            },
        }
    }
}

fn domain_filter(domain_id: i64) -> Filter {
    Filter {
        must: vec![Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: "domain_id".to_string(),
                r#match: Some(Match { match_value: Some(MatchValue::Keyword(domain_id.to_string())) }),
                ..Default::default()
            })),
        }],
        ..Default::default()
    }
}

fn qdrant_value_to_string(value: &QdrantValue) -> String {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        Some(Kind::StringValue(s)) => s.clone(),
        Some(Kind::IntegerValue(i)) => i.to_string(),
        Some(Kind::DoubleValue(d)) => d.to_string(),
        Some(Kind::BoolValue(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_are_the_seven_named_in_the_spec() {
        assert_eq!(COLLECTIONS.len(), 7);
        assert!(COLLECTIONS.contains(&"suggestion_tracking"));
        assert!(COLLECTIONS.contains(&"site_structure"));
    }

    #[test]
    fn domain_filter_matches_on_domain_id_keyword() {
        let filter = domain_filter(42);
        assert_eq!(filter.must.len(), 1);
    }
}
