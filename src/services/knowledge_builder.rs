//! Knowledge Builder (C7): transforms raw DB rows into a structured context
//! object for the AI Analysis Engine's prompts (§4.7). Pure transformation —
//! no external calls, no persistence.

use crate::models::Domain;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

/// URL-pattern → content-type heuristic, grounded on
/// `seo_knowledge_builder.py`'s `CONTENT_TYPE_PATTERNS` table (§4.7).
const CONTENT_TYPE_PATTERNS: &[(&str, &str, (f64, f64), &str)] = &[
    ("blog", "blog", (0.6, 0.8), "weekly"),
    ("news", "news", (0.7, 0.9), "daily"),
    ("product", "product", (0.7, 0.9), "weekly"),
    ("category", "category", (0.6, 0.8), "weekly"),
    ("about", "static", (0.4, 0.6), "monthly"),
    ("contact", "static", (0.3, 0.5), "yearly"),
    ("faq", "support", (0.5, 0.7), "monthly"),
    ("help", "support", (0.5, 0.7), "monthly"),
    ("docs", "documentation", (0.6, 0.8), "weekly"),
    ("api", "documentation", (0.5, 0.7), "weekly"),
];

/// Per-severity penalty for the domain health score (§4.7's own scale,
/// distinct from the Issue Detector's per-page scale in §4.5).
fn severity_weight(severity: &str) -> f64 {
    match severity {
        "critical" => 25.0,
        "high" => 15.0,
        "medium" => 8.0,
        "low" => 3.0,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainOverview {
    pub domain_name: String,
    pub total_pages: i64,
    pub indexed_in_sitemap: i64,
    pub avg_seo_score: Option<f64>,
    pub avg_performance_score: Option<f64>,
    pub issue_summary: HashMap<String, i64>,
    pub health_score: f64,
    pub google_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlStructure {
    pub depth_distribution: HashMap<i64, i64>,
    pub max_depth: i64,
    pub path_patterns: HashMap<String, i64>,
    pub orphan_pages: i64,
    pub structure_quality: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentTypeStats {
    pub count: i64,
    pub avg_priority: Option<f64>,
    pub changefreq_distribution: HashMap<String, i64>,
    pub issues_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeoHealth {
    pub issue_patterns: Vec<(String, String, i64)>,
    pub problem_pages: Vec<(String, Option<String>, i64)>,
    pub score_distribution: HashMap<&'static str, i64>,
    pub auto_fixable_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordInsight {
    pub keyword: String,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cannibalization {
    pub keyword: String,
    pub competing_pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordInsights {
    pub top_keywords: Vec<KeywordInsight>,
    pub total_keywords: usize,
    pub cannibalization: Vec<Cannibalization>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityPriority {
    Urgent,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub kind: String,
    pub priority: OpportunityPriority,
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovementOpportunities {
    pub opportunities: Vec<Opportunity>,
    pub estimated_score_gain: f64,
}

/// The full structured context, mirroring §4.7's dict shape.
#[derive(Debug, Clone, Serialize)]
pub struct DomainContext {
    pub domain_overview: DomainOverview,
    pub url_structure: UrlStructure,
    pub content_analysis: HashMap<String, ContentTypeStats>,
    pub seo_health: SeoHealth,
    pub keyword_insights: KeywordInsights,
    pub improvement_opportunities: ImprovementOpportunities,
}

pub struct KnowledgeBuilder;

impl KnowledgeBuilder {
    pub async fn build(pool: &SqlitePool, domain: &Domain) -> Result<DomainContext, sqlx::Error> {
        let domain_overview = Self::build_domain_overview(pool, domain).await?;
        let url_structure = Self::build_url_structure(pool, domain).await?;
        let content_analysis = Self::build_content_analysis(pool, domain).await?;
        let seo_health = Self::build_seo_health(pool, domain).await?;
        let keyword_insights = Self::build_keyword_insights(pool, domain).await?;
        let improvement_opportunities =
            Self::build_improvement_opportunities(pool, domain, &seo_health).await?;

        Ok(DomainContext {
            domain_overview,
            url_structure,
            content_analysis,
            seo_health,
            keyword_insights,
            improvement_opportunities,
        })
    }

    async fn build_domain_overview(pool: &SqlitePool, domain: &Domain) -> Result<DomainOverview, sqlx::Error> {
        let total_pages: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE domain_id = ? AND is_active = 1")
                .bind(domain.id)
                .fetch_one(pool)
                .await?;
        let indexed_in_sitemap: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sitemap_entries WHERE domain_id = ?")
                .bind(domain.id)
                .fetch_one(pool)
                .await?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT i.severity, COUNT(*) FROM seo_issues i
            JOIN pages p ON p.id = i.page_id
            WHERE p.domain_id = ? AND i.status = 'open'
            GROUP BY i.severity
            "#,
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;
        let issue_summary: HashMap<String, i64> = rows.into_iter().collect();
        let health_score =
            (100.0 - issue_summary.iter().map(|(sev, count)| severity_weight(sev) * *count as f64).sum::<f64>())
                .max(0.0);

        Ok(DomainOverview {
            domain_name: domain.hostname.clone(),
            total_pages,
            indexed_in_sitemap,
            avg_seo_score: domain.seo_score,
            avg_performance_score: domain.performance_score,
            issue_summary,
            health_score,
            google_connected: domain.last_gsc_scan_at.is_some(),
        })
    }

    async fn build_url_structure(pool: &SqlitePool, domain: &Domain) -> Result<UrlStructure, sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT depth_level, path FROM pages WHERE domain_id = ? AND is_active = 1",
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;

        let mut depth_distribution: HashMap<i64, i64> = HashMap::new();
        let mut path_patterns: HashMap<String, i64> = HashMap::new();
        for (depth, path) in &rows {
            *depth_distribution.entry(*depth).or_insert(0) += 1;
            if let Some(first_segment) = path.split('/').find(|s| !s.is_empty()) {
                *path_patterns.entry(first_segment.to_string()).or_insert(0) += 1;
            }
        }
        let max_depth = depth_distribution.keys().copied().max().unwrap_or(0);

        let orphan_pages: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pages WHERE domain_id = ? AND depth_level > 0 AND parent_id IS NULL",
        )
        .bind(domain.id)
        .fetch_one(pool)
        .await?;

        Ok(UrlStructure {
            depth_distribution,
            max_depth,
            path_patterns,
            orphan_pages,
            structure_quality: if orphan_pages == 0 { "good" } else { "needs_improvement" },
        })
    }

    async fn build_content_analysis(
        pool: &SqlitePool,
        domain: &Domain,
    ) -> Result<HashMap<String, ContentTypeStats>, sqlx::Error> {
        let rows: Vec<(String, Option<f64>, Option<String>)> = sqlx::query_as(
            "SELECT location_url, priority, changefreq FROM sitemap_entries WHERE domain_id = ?",
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;

        struct Acc {
            count: i64,
            priorities: Vec<f64>,
            changefreqs: HashMap<String, i64>,
            issues: i64,
        }
        let mut by_type: HashMap<String, Acc> = HashMap::new();

        for (url, priority, changefreq) in rows {
            let content_type = infer_content_type(&url);
            let pattern = CONTENT_TYPE_PATTERNS.iter().find(|(_, ct, _, _)| *ct == content_type);
            let entry = by_type.entry(content_type.to_string()).or_insert_with(|| Acc {
                count: 0,
                priorities: Vec::new(),
                changefreqs: HashMap::new(),
                issues: 0,
            });
            entry.count += 1;
            if let Some(p) = priority {
                entry.priorities.push(p);
                if let Some((_, _, (min, max), _)) = pattern {
                    if !(*min..=*max).contains(&p) {
                        entry.issues += 1;
                    }
                }
            }
            if let Some(cf) = changefreq {
                *entry.changefreqs.entry(cf).or_insert(0) += 1;
            }
        }

        Ok(by_type
            .into_iter()
            .map(|(ct, acc)| {
                let avg_priority =
                    (!acc.priorities.is_empty()).then(|| acc.priorities.iter().sum::<f64>() / acc.priorities.len() as f64);
                (
                    ct,
                    ContentTypeStats {
                        count: acc.count,
                        avg_priority,
                        changefreq_distribution: acc.changefreqs,
                        issues_count: acc.issues,
                    },
                )
            })
            .collect())
    }

    async fn build_seo_health(pool: &SqlitePool, domain: &Domain) -> Result<SeoHealth, sqlx::Error> {
        let issue_patterns: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT i.issue_type, i.severity, COUNT(*) FROM seo_issues i
            JOIN pages p ON p.id = i.page_id
            WHERE p.domain_id = ? AND i.status = 'open'
            GROUP BY i.issue_type, i.severity
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;

        let problem_pages: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT p.url, p.title, COUNT(i.id) as issue_count FROM pages p
            JOIN seo_issues i ON i.page_id = p.id AND i.status = 'open'
            WHERE p.domain_id = ?
            GROUP BY p.id
            HAVING issue_count > 0
            ORDER BY issue_count DESC
            LIMIT 10
            "#,
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;

        let scores: Vec<(Option<f64>,)> = sqlx::query_as(
            r#"
            SELECT (
                SELECT s.lighthouse_seo FROM seo_metrics_snapshots s
                WHERE s.page_id = p.id ORDER BY s.taken_at DESC LIMIT 1
            ) FROM pages p WHERE p.domain_id = ? AND p.is_active = 1
            "#,
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;

        let mut score_distribution: HashMap<&'static str, i64> =
            HashMap::from([("excellent", 0), ("good", 0), ("average", 0), ("poor", 0)]);
        for (score,) in scores {
            let Some(score) = score else { continue };
            let bucket = if score >= 90.0 {
                "excellent"
            } else if score >= 70.0 {
                "good"
            } else if score >= 50.0 {
                "average"
            } else {
                "poor"
            };
            *score_distribution.entry(bucket).or_insert(0) += 1;
        }

        let auto_fixable_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM seo_issues i
            JOIN pages p ON p.id = i.page_id
            WHERE p.domain_id = ? AND i.status = 'open' AND i.auto_fixable = 1
            "#,
        )
        .bind(domain.id)
        .fetch_one(pool)
        .await?;

        Ok(SeoHealth { issue_patterns, problem_pages, score_distribution, auto_fixable_count })
    }

    async fn build_keyword_insights(pool: &SqlitePool, domain: &Domain) -> Result<KeywordInsights, sqlx::Error> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT p.url, s.gsc_top_queries FROM seo_metrics_snapshots s
            JOIN pages p ON p.id = s.page_id
            WHERE p.domain_id = ? AND s.gsc_top_queries IS NOT NULL
            ORDER BY s.taken_at DESC
            LIMIT 50
            "#,
        )
        .bind(domain.id)
        .fetch_all(pool)
        .await?;

        struct Acc {
            impressions: i64,
            clicks: i64,
            pages: std::collections::HashSet<String>,
        }
        let mut performance: HashMap<String, Acc> = HashMap::new();

        for (url, top_queries_json) in rows {
            let Some(json) = top_queries_json else { continue };
            let Ok(queries) = serde_json::from_str::<Vec<crate::models::GscQuery>>(&json) else { continue };
            for query in queries.into_iter().take(5) {
                let entry = performance.entry(query.query.clone()).or_insert_with(|| Acc {
                    impressions: 0,
                    clicks: 0,
                    pages: std::collections::HashSet::new(),
                });
                entry.impressions += query.impressions;
                entry.clicks += query.clicks;
                entry.pages.insert(url.clone());
            }
        }

        let mut top_keywords: Vec<KeywordInsight> = performance
            .iter()
            .map(|(kw, data)| KeywordInsight {
                keyword: kw.clone(),
                impressions: data.impressions,
                clicks: data.clicks,
                ctr: if data.impressions > 0 { data.clicks as f64 / data.impressions as f64 } else { 0.0 },
                page_count: data.pages.len(),
            })
            .collect();
        top_keywords.sort_by(|a, b| b.impressions.cmp(&a.impressions));
        let total_keywords = top_keywords.len();
        top_keywords.truncate(20);

        // Cannibalisation: same keyword surfacing on more than one page (§4.7).
        let mut cannibalization: Vec<Cannibalization> = performance
            .into_iter()
            .filter(|(_, data)| data.pages.len() > 1)
            .map(|(kw, data)| Cannibalization {
                keyword: kw,
                competing_pages: data.pages.into_iter().take(5).collect(),
            })
            .collect();
        cannibalization.truncate(10);

        Ok(KeywordInsights { top_keywords, total_keywords, cannibalization })
    }

    async fn build_improvement_opportunities(
        pool: &SqlitePool,
        domain: &Domain,
        seo_health: &SeoHealth,
    ) -> Result<ImprovementOpportunities, sqlx::Error> {
        let mut opportunities = Vec::new();

        let pages_without_sitemap: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM pages p
            WHERE p.domain_id = ? AND p.is_active = 1
            AND NOT EXISTS (SELECT 1 FROM sitemap_entries e WHERE e.page_id = p.id)
            "#,
        )
        .bind(domain.id)
        .fetch_one(pool)
        .await?;
        if pages_without_sitemap > 0 {
            opportunities.push(Opportunity {
                kind: "sitemap_coverage".to_string(),
                priority: OpportunityPriority::High,
                description: format!("{pages_without_sitemap} pages missing from the sitemap"),
                action: "add the missing pages to the sitemap".to_string(),
            });
        }

        if seo_health.auto_fixable_count > 0 {
            opportunities.push(Opportunity {
                kind: "auto_fix".to_string(),
                priority: OpportunityPriority::High,
                description: format!("{} auto-fixable issues", seo_health.auto_fixable_count),
                action: "run auto-fix for an immediate improvement".to_string(),
            });
        }

        let wrong_priority: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sitemap_entries WHERE domain_id = ? AND (priority < 0.3 OR priority > 0.9)",
        )
        .bind(domain.id)
        .fetch_one(pool)
        .await?;
        if wrong_priority > 0 {
            opportunities.push(Opportunity {
                kind: "priority_optimization".to_string(),
                priority: OpportunityPriority::Medium,
                description: format!("{wrong_priority} sitemap priority values out of the recommended range"),
                action: "adjust priority to match content importance".to_string(),
            });
        }

        let critical_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM seo_issues i
            JOIN pages p ON p.id = i.page_id
            WHERE p.domain_id = ? AND i.status = 'open' AND i.severity = 'critical'
            "#,
        )
        .bind(domain.id)
        .fetch_one(pool)
        .await?;
        if critical_count > 0 {
            opportunities.push(Opportunity {
                kind: "critical_issues".to_string(),
                priority: OpportunityPriority::Urgent,
                description: format!("{critical_count} critical issues need resolving"),
                action: "directly affects ranking and score".to_string(),
            });
        }

        opportunities.sort_by_key(|o| o.priority);

        let estimated_score_gain = opportunities
            .iter()
            .map(|o| match o.priority {
                OpportunityPriority::Urgent => 15.0,
                OpportunityPriority::High => 10.0,
                OpportunityPriority::Medium => 5.0,
                OpportunityPriority::Low => 0.0,
            })
            .sum::<f64>()
            .min(30.0);

        Ok(ImprovementOpportunities { opportunities, estimated_score_gain })
    }
}

/// URL-pattern content-type inference (§4.7).
fn infer_content_type(url: &str) -> &'static str {
    let path = url.to_lowercase();
    for (pattern, content_type, _, _) in CONTENT_TYPE_PATTERNS {
        if path.contains(pattern) {
            return content_type;
        }
    }
    let segments = path.trim_start_matches("http://").trim_start_matches("https://");
    let path_part = segments.splitn(2, '/').nth(1).unwrap_or("");
    match path_part.split('/').filter(|s| !s.is_empty()).count() {
        0 => "homepage",
        1 => "main_section",
        _ => "content_page",
    }
}

impl DomainContext {
    /// Compact text form consumed by §4.8 prompts.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== Domain analysis: {} ===\n\n", self.domain_overview.domain_name));
        out.push_str("## Overview\n");
        out.push_str(&format!("- Total pages: {}\n", self.domain_overview.total_pages));
        out.push_str(&format!("- Indexed in sitemap: {}\n", self.domain_overview.indexed_in_sitemap));
        out.push_str(&format!(
            "- Average SEO score: {}\n",
            self.domain_overview.avg_seo_score.map(|s| s.to_string()).unwrap_or_else(|| "N/A".to_string())
        ));
        out.push_str(&format!("- Health score: {:.1}/100\n", self.domain_overview.health_score));
        out.push_str(&format!(
            "- Google Search Console: {}\n\n",
            if self.domain_overview.google_connected { "connected" } else { "not connected" }
        ));

        out.push_str("## URL structure\n");
        out.push_str(&format!("- Max depth: {}\n", self.url_structure.max_depth));
        out.push_str(&format!("- Orphan pages: {}\n\n", self.url_structure.orphan_pages));

        out.push_str("## Content types\n");
        for (ct, stats) in &self.content_analysis {
            let avg_p = stats.avg_priority.map(|p| format!("{p:.2}")).unwrap_or_else(|| "N/A".to_string());
            out.push_str(&format!("- {ct}: {} pages, avg priority {avg_p}\n", stats.count));
        }
        out.push('\n');

        out.push_str("## SEO issues\n");
        out.push_str(&format!("- Auto-fixable: {}\n\n", self.seo_health.auto_fixable_count));

        out.push_str("## Improvement opportunities (by priority)\n");
        for opp in &self.improvement_opportunities.opportunities {
            out.push_str(&format!("- [{:?}] {}\n", opp.priority, opp.description));
        }
        out.push_str(&format!(
            "\nEstimated score gain: +{:.0} points\n",
            self.improvement_opportunities.estimated_score_gain
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_blog_from_path() {
        assert_eq!(infer_content_type("https://example.com/blog/my-post"), "blog");
    }

    #[test]
    fn infers_homepage_for_bare_domain() {
        assert_eq!(infer_content_type("https://example.com/"), "homepage");
    }

    #[test]
    fn infers_content_page_for_deep_path() {
        assert_eq!(infer_content_type("https://example.com/a/b/c"), "content_page");
    }
}
