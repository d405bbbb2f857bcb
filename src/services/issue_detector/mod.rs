//! Issue Detector (C5): runs the rule book against a fetched page and the
//! Page's current metrics snapshot, computes health score / potential gain /
//! estimated fix time, and persists idempotently (§4.5).

pub mod rules;

use crate::models::{DetectedIssue, IssueSeverity, IssueStatus, SeoIssue};
use rules::{DiagnosticRule, PageContext};
use scraper::Html;
use sqlx::SqlitePool;

const POTENTIAL_GAIN_CEILING: f64 = 35.0;

pub struct AnalysisReport {
    pub issues: Vec<DetectedIssue>,
    pub health_score: f64,
    pub potential_score_gain: f64,
    pub estimated_fix_minutes: f64,
}

pub struct IssueDetector {
    pool: SqlitePool,
    rules: Vec<Box<dyn DiagnosticRule>>,
}

impl IssueDetector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, rules: rules::get_all_rules() }
    }

    /// Run every rule against the page and compute the report's aggregate
    /// figures (§4.5). Does not persist; see `detect_and_persist`.
    pub fn analyze(&self, html: &str, base_host: &str, lcp_ms: Option<f64>, cls: Option<f64>) -> AnalysisReport {
        let document = Html::parse_document(html);
        let ctx = PageContext { document: &document, base_host, lcp_ms, cls };

        let mut issues: Vec<DetectedIssue> =
            self.rules.iter().filter_map(|rule| rule.evaluate(&ctx)).collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));

        let health_score = Self::health_score(&issues);
        let potential_score_gain = Self::potential_score_gain(&issues);
        let estimated_fix_minutes = Self::estimated_fix_minutes(&issues);

        AnalysisReport { issues, health_score, potential_score_gain, estimated_fix_minutes }
    }

    /// §4.5 health score: 100 minus the summed severity penalty, floored at 0.
    fn health_score(issues: &[DetectedIssue]) -> f64 {
        let penalty: f64 = issues.iter().map(|i| i.severity.penalty()).sum();
        (100.0 - penalty).max(0.0)
    }

    /// §4.5 potential score gain: summed penalty over auto-fixable issues only, capped.
    fn potential_score_gain(issues: &[DetectedIssue]) -> f64 {
        let gain: f64 = issues
            .iter()
            .filter(|i| i.issue_type.is_auto_fixable())
            .map(|i| i.severity.penalty())
            .sum();
        gain.min(POTENTIAL_GAIN_CEILING)
    }

    fn estimated_fix_minutes(issues: &[DetectedIssue]) -> f64 {
        issues.iter().map(|i| i.severity.estimated_fix_minutes()).sum()
    }

    /// Idempotent write: delete the page's currently-open issues, skip
    /// writing a new one for any type whose prior issue is already resolved
    /// or in flight toward deployment (§4.5).
    pub async fn detect_and_persist(
        &self,
        page_id: i64,
        html: &str,
        base_host: &str,
        lcp_ms: Option<f64>,
        cls: Option<f64>,
    ) -> Result<AnalysisReport, sqlx::Error> {
        let report = self.analyze(html, base_host, lcp_ms, cls);

        let existing: Vec<SeoIssue> = sqlx::query_as("SELECT * FROM seo_issues WHERE page_id = ?")
            .bind(page_id)
            .fetch_all(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM seo_issues WHERE page_id = ? AND status = 'open'")
            .bind(page_id)
            .execute(&mut *tx)
            .await?;

        for issue in &report.issues {
            let already_tracked = existing.iter().any(|e| {
                e.issue_type().as_ref() == Some(&issue.issue_type) && e.status() != IssueStatus::Open
            });
            if already_tracked {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO seo_issues
                    (page_id, issue_type, severity, title, message, current_value,
                     suggested_value, auto_fixable, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open')
                "#,
            )
            .bind(page_id)
            .bind(issue.issue_type.as_str())
            .bind(issue.severity.as_str())
            .bind(&issue.title)
            .bind(&issue.message)
            .bind(&issue.current_value)
            .bind(&issue.suggested_value)
            .bind(issue.issue_type.is_auto_fixable())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Verify-mode re-scan (§4.5): deployed issues whose type is still
    /// detected become `needs_attention`; those no longer detected become
    /// `verified` with a timestamp.
    pub async fn verify(
        &self,
        page_id: i64,
        html: &str,
        base_host: &str,
        lcp_ms: Option<f64>,
        cls: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        let report = self.analyze(html, base_host, lcp_ms, cls);
        let still_detected: std::collections::HashSet<&'static str> =
            report.issues.iter().map(|i| i.issue_type.as_str()).collect();

        let deployed: Vec<SeoIssue> =
            sqlx::query_as("SELECT * FROM seo_issues WHERE page_id = ? AND status = 'deployed'")
                .bind(page_id)
                .fetch_all(&self.pool)
                .await?;

        for issue in deployed {
            if still_detected.contains(issue.issue_type.as_str()) {
                sqlx::query(
                    "UPDATE seo_issues SET status = 'needs_attention', verification_status = 'needs_attention' WHERE id = ?",
                )
                .bind(issue.id)
                .execute(&self.pool)
                .await?;
            } else {
                sqlx::query(
                    "UPDATE seo_issues SET status = 'verified', verification_status = 'verified', verified_at = CURRENT_TIMESTAMP WHERE id = ?",
                )
                .bind(issue.id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> IssueDetector {
        // Tests exercise `analyze` only, which never touches the pool.
        IssueDetector { pool: sqlx::Pool::connect_lazy("sqlite::memory:").unwrap(), rules: rules::get_all_rules() }
    }

    #[test]
    fn health_score_perfect_page_is_100() {
        let d = detector();
        let html = format!(
            r#"<html><head><title>A reasonably long and descriptive page title</title>
            <meta name="description" content="{}">
            <meta property="og:title" content="t"><meta property="og:description" content="d">
            <meta property="og:image" content="i"><meta property="og:url" content="u">
            </head><body><h1>Heading</h1>
            <a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>
            {}
            </body></html>"#,
            "x".repeat(100),
            "word ".repeat(310)
        );
        let report = d.analyze(&html, "example.com", Some(1000.0), Some(0.05));
        assert_eq!(report.issues.len(), 0);
        assert_eq!(report.health_score, 100.0);
    }

    #[test]
    fn health_score_floors_at_zero() {
        let d = detector();
        let report = d.analyze("<html></html>", "example.com", Some(5000.0), Some(0.5));
        assert_eq!(report.health_score, 0.0);
    }

    #[test]
    fn potential_gain_capped_at_ceiling() {
        let d = detector();
        let report = d.analyze("<html></html>", "example.com", Some(5000.0), Some(0.5));
        assert!(report.potential_score_gain <= POTENTIAL_GAIN_CEILING);
    }
}
