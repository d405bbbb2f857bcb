//! Refresh Orchestrator (C4): the domain-wide staged scan state machine
//! (§4.4). Drives discovery → persisting → hierarchy → collecting →
//! aggregating, reporting progress through a callback and honoring a
//! cooperative cancel flag between stage milestones.

use crate::models::{DiscoveredUrl, Domain, Page, RefreshStatus};
use crate::services::discovery::DiscoveryService;
use crate::services::metrics_collector::MetricsCollector;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_MAX_URLS: usize = 1000;

pub type ProgressCallback = Arc<dyn Fn(u32, u32, &str) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("domain {0} not found")]
    DomainNotFound(i64),
    #[error("refresh already in flight for domain {0}")]
    AlreadyInFlight(i64),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct RefreshOrchestrator {
    pool: SqlitePool,
    discovery: Arc<DiscoveryService>,
    metrics: Arc<MetricsCollector>,
}

impl RefreshOrchestrator {
    pub fn new(pool: SqlitePool, discovery: Arc<DiscoveryService>, metrics: Arc<MetricsCollector>) -> Self {
        Self { pool, discovery, metrics }
    }

    /// Full refresh: discovering (0-10%) -> persisting (10-60%) ->
    /// hierarchy (60-70%) -> collecting (70-90%) -> aggregating (90-100%).
    /// Runs the full refresh and returns the per-page metrics-collection
    /// failures captured along the way (§7: a batch's per-page failures are
    /// reported on the job result, not treated as job-level errors).
    pub async fn run_full_refresh(
        &self,
        domain_id: i64,
        cancel: Arc<AtomicBool>,
        progress: ProgressCallback,
    ) -> Result<Vec<String>, RefreshError> {
        let domain = self.load_and_claim(domain_id).await?;

        let result = self.run_full_refresh_inner(&domain, &cancel, &progress).await;

        let final_status = if result.is_ok() { RefreshStatus::Done } else { RefreshStatus::Failed };
        self.set_status(domain_id, final_status).await?;
        result
    }

    async fn run_full_refresh_inner(
        &self,
        domain: &Domain,
        cancel: &Arc<AtomicBool>,
        progress: &ProgressCallback,
    ) -> Result<Vec<String>, RefreshError> {
        progress(0, 100, "discovering");
        self.set_status(domain.id, RefreshStatus::Discovering).await?;
        let discovered = self.discovery.discover(&domain.hostname, &domain.scheme, DEFAULT_MAX_URLS).await;
        progress(10, 100, "discovered");
        if cancel.load(Ordering::Relaxed) {
            return Err(RefreshError::Cancelled);
        }

        self.set_status(domain.id, RefreshStatus::Persisting).await?;
        self.persist_pages(domain.id, &discovered).await?;
        progress(60, 100, "persisted");
        if cancel.load(Ordering::Relaxed) {
            return Err(RefreshError::Cancelled);
        }

        self.set_status(domain.id, RefreshStatus::Hierarchy).await?;
        self.build_hierarchy(domain.id).await?;
        progress(70, 100, "hierarchy built");
        if cancel.load(Ordering::Relaxed) {
            return Err(RefreshError::Cancelled);
        }

        self.set_status(domain.id, RefreshStatus::Collecting).await?;
        let pages = self.active_pages(domain.id).await?;
        let site_url = format!("{}://{}", domain.scheme, domain.hostname);
        let outcome = self.metrics.collect(&site_url, &pages).await;
        let failures: Vec<String> = outcome
            .failures
            .iter()
            .map(|(page_id, err)| {
                warn!("metrics collection failed for page {}: {}", page_id, err);
                format!("page {page_id}: {err}")
            })
            .collect();
        progress(90, 100, "metrics collected");
        if cancel.load(Ordering::Relaxed) {
            return Err(RefreshError::Cancelled);
        }

        self.set_status(domain.id, RefreshStatus::Aggregating).await?;
        self.aggregate(domain.id).await?;
        progress(100, 100, "done");

        Ok(failures)
    }

    /// Lightweight Search-Console-only refresh: skips Lighthouse and
    /// discovery/hierarchy entirely, refreshing only the index-state and
    /// analytics fields of each page's latest snapshot (§4.4).
    pub async fn run_gsc_refresh(&self, domain_id: i64) -> Result<(), RefreshError> {
        let domain = self.load_and_claim(domain_id).await?;
        let pages = self.active_pages(domain_id).await?;
        let site_url = format!("{}://{}", domain.scheme, domain.hostname);

        for page in &pages {
            if let Some(snapshot_id) = self.latest_snapshot_id(page.id).await? {
                self.metrics.refresh_search_console_fields(snapshot_id, &site_url, page).await;
            }
        }

        sqlx::query("UPDATE domains SET last_gsc_scan_at = CURRENT_TIMESTAMP, refresh_status = 'idle' WHERE id = ?")
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_and_claim(&self, domain_id: i64) -> Result<Domain, RefreshError> {
        let domain: Domain = sqlx::query_as("SELECT * FROM domains WHERE id = ?")
            .bind(domain_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RefreshError::DomainNotFound(domain_id))?;

        if domain.refresh_status().is_in_flight() {
            return Err(RefreshError::AlreadyInFlight(domain_id));
        }
        Ok(domain)
    }

    async fn set_status(&self, domain_id: i64, status: RefreshStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE domains SET refresh_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert discovered pages, preserving manually-edited pages' parent,
    /// depth_level, and use_manual_position (§4.4 persisting step).
    async fn persist_pages(&self, domain_id: i64, discovered: &[DiscoveredUrl]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for d in discovered {
            let existing: Option<(i64, bool)> =
                sqlx::query_as("SELECT id, is_manually_edited FROM pages WHERE domain_id = ? AND url = ?")
                    .bind(domain_id)
                    .bind(&d.url)
                    .fetch_optional(&mut *tx)
                    .await?;

            match existing {
                Some((id, true)) => {
                    sqlx::query(
                        "UPDATE pages SET path = ?, is_subdomain = ?, subdomain_label = ?, is_active = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                    )
                    .bind(&d.path)
                    .bind(d.is_subdomain)
                    .bind(&d.subdomain_label)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                },
                Some((id, false)) => {
                    sqlx::query(
                        "UPDATE pages SET path = ?, depth_level = ?, is_subdomain = ?, subdomain_label = ?, is_active = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                    )
                    .bind(&d.path)
                    .bind(d.initial_depth_estimate)
                    .bind(d.is_subdomain)
                    .bind(&d.subdomain_label)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                },
                None => {
                    sqlx::query(
                        "INSERT INTO pages (domain_id, url, path, depth_level, is_subdomain, subdomain_label, is_active) VALUES (?, ?, ?, ?, ?, ?, 1)",
                    )
                    .bind(domain_id)
                    .bind(&d.url)
                    .bind(&d.path)
                    .bind(d.initial_depth_estimate)
                    .bind(d.is_subdomain)
                    .bind(&d.subdomain_label)
                    .execute(&mut *tx)
                    .await?;
                },
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Root is the shortest-path page; every other non-manual page adopts
    /// the longest proper-prefix page as parent, leaves adopt the root
    /// (§4.4 hierarchy step). Ascending path-length order means a page's
    /// candidate parents are always already resolved, so no cycles arise.
    async fn build_hierarchy(&self, domain_id: i64) -> Result<(), sqlx::Error> {
        let mut pages: Vec<Page> = sqlx::query_as("SELECT * FROM pages WHERE domain_id = ? AND is_active = 1")
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await?;
        pages.sort_by_key(|p| p.path.len());

        let Some(root) = pages.first().cloned() else { return Ok(()) };

        let mut tx = self.pool.begin().await?;
        for page in &pages {
            if page.id == root.id || page.is_manually_edited {
                continue;
            }

            let parent = pages
                .iter()
                .filter(|candidate| candidate.id != page.id && is_proper_prefix(&candidate.path, &page.path))
                .max_by_key(|candidate| candidate.path.len())
                .unwrap_or(&root);

            let depth = if parent.id == page.id { 0 } else { parent.depth_level + 1 };
            sqlx::query("UPDATE pages SET parent_id = ?, depth_level = ? WHERE id = ?")
                .bind(parent.id)
                .bind(depth)
                .bind(page.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn active_pages(&self, domain_id: i64) -> Result<Vec<Page>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pages WHERE domain_id = ? AND is_active = 1")
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn latest_snapshot_id(&self, page_id: i64) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM seo_metrics_snapshots WHERE page_id = ? ORDER BY taken_at DESC LIMIT 1",
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Update cached domain-level averages from the latest snapshot per
    /// page, via a correlated subquery rather than a per-page loop (§4.4).
    async fn aggregate(&self, domain_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE domains SET
                seo_score = (
                    SELECT AVG(s.lighthouse_seo) FROM seo_metrics_snapshots s
                    JOIN pages p ON p.id = s.page_id
                    WHERE p.domain_id = domains.id AND p.is_active = 1
                      AND s.id = (SELECT id FROM seo_metrics_snapshots s2 WHERE s2.page_id = p.id ORDER BY s2.taken_at DESC LIMIT 1)
                ),
                performance_score = (
                    SELECT AVG(s.lighthouse_performance) FROM seo_metrics_snapshots s
                    JOIN pages p ON p.id = s.page_id
                    WHERE p.domain_id = domains.id AND p.is_active = 1
                      AND s.id = (SELECT id FROM seo_metrics_snapshots s2 WHERE s2.page_id = p.id ORDER BY s2.taken_at DESC LIMIT 1)
                ),
                accessibility_score = (
                    SELECT AVG(s.lighthouse_accessibility) FROM seo_metrics_snapshots s
                    JOIN pages p ON p.id = s.page_id
                    WHERE p.domain_id = domains.id AND p.is_active = 1
                      AND s.id = (SELECT id FROM seo_metrics_snapshots s2 WHERE s2.page_id = p.id ORDER BY s2.taken_at DESC LIMIT 1)
                ),
                last_full_scan_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(domain_id)
        .execute(&self.pool)
        .await?;
        info!("aggregated domain {} cached scores", domain_id);
        Ok(())
    }
}

fn is_proper_prefix(candidate: &str, path: &str) -> bool {
    if candidate == path {
        return false;
    }
    if candidate == "/" {
        return true;
    }
    path.starts_with(candidate) && path[candidate.len()..].starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_proper_prefix_of_everything() {
        assert!(is_proper_prefix("/", "/about"));
    }

    #[test]
    fn longest_prefix_wins_by_length_comparison() {
        assert!(is_proper_prefix("/blog", "/blog/post-1"));
        assert!(!is_proper_prefix("/blog/post-1", "/blog"));
    }

    #[test]
    fn sibling_paths_are_not_prefixes() {
        assert!(!is_proper_prefix("/blog-archive", "/blog/post-1"));
    }
}
