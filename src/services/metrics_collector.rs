//! Metrics Collector (C3): two-phase, rate-limited, per-page signal fetch
//! (§4.3). Best-effort — a single page's failure never aborts the batch.

use crate::models::Page;
use crate::services::lighthouse_client::{LighthouseClient, Strategy};
use crate::services::search_console_client::SearchConsoleClient;
use crate::utils::rate_limiter::{RateLimiterKind, RateLimiterRegistry};
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub struct MetricsCollectionOutcome {
    pub succeeded: usize,
    pub failures: Vec<(i64, String)>,
}

pub struct MetricsCollector {
    pool: SqlitePool,
    lighthouse: Arc<LighthouseClient>,
    search_console: Arc<SearchConsoleClient>,
    rate_limiters: Arc<RateLimiterRegistry>,
    worker_pool_size: usize,
    gsc_enabled: bool,
}

impl MetricsCollector {
    pub fn new(
        pool: SqlitePool,
        lighthouse: Arc<LighthouseClient>,
        search_console: Arc<SearchConsoleClient>,
        rate_limiters: Arc<RateLimiterRegistry>,
        worker_pool_size: usize,
        gsc_enabled: bool,
    ) -> Self {
        Self { pool, lighthouse, search_console, rate_limiters, worker_pool_size, gsc_enabled }
    }

    /// Full collection: batch index-state phase, then a worker pool of size
    /// W fetching Lighthouse + analytics per page (§4.3).
    pub async fn collect(&self, site_url: &str, pages: &[Page]) -> MetricsCollectionOutcome {
        let index_state = self.batch_index_state(site_url, pages).await;

        let results: Vec<Result<(), (i64, String)>> = stream::iter(pages.iter())
            .map(|page| {
                let index_state = &index_state;
                async move { self.collect_one(site_url, page, index_state).await }
            })
            .buffer_unordered(self.worker_pool_size)
            .collect()
            .await;

        let mut failures = Vec::new();
        let mut succeeded = 0;
        for r in results {
            match r {
                Ok(()) => succeeded += 1,
                Err((page_id, msg)) => failures.push((page_id, msg)),
            }
        }
        MetricsCollectionOutcome { succeeded, failures }
    }

    /// Search-Console-only refresh (§4.4 lightweight mode): refreshes the
    /// index-state and analytics fields of the page's latest snapshot,
    /// skipping Lighthouse entirely.
    pub async fn refresh_search_console_fields(&self, snapshot_id: i64, site_url: &str, page: &Page) {
        let empty = HashMap::new();
        self.backfill_index_state(snapshot_id, page, &empty).await;
        self.backfill_analytics(snapshot_id, site_url, page).await;
    }

    /// Phase 1: one batched URL-Inspection call; on failure, caller falls
    /// back to sequential per-page inspection inside `collect_one`.
    async fn batch_index_state(
        &self,
        site_url: &str,
        pages: &[Page],
    ) -> HashMap<String, crate::models::IndexState> {
        if !self.gsc_enabled {
            return HashMap::new();
        }
        let urls: Vec<String> = pages.iter().map(|p| p.url.clone()).collect();
        let _permit = self.rate_limiters.get(RateLimiterKind::SearchConsole).acquire().await;
        match self.search_console.batch_inspect(site_url, &urls).await {
            Ok(map) => map,
            Err(e) => {
                warn!("batch index-state inspection failed, falling back per-page: {}", e);
                HashMap::new()
            },
        }
    }

    async fn collect_one(
        &self,
        site_url: &str,
        page: &Page,
        cached_index_state: &HashMap<String, crate::models::IndexState>,
    ) -> Result<(), (i64, String)> {
        let (scores, cwv, mobile_friendly) = {
            let _permit = self.rate_limiters.get(RateLimiterKind::Lighthouse).acquire().await;
            self.lighthouse
                .fetch(&page.url, Strategy::Mobile)
                .await
                .map_err(|e| (page.id, format!("lighthouse: {e}")))?
        };

        let snapshot_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO seo_metrics_snapshots
                (page_id, lighthouse_seo, lighthouse_performance, lighthouse_accessibility,
                 lighthouse_best_practices, lighthouse_pwa, lcp, fid, cls, fcp, tti, tbt,
                 mobile_friendly)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(page.id)
        .bind(scores.seo)
        .bind(scores.performance)
        .bind(scores.accessibility)
        .bind(scores.best_practices)
        .bind(scores.pwa)
        .bind(cwv.lcp)
        .bind(cwv.fid)
        .bind(cwv.cls)
        .bind(cwv.fcp)
        .bind(cwv.tti)
        .bind(cwv.tbt)
        .bind(mobile_friendly)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| (page.id, format!("persist snapshot: {e}")))?;

        if self.gsc_enabled {
            self.backfill_index_state(snapshot_id, page, cached_index_state).await;
            self.backfill_analytics(snapshot_id, site_url, page).await;
        }

        Ok(())
    }

    async fn backfill_index_state(
        &self,
        snapshot_id: i64,
        page: &Page,
        cached: &HashMap<String, crate::models::IndexState>,
    ) {
        let state = if let Some(state) = cached.get(&page.url) {
            Some(state.clone())
        } else {
            let _permit = self.rate_limiters.get(RateLimiterKind::SearchConsole).acquire().await;
            match self.search_console.inspect_one(&page.url, &page.url).await {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("index-state backfill failed for page {}: {}", page.id, e);
                    None
                },
            }
        };

        let Some(state) = state else { return };
        if let Err(e) = sqlx::query(
            "UPDATE seo_metrics_snapshots SET is_indexed = ?, index_verdict = ?, index_coverage_state = ? WHERE id = ?",
        )
        .bind(state.is_indexed)
        .bind(&state.verdict)
        .bind(&state.coverage_state)
        .bind(snapshot_id)
        .execute(&self.pool)
        .await
        {
            warn!("failed to persist index-state for snapshot {}: {}", snapshot_id, e);
        }
    }

    async fn backfill_analytics(&self, snapshot_id: i64, site_url: &str, page: &Page) {
        let analytics = {
            let _permit = self.rate_limiters.get(RateLimiterKind::SearchConsole).acquire().await;
            match self.search_console.search_analytics(site_url, &page.url).await {
                Ok(a) => a,
                Err(e) => {
                    warn!("search-analytics backfill failed for page {}: {}", page.id, e);
                    return;
                },
            }
        };

        let top_queries_json = serde_json::to_string(&analytics.top_queries).unwrap_or_default();
        if let Err(e) = sqlx::query(
            "UPDATE seo_metrics_snapshots SET gsc_impressions = ?, gsc_clicks = ?, gsc_ctr = ?, gsc_avg_position = ?, gsc_top_queries = ? WHERE id = ?",
        )
        .bind(analytics.impressions)
        .bind(analytics.clicks)
        .bind(analytics.ctr)
        .bind(analytics.avg_position)
        .bind(top_queries_json)
        .bind(snapshot_id)
        .execute(&self.pool)
        .await
        {
            warn!("failed to persist search-analytics for snapshot {}: {}", snapshot_id, e);
        }
    }
}
