//! Scheduler Bridge (C12): wires the seven cron triggers in
//! `SchedulerConfig` (§4.12) to the services that do the actual work,
//! fanning each trigger out over every active domain and skipping a domain
//! already mid-refresh.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Local;
use sqlx::SqlitePool;

use crate::config::SchedulerConfig;
use crate::models::Domain;
use crate::services::ai_analysis::AiAnalysisEngine;
use crate::services::effectiveness_tracker::EffectivenessTracker;
use crate::services::refresh_orchestrator::RefreshOrchestrator;
use crate::services::vector_store::VectorStore;
use crate::utils::{ScheduledExecutor, ScheduledTask};

pub struct SchedulerBridge {
    pool: SqlitePool,
    refresh: Arc<RefreshOrchestrator>,
    ai_analysis: Arc<AiAnalysisEngine>,
    vector_store: Arc<VectorStore>,
    effectiveness: Arc<EffectivenessTracker>,
    config: SchedulerConfig,
}

impl SchedulerBridge {
    pub fn new(
        pool: SqlitePool,
        refresh: Arc<RefreshOrchestrator>,
        ai_analysis: Arc<AiAnalysisEngine>,
        vector_store: Arc<VectorStore>,
        effectiveness: Arc<EffectivenessTracker>,
        config: SchedulerConfig,
    ) -> Self {
        Self { pool, refresh, ai_analysis, vector_store, effectiveness, config }
    }

    /// Starts every enabled trigger as a background tokio task. Returns
    /// immediately; each executor runs until the process exits.
    pub fn spawn_all(self: Arc<Self>) {
        if !self.config.enabled {
            tracing::info!("scheduler disabled, no triggers started");
            return;
        }

        let triggers: [(&str, &str); 7] = [
            ("gsc-sync-morning", &self.config.gsc_sync_morning),
            ("gsc-sync-evening", &self.config.gsc_sync_evening),
            ("daily-full-scan", &self.config.daily_full_scan),
            ("daily-ai-analysis", &self.config.daily_ai_analysis),
            ("vector-embedding-update", &self.config.vector_embedding_update),
            ("evaluate-fix-effectiveness", &self.config.evaluate_fix_effectiveness),
            ("daily-snapshot", &self.config.daily_snapshot),
        ];

        macro_rules! start {
            ($name:expr, $expr:expr, $task:expr) => {
                match ScheduledExecutor::new_cron($name, $expr) {
                    Ok(executor) => {
                        tokio::spawn(executor.start($task));
                    },
                    Err(e) => tracing::error!("failed to schedule '{}': {}", $name, e),
                }
            };
        }

        start!(triggers[0].0, triggers[0].1, GscSyncTask(Arc::clone(&self)));
        start!(triggers[1].0, triggers[1].1, GscSyncTask(Arc::clone(&self)));
        start!(triggers[2].0, triggers[2].1, DailyFullScanTask(Arc::clone(&self)));
        start!(triggers[3].0, triggers[3].1, DailyAiAnalysisTask(Arc::clone(&self)));
        start!(triggers[4].0, triggers[4].1, VectorEmbeddingUpdateTask(Arc::clone(&self)));
        start!(triggers[5].0, triggers[5].1, EvaluateFixEffectivenessTask(Arc::clone(&self)));
        start!(triggers[6].0, triggers[6].1, DailySnapshotTask(Arc::clone(&self)));
    }

    async fn active_domains(&self) -> Result<Vec<Domain>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM domains WHERE is_active = 1").fetch_all(&self.pool).await
    }

    async fn run_gsc_sync(&self) -> Result<(), anyhow::Error> {
        for domain in self.active_domains().await? {
            if domain.refresh_status().is_in_flight() {
                continue;
            }
            if let Err(e) = self.refresh.run_gsc_refresh(domain.id).await {
                tracing::warn!(domain_id = domain.id, error = %e, "gsc sync failed");
            }
        }
        Ok(())
    }

    async fn run_daily_full_scan(&self) -> Result<(), anyhow::Error> {
        let progress: crate::services::refresh_orchestrator::ProgressCallback = Arc::new(|_, _, _| {});
        for domain in self.active_domains().await? {
            if domain.refresh_status().is_in_flight() {
                continue;
            }
            let cancel = Arc::new(AtomicBool::new(false));
            if let Err(e) = self.refresh.run_full_refresh(domain.id, cancel, progress.clone()).await {
                tracing::warn!(domain_id = domain.id, error = %e, "daily full scan failed");
            }
        }
        Ok(())
    }

    async fn run_daily_ai_analysis(&self) -> Result<(), anyhow::Error> {
        let progress: crate::services::refresh_orchestrator::ProgressCallback = Arc::new(|_, _, _| {});
        for domain in self.active_domains().await? {
            if let Err(e) = self.ai_analysis.analyze_domain(&domain, false, &progress).await {
                tracing::warn!(domain_id = domain.id, error = %e, "scheduled ai analysis failed");
            }
        }
        Ok(())
    }

    async fn run_vector_embedding_update(&self) -> Result<(), anyhow::Error> {
        for domain in self.active_domains().await? {
            let outcome = self.vector_store.sync_domain(&domain).await;
            if !outcome.errors.is_empty() {
                tracing::warn!(domain_id = domain.id, errors = ?outcome.errors, "vector sync reported errors");
            }
        }
        Ok(())
    }

    async fn run_evaluate_fix_effectiveness(&self) -> Result<(), anyhow::Error> {
        for domain in self.active_domains().await? {
            match self.effectiveness.run_due(&domain).await {
                Ok(finalized) if !finalized.is_empty() => {
                    tracing::info!(domain_id = domain.id, count = finalized.len(), "finalized suggestion effectiveness");
                },
                Ok(_) => {},
                Err(e) => tracing::warn!(domain_id = domain.id, error = %e, "effectiveness evaluation failed"),
            }
        }
        Ok(())
    }

    async fn run_daily_snapshot(&self) -> Result<(), anyhow::Error> {
        let today = Local::now().date_naive();
        for domain in self.active_domains().await? {
            if let Err(e) = self.write_traffic_snapshot(domain.id, today).await {
                tracing::warn!(domain_id = domain.id, error = %e, "daily traffic snapshot failed");
            }
        }
        Ok(())
    }

    /// Sums each active page's latest GSC reading into one domain-wide row
    /// for `today`, upserting on the table's `(domain_id, snapshot_date)`
    /// uniqueness so a re-run the same day is a no-op update, not a duplicate.
    async fn write_traffic_snapshot(&self, domain_id: i64, today: chrono::NaiveDate) -> Result<(), sqlx::Error> {
        let pages: Vec<(i64,)> = sqlx::query_as("SELECT id FROM pages WHERE domain_id = ? AND is_active = 1")
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await?;

        let mut impressions: i64 = 0;
        let mut clicks: i64 = 0;
        let mut ctr_sum = 0.0;
        let mut position_sum = 0.0;
        let mut sampled = 0;

        for (page_id,) in pages {
            let row: Option<(Option<i64>, Option<i64>, Option<f64>, Option<f64>)> = sqlx::query_as(
                r#"SELECT gsc_impressions, gsc_clicks, gsc_ctr, gsc_avg_position
                   FROM seo_metrics_snapshots WHERE page_id = ? ORDER BY taken_at DESC LIMIT 1"#,
            )
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some((page_impressions, page_clicks, page_ctr, page_position)) = row {
                impressions += page_impressions.unwrap_or(0);
                clicks += page_clicks.unwrap_or(0);
                ctr_sum += page_ctr.unwrap_or(0.0);
                position_sum += page_position.unwrap_or(0.0);
                sampled += 1;
            }
        }

        let avg_ctr = if sampled > 0 { ctr_sum / sampled as f64 } else { 0.0 };
        let avg_position = if sampled > 0 { position_sum / sampled as f64 } else { 0.0 };

        sqlx::query(
            r#"
            INSERT INTO daily_traffic_snapshots (domain_id, snapshot_date, impressions, clicks, ctr, avg_position)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(domain_id, snapshot_date) DO UPDATE SET
                impressions = excluded.impressions,
                clicks = excluded.clicks,
                ctr = excluded.ctr,
                avg_position = excluded.avg_position
            "#,
        )
        .bind(domain_id)
        .bind(today)
        .bind(impressions)
        .bind(clicks)
        .bind(avg_ctr)
        .bind(avg_position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

struct GscSyncTask(Arc<SchedulerBridge>);
struct DailyFullScanTask(Arc<SchedulerBridge>);
struct DailyAiAnalysisTask(Arc<SchedulerBridge>);
struct VectorEmbeddingUpdateTask(Arc<SchedulerBridge>);
struct EvaluateFixEffectivenessTask(Arc<SchedulerBridge>);
struct DailySnapshotTask(Arc<SchedulerBridge>);

impl ScheduledTask for GscSyncTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.0.run_gsc_sync().await })
    }
}

impl ScheduledTask for DailyFullScanTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.0.run_daily_full_scan().await })
    }
}

impl ScheduledTask for DailyAiAnalysisTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.0.run_daily_ai_analysis().await })
    }
}

impl ScheduledTask for VectorEmbeddingUpdateTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.0.run_vector_embedding_update().await })
    }
}

impl ScheduledTask for EvaluateFixEffectivenessTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.0.run_evaluate_fix_effectiveness().await })
    }
}

impl ScheduledTask for DailySnapshotTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.0.run_daily_snapshot().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_exprs_in_default_config_all_parse() {
        let config = SchedulerConfig::default();
        for expr in [
            &config.gsc_sync_morning,
            &config.gsc_sync_evening,
            &config.daily_full_scan,
            &config.daily_ai_analysis,
            &config.vector_embedding_update,
            &config.evaluate_fix_effectiveness,
            &config.daily_snapshot,
        ] {
            assert!(ScheduledExecutor::new_cron("test", expr).is_ok(), "{} failed to parse", expr);
        }
    }
}
