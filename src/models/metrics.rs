use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, Default)]
pub struct SeoMetricsSnapshot {
    pub id: i64,
    pub page_id: i64,
    pub taken_at: DateTime<Utc>,
    pub lighthouse_seo: Option<f64>,
    pub lighthouse_performance: Option<f64>,
    pub lighthouse_accessibility: Option<f64>,
    pub lighthouse_best_practices: Option<f64>,
    pub lighthouse_pwa: Option<f64>,
    pub lcp: Option<f64>,
    pub fid: Option<f64>,
    pub cls: Option<f64>,
    pub fcp: Option<f64>,
    pub tti: Option<f64>,
    pub tbt: Option<f64>,
    pub gsc_impressions: Option<i64>,
    pub gsc_clicks: Option<i64>,
    pub gsc_ctr: Option<f64>,
    pub gsc_avg_position: Option<f64>,
    /// JSON-encoded list of `{query, impressions, clicks}`.
    pub gsc_top_queries: Option<String>,
    pub is_indexed: Option<bool>,
    pub index_verdict: Option<String>,
    pub index_coverage_state: Option<String>,
    pub mobile_friendly: Option<bool>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct DailyTrafficSnapshot {
    pub id: i64,
    pub domain_id: i64,
    pub snapshot_date: chrono::NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub avg_position: f64,
}

/// Lighthouse/PageSpeed category scores, 0-100 (score*100 rounded), per §6.
#[derive(Debug, Clone, Default)]
pub struct LighthouseScores {
    pub seo: Option<f64>,
    pub performance: Option<f64>,
    pub accessibility: Option<f64>,
    pub best_practices: Option<f64>,
    pub pwa: Option<f64>,
}

/// Core Web Vitals, numeric values preferred over display strings (§6).
#[derive(Debug, Clone, Default)]
pub struct CoreWebVitals {
    pub lcp: Option<f64>,
    pub fid: Option<f64>,
    pub cls: Option<f64>,
    pub fcp: Option<f64>,
    pub tti: Option<f64>,
    pub tbt: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GscQuery {
    pub query: String,
    pub impressions: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub is_indexed: bool,
    pub verdict: String,
    pub coverage_state: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchAnalytics {
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub avg_position: f64,
    pub top_queries: Vec<GscQuery>,
}
