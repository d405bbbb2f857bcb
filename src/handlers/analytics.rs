//! `GET /analytics/domain_overview?domain_id=&days=` (§6): health score,
//! indexing rate, aggregate CTR and the daily traffic trend.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;
use crate::models::{AiLearningState, DailyTrafficSnapshot, Domain};
use crate::utils::{ApiError, ApiResult};

const DEFAULT_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    domain_id: i64,
    days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DomainOverview {
    pub domain_id: i64,
    pub health_score: Option<f64>,
    pub performance_score: Option<f64>,
    pub indexing_rate: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub avg_position: f64,
    pub trend: Vec<DailyTrafficSnapshot>,
    pub learning_status: Option<String>,
    pub learning_quality_score: Option<f64>,
    pub learning_effectiveness_ratio: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/analytics/domain_overview",
    params(
        ("domain_id" = i64, Query, description = "domain to summarize"),
        ("days" = Option<i64>, Query, description = "trend window in days, default 30"),
    ),
    responses(
        (status = 200, description = "Domain analytics overview", body = DomainOverview),
        (status = 404, description = "Domain not found"),
    ),
    tag = "Analytics"
)]
pub async fn domain_overview(
    State(state): State<AppState>,
    Query(query): Query<OverviewQuery>,
) -> ApiResult<Json<DomainOverview>> {
    let days = query.days.unwrap_or(DEFAULT_DAYS).max(1);

    let domain: Domain = sqlx::query_as("SELECT * FROM domains WHERE id = ?")
        .bind(query.domain_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::DomainNotFound(query.domain_id.to_string()))?;

    let indexing_rate = indexing_rate(&state, query.domain_id).await?;

    let trend: Vec<DailyTrafficSnapshot> = sqlx::query_as(
        r#"
        SELECT * FROM daily_traffic_snapshots
        WHERE domain_id = ? AND snapshot_date >= date('now', ? || ' days')
        ORDER BY snapshot_date ASC
        "#,
    )
    .bind(query.domain_id)
    .bind(format!("-{days}"))
    .fetch_all(&state.db)
    .await?;

    let (impressions, clicks, avg_position) = aggregate_trend(&trend);
    let ctr = if impressions > 0 { clicks as f64 / impressions as f64 } else { 0.0 };

    let learning_state: Option<AiLearningState> = sqlx::query_as("SELECT * FROM ai_learning_state WHERE domain_id = ?")
        .bind(query.domain_id)
        .fetch_optional(&state.db)
        .await?;

    Ok(Json(DomainOverview {
        domain_id: query.domain_id,
        health_score: domain.seo_score,
        performance_score: domain.performance_score,
        indexing_rate,
        impressions,
        clicks,
        ctr,
        avg_position,
        trend,
        learning_status: learning_state.as_ref().map(|s| s.status().as_str().to_string()),
        learning_quality_score: learning_state.as_ref().and_then(|s| s.quality_score),
        learning_effectiveness_ratio: learning_state.as_ref().map(|s| s.effectiveness_ratio()),
    }))
}

async fn indexing_rate(state: &AppState, domain_id: i64) -> ApiResult<f64> {
    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN latest.is_indexed = 1 THEN 1 ELSE 0 END), 0)
        FROM pages p
        LEFT JOIN seo_metrics_snapshots latest ON latest.id = (
            SELECT id FROM seo_metrics_snapshots s WHERE s.page_id = p.id ORDER BY s.taken_at DESC LIMIT 1
        )
        WHERE p.domain_id = ? AND p.is_active = 1
        "#,
    )
    .bind(domain_id)
    .fetch_one(&state.db)
    .await?;

    let (total, indexed) = row;
    Ok(if total > 0 { indexed as f64 / total as f64 } else { 0.0 })
}

fn aggregate_trend(trend: &[DailyTrafficSnapshot]) -> (i64, i64, f64) {
    let impressions: i64 = trend.iter().map(|t| t.impressions).sum();
    let clicks: i64 = trend.iter().map(|t| t.clicks).sum();
    let avg_position = if trend.is_empty() {
        0.0
    } else {
        trend.iter().map(|t| t.avg_position).sum::<f64>() / trend.len() as f64
    };
    (impressions, clicks, avg_position)
}
