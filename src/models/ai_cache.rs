use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiAnalysisCache {
    pub id: i64,
    pub domain_id: i64,
    pub analysis_type: String,
    pub context_hash: String,
    /// JSON-encoded analysis output, returned verbatim on a cache hit.
    pub result: String,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
