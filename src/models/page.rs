use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Page {
    pub id: i64,
    pub domain_id: i64,
    pub url: String,
    pub path: String,
    pub depth_level: i64,
    pub parent_id: Option<i64>,
    pub is_subdomain: bool,
    pub subdomain_label: Option<String>,
    pub is_active: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_manually_edited: bool,
    pub use_manual_position: bool,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A discovered URL, pre-persistence (§4.2 output).
#[derive(Debug, Clone)]
pub struct DiscoveredUrl {
    pub url: String,
    pub path: String,
    pub is_subdomain: bool,
    pub subdomain_label: Option<String>,
    pub initial_depth_estimate: i64,
}

impl DiscoveredUrl {
    /// Depth is the count of non-empty path segments (§4.2).
    pub fn depth_from_path(path: &str) -> i64 {
        path.split('/').filter(|s| !s.is_empty()).count() as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePageFieldsRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}
