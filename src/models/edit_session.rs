use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSessionStatus {
    Draft,
    Preview,
    Validating,
    Deploying,
    Deployed,
    Failed,
}

impl EditSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Preview => "preview",
            Self::Validating => "validating",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "preview" => Self::Preview,
            "validating" => Self::Validating,
            "deploying" => Self::Deploying,
            "deployed" => Self::Deployed,
            "failed" => Self::Failed,
            _ => Self::Draft,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EditSession {
    pub id: i64,
    pub domain_id: i64,
    pub status: String,
    pub added_count: i64,
    pub removed_count: i64,
    pub modified_count: i64,
    /// Rendered sitemap XML as it would be committed, shown to the caller before deploy.
    pub preview_document: Option<String>,
    pub deployment_commit_hash: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EditSession {
    pub fn status(&self) -> EditSessionStatus {
        EditSessionStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EditSessionResponse {
    pub id: i64,
    pub domain_id: i64,
    pub status: String,
    pub added_count: i64,
    pub removed_count: i64,
    pub modified_count: i64,
    pub deployment_commit_hash: Option<String>,
    pub error: Option<String>,
}

impl From<&EditSession> for EditSessionResponse {
    fn from(s: &EditSession) -> Self {
        Self {
            id: s.id,
            domain_id: s.domain_id,
            status: s.status.clone(),
            added_count: s.added_count,
            removed_count: s.removed_count,
            modified_count: s.modified_count,
            deployment_commit_hash: s.deployment_commit_hash.clone(),
            error: s.error.clone(),
        }
    }
}
