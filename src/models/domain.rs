use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    NotDeployed,
    Pending,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDeployed => "not_deployed",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::NotDeployed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Idle,
    Discovering,
    Persisting,
    Hierarchy,
    Collecting,
    Aggregating,
    Done,
    Failed,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Persisting => "persisting",
            Self::Hierarchy => "hierarchy",
            Self::Collecting => "collecting",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// A refresh is in flight: concurrent triggers for the same domain
    /// become no-ops per §4.12.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, Self::Idle | Self::Done | Self::Failed)
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "discovering" => Self::Discovering,
            "persisting" => Self::Persisting,
            "hierarchy" => Self::Hierarchy,
            "collecting" => Self::Collecting,
            "aggregating" => Self::Aggregating,
            "done" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Git deployment configuration embedded on the Domain row (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitConfig {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub target_path: Option<String>,
    pub credential: Option<String>,
    pub framework_hint: Option<String>,
}

impl GitConfig {
    pub fn is_configured(&self) -> bool {
        self.repo_url.is_some() && self.branch.is_some() && self.credential.is_some()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Domain {
    pub id: i64,
    pub hostname: String,
    pub scheme: String,
    pub owner_id: Option<String>,
    pub seo_score: Option<f64>,
    pub performance_score: Option<f64>,
    pub accessibility_score: Option<f64>,
    pub last_full_scan_at: Option<DateTime<Utc>>,
    pub last_gsc_scan_at: Option<DateTime<Utc>>,
    pub last_ai_analysis_at: Option<DateTime<Utc>>,
    pub git_repo_url: Option<String>,
    pub git_branch: Option<String>,
    pub git_target_path: Option<String>,
    pub git_credential: Option<String>,
    pub git_framework_hint: Option<String>,
    pub deployment_status: String,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub deployment_error: Option<String>,
    pub refresh_status: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    pub fn git_config(&self) -> GitConfig {
        GitConfig {
            repo_url: self.git_repo_url.clone(),
            branch: self.git_branch.clone(),
            target_path: self.git_target_path.clone(),
            credential: self.git_credential.clone(),
            framework_hint: self.git_framework_hint.clone(),
        }
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        RefreshStatus::from_str(&self.refresh_status)
    }

    pub fn deployment_status(&self) -> DeploymentStatus {
        DeploymentStatus::from_str(&self.deployment_status)
    }

    /// `www.` is treated as equal to the bare host for subdomain detection (§4.2).
    pub fn base_host(&self) -> &str {
        self.hostname.strip_prefix("www.").unwrap_or(&self.hostname)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainResponse {
    pub id: i64,
    pub hostname: String,
    pub scheme: String,
    pub seo_score: Option<f64>,
    pub performance_score: Option<f64>,
    pub accessibility_score: Option<f64>,
    pub last_full_scan_at: Option<DateTime<Utc>>,
    pub deployment_status: String,
    pub refresh_status: String,
    pub git_configured: bool,
    pub is_active: bool,
}

impl From<&Domain> for DomainResponse {
    fn from(d: &Domain) -> Self {
        Self {
            id: d.id,
            hostname: d.hostname.clone(),
            scheme: d.scheme.clone(),
            seo_score: d.seo_score,
            performance_score: d.performance_score,
            accessibility_score: d.accessibility_score,
            last_full_scan_at: d.last_full_scan_at,
            deployment_status: d.deployment_status().as_str().to_string(),
            refresh_status: d.refresh_status.clone(),
            git_configured: d.git_config().is_configured(),
            is_active: d.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateDomainRequest {
    pub hostname: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub owner_id: Option<String>,
}

fn default_scheme() -> String {
    "https".to_string()
}

#[derive(Debug, Clone, Deserialize, Default, ToSchema)]
pub struct UpdateGitConfigRequest {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub target_path: Option<String>,
    pub credential: Option<String>,
    pub framework_hint: Option<String>,
}
