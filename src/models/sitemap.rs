use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFreq {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFreq {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "always" => Self::Always,
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            "never" => Self::Never,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SitemapEntryStatus {
    Active,
    PendingAdd,
    PendingModify,
    PendingRemove,
}

impl SitemapEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingAdd => "pending-add",
            Self::PendingModify => "pending-modify",
            Self::PendingRemove => "pending-remove",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending-add" => Self::PendingAdd,
            "pending-modify" => Self::PendingModify,
            "pending-remove" => Self::PendingRemove,
            _ => Self::Active,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct SitemapEntry {
    pub id: i64,
    pub domain_id: i64,
    pub location_url: String,
    pub location_hash: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
    pub status: String,
    /// JSON list of validation error strings, if any were found (§6).
    pub validation_errors: Option<String>,
    pub http_status: Option<i64>,
    pub page_id: Option<i64>,
    pub ai_suggested: bool,
    pub created_at: DateTime<Utc>,
}

impl SitemapEntry {
    pub fn status(&self) -> SitemapEntryStatus {
        SitemapEntryStatus::from_str(&self.status)
    }
}

/// A single `<url>` entry awaiting write into the generated sitemap document (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapUrlEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
}

/// Upper bounds enforced by the sitemap generator (§6: 50,000 URLs / 50MB uncompressed).
pub const SITEMAP_MAX_URLS: usize = 50_000;
pub const SITEMAP_MAX_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SitemapOperation {
    Add,
    Remove,
    Modify,
}

impl SitemapOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Modify => "modify",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "remove" => Self::Remove,
            "modify" => Self::Modify,
            _ => Self::Add,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct EditSessionOperation {
    pub id: i64,
    pub session_id: i64,
    pub operation: String,
    pub location_url: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SitemapEditRequest {
    pub operation: SitemapOperation,
    pub location_url: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
}
