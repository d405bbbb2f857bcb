use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Closed taxonomy of detectable issues (§4.5). `as_str`/`from_str` round-trip
/// through the `seo_issues.issue_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    TitleMissing,
    TitleTooShort,
    TitleTooLong,
    MetaDescriptionMissing,
    MetaDescriptionTooShort,
    MetaDescriptionTooLong,
    H1Missing,
    H1Multiple,
    ImagesWithoutAlt,
    OpenGraphIncomplete,
    LowInternalLinkCount,
    ThinContent,
    SlowLcp,
    HighCls,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TitleMissing => "title_missing",
            Self::TitleTooShort => "title_too_short",
            Self::TitleTooLong => "title_too_long",
            Self::MetaDescriptionMissing => "meta_description_missing",
            Self::MetaDescriptionTooShort => "meta_description_too_short",
            Self::MetaDescriptionTooLong => "meta_description_too_long",
            Self::H1Missing => "h1_missing",
            Self::H1Multiple => "h1_multiple",
            Self::ImagesWithoutAlt => "images_without_alt",
            Self::OpenGraphIncomplete => "open_graph_incomplete",
            Self::LowInternalLinkCount => "low_internal_link_count",
            Self::ThinContent => "thin_content",
            Self::SlowLcp => "slow_lcp",
            Self::HighCls => "high_cls",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "title_missing" => Self::TitleMissing,
            "title_too_short" => Self::TitleTooShort,
            "title_too_long" => Self::TitleTooLong,
            "meta_description_missing" => Self::MetaDescriptionMissing,
            "meta_description_too_short" => Self::MetaDescriptionTooShort,
            "meta_description_too_long" => Self::MetaDescriptionTooLong,
            "h1_missing" => Self::H1Missing,
            "h1_multiple" => Self::H1Multiple,
            "images_without_alt" => Self::ImagesWithoutAlt,
            "open_graph_incomplete" => Self::OpenGraphIncomplete,
            "low_internal_link_count" => Self::LowInternalLinkCount,
            "thin_content" => Self::ThinContent,
            "slow_lcp" => Self::SlowLcp,
            "high_cls" => Self::HighCls,
            _ => return None,
        })
    }

    /// Whether the AI Fixer (C9) has a generator registered for this type.
    /// LCP/CLS are page-performance issues with no metadata-patch fix.
    pub fn is_auto_fixable(&self) -> bool {
        !matches!(self, Self::SlowLcp | Self::HighCls)
    }

    pub fn default_severity(&self) -> IssueSeverity {
        match self {
            Self::TitleMissing | Self::H1Missing | Self::MetaDescriptionMissing => {
                IssueSeverity::Critical
            }
            Self::SlowLcp | Self::HighCls | Self::ThinContent => IssueSeverity::Critical,
            Self::TitleTooLong
            | Self::TitleTooShort
            | Self::MetaDescriptionTooShort
            | Self::MetaDescriptionTooLong
            | Self::H1Multiple => IssueSeverity::Warning,
            Self::ImagesWithoutAlt | Self::OpenGraphIncomplete | Self::LowInternalLinkCount => {
                IssueSeverity::Info
            }
        }
    }
}

/// Per §4.5: critical/warning/info, each carrying a health-score penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "critical" => Self::Critical,
            "warning" => Self::Warning,
            _ => Self::Info,
        }
    }

    /// Health-score penalty (§4.5).
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Info => 3.0,
            Self::Warning => 7.0,
            Self::Critical => 15.0,
        }
    }

    /// Minutes of estimated manual fix time (§4.5).
    pub fn estimated_fix_minutes(&self) -> f64 {
        match self {
            Self::Info => 5.0,
            Self::Warning => 10.0,
            Self::Critical => 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Applied,
    AutoFixed,
    Deployed,
    Verified,
    NeedsAttention,
    NotDeployed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Applied => "applied",
            Self::AutoFixed => "auto_fixed",
            Self::Deployed => "deployed",
            Self::Verified => "verified",
            Self::NeedsAttention => "needs_attention",
            Self::NotDeployed => "not_deployed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "applied" => Self::Applied,
            "auto_fixed" => Self::AutoFixed,
            "deployed" => Self::Deployed,
            "verified" => Self::Verified,
            "needs_attention" => Self::NeedsAttention,
            "not_deployed" => Self::NotDeployed,
            _ => Self::Open,
        }
    }

}

/// Outcome of re-checking a deployed issue after deployment (§4.5, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    NeedsAttention,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::NeedsAttention => "needs_attention",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "verified" => Self::Verified,
            "needs_attention" => Self::NeedsAttention,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SeoIssue {
    pub id: i64,
    pub page_id: i64,
    pub issue_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub current_value: Option<String>,
    pub suggested_value: Option<String>,
    pub auto_fixable: bool,
    pub status: String,
    pub verification_status: Option<String>,
    pub deployment_commit_hash: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub fixed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl SeoIssue {
    pub fn issue_type(&self) -> Option<IssueType> {
        IssueType::from_str(&self.issue_type)
    }

    pub fn severity(&self) -> IssueSeverity {
        IssueSeverity::from_str(&self.severity)
    }

    pub fn status(&self) -> IssueStatus {
        IssueStatus::from_str(&self.status)
    }

    pub fn verification_status(&self) -> Option<VerificationStatus> {
        self.verification_status.as_deref().and_then(VerificationStatus::from_str)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssueResponse {
    pub id: i64,
    pub page_id: i64,
    pub issue_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub current_value: Option<String>,
    pub suggested_value: Option<String>,
    pub auto_fixable: bool,
    pub status: String,
    pub verification_status: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl From<&SeoIssue> for IssueResponse {
    fn from(i: &SeoIssue) -> Self {
        Self {
            id: i.id,
            page_id: i.page_id,
            issue_type: i.issue_type.clone(),
            severity: i.severity.clone(),
            title: i.title.clone(),
            message: i.message.clone(),
            current_value: i.current_value.clone(),
            suggested_value: i.suggested_value.clone(),
            auto_fixable: i.auto_fixable,
            status: i.status.clone(),
            verification_status: i.verification_status().map(|v| v.as_str().to_string()),
            detected_at: i.detected_at,
        }
    }
}

/// A not-yet-persisted issue surfaced during a single page scan (§4.5).
#[derive(Debug, Clone)]
pub struct DetectedIssue {
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub title: String,
    pub message: String,
    pub current_value: Option<String>,
    pub suggested_value: Option<String>,
}
