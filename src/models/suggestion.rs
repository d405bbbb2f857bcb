use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Closed taxonomy of suggestion kinds produced by the AI Analysis Engine (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    ContentGap,
    InternalLinking,
    KeywordOpportunity,
    TechnicalImprovement,
    StructuredData,
    SitemapChange,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentGap => "content_gap",
            Self::InternalLinking => "internal_linking",
            Self::KeywordOpportunity => "keyword_opportunity",
            Self::TechnicalImprovement => "technical_improvement",
            Self::StructuredData => "structured_data",
            Self::SitemapChange => "sitemap_change",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "content_gap" => Self::ContentGap,
            "internal_linking" => Self::InternalLinking,
            "keyword_opportunity" => Self::KeywordOpportunity,
            "technical_improvement" => Self::TechnicalImprovement,
            "structured_data" => Self::StructuredData,
            "sitemap_change" => Self::SitemapChange,
            _ => return None,
        })
    }
}

/// Lifecycle state machine driven by the Effectiveness Tracker (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Applied,
    Tracking,
    Tracked,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Tracking => "tracking",
            Self::Tracked => "tracked",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "applied" => Self::Applied,
            "tracking" => Self::Tracking,
            "tracked" => Self::Tracked,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    /// Legal next states per the lifecycle (§4.11). `Rejected` is reachable
    /// from `Pending` only; once tracking starts the suggestion runs to
    /// completion.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Applied)
                | (Self::Pending, Self::Rejected)
                | (Self::Applied, Self::Tracking)
                | (Self::Tracking, Self::Tracked)
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct AiSuggestion {
    pub id: i64,
    pub domain_id: i64,
    pub page_id: Option<i64>,
    pub suggestion_type: String,
    pub priority: i64,
    pub title: String,
    pub description: String,
    pub expected_impact: Option<String>,
    /// JSON payload describing the concrete, machine-applicable action.
    pub action_data: Option<String>,
    pub is_auto_applicable: bool,
    pub status: String,
    pub baseline_metrics: Option<String>,
    pub final_metrics: Option<String>,
    pub impact_analysis: Option<String>,
    pub effectiveness_score: Option<f64>,
    pub tracking_started_at: Option<DateTime<Utc>>,
    pub tracking_ends_at: Option<DateTime<Utc>>,
    pub tracking_days: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiSuggestion {
    pub fn suggestion_type(&self) -> Option<SuggestionType> {
        SuggestionType::from_str(&self.suggestion_type)
    }

    pub fn status(&self) -> SuggestionStatus {
        SuggestionStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplySuggestionRequest {
    pub tracking_days: Option<i64>,
}
