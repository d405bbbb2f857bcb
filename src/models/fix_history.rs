use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Applied,
    Deployed,
    Verified,
    Superseded,
    Recurred,
}

impl FixStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Deployed => "deployed",
            Self::Verified => "verified",
            Self::Superseded => "superseded",
            Self::Recurred => "recurred",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "deployed" => Self::Deployed,
            "verified" => Self::Verified,
            "superseded" => Self::Superseded,
            "recurred" => Self::Recurred,
            _ => Self::Applied,
        }
    }
}

/// Classification assigned once post-deployment metrics are back (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effectiveness {
    Unknown,
    Effective,
    Partial,
    Ineffective,
    Negative,
}

impl Effectiveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Effective => "effective",
            Self::Partial => "partial",
            Self::Ineffective => "ineffective",
            Self::Negative => "negative",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "effective" => Self::Effective,
            "partial" => Self::Partial,
            "ineffective" => Self::Ineffective,
            "negative" => Self::Negative,
            _ => Self::Unknown,
        }
    }

    /// Suggestion-filter invariant (§4.8 step 7, property 7): these
    /// effectiveness values suppress re-proposing the same (page, type) fix
    /// within the 30-day window. `Ineffective`/`Negative` do not suppress.
    pub fn suppresses_resuggestion(&self) -> bool {
        matches!(self, Self::Unknown | Self::Effective | Self::Partial)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct AiFixHistory {
    pub id: i64,
    pub page_id: i64,
    pub issue_type: String,
    pub original_value: Option<String>,
    pub fixed_value: String,
    pub llm_explanation: Option<String>,
    pub llm_confidence: Option<f64>,
    pub model_id: Option<String>,
    /// JSON snapshot of the knowledge context used to produce this fix.
    pub context_snapshot: Option<String>,
    /// JSON snapshot of metrics at the moment the fix was applied.
    pub pre_fix_metrics: Option<String>,
    pub fix_status: String,
    pub effectiveness: String,
    pub issue_recurred: bool,
    pub recurrence_count: i64,
    pub applied_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl AiFixHistory {
    pub fn fix_status(&self) -> FixStatus {
        FixStatus::from_str(&self.fix_status)
    }

    pub fn effectiveness(&self) -> Effectiveness {
        Effectiveness::from_str(&self.effectiveness)
    }
}

/// Result of a single generator run inside the AI Fixer (§4.9), prior to
/// being recorded as an `AiFixHistory` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFix {
    pub fixed_value: String,
    pub explanation: String,
    pub confidence: f64,
}
