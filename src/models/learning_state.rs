use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningSyncStatus {
    Idle,
    Syncing,
    Failed,
}

impl LearningSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "syncing" => Self::Syncing,
            "failed" => Self::Failed,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiLearningState {
    pub domain_id: i64,
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    pub pages_synced: i64,
    pub embeddings_updated: i64,
    pub status: String,
    pub quality_score: Option<f64>,
    pub total_fixes: i64,
    pub effective_fixes: i64,
}

impl AiLearningState {
    pub fn status(&self) -> LearningSyncStatus {
        LearningSyncStatus::from_str(&self.status)
    }

    /// Share of applied fixes classified as effective, used as the
    /// quality signal surfaced to the Knowledge Builder (§4.7).
    pub fn effectiveness_ratio(&self) -> f64 {
        if self.total_fixes == 0 {
            0.0
        } else {
            self.effective_fixes as f64 / self.total_fixes as f64
        }
    }
}
