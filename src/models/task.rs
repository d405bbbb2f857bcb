use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Background job kinds backing the `GET /tasks/{id}` contract (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Refresh,
    AiAnalysis,
    Deployment,
    EffectivenessSync,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::AiAnalysis => "ai_analysis",
            Self::Deployment => "deployment",
            Self::EffectivenessSync => "effectiveness_sync",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Task {
    pub id: String,
    pub domain_id: Option<i64>,
    pub task_type: String,
    pub status: String,
    pub current_step: i64,
    pub total_steps: i64,
    pub message: Option<String>,
    pub result: Option<String>,
    /// JSON list of non-fatal failures accumulated during the run (§7 propagation policy).
    pub failures: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_str(&self.status)
    }

    pub fn progress_pct(&self) -> f64 {
        if self.total_steps <= 0 {
            0.0
        } else {
            (self.current_step as f64 / self.total_steps as f64 * 100.0).clamp(0.0, 100.0)
        }
    }
}

/// Typed progress state for a job (§4.12: `current`, `total`, `percent`, `status`).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: String,
    pub domain_id: Option<i64>,
    pub task_type: String,
    pub status: String,
    pub current_step: i64,
    pub total_steps: i64,
    pub percent: f64,
    pub message: Option<String>,
    pub result: Option<String>,
    pub failures: Option<String>,
}

impl From<&Task> for TaskResponse {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.clone(),
            domain_id: t.domain_id,
            task_type: t.task_type.clone(),
            status: t.status.clone(),
            current_step: t.current_step,
            total_steps: t.total_steps,
            percent: t.progress_pct(),
            message: t.message.clone(),
            result: t.result.clone(),
            failures: t.failures.clone(),
        }
    }
}
