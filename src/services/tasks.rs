//! Task tracker: backs the `GET /tasks/{id}` contract (§6) for the
//! long-running jobs the Refresh Orchestrator, Deployment Pipeline and
//! Effectiveness Tracker kick off from an HTTP request. A task row is the
//! channel: progress callbacks write best-effort updates to it, fire-and-forget,
//! the same way the Vector Store treats its own sync as a side channel whose
//! failures are logged and swallowed rather than propagated.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Task, TaskType};
use crate::services::refresh_orchestrator::ProgressCallback;

#[derive(Clone)]
pub struct TaskTracker {
    pool: SqlitePool,
}

impl TaskTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task_type: TaskType, domain_id: Option<i64>) -> Result<Task, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        sqlx::query_as(
            r#"
            INSERT INTO tasks (id, domain_id, task_type, status, current_step, total_steps)
            VALUES (?, ?, ?, 'pending', 0, 100)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(domain_id)
        .bind(task_type.as_str())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM tasks WHERE id = ?").bind(task_id).fetch_optional(&self.pool).await
    }

    pub async fn mark_running(&self, task_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET status = 'running', updated_at = datetime('now') WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, task_id: &str, result: Option<String>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks SET status = 'completed', current_step = total_steps, result = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(result)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, task_id: &str, message: String) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET status = 'failed', message = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(message)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append_failures(&self, task_id: &str, failures: &[String]) -> Result<(), sqlx::Error> {
        if failures.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(failures).unwrap_or_default();
        sqlx::query("UPDATE tasks SET failures = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(json)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// A `ProgressCallback` that fires a best-effort, non-blocking DB update
    /// per call — callers never wait on it, matching §7's policy that
    /// progress/side-channel writes are logged-and-swallowed, not propagated.
    pub fn progress_callback(&self, task_id: String) -> ProgressCallback {
        let pool = self.pool.clone();
        std::sync::Arc::new(move |current: u32, total: u32, message: &str| {
            let pool = pool.clone();
            let task_id = task_id.clone();
            let message = message.to_string();
            tokio::spawn(async move {
                let result = sqlx::query(
                    "UPDATE tasks SET current_step = ?, total_steps = ?, message = ?, status = 'running', updated_at = datetime('now') WHERE id = ?",
                )
                .bind(current as i64)
                .bind(total as i64)
                .bind(message)
                .bind(task_id)
                .execute(&pool)
                .await;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "task progress update failed");
                }
            });
        })
    }
}
