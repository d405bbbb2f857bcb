//! Database operations backing the LLM service: provider CRUD, the
//! domain-scoped response cache (`ai_analysis_cache`), and per-provider usage
//! stats (`llm_usage_stats`). Grounded on the teacher's `LLMRepository`, with
//! the debug-replay session/request/result tables collapsed away — this
//! schema caches by `(domain_id, analysis_type, context_hash)` instead of a
//! single global `cache_key`, and the analysis session itself isn't persisted.

use chrono::Utc;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Arguments, SqlitePool};

use crate::models::{
    AiAnalysisCache, CreateProviderRequest, LlmError, LlmProvider, LlmUsageStats,
    UpdateProviderRequest,
};

pub struct LlmRepository {
    pool: SqlitePool,
}

impl LlmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_active_provider(&self) -> Result<Option<LlmProvider>, LlmError> {
        sqlx::query_as::<_, LlmProvider>("SELECT * FROM llm_providers WHERE is_active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(LlmError::from)
    }

    pub async fn list_providers(&self) -> Result<Vec<LlmProvider>, LlmError> {
        sqlx::query_as::<_, LlmProvider>("SELECT * FROM llm_providers ORDER BY priority ASC, name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(LlmError::from)
    }

    pub async fn get_provider(&self, id: i64) -> Result<Option<LlmProvider>, LlmError> {
        sqlx::query_as::<_, LlmProvider>("SELECT * FROM llm_providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(LlmError::from)
    }

    pub async fn create_provider(&self, req: CreateProviderRequest) -> Result<LlmProvider, LlmError> {
        let result = sqlx::query(
            r#"INSERT INTO llm_providers
               (name, provider_kind, base_url, api_key, model, embedding_model, priority, is_active)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0)"#,
        )
        .bind(&req.name)
        .bind(&req.provider_kind)
        .bind(&req.base_url)
        .bind(&req.api_key)
        .bind(&req.model)
        .bind(&req.embedding_model)
        .bind(req.priority)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_provider(id).await?.ok_or(LlmError::ProviderNotFound(id))
    }

    pub async fn update_provider(&self, id: i64, req: UpdateProviderRequest) -> Result<LlmProvider, LlmError> {
        let mut sql = String::from("UPDATE llm_providers SET updated_at = datetime('now')");
        let mut args = SqliteArguments::default();

        if let Some(v) = &req.name {
            sql.push_str(", name = ?");
            args.add(v);
        }
        if let Some(v) = &req.base_url {
            sql.push_str(", base_url = ?");
            args.add(v);
        }
        if let Some(v) = &req.api_key {
            sql.push_str(", api_key = ?");
            args.add(v);
        }
        if let Some(v) = &req.model {
            sql.push_str(", model = ?");
            args.add(v);
        }
        if let Some(v) = &req.embedding_model {
            sql.push_str(", embedding_model = ?");
            args.add(v);
        }
        if let Some(v) = req.is_active {
            sql.push_str(", is_active = ?");
            args.add(v);
        }
        if let Some(v) = req.priority {
            sql.push_str(", priority = ?");
            args.add(v);
        }

        sql.push_str(" WHERE id = ?");
        args.add(id);

        let result = sqlx::query_with(&sql, args).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(LlmError::ProviderNotFound(id));
        }

        self.get_provider(id).await?.ok_or(LlmError::ProviderNotFound(id))
    }

    pub async fn delete_provider(&self, id: i64) -> Result<(), LlmError> {
        let provider = self.get_provider(id).await?.ok_or(LlmError::ProviderNotFound(id))?;
        if provider.is_active {
            return Err(LlmError::ApiError("cannot delete the active provider, deactivate it first".to_string()));
        }

        sqlx::query("DELETE FROM llm_usage_stats WHERE provider_id = ?").bind(id).execute(&self.pool).await?;

        let result = sqlx::query("DELETE FROM llm_providers WHERE id = ?").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(LlmError::ProviderNotFound(id));
        }
        Ok(())
    }

    /// Activating one provider deactivates every other one — at most one
    /// active provider at a time, matching the teacher's `activate_provider`.
    pub async fn activate_provider(&self, id: i64) -> Result<(), LlmError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE llm_providers SET is_active = 0").execute(&mut *tx).await?;

        let result = sqlx::query("UPDATE llm_providers SET is_active = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LlmError::ProviderNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn deactivate_provider(&self, id: i64) -> Result<(), LlmError> {
        let result = sqlx::query("UPDATE llm_providers SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LlmError::ProviderNotFound(id));
        }
        Ok(())
    }

    /// Returns a live (non-expired) cached result and bumps its hit counter.
    pub async fn get_cached(
        &self,
        domain_id: i64,
        analysis_type: &str,
        context_hash: &str,
    ) -> Result<Option<AiAnalysisCache>, LlmError> {
        let row = sqlx::query_as::<_, AiAnalysisCache>(
            r#"SELECT * FROM ai_analysis_cache
               WHERE domain_id = ? AND analysis_type = ? AND context_hash = ?
                 AND expires_at > datetime('now')"#,
        )
        .bind(domain_id)
        .bind(analysis_type)
        .bind(context_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = &row {
            sqlx::query("UPDATE ai_analysis_cache SET hit_count = hit_count + 1 WHERE id = ?")
                .bind(row.id)
                .execute(&self.pool)
                .await?;
        }

        Ok(row)
    }

    pub async fn put_cached(
        &self,
        domain_id: i64,
        analysis_type: &str,
        context_hash: &str,
        result_json: &str,
        ttl_hours: i64,
    ) -> Result<(), LlmError> {
        sqlx::query(
            r#"INSERT INTO ai_analysis_cache (domain_id, analysis_type, context_hash, result, expires_at)
               VALUES (?, ?, ?, ?, datetime('now', '+' || ? || ' hours'))
               ON CONFLICT(domain_id, analysis_type, context_hash) DO UPDATE SET
                 result = excluded.result,
                 expires_at = excluded.expires_at,
                 hit_count = 0,
                 created_at = datetime('now')"#,
        )
        .bind(domain_id)
        .bind(analysis_type)
        .bind(context_hash)
        .bind(result_json)
        .bind(ttl_hours)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_usage(
        &self,
        provider_id: i64,
        input_tokens: i64,
        output_tokens: i64,
        success: bool,
    ) -> Result<(), LlmError> {
        let today = Utc::now().date_naive();

        sqlx::query(
            r#"INSERT INTO llm_usage_stats
               (provider_id, usage_date, request_count, input_tokens, output_tokens, failure_count)
               VALUES (?, ?, 1, ?, ?, ?)
               ON CONFLICT(provider_id, usage_date) DO UPDATE SET
                 request_count = request_count + 1,
                 input_tokens = input_tokens + excluded.input_tokens,
                 output_tokens = output_tokens + excluded.output_tokens,
                 failure_count = failure_count + excluded.failure_count"#,
        )
        .bind(provider_id)
        .bind(today)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(if success { 0 } else { 1 })
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_usage_stats(&self, provider_id: i64) -> Result<Vec<LlmUsageStats>, LlmError> {
        sqlx::query_as::<_, LlmUsageStats>(
            "SELECT * FROM llm_usage_stats WHERE provider_id = ? ORDER BY usage_date DESC",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(LlmError::from)
    }
}
