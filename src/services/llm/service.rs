//! The `LlmService` trait and its default implementation: one `analyze()`
//! call site shared by every scenario in §4.8-§4.9, wrapping a
//! cache-check / call-API / persist pipeline around `LlmClient`.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;

use crate::models::{
    CreateProviderRequest, LlmError, LlmProvider, LlmProviderInfo, LlmScenario, LlmUsageStats,
    TestConnectionResponse, UpdateProviderRequest,
};

use super::client::LlmClient;
use super::repository::LlmRepository;

/// Implemented once per prompt shape (full-domain analysis, issue-fix
/// generation, suggestion generation, effectiveness classification).
pub trait LlmAnalysisRequestTrait: Serialize + Send + Sync {
    fn scenario(&self) -> LlmScenario;
    fn system_prompt(&self) -> String;
    fn domain_id(&self) -> i64;
    /// Stable hash of whatever context went into the prompt, so an unchanged
    /// domain state reuses a cached result instead of re-calling the LLM.
    fn context_hash(&self) -> String;
}

pub trait LlmAnalysisResponseTrait: DeserializeOwned + Serialize + Send + Sync {
    fn summary(&self) -> &str;
    fn confidence(&self) -> Option<f64>;
}

#[derive(Debug, Clone)]
pub struct LlmAnalysisResult<T> {
    pub response: T,
    pub from_cache: bool,
}

#[async_trait]
pub trait LlmService: Send + Sync {
    fn is_available(&self) -> bool;

    async fn analyze<Req, Resp>(
        &self,
        request: &Req,
        force_refresh: bool,
    ) -> Result<LlmAnalysisResult<Resp>, LlmError>
    where
        Req: LlmAnalysisRequestTrait,
        Resp: LlmAnalysisResponseTrait;

    async fn list_providers(&self) -> Result<Vec<LlmProviderInfo>, LlmError>;
    async fn get_provider(&self, id: i64) -> Result<Option<LlmProviderInfo>, LlmError>;
    async fn get_active_provider(&self) -> Result<Option<LlmProviderInfo>, LlmError>;
    async fn create_provider(&self, req: CreateProviderRequest) -> Result<LlmProvider, LlmError>;
    async fn update_provider(&self, id: i64, req: UpdateProviderRequest) -> Result<LlmProvider, LlmError>;
    async fn delete_provider(&self, id: i64) -> Result<(), LlmError>;
    async fn activate_provider(&self, id: i64) -> Result<(), LlmError>;
    async fn deactivate_provider(&self, id: i64) -> Result<(), LlmError>;
    async fn test_connection(&self, id: i64) -> Result<TestConnectionResponse, LlmError>;
    async fn get_usage_stats(&self, provider_id: i64) -> Result<Vec<LlmUsageStats>, LlmError>;
}

pub struct LlmServiceImpl {
    repository: LlmRepository,
    client: LlmClient,
    enabled: bool,
    cache_ttl_hours: i64,
}

impl LlmServiceImpl {
    pub fn new(pool: SqlitePool, enabled: bool, timeout_secs: u64, cache_ttl_hours: i64) -> Self {
        Self {
            repository: LlmRepository::new(pool),
            client: LlmClient::new(timeout_secs),
            enabled,
            cache_ttl_hours,
        }
    }
}

#[async_trait]
impl LlmService for LlmServiceImpl {
    fn is_available(&self) -> bool {
        self.enabled
    }

    async fn analyze<Req, Resp>(
        &self,
        request: &Req,
        force_refresh: bool,
    ) -> Result<LlmAnalysisResult<Resp>, LlmError>
    where
        Req: LlmAnalysisRequestTrait,
        Resp: LlmAnalysisResponseTrait,
    {
        if !self.enabled {
            return Err(LlmError::Disabled);
        }

        let provider = self.repository.get_active_provider().await?.ok_or(LlmError::NoProviderConfigured)?;

        let domain_id = request.domain_id();
        let scenario = request.scenario();
        let context_hash = request.context_hash();

        if !force_refresh {
            if let Some(cached) = self.repository.get_cached(domain_id, scenario.as_str(), &context_hash).await? {
                tracing::debug!(domain_id, scenario = scenario.as_str(), "LLM cache hit");
                let response: Resp = serde_json::from_str(&cached.result)?;
                return Ok(LlmAnalysisResult { response, from_cache: true });
            }
        }
        tracing::debug!(domain_id, scenario = scenario.as_str(), force_refresh, "LLM cache miss, calling API");

        let result = self.client.chat_completion::<Req, Resp>(&provider, request).await;

        match result {
            Ok((response, input_tokens, output_tokens)) => {
                self.repository
                    .record_usage(provider.id, input_tokens as i64, output_tokens as i64, true)
                    .await?;

                let response_json = serde_json::to_string(&response)?;
                self.repository
                    .put_cached(domain_id, scenario.as_str(), &context_hash, &response_json, self.cache_ttl_hours)
                    .await?;

                Ok(LlmAnalysisResult { response, from_cache: false })
            },
            Err(e) => {
                self.repository.record_usage(provider.id, 0, 0, false).await?;
                Err(e)
            },
        }
    }

    async fn list_providers(&self) -> Result<Vec<LlmProviderInfo>, LlmError> {
        let providers = self.repository.list_providers().await?;
        Ok(providers.iter().map(LlmProviderInfo::from).collect())
    }

    async fn get_provider(&self, id: i64) -> Result<Option<LlmProviderInfo>, LlmError> {
        Ok(self.repository.get_provider(id).await?.as_ref().map(LlmProviderInfo::from))
    }

    async fn get_active_provider(&self) -> Result<Option<LlmProviderInfo>, LlmError> {
        Ok(self.repository.get_active_provider().await?.as_ref().map(LlmProviderInfo::from))
    }

    async fn create_provider(&self, req: CreateProviderRequest) -> Result<LlmProvider, LlmError> {
        self.repository.create_provider(req).await
    }

    async fn update_provider(&self, id: i64, req: UpdateProviderRequest) -> Result<LlmProvider, LlmError> {
        self.repository.update_provider(id, req).await
    }

    async fn delete_provider(&self, id: i64) -> Result<(), LlmError> {
        self.repository.delete_provider(id).await
    }

    async fn activate_provider(&self, id: i64) -> Result<(), LlmError> {
        self.repository.activate_provider(id).await
    }

    async fn deactivate_provider(&self, id: i64) -> Result<(), LlmError> {
        self.repository.deactivate_provider(id).await
    }

    async fn test_connection(&self, id: i64) -> Result<TestConnectionResponse, LlmError> {
        let provider = self.repository.get_provider(id).await?.ok_or(LlmError::ProviderNotFound(id))?;

        let start = std::time::Instant::now();
        let outcome = self.client.test_connection(&provider).await;
        let latency_ms = start.elapsed().as_millis() as i64;

        Ok(match outcome {
            Ok(()) => {
                TestConnectionResponse { success: true, message: "connection successful".to_string(), latency_ms }
            },
            Err(e) => TestConnectionResponse {
                success: false,
                message: format!("connection failed: {e}"),
                latency_ms,
            },
        })
    }

    async fn get_usage_stats(&self, provider_id: i64) -> Result<Vec<LlmUsageStats>, LlmError> {
        self.repository.get_usage_stats(provider_id).await
    }
}
