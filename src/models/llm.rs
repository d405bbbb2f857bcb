use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// LLM provider configuration from the database.
#[derive(Debug, Clone, FromRow)]
pub struct LlmProvider {
    pub id: i64,
    pub name: String,
    pub provider_kind: String,
    pub base_url: String,
    #[allow(dead_code)]
    pub api_key: String,
    pub model: String,
    pub embedding_model: Option<String>,
    pub is_active: bool,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider info safe for external display; the API key is masked, never echoed back.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LlmProviderInfo {
    pub id: i64,
    pub name: String,
    pub provider_kind: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: Option<String>,
    pub api_key_masked: String,
    pub is_active: bool,
    pub priority: i64,
}

impl From<&LlmProvider> for LlmProviderInfo {
    fn from(p: &LlmProvider) -> Self {
        let api_key_masked = if p.api_key.len() > 8 {
            format!("{}...{}", &p.api_key[..4], &p.api_key[p.api_key.len() - 4..])
        } else {
            "****".to_string()
        };

        Self {
            id: p.id,
            name: p.name.clone(),
            provider_kind: p.provider_kind.clone(),
            base_url: p.base_url.clone(),
            model: p.model.clone(),
            embedding_model: p.embedding_model.clone(),
            api_key_masked,
            is_active: p.is_active,
            priority: p.priority,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProviderRequest {
    pub name: String,
    pub provider_kind: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize, Default, ToSchema)]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub embedding_model: Option<String>,
    pub is_active: Option<bool>,
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct LlmUsageStats {
    pub id: i64,
    pub provider_id: i64,
    pub usage_date: chrono::NaiveDate,
    pub request_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub failure_count: i64,
}

/// Result of `LlmService::test_connection`, always `Ok` at the handler level —
/// connection failure is reported in the body, not via an HTTP error status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub latency_ms: i64,
}

/// LLM scenarios, each with its own prompt template and response schema (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmScenario {
    DomainAnalysis,
    IssueFixGeneration,
    SuggestionGeneration,
    EffectivenessClassification,
}

impl LlmScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DomainAnalysis => "domain_analysis",
            Self::IssueFixGeneration => "issue_fix_generation",
            Self::SuggestionGeneration => "suggestion_generation",
            Self::EffectivenessClassification => "effectiveness_classification",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no active LLM provider configured")]
    NoProviderConfigured,

    #[error("provider not found: {0}")]
    ProviderNotFound(i64),

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parsing error: {0}")]
    ParseError(String),

    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LLM service disabled")]
    Disabled,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::ApiError(_))
    }
}
