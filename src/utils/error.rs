//! Top-level API error type and envelope.
//!
//! Every handler returns `ApiResult<T> = Result<T, ApiError>`. `ApiError`
//! implements `IntoResponse` the same way the LLM provider handlers map
//! `LLMError` variants to status codes: one match arm per kind, producing a
//! `{error, code, message, details}` JSON body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("page not accessible (status {0})")]
    PageNotAccessible(u16),

    #[error("page analysis failed: {0}")]
    PageAnalysisError(String),

    #[error("{0} API quota exceeded")]
    ApiQuotaExceeded(String),

    #[error("{0} API connection error: {1}")]
    ApiConnectionError(String, String),

    #[error("{0} API returned status {1}")]
    ApiResponseError(String, u16),

    #[error("git deployment is not configured for this domain")]
    GitNotConfigured,

    #[error("git authentication failed: {0}")]
    GitAuthentication(String),

    #[error("git clone failed: {0}")]
    GitClone(String),

    #[error("git push failed: {0}")]
    GitPush(String),

    #[error("git deployment failed: {0}")]
    GitDeployment(String),

    #[error("issue is not auto-fixable: {0}")]
    IssueNotFixable(String),

    #[error("fix generation failed: {0}")]
    FixGeneration(String),

    #[error("sitemap generation failed: {0}")]
    SitemapGeneration(String),

    #[error("sitemap deployment failed: {0}")]
    SitemapDeployment(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("circular reference detected: {0}")]
    CircularReference(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn code(&self) -> &'static str {
        match self {
            Self::DomainNotFound(_) => "domain_not_found",
            Self::PageNotFound(_) => "page_not_found",
            Self::PageNotAccessible(_) => "page_not_accessible",
            Self::PageAnalysisError(_) => "page_analysis_error",
            Self::ApiQuotaExceeded(_) => "api_quota_exceeded",
            Self::ApiConnectionError(..) => "api_connection_error",
            Self::ApiResponseError(..) => "api_response_error",
            Self::GitNotConfigured => "git_not_configured",
            Self::GitAuthentication(_) => "git_authentication",
            Self::GitClone(_) => "git_clone",
            Self::GitPush(_) => "git_push",
            Self::GitDeployment(_) => "git_deployment",
            Self::IssueNotFixable(_) => "issue_not_fixable",
            Self::FixGeneration(_) => "fix_generation",
            Self::SitemapGeneration(_) => "sitemap_generation",
            Self::SitemapDeployment(_) => "sitemap_deployment",
            Self::InvalidUrl(_) => "invalid_url",
            Self::CircularReference(_) => "circular_reference",
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::TaskNotFound(_) => "task_not_found",
            Self::Database(_) => "database_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::DomainNotFound(_) | Self::PageNotFound(_) | Self::NotFound(_)
            | Self::TaskNotFound(_) => StatusCode::NOT_FOUND,
            Self::PageNotAccessible(_) => StatusCode::BAD_GATEWAY,
            Self::ApiQuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ApiConnectionError(..) | Self::ApiResponseError(..) => StatusCode::BAD_GATEWAY,
            Self::GitNotConfigured => StatusCode::PRECONDITION_FAILED,
            Self::GitAuthentication(_) => StatusCode::UNAUTHORIZED,
            Self::GitClone(_) | Self::GitPush(_) | Self::GitDeployment(_) => {
                StatusCode::BAD_GATEWAY
            },
            Self::IssueNotFixable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::FixGeneration(_) => StatusCode::BAD_GATEWAY,
            Self::SitemapGeneration(_) | Self::SitemapDeployment(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidUrl(_) | Self::Validation(_) | Self::CircularReference(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Self::PageAnalysisError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> Option<Value> {
        None
    }
}

impl From<crate::models::LlmError> for ApiError {
    fn from(e: crate::models::LlmError) -> Self {
        use crate::models::LlmError;
        match e {
            LlmError::NoProviderConfigured => Self::Internal("no active LLM provider configured".to_string()),
            LlmError::ProviderNotFound(id) => Self::NotFound(format!("LLM provider {id}")),
            LlmError::ApiError(msg) => Self::ApiConnectionError("llm".to_string(), msg),
            LlmError::ParseError(msg) => Self::PageAnalysisError(msg),
            LlmError::Timeout(secs) => Self::ApiConnectionError("llm".to_string(), format!("timeout after {secs}s")),
            LlmError::RateLimited(_) => Self::ApiQuotaExceeded("llm".to_string()),
            LlmError::Database(e) => Self::Database(e),
            LlmError::Serialization(e) => Self::Serialization(e),
            LlmError::Disabled => Self::Internal("LLM service disabled".to_string()),
        }
    }
}

impl From<crate::services::refresh_orchestrator::RefreshError> for ApiError {
    fn from(e: crate::services::refresh_orchestrator::RefreshError) -> Self {
        use crate::services::refresh_orchestrator::RefreshError;
        match e {
            RefreshError::DomainNotFound(id) => Self::DomainNotFound(id.to_string()),
            RefreshError::AlreadyInFlight(id) => Self::Conflict(format!("domain {id} refresh already in flight")),
            RefreshError::Cancelled => Self::Internal("refresh cancelled".to_string()),
            RefreshError::Database(e) => Self::Database(e),
        }
    }
}

impl From<crate::services::vector_store::VectorStoreError> for ApiError {
    fn from(e: crate::services::vector_store::VectorStoreError) -> Self {
        use crate::services::vector_store::VectorStoreError;
        match e {
            VectorStoreError::Qdrant(e) => Self::Internal(format!("vector store error: {e}")),
            VectorStoreError::Database(e) => Self::Database(e),
        }
    }
}

impl From<crate::services::ai_analysis::AiAnalysisError> for ApiError {
    fn from(e: crate::services::ai_analysis::AiAnalysisError) -> Self {
        use crate::services::ai_analysis::AiAnalysisError;
        match e {
            AiAnalysisError::Database(e) => Self::Database(e),
            AiAnalysisError::Llm(e) => e.into(),
            AiAnalysisError::VectorStore(e) => e.into(),
        }
    }
}

impl From<crate::services::ai_fixer::AiFixerError> for ApiError {
    fn from(e: crate::services::ai_fixer::AiFixerError) -> Self {
        use crate::services::ai_fixer::AiFixerError;
        match e {
            AiFixerError::Database(e) => Self::Database(e),
            AiFixerError::Llm(e) => e.into(),
            AiFixerError::PageNotFound(id) => Self::PageNotFound(id.to_string()),
            AiFixerError::IssueNotFound(id) => Self::NotFound(format!("issue {id}")),
            AiFixerError::SuggestionNotFound(id) => Self::NotFound(format!("suggestion {id}")),
            AiFixerError::NotApplicable(id) => Self::IssueNotFixable(format!("suggestion {id}")),
        }
    }
}

impl From<crate::services::deployment::DeploymentError> for ApiError {
    fn from(e: crate::services::deployment::DeploymentError) -> Self {
        use crate::services::deployment::DeploymentError;
        match e {
            DeploymentError::GitNotConfigured => Self::GitNotConfigured,
            DeploymentError::GitAuthentication(m) => Self::GitAuthentication(m),
            DeploymentError::GitClone(m) => Self::GitClone(m),
            DeploymentError::GitPush(m) => Self::GitPush(m),
            DeploymentError::ProjectDetection => Self::GitDeployment("no project handler matched".to_string()),
            DeploymentError::MetadataUpdate(m) => Self::GitDeployment(m),
            DeploymentError::FileNotFound(m) => Self::GitDeployment(format!("file not found: {m}")),
            DeploymentError::SitemapValidation(m) => Self::SitemapGeneration(m),
            DeploymentError::Database(e) => Self::Database(e),
        }
    }
}

impl From<crate::services::effectiveness_tracker::EffectivenessTrackerError> for ApiError {
    fn from(e: crate::services::effectiveness_tracker::EffectivenessTrackerError) -> Self {
        use crate::services::effectiveness_tracker::EffectivenessTrackerError;
        match e {
            EffectivenessTrackerError::Database(e) => Self::Database(e),
            EffectivenessTrackerError::Llm(e) => e.into(),
            EffectivenessTrackerError::SuggestionNotFound(id) => Self::NotFound(format!("suggestion {id}")),
            EffectivenessTrackerError::NotTrackable(id) => {
                Self::Conflict(format!("suggestion {id} cannot transition from its current state"))
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("api error: {}", self);
        } else {
            tracing::warn!("api error: {}", self);
        }

        let body = ErrorBody {
            error: true,
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
