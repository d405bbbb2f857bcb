//! HTTP client for OpenAI-compatible chat completion APIs.
//!
//! Works against OpenAI, Azure OpenAI, DeepSeek, and other providers that
//! speak the same `/chat/completions` shape.

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::models::{LlmError, LlmProvider};

use super::service::LlmAnalysisRequestTrait;

/// `LlmProvider` carries no per-call tuning knobs (the schema has none); these
/// mirror the teacher's own `default_max_tokens()`/`default_temperature()`.
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f64 = 0.3;

pub struct LlmClient {
    http_client: Client,
    timeout_secs: u64,
}

impl LlmClient {
    pub fn new(timeout_secs: u64) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build LLM HTTP client");

        Self { http_client, timeout_secs }
    }

    pub async fn chat_completion<Req, Resp>(
        &self,
        provider: &LlmProvider,
        request: &Req,
    ) -> Result<(Resp, i32, i32), LlmError>
    where
        Req: LlmAnalysisRequestTrait,
        Resp: DeserializeOwned,
    {
        let user_prompt = serde_json::to_string_pretty(request)?;

        let chat_request = ChatCompletionRequest {
            model: provider.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: request.system_prompt() },
                ChatMessage { role: "user".to_string(), content: user_prompt },
            ],
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            temperature: Some(DEFAULT_TEMPERATURE),
            response_format: Some(ResponseFormat { r#type: "json_object".to_string() }),
        };

        let url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));

        tracing::debug!(url, model = %provider.model, "calling LLM API");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| LlmError::ParseError("empty response from LLM".to_string()))?;

        let result: Resp = serde_json::from_str(content)
            .map_err(|e| LlmError::ParseError(format!("failed to parse LLM response: {e}. content: {content}")))?;

        let input_tokens = chat_response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0);
        let output_tokens = chat_response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0);

        Ok((result, input_tokens, output_tokens))
    }

    /// Minimal connectivity probe, grounded on the teacher's `test_connection`
    /// fallback-to-chat-completion shape.
    pub async fn test_connection(&self, provider: &LlmProvider) -> Result<(), LlmError> {
        let url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));

        let test_request = ChatCompletionRequest {
            model: provider.model.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: "ping".to_string() }],
            max_tokens: Some(1),
            temperature: Some(0.0),
            response_format: None,
        };

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(15))
            .json(&test_request)
            .send()
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::ApiError("invalid API key".to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::ApiError(format!("API error {}: {}", status, error_text)));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i32,
    completion_tokens: i32,
}
