//! LLM provider client/repository/service split (§4.8), adapted from the
//! teacher's `services/llm/{client,repository,service}.rs`. The teacher
//! persists a full debug-replay trail (sessions/requests/results); this
//! domain only needs provider config plus a domain-scoped response cache, so
//! that trail collapses onto `ai_analysis_cache` and `llm_usage_stats`.

pub mod client;
pub mod repository;
pub mod service;

pub use client::LlmClient;
pub use repository::LlmRepository;
pub use service::{LlmAnalysisRequestTrait, LlmAnalysisResponseTrait, LlmAnalysisResult, LlmService, LlmServiceImpl};
