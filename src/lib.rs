//! SEO Analysis & Auto-Fix Core
//!
//! Library crate: every service (C1-C12) plus the HTTP handlers that wire
//! them together behind one shared `AppState`.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::ai_analysis::AiAnalysisEngine;
pub use services::ai_fixer::AiFixer;
pub use services::deployment::DeploymentPipeline;
pub use services::discovery::DiscoveryService;
pub use services::effectiveness_tracker::EffectivenessTracker;
pub use services::issue_detector::IssueDetector;
pub use services::llm::LlmServiceImpl;
pub use services::metrics_collector::MetricsCollector;
pub use services::refresh_orchestrator::RefreshOrchestrator;
pub use services::scheduler_bridge::SchedulerBridge;
pub use services::tasks::TaskTracker;
pub use services::vector_store::VectorStore;
pub use utils::rate_limiter::RateLimiterRegistry;

/// Application shared state: one `Arc<Service>` per component (C1-C12),
/// cloned cheaply into every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    pub rate_limiters: Arc<RateLimiterRegistry>,
    pub discovery: Arc<DiscoveryService>,
    pub metrics_collector: Arc<MetricsCollector>,
    pub refresh_orchestrator: Arc<RefreshOrchestrator>,
    pub issue_detector: Arc<IssueDetector>,
    pub vector_store: Arc<VectorStore>,
    pub llm_service: Arc<LlmServiceImpl>,
    pub ai_analysis: Arc<AiAnalysisEngine>,
    pub ai_fixer: Arc<AiFixer>,
    pub deployment: Arc<DeploymentPipeline>,
    pub effectiveness: Arc<EffectivenessTracker>,
    pub tasks: Arc<TaskTracker>,
}
