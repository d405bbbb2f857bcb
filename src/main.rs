use axum::Router;
use axum::routing::{get, patch, post, put};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use seo_core::config::Config;
use seo_core::db;
use seo_core::handlers;
use seo_core::models;
use seo_core::services::ai_analysis::AiAnalysisEngine;
use seo_core::services::ai_fixer::AiFixer;
use seo_core::services::deployment::DeploymentPipeline;
use seo_core::services::discovery::DiscoveryService;
use seo_core::services::effectiveness_tracker::EffectivenessTracker;
use seo_core::services::embeddings::HashingEmbeddings;
use seo_core::services::issue_detector::IssueDetector;
use seo_core::services::lighthouse_client::LighthouseClient;
use seo_core::services::llm::LlmServiceImpl;
use seo_core::services::metrics_collector::MetricsCollector;
use seo_core::services::refresh_orchestrator::RefreshOrchestrator;
use seo_core::services::scheduler_bridge::SchedulerBridge;
use seo_core::services::search_console_client::SearchConsoleClient;
use seo_core::services::tasks::TaskTracker;
use seo_core::services::vector_store::VectorStore;
use seo_core::utils::rate_limiter::{RateLimiterConfig, RateLimiterKind, RateLimiterRegistry};
use seo_core::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::domains::create_domain,
        handlers::domains::list_domains,
        handlers::domains::get_domain,
        handlers::domains::update_git_config,
        handlers::domains::trigger_refresh,
        handlers::domains::trigger_refresh_gsc,
        handlers::domains::trigger_ai_analyze,

        handlers::pages::analyze_page,
        handlers::pages::update_page_fields,

        handlers::issues::auto_fix_issue,

        handlers::suggestions::apply_suggestion,

        handlers::sitemap::create_session,
        handlers::sitemap::add_operation,
        handlers::sitemap::preview_session,
        handlers::sitemap::validate_session,
        handlers::sitemap::deploy_session,

        handlers::analytics::domain_overview,

        handlers::tasks::get_task,

        handlers::llm_providers::list_providers,
        handlers::llm_providers::get_provider,
        handlers::llm_providers::create_provider,
        handlers::llm_providers::update_provider,
        handlers::llm_providers::delete_provider,
        handlers::llm_providers::activate_provider,
        handlers::llm_providers::deactivate_provider,
        handlers::llm_providers::test_connection,
        handlers::llm_providers::usage_stats,
    ),
    components(
        schemas(
            models::Domain,
            models::DomainResponse,
            models::CreateDomainRequest,
            models::UpdateGitConfigRequest,
            models::IssueResponse,
            models::AiSuggestion,
            models::ApplySuggestionRequest,
            models::EditSessionResponse,
            models::SitemapEntry,
            models::EditSessionOperation,
            models::SitemapEditRequest,
            models::SitemapOperation,
            models::Page,
            models::UpdatePageFieldsRequest,
            models::LlmProviderInfo,
            models::CreateProviderRequest,
            models::UpdateProviderRequest,
            models::TestConnectionResponse,
            models::LlmUsageStats,
            models::Task,
            models::TaskResponse,
            models::TaskStatus,
            models::TaskType,
            models::AiFixHistory,
            models::DailyTrafficSnapshot,
            handlers::pages::AnalyzeResponse,
            handlers::analytics::DomainOverview,
        )
    ),
    tags(
        (name = "Domains", description = "Domain registration, configuration and refresh triggers"),
        (name = "Pages", description = "Per-page analysis"),
        (name = "Issues", description = "Detected issue auto-fix"),
        (name = "Suggestions", description = "AI suggestion application and tracking"),
        (name = "Sitemap", description = "Sitemap edit sessions"),
        (name = "Analytics", description = "Domain-level analytics overview"),
        (name = "Tasks", description = "Background job status"),
        (name = "LlmProviders", description = "LLM provider configuration"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("seo-core.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    tracing::info!("SEO Analysis & Auto-Fix Core starting up");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("database pool created");

    let mut rate_limit_configs = HashMap::new();
    rate_limit_configs.insert(
        RateLimiterKind::Lighthouse,
        RateLimiterConfig {
            max_concurrent: config.rate_limits.lighthouse.max_concurrent,
            rate_per_sec: config.rate_limits.lighthouse.rate_per_sec,
            burst: config.rate_limits.lighthouse.burst,
        },
    );
    rate_limit_configs.insert(
        RateLimiterKind::SearchConsole,
        RateLimiterConfig {
            max_concurrent: config.rate_limits.search_console.max_concurrent,
            rate_per_sec: config.rate_limits.search_console.rate_per_sec,
            burst: config.rate_limits.search_console.burst,
        },
    );
    rate_limit_configs.insert(
        RateLimiterKind::Llm,
        RateLimiterConfig {
            max_concurrent: config.rate_limits.llm.max_concurrent,
            rate_per_sec: config.rate_limits.llm.rate_per_sec,
            burst: config.rate_limits.llm.burst,
        },
    );
    rate_limit_configs.insert(
        RateLimiterKind::GitRemote,
        RateLimiterConfig {
            max_concurrent: config.rate_limits.git_remote.max_concurrent,
            rate_per_sec: config.rate_limits.git_remote.rate_per_sec,
            burst: config.rate_limits.git_remote.burst,
        },
    );
    let rate_limiters = Arc::new(RateLimiterRegistry::new(rate_limit_configs));

    let discovery = Arc::new(DiscoveryService::new());

    let lighthouse = Arc::new(LighthouseClient::new(
        config.lighthouse.api_base_url.clone(),
        config.lighthouse.api_key.clone(),
        config.lighthouse.timeout_secs,
    ));
    let search_console = Arc::new(SearchConsoleClient::new(config.search_console.timeout_secs));

    let metrics_collector = Arc::new(MetricsCollector::new(
        pool.clone(),
        Arc::clone(&lighthouse),
        Arc::clone(&search_console),
        Arc::clone(&rate_limiters),
        config.lighthouse.worker_pool_size,
        config.search_console.enabled,
    ));

    let refresh_orchestrator = Arc::new(RefreshOrchestrator::new(
        pool.clone(),
        Arc::clone(&discovery),
        Arc::clone(&metrics_collector),
    ));

    let issue_detector = Arc::new(IssueDetector::new(pool.clone()));

    let vector_store = Arc::new(VectorStore::new(
        &config.vector_store.url,
        Arc::new(HashingEmbeddings),
        pool.clone(),
        config.vector_store.enabled,
    )?);
    if let Err(e) = vector_store.ensure_collections().await {
        tracing::warn!("vector store collection setup failed: {e}");
    }

    let llm_service = Arc::new(LlmServiceImpl::new(
        pool.clone(),
        config.llm.enabled,
        config.llm.timeout_secs,
        config.llm.cache_ttl_hours,
    ));
    tracing::info!("LLM service initialized (enabled={})", config.llm.enabled);

    let ai_analysis = Arc::new(AiAnalysisEngine::new(pool.clone(), Arc::clone(&vector_store), Arc::clone(&llm_service)));
    let ai_fixer = Arc::new(AiFixer::new(pool.clone(), Arc::clone(&llm_service)));
    let deployment = Arc::new(DeploymentPipeline::new(
        pool.clone(),
        Arc::clone(&rate_limiters),
        config.git_deployment.clone_depth,
    ));
    let effectiveness = Arc::new(EffectivenessTracker::new(pool.clone(), Arc::clone(&vector_store), Arc::clone(&llm_service)));
    let tasks = Arc::new(TaskTracker::new(pool.clone()));

    let scheduler_bridge = Arc::new(SchedulerBridge::new(
        pool.clone(),
        Arc::clone(&refresh_orchestrator),
        Arc::clone(&ai_analysis),
        Arc::clone(&vector_store),
        Arc::clone(&effectiveness),
        config.scheduler.clone(),
    ));
    scheduler_bridge.spawn_all();
    tracing::info!("scheduler bridge started (enabled={})", config.scheduler.enabled);

    let app_state = AppState {
        db: pool,
        rate_limiters,
        discovery,
        metrics_collector,
        refresh_orchestrator,
        issue_detector,
        vector_store,
        llm_service,
        ai_analysis,
        ai_fixer,
        deployment,
        effectiveness,
        tasks,
    };

    let api_routes = Router::new()
        .route("/domains", post(handlers::domains::create_domain).get(handlers::domains::list_domains))
        .route("/domains/{id}", get(handlers::domains::get_domain))
        .route("/domains/{id}/git-config", put(handlers::domains::update_git_config))
        .route("/domains/{id}/refresh", post(handlers::domains::trigger_refresh))
        .route("/domains/{id}/refresh-gsc", post(handlers::domains::trigger_refresh_gsc))
        .route("/domains/{id}/ai-analyze", post(handlers::domains::trigger_ai_analyze))
        .route("/domains/{id}/sitemap/sessions", post(handlers::sitemap::create_session))
        .route("/pages/{id}/analyze", get(handlers::pages::analyze_page))
        .route("/pages/{id}", patch(handlers::pages::update_page_fields))
        .route("/issues/{id}/auto-fix", post(handlers::issues::auto_fix_issue))
        .route("/suggestions/{id}/apply", post(handlers::suggestions::apply_suggestion))
        .route("/sitemap/sessions/{id}/operations", post(handlers::sitemap::add_operation))
        .route("/sitemap/sessions/{id}/preview", post(handlers::sitemap::preview_session))
        .route("/sitemap/sessions/{id}/validate", post(handlers::sitemap::validate_session))
        .route("/sitemap/sessions/{id}/deploy", post(handlers::sitemap::deploy_session))
        .route("/analytics/domain_overview", get(handlers::analytics::domain_overview))
        .route("/tasks/{id}", get(handlers::tasks::get_task))
        .route(
            "/llm/providers",
            get(handlers::llm_providers::list_providers).post(handlers::llm_providers::create_provider),
        )
        .route(
            "/llm/providers/{id}",
            get(handlers::llm_providers::get_provider)
                .patch(handlers::llm_providers::update_provider)
                .delete(handlers::llm_providers::delete_provider),
        )
        .route("/llm/providers/{id}/activate", post(handlers::llm_providers::activate_provider))
        .route("/llm/providers/{id}/deactivate", post(handlers::llm_providers::deactivate_provider))
        .route("/llm/providers/{id}/test", post(handlers::llm_providers::test_connection))
        .route("/llm/providers/{id}/usage", get(handlers::llm_providers::usage_stats))
        .with_state(app_state);

    let health_routes = Router::new().route("/health", get(health_check)).route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn health_router() -> Router {
        Router::new().route("/health", get(health_check)).route("/ready", get(ready_check))
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let response = health_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_check_returns_ok() {
        let response = health_router()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
