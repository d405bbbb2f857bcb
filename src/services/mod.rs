pub mod discovery;
pub mod lighthouse_client;
pub mod search_console_client;
pub mod metrics_collector;
pub mod refresh_orchestrator;
pub mod issue_detector;
pub mod embeddings;
pub mod vector_store;
pub mod knowledge_builder;
pub mod llm;
pub mod ai_analysis;
pub mod ai_fixer;
pub mod deployment;
pub mod effectiveness_tracker;
pub mod scheduler_bridge;
pub mod tasks;

pub use discovery::DiscoveryService;
pub use lighthouse_client::{LighthouseClient, LighthouseError, Strategy};
pub use search_console_client::{SearchConsoleClient, SearchConsoleError};
pub use metrics_collector::{MetricsCollectionOutcome, MetricsCollector};
pub use refresh_orchestrator::{ProgressCallback, RefreshError, RefreshOrchestrator};
pub use issue_detector::{AnalysisReport, IssueDetector};
pub use embeddings::{Embeddings, HashingEmbeddings};
pub use vector_store::{RetrievedPoint, SyncOutcome, VectorStore, VectorStoreError};
pub use knowledge_builder::{DomainContext, KnowledgeBuilder};
pub use llm::{LlmAnalysisRequestTrait, LlmAnalysisResponseTrait, LlmAnalysisResult, LlmClient, LlmRepository, LlmService, LlmServiceImpl};
pub use ai_analysis::{AiAnalysisEngine, AiAnalysisError, AiAnalysisOutcome, AiAnalysisResponse, FullDomainAnalysisRequest, RawSuggestion};
pub use ai_fixer::{AiFixer, AiFixerError};
pub use deployment::{
    DeploymentError, DeploymentHandlerRegistry, DeploymentOutcome, DeploymentPipeline,
    MetadataField, MetadataFix, generate_sitemap_xml, validate_sitemap_entries,
};
pub use effectiveness_tracker::{EffectivenessTracker, EffectivenessTrackerError};
pub use scheduler_bridge::SchedulerBridge;
pub use tasks::TaskTracker;
