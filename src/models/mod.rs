pub mod ai_cache;
pub mod domain;
pub mod edit_session;
pub mod fix_history;
pub mod issue;
pub mod learning_state;
pub mod llm;
pub mod metrics;
pub mod page;
pub mod sitemap;
pub mod suggestion;
pub mod task;

pub use ai_cache::AiAnalysisCache;
pub use domain::{
    CreateDomainRequest, DeploymentStatus, Domain, DomainResponse, GitConfig, RefreshStatus,
    UpdateGitConfigRequest,
};
pub use edit_session::{EditSession, EditSessionResponse, EditSessionStatus};
pub use fix_history::{AiFixHistory, Effectiveness, FixStatus, GeneratedFix};
pub use issue::{
    DetectedIssue, IssueResponse, IssueSeverity, IssueStatus, IssueType, SeoIssue,
    VerificationStatus,
};
pub use learning_state::{AiLearningState, LearningSyncStatus};
pub use llm::{
    CreateProviderRequest, LlmError, LlmProvider, LlmProviderInfo, LlmScenario, LlmUsageStats,
    TestConnectionResponse, UpdateProviderRequest,
};
pub use metrics::{
    CoreWebVitals, DailyTrafficSnapshot, GscQuery, IndexState, LighthouseScores, SearchAnalytics,
    SeoMetricsSnapshot,
};
pub use page::{DiscoveredUrl, Page, UpdatePageFieldsRequest};
pub use sitemap::{
    ChangeFreq, EditSessionOperation, SitemapEditRequest, SitemapEntry, SitemapEntryStatus,
    SitemapOperation, SitemapUrlEntry, SITEMAP_MAX_BYTES, SITEMAP_MAX_URLS,
};
pub use suggestion::{AiSuggestion, ApplySuggestionRequest, SuggestionStatus, SuggestionType};
pub use task::{Task, TaskResponse, TaskStatus, TaskType};
