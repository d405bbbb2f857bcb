pub mod cron;
pub mod error;
pub mod rate_limiter;
pub mod scheduled_executor;

pub use error::{ApiError, ApiResult};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterKind, RateLimiterRegistry};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
