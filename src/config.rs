use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub rate_limits: RateLimitsConfig,
    pub lighthouse: LighthouseConfig,
    pub search_console: SearchConsoleConfig,
    pub llm: LlmConfig,
    pub git_deployment: GitDeploymentConfig,
    pub vector_store: VectorStoreConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/seo-core.db".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,seo_core=debug".to_string(), file: Some("logs/seo-core.log".to_string()) }
    }
}

/// One entry per external API kind from §4.1 / §5's "global per API kind" policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_concurrent: usize,
    pub rate_per_sec: f64,
    pub burst: f64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self { max_concurrent: 4, rate_per_sec: 4.0, burst: 4.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub lighthouse: RateLimitSection,
    pub search_console: RateLimitSection,
    pub llm: RateLimitSection,
    pub git_remote: RateLimitSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LighthouseConfig {
    pub api_key: Option<String>,
    pub api_base_url: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub timeout_secs: u64,
    pub desktop_parallel: bool,
    pub worker_pool_size: usize,
}

impl Default for LighthouseConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://www.googleapis.com/pagespeedonline/v5/runPagespeed".to_string(),
            timeout_secs: 60,
            desktop_parallel: true,
            worker_pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConsoleConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub timeout_secs: u64,
    pub max_urls_per_batch: usize,
}

impl Default for SearchConsoleConfig {
    fn default() -> Self {
        Self { enabled: false, timeout_secs: 90, max_urls_per_batch: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub cache_ttl_hours: i64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { enabled: true, cache_ttl_hours: 24, timeout_secs: 60, max_retries: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitDeploymentConfig {
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub clone_timeout_secs: u64,
    pub clone_depth: u32,
}

impl Default for GitDeploymentConfig {
    fn default() -> Self {
        Self { clone_timeout_secs: 60, clone_depth: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub enabled: bool,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { url: "http://localhost:6334".to_string(), enabled: true }
    }
}

/// Crontab defaults per §4.12, local time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub gsc_sync_morning: String,
    pub gsc_sync_evening: String,
    pub daily_full_scan: String,
    pub daily_ai_analysis: String,
    pub vector_embedding_update: String,
    pub evaluate_fix_effectiveness: String,
    pub daily_snapshot: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gsc_sync_morning: "0 7 * * *".to_string(),
            gsc_sync_evening: "0 19 * * *".to_string(),
            daily_full_scan: "0 3 * * *".to_string(),
            daily_ai_analysis: "30 3 * * *".to_string(),
            vector_embedding_update: "0 4 * * *".to_string(),
            evaluate_fix_effectiveness: "0 5 * * *".to_string(),
            daily_snapshot: "55 23 * * *".to_string(),
        }
    }
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "seo-core")]
#[command(version, about = "SEO Analysis & Auto-Fix Core")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,seo_core=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable/disable the LLM-backed analysis engine (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub llm_enabled: Option<bool>,

    /// Enable/disable the scheduler bridge (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub scheduler_enabled: Option<bool>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(enabled) = std::env::var("APP_LLM_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.llm.enabled = val;
        }
        if let Ok(enabled) = std::env::var("APP_SCHEDULER_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.scheduler.enabled = val;
        }
        if let Ok(key) = std::env::var("APP_LIGHTHOUSE_API_KEY") {
            self.lighthouse.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("APP_VECTOR_STORE_URL") {
            self.vector_store.url = url;
        }
    }

    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(enabled) = args.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(enabled) = args.scheduler_enabled {
            self.scheduler.enabled = enabled;
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("database URL cannot be empty");
        }
        if self.rate_limits.lighthouse.rate_per_sec <= 0.0 {
            anyhow::bail!("rate_limits.lighthouse.rate_per_sec must be > 0");
        }
        for expr in [
            &self.scheduler.gsc_sync_morning,
            &self.scheduler.gsc_sync_evening,
            &self.scheduler.daily_full_scan,
            &self.scheduler.daily_ai_analysis,
            &self.scheduler.vector_embedding_update,
            &self.scheduler.evaluate_fix_effectiveness,
            &self.scheduler.daily_snapshot,
        ] {
            crate::utils::cron::CronSchedule::parse(expr)
                .map_err(|e| anyhow::anyhow!("invalid scheduler cron expression '{expr}': {e}"))?;
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        possible_paths.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duration_strings_parse() {
        assert_eq!(parse_duration_to_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("1h").unwrap(), 3600);
        assert!(parse_duration_to_secs("bogus").is_err());
    }
}
