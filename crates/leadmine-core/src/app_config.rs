use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Per-request timeout applied to every upstream fetch.
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    /// Additional attempts after the first failure for transient errors.
    pub http_max_retries: u32,
    /// Base delay for retry backoff: the wait before attempt n is
    /// `backoff_base_secs * n`.
    pub http_backoff_base_secs: u64,
    pub energy_api_base_url: String,
    pub energy_min_interval_ms: u64,
    pub company_api_base_url: String,
    pub company_min_interval_ms: u64,
    pub death_index_url: String,
    pub death_min_interval_ms: u64,
    pub geocoding_base_url: String,
    pub geocoding_min_interval_ms: u64,
    /// Records requested per page from paginated APIs.
    pub page_size: u32,
    /// Records per persistence batch.
    pub upsert_batch_size: usize,
    /// Minimum age at death for a registry row to become an opportunity.
    pub min_age_years: u32,
    /// Directory the filesystem artifact store writes failure reports to.
    pub artifact_dir: std::path::PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field("http_backoff_base_secs", &self.http_backoff_base_secs)
            .field("energy_api_base_url", &self.energy_api_base_url)
            .field("energy_min_interval_ms", &self.energy_min_interval_ms)
            .field("company_api_base_url", &self.company_api_base_url)
            .field("company_min_interval_ms", &self.company_min_interval_ms)
            .field("death_index_url", &self.death_index_url)
            .field("death_min_interval_ms", &self.death_min_interval_ms)
            .field("geocoding_base_url", &self.geocoding_base_url)
            .field("geocoding_min_interval_ms", &self.geocoding_min_interval_ms)
            .field("page_size", &self.page_size)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .field("min_age_years", &self.min_age_years)
            .field("artifact_dir", &self.artifact_dir)
            .finish()
    }
}
