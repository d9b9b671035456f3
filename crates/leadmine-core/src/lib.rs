pub mod app_config;
pub mod config;
pub mod opportunity;
pub mod stats;

pub use app_config::{AppConfig, ConfigError, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use opportunity::{ConflictPolicy, Opportunity, SourceKind, UnknownSourceError};
pub use stats::ProcessingStats;
