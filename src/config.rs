use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the ingestion service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Queue consumer configuration
    pub queue: QueueConfig,
    /// S3 configuration for image downloads
    #[serde(default)]
    pub s3: S3Config,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scoring sidecar configuration
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Read API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Queue consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// SQS queue URL to poll for capture events
    pub queue_url: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack, ElasticMQ, etc.)
    pub endpoint_url: Option<String>,
    /// Long-poll wait in seconds; the queue's own wait is the primary throttle
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: u32,
    /// Sleep between polls when the queue is empty
    #[serde(default = "default_idle_sleep_secs")]
    pub idle_sleep_secs: u64,
    /// Sleep after a queue transport error before re-polling
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

/// S3 configuration for image downloads
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Scoring sidecar configuration.
///
/// The model is a black box behind an external command: the worker invokes
/// `{command} {args...} {image_path}` and reads `{"trashScore": n}` from
/// stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Inference command to spawn
    #[serde(default = "default_scoring_command")]
    pub command: String,
    /// Arguments passed before the image path
    #[serde(default = "default_scoring_args")]
    pub args: Vec<String>,
    /// Kill the inference process after this many seconds
    #[serde(default = "default_scoring_timeout_secs")]
    pub timeout_secs: u64,
}

/// Read API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "skysweep-ingest".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "ap-south-1".to_string()
}

fn default_wait_time_seconds() -> u32 {
    20
}

fn default_idle_sleep_secs() -> u64 {
    5
}

fn default_error_backoff_secs() -> u64 {
    15
}

fn default_database_url() -> String {
    "sqlite:flight_data.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_run_migrations() -> bool {
    true
}

fn default_scoring_command() -> String {
    "python3".to_string()
}

fn default_scoring_args() -> Vec<String> {
    vec!["-m".to_string(), "skysweep_inference".to_string()]
}

fn default_scoring_timeout_secs() -> u64 {
    120
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    1234
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "skysweep-ingest")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/skysweep").required(false))
            .add_source(config::File::with_name("/etc/skysweep/skysweep").required(false))
            // Override with environment variables
            // SKYSWEEP__QUEUE__QUEUE_URL -> queue.queue_url
            .add_source(
                config::Environment::with_prefix("SKYSWEEP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl QueueConfig {
    /// Sleep between polls when the queue is empty
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_secs(self.idle_sleep_secs)
    }

    /// Sleep after a queue transport error
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl ScoringConfig {
    /// Inference process timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            command: default_scoring_command(),
            args: default_scoring_args(),
            timeout_secs: default_scoring_timeout_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_wait_time_seconds(), 20);
        assert_eq!(default_idle_sleep_secs(), 5);
        assert_eq!(default_error_backoff_secs(), 15);
        assert_eq!(default_api_port(), 1234);
    }

    #[test]
    fn test_duration_accessors() {
        let queue = QueueConfig {
            queue_url: "https://sqs.example/queue".to_string(),
            region: default_region(),
            endpoint_url: None,
            wait_time_seconds: 20,
            idle_sleep_secs: 5,
            error_backoff_secs: 15,
        };
        assert_eq!(queue.idle_sleep(), Duration::from_secs(5));
        assert_eq!(queue.error_backoff(), Duration::from_secs(15));
    }
}
