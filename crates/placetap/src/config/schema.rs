use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub defaults: JobDefaults,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            processor: ProcessorConfig::default(),
            defaults: JobDefaults::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Database file. Falls back to `~/.placetap/data/placetap.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub use_mock: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key given inline (local testing only).
    #[serde(default)]
    pub api_key: Option<String>,
    /// File holding the API key (Docker secrets).
    #[serde(default)]
    pub api_key_file: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mock: MockConfig,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://google.serper.dev/places".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("SERPER_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            use_mock: true,
            endpoint: default_endpoint(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            timeout_secs: default_timeout_secs(),
            mock: MockConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockConfig {
    #[serde(default = "default_mock_max_results")]
    pub max_results: u32,
    #[serde(default = "default_mock_min_latency_ms")]
    pub min_latency_ms: u64,
    #[serde(default = "default_mock_max_latency_ms")]
    pub max_latency_ms: u64,
    /// Fixed seed for reproducible mock output.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_mock_max_results() -> u32 {
    10
}

fn default_mock_min_latency_ms() -> u64 {
    50
}

fn default_mock_max_latency_ms() -> u64 {
    200
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            max_results: default_mock_max_results(),
            min_latency_ms: default_mock_min_latency_ms(),
            max_latency_ms: default_mock_max_latency_ms(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorConfig {
    /// Page 1 result counts below this skip pages 2 and 3 of the zip.
    #[serde(default = "default_early_exit_threshold")]
    pub early_exit_threshold: u32,
    #[serde(default = "default_iteration_delay_ms")]
    pub iteration_delay_ms: u64,
    /// Cap on in-flight fetches across all jobs.
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: u32,
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

fn default_early_exit_threshold() -> u32 {
    10
}

fn default_iteration_delay_ms() -> u64 {
    3000
}

fn default_global_concurrency() -> u32 {
    100
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            early_exit_threshold: default_early_exit_threshold(),
            iteration_delay_ms: default_iteration_delay_ms(),
            global_concurrency: default_global_concurrency(),
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefaults {
    #[serde(default = "default_pages")]
    pub pages: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

fn default_pages() -> u32 {
    3
}

fn default_batch_size() -> u32 {
    100
}

fn default_concurrency() -> u32 {
    20
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    5000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Plain,
        }
    }
}
