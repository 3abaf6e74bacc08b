use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Dataset-Harvester
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub gateway: GatewayConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Upper bound on pages processed in parallel within one level
    pub max_concurrency: usize,

    /// Minimum spacing between any two outbound requests (milliseconds)
    pub politeness_delay_ms: u64,

    /// Timeout for a page fetch (seconds)
    pub page_timeout_secs: u64,

    /// Timeout for a whole file download (seconds)
    pub download_timeout_secs: u64,

    /// Attempts per request, including the first one
    pub max_retries: u32,

    /// Backoff unit; attempt `n` sleeps `base * 2^n` before retrying (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Maximum candidate links kept per page
    pub max_links: usize,

    /// Maximum characters of cleaned page text handed to the gateway
    pub max_text_length: usize,

    /// Drop cross-domain page links (download links are always kept)
    pub same_domain_only: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 128,
            politeness_delay_ms: 1000,
            page_timeout_secs: 30,
            download_timeout_secs: 300,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            max_links: 200,
            max_text_length: 8000,
            same_domain_only: true,
        }
    }
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "DatasetHarvester".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the crawl history JSON file
    pub history_path: PathBuf,

    /// Path to the SQLite dataset index
    pub index_path: PathBuf,

    /// Directory under which per-site save paths are created by default
    pub datasets_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("data/crawl_history.json"),
            index_path: PathBuf::from("data/index.db"),
            datasets_root: PathBuf::from("data/datasets"),
        }
    }
}

/// Classifier gateway (chat-completion endpoint) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    /// Model identifier sent with each request
    pub model: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Attempts per gateway call
    pub max_retries: u32,

    /// Request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "qwen-flash".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            temperature: 0.1,
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}
