use super::ConfigError;
use crate::provider::AdapterKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_QUEUE_TOPIC: &str = "agent-jobs";
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_TOKEN_ENV: &str = "AGENTRELAY_BOT_TOKEN";
pub const REDIS_URL_ENV: &str = "AGENTRELAY_REDIS_URL";
pub const API_BASE_ENV: &str = "AGENTRELAY_API_BASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Redis,
    File,
}

impl QueueBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub backend: QueueBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            redis_url: default_redis_url(),
            topic: default_topic(),
            concurrency: default_concurrency(),
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl QueueSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliverySettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_after_ms")]
    pub default_retry_after_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            default_retry_after_ms: default_retry_after_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            chunk_chars: default_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub adapter: AdapterKind,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Agent CLI versions whose `--resume` is known to misbehave; a match is
    /// logged as a warning before the job runs. Empty by default, which skips
    /// the `--version` probe entirely.
    #[serde(default)]
    pub known_bad_resume_versions: Vec<String>,
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_topic() -> String {
    DEFAULT_QUEUE_TOPIC.to_string()
}

fn default_concurrency() -> usize {
    2
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    5_000
}

fn default_poll_timeout_secs() -> u64 {
    1
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_after_ms() -> u64 {
    5_000
}

fn default_max_jitter_ms() -> u64 {
    500
}

fn default_chunk_chars() -> usize {
    2_000
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Environment values win over the file so containers can repoint the
    /// queue and API without editing config.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(REDIS_URL_ENV) {
            self.queue.redis_url = url;
        }
        if let Some(base) = non_empty_env(API_BASE_ENV) {
            self.delivery.api_base = base;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.topic.trim().is_empty() {
            return Err(ConfigError::Settings(
                "queue.topic must be non-empty".to_string(),
            ));
        }
        if self
            .queue
            .topic
            .chars()
            .any(|ch| ch.is_whitespace() || ch == '/' || ch == '\\')
        {
            return Err(ConfigError::Settings(format!(
                "queue.topic `{}` must not contain whitespace or path separators",
                self.queue.topic
            )));
        }
        if self.queue.concurrency == 0 {
            return Err(ConfigError::Settings(
                "queue.concurrency must be at least 1".to_string(),
            ));
        }
        if self.queue.attempts == 0 {
            return Err(ConfigError::Settings(
                "queue.attempts must be at least 1".to_string(),
            ));
        }
        if self.queue.backend == QueueBackend::Redis {
            let url = self.queue.redis_url.trim();
            if !(url.starts_with("redis://")
                || url.starts_with("rediss://")
                || url.starts_with("unix://"))
            {
                return Err(ConfigError::Settings(format!(
                    "queue.redis_url `{url}` must start with redis://, rediss:// or unix://"
                )));
            }
        }
        if self.delivery.api_base.trim().is_empty() {
            return Err(ConfigError::Settings(
                "delivery.api_base must be non-empty".to_string(),
            ));
        }
        if self.delivery.token_env.trim().is_empty() {
            return Err(ConfigError::Settings(
                "delivery.token_env must be non-empty".to_string(),
            ));
        }
        if self.delivery.request_timeout_secs == 0 {
            return Err(ConfigError::Settings(
                "delivery.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(2..=2_000).contains(&self.delivery.chunk_chars) {
            return Err(ConfigError::Settings(format!(
                "delivery.chunk_chars must be between 2 and 2000, got {}",
                self.delivery.chunk_chars
            )));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
