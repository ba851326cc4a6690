pub mod chunk;
pub mod client;
pub mod retry;

pub use chunk::{split_message, MESSAGE_MAX_CHARS};
pub use client::ChatClient;
pub use retry::{
    Attempt, Jitter, Pause, RandomJitter, RateLimitHints, RetryPolicy, ThreadPause,
};

/// Outcome of a delivery call. Failures are values, never panics or `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("rate limited after {attempts} attempts (status 429): {body}")]
    RateLimited { attempts: u32, body: String },
    #[error("chat api returned status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("chat api request failed: {0}")]
    Transport(String),
    #[error("bot token is not set; export {env_var}")]
    MissingToken { env_var: String },
}
