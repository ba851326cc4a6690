use super::chunk::split_message;
use super::retry::{Attempt, Jitter, Pause, RandomJitter, RateLimitHints, RetryPolicy, ThreadPause};
use super::{DeliveryError, DeliveryResult};
use crate::config::DeliverySettings;
use crate::shared::logging::RuntimeLog;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const MAX_BODY_CHARS_IN_ERROR: usize = 500;

/// REST client for posting agent replies back to chat threads.
///
/// Public operations never return `Err`; every failure is folded into a
/// [`DeliveryResult`] so a worker can decide what to do without unwinding.
#[derive(Clone)]
pub struct ChatClient {
    agent: ureq::Agent,
    api_base: String,
    token: String,
    chunk_chars: usize,
    policy: RetryPolicy,
    pause: Arc<dyn Pause>,
    jitter: Arc<dyn Jitter>,
    log: RuntimeLog,
}

impl ChatClient {
    pub fn new(api_base: &str, token: &str, settings: &DeliverySettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build();
        Self {
            agent,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chunk_chars: settings.chunk_chars.max(1),
            policy: RetryPolicy::from_settings(settings),
            pause: Arc::new(ThreadPause),
            jitter: Arc::new(RandomJitter),
            log: RuntimeLog::disabled(),
        }
    }

    /// Builds a client from settings, reading the bot token from the
    /// configured environment variable.
    pub fn from_settings(settings: &DeliverySettings) -> Result<Self, DeliveryError> {
        let token = std::env::var(&settings.token_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DeliveryError::MissingToken {
                env_var: settings.token_env.clone(),
            })?;
        Ok(Self::new(&settings.api_base, &token, settings))
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_log(mut self, log: RuntimeLog) -> Self {
        self.log = log;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Posts `text` to `thread_id`, split into platform-sized chunks sent in
    /// order. Stops at the first chunk that still fails after its retries.
    pub fn deliver(&self, thread_id: &str, text: &str) -> DeliveryResult {
        let chunks = split_message(text, self.chunk_chars);
        let total = chunks.len();
        for (idx, chunk) in chunks.iter().enumerate() {
            let sent = self.post_with_retry(
                &self.channel_endpoint(thread_id, "messages"),
                Some(json!({ "content": chunk })),
            );
            if let Err(err) = sent {
                let message = if total > 1 {
                    format!("chunk {} of {total}: {err}", idx + 1)
                } else {
                    err.to_string()
                };
                self.log.warn(
                    "delivery.failed",
                    &format!("thread={thread_id} {message}"),
                );
                return DeliveryResult::failed(message);
            }
        }
        DeliveryResult::ok()
    }

    pub fn typing(&self, channel_id: &str) -> DeliveryResult {
        match self.post_with_retry(&self.channel_endpoint(channel_id, "typing"), None) {
            Ok(()) => DeliveryResult::ok(),
            Err(err) => DeliveryResult::failed(err.to_string()),
        }
    }

    fn channel_endpoint(&self, channel_id: &str, action: &str) -> String {
        format!(
            "{}/channels/{}/{action}",
            self.api_base,
            urlencoding::encode(channel_id.trim())
        )
    }

    fn post_with_retry(&self, url: &str, body: Option<Value>) -> Result<(), DeliveryError> {
        self.policy
            .execute(self.pause.as_ref(), self.jitter.as_ref(), |attempt| {
                self.post_once(url, body.as_ref(), attempt)
            })
    }

    fn post_once(
        &self,
        url: &str,
        body: Option<&Value>,
        attempt: u32,
    ) -> Attempt<(), DeliveryError> {
        let request = self
            .agent
            .post(url)
            .set("Authorization", &format!("Bot {}", self.token));
        let sent = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match sent {
            Ok(_) => Attempt::Done(()),
            Err(ureq::Error::Status(429, response)) => {
                let retry_after = response.header("Retry-After").map(str::to_string);
                let reset_after = response
                    .header("X-RateLimit-Reset-After")
                    .map(str::to_string);
                let body = response.into_string().unwrap_or_default();
                let hints = RateLimitHints::from_response_parts(
                    &body,
                    retry_after.as_deref(),
                    reset_after.as_deref(),
                );
                Attempt::RateLimited {
                    hints,
                    error: DeliveryError::RateLimited {
                        attempts: attempt + 1,
                        body: truncate_body(&body),
                    },
                }
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Attempt::Failed(DeliveryError::Http {
                    status,
                    body: truncate_body(&body),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Attempt::Failed(DeliveryError::Timeout {
                        url: url.to_string(),
                    })
                } else {
                    Attempt::Failed(DeliveryError::Transport(transport.to_string()))
                }
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let io_timeout = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .map(|err| {
            matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
        .unwrap_or(false);
    io_timeout || transport.to_string().to_ascii_lowercase().contains("timed out")
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_CHARS_IN_ERROR {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(MAX_BODY_CHARS_IN_ERROR).collect();
    format!("{head}...")
}
