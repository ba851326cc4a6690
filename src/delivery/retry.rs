use crate::config::DeliverySettings;
use getrandom::getrandom;
use std::thread;
use std::time::Duration;

/// Wait hints a rate-limited response can carry, all in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitHints {
    pub body_retry_after: Option<f64>,
    pub retry_after_header: Option<f64>,
    pub reset_after_header: Option<f64>,
}

impl RateLimitHints {
    pub fn from_response_parts(
        body: &str,
        retry_after: Option<&str>,
        reset_after: Option<&str>,
    ) -> Self {
        let body_retry_after = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                let field = value.get("retry_after")?;
                field
                    .as_f64()
                    .or_else(|| field.as_str().and_then(parse_seconds))
            })
            .filter(|secs| valid_seconds(*secs));
        Self {
            body_retry_after,
            retry_after_header: retry_after.and_then(parse_seconds),
            reset_after_header: reset_after.and_then(parse_seconds),
        }
    }

    /// Body first, then `Retry-After`, then `X-RateLimit-Reset-After`.
    pub fn wait_seconds(&self) -> Option<f64> {
        self.body_retry_after
            .or(self.retry_after_header)
            .or(self.reset_after_header)
    }
}

fn parse_seconds(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|secs| valid_seconds(*secs))
}

fn valid_seconds(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0
}

pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub trait Jitter: Send + Sync {
    /// A uniformly random duration in `0..=max`.
    fn sample(&self, max: Duration) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut bytes = [0_u8; 8];
        if getrandom(&mut bytes).is_err() {
            return Duration::ZERO;
        }
        Duration::from_millis(u64::from_le_bytes(bytes) % max_ms.saturating_add(1))
    }
}

/// What one attempt of a rate-limited operation produced.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    RateLimited { hints: RateLimitHints, error: E },
    Failed(E),
}

/// Retry budget and wait computation for rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_wait: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&DeliverySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &DeliverySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            default_wait: Duration::from_millis(settings.default_retry_after_ms),
            max_jitter: Duration::from_millis(settings.max_jitter_ms),
        }
    }

    /// Wait before the next attempt, jitter excluded.
    pub fn base_wait(&self, hints: &RateLimitHints) -> Duration {
        hints
            .wait_seconds()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(self.default_wait)
    }

    /// Runs `op` until it is done, fails outright, or has been rate limited
    /// `max_retries + 1` times. `op` receives the zero-based attempt number.
    pub fn execute<T, E>(
        &self,
        pause: &dyn Pause,
        jitter: &dyn Jitter,
        mut op: impl FnMut(u32) -> Attempt<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Failed(error) => return Err(error),
                Attempt::RateLimited { hints, error } => {
                    if attempt >= self.max_retries {
                        return Err(error);
                    }
                    let wait = self.base_wait(&hints) + jitter.sample(self.max_jitter);
                    pause.pause(wait);
                    attempt += 1;
                }
            }
        }
    }
}
