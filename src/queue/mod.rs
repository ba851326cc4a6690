use crate::config::{QueueBackend, QueueSettings};
use std::path::Path;
use std::time::Duration;

pub mod file_store;
pub mod job;
pub mod redis_store;

pub use file_store::{FileJobQueue, FileQueuePaths};
pub use job::{Job, QueuedJob};
pub use redis_store::{RedisJobQueue, RedisKeys};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid queue payload in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("redis queue error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

/// A job handed to exactly one worker. `receipt` is backend specific and
/// identifies the in-flight copy to acknowledge or fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedJob {
    pub queued: QueuedJob,
    pub receipt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Queue-level redelivery: a fixed number of attempts with exponential
/// backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for QueueRetryPolicy {
    fn default() -> Self {
        Self::from_settings(&QueueSettings::default())
    }
}

impl QueueRetryPolicy {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            attempts: settings.attempts.max(1),
            backoff: Duration::from_millis(settings.backoff_ms),
        }
    }

    /// `attempts_made` includes the attempt that just failed.
    pub fn outcome(&self, attempts_made: u32) -> FailureOutcome {
        if attempts_made >= self.attempts {
            FailureOutcome::Exhausted {
                attempts: attempts_made,
            }
        } else {
            FailureOutcome::Retry {
                attempt: attempts_made,
                delay: self.delay_for(attempts_made),
            }
        }
    }

    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1_u32 << exponent)
    }
}

/// Durable job storage shared by all workers of one process.
pub trait JobQueue: Send + Sync {
    fn backend(&self) -> QueueBackend;

    fn enqueue(&self, job: Job) -> Result<QueuedJob, QueueError>;

    /// Waits up to `wait` for a due job and moves it to the in-flight set.
    fn reserve(&self, wait: Duration) -> Result<Option<ReservedJob>, QueueError>;

    fn complete(&self, reserved: &ReservedJob) -> Result<(), QueueError>;

    /// Records a failed attempt and either schedules a retry or parks the job.
    fn fail(&self, reserved: &ReservedJob, reason: &str) -> Result<FailureOutcome, QueueError>;

    /// Returns jobs left in flight by a previous process. Only safe while no
    /// other worker process consumes the same topic.
    fn recover(&self) -> Result<usize, QueueError>;

    fn ping(&self) -> Result<(), QueueError>;
}

pub fn open_queue(
    settings: &QueueSettings,
    queue_root: &Path,
) -> Result<Box<dyn JobQueue>, QueueError> {
    let policy = QueueRetryPolicy::from_settings(settings);
    match settings.backend {
        QueueBackend::Redis => Ok(Box::new(RedisJobQueue::open(
            &settings.redis_url,
            &settings.topic,
            policy,
        )?)),
        QueueBackend::File => Ok(Box::new(FileJobQueue::open(
            queue_root,
            &settings.topic,
            policy,
        )?)),
    }
}

pub(crate) fn failure_note(reason: &str) -> String {
    const MAX_REASON_CHARS: usize = 2_000;
    let trimmed = reason.trim();
    if trimmed.chars().count() <= MAX_REASON_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(MAX_REASON_CHARS).collect();
    format!("{head}...")
}
