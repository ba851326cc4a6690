use crate::shared::ids::new_job_id;
use crate::shared::time::{now_millis, now_secs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A request to run an agent and post the reply to a chat thread.
/// Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub prompt: String,
    pub thread_id: String,
    pub session_id: String,
    #[serde(default)]
    pub resume: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Job {
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_id.trim().is_empty() {
            return Err("job threadId must be non-empty".to_string());
        }
        if self.session_id.trim().is_empty() {
            return Err("job sessionId must be non-empty".to_string());
        }
        if self.prompt.trim().is_empty() {
            return Err("job prompt must be non-empty".to_string());
        }
        Ok(())
    }
}

/// Queue envelope around a [`Job`]: identity plus retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub id: String,
    pub job: Job,
    #[serde(default)]
    pub attempts_made: u32,
    pub enqueued_at: i64,
    #[serde(default)]
    pub available_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        let now_ms = now_millis();
        Self {
            id: new_job_id(now_ms),
            job,
            attempts_made: 0,
            enqueued_at: now_secs(),
            available_at_ms: now_ms,
            last_error: None,
        }
    }
}
