use super::{
    failure_note, FailureOutcome, Job, JobQueue, QueueError, QueueRetryPolicy, QueuedJob,
    ReservedJob,
};
use crate::config::QueueBackend;
use crate::shared::time::now_millis;
use redis::{Client, Connection, RedisResult};
use std::sync::Mutex;
use std::time::Duration;

const PROMOTE_BATCH: usize = 100;
const FAILED_KEEP: isize = 1_000;

/// Moves due entries from the delayed set to the wait list in one step so a
/// crash can never drop a job between the two.
const PROMOTE_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, payload in ipairs(due) do
  redis.call('ZREM', KEYS[1], payload)
  redis.call('LPUSH', KEYS[2], payload)
end
return #due
";

/// Key layout for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisKeys {
    pub wait: String,
    pub active: String,
    pub delayed: String,
    pub failed: String,
}

impl RedisKeys {
    pub fn new(topic: &str) -> Self {
        Self {
            wait: format!("{topic}:wait"),
            active: format!("{topic}:active"),
            delayed: format!("{topic}:delayed"),
            failed: format!("{topic}:failed"),
        }
    }
}

/// Redis list queue: producers `LPUSH` to `wait`, workers `BRPOPLPUSH` into
/// `active`, retries wait in the `delayed` sorted set scored by due time and
/// exhausted jobs are kept in a capped `failed` list.
///
/// Each worker blocks on its own connection; idle connections are pooled.
pub struct RedisJobQueue {
    client: Client,
    keys: RedisKeys,
    policy: QueueRetryPolicy,
    idle: Mutex<Vec<Connection>>,
}

impl RedisJobQueue {
    pub fn open(url: &str, topic: &str, policy: QueueRetryPolicy) -> Result<Self, QueueError> {
        Ok(Self {
            client: Client::open(url)?,
            keys: RedisKeys::new(topic),
            policy,
            idle: Mutex::new(Vec::new()),
        })
    }

    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Result<T, QueueError> {
        let pooled = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.client.get_connection()?,
        };
        let result = op(&mut conn);
        // A connection that just errored may be mid-reply; let it drop.
        if result.is_ok() {
            if let Ok(mut idle) = self.idle.lock() {
                idle.push(conn);
            }
        }
        result.map_err(QueueError::from)
    }

    fn promote_due(&self, now_ms: i64) -> Result<usize, QueueError> {
        let script = redis::Script::new(PROMOTE_DUE_SCRIPT);
        self.with_connection(|conn| {
            script
                .key(&self.keys.delayed)
                .key(&self.keys.wait)
                .arg(now_ms)
                .arg(PROMOTE_BATCH)
                .invoke(conn)
        })
    }

    fn encode(&self, queued: &QueuedJob) -> Result<String, QueueError> {
        serde_json::to_string(queued).map_err(|source| QueueError::Parse {
            path: self.keys.wait.clone(),
            source,
        })
    }
}

impl JobQueue for RedisJobQueue {
    fn backend(&self) -> QueueBackend {
        QueueBackend::Redis
    }

    fn enqueue(&self, job: Job) -> Result<QueuedJob, QueueError> {
        job.validate().map_err(QueueError::InvalidJob)?;
        let queued = QueuedJob::new(job);
        let payload = self.encode(&queued)?;
        self.with_connection(|conn| {
            redis::cmd("LPUSH")
                .arg(&self.keys.wait)
                .arg(&payload)
                .query::<i64>(conn)
        })?;
        Ok(queued)
    }

    fn reserve(&self, wait: Duration) -> Result<Option<ReservedJob>, QueueError> {
        self.promote_due(now_millis())?;

        let timeout_secs = wait.as_secs().max(1);
        let payload: Option<String> = self.with_connection(|conn| {
            redis::cmd("BRPOPLPUSH")
                .arg(&self.keys.wait)
                .arg(&self.keys.active)
                .arg(timeout_secs)
                .query(conn)
        })?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedJob>(&payload) {
            Ok(queued) => Ok(Some(ReservedJob {
                queued,
                receipt: payload,
            })),
            Err(source) => {
                self.with_connection(|conn| {
                    redis::pipe()
                        .atomic()
                        .cmd("LREM")
                        .arg(&self.keys.active)
                        .arg(1)
                        .arg(&payload)
                        .ignore()
                        .cmd("LPUSH")
                        .arg(&self.keys.failed)
                        .arg(&payload)
                        .ignore()
                        .query::<()>(conn)
                })?;
                Err(QueueError::Parse {
                    path: self.keys.active.clone(),
                    source,
                })
            }
        }
    }

    fn complete(&self, reserved: &ReservedJob) -> Result<(), QueueError> {
        self.with_connection(|conn| {
            redis::cmd("LREM")
                .arg(&self.keys.active)
                .arg(1)
                .arg(&reserved.receipt)
                .query::<i64>(conn)
        })?;
        Ok(())
    }

    fn fail(&self, reserved: &ReservedJob, reason: &str) -> Result<FailureOutcome, QueueError> {
        let mut queued = reserved.queued.clone();
        queued.attempts_made = queued.attempts_made.saturating_add(1);
        queued.last_error = Some(failure_note(reason));

        let outcome = self.policy.outcome(queued.attempts_made);
        if let FailureOutcome::Retry { delay, .. } = outcome {
            queued.available_at_ms =
                now_millis().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        }
        let payload = self.encode(&queued)?;

        self.with_connection(|conn| {
            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("LREM")
                .arg(&self.keys.active)
                .arg(1)
                .arg(&reserved.receipt)
                .ignore();
            match outcome {
                FailureOutcome::Retry { .. } => {
                    pipe.cmd("ZADD")
                        .arg(&self.keys.delayed)
                        .arg(queued.available_at_ms)
                        .arg(&payload)
                        .ignore();
                }
                FailureOutcome::Exhausted { .. } => {
                    pipe.cmd("LPUSH")
                        .arg(&self.keys.failed)
                        .arg(&payload)
                        .ignore()
                        .cmd("LTRIM")
                        .arg(&self.keys.failed)
                        .arg(0)
                        .arg(FAILED_KEEP - 1)
                        .ignore();
                }
            }
            pipe.query::<()>(conn)
        })?;
        Ok(outcome)
    }

    fn recover(&self) -> Result<usize, QueueError> {
        let mut recovered = 0;
        loop {
            let moved: Option<String> = self.with_connection(|conn| {
                redis::cmd("RPOPLPUSH")
                    .arg(&self.keys.active)
                    .arg(&self.keys.wait)
                    .query(conn)
            })?;
            if moved.is_none() {
                return Ok(recovered);
            }
            recovered += 1;
        }
    }

    fn ping(&self) -> Result<(), QueueError> {
        self.with_connection(|conn| redis::cmd("PING").query::<String>(conn))?;
        Ok(())
    }
}
