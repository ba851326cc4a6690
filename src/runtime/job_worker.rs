use super::worker_primitives::{sleep_with_stop, QUEUE_ERROR_BACKOFF, STOP_POLL_INTERVAL};
use super::RuntimeError;
use crate::config::QueueSettings;
use crate::delivery::{ChatClient, DeliveryResult};
use crate::provider::{AdapterError, AgentAdapter, SpawnOptions, SpawnResult};
use crate::queue::{FailureOutcome, Job, JobQueue, QueueError, ReservedJob};
use crate::shared::logging::RuntimeLog;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const EMPTY_OUTPUT_PLACEHOLDER: &str = "(the agent finished without a reply)";
const NOTICE_MAX_CHARS: usize = 1_500;

/// Where job results go. Implementations report failure in the result and
/// never panic.
pub trait Delivery: Send + Sync {
    fn deliver(&self, thread_id: &str, text: &str) -> DeliveryResult;

    fn typing(&self, channel_id: &str) -> DeliveryResult;
}

impl Delivery for ChatClient {
    fn deliver(&self, thread_id: &str, text: &str) -> DeliveryResult {
        ChatClient::deliver(self, thread_id, text)
    }

    fn typing(&self, channel_id: &str) -> DeliveryResult {
        ChatClient::typing(self, channel_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid job: {0}")]
    Invalid(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("delivery to thread {thread_id} failed: {error}")]
    Delivery { thread_id: String, error: String },
}

/// Runs one job end to end: typing indicator, agent, reply.
pub struct JobProcessor {
    adapter: Arc<dyn AgentAdapter>,
    delivery: Arc<dyn Delivery>,
    system_prompt: Option<String>,
    log: RuntimeLog,
}

impl JobProcessor {
    pub fn new(
        adapter: Arc<dyn AgentAdapter>,
        delivery: Arc<dyn Delivery>,
        log: RuntimeLog,
    ) -> Self {
        Self {
            adapter,
            delivery,
            system_prompt: None,
            log,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|v| !v.trim().is_empty());
        self
    }

    /// On failure a notice is posted to the job's thread before the error is
    /// returned; a notice that cannot be posted is only logged.
    pub fn process(&self, job: &Job) -> Result<SpawnResult, JobError> {
        self.run(job).inspect_err(|err| self.notify_failure(job, err))
    }

    fn run(&self, job: &Job) -> Result<SpawnResult, JobError> {
        job.validate().map_err(JobError::Invalid)?;

        // Best effort; a missing indicator never blocks the run.
        let _ = self.delivery.typing(&job.thread_id);

        let result = self.adapter.spawn(&SpawnOptions {
            prompt: job.prompt.clone(),
            session_id: job.session_id.clone(),
            resume: job.resume,
            working_dir: job.working_dir.clone(),
            system_prompt: self.system_prompt.clone(),
        })?;

        let text = if result.output.trim().is_empty() {
            EMPTY_OUTPUT_PLACEHOLDER
        } else {
            result.output.as_str()
        };
        let delivered = self.delivery.deliver(&job.thread_id, text);
        if !delivered.success {
            return Err(JobError::Delivery {
                thread_id: job.thread_id.clone(),
                error: delivered
                    .error
                    .unwrap_or_else(|| "unknown delivery failure".to_string()),
            });
        }
        Ok(result)
    }

    fn notify_failure(&self, job: &Job, err: &JobError) {
        let posted = self.delivery.deliver(&job.thread_id, &failure_notice(err));
        if !posted.success {
            self.log.warn(
                "delivery.notice_failed",
                &format!(
                    "thread={} error={}",
                    job.thread_id,
                    posted.error.unwrap_or_default()
                ),
            );
        }
    }
}

pub fn failure_notice(err: &JobError) -> String {
    let detail = err.to_string();
    let detail = if detail.chars().count() > NOTICE_MAX_CHARS {
        let head: String = detail.chars().take(NOTICE_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        detail
    };
    format!("Agent run failed:\n```\n{detail}\n```")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Retrying { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Fixed pool of worker threads pulling from one queue. Each job is handled
/// by exactly one thread; redelivery is left to the queue.
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    processor: Arc<JobProcessor>,
    concurrency: usize,
    poll_timeout: Duration,
    log: RuntimeLog,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        processor: Arc<JobProcessor>,
        settings: &QueueSettings,
        log: RuntimeLog,
    ) -> Self {
        Self {
            queue,
            processor,
            concurrency: settings.concurrency.max(1),
            poll_timeout: settings.poll_timeout(),
            log,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Processes one reserved job and settles it with the queue.
    pub fn handle(&self, reserved: ReservedJob) -> Result<JobStatus, QueueError> {
        let queued = &reserved.queued;
        self.log.info(
            "job.started",
            &format!(
                "id={} thread={} attempt={} resume={}",
                queued.id,
                queued.job.thread_id,
                queued.attempts_made + 1,
                queued.job.resume
            ),
        );

        let err = match self.processor.process(&queued.job) {
            Ok(result) => {
                self.queue.complete(&reserved)?;
                self.log.info(
                    "job.completed",
                    &format!(
                        "id={} thread={} session={}",
                        queued.id, queued.job.thread_id, result.session_id
                    ),
                );
                return Ok(JobStatus::Completed);
            }
            Err(err) => err,
        };

        self.log
            .error("job.failed", &format!("id={} error={err}", queued.id));
        match self.queue.fail(&reserved, &err.to_string())? {
            FailureOutcome::Retry { attempt, delay } => {
                self.log.warn(
                    "job.retry_scheduled",
                    &format!(
                        "id={} attempt={attempt} delay_ms={}",
                        queued.id,
                        delay.as_millis()
                    ),
                );
                Ok(JobStatus::Retrying { attempt, delay })
            }
            FailureOutcome::Exhausted { attempts } => {
                self.log.error(
                    "job.exhausted",
                    &format!("id={} attempts={attempts}", queued.id),
                );
                Ok(JobStatus::Exhausted { attempts })
            }
        }
    }

    /// Handles every job that is due right now, then returns how many ran.
    /// Every worker is joined before the first error is returned, so no job
    /// is left in flight.
    pub fn drain_once(&self) -> Result<usize, RuntimeError> {
        let handles = self.spawn_workers("drain", |pool, _| {
            let mut handled = 0;
            while let Some(reserved) = pool.queue.reserve(Duration::ZERO)? {
                pool.handle(reserved)?;
                handled += 1;
            }
            Ok::<usize, QueueError>(handled)
        })?;

        let results = handles
            .into_iter()
            .map(|(worker_id, handle)| match handle.join() {
                Ok(result) => result.map_err(RuntimeError::from),
                Err(_) => Err(RuntimeError::WorkerPanicked(worker_id)),
            })
            .collect::<Vec<_>>();

        let mut total = 0;
        for result in results {
            total += result?;
        }
        Ok(total)
    }

    /// Runs until `stop` is raised or `stop_signal` appears on disk. Jobs in
    /// flight finish before this returns.
    pub fn run_until_stop(
        &self,
        stop: Arc<AtomicBool>,
        stop_signal: Option<PathBuf>,
    ) -> Result<(), RuntimeError> {
        self.log.info(
            "worker.started",
            &format!(
                "backend={} concurrency={}",
                self.queue.backend().as_str(),
                self.concurrency
            ),
        );

        let worker_stop = stop.clone();
        let handles = self.spawn_workers("job-worker", move |pool, worker_id| {
            pool.poll_until_stop(&worker_stop, worker_id);
            Ok::<(), QueueError>(())
        })?;

        while !stop.load(Ordering::Relaxed) {
            if stop_signal.as_ref().is_some_and(|path| path.exists()) {
                self.log.info("worker.stopping", "stop file detected");
                stop.store(true, Ordering::Relaxed);
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        let mut panicked = None;
        for (worker_id, handle) in handles {
            if handle.join().is_err() {
                panicked = Some(worker_id);
            }
        }
        if let Some(path) = stop_signal.filter(|path| path.exists()) {
            let _ = std::fs::remove_file(path);
        }
        self.log.info("worker.stopped", "all workers finished");
        match panicked {
            Some(worker_id) => Err(RuntimeError::WorkerPanicked(worker_id)),
            None => Ok(()),
        }
    }

    fn poll_until_stop(&self, stop: &AtomicBool, worker_id: &str) {
        while !stop.load(Ordering::Relaxed) {
            let outcome = self
                .queue
                .reserve(self.poll_timeout)
                .and_then(|reserved| match reserved {
                    Some(reserved) => self.handle(reserved).map(Some),
                    None => Ok(None),
                });
            if let Err(err) = outcome {
                self.log.error(
                    "worker.queue_error",
                    &format!("worker={worker_id} error={err}"),
                );
                if !sleep_with_stop(stop, QUEUE_ERROR_BACKOFF) {
                    break;
                }
            }
        }
    }

    fn spawn_workers<T, F>(
        &self,
        prefix: &str,
        body: F,
    ) -> Result<Vec<(String, thread::JoinHandle<Result<T, QueueError>>)>, RuntimeError>
    where
        T: Send + 'static,
        F: Fn(&WorkerPool, &str) -> Result<T, QueueError> + Clone + Send + 'static,
    {
        let mut handles = Vec::with_capacity(self.concurrency);
        for idx in 0..self.concurrency {
            let worker_id = format!("{prefix}-{idx}");
            let pool = self.clone();
            let body = body.clone();
            let thread_id = worker_id.clone();
            let handle = thread::Builder::new()
                .name(worker_id.clone())
                .spawn(move || body(&pool, &thread_id))
                .map_err(|source| RuntimeError::SpawnWorker {
                    worker_id: worker_id.clone(),
                    source,
                })?;
            handles.push((worker_id, handle));
        }
        Ok(handles)
    }
}
