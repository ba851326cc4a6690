use agentrelay::config::QueueSettings;
use agentrelay::delivery::DeliveryResult;
use agentrelay::provider::{
    AdapterError, AdapterKind, AgentAdapter, SpawnOptions, SpawnResult,
};
use agentrelay::config::QueueBackend;
use agentrelay::queue::{
    FailureOutcome, FileJobQueue, Job, JobQueue, QueueError, QueueRetryPolicy, QueuedJob,
    ReservedJob,
};
use agentrelay::runtime::{
    Delivery, JobError, JobProcessor, JobStatus, RuntimeError, WorkerPool,
    EMPTY_OUTPUT_PLACEHOLDER,
};
use agentrelay::shared::logging::{read_events, RuntimeLog};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

/// Replies with a fixed output, or fails every run when `fail` is set.
struct FakeAdapter {
    output: String,
    fail: bool,
    delay: Duration,
    seen: Mutex<Vec<SpawnOptions>>,
}

impl FakeAdapter {
    fn replying(output: &str) -> Arc<Self> {
        Arc::new(Self {
            output: output.to_string(),
            fail: false,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn slow(output: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            output: output.to_string(),
            fail: false,
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            output: String::new(),
            fail: true,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl AgentAdapter for FakeAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Claude
    }

    fn spawn(&self, options: &SpawnOptions) -> Result<SpawnResult, AdapterError> {
        self.seen.lock().expect("seen").push(options.clone());
        thread::sleep(self.delay);
        if self.fail {
            return Err(AdapterError::NonZeroExit {
                adapter: AdapterKind::Claude,
                exit_code: 1,
                stderr: "model overloaded".to_string(),
            });
        }
        Ok(SpawnResult {
            output: self.output.clone(),
            session_id: format!("{}-next", options.session_id),
        })
    }
}

#[derive(Default)]
struct RecordingDelivery {
    messages: Mutex<Vec<(String, String)>>,
    typing: Mutex<Vec<String>>,
    reject_messages: bool,
}

impl Delivery for RecordingDelivery {
    fn deliver(&self, thread_id: &str, text: &str) -> DeliveryResult {
        self.messages
            .lock()
            .expect("messages")
            .push((thread_id.to_string(), text.to_string()));
        if self.reject_messages {
            DeliveryResult::failed("chat api returned status 403: missing access")
        } else {
            DeliveryResult::ok()
        }
    }

    fn typing(&self, channel_id: &str) -> DeliveryResult {
        self.typing
            .lock()
            .expect("typing")
            .push(channel_id.to_string());
        DeliveryResult::failed("typing is unavailable")
    }
}

/// File queue whose `drain-0` worker cannot reserve; every other worker sees
/// the real queue.
struct BrokenFirstWorkerQueue {
    inner: Arc<FileJobQueue>,
}

impl JobQueue for BrokenFirstWorkerQueue {
    fn backend(&self) -> QueueBackend {
        self.inner.backend()
    }

    fn enqueue(&self, job: Job) -> Result<QueuedJob, QueueError> {
        self.inner.enqueue(job)
    }

    fn reserve(&self, wait: Duration) -> Result<Option<ReservedJob>, QueueError> {
        if thread::current().name() == Some("drain-0") {
            thread::sleep(Duration::from_millis(100));
            return Err(QueueError::Io {
                path: "incoming".to_string(),
                source: std::io::Error::other("disk unavailable"),
            });
        }
        self.inner.reserve(wait)
    }

    fn complete(&self, reserved: &ReservedJob) -> Result<(), QueueError> {
        self.inner.complete(reserved)
    }

    fn fail(&self, reserved: &ReservedJob, reason: &str) -> Result<FailureOutcome, QueueError> {
        self.inner.fail(reserved, reason)
    }

    fn recover(&self) -> Result<usize, QueueError> {
        self.inner.recover()
    }

    fn ping(&self) -> Result<(), QueueError> {
        self.inner.ping()
    }
}

fn job(thread_id: &str) -> Job {
    Job {
        prompt: "what changed?".to_string(),
        thread_id: thread_id.to_string(),
        session_id: "sess-1".to_string(),
        resume: true,
        username: "alice".to_string(),
        working_dir: None,
    }
}

fn queue_settings(concurrency: usize) -> QueueSettings {
    QueueSettings {
        concurrency,
        poll_timeout_secs: 1,
        ..QueueSettings::default()
    }
}

fn file_queue(root: &Path, attempts: u32) -> Arc<FileJobQueue> {
    Arc::new(
        FileJobQueue::open(
            root,
            "agent-jobs",
            QueueRetryPolicy {
                attempts,
                backoff: Duration::ZERO,
            },
        )
        .expect("open queue"),
    )
}

#[test]
fn processor_runs_agent_and_posts_reply() {
    let adapter = FakeAdapter::replying("all good");
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(adapter.clone(), delivery.clone(), RuntimeLog::disabled())
        .with_system_prompt(Some("be brief".to_string()));

    let result = processor.process(&job("t-1")).expect("process");

    assert_eq!(result.session_id, "sess-1-next");
    assert_eq!(
        *delivery.messages.lock().expect("messages"),
        vec![("t-1".to_string(), "all good".to_string())]
    );
    assert_eq!(*delivery.typing.lock().expect("typing"), vec!["t-1"]);
    let seen = adapter.seen.lock().expect("seen");
    assert!(seen[0].resume);
    assert_eq!(seen[0].system_prompt.as_deref(), Some("be brief"));
}

#[test]
fn empty_agent_output_is_replaced_with_placeholder() {
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(
        FakeAdapter::replying("  \n"),
        delivery.clone(),
        RuntimeLog::disabled(),
    );

    processor.process(&job("t-1")).expect("process");
    let messages = delivery.messages.lock().expect("messages");
    assert_eq!(messages[0].1, EMPTY_OUTPUT_PLACEHOLDER);
}

#[test]
fn agent_failure_posts_notice_and_returns_error() {
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(
        FakeAdapter::failing(),
        delivery.clone(),
        RuntimeLog::disabled(),
    );

    let err = processor.process(&job("t-9")).expect_err("fails");
    assert!(matches!(err, JobError::Adapter(_)));

    let messages = delivery.messages.lock().expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "t-9");
    assert!(messages[0].1.starts_with("Agent run failed:"));
    assert!(messages[0].1.contains("model overloaded"));
}

#[test]
fn unpostable_notice_is_logged() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("runtime.log");
    let delivery = Arc::new(RecordingDelivery {
        reject_messages: true,
        ..RecordingDelivery::default()
    });
    let processor = JobProcessor::new(
        FakeAdapter::replying("reply"),
        delivery.clone(),
        RuntimeLog::new(&log_path),
    );

    let err = processor.process(&job("t-1")).expect_err("delivery fails");
    assert!(matches!(err, JobError::Delivery { .. }));
    assert_eq!(delivery.messages.lock().expect("messages").len(), 2);
    assert_eq!(read_events(&log_path, "delivery.notice_failed").len(), 1);
}

#[test]
fn invalid_job_never_reaches_the_agent() {
    let adapter = FakeAdapter::replying("unused");
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(adapter.clone(), delivery, RuntimeLog::disabled());
    let mut bad = job("t-1");
    bad.prompt = " ".to_string();

    let err = processor.process(&bad).expect_err("invalid");
    assert!(matches!(err, JobError::Invalid(_)));
    assert!(adapter.seen.lock().expect("seen").is_empty());
}

#[test]
fn drain_once_completes_every_due_job() {
    let dir = tempdir().expect("tempdir");
    let queue = file_queue(dir.path(), 3);
    for idx in 0..5 {
        queue.enqueue(job(&format!("t-{idx}"))).expect("enqueue");
    }
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(
        FakeAdapter::replying("done"),
        delivery.clone(),
        RuntimeLog::disabled(),
    );
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(processor),
        &queue_settings(2),
        RuntimeLog::disabled(),
    );

    assert_eq!(pool.concurrency(), 2);
    assert_eq!(pool.drain_once().expect("drain"), 5);
    let mut threads = delivery
        .messages
        .lock()
        .expect("messages")
        .iter()
        .map(|(thread, _)| thread.clone())
        .collect::<Vec<_>>();
    threads.sort();
    assert_eq!(threads, vec!["t-0", "t-1", "t-2", "t-3", "t-4"]);
    assert!(queue.reserve(Duration::ZERO).expect("reserve").is_none());
}

#[test]
fn drain_once_waits_for_in_flight_jobs_before_reporting_a_worker_error() {
    let dir = tempdir().expect("tempdir");
    let inner = file_queue(dir.path(), 3);
    inner.enqueue(job("t-slow")).expect("enqueue");
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(
        FakeAdapter::slow("done", Duration::from_millis(800)),
        delivery.clone(),
        RuntimeLog::disabled(),
    );
    let pool = WorkerPool::new(
        Arc::new(BrokenFirstWorkerQueue {
            inner: inner.clone(),
        }),
        Arc::new(processor),
        &queue_settings(2),
        RuntimeLog::disabled(),
    );

    let err = pool.drain_once().expect_err("drain-0 fails");
    assert!(matches!(err, RuntimeError::Queue(QueueError::Io { .. })));

    assert_eq!(
        *delivery.messages.lock().expect("messages"),
        vec![("t-slow".to_string(), "done".to_string())]
    );
    assert_eq!(
        std::fs::read_dir(&inner.paths().processing)
            .expect("processing dir")
            .count(),
        0
    );
    assert!(inner.reserve(Duration::ZERO).expect("reserve").is_none());
}

#[test]
fn failing_job_is_retried_then_exhausted() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("runtime.log");
    let queue = file_queue(&dir.path().join("queue"), 2);
    queue.enqueue(job("t-1")).expect("enqueue");
    let processor = JobProcessor::new(
        FakeAdapter::failing(),
        Arc::new(RecordingDelivery::default()),
        RuntimeLog::disabled(),
    );
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(processor),
        &queue_settings(1),
        RuntimeLog::new(&log_path),
    );

    let first = queue.reserve(Duration::ZERO).expect("reserve").expect("job");
    assert_eq!(
        pool.handle(first).expect("handle"),
        JobStatus::Retrying {
            attempt: 1,
            delay: Duration::ZERO
        }
    );
    let second = queue
        .reserve(Duration::from_millis(200))
        .expect("reserve")
        .expect("job");
    assert_eq!(
        pool.handle(second).expect("handle"),
        JobStatus::Exhausted { attempts: 2 }
    );

    assert_eq!(queue.failed_jobs().expect("failed").len(), 1);
    assert_eq!(read_events(&log_path, "job.failed").len(), 2);
    assert_eq!(read_events(&log_path, "job.retry_scheduled").len(), 1);
    assert_eq!(read_events(&log_path, "job.exhausted").len(), 1);
}

#[test]
fn pool_stops_when_stop_file_appears() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("runtime.log");
    let stop_path = dir.path().join("stop");
    let queue = file_queue(&dir.path().join("queue"), 3);
    queue.enqueue(job("t-1")).expect("enqueue");
    let delivery = Arc::new(RecordingDelivery::default());
    let processor = JobProcessor::new(
        FakeAdapter::replying("done"),
        delivery.clone(),
        RuntimeLog::disabled(),
    );
    let pool = WorkerPool::new(
        queue,
        Arc::new(processor),
        &queue_settings(2),
        RuntimeLog::new(&log_path),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let runner = {
        let stop = Arc::clone(&stop);
        let stop_path = stop_path.clone();
        thread::spawn(move || pool.run_until_stop(stop, Some(stop_path)))
    };

    for _ in 0..100 {
        if !delivery.messages.lock().expect("messages").is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    std::fs::write(&stop_path, "stop").expect("write stop file");

    runner.join().expect("join").expect("clean stop");
    assert!(stop.load(Ordering::Relaxed));
    assert!(!stop_path.exists());
    assert_eq!(delivery.messages.lock().expect("messages").len(), 1);
    assert_eq!(read_events(&log_path, "worker.stopped").len(), 1);
}
